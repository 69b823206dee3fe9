//! Requested date range validation.
//!
//! Dates are plain calendar dates; there is no timezone handling anywhere
//! in the service. The "today" used for the future-date check is passed in
//! by the caller so the checks stay deterministic in tests.

use chrono::NaiveDate;

use crate::model::{DATE_FORMAT, DateRange, InvalidDateError};

/// Default range used when `DATE_START` / `DATE_END` are not set.
pub const DEFAULT_DATE_START: &str = "2024-04-11";
pub const DEFAULT_DATE_END: &str = "2024-04-18";

/// Parses a single `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, InvalidDateError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| InvalidDateError::Unparseable(value.to_string()))
}

/// Parses and orders a requested range. Pure: no clock, no I/O.
pub fn validate(start: &str, end: &str) -> Result<DateRange, InvalidDateError> {
    let start_date = parse_date(start)?;
    let end_date = parse_date(end)?;

    DateRange::new(start_date, end_date).ok_or_else(|| InvalidDateError::Inverted {
        start: start.trim().to_string(),
        end: end.trim().to_string(),
    })
}

/// Rejects ranges that start after `today` and clamps ends that run past it.
///
/// Returns the (possibly clamped) range. Callers compare it with the input
/// to know whether clamping happened.
pub fn check_not_future(range: DateRange, today: NaiveDate) -> Result<DateRange, InvalidDateError> {
    if range.start() > today {
        return Err(InvalidDateError::StartInFuture {
            start: range.start_str(),
            today: today.format(DATE_FORMAT).to_string(),
        });
    }

    // start <= today here, so clamping can't invert the range
    Ok(range.clamp_end(today).unwrap_or(range))
}

/// Full check applied before a run touches the network or the store.
pub fn validate_for_run(start: &str, end: &str, today: NaiveDate) -> Result<DateRange, InvalidDateError> {
    check_not_future(validate(start, end)?, today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_validate_accepts_default_week() {
        let range = validate(DEFAULT_DATE_START, DEFAULT_DATE_END).unwrap();
        assert_eq!(range.start_str(), "2024-04-11");
        assert_eq!(range.end_str(), "2024-04-18");
    }

    #[test]
    fn test_validate_accepts_single_day() {
        let range = validate("2024-04-11", "2024-04-11").unwrap();
        assert_eq!(range.span_days(), 0);
    }

    #[test]
    fn test_validate_rejects_malformed_dates() {
        assert_eq!(
            validate("2024-13-01", "2024-04-18"),
            Err(InvalidDateError::Unparseable("2024-13-01".into()))
        );
        assert_eq!(
            validate("2024-04-11", "yesterday"),
            Err(InvalidDateError::Unparseable("yesterday".into()))
        );
        assert!(validate("", "2024-04-18").is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let err = validate("2024-04-18", "2024-04-11").unwrap_err();
        assert!(matches!(err, InvalidDateError::Inverted { .. }));
    }

    #[test]
    fn test_start_in_future_is_rejected() {
        let err = validate_for_run("2024-06-02", "2024-06-05", today()).unwrap_err();
        assert!(matches!(err, InvalidDateError::StartInFuture { .. }));
    }

    #[test]
    fn test_end_past_today_is_clamped() {
        let range = validate_for_run("2024-05-20", "2024-06-30", today()).unwrap();
        assert_eq!(range.end(), today());
        assert_eq!(range.start_str(), "2024-05-20");
    }

    #[test]
    fn test_range_ending_today_is_untouched() {
        let range = validate_for_run("2024-05-20", "2024-06-01", today()).unwrap();
        assert_eq!(range.end(), today());
        assert_eq!(range.span_days(), 12);
    }
}
