/// Document store for daily and hourly weather records
///
/// Records are kept as JSONB documents in two tables, `days` and `hours`,
/// inside a configurable schema. Each table carries its natural key as
/// real columns so inserts can use `ON CONFLICT DO NOTHING`, which makes
/// "insert if absent" a single atomic statement.
///
/// `MemoryStore` implements the same contract in-process and backs the
/// pipeline tests.

use postgres::{Client, NoTls};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::model::{DailyRecord, DateRange, HourlyRecord, StoreError};

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

pub trait WeatherStore {
    /// Raw `datetime` values of the stored days for `city` inside `range`
    /// (inclusive on both ends), ascending.
    fn persisted_dates(&mut self, city: &str, range: &DateRange) -> Result<Vec<String>, StoreError>;

    /// Inserts the day unless (city, datetime) already exists.
    /// Returns `true` if a row was written.
    fn insert_day_if_absent(&mut self, record: &DailyRecord) -> Result<bool, StoreError>;

    /// Inserts the hour unless (city, date, datetime) already exists.
    /// Returns `true` if a row was written.
    fn insert_hour_if_absent(&mut self, record: &HourlyRecord) -> Result<bool, StoreError>;

    /// Stored days for `city` inside `range`, ordered by date.
    fn load_days(&mut self, city: &str, range: &DateRange) -> Result<Vec<DailyRecord>, StoreError>;

    /// Total number of stored days for `city`.
    fn day_count(&mut self, city: &str) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: Client,
    schema: String,
}

impl PgStore {
    /// Connects without TLS, matching how the service is deployed next to
    /// its database.
    pub fn connect(database_url: &str, schema: &str) -> Result<Self, StoreError> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(Self::with_client(client, schema))
    }

    /// `schema` must already be a validated identifier
    /// (see `config::is_valid_identifier`).
    pub fn with_client(client: Client, schema: &str) -> Self {
        Self {
            client,
            schema: schema.to_string(),
        }
    }

    /// Creates the schema and both collections if they don't exist yet.
    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {s};
             CREATE TABLE IF NOT EXISTS {s}.days (
                 city      TEXT NOT NULL,
                 datetime  TEXT NOT NULL,
                 doc       JSONB NOT NULL,
                 loaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                 PRIMARY KEY (city, datetime)
             );
             CREATE TABLE IF NOT EXISTS {s}.hours (
                 city      TEXT NOT NULL,
                 date      TEXT NOT NULL,
                 datetime  TEXT NOT NULL,
                 doc       JSONB NOT NULL,
                 loaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                 PRIMARY KEY (city, date, datetime)
             );",
            s = self.schema
        );
        self.client.batch_execute(&ddl)?;
        Ok(())
    }
}

impl WeatherStore for PgStore {
    fn persisted_dates(&mut self, city: &str, range: &DateRange) -> Result<Vec<String>, StoreError> {
        let query = format!(
            "SELECT datetime FROM {}.days
             WHERE city = $1 AND datetime >= $2 AND datetime <= $3
             ORDER BY datetime",
            self.schema
        );
        let rows = self
            .client
            .query(&query, &[&city, &range.start_str(), &range.end_str()])?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    fn insert_day_if_absent(&mut self, record: &DailyRecord) -> Result<bool, StoreError> {
        let doc: Value = serde_json::to_value(record)?;
        let statement = format!(
            "INSERT INTO {}.days (city, datetime, doc) VALUES ($1, $2, $3)
             ON CONFLICT (city, datetime) DO NOTHING",
            self.schema
        );
        let rows = self
            .client
            .execute(&statement, &[&record.city, &record.datetime, &doc])?;
        Ok(rows > 0)
    }

    fn insert_hour_if_absent(&mut self, record: &HourlyRecord) -> Result<bool, StoreError> {
        let doc: Value = serde_json::to_value(record)?;
        let statement = format!(
            "INSERT INTO {}.hours (city, date, datetime, doc) VALUES ($1, $2, $3, $4)
             ON CONFLICT (city, date, datetime) DO NOTHING",
            self.schema
        );
        let rows = self.client.execute(
            &statement,
            &[&record.city, &record.date, &record.datetime, &doc],
        )?;
        Ok(rows > 0)
    }

    fn load_days(&mut self, city: &str, range: &DateRange) -> Result<Vec<DailyRecord>, StoreError> {
        let query = format!(
            "SELECT doc FROM {}.days
             WHERE city = $1 AND datetime >= $2 AND datetime <= $3
             ORDER BY datetime",
            self.schema
        );
        let rows = self
            .client
            .query(&query, &[&city, &range.start_str(), &range.end_str()])?;

        let mut days = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: Value = row.get(0);
            days.push(serde_json::from_value(doc)?);
        }
        Ok(days)
    }

    fn day_count(&mut self, city: &str) -> Result<usize, StoreError> {
        let query = format!("SELECT COUNT(*) FROM {}.days WHERE city = $1", self.schema);
        let row = self.client.query_one(&query, &[&city])?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keyed exactly like the PostgreSQL tables; range filters compare the raw
/// date strings the same way the SQL does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    days: BTreeMap<(String, String), DailyRecord>,
    hours: BTreeMap<(String, String, String), HourlyRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hour_count(&self, city: &str) -> usize {
        self.hours.keys().filter(|(c, _, _)| c == city).count()
    }

    fn days_in_range(&self, city: &str, range: &DateRange) -> Vec<&DailyRecord> {
        let start = range.start_str();
        let end = range.end_str();
        self.days
            .iter()
            .filter(|((c, d), _)| c == city && *d >= start && *d <= end)
            .map(|(_, record)| record)
            .collect()
    }
}

impl WeatherStore for MemoryStore {
    fn persisted_dates(&mut self, city: &str, range: &DateRange) -> Result<Vec<String>, StoreError> {
        Ok(self
            .days_in_range(city, range)
            .into_iter()
            .map(|r| r.datetime.clone())
            .collect())
    }

    fn insert_day_if_absent(&mut self, record: &DailyRecord) -> Result<bool, StoreError> {
        match self.days.entry((record.city.clone(), record.datetime.clone())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn insert_hour_if_absent(&mut self, record: &HourlyRecord) -> Result<bool, StoreError> {
        let key = (
            record.city.clone(),
            record.date.clone(),
            record.datetime.clone(),
        );
        match self.hours.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn load_days(&mut self, city: &str, range: &DateRange) -> Result<Vec<DailyRecord>, StoreError> {
        Ok(self.days_in_range(city, range).into_iter().cloned().collect())
    }

    fn day_count(&mut self, city: &str) -> Result<usize, StoreError> {
        Ok(self.days.keys().filter(|(c, _)| c == city).count())
    }
}
