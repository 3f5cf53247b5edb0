//! Warehouse connection pool
//!
//! Each warehouse connector instance owns one [`ConnectionPool`]: a bounded
//! set of live DuckDB connections opened at connector construction and
//! disposed at teardown. Checkouts are scoped guards that return the
//! connection on every exit path; when the pool plus overflow is exhausted,
//! a checkout blocks until a connection is returned. Disposal is idempotent.

use crate::error::{Error, Result};
use duckdb::Connection;
use serde_json::Value as JsonValue;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Connections opened up front
pub const DEFAULT_MINIMUM_POOL_SIZE: usize = 5;

/// Hard upper bound including overflow connections
pub const DEFAULT_MAXIMUM_POOL_SIZE: usize = 15;

// ============================================================================
// Connection Pool
// ============================================================================

/// Bounded pool of connections to one database
pub struct ConnectionPool {
    state: Mutex<PoolState>,
    available: Condvar,
    max_size: usize,
}

struct PoolState {
    /// Never handed out; overflow connections are cloned from it
    seed: Option<Connection>,
    idle: Vec<Connection>,
    checked_out: usize,
    disposed: bool,
}

impl ConnectionPool {
    /// Open a pool of `min_size` connections, growing on demand to `max_size`
    pub fn open(database: &str, min_size: usize, max_size: usize) -> Result<Self> {
        if min_size == 0 || max_size < min_size {
            return Err(Error::pool(format!(
                "invalid pool bounds: min {min_size}, max {max_size}"
            )));
        }
        let seed = Connection::open(database)?;
        let mut idle = Vec::with_capacity(min_size);
        for _ in 0..min_size {
            idle.push(seed.try_clone()?);
        }
        Ok(Self {
            state: Mutex::new(PoolState {
                seed: Some(seed),
                idle,
                checked_out: 0,
                disposed: false,
            }),
            available: Condvar::new(),
            max_size,
        })
    }

    /// Open a pool with the default bounds
    pub fn open_default(database: &str) -> Result<Self> {
        Self::open(database, DEFAULT_MINIMUM_POOL_SIZE, DEFAULT_MAXIMUM_POOL_SIZE)
    }

    /// Check out a connection, blocking while the pool is exhausted
    pub fn checkout(&self) -> Result<PooledConnection<'_>> {
        let mut state = self.lock()?;
        loop {
            if state.disposed {
                return Err(Error::pool("connection pool is disposed"));
            }
            if let Some(connection) = state.idle.pop() {
                state.checked_out += 1;
                return Ok(PooledConnection {
                    pool: self,
                    connection: Some(connection),
                });
            }
            if state.checked_out < self.max_size {
                let seed = state
                    .seed
                    .as_ref()
                    .ok_or_else(|| Error::pool("connection pool is disposed"))?;
                let connection = seed.try_clone()?;
                state.checked_out += 1;
                return Ok(PooledConnection {
                    pool: self,
                    connection: Some(connection),
                });
            }
            state = self
                .available
                .wait(state)
                .map_err(|_| Error::pool("connection pool lock poisoned"))?;
        }
    }

    /// Drop every pooled connection; safe to call repeatedly
    pub fn dispose(&self) {
        if let Ok(mut state) = self.lock() {
            state.disposed = true;
            state.idle.clear();
            state.seed = None;
        }
        self.available.notify_all();
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| Error::pool("connection pool lock poisoned"))
    }

    fn give_back(&self, connection: Connection) {
        if let Ok(mut state) = self.lock() {
            state.checked_out = state.checked_out.saturating_sub(1);
            if !state.disposed {
                state.idle.push(connection);
            }
        }
        self.available.notify_one();
    }
}

// ============================================================================
// Pooled Connection Guard
// ============================================================================

/// Scoped checkout; returns the connection to the pool when dropped
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.give_back(connection);
        }
    }
}

// ============================================================================
// Value Conversion
// ============================================================================

/// Convert a DuckDB value into the batch's JSON scalar representation
pub fn db_value_to_json(value: duckdb::types::Value) -> JsonValue {
    use duckdb::types::Value;
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => JsonValue::Number(i.into()),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::UBigInt(i) => JsonValue::Number(i.into()),
        Value::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Double(f) => {
            serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) => JsonValue::String(s),
        Value::Timestamp(_, micros) => {
            let secs = micros / 1_000_000;
            let nanos = ((micros % 1_000_000) * 1000) as u32;
            chrono::DateTime::from_timestamp(secs, nanos)
                .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()))
                .unwrap_or(JsonValue::Number(micros.into()))
        }
        Value::Date32(days) => {
            // 719_163 days from 1 CE to 1970-01-01
            chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163)
                .map(|date| JsonValue::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::Number(days.into()))
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

/// Convert a batch's JSON scalar into a bindable DuckDB value
pub fn json_to_db_value(value: &JsonValue) -> duckdb::types::Value {
    use duckdb::types::Value;
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}
