//! Interfaces between the application code and the Postgres database.

use crate::store::{GradeSession, GradeStore};
use crate::{GradeRecord, GradingModule, IdentityEntry, StudentRow};

use chrono::NaiveDate;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod grades;
mod identities;
mod modules;
mod roster;

pub use grades::upsert_grade_record;
pub use identities::get_identities_by_roster_keys;
pub use modules::get_modules_by_course;
pub use roster::{get_assignments_by_course, get_roster_by_course};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

const DEFAULT_POOL_SIZE: u32 = 10;

/// Connection settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is not defined".to_string())?;
        let pool_size = match env::var("DATABASE_POOL_SIZE") {
            Ok(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| format!("DATABASE_POOL_SIZE is not a positive integer: {raw}"))?,
            Err(_) => DEFAULT_POOL_SIZE,
        };
        Ok(Self { url, pool_size })
    }
}

/// Build the connection pool and check that one connection can be made.
pub fn get_database_pool(config: &DatabaseConfig) -> Result<PgPool, String> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .map_err(|err| format!("Failed to build database pool: {err}"))?;

    pool.get()
        .map_err(|err| format!("Failed to connect to database: {err}"))?;
    info!(
        "Database connected successfully (pool size {})",
        config.pool_size
    );
    Ok(pool)
}

pub fn get_pooled_database_connection(pool: &PgPool) -> Result<PgPooled, String> {
    pool.get().map_err(|err| err.to_string())
}

/// A [`GradeStore`] backed by a Postgres connection pool.
/// Reads take a pooled connection per call; write sessions hold one for the whole batch.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    closed: Arc<AtomicBool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let config = DatabaseConfig::from_env()?;
        get_database_pool(&config).map(Self::new)
    }

    fn conn(&self) -> Result<PgPooled, String> {
        get_pooled_database_connection(&self.pool)
    }
}

impl GradeStore for PgStore {
    fn fetch_roster(
        &self,
        course_code: &str,
        assignment_name: Option<&str>,
    ) -> Result<Vec<StudentRow>, String> {
        get_roster_by_course(&mut *self.conn()?, course_code, assignment_name)
    }

    fn list_assignments(&self, course_code: &str) -> Result<Vec<String>, String> {
        get_assignments_by_course(&mut *self.conn()?, course_code)
    }

    fn list_modules(&self, course_code: &str) -> Result<Vec<GradingModule>, String> {
        get_modules_by_course(&mut *self.conn()?, course_code)
    }

    fn lookup_identities(&self, roster_keys: &[String]) -> Result<Vec<IdentityEntry>, String> {
        get_identities_by_roster_keys(&mut *self.conn()?, roster_keys)
    }

    fn open_session(&self) -> Result<Box<dyn GradeSession>, String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("grade store is shut down".to_string());
        }
        Ok(Box::new(PgSession {
            conn: self.conn()?,
            in_transaction: false,
        }))
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let state = self.pool.state();
        info!(
            "Grade store closed to new sessions ({} connections, {} idle)",
            state.connections, state.idle_connections
        );
    }
}

/// One pooled connection held for a whole batch. Transactions are driven
/// explicitly so a failed rollback never replaces the original error.
/// The connection returns to the pool when the session is dropped.
pub struct PgSession {
    conn: PgPooled,
    in_transaction: bool,
}

impl GradeSession for PgSession {
    fn begin(&mut self) -> Result<(), String> {
        <AnsiTransactionManager as TransactionManager<PgConnection>>::begin_transaction(
            &mut *self.conn,
        )
        .map_err(|err| err.to_string())?;
        self.in_transaction = true;
        Ok(())
    }

    fn upsert_grade(&mut self, record: &GradeRecord) -> Result<(), String> {
        upsert_grade_record(&mut self.conn, record)
    }

    fn commit(&mut self) -> Result<(), String> {
        <AnsiTransactionManager as TransactionManager<PgConnection>>::commit_transaction(
            &mut *self.conn,
        )
        .map_err(|err| err.to_string())?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), String> {
        self.in_transaction = false;
        <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(
            &mut *self.conn,
        )
        .map_err(|err| err.to_string())
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Session dropped with an open transaction, rolling back");
            if let Err(err) = self.rollback() {
                error!("Rollback on release failed: {err}");
            }
        }
    }
}
