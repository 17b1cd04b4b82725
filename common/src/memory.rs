//! An in-process store with the same transaction semantics as the database.
//!
//! Used by tests and for running the API locally without a database.
//! Faults can be injected to exercise rollback paths.

use crate::store::{GradeSession, GradeStore};
use crate::{GradeRecord, GradingModule, IdentityEntry, StudentRow};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type GradeTable = BTreeMap<(String, String), GradeRecord>;

#[derive(Default)]
struct Tables {
    roster: Vec<StudentRow>,
    identities: BTreeMap<String, String>,
    modules: Vec<GradingModule>,
    grades: GradeTable,
}

#[derive(Default)]
struct Faults {
    fail_reads: bool,
    fail_begin: bool,
    fail_upsert_call: Option<usize>,
    fail_commit: bool,
    fail_rollback: bool,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    sessions_opened: AtomicUsize,
    sessions_released: AtomicUsize,
    upsert_calls: AtomicUsize,
    closed: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, String> {
    mutex
        .lock()
        .map_err(|_| "memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roster(self, rows: Vec<StudentRow>) -> Self {
        if let Ok(mut tables) = lock(&self.shared.tables) {
            tables.roster.extend(rows);
        }
        self
    }

    pub fn with_identities<I, K, V>(self, identities: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Ok(mut tables) = lock(&self.shared.tables) {
            tables.identities.extend(
                identities
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into())),
            );
        }
        self
    }

    pub fn with_modules(self, modules: Vec<GradingModule>) -> Self {
        if let Ok(mut tables) = lock(&self.shared.tables) {
            tables.modules.extend(modules);
        }
        self
    }

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        if let Ok(mut faults) = lock(&self.shared.faults) {
            faults.fail_reads = fail;
        }
    }

    /// Make the nth upsert (1-based, counted across all sessions) fail.
    pub fn fail_upsert_call(&self, call: Option<usize>) {
        if let Ok(mut faults) = lock(&self.shared.faults) {
            faults.fail_upsert_call = call;
        }
    }

    pub fn fail_begin(&self, fail: bool) {
        if let Ok(mut faults) = lock(&self.shared.faults) {
            faults.fail_begin = fail;
        }
    }

    /// Make commits fail, leaving the staged writes in place for a rollback.
    pub fn fail_commit(&self, fail: bool) {
        if let Ok(mut faults) = lock(&self.shared.faults) {
            faults.fail_commit = fail;
        }
    }

    pub fn fail_rollback(&self, fail: bool) {
        if let Ok(mut faults) = lock(&self.shared.faults) {
            faults.fail_rollback = fail;
        }
    }

    /// Committed grade records in key order.
    pub fn grades(&self) -> Vec<GradeRecord> {
        lock(&self.shared.tables)
            .map(|tables| tables.grades.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_released(&self) -> usize {
        self.shared.sessions_released.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), String> {
        if lock(&self.shared.faults)?.fail_reads {
            return Err("injected read failure".to_string());
        }
        Ok(())
    }
}

impl GradeStore for MemoryStore {
    fn fetch_roster(
        &self,
        course_code: &str,
        assignment_name: Option<&str>,
    ) -> Result<Vec<StudentRow>, String> {
        self.check_reads()?;
        let tables = lock(&self.shared.tables)?;
        let mut rows: Vec<StudentRow> = tables
            .roster
            .iter()
            .filter(|row| row.course_code == course_code)
            .filter(|row| assignment_name.is_none_or(|name| row.assignment_name == name))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.assignment_name, &a.display_name, &a.roster_key).cmp(&(
                &b.assignment_name,
                &b.display_name,
                &b.roster_key,
            ))
        });
        Ok(rows)
    }

    fn list_assignments(&self, course_code: &str) -> Result<Vec<String>, String> {
        self.check_reads()?;
        let tables = lock(&self.shared.tables)?;
        let mut names: Vec<String> = tables
            .roster
            .iter()
            .filter(|row| row.course_code == course_code)
            .map(|row| row.assignment_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn list_modules(&self, course_code: &str) -> Result<Vec<GradingModule>, String> {
        self.check_reads()?;
        let tables = lock(&self.shared.tables)?;
        let mut modules: Vec<GradingModule> = tables
            .modules
            .iter()
            .filter(|module| module.course_code == course_code)
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        Ok(modules)
    }

    fn lookup_identities(&self, roster_keys: &[String]) -> Result<Vec<IdentityEntry>, String> {
        self.check_reads()?;
        let tables = lock(&self.shared.tables)?;
        Ok(roster_keys
            .iter()
            .filter_map(|key| {
                tables.identities.get(key).map(|number| IdentityEntry {
                    roster_key: key.clone(),
                    identity_number: number.clone(),
                })
            })
            .collect())
    }

    fn open_session(&self) -> Result<Box<dyn GradeSession>, String> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err("grade store is shut down".to_string());
        }
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            pending: None,
        }))
    }

    fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

/// Writes are staged per session and merged into the grade table on commit,
/// so overlapping sessions only ever touch the keys they wrote.
struct MemorySession {
    shared: Arc<Shared>,
    pending: Option<GradeTable>,
}

impl GradeSession for MemorySession {
    fn begin(&mut self) -> Result<(), String> {
        if self.pending.is_some() {
            return Err("transaction already in progress".to_string());
        }
        if lock(&self.shared.faults)?.fail_begin {
            return Err("injected begin failure".to_string());
        }
        self.pending = Some(GradeTable::new());
        Ok(())
    }

    fn upsert_grade(&mut self, record: &GradeRecord) -> Result<(), String> {
        let call = self.shared.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if lock(&self.shared.faults)?.fail_upsert_call == Some(call) {
            return Err(format!(
                "injected write failure for {} / {}",
                record.identity_number, record.module_id
            ));
        }

        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| "no transaction in progress".to_string())?;
        pending.insert(record.key(), record.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), String> {
        if self.pending.is_none() {
            return Err("no transaction in progress".to_string());
        }
        if lock(&self.shared.faults)?.fail_commit {
            return Err("injected commit failure".to_string());
        }
        let pending = self.pending.take().unwrap_or_default();
        lock(&self.shared.tables)?.grades.extend(pending);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), String> {
        self.pending = None;
        if lock(&self.shared.faults)?.fail_rollback {
            return Err("injected rollback failure".to_string());
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.sessions_released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(identity: &str, module: &str, grade: &str) -> GradeRecord {
        GradeRecord {
            identity_number: identity.to_string(),
            display_name: "Ada Lovelace".to_string(),
            module_id: module.to_string(),
            grade_value: grade.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            course_code: "D0009E".to_string(),
        }
    }

    #[test_log::test]
    fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        session.begin().unwrap();
        session.upsert_grade(&record("1", "m1", "G")).unwrap();
        assert!(store.grades().is_empty());
        session.commit().unwrap();
        assert_eq!(store.grades().len(), 1);
    }

    #[test_log::test]
    fn test_rollback_discards_staged_writes() {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        session.begin().unwrap();
        session.upsert_grade(&record("1", "m1", "G")).unwrap();
        session.rollback().unwrap();
        drop(session);
        assert!(store.grades().is_empty());
        assert_eq!(store.sessions_released(), 1);
    }

    #[test_log::test]
    fn test_upsert_without_begin_fails() {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        assert!(session.upsert_grade(&record("1", "m1", "G")).is_err());
    }

    #[test_log::test]
    fn test_lookup_skips_unknown_keys() {
        let store = MemoryStore::new().with_identities([("a", "111")]);
        let entries = store
            .lookup_identities(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity_number, "111");
    }

    #[test_log::test]
    fn test_overlapping_sessions_keep_each_others_rows() {
        let store = MemoryStore::new();
        let mut first = store.open_session().unwrap();
        let mut second = store.open_session().unwrap();
        first.begin().unwrap();
        second.begin().unwrap();
        first.upsert_grade(&record("1", "m1", "G")).unwrap();
        second.upsert_grade(&record("2", "m1", "VG")).unwrap();
        first.commit().unwrap();
        second.commit().unwrap();

        let grades = store.grades();
        assert_eq!(grades.len(), 2);
        assert_eq!(grades[0].identity_number, "1");
        assert_eq!(grades[1].identity_number, "2");
    }

    #[test_log::test]
    fn test_commit_overwrites_only_written_keys() {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        session.begin().unwrap();
        session.upsert_grade(&record("1", "m1", "U")).unwrap();
        session.upsert_grade(&record("2", "m1", "G")).unwrap();
        session.commit().unwrap();

        session.begin().unwrap();
        session.upsert_grade(&record("1", "m1", "VG")).unwrap();
        session.commit().unwrap();

        let grades = store.grades();
        assert_eq!(grades.len(), 2);
        assert_eq!(grades[0].grade_value, "VG");
        assert_eq!(grades[1].grade_value, "G");
    }

    #[test_log::test]
    fn test_failed_commit_keeps_writes_until_rollback() {
        let store = MemoryStore::new();
        store.fail_commit(true);
        let mut session = store.open_session().unwrap();
        session.begin().unwrap();
        session.upsert_grade(&record("1", "m1", "G")).unwrap();
        assert_eq!(session.commit().unwrap_err(), "injected commit failure");
        session.rollback().unwrap();
        assert!(store.grades().is_empty());
    }

    #[test_log::test]
    fn test_failed_begin_leaves_no_transaction() {
        let store = MemoryStore::new();
        store.fail_begin(true);
        let mut session = store.open_session().unwrap();
        assert!(session.begin().is_err());
        assert!(session.upsert_grade(&record("1", "m1", "G")).is_err());
    }

    #[test_log::test]
    fn test_shutdown_refuses_new_sessions() {
        let store = MemoryStore::new();
        let mut open = store.open_session().unwrap();
        store.shutdown();
        assert!(store.open_session().is_err());

        open.begin().unwrap();
        open.upsert_grade(&record("1", "m1", "G")).unwrap();
        open.commit().unwrap();
        assert_eq!(store.grades().len(), 1);
        assert_eq!(store.sessions_opened(), 1);
    }
}
