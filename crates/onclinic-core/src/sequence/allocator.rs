//! Optimistic sequence allocator.

use rand::Rng;
use serde::Serialize;

use super::{
    AllocationStrategy, ScopeKey, SequenceError, SequenceResult, SequenceStore, UniqueViolation,
};
use crate::config::SequenceConfig;
use crate::context::CallContext;

/// An identifier handed out by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub identifier: String,
    pub serial: u32,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// False when the identifier came from the random fallback and was never
    /// checked against the store. Treat it as likely-unique, not proven.
    pub verified: bool,
}

/// An allocation together with whatever the commit step produced.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub allocation: Allocation,
    pub value: T,
}

/// Sequence allocator over a [`SequenceStore`].
pub struct SequenceAllocator<'a, S: SequenceStore + ?Sized> {
    store: &'a S,
    strategy: AllocationStrategy,
    max_attempts: u32,
}

impl<'a, S: SequenceStore + ?Sized> SequenceAllocator<'a, S> {
    /// Create an allocator with default settings (scan-verify, 5 attempts).
    pub fn new(store: &'a S) -> Self {
        Self::with_config(store, &SequenceConfig::default())
    }

    pub fn with_config(store: &'a S, config: &SequenceConfig) -> Self {
        Self {
            store,
            strategy: config.strategy,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Reserve the next identifier in `scope` without writing a record.
    ///
    /// The caller must commit a record using the identifier immediately;
    /// until then another caller can compute the same candidate. Prefer
    /// [`allocate_and_commit`](Self::allocate_and_commit), which closes that
    /// window using the store's uniqueness constraint.
    pub fn allocate(&self, scope: &ScopeKey, ctx: &CallContext) -> SequenceResult<Allocation> {
        for attempt in 1..=self.max_attempts {
            ctx.check()?;
            if let Some(allocation) = self.try_candidate(scope, attempt)? {
                return Ok(allocation);
            }
        }
        self.exhausted(scope)
    }

    /// Allocate an identifier and persist a record with it via `commit`.
    ///
    /// A commit that fails with a uniqueness violation means another caller
    /// committed the same identifier first; it counts as a lost race and the
    /// loop retries. Any other commit error is returned unchanged.
    pub fn allocate_and_commit<T, E, F>(
        &self,
        scope: &ScopeKey,
        ctx: &CallContext,
        mut commit: F,
    ) -> Result<Committed<T>, E>
    where
        F: FnMut(&str) -> Result<T, E>,
        E: From<SequenceError> + UniqueViolation,
    {
        for attempt in 1..=self.max_attempts {
            ctx.check().map_err(SequenceError::from)?;

            let Some(allocation) = self.try_candidate(scope, attempt)? else {
                continue;
            };

            match commit(&allocation.identifier) {
                Ok(value) => return Ok(Committed { allocation, value }),
                Err(err) if err.is_unique_violation() => {
                    tracing::debug!(
                        scope = %scope,
                        identifier = %allocation.identifier,
                        attempt,
                        "identifier committed by another caller, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        ctx.check().map_err(SequenceError::from)?;
        let allocation = self.exhausted(scope)?;
        match commit(&allocation.identifier) {
            Ok(value) => Ok(Committed { allocation, value }),
            Err(err) if err.is_unique_violation() => Err(SequenceError::ExhaustedRetries {
                scope: scope.prefix().to_string(),
                attempts: allocation.attempts,
            }
            .into()),
            Err(err) => Err(err),
        }
    }

    /// One allocation attempt. `None` means the candidate was lost to a
    /// concurrent caller.
    fn try_candidate(&self, scope: &ScopeKey, attempt: u32) -> SequenceResult<Option<Allocation>> {
        match self.strategy {
            AllocationStrategy::ScanVerify => {
                let serial = next_serial(scope, self.max_serial(scope)?)?;
                let candidate = scope.format(serial);

                if self.store.identifier_exists(scope.category(), &candidate)? {
                    tracing::debug!(
                        scope = %scope,
                        candidate = %candidate,
                        attempt,
                        "candidate taken before verification, rescanning"
                    );
                    return Ok(None);
                }

                tracing::debug!(scope = %scope, identifier = %candidate, attempt, "allocated");
                Ok(Some(Allocation {
                    identifier: candidate,
                    serial,
                    attempts: attempt,
                    verified: true,
                }))
            }
            AllocationStrategy::Counter => {
                let current = self.store.read_counter(scope)?;
                // First use of the scope: start after anything already issued.
                let base = match current {
                    Some(last) => last,
                    None => self.max_serial(scope)?,
                };
                let serial = next_serial(scope, base)?;

                if !self.store.compare_and_set_counter(scope, current, serial)? {
                    tracing::debug!(scope = %scope, attempt, "counter moved, retrying");
                    return Ok(None);
                }

                // Records written outside the counter (scan-verify callers, a
                // strategy switch) can leave it behind the issued set.
                let candidate = scope.format(serial);
                if self.store.identifier_exists(scope.category(), &candidate)? {
                    let issued = self.max_serial(scope)?;
                    if issued > serial {
                        // A lost swap here means someone else already moved it forward.
                        self.store.compare_and_set_counter(scope, Some(serial), issued)?;
                    }
                    tracing::warn!(
                        scope = %scope,
                        candidate = %candidate,
                        issued,
                        "sequence counter behind issued identifiers, reseeding"
                    );
                    return Ok(None);
                }

                tracing::debug!(scope = %scope, serial, attempt, "allocated");
                Ok(Some(Allocation {
                    identifier: candidate,
                    serial,
                    attempts: attempt,
                    verified: true,
                }))
            }
        }
    }

    /// Largest well-formed serial issued in `scope`, or 0.
    fn max_serial(&self, scope: &ScopeKey) -> SequenceResult<u32> {
        let issued = self.store.scan_identifiers(scope.category(), scope.prefix())?;
        Ok(issued
            .iter()
            .filter_map(|identifier| scope.parse_serial(identifier))
            .max()
            .unwrap_or(0))
    }

    /// Scan-verify falls back to a random 4-digit suffix whatever the
    /// category's serial width, so a prescription fallback is one digit
    /// longer than its regular serials. Counter never falls back.
    fn exhausted(&self, scope: &ScopeKey) -> SequenceResult<Allocation> {
        match self.strategy {
            AllocationStrategy::ScanVerify => {
                let suffix: u32 = rand::thread_rng().gen_range(1000..=9999);
                let identifier = format!("{}{}", scope.prefix(), suffix);
                tracing::warn!(
                    scope = %scope,
                    attempts = self.max_attempts,
                    identifier = %identifier,
                    "sequence retries exhausted, issuing unverified random suffix"
                );
                Ok(Allocation {
                    identifier,
                    serial: suffix,
                    attempts: self.max_attempts + 1,
                    verified: false,
                })
            }
            AllocationStrategy::Counter => {
                tracing::warn!(scope = %scope, attempts = self.max_attempts, "sequence counter contended");
                Err(SequenceError::ExhaustedRetries {
                    scope: scope.prefix().to_string(),
                    attempts: self.max_attempts,
                })
            }
        }
    }
}

fn next_serial(scope: &ScopeKey, last: u32) -> SequenceResult<u32> {
    last.checked_add(1)
        .ok_or_else(|| SequenceError::SerialOverflow(scope.prefix().to_string()))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::context::Interrupted;
    use crate::db::{DbError, DbResult};
    use crate::sequence::{Category, IdentifierFormat};

    /// In-memory store that can simulate a competing writer.
    #[derive(Default)]
    struct FakeStore {
        issued: RefCell<Vec<String>>,
        counters: RefCell<HashMap<String, u32>>,
        /// Identifiers a "competitor" commits right after each scan.
        competitor: RefCell<Vec<String>>,
        scans: Cell<u32>,
    }

    impl FakeStore {
        fn with_issued(ids: &[&str]) -> Self {
            let store = Self::default();
            store.issued.borrow_mut().extend(ids.iter().map(|s| s.to_string()));
            store
        }
    }

    impl SequenceStore for FakeStore {
        fn scan_identifiers(&self, _category: Category, prefix: &str) -> DbResult<Vec<String>> {
            self.scans.set(self.scans.get() + 1);
            let result = self
                .issued
                .borrow()
                .iter()
                .filter(|id| id.starts_with(prefix))
                .cloned()
                .collect();
            if let Some(id) = self.competitor.borrow_mut().pop() {
                self.issued.borrow_mut().push(id);
            }
            Ok(result)
        }

        fn identifier_exists(&self, _category: Category, identifier: &str) -> DbResult<bool> {
            Ok(self.issued.borrow().iter().any(|id| id == identifier))
        }

        fn read_counter(&self, scope: &ScopeKey) -> DbResult<Option<u32>> {
            Ok(self.counters.borrow().get(scope.prefix()).copied())
        }

        fn compare_and_set_counter(&self, scope: &ScopeKey, expected: Option<u32>, new: u32) -> DbResult<bool> {
            let mut counters = self.counters.borrow_mut();
            if counters.get(scope.prefix()).copied() != expected {
                return Ok(false);
            }
            counters.insert(scope.prefix().to_string(), new);
            Ok(true)
        }
    }

    fn clinic_scope() -> ScopeKey {
        IdentifierFormat::default().scope(
            Category::ClinicBill,
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        )
    }

    fn counter_config() -> SequenceConfig {
        SequenceConfig {
            strategy: AllocationStrategy::Counter,
            ..SequenceConfig::default()
        }
    }

    #[test]
    fn test_empty_scope_starts_at_one() {
        let store = FakeStore::default();
        let allocator = SequenceAllocator::new(&store);

        let allocation = allocator.allocate(&clinic_scope(), &CallContext::background()).unwrap();
        assert_eq!(allocation.identifier, "ON-2405-0001");
        assert_eq!(allocation.attempts, 1);
        assert!(allocation.verified);
    }

    #[test]
    fn test_continues_after_max_and_ignores_malformed() {
        let store = FakeStore::with_issued(&[
            "ON-2405-0001",
            "ON-2405-0009",
            "ON-2405-00x7",
            "ON-2405-",
            "ON-2404-0500",
        ]);
        let allocator = SequenceAllocator::new(&store);

        let allocation = allocator.allocate(&clinic_scope(), &CallContext::background()).unwrap();
        assert_eq!(allocation.identifier, "ON-2405-0010");
    }

    #[test]
    fn test_rescans_when_candidate_taken_before_verify() {
        let store = FakeStore::with_issued(&["ON-2405-0001"]);
        store.competitor.borrow_mut().push("ON-2405-0002".into());
        let allocator = SequenceAllocator::new(&store);

        let allocation = allocator.allocate(&clinic_scope(), &CallContext::background()).unwrap();
        assert_eq!(allocation.identifier, "ON-2405-0003");
        assert_eq!(allocation.attempts, 2);
        assert_eq!(store.scans.get(), 2);
    }

    #[test]
    fn test_random_fallback_after_exhaustion() {
        let store = FakeStore::default();
        // A competitor wins every race.
        for serial in (1..=5).rev() {
            store.competitor.borrow_mut().push(format!("ON-2405-{:04}", serial));
        }
        let allocator = SequenceAllocator::new(&store);

        let allocation = allocator.allocate(&clinic_scope(), &CallContext::background()).unwrap();
        assert!(!allocation.verified);
        assert_eq!(allocation.attempts, 6);
        assert!(allocation.identifier.starts_with("ON-2405-"));
        assert!((1000..=9999).contains(&allocation.serial));
    }

    #[test]
    fn test_commit_retries_on_unique_violation() {
        let store = FakeStore::default();
        let allocator = SequenceAllocator::new(&store);
        let mut calls = 0;

        let committed = allocator
            .allocate_and_commit(&clinic_scope(), &CallContext::background(), |id| {
                calls += 1;
                if calls == 1 {
                    // Someone else inserted this number between verify and commit.
                    store.issued.borrow_mut().push(id.to_string());
                    return Err(unique_violation());
                }
                store.issued.borrow_mut().push(id.to_string());
                Ok::<_, SequenceError>(id.to_string())
            })
            .unwrap();

        assert_eq!(committed.value, "ON-2405-0002");
        assert_eq!(committed.allocation.attempts, 2);
    }

    #[test]
    fn test_commit_propagates_other_errors() {
        let store = FakeStore::default();
        let allocator = SequenceAllocator::new(&store);

        let result = allocator.allocate_and_commit(&clinic_scope(), &CallContext::background(), |_| {
            Err::<(), _>(SequenceError::Database(DbError::NotFound("patient".into())))
        });
        assert!(matches!(
            result,
            Err(SequenceError::Database(DbError::NotFound(_)))
        ));
    }

    #[test]
    fn test_commit_exhausted_when_fallback_collides() {
        let store = FakeStore::default();
        let allocator = SequenceAllocator::new(&store);

        let result = allocator.allocate_and_commit(&clinic_scope(), &CallContext::background(), |_| {
            Err::<(), _>(unique_violation())
        });
        assert!(matches!(
            result,
            Err(SequenceError::ExhaustedRetries { attempts: 6, .. })
        ));
    }

    #[test]
    fn test_counter_seeds_from_existing_records() {
        let store = FakeStore::with_issued(&["ON-2405-0041"]);
        let allocator = SequenceAllocator::with_config(&store, &counter_config());
        let ctx = CallContext::background();

        assert_eq!(allocator.allocate(&clinic_scope(), &ctx).unwrap().identifier, "ON-2405-0042");
        assert_eq!(allocator.allocate(&clinic_scope(), &ctx).unwrap().identifier, "ON-2405-0043");
        assert_eq!(store.read_counter(&clinic_scope()).unwrap(), Some(43));
    }

    #[test]
    fn test_counter_reseeds_past_identifiers_issued_elsewhere() {
        let store = FakeStore::with_issued(&["ON-2405-0001"]);
        let allocator = SequenceAllocator::with_config(&store, &counter_config());
        let ctx = CallContext::background();
        assert_eq!(allocator.allocate(&clinic_scope(), &ctx).unwrap().identifier, "ON-2405-0002");

        // Scan-verify callers commit 0002..=0009 without touching the counter.
        for serial in 2..=9 {
            store.issued.borrow_mut().push(format!("ON-2405-{:04}", serial));
        }

        let allocation = allocator.allocate(&clinic_scope(), &ctx).unwrap();
        assert_eq!(allocation.identifier, "ON-2405-0010");
        assert_eq!(allocation.attempts, 2);
        assert!(allocation.verified);
        assert_eq!(store.read_counter(&clinic_scope()).unwrap(), Some(10));
    }

    #[test]
    fn test_counter_never_falls_back() {
        struct AlwaysLoses;
        impl SequenceStore for AlwaysLoses {
            fn scan_identifiers(&self, _: Category, _: &str) -> DbResult<Vec<String>> {
                Ok(Vec::new())
            }
            fn identifier_exists(&self, _: Category, _: &str) -> DbResult<bool> {
                Ok(false)
            }
            fn read_counter(&self, _: &ScopeKey) -> DbResult<Option<u32>> {
                Ok(Some(7))
            }
            fn compare_and_set_counter(&self, _: &ScopeKey, _: Option<u32>, _: u32) -> DbResult<bool> {
                Ok(false)
            }
        }

        let allocator = SequenceAllocator::with_config(&AlwaysLoses, &counter_config());
        let result = allocator.allocate(&clinic_scope(), &CallContext::background());
        assert!(matches!(
            result,
            Err(SequenceError::ExhaustedRetries { attempts: 5, .. })
        ));
    }

    #[test]
    fn test_cancelled_context_stops_before_any_read() {
        let store = FakeStore::default();
        let allocator = SequenceAllocator::new(&store);
        let flag = Arc::new(AtomicBool::new(true));
        let ctx = CallContext::background().with_cancel_flag(flag);

        let result = allocator.allocate(&clinic_scope(), &ctx);
        assert!(matches!(
            result,
            Err(SequenceError::Interrupted(Interrupted::Cancelled))
        ));
        assert_eq!(store.scans.get(), 0);
    }

    fn unique_violation() -> SequenceError {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        SequenceError::Database(DbError::from(err))
    }
}
