use crate::error::{EngineError, ErrorCode};
use crate::model::CaseId;
use std::{
    collections::HashSet,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Per-case lock errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    Timeout { case_id: CaseId, waited: Duration },
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::StoreTimeout,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { case_id, waited } => {
                write!(
                    f,
                    "{}: lock on {case_id} timed out after {waited:?}",
                    self.code().code()
                )
            }
        }
    }
}

impl std::error::Error for LockError {}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { case_id, waited } => Self::Timeout {
                resource: format!("case {case_id}"),
                waited,
            },
        }
    }
}

/// In-process mutual exclusion keyed by case id.
///
/// At most one guard per case exists at a time. Cases that are not locked
/// cost nothing; the held set only contains ids with a live guard.
#[derive(Debug, Default)]
pub struct CaseLocks {
    held: Mutex<HashSet<CaseId>>,
    released: Condvar,
}

impl CaseLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `case_id`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if another guard for the same case is
    /// still alive when the timeout elapses.
    pub fn acquire(&self, case_id: &CaseId, timeout: Duration) -> Result<CaseGuard<'_>, LockError> {
        let start = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        while held.contains(case_id) {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    case_id: case_id.clone(),
                    waited,
                });
            }
            held = self
                .released
                .wait_timeout(held, timeout - waited)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        held.insert(case_id.clone());
        Ok(CaseGuard {
            locks: self,
            case_id: case_id.clone(),
        })
    }

    /// Whether a guard for `case_id` is currently alive.
    #[must_use]
    pub fn is_locked(&self, case_id: &CaseId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(case_id)
    }
}

/// RAII guard for one case. Release also happens automatically on drop.
#[derive(Debug)]
pub struct CaseGuard<'a> {
    locks: &'a CaseLocks,
    case_id: CaseId,
}

impl CaseGuard<'_> {
    /// Explicitly release the lock.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub const fn case_id(&self) -> &CaseId {
        &self.case_id
    }
}

impl Drop for CaseGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.case_id);
        drop(held);
        self.locks.released.notify_all();
    }
}
