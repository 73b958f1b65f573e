/// SHARED STAKING ENGINE
///
/// Thread-safe handle around a `StakingEngine`. Operations from different threads
/// are serialized by a reentrant lock in submission order. A nested call on the
/// thread that already holds the engine (a collaborator calling back into staking
/// during an operation) re-acquires the lock but fails to borrow the engine and is
/// rejected with `StakingError::Reentrant`.

use crate::engine::StakingEngine;
use crate::error::StakingError;
use log::warn;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;

#[derive(Clone)]
pub struct SharedStakingEngine {
    inner: Arc<ReentrantMutex<RefCell<StakingEngine>>>,
}

impl SharedStakingEngine {
    pub fn new(engine: StakingEngine) -> Self {
        SharedStakingEngine {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(engine))),
        }
    }

    /// Run a mutating operation with exclusive access to the engine.
    pub fn execute<T, F>(&self, op: F) -> Result<T, StakingError>
    where
        F: FnOnce(&mut StakingEngine) -> Result<T, StakingError>,
    {
        let guard = self.inner.lock();
        let mut engine = guard.try_borrow_mut().map_err(|_| {
            warn!("Rejected re-entrant staking call");
            StakingError::Reentrant
        })?;
        op(&mut engine)
    }

    /// Run a read-only query. Also rejected while an operation is in flight on
    /// this thread, since state is mid-update.
    pub fn read<T, F>(&self, query: F) -> Result<T, StakingError>
    where
        F: FnOnce(&StakingEngine) -> T,
    {
        let guard = self.inner.lock();
        let engine = guard.try_borrow().map_err(|_| StakingError::Reentrant)?;
        Ok(query(&engine))
    }

    pub fn state_hash(&self) -> Result<String, StakingError> {
        self.read(|engine| engine.state_hash())?
    }

    pub fn verify_invariants(&self) -> Result<(), StakingError> {
        self.read(|engine| engine.verify_invariants())?
    }
}

impl std::fmt::Debug for SharedStakingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStakingEngine")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
