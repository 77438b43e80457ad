use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::engine::EngineSession;
use crate::errors::{Result, RtcError};
use crate::negotiation::Negotiation;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Uniquely owned engine session. Dropping it releases the engine side.
pub(crate) struct EngineHandle {
    id: u64,
    session: Box<dyn EngineSession>,
}

impl EngineHandle {
    pub(crate) fn new(session: Box<dyn EngineSession>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            session,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        log::info!("Releasing engine session {}", self.id);
        self.session.release();
    }
}

struct HandleState {
    /// `None` once released.
    engine: Option<EngineHandle>,
    negotiation: Negotiation,
}

/// The handle lock: guards the engine session and everything derived from it.
pub(crate) struct SessionHandle {
    id: u64,
    state: Mutex<HandleState>,
}

impl SessionHandle {
    pub(crate) fn new(engine: EngineHandle) -> Self {
        Self {
            id: engine.id(),
            state: Mutex::new(HandleState {
                engine: Some(engine),
                negotiation: Negotiation::Idle,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> Result<MutexGuard<'_, HandleState>> {
        self.state.lock().map_err(|_| RtcError::poisoned_lock())
    }

    /// Run `f` under the handle lock with the live engine session.
    ///
    /// Fails with `Closed` after release; the engine is never touched then.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&mut dyn EngineSession, &mut Negotiation) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let engine = state.engine.as_mut().ok_or_else(RtcError::closed)?;
        f(engine.session.as_mut(), &mut state.negotiation)
    }

    /// Read negotiation state under the handle lock without touching the engine.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Negotiation) -> T) -> Result<T> {
        let guard = self.lock()?;
        if guard.engine.is_none() {
            return Err(RtcError::closed());
        }
        Ok(f(&guard.negotiation))
    }

    /// Release the engine session. Returns `false` if it was already released.
    ///
    /// `on_release` runs under the handle lock just before the engine is freed.
    pub(crate) fn release(&self, on_release: impl FnOnce()) -> bool {
        // Release must go through even if a caller panicked under the lock.
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let Some(engine) = guard.engine.take() else {
            return false;
        };
        guard.negotiation = Negotiation::Idle;
        on_release();
        drop(engine);
        true
    }

    pub(crate) fn is_released(&self) -> bool {
        self.state
            .lock()
            .map(|g| g.engine.is_none())
            .unwrap_or_else(|p| p.into_inner().engine.is_none())
    }
}
