use crate::notice::NoticeSink;
use crate::store::StateStore;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

// Shared state of one mounted dashboard. Async work (polls, confirm, reset)
// holds an Arc to it and may finish after the dashboard is gone; every write
// and notice goes through the liveness check so those late results are
// dropped instead of applied.
//
// The store lock is never held across an await.
#[derive(Debug)]
pub struct Session {
    store: Mutex<StateStore>,
    token: CancellationToken,
    notices: NoticeSink,
}

impl Session {
    pub fn new(store: StateStore, notices: NoticeSink) -> Self {
        Self {
            store: Mutex::new(store),
            token: CancellationToken::new(),
            notices,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&StateStore) -> R) -> R {
        f(&self.lock())
    }

    // Runs `f` against the store unless the session has been closed. The
    // check happens under the store lock, so nothing can slip in after
    // close() returns.
    pub fn apply<R>(&self, f: impl FnOnce(&mut StateStore) -> R) -> Option<R> {
        let mut store = self.lock();
        if self.token.is_cancelled() {
            log::debug!("Dropping state update for a closed session");
            return None;
        }
        Some(f(&mut store))
    }

    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    // Cancelled when the session closes. Background tasks select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn close(&self) {
        let _store = self.lock();
        self.token.cancel();
    }

    // Notices take the same lock as apply(), so none is sent once close()
    // has returned. Never call these from inside an apply() closure.
    pub fn notify_success(&self, message: impl Into<String>) {
        self.notify(|notices| notices.success(message));
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.notify(|notices| notices.error(message));
    }

    fn notify(&self, send: impl FnOnce(&NoticeSink)) {
        let _store = self.lock();
        if self.token.is_cancelled() {
            log::debug!("Dropping notice for a closed session");
            return;
        }
        send(&self.notices);
    }
}
