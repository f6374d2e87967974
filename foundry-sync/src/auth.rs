//! Authentication gate.
//!
//! Sign-in itself happens outside the sync layer; the engine only asks
//! whether a session is currently usable.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the remote store can currently be reached as a signed-in
/// user.
pub trait AuthState: Send + Sync {
    /// Returns whether a session is active.
    fn is_authenticated(&self) -> bool;
}

/// A flag toggled by the application's sign-in flow.
#[derive(Debug, Default)]
pub struct AuthFlag(AtomicBool);

impl AuthFlag {
    /// Creates a flag in the given state.
    pub fn new(authenticated: bool) -> Self {
        Self(AtomicBool::new(authenticated))
    }

    /// Records a sign-in or sign-out.
    pub fn set(&self, authenticated: bool) {
        self.0.store(authenticated, Ordering::SeqCst);
    }
}

impl AuthState for AuthFlag {
    fn is_authenticated(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
