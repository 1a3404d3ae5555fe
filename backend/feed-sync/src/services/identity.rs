//! Viewer identity seam
//!
//! Session handling lives outside the engine; the engine only asks who the
//! viewer is at the start of each action.

use parking_lot::RwLock;

use crate::models::ViewerId;

pub trait IdentityProvider: Send + Sync {
    /// `None` for a guest viewer
    fn current_viewer(&self) -> Option<ViewerId>;

    /// Registered handle of the current viewer, when known
    fn current_handle(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
struct Session {
    viewer: ViewerId,
    handle: Option<String>,
}

/// Mutable sign-in state shared between the session layer and the engine
#[derive(Debug, Default)]
pub struct SessionIdentity {
    session: RwLock<Option<Session>>,
}

impl SessionIdentity {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn signed_in(viewer: ViewerId, handle: Option<String>) -> Self {
        Self {
            session: RwLock::new(Some(Session { viewer, handle })),
        }
    }

    pub fn sign_in(&self, viewer: ViewerId, handle: Option<String>) {
        *self.session.write() = Some(Session { viewer, handle });
    }

    pub fn sign_out(&self) {
        *self.session.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_viewer(&self) -> Option<ViewerId> {
        self.session.read().as_ref().map(|s| s.viewer.clone())
    }

    fn current_handle(&self) -> Option<String> {
        self.session.read().as_ref().and_then(|s| s.handle.clone())
    }
}
