//! Logout: best-effort revocation of a signaling-plane session.

use std::sync::Arc;

use tracing::{info, warn};

use crate::directory::Directory;

pub struct SessionTerminator {
    directory: Arc<dyn Directory>,
}

impl SessionTerminator {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Revoke `session`. Failures are logged and swallowed; logout always
    /// succeeds from the client's point of view.
    pub async fn logout(&self, user: Option<&str>, session: &str) {
        if !is_session_id(session) {
            warn!(user = ?user, session, "Ignoring logout with malformed session id");
            return;
        }
        info!(user = ?user, session, "Deleting session");
        if let Err(e) = self.directory.delete_session(session).await {
            warn!(session, error = %e, "Session deletion failed");
        }
    }
}

/// Session ids are opaque single path segments.
pub fn is_session_id(session: &str) -> bool {
    !session.is_empty()
        && !matches!(session, "." | "..")
        && !session.contains(['/', '\\'])
}
