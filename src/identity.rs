//! Login for in-app clients.
//!
//! A login checks the roster, resolves the user in the remote directory
//! (creating it on first use) and issues a client token bound to the name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::directory::Directory;
use crate::error::IdentityError;
use crate::roster::Roster;
use crate::token::TokenIssuer;

/// Outcome of resolving a name in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserResolution {
    /// An entry already existed.
    Found(String),
    /// No entry existed, one was created.
    Created(String),
    /// Both lookup and creation failed.
    Failed,
}

impl UserResolution {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            UserResolution::Found(id) | UserResolution::Created(id) => Some(id),
            UserResolution::Failed => None,
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub name: String,
    /// `None` when the directory could not be reached; the token is still valid.
    pub user_id: Option<String>,
    pub token: String,
}

pub struct IdentityBroker {
    roster: Arc<Roster>,
    directory: Arc<dyn Directory>,
    tokens: TokenIssuer,
    /// One lock per roster name so concurrent logins never double-create.
    resolve_locks: HashMap<String, Arc<Mutex<()>>>,
}

impl IdentityBroker {
    pub fn new(roster: Arc<Roster>, directory: Arc<dyn Directory>, tokens: TokenIssuer) -> Self {
        let resolve_locks = roster
            .names()
            .iter()
            .map(|name| (name.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            roster,
            directory,
            tokens,
            resolve_locks,
        }
    }

    /// Log in `name`. Callers normalise case before calling.
    pub async fn login(&self, name: &str) -> Result<LoginGrant, IdentityError> {
        if !self.roster.contains(name) {
            warn!(name, "Login rejected, user not on roster");
            return Err(IdentityError::Unauthorized {
                name: name.to_string(),
            });
        }

        let resolution = self.resolve_or_create(name).await;
        if resolution == UserResolution::Failed {
            warn!(name, "Directory unavailable, issuing token without user id");
        }

        let token = self.tokens.client_token(Some(name))?;
        info!(name, user_id = ?resolution.user_id(), "User logged in");

        Ok(LoginGrant {
            name: name.to_string(),
            user_id: resolution.user_id().map(str::to_string),
            token,
        })
    }

    /// Look `name` up in the directory, creating it when absent.
    pub async fn resolve_or_create(&self, name: &str) -> UserResolution {
        let _guard = match self.resolve_locks.get(name) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        match self.directory.find_user(name).await {
            Ok(Some(id)) => return UserResolution::Found(id),
            Ok(None) => info!(name, "User not in directory, creating"),
            Err(e) => warn!(name, error = %e, "Directory lookup failed, trying create"),
        }

        match self.directory.create_user(name).await {
            Ok(id) => {
                info!(name, id = %id, "Directory user created");
                UserResolution::Created(id)
            }
            Err(e) => {
                warn!(name, error = %e, "Directory create failed");
                UserResolution::Failed
            }
        }
    }
}
