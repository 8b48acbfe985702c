use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// A signed-in identity plus the bearer token that names its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedIn(Identity),
    SignedOut,
}

/// Email/password identity provider issuing one bearer-token session per
/// sign-in.
///
/// It cannot delete accounts other than through its own console, so nothing
/// in this crate ever removes an identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AppError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;

    /// Ends the session named by `token`. Unknown tokens are ignored.
    async fn sign_out(&self, token: &str) -> Result<(), AppError>;

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<(), AppError>;

    fn current(&self, token: &str) -> Option<Identity>;

    /// Process-wide feed: one event per session started or ended.
    fn watch(&self) -> broadcast::Receiver<AuthState>;
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    /// PHC string, salt included.
    password_hash: String,
    display_name: Option<String>,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }

    fn verify(&self, password: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Internal(format!("password hashing failed: {err}")))
}

fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct MemoryAuthProvider {
    accounts: DashMap<String, Account>,
    sessions: DashMap<String, Identity>,
    events_tx: broadcast::Sender<AuthState>,
}

impl MemoryAuthProvider {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self {
            accounts: DashMap::new(),
            sessions: DashMap::new(),
            events_tx,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let key = account_key(email);
        if !key.contains('@') || password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Unauthorized);
        }
        if self.accounts.contains_key(&key) {
            return Err(AppError::Unauthorized);
        }

        let password_hash = hash_password(password)?;

        match self.accounts.entry(key) {
            Entry::Occupied(_) => Err(AppError::Unauthorized),
            Entry::Vacant(slot) => {
                let account = Account {
                    uid: Uuid::new_v4().simple().to_string(),
                    email: email.trim().to_string(),
                    password_hash,
                    display_name: None,
                };
                let identity = account.identity();
                slot.insert(account);
                debug!(uid = %identity.uid, "account created");
                Ok(identity)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let account = self
            .accounts
            .get(&account_key(email))
            .map(|entry| entry.value().clone())
            .ok_or(AppError::Unauthorized)?;
        if !account.verify(password) {
            return Err(AppError::Unauthorized);
        }

        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            identity: account.identity(),
        };
        self.sessions
            .insert(session.token.clone(), session.identity.clone());
        let _ = self
            .events_tx
            .send(AuthState::SignedIn(session.identity.clone()));

        debug!(uid = %session.identity.uid, "session started");
        Ok(session)
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        if let Some((_, identity)) = self.sessions.remove(token) {
            let _ = self.events_tx.send(AuthState::SignedOut);
            debug!(uid = %identity.uid, "session ended");
        }
        Ok(())
    }

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<(), AppError> {
        let mut account = self
            .accounts
            .get_mut(&account_key(&identity.email))
            .ok_or_else(|| AppError::NotFound(format!("account {} not found", identity.uid)))?;
        account.display_name = Some(name.to_string());
        Ok(())
    }

    fn current(&self, token: &str) -> Option<Identity> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }

    fn watch(&self) -> broadcast::Receiver<AuthState> {
        self.events_tx.subscribe()
    }
}
