//! Maps auth identities to application profiles and exposes the auth-state
//! subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::backend::auth::{AuthProvider, AuthState, Identity};
use crate::backend::document::{server_timestamp, DocumentStore};
use crate::error::AppError;
use crate::models::user::{ProfileDocument, Role, User};
use crate::store::to_fields;

pub const USERS: &str = "users";

/// Profile of a freshly signed-in user with the bearer token for later calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSession {
    pub token: String,
    #[serde(flatten)]
    pub user: User,
}

#[derive(Clone)]
pub struct ProfileResolver {
    auth: Arc<dyn AuthProvider>,
    documents: Arc<dyn DocumentStore>,
    subscribed: Arc<AtomicBool>,
}

impl ProfileResolver {
    pub fn new(auth: Arc<dyn AuthProvider>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth,
            documents,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Missing profile fields default to an empty name and the customer role.
    pub async fn resolve(&self, identity: &Identity) -> Result<User, AppError> {
        let profile = match self.documents.get(USERS, &identity.uid).await? {
            Some(doc) => serde_json::from_value::<ProfileDocument>(doc.fields.into())
                .map_err(AppError::serialization)?,
            None => ProfileDocument::default(),
        };

        Ok(User {
            id: identity.uid.clone(),
            email: identity.email.clone(),
            name: profile.name,
            role: profile.role,
        })
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<AuthSession, AppError> {
        let identity = self.auth.create_account(email, password).await?;

        let mut fields = to_fields(&json!({
            "email": identity.email,
            "name": name,
            "role": role,
        }))?;
        fields.insert("createdAt".to_string(), server_timestamp());
        self.documents.set(USERS, &identity.uid, fields).await?;

        let session = self.auth.sign_in(email, password).await?;
        info!(uid = %identity.uid, role = ?role, "user signed up");

        Ok(AuthSession {
            token: session.token,
            user: User {
                id: identity.uid,
                email: identity.email,
                name: name.to_string(),
                role,
            },
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let session = self.auth.sign_in(email, password).await?;
        let user = self.resolve(&session.identity).await?;
        Ok(AuthSession {
            token: session.token,
            user,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.auth.sign_out(token).await
    }

    /// The user behind `token`, or `None` for an unknown or ended session.
    pub async fn current(&self, token: &str) -> Result<Option<User>, AppError> {
        match self.auth.current(token) {
            Some(identity) => self.resolve(&identity).await.map(Some),
            None => Ok(None),
        }
    }

    /// Calls `callback` once with the session named by `restore` (or `None`),
    /// then once per sign-in or sign-out anywhere in the process. Only one
    /// subscription may be active at a time; the returned handle ends it when
    /// cancelled or dropped.
    pub fn subscribe<F>(&self, restore: Option<String>, callback: F) -> Result<Subscription, AppError>
    where
        F: Fn(Option<User>) + Send + Sync + 'static,
    {
        if self
            .subscribed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Conflict(
                "an auth state subscription is already active".to_string(),
            ));
        }

        // subscribe before reading the current session so no transition is missed
        let changes = BroadcastStream::new(self.auth.watch());
        let resolver = self.clone();

        let task = tokio::spawn(async move {
            let restored = match restore {
                Some(token) => resolver.current(&token).await,
                None => Ok(None),
            };
            match restored {
                Ok(user) => callback(user),
                Err(err) => error!(error = %err, "failed to resolve restored session"),
            }

            let mut changes = changes;
            while let Some(change) = changes.next().await {
                let state = match change {
                    Ok(state) => state,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth state subscriber lagged");
                        continue;
                    }
                };

                match state {
                    AuthState::SignedOut => callback(None),
                    AuthState::SignedIn(identity) => match resolver.resolve(&identity).await {
                        Ok(user) => callback(Some(user)),
                        Err(err) => error!(uid = %identity.uid, error = %err, "failed to resolve profile"),
                    },
                }
            }
        });

        Ok(Subscription {
            task,
            subscribed: self.subscribed.clone(),
        })
    }
}

/// Handle for the active auth-state subscription.
pub struct Subscription {
    task: JoinHandle<()>,
    subscribed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        self.subscribed.store(false, Ordering::SeqCst);
    }
}
