use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use fieldpulse_api_client::FieldPulseClient;
use fieldpulse_domain::records::{User, UserRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LOG_TARGET: &str = "fieldpulse.auth";

pub const DEMO_MODE_KEY: &str = "fieldpulse_demo_mode";
pub const API_KEY_KEY: &str = "fieldpulse_api_key";
pub const MISSING_KEY_MESSAGE: &str = "API key is required";
pub const REJECTED_KEY_MESSAGE: &str = "Invalid API key or unable to connect to FieldPulse API";

const DEMO_MARKER: &str = "true";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl SessionUser {
    pub fn demo() -> Self {
        Self {
            id: "demo".to_string(),
            name: "Demo User".to_string(),
            email: "demo@fieldpulse.com".to_string(),
        }
    }

    /// Stand-in identity for a key whose account lists no users.
    pub fn api_fallback() -> Self {
        Self {
            id: "1".to_string(),
            name: "API User".to_string(),
            email: "user@company.com".to_string(),
        }
    }
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated { error: Option<String> },
    Authenticating,
    AuthenticatedDemo { user: SessionUser },
    AuthenticatedReal { user: SessionUser },
}

impl Default for AuthState {
    fn default() -> Self {
        Self::Unauthenticated { error: None }
    }
}

impl AuthState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::AuthenticatedDemo { user } | Self::AuthenticatedReal { user } => Some(user),
            Self::Unauthenticated { .. } | Self::Authenticating => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Self::AuthenticatedDemo { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Authenticating)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated { error } => error.as_deref(),
            _ => None,
        }
    }

    fn rejected(message: &str) -> Self {
        Self::Unauthenticated {
            error: Some(message.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Rejected { message: String },
    #[error("session storage failed: {message}")]
    Session { message: String },
}

/// The markers kept between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(
        rename = "fieldpulse_demo_mode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub demo_mode: Option<String>,
    #[serde(
        rename = "fieldpulse_api_key",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,
}

impl PersistedSession {
    pub fn is_demo(&self) -> bool {
        self.demo_mode.as_deref() == Some(DEMO_MARKER)
    }

    pub fn stored_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

pub trait SessionStore: Send + Sync {
    fn load_session(&self) -> Result<Option<PersistedSession>, AuthError>;
    fn persist_session(&self, session: &PersistedSession) -> Result<(), AuthError>;
    fn clear_session(&self) -> Result<(), AuthError>;
}

/// JSON file holding both markers, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn session_error(action: &str, error: impl std::fmt::Display) -> AuthError {
    AuthError::Session {
        message: format!("failed to {action} session file: {error}"),
    }
}

impl SessionStore for FileSessionStore {
    fn load_session(&self) -> Result<Option<PersistedSession>, AuthError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(session_error("read", error)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| session_error("parse", error))
    }

    fn persist_session(&self, session: &PersistedSession) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| session_error("prepare", error))?;
        }
        let payload =
            serde_json::to_vec_pretty(session).map_err(|error| session_error("encode", error))?;
        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        std::fs::write(&temp_path, payload).map_err(|error| session_error("write", error))?;
        std::fs::rename(&temp_path, &self.path).map_err(|error| session_error("finalize", error))
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(session_error("remove", error)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<PersistedSession>>,
}

impl SessionStore for MemorySessionStore {
    fn load_session(&self) -> Result<Option<PersistedSession>, AuthError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn persist_session(&self, session: &PersistedSession) -> Result<(), AuthError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[async_trait]
pub trait KeyVerifier: Send + Sync {
    async fn verify(&self, api_key: &str) -> Result<SessionUser, AuthError>;
}

/// Checks a key by listing users through the REST API with it.
#[derive(Debug, Clone)]
pub struct RemoteKeyVerifier {
    client: FieldPulseClient,
}

impl RemoteKeyVerifier {
    pub fn new(client: FieldPulseClient) -> Self {
        Self { client }
    }
}

fn pick_session_user(users: &[User]) -> SessionUser {
    users
        .iter()
        .find(|user| user.active && user.role == UserRole::Admin)
        .or_else(|| users.first())
        .map_or_else(SessionUser::api_fallback, SessionUser::from)
}

#[async_trait]
impl KeyVerifier for RemoteKeyVerifier {
    async fn verify(&self, api_key: &str) -> Result<SessionUser, AuthError> {
        let response = self
            .client
            .with_api_key(api_key)
            .list_users()
            .await
            .map_err(|error| {
                tracing::warn!(target: LOG_TARGET, error = %error, "api key verification failed");
                AuthError::Rejected {
                    message: REJECTED_KEY_MESSAGE.to_string(),
                }
            })?;
        if !response.success {
            tracing::warn!(
                target: LOG_TARGET,
                message = response.message.as_deref().unwrap_or_default(),
                "api key verification reported failure",
            );
            return Err(AuthError::Rejected {
                message: REJECTED_KEY_MESSAGE.to_string(),
            });
        }
        Ok(pick_session_user(&response.data))
    }
}

/// Accepts any non-empty key. Only for explicitly offline setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedKeyVerifier;

#[async_trait]
impl KeyVerifier for UnverifiedKeyVerifier {
    async fn verify(&self, api_key: &str) -> Result<SessionUser, AuthError> {
        if api_key.trim().is_empty() {
            return Err(AuthError::Rejected {
                message: MISSING_KEY_MESSAGE.to_string(),
            });
        }
        Ok(SessionUser::api_fallback())
    }
}

pub struct AuthContext {
    state: RwLock<AuthState>,
    sessions: Arc<dyn SessionStore>,
    verifier: Arc<dyn KeyVerifier>,
}

impl AuthContext {
    pub fn new(sessions: Arc<dyn SessionStore>, verifier: Arc<dyn KeyVerifier>) -> Self {
        Self {
            state: RwLock::new(AuthState::default()),
            sessions,
            verifier,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: AuthState) -> AuthState {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }

    fn load_persisted(&self) -> PersistedSession {
        match self.sessions.load_session() {
            Ok(session) => session.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(target: LOG_TARGET, error = %error, "ignoring unreadable session");
                PersistedSession::default()
            }
        }
    }

    fn persist(&self, session: &PersistedSession) {
        if let Err(error) = self.sessions.persist_session(session) {
            tracing::warn!(target: LOG_TARGET, error = %error, "failed to persist session");
        }
    }

    /// Signs in as the fixed demo user without any network call.
    pub fn enable_demo_mode(&self) -> AuthState {
        let mut session = self.load_persisted();
        session.demo_mode = Some(DEMO_MARKER.to_string());
        self.persist(&session);
        tracing::info!(target: LOG_TARGET, "demo mode enabled");
        self.set_state(AuthState::AuthenticatedDemo {
            user: SessionUser::demo(),
        })
    }

    pub async fn login(&self, api_key: &str) -> AuthState {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return self.set_state(AuthState::rejected(MISSING_KEY_MESSAGE));
        }

        self.set_state(AuthState::Authenticating);
        match self.verifier.verify(api_key).await {
            Ok(user) => {
                self.persist(&PersistedSession {
                    demo_mode: None,
                    api_key: Some(api_key.to_string()),
                });
                tracing::info!(target: LOG_TARGET, user_id = %user.id, "signed in with api key");
                self.set_state(AuthState::AuthenticatedReal { user })
            }
            Err(error) => {
                tracing::warn!(target: LOG_TARGET, error = %error, "api key rejected");
                let mut session = self.load_persisted();
                session.api_key = None;
                self.persist(&session);
                self.set_state(AuthState::rejected(REJECTED_KEY_MESSAGE))
            }
        }
    }

    pub fn logout(&self) -> AuthState {
        if let Err(error) = self.sessions.clear_session() {
            tracing::warn!(target: LOG_TARGET, error = %error, "failed to clear session");
        }
        tracing::info!(target: LOG_TARGET, "signed out");
        self.set_state(AuthState::default())
    }

    /// Resumes a previous session: the demo marker wins over a stored key.
    pub async fn restore(&self) -> AuthState {
        let session = self.load_persisted();
        if session.is_demo() {
            return self.enable_demo_mode();
        }
        match session.stored_key() {
            Some(api_key) => {
                let api_key = api_key.to_string();
                self.login(&api_key).await
            }
            None => self.set_state(AuthState::default()),
        }
    }
}
