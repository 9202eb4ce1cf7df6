//! State shared by FieldPulse front ends: the signed-in session and a cached,
//! optionally live view of the document store.

pub mod auth;
pub mod sync;

pub use auth::{
    AuthContext, AuthError, AuthState, FileSessionStore, KeyVerifier, MemorySessionStore,
    PersistedSession, RemoteKeyVerifier, SessionStore, SessionUser, UnverifiedKeyVerifier,
};
pub use sync::{
    DEFAULT_PAGE_SIZE, LoadingFlag, SyncContext, SyncError, SyncOptions, SyncSnapshot, SyncedEntity,
};
