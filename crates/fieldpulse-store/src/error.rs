use fieldpulse_domain::{Collection, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to encode document: {message}")]
    Encode { message: String },
    #[error("failed to decode {collection} document: {message}")]
    Decode {
        collection: Collection,
        message: String,
    },
    #[error("{message}")]
    Persistence { message: String },
    #[error("document store {path} is held by process {pid}")]
    Held {
        path: String,
        pid: u32,
        endpoint: Option<String>,
    },
}

impl StoreError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
