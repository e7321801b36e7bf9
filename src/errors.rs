use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Filter parse error: {0}")]
    FilterParse(String),

    #[error("Sort parse error: {0}")]
    SortParse(String),

    #[error("Projection parse error: {0}")]
    ProjectionParse(String),

    #[error("Index creation error: {0}")]
    IndexCreation(String),

    #[error("Index not found: {0}")]
    NoSuchIndex(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query cancelled: {0}")]
    Cancelled(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Document already exists: {0}")]
    DuplicateDocument(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stats encode error: {0}")]
    StatsEncode(#[from] bincode::error::EncodeError),

    #[error("Stats decode error: {0}")]
    StatsDecode(#[from] bincode::error::DecodeError),
}

impl DbError {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub(crate) fn filter(msg: impl Into<String>) -> Self {
        Self::FilterParse(msg.into())
    }
}
