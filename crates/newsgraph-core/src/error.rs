//! Error types for Newsgraph

use thiserror::Error;

/// Result type alias using Newsgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Newsgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Entity '{0}' not found.")]
    EntityNotFound(String),

    #[error("Article '{0}' not found.")]
    ArticleNotFound(String),

    #[error("Community {0} not found.")]
    CommunityNotFound(i64),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Merge errors (E300-E399)
    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    // Store errors (E400-E499)
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Analytics errors (E500-E599)
    #[error("Graph analytics service unavailable: {0}")]
    AnalyticsUnavailable(String),

    #[error("Community detection failed: {0}")]
    CommunityDetectionFailed(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Cancellation (E700-E799)
    #[error("Operation cancelled")]
    Cancelled,

    // Input errors (E800-E899)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid relationship type '{0}'")]
    InvalidRelationshipType(String),

    #[error("Relationship strength {0} is outside 0-10")]
    StrengthOutOfRange(f64),

    // Embedding errors (E1200-E1299)
    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    // Generic errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error categories callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The graph store cannot be reached; retrieval falls back to vectors
    StoreUnavailable,
    /// A record was rejected before write
    MalformedRecord,
    /// A merge step raced or conflicted
    MergeConflict,
    /// Relationship type or strength rejected at write time
    InvalidRelationship,
    /// Embedding backend missing or failing
    EmbeddingUnavailable,
    /// A community-detection tier failed
    AnalyticsFailure,
    NotFound,
    Configuration,
    Network,
    Cancelled,
    Internal,
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "E001",
            Self::ArticleNotFound(_) => "E002",
            Self::CommunityNotFound(_) => "E003",
            Self::NetworkError(_) => "E100",
            Self::MergeConflict(_) => "E300",
            Self::StoreUnavailable(_) => "E400",
            Self::DatabaseError(_) => "E401",
            Self::AnalyticsUnavailable(_) => "E500",
            Self::CommunityDetectionFailed(_) => "E501",
            Self::ConfigError(_) => "E600",
            Self::Cancelled => "E700",
            Self::InvalidRecord(_) => "E800",
            Self::InvalidRelationshipType(_) => "E801",
            Self::StrengthOutOfRange(_) => "E802",
            Self::EmbeddingUnavailable(_) => "E1200",
            Self::EmbeddingFailed(_) => "E1201",
            Self::Serialization(_) | Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Map this error onto the category taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EntityNotFound(_) | Self::ArticleNotFound(_) | Self::CommunityNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::NetworkError(_) => ErrorCategory::Network,
            Self::MergeConflict(_) => ErrorCategory::MergeConflict,
            Self::StoreUnavailable(_) => ErrorCategory::StoreUnavailable,
            Self::AnalyticsUnavailable(_) | Self::CommunityDetectionFailed(_) => {
                ErrorCategory::AnalyticsFailure
            }
            Self::ConfigError(_) => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::InvalidRecord(_) => ErrorCategory::MalformedRecord,
            Self::InvalidRelationshipType(_) | Self::StrengthOutOfRange(_) => {
                ErrorCategory::InvalidRelationship
            }
            Self::EmbeddingUnavailable(_) | Self::EmbeddingFailed(_) => {
                ErrorCategory::EmbeddingUnavailable
            }
            Self::DatabaseError(_) | Self::Serialization(_) | Self::Other(_) | Self::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether retrieval should degrade to vector-only mode on this error
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::StoreUnavailable(_) => Some("Check the database path in config.toml".to_string()),
            Self::EmbeddingUnavailable(_) => {
                Some("Set NEWSGRAPH_EMBEDDING_API_KEY or start the local model server".to_string())
            }
            Self::AnalyticsUnavailable(_) => {
                Some("Local community detection will be used instead".to_string())
            }
            Self::InvalidRelationshipType(_) => {
                Some("Use one of the 16 relationship types, e.g. FUNDED_BY".to_string())
            }
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                Self::StoreUnavailable("timed out waiting for a connection".to_string())
            }
            sqlx::Error::PoolClosed => Self::StoreUnavailable("connection pool closed".to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::StoreUnavailable("connection failed".to_string())
            }
            other => Self::DatabaseError(other),
        }
    }
}
