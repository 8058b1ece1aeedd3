//! Article chunk storage
//!
//! SQLite implementation of the document repository used by vector
//! retrieval.

mod repository;

pub use repository::SqliteDocumentRepository;
