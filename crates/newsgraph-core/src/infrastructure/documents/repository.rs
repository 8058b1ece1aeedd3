//! SQLite implementation of the DocumentRepository
//!
//! Chunk vectors live in a BLOB column; search is a full in-memory cosine
//! scan.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::embedding::cosine_similarity;
use crate::domain::knowledge::{ArticleChunk, ChunkMatch, DocumentRepository};
use crate::error::{Error, Result};
use crate::infrastructure::embedding_blob::{decode_embedding, encode_embedding};

/// SQLite implementation of the document repository
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    /// Create a new SQLite document repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn save_chunk(&self, chunk: &ArticleChunk) -> Result<()> {
        if chunk.content.trim().is_empty() {
            return Err(Error::InvalidRecord(format!(
                "chunk {} has no content",
                chunk.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO article_chunks (
                id, article_id, chunk_index, content, embedding, backend, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_id, chunk_index) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                backend = excluded.backend
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.article_id)
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.content)
        .bind(chunk.embedding.as_deref().map(encode_embedding))
        .bind(&chunk.backend)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(chunk_id = %chunk.id, "Chunk saved");
        Ok(())
    }

    async fn list_chunks(&self, article_id: &str) -> Result<Vec<ArticleChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT id, article_id, chunk_index, content, embedding, backend
            FROM article_chunks
            WHERE article_id = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
    }

    async fn first_chunk(&self, article_id: &str) -> Result<Option<ChunkMatch>> {
        let row: Option<MatchRow> = sqlx::query_as(
            r#"
            SELECT c.article_id, COALESCE(a.title, '') AS title, c.chunk_index, c.content, c.embedding
            FROM article_chunks c
            LEFT JOIN articles a ON a.id = c.article_id
            WHERE c.article_id = ?
            ORDER BY c.chunk_index
            LIMIT 1
            "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_match(0.0)))
    }

    async fn search_chunks(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ChunkMatch>> {
        if query_embedding.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<MatchRow> = sqlx::query_as(
            r#"
            SELECT c.article_id, COALESCE(a.title, '') AS title, c.chunk_index, c.content, c.embedding
            FROM article_chunks c
            LEFT JOIN articles a ON a.id = c.article_id
            WHERE c.embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut skipped = 0usize;
        let mut matches: Vec<ChunkMatch> = Vec::new();
        for row in rows {
            let vector = row.embedding.as_deref().map(decode_embedding).unwrap_or_default();
            if vector.len() != query_embedding.len() {
                skipped += 1;
                continue;
            }
            let score = cosine_similarity(query_embedding, &vector);
            matches.push(row.into_match(score));
        }

        if skipped > 0 {
            debug!(skipped, "Skipped chunks with mismatched embedding dimensions");
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct ChunkRow {
    id: String,
    article_id: String,
    chunk_index: i64,
    content: String,
    embedding: Option<Vec<u8>>,
    backend: Option<String>,
}

impl ChunkRow {
    fn into_chunk(self) -> ArticleChunk {
        ArticleChunk {
            id: self.id,
            article_id: self.article_id,
            chunk_index: self.chunk_index.max(0) as u32,
            content: self.content,
            embedding: self.embedding.as_deref().map(decode_embedding),
            backend: self.backend,
        }
    }
}

#[derive(Debug, FromRow)]
struct MatchRow {
    article_id: String,
    title: String,
    chunk_index: i64,
    content: String,
    embedding: Option<Vec<u8>>,
}

impl MatchRow {
    fn into_match(self, score: f32) -> ChunkMatch {
        ChunkMatch {
            article_id: self.article_id,
            article_title: self.title,
            chunk_index: self.chunk_index.max(0) as u32,
            content: self.content,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Article, GraphRepository};
    use crate::infrastructure::knowledge::SqliteGraphRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> (SqliteDocumentRepository, SqliteGraphRepository) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        (
            SqliteDocumentRepository::new(pool.clone()),
            SqliteGraphRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn test_save_and_list_chunks() {
        let (docs, graph) = setup_test_db().await;
        graph
            .save_article(&Article::new("art-1", "Funding news"))
            .await
            .unwrap();

        docs.save_chunk(&ArticleChunk::new("art-1", 1, "second")).await.unwrap();
        docs.save_chunk(&ArticleChunk::new("art-1", 0, "first").with_embedding(vec![1.0, 0.0], "m"))
            .await
            .unwrap();

        let chunks = docs.list_chunks("art-1").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first");
        assert_eq!(chunks[0].embedding.as_deref(), Some(&[1.0, 0.0][..]));
        assert!(chunks[1].embedding.is_none());

        let first = docs.first_chunk("art-1").await.unwrap().unwrap();
        assert_eq!(first.chunk_index, 0);
        assert_eq!(first.article_title, "Funding news");
        assert!(docs.first_chunk("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_chunk_rejected() {
        let (docs, graph) = setup_test_db().await;
        graph.save_article(&Article::new("art-1", "t")).await.unwrap();

        let result = docs.save_chunk(&ArticleChunk::new("art-1", 0, "  ")).await;
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_search_chunks_skips_mismatched_dimensions() {
        let (docs, graph) = setup_test_db().await;
        for id in ["a", "b", "c"] {
            graph.save_article(&Article::new(id, id.to_uppercase())).await.unwrap();
        }

        docs.save_chunk(&ArticleChunk::new("a", 0, "close").with_embedding(vec![1.0, 0.1], "m1"))
            .await
            .unwrap();
        docs.save_chunk(&ArticleChunk::new("b", 0, "far").with_embedding(vec![0.0, 1.0], "m1"))
            .await
            .unwrap();
        docs.save_chunk(&ArticleChunk::new("c", 0, "other backend").with_embedding(vec![1.0, 0.0, 0.0], "m2"))
            .await
            .unwrap();

        let results = docs.search_chunks(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].article_id, "a");
        assert_eq!(results[0].article_title, "A");
        assert!(results[0].score > results[1].score);

        let results = docs.search_chunks(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(docs.search_chunks(&[], 10).await.unwrap().is_empty());
    }
}
