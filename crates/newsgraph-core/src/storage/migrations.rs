//! Versioned schema migrations
//!
//! Each migration runs in its own transaction together with its row in
//! `_migrations`, so a failed step leaves the previous version intact.

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{debug, info};

const MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

const GRAPH_SCHEMA: &str = r#"
    -- Entities: one row per (type, normalized name)
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY NOT NULL,
        entity_type TEXT NOT NULL CHECK (entity_type IN (
            'Company', 'Person', 'Investor', 'Technology',
            'Product', 'FundingRound', 'Location', 'Event'
        )),
        name TEXT NOT NULL,
        normalized_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        mention_count INTEGER NOT NULL DEFAULT 1 CHECK (mention_count >= 0),
        source_article_ids TEXT NOT NULL DEFAULT '[]',
        community_id INTEGER,
        enrichment TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
    CREATE INDEX IF NOT EXISTS idx_entities_normalized_name ON entities(normalized_name);
    CREATE INDEX IF NOT EXISTS idx_entities_community ON entities(community_id);

    -- Relationships: unique per (source, target, type)
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY NOT NULL,
        source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        relationship_type TEXT NOT NULL CHECK (relationship_type != 'MENTIONED_IN'),
        description TEXT NOT NULL DEFAULT '',
        strength REAL NOT NULL DEFAULT 5.0 CHECK (strength >= 0.0 AND strength <= 10.0),
        observation_count INTEGER NOT NULL DEFAULT 1 CHECK (observation_count >= 1),
        source_article_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(source_id, target_id, relationship_type)
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
    CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
    CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(relationship_type);

    -- Entity embeddings, tagged with the backend that produced them
    CREATE TABLE IF NOT EXISTS entity_embeddings (
        entity_id TEXT PRIMARY KEY NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        backend TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entity_embeddings_backend ON entity_embeddings(backend);
"#;

const ARTICLE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY NOT NULL,
        url TEXT NOT NULL DEFAULT '',
        title TEXT NOT NULL DEFAULT '',
        published_date TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_date);

    CREATE TABLE IF NOT EXISTS article_chunks (
        id TEXT PRIMARY KEY NOT NULL,
        article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
        content TEXT NOT NULL,
        embedding BLOB,
        backend TEXT,
        created_at TEXT NOT NULL,
        UNIQUE(article_id, chunk_index)
    );

    CREATE INDEX IF NOT EXISTS idx_article_chunks_article ON article_chunks(article_id);
"#;

const BASE_STRENGTH: &str = r#"
    ALTER TABLE relationships ADD COLUMN base_strength REAL NOT NULL DEFAULT 5.0
        CHECK (base_strength >= 0.0 AND base_strength <= 10.0);
    UPDATE relationships SET base_strength = strength;
"#;

/// `(version, name, sql)` in application order
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "knowledge graph", GRAPH_SCHEMA),
    (2, "articles and chunks", ARTICLE_SCHEMA),
    (3, "extracted relationship strength", BASE_STRENGTH),
];

/// Latest schema version
pub const CURRENT_VERSION: i32 = MIGRATIONS[MIGRATIONS.len() - 1].0;

/// Applied and target schema versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
}

impl MigrationStatus {
    pub fn needs_migration(&self) -> bool {
        self.current_version < self.target_version
    }
}

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(MIGRATIONS_TABLE).execute(pool).await?;
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = applied_version(pool).await?;
    if current >= CURRENT_VERSION {
        debug!(version = current, "Schema is current");
        return Ok(());
    }

    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!(version, name, "Applying migration");
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration {} ({}) failed", version, name))?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    info!(from = current, to = CURRENT_VERSION, "Schema migrated");
    Ok(())
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    Ok(MigrationStatus {
        current_version: applied_version(pool).await?,
        target_version: CURRENT_VERSION,
    })
}
