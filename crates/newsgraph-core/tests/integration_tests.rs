//! End-to-end tests over the assembled intelligence layer

use std::collections::HashSet;

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;

use newsgraph_core::config::Config;
use newsgraph_core::domain::embedding::EmbeddingClient;
use newsgraph_core::domain::knowledge::{
    Article, EntityRecord, EntityType, GraphRepository, IngestBatch, RelationshipRecord,
};
use newsgraph_core::domain::retrieval::{QueryPayload, RetrievalMode};
use newsgraph_core::storage::run_migrations;
use newsgraph_core::IntelligenceLayer;

async fn layer() -> IntelligenceLayer {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    IntelligenceLayer::from_parts(pool, &Config::default(), EmbeddingClient::disabled("tests"))
        .expect("Failed to build intelligence layer")
}

fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}

fn entity(name: &str, entity_type: &str, description: &str) -> EntityRecord {
    EntityRecord {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        description: description.to_string(),
    }
}

fn relationship(
    source: (&str, &str),
    relationship_type: &str,
    target: (&str, &str),
) -> RelationshipRecord {
    RelationshipRecord {
        source: source.0.to_string(),
        source_type: source.1.to_string(),
        target: target.0.to_string(),
        target_type: target.1.to_string(),
        relationship_type: relationship_type.to_string(),
        description: String::new(),
        strength: None,
    }
}

async fn ingest_fixture(layer: &IntelligenceLayer) {
    let recent = IngestBatch {
        article: Some(
            Article::new("art-1", "Anthropic raises a new round").with_published_date(days_ago(5)),
        ),
        entities: vec![
            entity("Anthropic", "company", "AI safety company"),
            entity("Anthropic, Inc.", "company", ""),
            entity("Google", "investor", ""),
            entity("Dario Amodei", "person", "Chief executive"),
        ],
        relationships: vec![
            relationship(("Anthropic", "company"), "FUNDED_BY", ("Google", "investor")),
            relationship(("Anthropic", "company"), "FOUNDED_BY", ("Dario Amodei", "person")),
            relationship(("Dario Amodei", "person"), "WORKS_AT", ("Anthropic", "company")),
        ],
    };
    let report = layer.ingest().ingest(recent).await.unwrap();
    assert!(report.is_clean(), "unexpected rejections: {:?}", report.rejected);
    assert_eq!(report.entities_recorded, 4);
    assert_eq!(report.relationships_recorded, 3);

    let stale = IngestBatch {
        article: Some(
            Article::new("art-2", "OpenAI and Microsoft deepen ties")
                .with_published_date(days_ago(200)),
        ),
        entities: vec![
            entity("OpenAI", "company", "AI research lab"),
            entity("OpenAI", "company", "Maker of ChatGPT"),
            entity("Open AI", "company", ""),
            entity("Microsoft", "investor", ""),
        ],
        relationships: vec![
            relationship(("OpenAI", "company"), "FUNDED_BY", ("Microsoft", "investor")),
            relationship(("Microsoft", "investor"), "INVESTS_IN", ("Open AI", "company")),
        ],
    };
    let report = layer.ingest().ingest(stale).await.unwrap();
    assert!(report.is_clean(), "unexpected rejections: {:?}", report.rejected);
}

#[tokio::test]
async fn test_ingest_collapses_normalized_names() {
    let layer = layer().await;
    ingest_fixture(&layer).await;

    let anthropic = layer
        .ingest()
        .find_entity("ANTHROPIC INC", EntityType::Company)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(anthropic.name, "Anthropic");
    assert_eq!(anthropic.mention_count, 2);

    // "Open AI" only collapses into "OpenAI" during dedup
    assert_eq!(layer.graph().count_entities().await.unwrap(), 6);
}

#[tokio::test]
async fn test_maintenance_then_query() {
    let layer = layer().await;
    ingest_fixture(&layer).await;

    let report = layer.run_maintenance(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.dedup.merged(), 1);
    assert_eq!(report.dedup.merges[0].survivor_name, "OpenAI");
    assert_eq!(layer.graph().count_entities().await.unwrap(), 5);

    assert_eq!(report.scoring.processed, 5);
    assert_eq!(report.scoring.failed, 0);
    assert!(report.embeddings.is_none());

    assert_eq!(report.communities.communities, 1);
    let communities = layer.graph().list_communities().await.unwrap();
    assert_eq!(communities.len(), 1);
    let members: HashSet<String> = layer
        .graph()
        .list_entities_in_community(communities[0].0)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(
        members,
        HashSet::from([
            "Anthropic".to_string(),
            "Google".to_string(),
            "Dario Amodei".to_string()
        ])
    );

    let response = layer
        .engine()
        .query("Which AI startups raised funding recently?")
        .await
        .unwrap();
    assert_eq!(response.mode, RetrievalMode::Hybrid);
    let QueryPayload::SectorListing(listing) = response.payload else {
        panic!("expected a sector listing, got {:?}", response.payload);
    };
    let names: Vec<&str> = listing.companies.iter().map(|c| c.entity.name.as_str()).collect();
    assert_eq!(names, vec!["Anthropic"]);
    assert_eq!(listing.companies[0].investors, vec!["Google"]);

    let response = layer.engine().query("Tell me about OpenAI").await.unwrap();
    let QueryPayload::Profile(profile) = response.payload else {
        panic!("expected a profile, got {:?}", response.payload);
    };
    assert_eq!(profile.entity.name, "OpenAI");
    assert_eq!(profile.names("investors"), vec!["Microsoft"]);
}

#[tokio::test]
async fn test_dry_run_leaves_graph_untouched() {
    let layer = layer().await;
    ingest_fixture(&layer).await;

    let report = layer
        .resolver()
        .run(true, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.merged(), 0);
    assert_eq!(layer.graph().count_entities().await.unwrap(), 6);
}
