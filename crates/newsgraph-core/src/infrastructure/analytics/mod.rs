//! Remote graph analytics
//!
//! Provides the first tier of the community detection chain and the
//! settings-driven detector constructor.

mod client;

use std::sync::Arc;
use std::time::Duration;

pub use client::RemoteAnalytics;

use crate::config::CommunitySettings;
use crate::domain::community::CommunityDetector;
use crate::domain::knowledge::GraphRepository;
use crate::error::Result;

/// Build the remote tier when an analytics URL is configured
pub fn remote_from_settings(settings: &CommunitySettings) -> Result<Option<RemoteAnalytics>> {
    settings
        .analytics_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(|url| {
            RemoteAnalytics::new(
                url,
                Duration::from_secs(settings.analytics_timeout_secs.max(1)),
                settings.seed,
            )
        })
        .transpose()
}

/// Build the full detector chain: remote (if configured), local, BFS
pub fn detector_from_settings<R: GraphRepository>(
    repository: Arc<R>,
    settings: &CommunitySettings,
) -> Result<CommunityDetector<R>> {
    let detector = CommunityDetector::with_settings(repository, settings);
    Ok(match remote_from_settings(settings)? {
        Some(remote) => detector.with_tier(Arc::new(remote)),
        None => detector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::knowledge::SqliteGraphRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_detector_from_settings() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = Arc::new(SqliteGraphRepository::new(pool));

        let mut settings = CommunitySettings::default();
        let detector = detector_from_settings(repo.clone(), &settings).unwrap();
        assert_eq!(detector.tier_names(), vec!["local"]);

        settings.analytics_url = Some("http://analytics.internal:7474".to_string());
        settings.local_algorithms = false;
        let detector = detector_from_settings(repo, &settings).unwrap();
        assert_eq!(detector.tier_names(), vec!["remote"]);
        assert_eq!(detector.min_community_size(), 3);
    }
}
