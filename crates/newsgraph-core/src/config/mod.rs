//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variables consulted for the embedding API key, in order
pub const EMBEDDING_API_KEY_VARS: [&str; 2] = ["NEWSGRAPH_EMBEDDING_API_KEY", "OPENAI_API_KEY"];

/// Newsgraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub resolver: ResolverSettings,
    pub scoring: ScoringSettings,
    pub community: CommunitySettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; the platform data directory when unset
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub similarity_threshold: f64,
    /// Only compare entities of the same type when no type filter is given
    pub same_type_only: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            same_type_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub base_weight: f64,
    pub frequency_weight: f64,
    pub recency_weight: f64,
    pub credibility_weight: f64,
    pub context_weight: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            base_weight: 0.1,
            frequency_weight: 0.3,
            recency_weight: 0.2,
            credibility_weight: 0.3,
            context_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunitySettings {
    pub min_community_size: usize,
    /// Base URL of the remote analytics service; the remote tier is skipped when unset
    pub analytics_url: Option<String>,
    pub analytics_timeout_secs: u64,
    /// Run Leiden/Louvain/label propagation in-process
    pub local_algorithms: bool,
    /// Hop bound of the BFS neighbour query
    pub bfs_max_depth: u32,
    /// Seed for label-propagation node order
    pub seed: u64,
}

impl Default for CommunitySettings {
    fn default() -> Self {
        Self {
            min_community_size: 3,
            analytics_url: None,
            analytics_timeout_secs: 30,
            local_algorithms: true,
            bfs_max_depth: 3,
            seed: 42,
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi,
    /// Local model server with an Ollama-style `/api/embeddings` endpoint
    Ollama,
    Disabled,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "ollama" | "local" => Some(Self::Ollama),
            "disabled" | "none" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub provider: EmbeddingProvider,
    pub model: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: None,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingSettings {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(EMBEDDING_API_KEY_VARS
            .iter()
            .find_map(|var| env::var(var).ok())
            .filter(|key| !key.is_empty()))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Embedding API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub semantic_weight: f64,
    /// Traversal depth for graph-context expansion
    pub graph_hops: u32,
    /// Weight of the vector score when a document is found by both sources
    pub vector_weight: f64,
    /// Hop bound for shortest-path queries
    pub max_path_depth: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            semantic_weight: 0.7,
            graph_hops: 2,
            vector_weight: 0.7,
            max_path_depth: 4,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("NEWSGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("newsgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.embedding.enforce_env_only()?;

        if !(0.0..=1.0).contains(&self.resolver.similarity_threshold) {
            return Err(anyhow!("resolver.similarity_threshold must be between 0.0 and 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.semantic_weight) {
            return Err(anyhow!("retrieval.semantic_weight must be between 0.0 and 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.vector_weight) {
            return Err(anyhow!("retrieval.vector_weight must be between 0.0 and 1.0"));
        }
        let weights = [
            self.scoring.base_weight,
            self.scoring.frequency_weight,
            self.scoring.recency_weight,
            self.scoring.credibility_weight,
            self.scoring.context_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(anyhow!("scoring weights must be non-negative"));
        }
        if self.community.min_community_size == 0 {
            return Err(anyhow!("community.min_community_size must be at least 1"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Database settings
            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "database.acquire_timeout_secs" => Ok(self.database.acquire_timeout_secs.to_string()),

            // Resolver settings
            "resolver.similarity_threshold" => Ok(self.resolver.similarity_threshold.to_string()),
            "resolver.same_type_only" => Ok(self.resolver.same_type_only.to_string()),

            // Scoring settings
            "scoring.base_weight" => Ok(self.scoring.base_weight.to_string()),
            "scoring.frequency_weight" => Ok(self.scoring.frequency_weight.to_string()),
            "scoring.recency_weight" => Ok(self.scoring.recency_weight.to_string()),
            "scoring.credibility_weight" => Ok(self.scoring.credibility_weight.to_string()),
            "scoring.context_weight" => Ok(self.scoring.context_weight.to_string()),

            // Community settings
            "community.min_community_size" => Ok(self.community.min_community_size.to_string()),
            "community.analytics_url" => Ok(self
                .community
                .analytics_url
                .clone()
                .unwrap_or_else(|| "(not set)".to_string())),
            "community.local_algorithms" => Ok(self.community.local_algorithms.to_string()),
            "community.bfs_max_depth" => Ok(self.community.bfs_max_depth.to_string()),
            "community.seed" => Ok(self.community.seed.to_string()),

            // Embedding settings
            "embedding.provider" => Ok(self.embedding.provider.as_str().to_string()),
            "embedding.model" => Ok(self.embedding.model.clone()),
            "embedding.base_url" => Ok(self
                .embedding
                .base_url
                .clone()
                .unwrap_or_else(|| "(provider default)".to_string())),
            "embedding.timeout_secs" => Ok(self.embedding.timeout_secs.to_string()),
            "embedding.api_key" => match self.embedding.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use NEWSGRAPH_EMBEDDING_API_KEY or OPENAI_API_KEY env var)"
                        .to_string(),
                ),
            },

            // Retrieval settings
            "retrieval.top_k" => Ok(self.retrieval.top_k.to_string()),
            "retrieval.semantic_weight" => Ok(self.retrieval.semantic_weight.to_string()),
            "retrieval.graph_hops" => Ok(self.retrieval.graph_hops.to_string()),
            "retrieval.vector_weight" => Ok(self.retrieval.vector_weight.to_string()),
            "retrieval.max_path_depth" => Ok(self.retrieval.max_path_depth.to_string()),

            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = Some(PathBuf::from(value));
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }
            "database.acquire_timeout_secs" => {
                self.database.acquire_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid acquire_timeout_secs value: {}", value))?;
            }

            "resolver.similarity_threshold" => {
                self.resolver.similarity_threshold = parse_unit(key, value)?;
            }
            "resolver.same_type_only" => {
                self.resolver.same_type_only = value
                    .parse()
                    .with_context(|| format!("Invalid same_type_only value: {}", value))?;
            }

            "scoring.base_weight" => self.scoring.base_weight = parse_weight(key, value)?,
            "scoring.frequency_weight" => self.scoring.frequency_weight = parse_weight(key, value)?,
            "scoring.recency_weight" => self.scoring.recency_weight = parse_weight(key, value)?,
            "scoring.credibility_weight" => {
                self.scoring.credibility_weight = parse_weight(key, value)?
            }
            "scoring.context_weight" => self.scoring.context_weight = parse_weight(key, value)?,

            "community.min_community_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid min_community_size value: {}", value))?;
                if size == 0 {
                    return Err(anyhow!("min_community_size must be at least 1"));
                }
                self.community.min_community_size = size;
            }
            "community.analytics_url" => {
                self.community.analytics_url = if value.is_empty() {
                    None
                } else {
                    Some(value.trim_end_matches('/').to_string())
                };
            }
            "community.local_algorithms" => {
                self.community.local_algorithms = value
                    .parse()
                    .with_context(|| format!("Invalid local_algorithms value: {}", value))?;
            }
            "community.bfs_max_depth" => {
                self.community.bfs_max_depth = value
                    .parse()
                    .with_context(|| format!("Invalid bfs_max_depth value: {}", value))?;
            }
            "community.seed" => {
                self.community.seed = value
                    .parse()
                    .with_context(|| format!("Invalid seed value: {}", value))?;
            }

            "embedding.provider" => {
                self.embedding.provider = EmbeddingProvider::parse(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid embedding provider: {}. Valid options: openai, ollama, disabled",
                        value
                    )
                })?;
            }
            "embedding.model" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("embedding.model cannot be empty"));
                }
                self.embedding.model = value.to_string();
            }
            "embedding.base_url" => {
                self.embedding.base_url = if value.is_empty() {
                    None
                } else {
                    Some(value.trim_end_matches('/').to_string())
                };
            }
            "embedding.timeout_secs" => {
                self.embedding.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "embedding.api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the NEWSGRAPH_EMBEDDING_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            "retrieval.top_k" => {
                self.retrieval.top_k = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
            }
            "retrieval.semantic_weight" => {
                self.retrieval.semantic_weight = parse_unit(key, value)?;
            }
            "retrieval.graph_hops" => {
                self.retrieval.graph_hops = value
                    .parse()
                    .with_context(|| format!("Invalid graph_hops value: {}", value))?;
            }
            "retrieval.vector_weight" => {
                self.retrieval.vector_weight = parse_unit(key, value)?;
            }
            "retrieval.max_path_depth" => {
                self.retrieval.max_path_depth = value
                    .parse()
                    .with_context(|| format!("Invalid max_path_depth value: {}", value))?;
            }

            _ => {
                return Err(anyhow!("Unknown configuration key: {}", key));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "database.path",
            "database.max_connections",
            "database.acquire_timeout_secs",
            "resolver.similarity_threshold",
            "resolver.same_type_only",
            "scoring.base_weight",
            "scoring.frequency_weight",
            "scoring.recency_weight",
            "scoring.credibility_weight",
            "scoring.context_weight",
            "community.min_community_size",
            "community.analytics_url",
            "community.local_algorithms",
            "community.bfs_max_depth",
            "community.seed",
            "embedding.provider",
            "embedding.model",
            "embedding.base_url",
            "embedding.timeout_secs",
            "embedding.api_key",
            "retrieval.top_k",
            "retrieval.semantic_weight",
            "retrieval.graph_hops",
            "retrieval.vector_weight",
            "retrieval.max_path_depth",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}

fn parse_weight(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(anyhow!("{} must be non-negative", key));
    }
    Ok(parsed)
}
