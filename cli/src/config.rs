//! # Configuration Management
//!
//! Loads and saves the CLI configuration: router tuning, the graph source
//! (Neo4j or an offline recipe catalogue), the vector index location, the
//! embedding model and the LLM used for answers.
//!
//! ## Configuration File Location
//!
//! `$XDG_CONFIG_HOME/recipe-rag/config.json`, falling back to
//! `$HOME/.config/recipe-rag/config.json`.
//!
//! A missing file is not an error: every section has a default.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use recipe_rag::LlmConfig;
use recipe_rag::RouterConfig;
use recipe_rag::embeddings::EmbeddingSettings;
use recipe_rag::store::Neo4jSettings;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the stored Neo4j URI
const NEO4J_URI_ENV_VAR: &str = "RECIPE_RAG_NEO4J_URI";

/// Default location of the LanceDB directory
const DEFAULT_LANCE_PATH: &str = ".recipe-rag/recipes.lance";

/// Where embedded recipe chunks are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanceSettings {
    /// LanceDB directory; vector size follows the embedding model
    pub path: String,
}

impl Default for LanceSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_LANCE_PATH.to_string(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    neo4j: Neo4jSettings,
    /// JSON recipe catalogue used instead of Neo4j when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub lance: LanceSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    /// LLM used for answers (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Effective Neo4j settings.
    ///
    /// Environment variable `RECIPE_RAG_NEO4J_URI` takes precedence over the
    /// stored URI.
    pub fn neo4j(&self) -> Neo4jSettings {
        let mut settings = self.neo4j.clone();
        if let Ok(uri) = std::env::var(NEO4J_URI_ENV_VAR) {
            settings.uri = uri;
        }
        settings
    }

    pub fn set_neo4j(&mut self, settings: Neo4jSettings) {
        self.neo4j = settings;
    }

    pub fn with_llm(mut self, llm_config: LlmConfig) -> Self {
        self.llm = Some(llm_config);
        self
    }

    pub fn remove_llm(&mut self) {
        self.llm = None;
    }

    /// Check if LLM is configured and ready to use
    pub fn llm_ready(&self) -> bool {
        self.llm.as_ref().map(|l| l.is_ready()).unwrap_or(false)
    }

    /// Load configuration from the default config file, or defaults if there
    /// is none.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .router
            .validate()
            .with_context(|| format!("Invalid router settings in {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check if a configuration file exists
    pub fn exists() -> bool {
        config_path().map(|p| p.exists()).unwrap_or(false)
    }
}

/// Get the path to the configuration file
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs_config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("recipe-rag").join("config.json"))
}

/// Uses `$HOME/.config` on all platforms for consistency.
fn dirs_config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .or_else(|| std::env::var("USERPROFILE").ok())
                .map(|h| PathBuf::from(h).join(".config"))
        })
}
