//! Configuration management for askdoc.
//!
//! Configuration is merged from, in increasing precedence:
//! - Built-in defaults
//! - Config file (`.askdoc/config.yaml` or `ASKDOC_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Credentials are never stored in the file; the file names the environment
//! variables that hold them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .askdoc/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("openai" or "ollama")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Explicit API key for the LLM provider (ASKDOC_API_KEY)
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log output format ("pretty" or "json")
    pub log_format: String,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Sampling parameters for answer synthesis
    pub generation: GenerationSettings,

    /// Web search and page scrape tools
    pub tools: ToolsConfig,

    /// Routing policy knobs
    pub retrieval: RetrievalSettings,

    /// Document indexing
    pub index: IndexSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model named by this provider entry.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Custom endpoint, if one is configured.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Sampling parameters passed to the synthesis model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Tool section of config.yaml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    pub web_search: WebSearchSettings,
    pub page_scrape: PageScrapeSettings,
}

/// Web search provider settings (Serper).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSearchSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key_env: String,
    pub result_count: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://google.serper.dev".to_string(),
            api_key_env: "SERPER_API_KEY".to_string(),
            result_count: 5,
            timeout_secs: 20,
            max_retries: 1,
        }
    }
}

/// Page scrape provider settings (Firecrawl).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageScrapeSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key_env: String,
    pub max_chars: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PageScrapeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.firecrawl.dev".to_string(),
            api_key_env: "FIRECRAWL_API_KEY".to_string(),
            max_chars: 8000,
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

/// When the retrieval stage follows a web-search URL with a page scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeTrigger {
    /// Snippets are always considered sufficient.
    Never,
    /// Scrape when snippets are short or miss most query terms.
    #[default]
    InsufficientSnippets,
    /// Always scrape the top result after a web search.
    Always,
}

impl std::str::FromStr for ScrapeTrigger {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "never" => Ok(Self::Never),
            "insufficient_snippets" => Ok(Self::InsufficientSnippets),
            "always" => Ok(Self::Always),
            other => Err(AppError::Config(format!(
                "Unknown scrape trigger: {}. Supported: never, insufficient_snippets, always",
                other
            ))),
        }
    }
}

/// Retrieval routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// Maximum document passages per query
    pub top_k: usize,
    /// Minimum cosine similarity for a passage to count as relevant
    pub min_relevance: f32,
    pub scrape_trigger: ScrapeTrigger,
    /// Below this many snippet characters, snippets are insufficient
    pub min_snippet_chars: usize,
    /// Fraction of query terms that must appear in the snippets
    pub min_query_term_coverage: f32,
    pub max_scrapes: usize,
    /// Scrape and re-synthesize once when snippets led to the not-found answer
    pub escalate_on_not_found: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance: 0.20,
            scrape_trigger: ScrapeTrigger::default(),
            min_snippet_chars: 200,
            min_query_term_coverage: 0.5,
            max_scrapes: 1,
            escalate_on_not_found: true,
        }
    }
}

/// Document indexing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding: EmbeddingSettings,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            embedding: EmbeddingSettings::default(),
        }
    }
}

/// Embedding provider used by the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// "trigram" (offline) or "ollama"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    generation: Option<GenerationSettings>,
    tools: Option<ToolsConfig>,
    retrieval: Option<RetrievalSettings>,
    index: Option<IndexSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            log_level: None,
            log_format: "pretty".to_string(),
            verbose: false,
            no_color: false,
            llm: None,
            generation: GenerationSettings::default(),
            tools: ToolsConfig::default(),
            retrieval: RetrievalSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

/// CLI flag values applied on top of file and environment configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub no_web: bool,
    pub no_scrape: bool,
    pub scrape_trigger: Option<ScrapeTrigger>,
}

impl AppConfig {
    /// Load configuration from defaults, config file and environment.
    ///
    /// Environment variables:
    /// - `ASKDOC_WORKSPACE`: Override workspace path
    /// - `ASKDOC_CONFIG`: Path to config file
    /// - `ASKDOC_PROVIDER`: LLM provider
    /// - `ASKDOC_MODEL`: Model identifier
    /// - `ASKDOC_API_KEY`: API key for the LLM provider
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("ASKDOC_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("ASKDOC_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.askdoc_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        if let Ok(provider) = std::env::var("ASKDOC_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("ASKDOC_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("ASKDOC_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = Some(llm);
        }

        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }
        if let Some(tools) = config_file.tools {
            result.tools = tools;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    pub fn with_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(workspace) = overrides.workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = overrides.config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = overrides.provider {
            self.provider = provider;
        }

        if let Some(model) = overrides.model {
            self.model = model;
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if let Some(log_format) = overrides.log_format {
            self.log_format = log_format;
        }

        if overrides.verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        if overrides.no_web {
            self.tools.web_search.enabled = false;
        }

        if overrides.no_scrape {
            self.tools.page_scrape.enabled = false;
        }

        if let Some(trigger) = overrides.scrape_trigger {
            self.retrieval.scrape_trigger = trigger;
        }

        self
    }

    /// Get the path to the .askdoc directory.
    pub fn askdoc_dir(&self) -> PathBuf {
        self.workspace.join(".askdoc")
    }

    /// Get the provider entry for `provider`, if the config file has one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint override for the active provider.
    pub fn provider_endpoint(&self) -> Option<&str> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::endpoint)
    }

    /// Resolve the API key for an LLM provider.
    ///
    /// `ASKDOC_API_KEY` wins; otherwise the provider's `apiKeyEnv`, falling
    /// back to `OPENAI_API_KEY` for the OpenAI provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let env_var = match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => Some(api_key_env.clone()),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if provider.eq_ignore_ascii_case("openai") => Some("OPENAI_API_KEY".to_string()),
            None => None,
        };

        env_var
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["openai", "ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.provider == "openai" && self.resolve_api_key("openai").is_none() {
            return Err(AppError::Config(
                "OpenAI API key not found (set OPENAI_API_KEY or ASKDOC_API_KEY)".to_string(),
            ));
        }

        if self.index.chunk_overlap >= self.index.chunk_size {
            return Err(AppError::Config(format!(
                "index.chunkOverlap ({}) must be smaller than index.chunkSize ({})",
                self.index.chunk_overlap, self.index.chunk_size
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_query_term_coverage) {
            return Err(AppError::Config(format!(
                "retrieval.minQueryTermCoverage must be within 0.0..=1.0, got {}",
                self.retrieval.min_query_term_coverage
            )));
        }

        self.log_format.parse::<crate::logging::LogFormat>()?;

        Ok(())
    }
}

/// Read a credential from the environment.
///
/// Missing or blank values are a configuration error naming the variable,
/// raised once when the consuming tool is constructed.
pub fn require_env_credential(var: &str, purpose: &str) -> AppResult<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "{} requires an API key in the {} environment variable",
            purpose, var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.generation.max_tokens, 1000);
        assert!(config.tools.web_search.enabled);
        assert_eq!(config.retrieval.scrape_trigger, ScrapeTrigger::InsufficientSnippets);
        assert!(!config.verbose);
    }

    #[test]
    fn test_askdoc_dir() {
        let config = AppConfig::default();
        assert!(config.askdoc_dir().ends_with(".askdoc"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(CliOverrides {
            provider: Some("ollama".to_string()),
            model: Some("llama3.2".to_string()),
            verbose: true,
            no_web: true,
            scrape_trigger: Some(ScrapeTrigger::Never),
            ..Default::default()
        });

        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert!(!config.tools.web_search.enabled);
        assert!(config.tools.page_scrape.enabled);
        assert_eq!(config.retrieval.scrape_trigger, ScrapeTrigger::Never);
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: llama3.2
tools:
  webSearch:
    resultCount: 3
  pageScrape:
    enabled: false
retrieval:
  scrapeTrigger: always
  topK: 2
index:
  chunkSize: 256
  chunkOverlap: 32
logging:
  format: json
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();

        assert_eq!(merged.provider, "ollama");
        assert_eq!(merged.model, "llama3.2");
        assert_eq!(merged.provider_endpoint(), Some("http://localhost:11434"));
        assert_eq!(merged.tools.web_search.result_count, 3);
        assert_eq!(merged.tools.web_search.api_key_env, "SERPER_API_KEY");
        assert!(!merged.tools.page_scrape.enabled);
        assert_eq!(merged.retrieval.scrape_trigger, ScrapeTrigger::Always);
        assert_eq!(merged.retrieval.top_k, 2);
        assert_eq!(merged.retrieval.max_scrapes, 1);
        assert_eq!(merged.index.chunk_size, 256);
        assert_eq!(merged.log_format, "json");
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_overlap() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        config.index.chunk_overlap = config.index.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".to_string());
        assert_eq!(config.resolve_api_key("openai"), Some("sk-test".to_string()));
    }

    #[test]
    fn test_scrape_trigger_parsing() {
        assert_eq!("never".parse::<ScrapeTrigger>().unwrap(), ScrapeTrigger::Never);
        assert_eq!(
            "insufficient-snippets".parse::<ScrapeTrigger>().unwrap(),
            ScrapeTrigger::InsufficientSnippets
        );
        assert!("sometimes".parse::<ScrapeTrigger>().is_err());
    }

    #[test]
    fn test_require_env_credential_missing() {
        let err = require_env_credential("ASKDOC_TEST_SURELY_UNSET_VAR", "Web search").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("ASKDOC_TEST_SURELY_UNSET_VAR"));
    }
}
