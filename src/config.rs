//! Configuration management for testforge
//!
//! All settings load from environment variables with sensible defaults.
//! Per-stage model selection, attempt budgets and verification switches are
//! configuration, not constants: the stages read their tuning from here and
//! the CLI can override budgets per run.
//!
//! # Environment Variables
//!
//! ## testforge configuration
//! - `TESTFORGE_MODULE`: task module name - default: "CashAllocation"
//! - `TESTFORGE_KNOWLEDGE_DIR`: reference-document directory - default: "KnowledgeBase/<module>"
//! - `TESTFORGE_CACHE_DIR`: cache descriptor directory - default: "Cache"
//! - `TESTFORGE_LOG_LEVEL`: logging level - default: "info"
//! - `TESTFORGE_<STAGE>_PROVIDER` / `_MODEL` / `_VERIFIER_PROVIDER` /
//!   `_VERIFIER_MODEL` / `_TRIES` / `_VERIFY`: per-stage tuning overrides
//!   (STAGE is DIMENSIONS, SCENARIOS, CASES, STEPS or OUTPUTS)
//!
//! ## Provider credentials
//! - `OLLAMA_BASE_URL`, `OLLAMA_API_KEY`: self-hosted substrate
//! - `GOOGLE_API_KEY`: hosted substrate; `GOOGLE_API_KEY_VERIFIER` optionally
//!   gives the verifier role its own key
//!
//! ## Output locations
//! - `TEST_DIMENSIONS_FILE`, `TEST_SCENARIOS_FILE`, `TEST_CASES_FILE`,
//!   `TEST_DATA_DIR`

use crate::ai::provider::{CacheRole, Provider, ProviderKind};
use crate::ai::{HostedClient, SelfHostedClient};
use crate::cache::CacheManager;
use crate::pipeline::stages::StageKind;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_MODULE: &str = "CashAllocation";
const DEFAULT_CACHE_DIR: &str = "Cache";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_DATA_DIR: &str = "Output/TestData";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider for {stage}: {value}. Valid options: hosted, selfhosted")]
    InvalidProvider { stage: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

/// Per-stage model tuning
#[derive(Debug, Clone)]
pub struct StageTuning {
    pub provider: ProviderKind,
    pub model: String,
    pub verifier_provider: ProviderKind,
    pub verifier_model: String,
    /// Attempt budget for the retry/verify loop
    pub tries: u32,
    /// Whether the verifier pass is enabled
    pub verify: bool,
}

/// Main configuration structure for testforge
#[derive(Debug, Clone)]
pub struct TestforgeConfig {
    /// Task module; names the knowledge collection and scopes cache
    /// descriptors
    pub module: String,

    /// Directory of reference documents for the module
    pub knowledge_dir: PathBuf,

    /// Root directory for cache descriptors
    pub cache_dir: PathBuf,

    /// Self-hosted substrate endpoint and bearer token
    pub selfhosted_base_url: Option<String>,
    pub selfhosted_api_key: Option<String>,

    /// Hosted substrate API keys; the verifier key falls back to the
    /// generator key when unset
    pub hosted_api_key: Option<String>,
    pub hosted_verifier_api_key: Option<String>,

    /// Output table locations
    pub dimensions_file: PathBuf,
    pub scenarios_file: PathBuf,
    pub cases_file: PathBuf,
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for TestforgeConfig {
    /// Loads configuration from environment variables with defaults
    fn default() -> Self {
        let module = env::var("TESTFORGE_MODULE").unwrap_or_else(|_| DEFAULT_MODULE.to_string());

        let knowledge_dir = env::var("TESTFORGE_KNOWLEDGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("KnowledgeBase").join(&module));

        let cache_dir = env::var("TESTFORGE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        let dimensions_file = env::var("TEST_DIMENSIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("Output/dimensions.json"));
        let scenarios_file = env::var("TEST_SCENARIOS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("Output/scenarios.json"));
        let cases_file = env::var("TEST_CASES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("Output/cases.json"));
        let data_dir = env::var("TEST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let log_level = env::var("TESTFORGE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            module,
            knowledge_dir,
            cache_dir,
            selfhosted_base_url: env::var("OLLAMA_BASE_URL").ok(),
            selfhosted_api_key: env::var("OLLAMA_API_KEY").ok(),
            hosted_api_key: env::var("GOOGLE_API_KEY").ok(),
            hosted_verifier_api_key: env::var("GOOGLE_API_KEY_VERIFIER").ok(),
            dimensions_file,
            scenarios_file,
            cases_file,
            data_dir,
            log_level,
        }
    }
}

impl TestforgeConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        if self.module.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Module name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Per-stage tuning: defaults mirror the stage's established model
    /// pairing, overridable per stage via environment variables.
    pub fn stage_tuning(&self, stage: StageKind) -> Result<StageTuning, ConfigError> {
        let defaults = match stage {
            StageKind::Dimensions => StageTuning {
                provider: ProviderKind::Hosted,
                model: "gemini-2.5-flash".to_string(),
                verifier_provider: ProviderKind::Hosted,
                verifier_model: "gemini-2.5-flash".to_string(),
                tries: 2,
                verify: true,
            },
            StageKind::Scenarios => StageTuning {
                provider: ProviderKind::SelfHosted,
                model: "deepseek-r1:14b".to_string(),
                verifier_provider: ProviderKind::SelfHosted,
                verifier_model: "deepseek-r1:14b".to_string(),
                tries: 2,
                verify: true,
            },
            StageKind::Cases | StageKind::Steps | StageKind::Outputs => StageTuning {
                provider: ProviderKind::SelfHosted,
                model: "gpt-oss:20b".to_string(),
                verifier_provider: ProviderKind::SelfHosted,
                verifier_model: "deepseek-r1:14b".to_string(),
                tries: 3,
                verify: true,
            },
        };

        let prefix = stage.env_prefix();
        let parse_provider = |suffix: &str, default: ProviderKind| {
            match env::var(format!("TESTFORGE_{}_{}", prefix, suffix)) {
                Ok(value) => value
                    .parse::<ProviderKind>()
                    .map_err(|_| ConfigError::InvalidProvider {
                        stage: stage.to_string(),
                        value,
                    }),
                Err(_) => Ok(default),
            }
        };

        let provider = parse_provider("PROVIDER", defaults.provider)?;
        let verifier_provider = parse_provider("VERIFIER_PROVIDER", defaults.verifier_provider)?;

        let model = env::var(format!("TESTFORGE_{}_MODEL", prefix)).unwrap_or(defaults.model);
        let verifier_model = env::var(format!("TESTFORGE_{}_VERIFIER_MODEL", prefix))
            .unwrap_or(defaults.verifier_model);

        let tries = env::var(format!("TESTFORGE_{}_TRIES", prefix))
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v >= 1)
            .unwrap_or(defaults.tries);

        let verify = env::var(format!("TESTFORGE_{}_VERIFY", prefix))
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(defaults.verify);

        Ok(StageTuning {
            provider,
            model,
            verifier_provider,
            verifier_model,
            tries,
            verify,
        })
    }

    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::new(&self.cache_dir)
    }

    /// Builds a provider for the given role. Credentials are checked here so
    /// a misconfigured stage fails before any generation work starts.
    pub fn build_provider(
        &self,
        kind: ProviderKind,
        model: &str,
        role: CacheRole,
    ) -> Result<Arc<dyn Provider>, ConfigError> {
        match kind {
            ProviderKind::Hosted => {
                let api_key = match role {
                    CacheRole::Generator => self.hosted_api_key.clone(),
                    CacheRole::Verifier => self
                        .hosted_verifier_api_key
                        .clone()
                        .or_else(|| self.hosted_api_key.clone()),
                }
                .ok_or_else(|| {
                    ConfigError::MissingCredential("GOOGLE_API_KEY is not set".to_string())
                })?;

                Ok(Arc::new(HostedClient::new(
                    api_key,
                    model.to_string(),
                    role,
                    self.module.clone(),
                    self.knowledge_dir.clone(),
                    self.cache_manager(),
                )))
            }
            ProviderKind::SelfHosted => {
                let base_url = self.selfhosted_base_url.clone().ok_or_else(|| {
                    ConfigError::MissingCredential("OLLAMA_BASE_URL is not set".to_string())
                })?;
                let api_key = self.selfhosted_api_key.clone().ok_or_else(|| {
                    ConfigError::MissingCredential("OLLAMA_API_KEY is not set".to_string())
                })?;

                Ok(Arc::new(SelfHostedClient::new(
                    base_url,
                    api_key,
                    model.to_string(),
                    self.module.clone(),
                    self.knowledge_dir.clone(),
                )))
            }
        }
    }

    /// Per-case step table, one per test case id
    pub fn steps_file(&self, test_case_id: &str) -> PathBuf {
        self.data_dir.join(format!("teststeps_{}.json", test_case_id))
    }

    /// Expected-result region book, one per test case id
    pub fn expected_output_file(&self, test_case_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("expectedoutput_{}.json", test_case_id))
    }
}
