//! Provider capability trait
//!
//! All model substrates implement [`Provider`]; the concrete implementation
//! is selected once at construction from a [`ProviderKind`], so an invalid
//! provider name fails before any pipeline work starts.

use crate::ai::error::ProviderError;
use crate::schema::SchemaContract;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Whether a conversation turn continues the adapter's session or starts over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Continue the existing chat session; prior turns stay in scope
    Reuse,
    /// Discard prior turns and start a fresh session
    Fresh,
}

/// The model role a provider instance serves.
///
/// Generator and verifier caches are kept apart even when both roles point
/// at the same knowledge directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheRole {
    Generator,
    Verifier,
}

impl CacheRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Generator => "generator",
            CacheRole::Verifier => "verifier",
        }
    }
}

impl fmt::Display for CacheRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported provider substrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted multi-tenant API with server-side context caching
    Hosted,
    /// Self-hosted OpenAI-compatible inference server
    SelfHosted,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hosted => "hosted",
            ProviderKind::SelfHosted => "selfhosted",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hosted" | "gemini" => Ok(ProviderKind::Hosted),
            "selfhosted" | "self-hosted" | "ollama" => Ok(ProviderKind::SelfHosted),
            other => Err(ProviderError::ConfigurationError {
                message: format!(
                    "'{}' is not a valid provider. Valid options: hosted, selfhosted",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core trait every model substrate implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Sends a prompt with an optional schema obligation and returns the raw
    /// response text.
    ///
    /// When a schema is supplied the substrate must constrain the output to
    /// it: natively where the API supports structured output, otherwise by
    /// embedding the schema text and retrying on non-conformant bodies.
    async fn converse(
        &self,
        prompt: &str,
        schema: Option<&SchemaContract>,
        session: SessionPolicy,
    ) -> Result<String, ProviderError>;

    /// Makes the reference documents in `directory` available to later
    /// `converse` calls.
    ///
    /// Idempotent: an existing usable cache or same-named collection is
    /// reused (TTL refreshed where applicable) rather than re-uploaded.
    async fn upload_reference_documents(&self, directory: &Path) -> Result<(), ProviderError>;

    /// Best-effort removal of uploaded documents and the associated cache or
    /// collection. Never fails on already-deleted remote state; calling it
    /// twice is a no-op.
    async fn teardown(&self) -> Result<(), ProviderError>;

    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Optional model information for logging
    fn model_info(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("hosted".parse::<ProviderKind>().unwrap(), ProviderKind::Hosted);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Hosted);
        assert_eq!(
            "selfhosted".parse::<ProviderKind>().unwrap(),
            ProviderKind::SelfHosted
        );
        assert_eq!(
            "OLLAMA".parse::<ProviderKind>().unwrap(),
            ProviderKind::SelfHosted
        );
    }

    #[test]
    fn test_invalid_provider_kind_fails_at_parse() {
        let err = "mistral".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("not a valid provider"));
    }

    #[test]
    fn test_cache_role_paths_differ() {
        assert_ne!(CacheRole::Generator.as_str(), CacheRole::Verifier.as_str());
    }
}
