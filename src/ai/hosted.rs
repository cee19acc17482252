//! Hosted model API client
//!
//! Talks to a Gemini-style REST API. Reference documents live in a
//! server-side context cache with a TTL; every generate call attaches the
//! active cache handle so the documents stay in scope without re-upload.
//! Schema obligations use the API's native structured output (JSON mime
//! type plus response schema). Transient failures are retried with bounded
//! exponential backoff before surfacing a fatal error.

use crate::ai::error::ProviderError;
use crate::ai::provider::{CacheRole, Provider, SessionPolicy};
use crate::cache::{CacheManager, CachedContext, DocumentHandle};
use crate::schema::SchemaContract;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default API endpoint for the hosted substrate
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default request timeout for hosted API calls
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Context cache lifetime requested on creation and refresh
const DEFAULT_CACHE_TTL_SECS: u64 = 1800;

/// Bounded exponential backoff for transient failures
const BACKOFF_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 32_000;

/// System instruction baked into every context cache
const SYSTEM_INSTRUCTION: &str = "You are an expert tester who must analyze the provided \
     documents and help generate test cases, test steps, test data and expected output";

/// Delay before retry `attempt` (1-based): base doubling per attempt,
/// capped so a long outage never produces unbounded waits.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_millis((BACKOFF_BASE_MS << exp).min(BACKOFF_CAP_MS))
}

/// One remembered turn of the chat session
#[derive(Debug, Clone)]
struct ChatTurn {
    role: &'static str,
    text: String,
}

/// Client for the hosted model API
///
/// Holds a single logical chat session; `SessionPolicy` on each call decides
/// whether the session continues or starts fresh.
pub struct HostedClient {
    base_url: String,
    api_key: String,

    /// Model name without any path prefix, e.g. "gemini-2.5-flash"
    model: String,

    /// Role this instance serves; scopes the cache descriptors
    role: CacheRole,

    /// Task module; the second half of the cache descriptor key
    module: String,

    /// Directory of reference documents backing the context cache
    knowledge_dir: PathBuf,

    cache_manager: CacheManager,
    session: Mutex<Vec<ChatTurn>>,
    http_client: Client,
    timeout: Duration,
}

impl HostedClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: String,
        model: String,
        role: CacheRole,
        module: String,
        knowledge_dir: PathBuf,
        cache_manager: CacheManager,
    ) -> Self {
        let base_url = std::env::var("GOOGLE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url,
            api_key,
            model,
            role,
            module,
            knowledge_dir,
            cache_manager,
            session: Mutex::new(Vec::new()),
            http_client,
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Checks whether the API is reachable and the configured model resolves
    pub async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = self.endpoint(&format!("v1beta/models/{}", self.model));
        match self
            .http_client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!("Cannot reach hosted API at {}", self.base_url);
                Ok(false)
            }
            Err(e) => Err(self.map_transport_error(e)),
        }
    }

    /// Classifies a non-success response; transient variants get retried.
    fn classify_status(status: reqwest::StatusCode, body: String) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::AuthenticationError { message: body },
            429 => ProviderError::RateLimitError { retry_after: None },
            code if status.is_server_error() => ProviderError::ServerError {
                message: body,
                status_code: code,
            },
            code => ProviderError::ApiError {
                message: body,
                status_code: Some(code),
            },
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::TimeoutError {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ProviderError::NetworkError {
                message: format!("Request failed: {}", e),
            }
        }
    }

    /// Sends a request, retrying transient failures with exponential
    /// backoff. The builder closure is re-invoked per attempt because a
    /// request body cannot be reused once sent.
    async fn execute_with_backoff<F>(
        &self,
        operation: &str,
        build: F,
    ) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 1..=BACKOFF_ATTEMPTS {
            let result = build()
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await;

            let error = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Self::classify_status(status, body)
                }
                Err(e) => self.map_transport_error(e),
            };

            if !error.is_transient() || attempt == BACKOFF_ATTEMPTS {
                return Err(error);
            }

            let delay = backoff_delay(attempt);
            warn!(
                "{} failed transiently (attempt {}/{}): {}. Retrying in {:?}",
                operation, attempt, BACKOFF_ATTEMPTS, error, delay
            );
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }

        Err(last_error.unwrap_or(ProviderError::NetworkError {
            message: format!("{} failed", operation),
        }))
    }

    /// Returns a usable cached context, re-uploading transparently when the
    /// local descriptor is missing/expired or the remote handle is gone.
    async fn ensure_context(&self) -> Result<CachedContext, ProviderError> {
        if let Ok(context) = self.cache_manager.resolve(self.role, &self.module) {
            if self.remote_context_exists(&context.handle).await? {
                return Ok(context);
            }
            debug!(
                "Remote context {} no longer resolvable; recreating",
                context.handle
            );
        }

        self.upload_and_create_cache(&self.knowledge_dir).await
    }

    async fn remote_context_exists(&self, handle: &str) -> Result<bool, ProviderError> {
        let url = self.endpoint(&format!("v1beta/{}", handle));
        let result = self
            .http_client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await;

        match result {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(self.map_transport_error(e)),
        }
    }

    async fn upload_document(&self, path: &Path) -> Result<DocumentHandle, ProviderError> {
        let bytes = std::fs::read(path).map_err(|e| ProviderError::ConfigurationError {
            message: format!("Cannot read reference document {}: {}", path.display(), e),
        })?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        info!("Uploading file: {}", path.display());

        let metadata = serde_json::json!({ "file": { "display_name": display_name } });
        let url = self.endpoint("upload/v1beta/files");

        let response = self
            .execute_with_backoff("file upload", || {
                let form = reqwest::multipart::Form::new()
                    .part(
                        "metadata",
                        reqwest::multipart::Part::text(metadata.to_string())
                            .mime_str("application/json")
                            .expect("static mime type"),
                    )
                    .part(
                        "file",
                        reqwest::multipart::Part::bytes(bytes.clone())
                            .file_name(display_name.clone())
                            .mime_str("text/plain")
                            .expect("static mime type"),
                    );
                self.http_client.post(&url).multipart(form)
            })
            .await?;

        let uploaded: FileUploadResponse =
            response.json().await.map_err(|e| ProviderError::InvalidResponse {
                message: format!("Unparseable upload response: {}", e),
                raw_response: None,
            })?;

        info!("Uploaded: {} ({})", uploaded.file.display_name, uploaded.file.name);

        Ok(DocumentHandle {
            name: uploaded.file.name,
            display_name: uploaded.file.display_name,
            uri: Some(uploaded.file.uri),
        })
    }

    /// Uploads every file in the knowledge directory and creates a fresh
    /// context cache over them, persisting the descriptor.
    async fn upload_and_create_cache(
        &self,
        directory: &Path,
    ) -> Result<CachedContext, ProviderError> {
        let mut documents = Vec::new();
        for path in list_files(directory)? {
            documents.push(self.upload_document(&path).await?);
        }

        info!("Creating context cache for all documents...");

        let file_parts: Vec<Value> = documents
            .iter()
            .map(|doc| {
                serde_json::json!({
                    "fileData": {
                        "fileUri": doc.uri.clone().unwrap_or_default(),
                        "mimeType": "text/plain",
                    }
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "displayName": format!("{} reference documents", self.module),
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": file_parts }],
            "ttl": format!("{}s", DEFAULT_CACHE_TTL_SECS),
        });

        let url = self.endpoint("v1beta/cachedContents");
        let response = self
            .execute_with_backoff("cache creation", || {
                self.http_client.post(&url).json(&body)
            })
            .await?;

        let created: CachedContentResponse =
            response.json().await.map_err(|e| ProviderError::InvalidResponse {
                message: format!("Unparseable cache response: {}", e),
                raw_response: None,
            })?;

        let context = CachedContext {
            handle: created.name,
            created_at: Utc::now(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            documents,
        };

        self.cache_manager
            .persist(self.role, &self.module, &context)
            .map_err(|e| ProviderError::ConfigurationError {
                message: format!("Failed to persist cache descriptor: {}", e),
            })?;

        info!("Cache created: {}", context.handle);
        Ok(context)
    }

    /// Extends the TTL of an existing remote cache and re-persists the
    /// descriptor with a fresh creation time.
    async fn refresh_cache(&self, context: &CachedContext) -> Result<(), ProviderError> {
        let url = self.endpoint(&format!("v1beta/{}?updateMask=ttl", context.handle));
        let body = serde_json::json!({ "ttl": context.ttl_string() });

        self.execute_with_backoff("cache refresh", || {
            self.http_client.patch(&url).json(&body)
        })
        .await?;

        let refreshed = CachedContext {
            created_at: Utc::now(),
            ..context.clone()
        };
        self.cache_manager
            .persist(self.role, &self.module, &refreshed)
            .map_err(|e| ProviderError::ConfigurationError {
                message: format!("Failed to persist refreshed descriptor: {}", e),
            })?;

        debug!("Refreshed context cache {}", context.handle);
        Ok(())
    }
}

#[async_trait]
impl Provider for HostedClient {
    async fn converse(
        &self,
        prompt: &str,
        schema: Option<&SchemaContract>,
        session: SessionPolicy,
    ) -> Result<String, ProviderError> {
        let context = self.ensure_context().await?;

        if session == SessionPolicy::Fresh {
            self.session.lock().unwrap().clear();
        }

        let mut contents: Vec<Value> = self
            .session
            .lock()
            .unwrap()
            .iter()
            .map(|turn| {
                serde_json::json!({ "role": turn.role, "parts": [{ "text": turn.text }] })
            })
            .collect();
        contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": prompt }] }));

        let mut body = serde_json::json!({
            "cachedContent": context.handle,
            "contents": contents,
        });

        if let Some(contract) = schema {
            body["generationConfig"] = serde_json::json!({
                "responseMimeType": "application/json",
                "responseSchema": contract.describe(),
            });
        }

        let url = self.endpoint(&format!("v1beta/models/{}:generateContent", self.model));
        let start = std::time::Instant::now();

        let response = self
            .execute_with_backoff("generate", || self.http_client.post(&url).json(&body))
            .await?;

        let generated: GenerateContentResponse =
            response.json().await.map_err(|e| ProviderError::InvalidResponse {
                message: format!("Unparseable generate response: {}", e),
                raw_response: None,
            })?;

        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "No text content in response".to_string(),
                raw_response: None,
            })?;

        info!(
            "Hosted generation completed in {:.2}s (model={})",
            start.elapsed().as_secs_f64(),
            self.model
        );

        let mut turns = self.session.lock().unwrap();
        turns.push(ChatTurn {
            role: "user",
            text: prompt.to_string(),
        });
        turns.push(ChatTurn {
            role: "model",
            text: text.clone(),
        });

        Ok(text)
    }

    /// Idempotent: a usable cache only gets its TTL refreshed; documents are
    /// re-uploaded solely on a cache miss.
    async fn upload_reference_documents(&self, directory: &Path) -> Result<(), ProviderError> {
        if let Ok(context) = self.cache_manager.resolve(self.role, &self.module) {
            if self.remote_context_exists(&context.handle).await? {
                return self.refresh_cache(&context).await;
            }
        }

        self.upload_and_create_cache(directory).await?;
        Ok(())
    }

    /// Deletes the remote cache and every uploaded document it references.
    /// Each deletion is independent; failures are logged and swallowed. The
    /// local descriptor is removed regardless, so a corrupted or expired
    /// remote cache can never block cleanup, and a second call is a no-op.
    async fn teardown(&self) -> Result<(), ProviderError> {
        if let Some(context) = self.cache_manager.peek(self.role, &self.module) {
            let cache_url = self.endpoint(&format!("v1beta/{}", context.handle));
            match self
                .http_client
                .delete(&cache_url)
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    info!("Deleted context cache {}", context.handle);
                }
                Ok(response) => {
                    warn!(
                        "Context cache deletion returned status {}",
                        response.status()
                    );
                }
                Err(e) => warn!("Context cache deletion failed: {}", e),
            }

            for doc in &context.documents {
                let file_url = self.endpoint(&format!("v1beta/{}", doc.name));
                match self
                    .http_client
                    .delete(&file_url)
                    .header("x-goog-api-key", &self.api_key)
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => {
                        debug!("Deleted uploaded document {}", doc.name);
                    }
                    Ok(response) => warn!(
                        "Deletion of {} returned status {}",
                        doc.name,
                        response.status()
                    ),
                    Err(e) => warn!("Deletion of {} failed: {}", doc.name, e),
                }
            }
        }

        self.cache_manager
            .remove(self.role, &self.module)
            .map_err(|e| ProviderError::ConfigurationError {
                message: format!("Failed to remove local cache descriptor: {}", e),
            })?;

        info!("Clean-up complete for {}/{}", self.role, self.module);
        Ok(())
    }

    fn name(&self) -> &str {
        "hosted"
    }

    fn model_info(&self) -> Option<String> {
        Some(format!("{} ({})", self.model, self.role))
    }
}

impl fmt::Debug for HostedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedClient")
            .field("model", &self.model)
            .field("role", &self.role)
            .field("module", &self.module)
            .field("knowledge_dir", &self.knowledge_dir)
            .finish()
    }
}

fn list_files(directory: &Path) -> Result<Vec<PathBuf>, ProviderError> {
    let entries = std::fs::read_dir(directory).map_err(|e| ProviderError::ConfigurationError {
        message: format!(
            "Cannot read knowledge directory {}: {}",
            directory.display(),
            e
        ),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Response from the file upload endpoint
#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    name: String,
    #[serde(rename = "displayName", default)]
    display_name: String,
    uri: String,
}

/// Response from cache creation
#[derive(Debug, Deserialize)]
struct CachedContentResponse {
    name: String,
}

/// Response from content generation
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CandidatePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(6), Duration::from_millis(32_000));
        // far past the cap, still capped
        assert_eq!(backoff_delay(30), Duration::from_millis(32_000));
    }

    #[test]
    fn test_classify_status() {
        let rate_limited =
            HostedClient::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(rate_limited.is_transient());

        let server =
            HostedClient::classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(server.is_transient());

        let auth =
            HostedClient::classify_status(reqwest::StatusCode::FORBIDDEN, String::new());
        assert!(!auth.is_transient());
        assert!(matches!(auth, ProviderError::AuthenticationError { .. }));

        let bad_request =
            HostedClient::classify_status(reqwest::StatusCode::BAD_REQUEST, String::new());
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn test_generate_response_deserialization() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"output\": []}"}], "role": "model"}}
            ]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.candidates[0].content.parts[0].text, "{\"output\": []}");
    }

    #[test]
    fn test_generate_response_empty_candidates() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.candidates.is_empty());
    }

    #[test]
    fn test_upload_response_deserialization() {
        let json = r#"{
            "file": {
                "name": "files/abc123",
                "displayName": "requirements.txt",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123"
            }
        }"#;
        let response: FileUploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.file.name, "files/abc123");
        assert_eq!(response.file.display_name, "requirements.txt");
    }
}
