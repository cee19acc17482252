//! Self-hosted inference server client
//!
//! Talks to an OpenAI-compatible `chat/completions` endpoint with bearer
//! token auth. The substrate is stateless: every call re-reads the
//! knowledge directory and injects the file contents into the prompt, and
//! schema conformance is enforced by instruction plus a bounded content
//! retry, not by the API itself.

use crate::ai::error::ProviderError;
use crate::ai::provider::{Provider, SessionPolicy};
use crate::schema::SchemaContract;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default request timeout for self-hosted API calls
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Attempts at coaxing a schema-conformant body out of the model.
///
/// This is a content retry: a new completion per attempt, no backoff.
const DEFAULT_CONTENT_TRIES: u32 = 3;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 25_000;

/// Client for a self-hosted OpenAI-compatible inference server
pub struct SelfHostedClient {
    /// API base URL, e.g. "https://ai.example.com/api"
    base_url: String,

    /// Bearer token for authentication
    api_key: String,

    /// Model name to use for inference
    model: String,

    /// Knowledge collection name (one per task module)
    module: String,

    /// Directory of reference documents injected into every prompt
    knowledge_dir: PathBuf,

    /// Server-side knowledge collection id, once resolved
    knowledge_id: Mutex<Option<String>>,

    /// Shared HTTP client with connection pooling
    http_client: Client,

    timeout: Duration,
    content_tries: u32,
}

impl SelfHostedClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        module: String,
        knowledge_dir: PathBuf,
    ) -> Self {
        Self::with_timeout(
            base_url,
            api_key,
            model,
            module,
            knowledge_dir,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: String,
        api_key: String,
        model: String,
        module: String,
        knowledge_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url,
            api_key,
            model,
            module,
            knowledge_dir,
            knowledge_id: Mutex::new(None),
            http_client,
            timeout,
            content_tries: DEFAULT_CONTENT_TRIES,
        }
    }

    pub fn with_content_tries(mut self, tries: u32) -> Self {
        self.content_tries = tries.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Checks whether the inference server is reachable and the token works.
    ///
    /// Returns `Ok(false)` for an unreachable or unhealthy server; only
    /// unexpected transport states surface as errors.
    pub async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = self.endpoint("models");
        debug!("Checking self-hosted server health at {}", url);

        match self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => {
                let is_healthy = response.status().is_success();
                if is_healthy {
                    info!("Self-hosted server health check successful");
                } else {
                    warn!(
                        "Self-hosted server health check failed with status: {}",
                        response.status()
                    );
                }
                Ok(is_healthy)
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!("Cannot reach self-hosted server at {}", self.base_url);
                Ok(false)
            }
            Err(e) => Err(ProviderError::NetworkError {
                message: format!("Health check failed: {}", e),
            }),
        }
    }

    /// One completion request; transport failures are fatal, non-success
    /// statuses are reported as `None` so the content loop counts them.
    async fn complete(&self, prompt: &str) -> Result<Option<String>, ProviderError> {
        let collection_id = self.knowledge_id.lock().unwrap().clone();
        let files = collection_id
            .map(|id| {
                vec![FileReference {
                    kind: "collection".to_string(),
                    id,
                }]
            })
            .unwrap_or_default();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            files,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        };

        debug!(
            "Sending request to self-hosted server: model={}, prompt_length={}",
            self.model,
            prompt.len()
        );

        let response = self
            .http_client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Self-hosted API returned status {}: {}", status, body);
            return Ok(None);
        }

        let completion: ChatCompletionResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unparseable completion body: {}", e);
                return Ok(None);
            }
        };

        Ok(completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::TimeoutError {
                seconds: self.timeout.as_secs(),
            }
        } else if e.is_connect() {
            ProviderError::NetworkError {
                message: format!("Cannot connect to {}: {}", self.base_url, e),
            }
        } else {
            ProviderError::NetworkError {
                message: format!("Request failed: {}", e),
            }
        }
    }

    async fn list_collections(&self) -> Result<Vec<KnowledgeCollection>, ProviderError> {
        let response = self
            .http_client
            .get(self.endpoint("v1/knowledge/"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                message: "Failed to list knowledge collections".to_string(),
                status_code: Some(response.status().as_u16()),
            });
        }

        response.json().await.map_err(|e| ProviderError::InvalidResponse {
            message: format!("Unparseable knowledge listing: {}", e),
            raw_response: None,
        })
    }

    /// Reuses a same-named collection when one exists; creates it otherwise.
    async fn find_or_create_collection(&self) -> Result<String, ProviderError> {
        if let Some(id) = self.knowledge_id.lock().unwrap().clone() {
            return Ok(id);
        }

        let collections = self.list_collections().await?;
        if let Some(existing) = collections.iter().find(|c| c.name == self.module) {
            info!(
                "Reusing knowledge collection '{}' ({})",
                existing.name, existing.id
            );
            *self.knowledge_id.lock().unwrap() = Some(existing.id.clone());
            return Ok(existing.id.clone());
        }

        let response = self
            .http_client
            .post(self.endpoint("v1/knowledge/create"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "name": self.module,
                "description": format!("Reference documents for {}", self.module),
            }))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                message: format!("Failed to create knowledge collection '{}'", self.module),
                status_code: Some(response.status().as_u16()),
            });
        }

        let created: KnowledgeCollection =
            response.json().await.map_err(|e| ProviderError::InvalidResponse {
                message: format!("Unparseable collection response: {}", e),
                raw_response: None,
            })?;

        info!("Created knowledge collection '{}' ({})", self.module, created.id);
        *self.knowledge_id.lock().unwrap() = Some(created.id.clone());
        Ok(created.id)
    }

    async fn upload_file(&self, path: &Path) -> Result<String, ProviderError> {
        let bytes = std::fs::read(path).map_err(|e| ProviderError::ConfigurationError {
            message: format!("Cannot read reference document {}: {}", path.display(), e),
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.endpoint("v1/files/"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                message: format!("Failed to upload {}", file_name),
                status_code: Some(response.status().as_u16()),
            });
        }

        let uploaded: FileUploadResponse =
            response.json().await.map_err(|e| ProviderError::InvalidResponse {
                message: format!("Unparseable upload response: {}", e),
                raw_response: None,
            })?;

        debug!("Uploaded {} as {}", file_name, uploaded.id);
        Ok(uploaded.id)
    }

    async fn register_file(&self, collection_id: &str, file_id: &str) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(self.endpoint(&format!("v1/knowledge/{}/file/add", collection_id)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                message: format!("Failed to add file {} to knowledge collection", file_id),
                status_code: Some(response.status().as_u16()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for SelfHostedClient {
    /// Runs the content-retry loop: each attempt sends the full prompt
    /// (knowledge preamble included) and is judged on whether the body
    /// satisfies the schema. No backoff between attempts.
    async fn converse(
        &self,
        prompt: &str,
        schema: Option<&SchemaContract>,
        _session: SessionPolicy,
    ) -> Result<String, ProviderError> {
        let knowledge = build_knowledge_preamble(&self.knowledge_dir)?;
        let mut full_prompt = format!("{}{}", prompt, knowledge);

        if let Some(contract) = schema {
            full_prompt.push_str(&json_only_instruction(contract));
        }

        for attempt in 1..=self.content_tries {
            info!("Run #{} to generate content", attempt);

            let Some(content) = self.complete(&full_prompt).await? else {
                continue;
            };

            match schema {
                Some(contract) => match contract.validate(&content) {
                    Ok(artifact) => return Ok(artifact.render()),
                    Err(violation) => {
                        warn!(
                            "Attempt {} produced non-conformant output: {}",
                            attempt, violation
                        );
                    }
                },
                // Without a schema obligation any completion body is final
                None => return Ok(content),
            }
        }

        Err(ProviderError::ContentFailure {
            attempts: self.content_tries,
        })
    }

    /// Registers the directory's files into the named knowledge collection.
    /// A same-named collection is reused rather than recreated.
    async fn upload_reference_documents(&self, directory: &Path) -> Result<(), ProviderError> {
        let collection_id = self.find_or_create_collection().await?;

        for path in list_files(directory)? {
            let file_id = self.upload_file(&path).await?;
            self.register_file(&collection_id, &file_id).await?;
        }

        Ok(())
    }

    /// Deletes the knowledge collection along with its files. Failures are
    /// logged and swallowed; a second call finds nothing and does nothing.
    async fn teardown(&self) -> Result<(), ProviderError> {
        let remembered = self.knowledge_id.lock().unwrap().take();
        let collection_id = match remembered {
            Some(id) => Some(id),
            None => match self.list_collections().await {
                Ok(collections) => collections
                    .into_iter()
                    .find(|c| c.name == self.module)
                    .map(|c| c.id),
                Err(e) => {
                    warn!("Could not list knowledge collections during teardown: {}", e);
                    None
                }
            },
        };

        let Some(id) = collection_id else {
            debug!("No knowledge collection to tear down for '{}'", self.module);
            return Ok(());
        };

        let result = self
            .http_client
            .delete(self.endpoint(&format!("v1/knowledge/{}/delete", id)))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Deleted knowledge collection {}", id);
            }
            Ok(response) => {
                warn!(
                    "Knowledge collection deletion returned status {}",
                    response.status()
                );
            }
            Err(e) => {
                warn!("Knowledge collection deletion failed: {}", e);
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "selfhosted"
    }

    fn model_info(&self) -> Option<String> {
        Some(format!("{} @ {}", self.model, self.base_url))
    }
}

impl fmt::Debug for SelfHostedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfHostedClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("module", &self.module)
            .field("knowledge_dir", &self.knowledge_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Reads every file in the knowledge directory and concatenates the
/// contents verbatim into a preamble appended to the prompt.
pub fn build_knowledge_preamble(directory: &Path) -> Result<String, ProviderError> {
    let mut knowledge =
        String::from("\n\nHere is the knowledge base to refer to for your task:\n");

    for path in list_files(directory)? {
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ProviderError::ConfigurationError {
                message: format!("Cannot read reference document {}: {}", path.display(), e),
            }
        })?;
        knowledge.push_str(&contents);
        knowledge.push('\n');
    }

    Ok(knowledge)
}

/// Instruction forbidding anything but raw JSON matching the schema
fn json_only_instruction(contract: &SchemaContract) -> String {
    format!(
        "\n\nYou must respond ONLY with valid JSON matching this schema:\n{}\n\
         Do not include any explanatory text, markdown formatting, or code blocks. \
         Return raw JSON only, with no preceding json markdown.",
        contract.describe()
    )
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
    // Deterministic prompt assembly regardless of directory iteration order
    files.sort();
    Ok(files)
}

/// Request structure for the chat completions API
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<FileReference>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct RequestMessage {
    role: String,
    content: String,
}

/// Server-side knowledge collection reference attached to a completion
#[derive(Debug, Clone, Serialize)]
struct FileReference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct KnowledgeCollection {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FileUploadResponse {
    id: String,
}
