//! Scripted provider for tests
//!
//! Replays a queue of canned replies and records every prompt it receives,
//! so tests can assert both call counts and prompt contents (e.g. that
//! verifier feedback made it into the next generation prompt).

use crate::ai::error::ProviderError;
use crate::ai::provider::{Provider, SessionPolicy};
use crate::schema::SchemaContract;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(ProviderError),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        MockReply::Text(content.into())
    }

    pub fn error(error: ProviderError) -> Self {
        MockReply::Error(error)
    }
}

/// Scripted provider implementation
pub struct MockProvider {
    name: String,
    replies: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
    uploads: Mutex<u32>,
    teardowns: Mutex<u32>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_name("mock")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            uploads: Mutex::new(0),
            teardowns: Mutex::new(0),
        }
    }

    pub fn enqueue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn enqueue_all(&self, replies: impl IntoIterator<Item = MockReply>) {
        let mut queue = self.replies.lock().unwrap();
        for reply in replies {
            queue.push_back(reply);
        }
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn upload_count(&self) -> u32 {
        *self.uploads.lock().unwrap()
    }

    pub fn teardown_count(&self) -> u32 {
        *self.teardowns.lock().unwrap()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn converse(
        &self,
        prompt: &str,
        _schema: Option<&SchemaContract>,
        _session: SessionPolicy,
    ) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Text(content)) => Ok(content),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(ProviderError::InvalidResponse {
                message: "MockProvider exhausted its scripted replies".to_string(),
                raw_response: None,
            }),
        }
    }

    async fn upload_reference_documents(&self, _directory: &Path) -> Result<(), ProviderError> {
        *self.uploads.lock().unwrap() += 1;
        Ok(())
    }

    async fn teardown(&self) -> Result<(), ProviderError> {
        *self.teardowns.lock().unwrap() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let provider = MockProvider::new();
        provider.enqueue(MockReply::text("first"));
        provider.enqueue(MockReply::text("second"));

        let a = provider
            .converse("p1", None, SessionPolicy::Reuse)
            .await
            .unwrap();
        let b = provider
            .converse("p2", None, SessionPolicy::Reuse)
            .await
            .unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(provider.prompts(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_mock_exhausted_queue_errors() {
        let provider = MockProvider::new();
        let result = provider.converse("p", None, SessionPolicy::Reuse).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let provider = MockProvider::new();
        provider.enqueue(MockReply::error(ProviderError::ContentFailure {
            attempts: 3,
        }));
        let err = provider
            .converse("p", None, SessionPolicy::Reuse)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentFailure { .. }));
    }
}
