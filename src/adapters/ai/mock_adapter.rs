//! Mock chat adapter for testing and keyless dev runs.
//!
//! Pops scripted replies in order; with no script it behaves like an
//! unreachable backend, which exercises every fallback path.

use crate::domain::DomainError;
use crate::ports::{ChatPort, ChatRequest};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub struct MockChatAdapter {
    replies: Mutex<VecDeque<Result<String, String>>>,
    delay_ms: u64,
}

impl MockChatAdapter {
    /// An adapter with no scripted replies: every call fails.
    pub fn unreachable() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            delay_ms: 0,
        }
    }

    /// Scripted replies consumed in order; calls past the end fail.
    pub fn with_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay_ms: 0,
        }
    }

    /// Simulate network latency.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait::async_trait]
impl ChatPort for MockChatAdapter {
    async fn chat(&self, request: &ChatRequest) -> Result<String, DomainError> {
        info!(model = %request.model, "[MOCK] chat call");
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match self.replies.lock().await.pop_front() {
            Some(Ok(content)) => Ok(content),
            Some(Err(reason)) => Err(DomainError::Inference(reason)),
            None => Err(DomainError::Inference(
                "mock chat adapter has no reply".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChatMessage, ChatOptions};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            format: None,
            options: ChatOptions::default(),
            messages: vec![ChatMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let adapter = MockChatAdapter::with_replies(vec![
            Ok("first".to_string()),
            Err("boom".to_string()),
        ]);
        assert_eq!(adapter.chat(&request()).await.unwrap(), "first");
        assert!(adapter.chat(&request()).await.is_err());
        assert!(adapter.chat(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_always_fails() {
        let adapter = MockChatAdapter::unreachable();
        assert!(adapter.chat(&request()).await.is_err());
    }
}
