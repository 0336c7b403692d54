pub mod prompt;

use forgeflow_core::{CancellationToken, ChatMessage, TokenUsage};

pub use prompt::{system_prompt, PromptMode};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm stream error: {0}")]
    Stream(String),
    #[error("llm call cancelled")]
    Cancelled,
}

/// A single chat completion request. `model_override` lets a handler pin a
/// specific reviewer/critic model for one call without changing the
/// session's default.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub cancel: CancellationToken,
    pub model_override: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, cancel: CancellationToken) -> Self {
        Self {
            messages,
            cancel,
            model_override: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Called once per streamed text chunk with the chunk already stripped of
/// `<think>`/`[TOOL_CALL]` spans. Implementors poll `request.cancel` between
/// chunks and stop forwarding once cancellation is observed.
pub type StreamChunkCallback<'a> = &'a mut dyn FnMut(&str);

/// The streaming-chat abstraction the engine consumes. Transport, retries,
/// and credentials belong to the implementor; this crate only assembles
/// prompts and sanitizes the visible stream.
pub trait LlmCollaborator {
    fn stream_chat(
        &self,
        request: ChatRequest,
        on_chunk: StreamChunkCallback<'_>,
    ) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLlm;

    impl LlmCollaborator for EchoLlm {
        fn stream_chat(
            &self,
            request: ChatRequest,
            on_chunk: StreamChunkCallback<'_>,
        ) -> Result<ChatResponse, LlmError> {
            let mut text = String::new();
            for chunk in ["<think>ignored</think>", "hello ", "world"] {
                if request.cancel.is_cancelled() {
                    return Err(LlmError::Cancelled);
                }
                let visible = prompt::strip_hidden_spans(chunk);
                on_chunk(&visible);
                text.push_str(&visible);
            }
            Ok(ChatResponse {
                text,
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 2,
                }),
            })
        }
    }

    #[test]
    fn stream_chat_forwards_sanitized_chunks() {
        let llm = EchoLlm;
        let mut forwarded = String::new();
        let request = ChatRequest::new(
            vec![ChatMessage::User {
                content: "hi".into(),
            }],
            CancellationToken::new(),
        );
        let response = llm
            .stream_chat(request, &mut |chunk| forwarded.push_str(chunk))
            .unwrap();
        assert_eq!(forwarded, "hello world");
        assert_eq!(response.text, "hello world");
        assert_eq!(response.usage.unwrap().total(), 12);
    }

    #[test]
    fn cancellation_short_circuits_stream() {
        let llm = EchoLlm;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ChatRequest::new(Vec::new(), cancel);
        let err = llm.stream_chat(request, &mut |_| {}).unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }
}
