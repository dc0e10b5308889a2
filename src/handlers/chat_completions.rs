use crate::domain::{BatchRequestLine, BatchResultLine};

use super::traits::{EndpointHandler, HandlerError};

/// The only endpoint the server currently executes batches against. Named
/// for the route it serves rather than left generic, since a second
/// endpoint would earn its own handler rather than a flag on this one.
#[derive(Debug, Default)]
pub struct ChatCompletionsHandler;

impl ChatCompletionsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl EndpointHandler for ChatCompletionsHandler {
    fn parse_line(&self, raw: &str) -> Result<BatchRequestLine, HandlerError> {
        serde_json::from_str(raw).map_err(|e| HandlerError::Malformed(e.to_string()))
    }

    fn validate(&self, line: &BatchRequestLine) -> Result<(), HandlerError> {
        if line.custom_id.trim().is_empty() {
            return Err(HandlerError::Invalid("custom_id must not be empty".into()));
        }
        if line.method != "POST" {
            return Err(HandlerError::Invalid(format!(
                "unsupported method: {}",
                line.method
            )));
        }
        if line.url != "/v1/chat/completions" {
            return Err(HandlerError::Invalid(format!(
                "unsupported url: {}",
                line.url
            )));
        }
        if line.body.messages.is_empty() {
            return Err(HandlerError::Invalid(
                "messages must contain at least one entry".into(),
            ));
        }
        Ok(())
    }

    fn default_render(&self, line: &BatchResultLine) -> Result<String, HandlerError> {
        serde_json::to_string(line).map_err(|e| HandlerError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, ChatRequestBody};
    use std::collections::BTreeMap;

    fn valid_line() -> BatchRequestLine {
        BatchRequestLine {
            custom_id: "req-1".to_string(),
            method: "POST".to_string(),
            url: "/v1/chat/completions".to_string(),
            body: ChatRequestBody {
                model: "gemma-3-4b".to_string(),
                messages: vec![ChatMessage {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                }],
                max_tokens: None,
                temperature: None,
                top_p: None,
                stop: None,
                extra: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn parses_well_formed_line() {
        let handler = ChatCompletionsHandler::new();
        let raw = serde_json::to_string(&valid_line()).unwrap();
        let parsed = handler.parse_line(&raw).unwrap();
        assert_eq!(parsed.custom_id, "req-1");
    }

    #[test]
    fn rejects_empty_custom_id() {
        let handler = ChatCompletionsHandler::new();
        let mut line = valid_line();
        line.custom_id = String::new();
        assert!(handler.validate(&line).is_err());
    }

    #[test]
    fn rejects_unsupported_url() {
        let handler = ChatCompletionsHandler::new();
        let mut line = valid_line();
        line.url = "/v1/embeddings".to_string();
        assert!(handler.validate(&line).is_err());
    }

    #[test]
    fn rejects_empty_messages() {
        let handler = ChatCompletionsHandler::new();
        let mut line = valid_line();
        line.body.messages.clear();
        assert!(handler.validate(&line).is_err());
    }
}
