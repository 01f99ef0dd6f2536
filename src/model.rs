//! Request and result models shared by the streaming and REST paths.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ClientError;

/// Interaction modes offered by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    /// Streaming question answering over indexed documents.
    Rag,
    /// One-shot block generation over plain request/response.
    BlockRest,
    /// Streaming block generation.
    BlockSse,
}

impl ChatMode {
    /// The streaming mode this chat mode runs in, if it streams at all.
    pub fn stream_mode(self) -> Option<Mode> {
        match self {
            ChatMode::Rag => Some(Mode::Answer),
            ChatMode::BlockSse => Some(Mode::Artifact),
            ChatMode::BlockRest => None,
        }
    }
}

/// Event vocabulary of a streaming session, fixed when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Free-form answer text with citations.
    Answer,
    /// Structured artifact (code, summary, settings, property).
    Artifact,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Answer => f.write_str("answer"),
            Mode::Artifact => f.write_str("artifact"),
        }
    }
}

/// Body of a question-answering request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

/// Body of a streaming block generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockSseRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

/// Body of a non-streaming block generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub store_id: String,
    pub user_id: String,
    pub block_id: String,
    pub prompt: String,
}

/// A request that opens a streaming session.
///
/// Serializes to the JSON body expected by the endpoint of its mode.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StreamRequest {
    Answer(ChatRequest),
    Artifact(BlockSseRequest),
}

impl StreamRequest {
    /// A question for the answer endpoint.
    pub fn question(message: impl Into<String>) -> Self {
        StreamRequest::Answer(ChatRequest {
            message: message.into(),
        })
    }

    /// A block generation prompt without store/user/block context.
    pub fn block(prompt: impl Into<String>) -> Self {
        StreamRequest::Artifact(BlockSseRequest {
            prompt: prompt.into(),
            ..Default::default()
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            StreamRequest::Answer(_) => Mode::Answer,
            StreamRequest::Artifact(_) => Mode::Artifact,
        }
    }

    /// Reject requests with nothing to ask.
    pub fn validate(&self) -> Result<(), ClientError> {
        let text = match self {
            StreamRequest::Answer(req) => &req.message,
            StreamRequest::Artifact(req) => &req.prompt,
        };
        if text.trim().is_empty() {
            return Err(ClientError::Config(
                "request text must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A document cited by an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSource {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A generated block: the structured artifact handed to the renderer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BlockData {
    pub code: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub settings: Vec<Value>,
    #[serde(default)]
    pub property: Map<String, Value>,
}

/// A stored block as returned by the lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub block_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub success: bool,
    pub code: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub property: Value,
    #[serde(default)]
    pub settings: Vec<Value>,
    #[serde(default)]
    pub input_prompt: String,
}

/// How an artifact result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactExtraction {
    /// Decoded from the structured payload of the terminal event.
    Structured,
    /// Recovered from raw text by locating the embedded JSON object.
    Extracted,
    /// Nothing could be decoded; the raw text is kept in `code`.
    Placeholder,
}

/// The frozen outcome of a successful session.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalResult {
    /// A plain answer and the citations held when it completed.
    Answer {
        text: String,
        sources: Vec<DocumentSource>,
    },
    /// A generated block.
    Artifact {
        block: BlockData,
        extraction: ArtifactExtraction,
    },
    /// The generator declined the request; `message` is shown to the user as is.
    OutOfScope { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_request_bodies() {
        let question = serde_json::to_value(StreamRequest::question("hi")).unwrap();
        assert_eq!(question, json!({"message": "hi"}));

        let block = StreamRequest::Artifact(BlockSseRequest {
            prompt: "chart".into(),
            store_id: Some("s1".into()),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"prompt": "chart", "storeId": "s1"})
        );
        assert_eq!(block.mode(), Mode::Artifact);
    }

    #[test]
    fn test_blank_request_is_rejected() {
        assert!(StreamRequest::question("  ").validate().is_err());
        assert!(StreamRequest::block("x").validate().is_ok());
    }

    #[test]
    fn test_chat_mode_wire_names() {
        let mode: ChatMode = serde_json::from_str("\"block-sse\"").unwrap();
        assert_eq!(mode, ChatMode::BlockSse);
        assert_eq!(mode.stream_mode(), Some(Mode::Artifact));
        assert_eq!(ChatMode::BlockRest.stream_mode(), None);
    }

    #[test]
    fn test_block_data_defaults() {
        let block: BlockData = serde_json::from_value(json!({"code": "<div/>"})).unwrap();
        assert_eq!(block.code, "<div/>");
        assert!(block.summary.is_empty());
        assert!(block.settings.is_empty());
        assert!(block.property.is_empty());
    }
}
