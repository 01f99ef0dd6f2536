//! Typed stream events and the per-record parser.
//!
//! Every record payload is a JSON object `{type, content?, data?}`. Both modes
//! share one event type; the mode only decides which discriminants are
//! accepted.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{DocumentSource, Mode};

/// Discriminant of a stream event, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    Token,
    CodeToken,
    CodeSectionComplete,
    Sources,
    Done,
    Complete,
    OutOfScope,
    Error,
}

impl EventKind {
    pub fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "status" => EventKind::Status,
            "token" => EventKind::Token,
            "codeToken" => EventKind::CodeToken,
            "codeSectionComplete" => EventKind::CodeSectionComplete,
            "sources" => EventKind::Sources,
            "done" => EventKind::Done,
            "complete" => EventKind::Complete,
            "outOfScope" => EventKind::OutOfScope,
            "error" => EventKind::Error,
            _ => return None,
        })
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::Token => "token",
            EventKind::CodeToken => "codeToken",
            EventKind::CodeSectionComplete => "codeSectionComplete",
            EventKind::Sources => "sources",
            EventKind::Done => "done",
            EventKind::Complete => "complete",
            EventKind::OutOfScope => "outOfScope",
            EventKind::Error => "error",
        }
    }

    /// Whether dispatching this kind ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::Done | EventKind::Complete | EventKind::OutOfScope | EventKind::Error
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Mode {
    /// Whether `kind` belongs to this mode's vocabulary.
    pub fn allows(self, kind: EventKind) -> bool {
        match self {
            Mode::Answer => matches!(
                kind,
                EventKind::Status
                    | EventKind::Token
                    | EventKind::Sources
                    | EventKind::Done
                    | EventKind::Error
            ),
            Mode::Artifact => matches!(
                kind,
                EventKind::Token
                    | EventKind::CodeToken
                    | EventKind::CodeSectionComplete
                    | EventKind::Complete
                    | EventKind::OutOfScope
                    | EventKind::Error
            ),
        }
    }
}

/// Raw payload of a `complete` event.
///
/// Kept undecoded: the dispatcher resolves it against the accumulated text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletePayload {
    pub content: Option<Value>,
    pub data: Option<Value>,
}

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Status(String),
    Token(String),
    CodeToken(String),
    CodeSectionComplete(Option<String>),
    Sources(Vec<DocumentSource>),
    Done,
    Complete(CompletePayload),
    OutOfScope(String),
    Error(Option<String>),
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::Token(_) => EventKind::Token,
            StreamEvent::CodeToken(_) => EventKind::CodeToken,
            StreamEvent::CodeSectionComplete(_) => EventKind::CodeSectionComplete,
            StreamEvent::Sources(_) => EventKind::Sources,
            StreamEvent::Done => EventKind::Done,
            StreamEvent::Complete(_) => EventKind::Complete,
            StreamEvent::OutOfScope(_) => EventKind::OutOfScope,
            StreamEvent::Error(_) => EventKind::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

/// Why a record could not be turned into a [`StreamEvent`].
///
/// Never fatal: the record is dropped and the session carries on.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("record is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unknown event type `{0}`")]
    UnknownKind(String),

    #[error("event type `{kind}` is not valid in {mode} mode")]
    WrongMode { kind: EventKind, mode: Mode },

    #[error("invalid `{kind}` payload: {reason}")]
    InvalidPayload { kind: EventKind, reason: String },
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Parse one record payload (the text after `data:`) for the given mode.
///
/// # Example
/// ```
/// use streamchat::event::{parse_event, StreamEvent};
/// use streamchat::model::Mode;
///
/// let event = parse_event(Mode::Answer, r#"{"type":"token","content":"Hi"}"#).unwrap();
/// assert_eq!(event, StreamEvent::Token("Hi".to_string()));
/// assert!(parse_event(Mode::Answer, "{not json").is_err());
/// ```
pub fn parse_event(mode: Mode, payload: &str) -> Result<StreamEvent, ParseFailure> {
    let wire: WireEvent = serde_json::from_str(payload.trim())?;
    let kind = EventKind::from_wire(&wire.kind).ok_or(ParseFailure::UnknownKind(wire.kind))?;

    if !mode.allows(kind) {
        return Err(ParseFailure::WrongMode { kind, mode });
    }

    let event = match kind {
        EventKind::Status => {
            StreamEvent::Status(optional_text(kind, wire.content)?.unwrap_or_default())
        }
        EventKind::Token => StreamEvent::Token(required_text(kind, wire.content)?),
        EventKind::CodeToken => StreamEvent::CodeToken(required_text(kind, wire.content)?),
        EventKind::CodeSectionComplete => {
            StreamEvent::CodeSectionComplete(optional_text(kind, wire.content)?)
        }
        EventKind::Sources => {
            let raw = wire
                .data
                .or(wire.content)
                .ok_or_else(|| invalid(kind, "missing source list"))?;
            let sources: Vec<DocumentSource> =
                serde_json::from_value(raw).map_err(|e| invalid(kind, e.to_string()))?;
            StreamEvent::Sources(sources)
        }
        EventKind::Done => StreamEvent::Done,
        EventKind::Complete => StreamEvent::Complete(CompletePayload {
            content: wire.content.filter(|v| !v.is_null()),
            data: wire.data.filter(|v| !v.is_null()),
        }),
        EventKind::OutOfScope => {
            StreamEvent::OutOfScope(optional_text(kind, wire.content)?.unwrap_or_default())
        }
        EventKind::Error => StreamEvent::Error(match wire.content {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        }),
    };

    Ok(event)
}

fn invalid(kind: EventKind, reason: impl Into<String>) -> ParseFailure {
    ParseFailure::InvalidPayload {
        kind,
        reason: reason.into(),
    }
}

fn optional_text(kind: EventKind, content: Option<Value>) -> Result<Option<String>, ParseFailure> {
    match content {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(kind, "content must be a string")),
    }
}

fn required_text(kind: EventKind, content: Option<Value>) -> Result<String, ParseFailure> {
    optional_text(kind, content)?.ok_or_else(|| invalid(kind, "missing content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_events() {
        assert_eq!(
            parse_event(Mode::Answer, r#"{"type":"status","content":"Searching"}"#).unwrap(),
            StreamEvent::Status("Searching".into())
        );
        assert_eq!(
            parse_event(Mode::Answer, r#"{"type":"done"}"#).unwrap(),
            StreamEvent::Done
        );
        assert_eq!(
            parse_event(Mode::Answer, r#"{"type":"error","content":"boom"}"#).unwrap(),
            StreamEvent::Error(Some("boom".into()))
        );
    }

    #[test]
    fn test_parse_sources() {
        let payload = r#"{"type":"sources","data":[{"id":"1","title":"Guide","content":"...","score":0.91,"url":"https://x"}]}"#;
        match parse_event(Mode::Answer, payload).unwrap() {
            StreamEvent::Sources(sources) => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].title, "Guide");
                assert_eq!(sources[0].url.as_deref(), Some("https://x"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sources_rejects_bad_shape() {
        let err = parse_event(Mode::Answer, r#"{"type":"sources","data":{"id":1}}"#).unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidPayload { kind: EventKind::Sources, .. }));
    }

    #[test]
    fn test_parse_artifact_events() {
        assert_eq!(
            parse_event(Mode::Artifact, r#"{"type":"codeToken","content":"<div>"}"#).unwrap(),
            StreamEvent::CodeToken("<div>".into())
        );
        assert_eq!(
            parse_event(Mode::Artifact, r#"{"type":"codeSectionComplete"}"#).unwrap(),
            StreamEvent::CodeSectionComplete(None)
        );
        assert_eq!(
            parse_event(Mode::Artifact, r#"{"type":"outOfScope","content":"Sorry"}"#).unwrap(),
            StreamEvent::OutOfScope("Sorry".into())
        );

        let complete = parse_event(
            Mode::Artifact,
            r#"{"type":"complete","content":{"code":"x","summary":"y"}}"#,
        )
        .unwrap();
        assert!(complete.is_terminal());
        assert!(matches!(complete, StreamEvent::Complete(CompletePayload { content: Some(_), data: None })));
    }

    #[test]
    fn test_mode_vocabulary_is_enforced() {
        let err = parse_event(Mode::Artifact, r#"{"type":"status","content":"x"}"#).unwrap_err();
        assert!(matches!(err, ParseFailure::WrongMode { kind: EventKind::Status, mode: Mode::Artifact }));

        let err = parse_event(Mode::Answer, r#"{"type":"complete"}"#).unwrap_err();
        assert!(matches!(err, ParseFailure::WrongMode { .. }));
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            parse_event(Mode::Answer, "{not json"),
            Err(ParseFailure::InvalidJson(_))
        ));
        assert!(matches!(
            parse_event(Mode::Answer, r#"{"type":"ping"}"#),
            Err(ParseFailure::UnknownKind(name)) if name == "ping"
        ));
        assert!(matches!(
            parse_event(Mode::Answer, r#"{"type":"token"}"#),
            Err(ParseFailure::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse_event(Mode::Answer, r#"{"type":"token","content":5}"#),
            Err(ParseFailure::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_terminal_kinds() {
        for kind in [EventKind::Done, EventKind::Complete, EventKind::OutOfScope, EventKind::Error] {
            assert!(kind.is_terminal(), "{} should be terminal", kind);
        }
        assert!(!EventKind::Token.is_terminal());
        assert_eq!(EventKind::from_wire("codeSectionComplete"), Some(EventKind::CodeSectionComplete));
    }
}
