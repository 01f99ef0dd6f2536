//! Per-session accumulation of streamed content.

use serde_json::Value;
use tracing::{debug, warn};

use crate::event::{CompletePayload, StreamEvent};
use crate::model::{ArtifactExtraction, BlockData, DocumentSource, FinalResult, Mode};

const CODE_SECTION_DONE_STATUS: &str = "Code generated, writing summary...";
const PARSE_FAILED_SUMMARY: &str = "parse failed";
const UNKNOWN_ERROR: &str = "unknown error";

/// What the session loop should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Non-terminal event applied; the session keeps streaming.
    Continue,
    /// Terminal success.
    Finished(FinalResult),
    /// Terminal failure reported by the upstream generator.
    Failed(String),
    /// The accumulator is already frozen; nothing changed.
    Ignored,
}

/// The answer being built by one session.
///
/// Text is only ever appended. After the first terminal event the
/// accumulator is frozen and every further event is ignored.
#[derive(Debug)]
pub struct Accumulator {
    mode: Mode,
    text: String,
    status_text: String,
    sources: Vec<DocumentSource>,
    finished: bool,
}

impl Accumulator {
    pub fn new(mode: Mode, initial_status: impl Into<String>) -> Self {
        Self {
            mode,
            text: String::new(),
            status_text: initial_status.into(),
            sources: Vec::new(),
            finished: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn sources(&self) -> &[DocumentSource] {
        &self.sources
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn on_event(&mut self, event: StreamEvent) -> Dispatch {
        if self.finished {
            debug!(kind = %event.kind(), "ignoring event after terminal event");
            return Dispatch::Ignored;
        }

        match event {
            StreamEvent::Status(text) => {
                self.status_text = text;
                Dispatch::Continue
            }
            StreamEvent::Token(content) | StreamEvent::CodeToken(content) => {
                self.text.push_str(&content);
                Dispatch::Continue
            }
            StreamEvent::CodeSectionComplete(text) => {
                self.status_text = text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| CODE_SECTION_DONE_STATUS.to_string());
                Dispatch::Continue
            }
            StreamEvent::Sources(sources) => {
                self.sources = sources;
                Dispatch::Continue
            }
            StreamEvent::Done => {
                self.finished = true;
                Dispatch::Finished(FinalResult::Answer {
                    text: self.text.clone(),
                    sources: self.sources.clone(),
                })
            }
            StreamEvent::Complete(payload) => {
                self.finished = true;
                let (block, extraction) = resolve_artifact(payload, &self.text);
                Dispatch::Finished(FinalResult::Artifact { block, extraction })
            }
            StreamEvent::OutOfScope(message) => {
                self.finished = true;
                Dispatch::Finished(FinalResult::OutOfScope { message })
            }
            StreamEvent::Error(message) => {
                self.finished = true;
                Dispatch::Failed(
                    message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                )
            }
        }
    }
}

/// Turn a `complete` payload into a block.
///
/// Prefers the structured payload, then JSON embedded in the raw text, then
/// a placeholder that keeps the raw text as `code`.
pub fn resolve_artifact(payload: CompletePayload, accumulated: &str) -> (BlockData, ArtifactExtraction) {
    for candidate in [&payload.content, &payload.data].into_iter().flatten() {
        if candidate.is_object() {
            match serde_json::from_value::<BlockData>(candidate.clone()) {
                Ok(block) => return (block, ArtifactExtraction::Structured),
                Err(e) => debug!(error = %e, "structured complete payload is not a block"),
            }
        }
    }

    let raw = match &payload.content {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(other) if !other.is_string() && accumulated.trim().is_empty() => other.to_string(),
        _ => accumulated.to_string(),
    };

    if let Some(block) = extract_block(&raw) {
        warn!("complete event had no structured block, recovered one from raw text");
        return (block, ArtifactExtraction::Extracted);
    }

    warn!(len = raw.len(), "could not parse generated block, using placeholder");
    let placeholder = BlockData {
        code: raw,
        summary: PARSE_FAILED_SUMMARY.to_string(),
        ..Default::default()
    };
    (placeholder, ArtifactExtraction::Placeholder)
}

/// Best-effort recovery of a block from model output.
///
/// Strips Markdown code fences and decodes the outermost `{...}` span.
pub fn extract_block(raw: &str) -> Option<BlockData> {
    let text = strip_code_fence(raw.trim());
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<BlockData>(&text[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string (e.g. `json`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body).trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer() -> Accumulator {
        Accumulator::new(Mode::Answer, "Processing")
    }

    fn artifact() -> Accumulator {
        Accumulator::new(Mode::Artifact, "Processing")
    }

    #[test]
    fn test_tokens_append_in_order() {
        let mut acc = answer();
        for token in ["Hel", "lo", ", ", "world"] {
            assert_eq!(acc.on_event(StreamEvent::Token(token.into())), Dispatch::Continue);
        }
        assert_eq!(acc.text(), "Hello, world");
    }

    #[test]
    fn test_status_only_changes_status_text() {
        let mut acc = answer();
        acc.on_event(StreamEvent::Token("a".into()));
        acc.on_event(StreamEvent::Status("Searching documents".into()));
        assert_eq!(acc.status_text(), "Searching documents");
        assert_eq!(acc.text(), "a");
    }

    #[test]
    fn test_sources_last_write_wins() {
        let mut acc = answer();
        let source = |id: &str| DocumentSource {
            id: id.into(),
            title: format!("doc {}", id),
            content: String::new(),
            score: 0.5,
            url: None,
        };
        acc.on_event(StreamEvent::Sources(vec![source("1"), source("2")]));
        acc.on_event(StreamEvent::Token("x".into()));
        acc.on_event(StreamEvent::Sources(vec![source("3")]));

        match acc.on_event(StreamEvent::Done) {
            Dispatch::Finished(FinalResult::Answer { text, sources }) => {
                assert_eq!(text, "x");
                assert_eq!(sources, vec![source("3")]);
            }
            other => panic!("unexpected dispatch: {:?}", other),
        }
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let mut acc = answer();
        acc.on_event(StreamEvent::Token("done".into()));
        assert!(matches!(acc.on_event(StreamEvent::Done), Dispatch::Finished(_)));

        assert_eq!(acc.on_event(StreamEvent::Token("more".into())), Dispatch::Ignored);
        assert_eq!(acc.on_event(StreamEvent::Status("late".into())), Dispatch::Ignored);
        assert_eq!(acc.on_event(StreamEvent::Done), Dispatch::Ignored);
        assert_eq!(acc.on_event(StreamEvent::Error(Some("x".into()))), Dispatch::Ignored);
        assert_eq!(acc.text(), "done");
        assert_eq!(acc.status_text(), "Processing");
    }

    #[test]
    fn test_error_event_fails() {
        let mut acc = answer();
        assert_eq!(
            acc.on_event(StreamEvent::Error(Some("quota exceeded".into()))),
            Dispatch::Failed("quota exceeded".into())
        );

        let mut acc = answer();
        assert_eq!(
            acc.on_event(StreamEvent::Error(None)),
            Dispatch::Failed(UNKNOWN_ERROR.into())
        );
    }

    #[test]
    fn test_code_section_complete_changes_status() {
        let mut acc = artifact();
        acc.on_event(StreamEvent::CodeToken("<div>".into()));
        acc.on_event(StreamEvent::CodeSectionComplete(None));
        assert_eq!(acc.status_text(), CODE_SECTION_DONE_STATUS);
        assert_eq!(acc.text(), "<div>");

        acc.on_event(StreamEvent::CodeSectionComplete(Some("Summarizing".into())));
        assert_eq!(acc.status_text(), "Summarizing");
    }

    #[test]
    fn test_complete_with_structured_content() {
        let mut acc = artifact();
        let payload = CompletePayload {
            content: Some(json!({"code": "<b>hi</b>", "summary": "bold", "settings": [{"k": 1}]})),
            data: None,
        };
        match acc.on_event(StreamEvent::Complete(payload)) {
            Dispatch::Finished(FinalResult::Artifact { block, extraction }) => {
                assert_eq!(extraction, ArtifactExtraction::Structured);
                assert_eq!(block.code, "<b>hi</b>");
                assert_eq!(block.summary, "bold");
                assert_eq!(block.settings.len(), 1);
            }
            other => panic!("unexpected dispatch: {:?}", other),
        }
    }

    #[test]
    fn test_complete_with_structured_data_field() {
        let payload = CompletePayload {
            content: None,
            data: Some(json!({"code": "c", "summary": "s"})),
        };
        let (block, extraction) = resolve_artifact(payload, "ignored");
        assert_eq!(extraction, ArtifactExtraction::Structured);
        assert_eq!(block.code, "c");
    }

    #[test]
    fn test_complete_falls_back_to_accumulated_text() {
        let mut acc = artifact();
        acc.on_event(StreamEvent::Token("```json\n{\"code\": \"<p/>\", ".into()));
        acc.on_event(StreamEvent::Token("\"summary\": \"para\"}\n```".into()));
        match acc.on_event(StreamEvent::Complete(CompletePayload::default())) {
            Dispatch::Finished(FinalResult::Artifact { block, extraction }) => {
                assert_eq!(extraction, ArtifactExtraction::Extracted);
                assert_eq!(block.code, "<p/>");
                assert_eq!(block.summary, "para");
            }
            other => panic!("unexpected dispatch: {:?}", other),
        }
    }

    #[test]
    fn test_complete_with_unparsable_string_uses_placeholder() {
        let payload = CompletePayload {
            content: Some(json!("<div>not json at all</div>")),
            data: None,
        };
        let (block, extraction) = resolve_artifact(payload, "");
        assert_eq!(extraction, ArtifactExtraction::Placeholder);
        assert_eq!(block.code, "<div>not json at all</div>");
        assert_eq!(block.summary, PARSE_FAILED_SUMMARY);
        assert!(block.settings.is_empty());
        assert!(block.property.is_empty());
    }

    #[test]
    fn test_complete_string_with_embedded_json() {
        let payload = CompletePayload {
            content: Some(json!("Here you go: {\"code\": \"x\", \"summary\": \"y\"} enjoy")),
            data: None,
        };
        let (block, extraction) = resolve_artifact(payload, "");
        assert_eq!(extraction, ArtifactExtraction::Extracted);
        assert_eq!(block.code, "x");
    }

    #[test]
    fn test_out_of_scope_is_terminal_message() {
        let mut acc = artifact();
        acc.on_event(StreamEvent::Token("partial".into()));
        assert_eq!(
            acc.on_event(StreamEvent::OutOfScope("I can only build blocks.".into())),
            Dispatch::Finished(FinalResult::OutOfScope {
                message: "I can only build blocks.".into()
            })
        );
        assert!(acc.is_finished());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{}"), "{}");
        assert_eq!(extract_block("no braces"), None);
        assert_eq!(extract_block("} {"), None);
    }
}
