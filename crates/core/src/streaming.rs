use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{MessagePart, ToolCallRecord, ToolCallStatus, ToolCallStatusOwned};

/// Maximum size a single tool result is truncated to before being stored
/// (§4.1: "truncated to 5 KB").
pub const TOOL_RESULT_TRUNCATE_BYTES: usize = 5 * 1024;

/// A pending human-in-the-loop question, written by `question`/`plan_exit`
/// and answered by the client's `answer_question` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// The ephemeral mirror of an in-flight turn (§3). One row per session,
/// created by `start`, mutated by many small appends, finalized by
/// `finish`. All mutating methods here are pure state transitions; the
/// store crate is responsible for making each one an atomic, observable
/// patch and bumping `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingState {
    pub session_id: String,
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub parts: Vec<MessagePart>,
    pub pending_question: Option<PendingQuestion>,
    pub pending_answer: Option<Value>,
    pub stage: Option<String>,
    pub is_streaming: bool,
    pub updated_at: i64,
}

impl StreamingState {
    /// `start`: fresh accumulators, `is_streaming = true`. Overwrites any
    /// prior row for the session (the spec explicitly allows this — a
    /// second concurrent `prepareSend` is the caller's responsibility).
    pub fn start(session_id: String) -> Self {
        StreamingState {
            session_id,
            content: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            parts: Vec::new(),
            pending_question: None,
            pending_answer: None,
            stage: None,
            is_streaming: true,
            updated_at: crate::now_unix(),
        }
    }

    pub fn append_token(&mut self, text: &str) {
        self.content.push_str(text);
        self.touch();
    }

    pub fn append_reasoning(&mut self, text: &str) {
        self.reasoning.push_str(text);
        self.touch();
    }

    pub fn append_text_part(&mut self, text: &str) {
        match self.parts.last_mut() {
            Some(MessagePart::Text { content }) => content.push_str(text),
            _ => self.parts.push(MessagePart::Text {
                content: text.to_string(),
            }),
        }
        self.touch();
    }

    pub fn append_reasoning_part(&mut self, text: &str) {
        match self.parts.last_mut() {
            Some(MessagePart::Reasoning { content }) => content.push_str(text),
            _ => self.parts.push(MessagePart::Reasoning {
                content: text.to_string(),
            }),
        }
        self.touch();
    }

    pub fn add_tool_call(&mut self, id: String, name: String, args: Value) {
        self.tool_calls
            .push(ToolCallRecord::new(id.clone(), name.clone(), args.clone()));
        self.parts.push(MessagePart::ToolCall {
            id,
            name,
            args,
            result: None,
            status: ToolCallStatusOwned::Running,
        });
        self.touch();
    }

    /// `updateToolResult`: locate by id, truncate result to 5 KB, mark
    /// completed. No-op if the id is unknown (spec: "if not found, no-op").
    pub fn update_tool_result(&mut self, id: &str, result: &str) {
        let truncated = truncate_bytes(result, TOOL_RESULT_TRUNCATE_BYTES);
        let mut found = false;
        for tc in self.tool_calls.iter_mut() {
            if tc.id == id {
                tc.result = Some(truncated.clone());
                tc.status = ToolCallStatus::Completed;
                found = true;
                break;
            }
        }
        if !found {
            return;
        }
        for part in self.parts.iter_mut() {
            if let MessagePart::ToolCall {
                id: pid,
                result: presult,
                status,
                ..
            } = part
            {
                if pid == id {
                    *presult = Some(truncated.clone());
                    *status = ToolCallStatusOwned::Completed;
                    break;
                }
            }
        }
        self.touch();
    }

    pub fn set_question(&mut self, question: PendingQuestion) {
        self.pending_question = Some(question);
        self.pending_answer = None;
        self.touch();
    }

    /// Public endpoint clients call to resolve a pending question.
    pub fn answer_question(&mut self, answer: Value) {
        self.pending_answer = Some(answer);
        self.touch();
    }

    pub fn clear_question(&mut self) {
        self.pending_question = None;
        self.pending_answer = None;
        self.touch();
    }

    pub fn finish(&mut self) {
        self.is_streaming = false;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = crate::now_unix();
    }

    /// Derive the final message parts preferring `parts` (ordering is
    /// authoritative there); falls back to composing from
    /// reasoning+tool_calls+content if `parts` is empty, per §4.5 step 9.
    pub fn derive_message_parts(&self) -> Vec<MessagePart> {
        if !self.parts.is_empty() {
            return self.parts.clone();
        }
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(MessagePart::Reasoning {
                content: self.reasoning.clone(),
            });
        }
        for tc in &self.tool_calls {
            parts.push(MessagePart::ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                args: tc.args.clone(),
                result: tc.result.clone(),
                status: tc.status.into(),
            });
        }
        if !self.content.is_empty() {
            parts.push(MessagePart::Text {
                content: self.content.clone(),
            });
        }
        parts
    }
}

fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_then_update_tool_call_marks_completed() {
        let mut s = StreamingState::start("s1".into());
        s.add_tool_call("t1".into(), "ls".into(), json!({"directory": "/work"}));
        assert_eq!(s.tool_calls[0].status, ToolCallStatus::Running);
        s.update_tool_result("t1", "README.md\nsrc\n");
        assert_eq!(s.tool_calls[0].status, ToolCallStatus::Completed);
        assert_eq!(s.tool_calls[0].result.as_deref(), Some("README.md\nsrc\n"));
    }

    #[test]
    fn update_unknown_tool_call_is_noop() {
        let mut s = StreamingState::start("s1".into());
        s.update_tool_result("missing", "x");
        assert!(s.tool_calls.is_empty());
    }

    #[test]
    fn question_round_trip_clears_cleanly() {
        let mut s = StreamingState::start("s1".into());
        s.set_question(PendingQuestion {
            id: "q1".into(),
            question: "proceed?".into(),
            options: vec!["yes".into(), "no".into()],
            kind: None,
            extra: None,
        });
        assert!(s.pending_question.is_some());
        s.answer_question(json!("yes"));
        assert!(s.pending_answer.is_some());
        s.clear_question();
        assert!(s.pending_question.is_none());
        assert!(s.pending_answer.is_none());
    }

    #[test]
    fn result_truncated_to_5kb() {
        let mut s = StreamingState::start("s1".into());
        s.add_tool_call("t1".into(), "bash".into(), json!({}));
        let big = "x".repeat(10 * 1024);
        s.update_tool_result("t1", &big);
        assert!(s.tool_calls[0].result.as_ref().unwrap().len() <= TOOL_RESULT_TRUNCATE_BYTES + 32);
    }

    #[test]
    fn derive_message_parts_prefers_parts_field() {
        let mut s = StreamingState::start("s1".into());
        s.append_text_part("hello");
        s.finish();
        let parts = s.derive_message_parts();
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], MessagePart::Text { content } if content == "hello"));
    }
}
