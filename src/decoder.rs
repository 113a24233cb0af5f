use crate::types::{AnalysisRecord, PartContent, ServerMessage, ToolInvocation};

/// Start marker of a fenced structured block in streamed text.
pub const FENCE_START: &str = "```json";
/// End marker of a fenced structured block.
pub const FENCE_END: &str = "```";

/// Output of one decode step, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Record(AnalysisRecord),
    Tool(ToolInvocation),
    /// A failure worth surfacing in the operator feed.
    Failure(String),
}

/// Incrementally extracts structured analysis records from the inbound
/// message stream, tolerating arbitrary fragmentation of fenced blocks
/// across message boundaries.
///
/// Owns the single partial-text buffer for the session. After every
/// [`feed`](Self::feed) call the buffer holds no complete fenced span.
pub struct StreamDecoder {
    partial: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            partial: String::new(),
        }
    }

    /// Residual text retained between passes.
    pub fn residue(&self) -> &str {
        &self.partial
    }

    /// Drops any accumulated residue.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    /// Consumes one message and returns everything decoded from it, in
    /// the order it appeared.
    pub fn feed(&mut self, message: &ServerMessage) -> Vec<Decoded> {
        let mut out = Vec::new();

        if let Some(turn) = message
            .server_content
            .as_ref()
            .and_then(|content| content.model_turn.as_ref())
        {
            for part in &turn.parts {
                match part.clone().into_content() {
                    Some(PartContent::Json(value)) => {
                        // A structured part and an in-flight text fence
                        // are mutually exclusive within one turn.
                        self.partial.clear();
                        match serde_json::from_value::<AnalysisRecord>(value) {
                            Ok(record) => out.push(Decoded::Record(record)),
                            Err(e) => {
                                tracing::warn!("unreadable structured part: {}", e);
                                out.push(Decoded::Failure(format!(
                                    "unreadable analysis payload: {e}"
                                )));
                            }
                        }
                    }
                    Some(PartContent::FunctionCall(call)) => {
                        // A tool call terminates the current text block.
                        self.partial.clear();
                        out.push(Decoded::Tool(call.into()));
                    }
                    Some(PartContent::Text(text)) => {
                        self.partial.push_str(&text);
                        self.drain_fences(&mut out);
                    }
                    Some(PartContent::InlineData(blob)) => {
                        tracing::debug!("ignoring inline {} part", blob.mime_type);
                    }
                    None => {}
                }
            }
        }

        if let Some(tool_call) = &message.tool_call {
            if !tool_call.function_calls.is_empty() {
                self.partial.clear();
            }
            for call in &tool_call.function_calls {
                out.push(Decoded::Tool(call.clone().into()));
            }
        }

        out
    }

    /// Extracts every complete fenced span currently buffered. A span
    /// whose interior fails to parse is dropped outright rather than
    /// retried; a truncated stream would otherwise pin the buffer on
    /// the same span forever. Consumption always advances past the end
    /// fence, leading noise included.
    fn drain_fences(&mut self, out: &mut Vec<Decoded>) {
        loop {
            let Some(start) = self.partial.find(FENCE_START) else {
                break;
            };
            let body_start = start + FENCE_START.len();
            let Some(end) = self.partial[body_start..].find(FENCE_END) else {
                break;
            };
            let body = self.partial[body_start..body_start + end].trim().to_string();
            match serde_json::from_str::<AnalysisRecord>(&body) {
                Ok(record) => out.push(Decoded::Record(record)),
                Err(e) => tracing::warn!("discarding malformed fenced span: {}", e),
            }
            self.partial.drain(..body_start + end + FENCE_END.len());
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::{ModelTurn, ServerContent, ToolCall};
    use crate::types::parts::FunctionCall;
    use crate::types::{Part, RiskLevel};

    fn text_message(text: &str) -> ServerMessage {
        ServerMessage::with_text(text)
    }

    fn records(decoded: &[Decoded]) -> Vec<AnalysisRecord> {
        decoded
            .iter()
            .filter_map(|d| match d {
                Decoded::Record(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn drains_every_complete_span_in_order() {
        let mut decoder = StreamDecoder::new();
        let decoded = decoder.feed(&text_message(
            "noise```json{\"thought\":\"t1\",\"riskLevel\":\"WARNING\"}```tail```json{\"transcription\":\"hello\"}```",
        ));

        let records = records(&decoded);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].risk_level, Some(RiskLevel::Warning));
        assert_eq!(records[1].transcription.as_deref(), Some("hello"));
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn no_record_is_produced_twice() {
        let mut decoder = StreamDecoder::new();
        let first = decoder.feed(&text_message(
            "```json{\"thought\":\"once\"}```",
        ));
        assert_eq!(records(&first).len(), 1);

        let second = decoder.feed(&text_message(""));
        assert!(second.is_empty());
        let third = decoder.feed(&text_message("more noise"));
        assert!(records(&third).is_empty());
    }

    #[test]
    fn malformed_span_is_discarded_not_retried() {
        let mut decoder = StreamDecoder::new();
        let decoded = decoder.feed(&text_message("```jsonNOTJSON```"));

        assert!(records(&decoded).is_empty());
        // The span must not linger and be re-parsed forever.
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn span_fragmented_across_messages_is_reassembled() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(&text_message("```js")).is_empty());
        assert!(decoder
            .feed(&text_message("on{\"thought\":\"split\"}``"))
            .is_empty());
        let decoded = decoder.feed(&text_message("`"));

        let records = records(&decoded);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].thought.as_deref(), Some("split"));
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn incomplete_span_is_retained_for_the_next_pass() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&text_message("```json{\"thought\":\"pend"));
        assert!(!decoder.residue().is_empty());
    }

    #[test]
    fn structured_part_clears_pending_text() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&text_message("```json{\"thought\":\"abandoned"));

        let message = ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        json: Some(serde_json::json!({"analysis": "clear view"})),
                        ..Default::default()
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let decoded = decoder.feed(&message);

        let records = records(&decoded);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].analysis.as_deref(), Some("clear view"));
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn tool_call_part_clears_pending_text_and_dispatches() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&text_message("```json{\"thought\":\"abandoned"));

        let message = ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        function_call: Some(FunctionCall {
                            name: "door".to_string(),
                            args: serde_json::json!({"action": "OPEN"}),
                            id: None,
                        }),
                        ..Default::default()
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let decoded = decoder.feed(&message);

        assert_eq!(decoded.len(), 1);
        assert!(matches!(&decoded[0], Decoded::Tool(inv) if inv.name == "door"));
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn top_level_tool_call_is_recognized() {
        let mut decoder = StreamDecoder::new();
        let message = ServerMessage {
            tool_call: Some(ToolCall {
                function_calls: vec![FunctionCall {
                    name: "call911".to_string(),
                    args: serde_json::json!({"reason": "intruder"}),
                    id: Some("fc-7".to_string()),
                }],
            }),
            ..Default::default()
        };
        let decoded = decoder.feed(&message);

        assert_eq!(decoded.len(), 1);
        assert!(matches!(&decoded[0], Decoded::Tool(inv) if inv.id.as_deref() == Some("fc-7")));
    }

    #[test]
    fn message_without_recognizable_parts_is_a_no_op() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(&ServerMessage::default()).is_empty());
        assert_eq!(decoder.residue(), "");
    }

    #[test]
    fn unreadable_structured_part_surfaces_a_failure() {
        let mut decoder = StreamDecoder::new();
        let message = ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        json: Some(serde_json::json!({"riskLevel": "CATASTROPHIC"})),
                        ..Default::default()
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let decoded = decoder.feed(&message);
        assert!(matches!(&decoded[0], Decoded::Failure(_)));
    }
}
