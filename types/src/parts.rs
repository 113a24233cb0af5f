use serde_json::Value;

/// Inline binary payload, base64 in `data`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// A model-issued request to run a named tool.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// One part of a model turn as it appears on the wire. The server
/// leaves all but one field unset.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

/// A part normalized to exactly one active case.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    Text(String),
    InlineData(Blob),
    FunctionCall(FunctionCall),
    Json(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Collapses the wire shape into its single active case. A part
    /// carrying more than one field resolves in fixed precedence
    /// (function call, structured payload, text, inline data); a part
    /// with no recognizable payload yields `None`.
    pub fn into_content(self) -> Option<PartContent> {
        if let Some(call) = self.function_call {
            return Some(PartContent::FunctionCall(call));
        }
        if let Some(json) = self.json {
            return Some(PartContent::Json(json));
        }
        if let Some(text) = self.text {
            return Some(PartContent::Text(text));
        }
        self.inline_data.map(PartContent::InlineData)
    }
}
