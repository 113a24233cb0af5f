use serde_json::Value;

use crate::parts::FunctionCall;

/// Canonical names of the actuator-backed tools exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Call911,
    SendNotification,
    Door,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Call911 => "call911",
            ToolName::SendNotification => "sendNotification",
            ToolName::Door => "door",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "call911" => Some(ToolName::Call911),
            "sendNotification" => Some(ToolName::SendNotification),
            "door" => Some(ToolName::Door),
            _ => None,
        }
    }
}

/// Requested position of the entry door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DoorAction {
    Open,
    Close,
}

/// A model-issued request to perform a named side-effecting action.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub id: Option<String>,
}

impl From<FunctionCall> for ToolInvocation {
    fn from(call: FunctionCall) -> Self {
        ToolInvocation {
            name: call.name,
            arguments: call.args,
            id: call.id,
        }
    }
}

/// Wrapper for one entry of the setup message's `tools` array.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in JSON Schema format
    parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for name in [ToolName::Call911, ToolName::SendNotification, ToolName::Door] {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("selfDestruct"), None);
    }

    #[test]
    fn door_action_uses_wire_casing() {
        assert_eq!(serde_json::to_string(&DoorAction::Open).unwrap(), "\"OPEN\"");
        assert_eq!(
            serde_json::from_str::<DoorAction>("\"CLOSE\"").unwrap(),
            DoorAction::Close
        );
    }
}
