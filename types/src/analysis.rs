use crate::risk::RiskLevel;

/// One structured analysis result decoded from the model's stream.
/// Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Transcribed speech; an empty string means no speech was heard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
}

impl AnalysisRecord {
    pub fn has_speech(&self) -> bool {
        self.transcription
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}
