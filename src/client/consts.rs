pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws";
pub const LIVE_ENDPOINT: &str =
    "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-live-2.5-flash-preview";
