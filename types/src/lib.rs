pub mod analysis;
pub mod feed;
pub mod media;
pub mod messages;
pub mod parts;
pub mod risk;
pub mod status;
pub mod tools;

pub use analysis::AnalysisRecord;
pub use feed::{FeedEntry, FeedKind, RiskChange};
pub use media::MediaFrame;
pub use messages::{ClientMessage, ServerMessage};
pub use parts::{Blob, FunctionCall, Part, PartContent};
pub use risk::RiskLevel;
pub use status::SessionStatus;
pub use tools::{DoorAction, ToolInvocation, ToolName};
