pub mod actuators;
pub mod capture;
pub mod client;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod queue;
pub mod risk;
pub mod session;

pub use sentinel_live_types as types;
pub use sentinel_live_utils as utils;

pub use client::{Client, Connection, EventRx, SessionEvent};
pub use session::{SessionConfig, SessionManager};
