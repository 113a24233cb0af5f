use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;

use crate::types::DoorAction;

/// Acknowledgement returned by every actuator endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Ack {
    pub message: String,
}

/// The external endpoints that perform real-world side effects on
/// behalf of tool invocations. Every call is fire-and-forget from the
/// session's point of view: a failure here is a recoverable tool
/// failure, never a session failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActuatorGateway: Send + Sync {
    async fn call_911(&self, reason: &str) -> Result<Ack>;
    async fn send_notification(&self, package_size: &str, delivery_time: &str) -> Result<Ack>;
    async fn door(&self, action: DoorAction) -> Result<Ack>;
}

/// HTTP-backed gateway POSTing JSON bodies to the actuator service.
pub struct HttpActuators {
    client: Client,
    base_url: String,
}

impl HttpActuators {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<Ack> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("actuator request to /{path} failed"))?
            .error_for_status()
            .with_context(|| format!("actuator /{path} rejected the request"))?;
        response
            .json::<Ack>()
            .await
            .with_context(|| format!("actuator /{path} returned an unreadable body"))
    }
}

#[async_trait]
impl ActuatorGateway for HttpActuators {
    async fn call_911(&self, reason: &str) -> Result<Ack> {
        self.post("call911", serde_json::json!({ "reason": reason }))
            .await
    }

    async fn send_notification(&self, package_size: &str, delivery_time: &str) -> Result<Ack> {
        self.post(
            "sendNotification",
            serde_json::json!({
                "package_size": package_size,
                "delivery_time": delivery_time,
            }),
        )
        .await
    }

    async fn door(&self, action: DoorAction) -> Result<Ack> {
        self.post("door", serde_json::json!({ "action": action }))
            .await
    }
}
