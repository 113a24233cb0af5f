use std::sync::Arc;

use anyhow::Result;

use crate::actuators::{Ack, ActuatorGateway};
use crate::risk::RiskMonitor;
use crate::types::messages::FunctionResponse;
use crate::types::tools::{FunctionDeclaration, FunctionDeclarations};
use crate::types::{DoorAction, RiskLevel, ToolInvocation, ToolName};

/// Routes model-issued tool invocations to the actuator gateway.
///
/// Local risk effects are applied optimistically before the actuator
/// round trip and are not rolled back when the call fails.
pub struct ToolDispatcher {
    gateway: Arc<dyn ActuatorGateway>,
    monitor: Arc<RiskMonitor>,
}

impl ToolDispatcher {
    pub fn new(gateway: Arc<dyn ActuatorGateway>, monitor: Arc<RiskMonitor>) -> Self {
        Self { gateway, monitor }
    }

    /// Executes one invocation. Never fails: every failure mode lands
    /// in the operator feed, and the returned response reports the
    /// outcome back to the model.
    pub async fn dispatch(&self, invocation: ToolInvocation) -> FunctionResponse {
        let outcome = match ToolName::parse(&invocation.name) {
            Some(ToolName::Call911) => self.call_911(&invocation).await,
            Some(ToolName::SendNotification) => self.send_notification(&invocation).await,
            Some(ToolName::Door) => self.door(&invocation).await,
            None => Err(anyhow::anyhow!("unknown tool: {}", invocation.name)),
        };

        let response = match outcome {
            Ok(ack) => {
                self.monitor
                    .tool_result(format!("{}: {}", invocation.name, ack.message));
                serde_json::json!({ "message": ack.message })
            }
            Err(e) => {
                tracing::warn!("tool {} failed: {:#}", invocation.name, e);
                self.monitor
                    .error(format!("{} failed: {e:#}", invocation.name));
                serde_json::json!({ "error": e.to_string() })
            }
        };
        FunctionResponse {
            name: invocation.name,
            id: invocation.id,
            response,
        }
    }

    async fn call_911(&self, invocation: &ToolInvocation) -> Result<Ack> {
        let reason = required_str(invocation, "reason")?;
        self.monitor.force(RiskLevel::Danger, "call911");
        self.gateway.call_911(&reason).await
    }

    async fn send_notification(&self, invocation: &ToolInvocation) -> Result<Ack> {
        let package_size = required_str(invocation, "package_size")?;
        let delivery_time = required_str(invocation, "delivery_time")?;
        chrono::DateTime::parse_from_rfc3339(&delivery_time)
            .map_err(|e| anyhow::anyhow!("delivery_time is not an ISO-8601 timestamp: {e}"))?;
        self.monitor.escalate(RiskLevel::Warning, "sendNotification");
        self.gateway
            .send_notification(&package_size, &delivery_time)
            .await
    }

    async fn door(&self, invocation: &ToolInvocation) -> Result<Ack> {
        let action = match required_str(invocation, "action")?.as_str() {
            "OPEN" => DoorAction::Open,
            "CLOSE" => DoorAction::Close,
            other => anyhow::bail!("door action must be OPEN or CLOSE, got {other:?}"),
        };
        self.gateway.door(action).await
    }
}

fn required_str(invocation: &ToolInvocation, field: &str) -> Result<String> {
    invocation
        .arguments
        .get(field)
        .and_then(|value| value.as_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("missing required argument {field:?}"))
}

/// Tool surface advertised to the model at session setup.
pub fn tool_declarations() -> FunctionDeclarations {
    FunctionDeclarations {
        function_declarations: vec![
            FunctionDeclaration::new(
                "call911",
                "Place an emergency call when a dangerous situation is observed.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "reason": {
                            "type": "string",
                            "description": "Why emergency services are needed."
                        }
                    },
                    "required": ["reason"]
                }),
            ),
            FunctionDeclaration::new(
                "sendNotification",
                "Notify the resident about a package delivery.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "package_size": {
                            "type": "string",
                            "description": "Apparent size of the package."
                        },
                        "delivery_time": {
                            "type": "string",
                            "description": "Delivery timestamp, ISO-8601."
                        }
                    },
                    "required": ["package_size", "delivery_time"]
                }),
            ),
            FunctionDeclaration::new(
                "door",
                "Open or close the entry door.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["OPEN", "CLOSE"]
                        }
                    },
                    "required": ["action"]
                }),
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::MockActuatorGateway;
    use crate::types::FeedKind;

    fn invocation(name: &str, arguments: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            arguments,
            id: Some("fc-1".to_string()),
        }
    }

    fn count_kind(monitor: &RiskMonitor, kind: FeedKind) -> usize {
        monitor
            .snapshot()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    #[tokio::test]
    async fn actuator_failure_is_isolated() {
        let mut gateway = MockActuatorGateway::new();
        gateway
            .expect_door()
            .returning(|_| Err(anyhow::anyhow!("actuator unreachable")));
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        let response = dispatcher
            .dispatch(invocation("door", serde_json::json!({"action": "OPEN"})))
            .await;

        // The door has no risk side effect and the failure stays local.
        assert_eq!(monitor.level(), RiskLevel::Safe);
        assert_eq!(count_kind(&monitor, FeedKind::Error), 1);
        assert_eq!(count_kind(&monitor, FeedKind::Tool), 0);
        assert!(response.response.get("error").is_some());
    }

    #[tokio::test]
    async fn call_911_forces_danger_even_when_the_call_fails() {
        let mut gateway = MockActuatorGateway::new();
        gateway
            .expect_call_911()
            .returning(|_| Err(anyhow::anyhow!("line busy")));
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        dispatcher
            .dispatch(invocation("call911", serde_json::json!({"reason": "intruder"})))
            .await;

        // The optimistic local effect is not rolled back.
        assert_eq!(monitor.level(), RiskLevel::Danger);
        assert_eq!(count_kind(&monitor, FeedKind::Error), 1);
    }

    #[tokio::test]
    async fn successful_ack_lands_in_the_feed() {
        let mut gateway = MockActuatorGateway::new();
        gateway.expect_door().returning(|_| {
            Ok(Ack {
                message: "door opened".to_string(),
            })
        });
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        let response = dispatcher
            .dispatch(invocation("door", serde_json::json!({"action": "OPEN"})))
            .await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].kind, FeedKind::Tool);
        assert!(snapshot[0].text.contains("door opened"));
        assert_eq!(response.response["message"], "door opened");
    }

    #[tokio::test]
    async fn missing_argument_never_reaches_the_gateway() {
        let mut gateway = MockActuatorGateway::new();
        gateway.expect_call_911().never();
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        dispatcher
            .dispatch(invocation("call911", serde_json::json!({})))
            .await;

        // Validation failed before the local risk effect was applied.
        assert_eq!(monitor.level(), RiskLevel::Safe);
        assert_eq!(count_kind(&monitor, FeedKind::Error), 1);
    }

    #[tokio::test]
    async fn notification_escalates_but_never_downgrades() {
        let mut gateway = MockActuatorGateway::new();
        gateway.expect_send_notification().times(2).returning(|_, _| {
            Ok(Ack {
                message: "notified".to_string(),
            })
        });
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());
        let arguments = serde_json::json!({
            "package_size": "small",
            "delivery_time": "2026-08-07T10:30:00Z",
        });

        dispatcher
            .dispatch(invocation("sendNotification", arguments.clone()))
            .await;
        assert_eq!(monitor.level(), RiskLevel::Warning);

        monitor.force(RiskLevel::Danger, "test");
        dispatcher
            .dispatch(invocation("sendNotification", arguments))
            .await;
        assert_eq!(monitor.level(), RiskLevel::Danger);
    }

    #[tokio::test]
    async fn malformed_delivery_time_is_a_validation_error() {
        let mut gateway = MockActuatorGateway::new();
        gateway.expect_send_notification().never();
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        dispatcher
            .dispatch(invocation(
                "sendNotification",
                serde_json::json!({"package_size": "small", "delivery_time": "tomorrow"}),
            ))
            .await;

        assert_eq!(count_kind(&monitor, FeedKind::Error), 1);
        assert_eq!(monitor.level(), RiskLevel::Safe);
    }

    #[tokio::test]
    async fn unknown_tool_is_logged_not_crashed() {
        let gateway = MockActuatorGateway::new();
        let monitor = Arc::new(RiskMonitor::new());
        let dispatcher = ToolDispatcher::new(Arc::new(gateway), monitor.clone());

        let response = dispatcher
            .dispatch(invocation("selfDestruct", serde_json::json!({})))
            .await;

        assert_eq!(count_kind(&monitor, FeedKind::Error), 1);
        assert_eq!(monitor.level(), RiskLevel::Safe);
        assert!(response.response.get("error").is_some());
    }
}
