use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::actuators::ActuatorGateway;
use crate::capture::MediaSink;
use crate::client::{self, Client, Connection, SessionEvent};
use crate::decoder::{Decoded, StreamDecoder};
use crate::dispatch::{tool_declarations, ToolDispatcher};
use crate::queue::InboundQueue;
use crate::risk::RiskMonitor;
use crate::types::messages::{Content, FunctionResponse, GenerationConfig, RealtimeInput, Setup};
use crate::types::{Blob, ClientMessage, MediaFrame, Part, SessionStatus};
use crate::utils;

/// How often the decode pump polls the inbound queue.
const DEFAULT_DECODE_PERIOD: Duration = Duration::from_millis(25);

/// Outbound channel capacity; frames beyond it are dropped, never
/// queued.
const DEFAULT_CAPACITY: usize = 256;

/// Instructions handed to the model at session open.
const SYSTEM_INSTRUCTION: &str = "\
You are a security monitoring assistant watching a live camera and microphone feed. \
Continuously analyze incoming video frames and audio for potential security threats: \
suspicious activity, unauthorized access, safety hazards, and package deliveries. \
Transcribe any speech you hear.

Report every observation as a JSON object wrapped in a ```json ... ``` fence: \
{\"thought\": \"...\", \"analysis\": \"...\", \"transcription\": \"...\", \"riskLevel\": \"SAFE\" | \"WARNING\" | \"DANGER\"}. \
Use an empty transcription string when no speech is audible, and backslash-escape \
double quotes inside string values. When the situation calls for it, use the \
provided tools: call911 for emergencies, sendNotification for package deliveries, \
and door to open or close the entry door.";

/// Substrings that mark a failure as connection-level rather than
/// per-item. Only these tear the session down.
const TRANSPORT_ERROR_MARKERS: &[&str] = &[
    "connection",
    "network",
    "timeout",
    "closed",
    "reset",
    "broken pipe",
];

pub(crate) fn is_transport_error(description: &str) -> bool {
    let lower = description.to_lowercase();
    TRANSPORT_ERROR_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Tunables for one session run.
#[derive(Clone)]
pub struct SessionConfig {
    pub transport: client::config::Config,
    pub decode_period: Duration,
    pub capacity: usize,
}

impl SessionConfig {
    pub fn new(transport: client::config::Config) -> Self {
        Self {
            transport,
            decode_period: DEFAULT_DECODE_PERIOD,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(client::config::Config::new())
    }
}

struct ActiveSession {
    client: Client,
    connection: Connection,
    queue: Arc<InboundQueue>,
    live: Arc<AtomicBool>,
    pumps: Vec<tokio::task::JoinHandle<()>>,
}

/// Owns the lifecycle of the single live session: open, feed media,
/// receive messages, close.
///
/// The failure policy is asymmetric on purpose: a failed frame or tool
/// call is logged and the session continues; only connection-level
/// failures tear it down. A flaky frame must never kill a multi-minute
/// session.
pub struct SessionManager {
    config: SessionConfig,
    gateway: Arc<dyn ActuatorGateway>,
    monitor: Arc<RiskMonitor>,
    status_tx: watch::Sender<SessionStatus>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, gateway: Arc<dyn ActuatorGateway>) -> Arc<Self> {
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);
        Arc::new(Self {
            config,
            gateway,
            monitor: Arc::new(RiskMonitor::new()),
            status_tx,
            active: Mutex::new(None),
        })
    }

    pub fn monitor(&self) -> Arc<RiskMonitor> {
        self.monitor.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Opens the remote session. A call while already connecting or
    /// connected is a no-op; resources are never double-initialized.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let _active = self.lock_active();
            if self.status() != SessionStatus::Disconnected {
                tracing::debug!("start ignored: session is {:?}", self.status());
                return Ok(());
            }
            self.set_status(SessionStatus::Connecting);
        }

        match self.open_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.monitor.error(format!("failed to open session: {e:#}"));
                self.set_status(SessionStatus::Error);
                self.stop();
                Err(e)
            }
        }
    }

    async fn open_session(self: &Arc<Self>) -> Result<()> {
        let (client, connection) =
            client::connect_with_config(self.config.capacity, self.config.transport.clone())
                .await
                .context("failed to open live session")?;

        let setup = Setup {
            model: self.config.transport.model().to_string(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string()],
            }),
            system_instruction: Some(Content {
                parts: vec![Part::text(SYSTEM_INSTRUCTION)],
            }),
            tools: vec![tool_declarations()],
        };
        client
            .send_setup(setup)
            .await
            .context("failed to send session setup")?;

        let queue = Arc::new(InboundQueue::new());
        let live = Arc::new(AtomicBool::new(true));
        let events = client.events()?;
        let pumps = vec![
            tokio::spawn(Self::receive_pump(
                self.clone(),
                events,
                queue.clone(),
                live.clone(),
            )),
            tokio::spawn(Self::decode_pump(
                self.clone(),
                queue.clone(),
                live.clone(),
                self.config.decode_period,
            )),
        ];

        let mut slot = self.lock_active();
        if matches!(
            self.status(),
            SessionStatus::Disconnected | SessionStatus::Error
        ) {
            // stop() intervened while the transport was opening.
            connection.abort();
            for pump in &pumps {
                pump.abort();
            }
            tracing::info!("session cancelled during startup");
            return Ok(());
        }
        *slot = Some(ActiveSession {
            client,
            connection,
            queue,
            live,
            pumps,
        });
        drop(slot);

        self.monitor.status("session opening");
        Ok(())
    }

    /// Releases every owned resource exactly once; subsequent calls
    /// are no-ops. Legal from any state, including concurrently with
    /// in-flight work.
    pub fn stop(&self) {
        let active = self.lock_active().take();
        let Some(active) = active else {
            self.set_status(SessionStatus::Disconnected);
            return;
        };

        active.live.store(false, Ordering::Release);
        active.connection.abort();
        for pump in &active.pumps {
            pump.abort();
        }
        active.queue.clear();
        // Dropping the client closes the outbound channel, which ends
        // the transport's send task.
        drop(active);

        self.monitor.status("session stopped");
        self.set_status(SessionStatus::Disconnected);
        tracing::info!("session stopped");
    }

    /// Best-effort transmission of one captured frame. A full channel
    /// drops the frame (per-item failure); a closed channel is a
    /// connection failure and tears the session down.
    pub async fn send_media(&self, frame: MediaFrame) -> Result<()> {
        let Some((tx, live)) = self.with_active(|active| {
            (active.client.sender(), active.live.clone())
        }) else {
            tracing::debug!("dropping frame: no active session");
            return Ok(());
        };
        let Some(tx) = tx else {
            tracing::debug!("dropping frame: transport not connected");
            return Ok(());
        };
        if !live.load(Ordering::Acquire) {
            return Ok(());
        }

        let message = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![encode_frame(&frame)],
        });
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                anyhow::bail!("outbound channel full, frame dropped")
            }
            Err(TrySendError::Closed(_)) => {
                self.fail_transport("outbound channel closed");
                anyhow::bail!("outbound channel closed")
            }
        }
    }

    fn fail_transport(&self, description: &str) {
        if self.status() == SessionStatus::Disconnected {
            return;
        }
        tracing::error!("transport failure: {}", description);
        self.monitor.error(format!("connection lost: {description}"));
        self.set_status(SessionStatus::Error);
        self.stop();
    }

    async fn receive_pump(
        self: Arc<Self>,
        mut events: client::EventRx,
        queue: Arc<InboundQueue>,
        live: Arc<AtomicBool>,
    ) {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("inbound stream lagged by {} messages", n);
                    continue;
                }
                Err(RecvError::Closed) => SessionEvent::Closed { reason: None },
            };
            if !live.load(Ordering::Acquire) {
                break;
            }
            match event {
                SessionEvent::Message(message) => {
                    if message.setup_complete.is_some() {
                        self.set_status(SessionStatus::Connected);
                        self.monitor.status("session started");
                        tracing::info!("live session established");
                    }
                    if let Some(go_away) = &message.go_away {
                        tracing::warn!(
                            "server is about to close the session (time left: {:?})",
                            go_away.time_left
                        );
                    }
                    queue.push(message);
                }
                SessionEvent::Closed { reason } => {
                    tracing::info!("session closed by remote: {:?}", reason);
                    self.monitor.status("session closed");
                    self.stop();
                    break;
                }
            }
        }
    }

    async fn decode_pump(
        self: Arc<Self>,
        queue: Arc<InboundQueue>,
        live: Arc<AtomicBool>,
        period: Duration,
    ) {
        let dispatcher = ToolDispatcher::new(self.gateway.clone(), self.monitor.clone());
        let mut decoder = StreamDecoder::new();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !live.load(Ordering::Acquire) {
                break;
            }
            let Some(_guard) = queue.try_begin_drain() else {
                continue;
            };
            while let Some(message) = queue.pop() {
                if !live.load(Ordering::Acquire) {
                    return;
                }
                for decoded in decoder.feed(&message) {
                    match decoded {
                        Decoded::Record(record) => self.monitor.apply(&record),
                        Decoded::Tool(invocation) => {
                            let response = dispatcher.dispatch(invocation).await;
                            self.send_tool_response(response);
                        }
                        Decoded::Failure(text) => {
                            decoder.clear();
                            self.monitor.error(text);
                        }
                    }
                }
            }
        }
    }

    // Tool responses are best-effort like frames: a failure to report
    // one back must not interrupt the session.
    fn send_tool_response(&self, response: FunctionResponse) {
        let Some(Some(tx)) = self.with_active(|active| active.client.sender()) else {
            return;
        };
        let message = ClientMessage::ToolResponse(crate::types::messages::ToolResponse {
            function_responses: vec![response],
        });
        if let Err(e) = tx.try_send(message) {
            tracing::warn!("failed to send tool response: {}", e);
        }
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn with_active<T>(&self, f: impl FnOnce(&ActiveSession) -> T) -> Option<T> {
        self.lock_active().as_ref().map(f)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MediaSink for SessionManager {
    fn status(&self) -> SessionStatus {
        SessionManager::status(self)
    }

    async fn send_media(&self, frame: MediaFrame) -> Result<()> {
        SessionManager::send_media(self, frame).await
    }
}

fn encode_frame(frame: &MediaFrame) -> Blob {
    let data = match frame {
        MediaFrame::Jpeg(bytes) => utils::audio::encode_bytes(bytes),
        MediaFrame::Pcm16(samples) => utils::audio::encode_pcm16(samples),
    };
    Blob {
        mime_type: frame.mime_type().to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::Ack;
    use crate::types::{DoorAction, FeedKind, RiskLevel};
    use futures_util::{SinkExt, StreamExt};
    use std::sync::atomic::AtomicUsize;
    use tokio_tungstenite::tungstenite::Message;

    struct RecordingGateway {
        door_calls: AtomicUsize,
    }

    impl RecordingGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                door_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ActuatorGateway for RecordingGateway {
        async fn call_911(&self, _reason: &str) -> Result<Ack> {
            Ok(Ack {
                message: "dispatched".to_string(),
            })
        }

        async fn send_notification(&self, _size: &str, _time: &str) -> Result<Ack> {
            Ok(Ack {
                message: "notified".to_string(),
            })
        }

        async fn door(&self, _action: DoorAction) -> Result<Ack> {
            self.door_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Ack {
                message: "door opened".to_string(),
            })
        }
    }

    #[test]
    fn transport_errors_are_classified_by_keyword() {
        assert!(is_transport_error("Connection reset by peer"));
        assert!(is_transport_error("operation timeout"));
        assert!(is_transport_error("WebSocket protocol error: Connection closed normally"));
        assert!(!is_transport_error("frame too large"));
        assert!(!is_transport_error("invalid payload"));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op_and_idempotent() {
        let session = SessionManager::new(SessionConfig::default(), RecordingGateway::new());
        session.stop();
        session.stop();
        assert_eq!(session.status(), SessionStatus::Disconnected);
    }

    async fn wait_for_status(
        rx: &mut watch::Receiver<SessionStatus>,
        wanted: SessionStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while *rx.borrow_and_update() != wanted {
                rx.changed().await.expect("status channel closed");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {wanted:?}"));
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Minimal stand-in for the inference endpoint: acknowledges the
    /// setup, streams one fenced analysis and one tool call, waits for
    /// the tool response, then closes.
    async fn spawn_fake_endpoint() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            assert!(first.to_text().unwrap().contains("\"setup\""));

            ws.send(Message::Text(r#"{"setupComplete":{}}"#.to_string()))
                .await
                .unwrap();

            let fenced = "```json{\"analysis\":\"person at the door\",\"riskLevel\":\"WARNING\"}```";
            let analysis = serde_json::json!({
                "serverContent": {"modelTurn": {"parts": [{"text": fenced}]}}
            });
            ws.send(Message::Text(analysis.to_string())).await.unwrap();

            let tool_call = serde_json::json!({
                "toolCall": {"functionCalls": [
                    {"name": "door", "args": {"action": "OPEN"}, "id": "fc-1"}
                ]}
            });
            ws.send(Message::Text(tool_call.to_string())).await.unwrap();

            // Drain inbound traffic until both the tool response and a
            // media frame have arrived, then close the session.
            let mut saw_tool_response = false;
            let mut saw_media = false;
            while !(saw_tool_response && saw_media) {
                let Some(Ok(message)) = ws.next().await else {
                    return;
                };
                if let Ok(text) = message.to_text() {
                    saw_tool_response |= text.contains("\"toolResponse\"");
                    saw_media |= text.contains("\"realtimeInput\"");
                }
            }
            let _ = ws.close(None).await;
        });
        (format!("ws://{addr}"), handle)
    }

    #[tokio::test]
    async fn full_session_round_trip() {
        let (url, endpoint) = spawn_fake_endpoint().await;
        let transport = client::config::Config::builder()
            .with_base_url(&url)
            .with_api_key("test-key")
            .build();
        let gateway = RecordingGateway::new();
        let session = SessionManager::new(SessionConfig::new(transport), gateway.clone());
        let monitor = session.monitor();
        let mut status = session.watch_status();

        session.start().await.unwrap();
        wait_for_status(&mut status, SessionStatus::Connected).await;

        // A second start while connected must not double-initialize.
        session.start().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);

        // The fenced analysis flows through queue -> decoder -> risk.
        wait_until(|| monitor.level() == RiskLevel::Warning).await;
        wait_until(|| gateway.door_calls.load(Ordering::SeqCst) == 1).await;

        // A frame sent mid-session is accepted without status change.
        session
            .send_media(MediaFrame::Jpeg(vec![0xFF, 0xD8]))
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);

        // The endpoint closes after the tool response; the session
        // routes the remote close through stop().
        wait_for_status(&mut status, SessionStatus::Disconnected).await;
        endpoint.await.unwrap();

        let snapshot = monitor.snapshot();
        assert!(snapshot
            .iter()
            .any(|e| e.kind == FeedKind::Analysis && e.text.contains("person at the door")));
        assert!(snapshot
            .iter()
            .any(|e| e.kind == FeedKind::Tool && e.text.contains("door opened")));

        // Stopping again is a no-op.
        session.stop();
        assert_eq!(session.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn frames_are_dropped_without_an_active_session() {
        let session = SessionManager::new(SessionConfig::default(), RecordingGateway::new());
        session
            .send_media(MediaFrame::Pcm16(vec![0; 16]))
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Disconnected);
    }
}
