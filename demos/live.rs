//! Wires the full monitoring pipeline against the real inference and
//! actuator endpoints, with stand-in media sources. Run with a
//! GEMINI_API_KEY in the environment:
//!
//! ```sh
//! cargo run --example live
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing_subscriber::fmt::time::ChronoLocal;

use sentinel_live::actuators::HttpActuators;
use sentinel_live::capture::{AudioSource, CaptureConfig, CaptureScheduler, VideoSource};
use sentinel_live::config::AppConfig;
use sentinel_live::{SessionConfig, SessionManager};

/// Camera stand-in until a real device adapter is plugged in: reports
/// "not ready" on every tick, which the scheduler treats as a normal
/// warm-up condition.
struct IdleCamera;

#[async_trait]
impl VideoSource for IdleCamera {
    async fn capture_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Microphone stand-in producing silence at 16 kHz.
struct SilentMicrophone;

#[async_trait]
impl AudioSource for SilentMicrophone {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    async fn next_samples(&mut self) -> Result<Option<Vec<f32>>> {
        tokio::time::sleep(std::time::Duration::from_millis(64)).await;
        Ok(Some(vec![0.0; 1024]))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("configuration loaded, starting monitoring session");

    let transport = sentinel_live::client::config::Config::builder()
        .with_api_key(&config.gemini_api_key)
        .with_model(&config.model)
        .build();
    let gateway = Arc::new(HttpActuators::new(config.actuator_base_url.clone()));
    let session = SessionManager::new(SessionConfig::new(transport), gateway);

    session.start().await.context("failed to start session")?;

    let capture = CaptureScheduler::spawn(
        session.clone(),
        Box::new(IdleCamera),
        Box::new(SilentMicrophone),
        CaptureConfig {
            image_interval: config.image_interval,
            ..CaptureConfig::default()
        },
    )?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl-C, shutting down");

    capture.stop();
    session.stop();

    for entry in session.monitor().snapshot() {
        tracing::info!("[{:?}] {}", entry.kind, entry.text);
    }
    Ok(())
}
