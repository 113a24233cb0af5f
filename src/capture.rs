use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rubato::Resampler;
use tokio::time::MissedTickBehavior;

use crate::types::media::LIVE_API_PCM16_SAMPLE_RATE;
use crate::types::{MediaFrame, SessionStatus};
use crate::utils;

/// Still-image collaborator. `None` means the device has not buffered
/// enough frames to produce a capture yet, a normal condition during
/// warm-up rather than a failure.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn capture_jpeg(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Microphone collaborator delivering mono f32 batches at its native
/// rate. `None` means the stream ended.
#[async_trait]
pub trait AudioSource: Send + Sync {
    fn sample_rate(&self) -> u32;
    async fn next_samples(&mut self) -> Result<Option<Vec<f32>>>;
}

/// Where produced frames go. Implemented by the session manager;
/// abstracted so the capture pipelines can be exercised without a
/// live transport.
#[async_trait]
pub trait MediaSink: Send + Sync {
    fn status(&self) -> SessionStatus;
    async fn send_media(&self, frame: MediaFrame) -> Result<()>;
}

/// Cadence configuration for the two capture pipelines.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Wall-clock period between still images.
    pub image_interval: Duration,
    /// Samples per emitted audio chunk (and per resampler input).
    pub audio_chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            image_interval: Duration::from_secs(1),
            audio_chunk_size: 1024,
        }
    }
}

/// Drives the periodic image sampler and the continuous audio
/// resampling pipeline, handing every produced frame to the sink.
/// Production survives individual send failures; frames are dropped,
/// never queued or reordered.
pub struct CaptureScheduler {
    video_handle: tokio::task::JoinHandle<()>,
    audio_handle: tokio::task::JoinHandle<()>,
}

impl CaptureScheduler {
    pub fn spawn(
        sink: Arc<dyn MediaSink>,
        video: Box<dyn VideoSource>,
        audio: Box<dyn AudioSource>,
        config: CaptureConfig,
    ) -> Result<Self> {
        // Built up front so a bad rate surfaces to the caller instead
        // of dying inside the task.
        let resampler = utils::audio::create_resampler(
            audio.sample_rate() as f64,
            LIVE_API_PCM16_SAMPLE_RATE,
            config.audio_chunk_size,
        )?;

        let video_handle = tokio::spawn(Self::video_loop(
            sink.clone(),
            video,
            config.image_interval,
        ));
        let audio_handle = tokio::spawn(Self::audio_loop(
            sink,
            audio,
            resampler,
            config.audio_chunk_size,
        ));

        Ok(Self {
            video_handle,
            audio_handle,
        })
    }

    /// Stops both pipelines. Safe to call more than once.
    pub fn stop(&self) {
        self.video_handle.abort();
        self.audio_handle.abort();
    }

    async fn video_loop(
        sink: Arc<dyn MediaSink>,
        mut video: Box<dyn VideoSource>,
        period: Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if sink.status() != SessionStatus::Connected {
                continue;
            }
            match video.capture_jpeg().await {
                Ok(Some(jpeg)) => {
                    if let Err(e) = sink.send_media(MediaFrame::Jpeg(jpeg)).await {
                        tracing::warn!("dropping video frame: {:#}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("video capture failed: {:#}", e),
            }
        }
    }

    async fn audio_loop(
        sink: Arc<dyn MediaSink>,
        mut audio: Box<dyn AudioSource>,
        mut resampler: rubato::FastFixedIn<f32>,
        chunk_size: usize,
    ) {
        let mut native: Vec<f32> = Vec::with_capacity(chunk_size * 2);
        let mut resampled: Vec<f32> = Vec::with_capacity(chunk_size * 2);
        loop {
            let batch = match audio.next_samples().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("audio capture failed: {:#}", e);
                    continue;
                }
            };
            native.extend(batch);

            while native.len() >= chunk_size {
                let chunk: Vec<f32> = native.drain(..chunk_size).collect();
                match resampler.process(&[chunk.as_slice()], None) {
                    Ok(output) => {
                        if let Some(channel) = output.first() {
                            resampled.extend_from_slice(channel);
                        }
                    }
                    Err(e) => tracing::warn!("resampling failed: {}", e),
                }
            }

            while resampled.len() >= chunk_size {
                if sink.status() != SessionStatus::Connected {
                    // Nothing is listening; keep the pipeline from
                    // accumulating stale audio.
                    resampled.clear();
                    break;
                }
                let chunk: Vec<f32> = resampled.drain(..chunk_size).collect();
                let pcm = utils::audio::to_pcm16(&chunk);
                if let Err(e) = sink.send_media(MediaFrame::Pcm16(pcm)).await {
                    tracing::warn!("dropping audio chunk: {:#}", e);
                }
            }
        }
        tracing::debug!("audio source ended, stopping audio capture");
    }
}
