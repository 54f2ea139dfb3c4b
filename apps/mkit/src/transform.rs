// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The `transform` command: decode an audio file, render it to the requested layout and write
//! a WAV file.

use anyhow::{anyhow, bail, Context};
use mediakit_codecs::audio::filters::{VolumeFilter, VolumeFilterConfig};
use mediakit_codecs::audio::{AudioRenderer, ResamplerConfig};
use mediakit_codecs::containers::{SymphoniaMediaSource, WavMediaTarget};
use mediakit_codecs::passthrough::{PassthroughDecoder, PassthroughEncoder};
use mediakit_core::{
    keys, shared_encoder, shared_source, BufferPool, BufferPoolConfig, MediaFormat, MediaKitError,
    MediaRange, MediaSource, TrackTransformationInfo,
};
use mediakit_engine::{
    CallbackContext, MediaTransformer, TrackTransformParams, TransformationListener,
    TransformerConfig,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{AudioConfig, MkitConfig, TransformConfig};

const JOB_ID: &str = "mkit-transform";

/// One audio transform, resolved from command line flags over the `[audio]` config section.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub volume: f64,
    pub range: MediaRange,
}

impl TransformRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, audio: &AudioConfig) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            volume: audio.volume,
            range: MediaRange::default(),
        }
    }
}

/// Open the input and output and assemble the single audio track of the job.
///
/// # Errors
///
/// Fails if the input cannot be decoded, the volume is out of range, or the output file cannot
/// be created.
pub fn build_params(request: &TransformRequest, config: &TransformConfig) -> anyhow::Result<TrackTransformParams> {
    if !request.range.is_valid() {
        bail!("selection end {} is before its start {}", request.range.end_us, request.range.start_us);
    }

    let source = SymphoniaMediaSource::open(&request.input)
        .with_context(|| format!("failed to open {}", request.input.display()))?
        .with_selection(request.range);
    let source_format = source.track_format(0).context("input has no audio track")?;
    let source_rate = source_format.sample_rate().context("input has no sample rate")?;
    let source_channels = source_format.channel_count().context("input has no channel count")?;

    let target_format = MediaFormat::raw_audio(
        request.sample_rate.unwrap_or(source_rate),
        request.channels.unwrap_or(source_channels),
    );
    tracing::info!(source = %source_format, target = %target_format, "Resolved transform formats");

    // Every decoded packet has to fit one decoder input buffer.
    let decoder_capacity = source_format
        .get_int(keys::MAX_INPUT_SIZE)
        .and_then(|size| usize::try_from(size).ok())
        .unwrap_or(config.encoder_buffer_capacity)
        .max(config.encoder_buffer_capacity);

    let encoder = shared_encoder(PassthroughEncoder::new(config.encoder_buffer_capacity));
    let volume = VolumeFilter::new(&VolumeFilterConfig { volume: request.volume })?;
    let renderer = AudioRenderer::new(Arc::clone(&encoder))
        .with_filters(vec![Box::new(volume)])
        .with_buffer_pool(Arc::new(BufferPool::new(BufferPoolConfig { max_pooled: config.max_pooled_buffers })))
        .with_resampler_config(ResamplerConfig { chunk_frames: config.resampler_chunk_frames });

    let target = WavMediaTarget::create(&request.output)
        .with_context(|| format!("failed to create {}", request.output.display()))?;

    Ok(TrackTransformParams::new(shared_source(source), 0, Arc::new(target), 0)
        .with_target_format(target_format)
        .with_decoder(Box::new(PassthroughDecoder::new(decoder_capacity)))
        .with_encoder(encoder)
        .with_renderer(Box::new(renderer)))
}

#[derive(Debug)]
enum JobEvent {
    Progress(f32),
    Completed(Vec<TrackTransformationInfo>),
    Cancelled,
    Failed(String),
}

/// Forwards job callbacks to the command's event loop.
struct ForwardingListener {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ForwardingListener {
    fn forward(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Transform command stopped listening");
        }
    }
}

impl TransformationListener for ForwardingListener {
    fn on_started(&self, job_id: &str) {
        tracing::info!(job_id, "Transform started");
    }

    fn on_progress(&self, _job_id: &str, progress: f32) {
        self.forward(JobEvent::Progress(progress));
    }

    fn on_completed(&self, _job_id: &str, stats: &[TrackTransformationInfo]) {
        self.forward(JobEvent::Completed(stats.to_vec()));
    }

    fn on_cancelled(&self, _job_id: &str, _stats: &[TrackTransformationInfo]) {
        self.forward(JobEvent::Cancelled);
    }

    fn on_error(&self, _job_id: &str, error: &MediaKitError, _stats: &[TrackTransformationInfo]) {
        self.forward(JobEvent::Failed(error.to_string()));
    }
}

/// Run one transform to completion.
///
/// `on_progress` sees every reported progress value. When `shutdown` resolves first the job is
/// stopped and the partial output removed.
///
/// # Errors
///
/// Fails if the job cannot be set up, reports an error, or is cancelled.
pub async fn run(
    request: &TransformRequest,
    config: &MkitConfig,
    shutdown: impl Future<Output = ()>,
    mut on_progress: impl FnMut(f32),
) -> anyhow::Result<Vec<TrackTransformationInfo>> {
    let params = build_params(request, &config.transform)?;

    let transformer = MediaTransformer::new(TransformerConfig {
        progress_granularity: config.transform.progress_granularity,
        check_disk_space: config.transform.check_disk_space,
        callback_context: CallbackContext::Runtime(tokio::runtime::Handle::current()),
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    transformer.start(JOB_ID, vec![params], Arc::new(ForwardingListener { tx }))?;

    tokio::pin!(shutdown);
    let mut stopping = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(JobEvent::Progress(progress)) => on_progress(progress),
                Some(JobEvent::Completed(stats)) => return Ok(stats),
                Some(JobEvent::Cancelled) => bail!("transform cancelled"),
                Some(JobEvent::Failed(error)) => bail!("transform failed: {error}"),
                None => return Err(anyhow!("transform job ended without reporting")),
            },
            () = &mut shutdown, if !stopping => {
                tracing::warn!("Interrupted, stopping transform");
                transformer.stop(JOB_ID);
                stopping = true;
            },
        }
    }
}
