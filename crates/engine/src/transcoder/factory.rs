// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::{AudioTrackTranscoder, PassthroughTrackTranscoder, TrackTranscoder, VideoTrackTranscoder};
use mediakit_codecs::audio::PassthroughSoftwareRenderer;
use mediakit_core::{
    lock_source, mime, Decoder, MediaFormat, RenderMode, Renderer, Result, SharedEncoder,
    SharedSource, SharedTarget, TranscoderError,
};
use std::sync::Arc;

/// Everything needed to transform one source track into one target track.
///
/// Without a target format the track is copied through unchanged and the codec and renderer
/// fields are ignored.
pub struct TrackTransformParams {
    pub source: SharedSource,
    pub source_track: usize,
    pub target: SharedTarget,
    pub target_track: usize,
    pub target_format: Option<MediaFormat>,
    pub decoder: Option<Box<dyn Decoder>>,
    pub encoder: Option<SharedEncoder>,
    pub renderer: Option<Box<dyn Renderer>>,
}

impl TrackTransformParams {
    pub fn new(source: SharedSource, source_track: usize, target: SharedTarget, target_track: usize) -> Self {
        Self {
            source,
            source_track,
            target,
            target_track,
            target_format: None,
            decoder: None,
            encoder: None,
            renderer: None,
        }
    }

    #[must_use]
    pub fn with_target_format(mut self, format: MediaFormat) -> Self {
        self.target_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: SharedEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

/// Pick and build the transcoder for one track.
///
/// - no target format: passthrough
/// - video: decoder, encoder and a surface renderer are required
/// - audio: decoder and encoder are required; a missing renderer becomes a
///   [`PassthroughSoftwareRenderer`] over the encoder
/// - anything else: passthrough
///
/// # Errors
///
/// Returns a [`TranscoderError`] for missing or incompatible components, or any error raised
/// while initialising them.
pub fn create_track_transcoder(params: TrackTransformParams) -> Result<Box<dyn TrackTranscoder>> {
    let TrackTransformParams {
        source,
        source_track,
        target,
        target_track,
        target_format,
        decoder,
        encoder,
        renderer,
    } = params;

    let Some(target_format) = target_format else {
        tracing::debug!(track = source_track, "No target format, copying track through");
        return Ok(Box::new(PassthroughTrackTranscoder::new(source, source_track, target, target_track)?));
    };

    let source_mime = lock_source(&source)?
        .track_format(source_track)
        .and_then(|format| format.mime().map(str::to_string))
        .ok_or(TranscoderError::SourceTrackMimeTypeNotFound)?;

    if mime::is_video(&source_mime) {
        let decoder = decoder.ok_or(TranscoderError::DecoderNotProvided)?;
        let encoder = encoder.ok_or(TranscoderError::EncoderNotProvided)?;
        let renderer = renderer.ok_or(TranscoderError::RendererNotProvided)?;
        if renderer.mode() != RenderMode::Surface {
            return Err(TranscoderError::IncompatibleRenderer { mime: source_mime }.into());
        }
        Ok(Box::new(VideoTrackTranscoder::new(
            source,
            source_track,
            target,
            target_track,
            target_format,
            decoder,
            encoder,
            renderer,
        )?))
    } else if mime::is_audio(&source_mime) {
        let decoder = decoder.ok_or(TranscoderError::DecoderNotProvided)?;
        let encoder = encoder.ok_or(TranscoderError::EncoderNotProvided)?;
        let renderer = renderer.unwrap_or_else(|| -> Box<dyn Renderer> {
            Box::new(PassthroughSoftwareRenderer::new(Arc::clone(&encoder)))
        });
        Ok(Box::new(AudioTrackTranscoder::new(
            source,
            source_track,
            target,
            target_track,
            target_format,
            decoder,
            encoder,
            renderer,
        )?))
    } else {
        tracing::debug!(track = source_track, mime = %source_mime, "Unsupported media type, copying track through");
        Ok(Box::new(PassthroughTrackTranscoder::new(source, source_track, target, target_track)?))
    }
}
