//! Publish-only peer connection.
//!
//! Two locks, never held together:
//! - the handle lock (inside [`SessionHandle`]) serializes every call that
//!   reaches the engine, including release;
//! - the listener lock (inside [`Notifier`]) guards the registered state and
//!   stats listeners.
//!
//! Registering a listener therefore never waits for an in-flight publish
//! call, and listener delivery never waits for the engine.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SrtcConfig;
use crate::engine::MediaEngine;
use crate::errors::{Result, RtcError};
use crate::frames::{self, TrackSelector};
use crate::negotiation::{self, Negotiation};
use crate::notify::Notifier;
use crate::session::{EngineHandle, SessionHandle};
use crate::types::{
    AudioConfig, ConnectionState, OfferConfig, PublishConnectionStats, Track, TrackSet,
    VideoConfig,
};

pub struct PeerConnection {
    session: SessionHandle,
    notifier: Notifier,
    max_simulcast_layers: usize,
    shutdown_timeout: Duration,
}

impl PeerConnection {
    /// Create a session with default configuration.
    pub fn new(engine: &dyn MediaEngine) -> Result<Self> {
        Self::with_config(engine, &SrtcConfig::default())
    }

    /// Create a session, allocating one engine session synchronously.
    pub fn with_config(engine: &dyn MediaEngine, config: &SrtcConfig) -> Result<Self> {
        config.validate().map_err(RtcError::configuration)?;

        let notifier = Notifier::spawn(
            &config.delivery.thread_name,
            config.delivery.stats_queue_capacity,
        )?;

        let engine_session = match engine.create_session(notifier.sink()) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Engine could not create a session: {}", e);
                notifier.shutdown(Duration::from_millis(config.delivery.shutdown_timeout_ms));
                return Err(RtcError::construction(e));
            }
        };

        let session = SessionHandle::new(EngineHandle::new(engine_session));
        log::info!("Created peer connection {}", session.id());

        Ok(Self {
            session,
            notifier,
            max_simulcast_layers: config.negotiation.max_simulcast_layers,
            shutdown_timeout: Duration::from_millis(config.delivery.shutdown_timeout_ms),
        })
    }

    /// Process-unique id of the underlying engine session.
    pub fn id(&self) -> u64 {
        self.session.id()
    }

    /// Release the engine session. Safe to call any number of times, from
    /// any thread, including while other calls are in flight.
    ///
    /// The state listener receives `Closed` as its final event.
    pub fn release(&self) {
        let notifier = &self.notifier;
        if self.session.release(|| notifier.close()) {
            log::info!("Released peer connection {}", self.session.id());
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.is_released()
    }

    // Negotiation

    /// Build the publish offer.
    ///
    /// Policy checks (layer count, unique layer names, codec kinds) run
    /// before the engine is called.
    pub fn init_publish_offer(
        &self,
        offer: &OfferConfig,
        video: Option<&VideoConfig>,
        audio: Option<&AudioConfig>,
    ) -> Result<String> {
        let max_layers = self.max_simulcast_layers;
        self.session.with(|engine, negotiation| {
            negotiation.ensure_can_offer()?;
            let request = negotiation::validate_request(offer, video, audio, max_layers)?;

            let sdp = engine
                .build_offer(&request.offer, request.video.as_ref(), request.audio.as_ref())
                .map_err(RtcError::negotiation)?;

            log::info!(
                "Publish offer ready for session {} (video: {}, audio: {}, simulcast layers: {})",
                self.session.id(),
                request.video.is_some(),
                request.audio.is_some(),
                request
                    .video
                    .as_ref()
                    .map_or(0, |v| v.simulcast_layer_list.len())
            );
            *negotiation = Negotiation::OfferPending(request);
            Ok(sdp)
        })
    }

    /// Apply the remote answer.
    ///
    /// Either the complete track set becomes observable, or nothing does and
    /// the pending offer stays available for another answer. The engine
    /// commits the answer only after its track set passed every check here.
    pub fn set_publish_answer(&self, answer: &str) -> Result<()> {
        self.session.with(|engine, negotiation| {
            let request = negotiation.pending()?;

            let track_set = engine.parse_answer(answer).map_err(|e| {
                log::warn!("Engine rejected publish answer: {}", e);
                RtcError::negotiation(e)
            })?;
            let active = negotiation::derive_tracks(request, track_set).map_err(|e| {
                log::warn!("Publish answer does not match the offer: {}", e);
                e
            })?;
            engine.commit_answer().map_err(|e| {
                log::warn!("Engine could not apply publish answer: {}", e);
                RtcError::negotiation(e)
            })?;

            log::info!(
                "Publish answer applied for session {}: {} video track(s), audio: {}",
                self.session.id(),
                active.video.len(),
                active.audio.is_some()
            );
            *negotiation = Negotiation::Active(active);
            Ok(())
        })
    }

    // Tracks

    pub fn video_single_track(&self) -> Result<Option<Track>> {
        self.session
            .read(|n| n.active().and_then(|a| a.video_single()).cloned())
    }

    pub fn video_simulcast_tracks(&self) -> Result<Vec<Track>> {
        self.session.read(|n| {
            n.active()
                .map(|a| a.simulcast_tracks().to_vec())
                .unwrap_or_default()
        })
    }

    pub fn video_simulcast_track(&self, layer: &str) -> Result<Option<Track>> {
        self.session
            .read(|n| n.active().and_then(|a| a.simulcast_track(layer)).cloned())
    }

    pub fn audio_track(&self) -> Result<Option<Track>> {
        self.session
            .read(|n| n.active().and_then(|a| a.audio.clone()))
    }

    /// Every negotiated track; empty until an answer has been applied.
    pub fn tracks(&self) -> Result<TrackSet> {
        self.session.read(|n| {
            n.active()
                .map(|a| a.to_track_set())
                .unwrap_or_default()
        })
    }

    // Connection state and stats

    /// Replace the connection state listener.
    ///
    /// Called on the session's delivery thread, in emission order.
    pub fn set_connection_state_listener<F>(&self, listener: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.notifier.set_state_listener(Some(Arc::new(listener)));
    }

    pub fn clear_connection_state_listener(&self) {
        self.notifier.set_state_listener(None);
    }

    /// Replace the stats listener. Snapshots may be dropped under backpressure.
    pub fn set_publish_connection_stats_listener<F>(&self, listener: F)
    where
        F: Fn(PublishConnectionStats) + Send + Sync + 'static,
    {
        self.notifier.set_stats_listener(Some(Arc::new(listener)));
    }

    pub fn clear_publish_connection_stats_listener(&self) {
        self.notifier.set_stats_listener(None);
    }

    /// Last state dispatched on the delivery thread.
    pub fn connection_state(&self) -> ConnectionState {
        self.notifier.last_state()
    }

    /// Stats snapshots dropped because the delivery queue was full.
    pub fn dropped_stats(&self) -> u64 {
        self.notifier.dropped_stats()
    }

    // Publishing

    pub fn set_video_single_codec_specific_data(&self, buffers: &[&[u8]]) -> Result<()> {
        self.set_codec_specific_data(TrackSelector::VideoSingle, buffers)
    }

    pub fn publish_video_single_frame(&self, buffer: &[u8]) -> Result<()> {
        self.publish(TrackSelector::VideoSingle, buffer, None)
    }

    pub fn set_video_simulcast_codec_specific_data(
        &self,
        layer: &str,
        buffers: &[&[u8]],
    ) -> Result<()> {
        self.set_codec_specific_data(TrackSelector::VideoSimulcast(layer), buffers)
    }

    pub fn publish_video_simulcast_frame(&self, layer: &str, buffer: &[u8]) -> Result<()> {
        self.publish(TrackSelector::VideoSimulcast(layer), buffer, None)
    }

    /// Publish one encoded audio frame with its timing metadata.
    pub fn publish_audio_frame(&self, buffer: &[u8], sample_rate: u32, channels: u16) -> Result<()> {
        self.publish(TrackSelector::Audio, buffer, Some((sample_rate, channels)))
    }

    /// Set codec-specific data for any track selector.
    pub fn set_codec_specific_data(&self, target: TrackSelector<'_>, buffers: &[&[u8]]) -> Result<()> {
        self.session.with(|engine, negotiation| {
            frames::check_codec_specific_data(buffers)?;
            let track = target.resolve(negotiation)?;
            log::debug!(
                "Codec-specific data for track {}: {} buffer(s)",
                track.track_id(),
                buffers.len()
            );
            engine
                .set_codec_specific_data(track, buffers)
                .map_err(RtcError::publish)
        })
    }

    fn publish(
        &self,
        target: TrackSelector<'_>,
        buffer: &[u8],
        audio: Option<(u32, u16)>,
    ) -> Result<()> {
        self.session.with(|engine, negotiation| {
            frames::check_frame(buffer)?;
            let audio = audio
                .map(|(rate, channels)| frames::audio_frame_info(rate, channels))
                .transpose()?;
            let track = target.resolve(negotiation)?;
            engine
                .publish_frame(track, buffer, audio)
                .map_err(RtcError::publish)
        })
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.release();
        self.notifier.shutdown(self.shutdown_timeout);
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.session.id())
            .field("released", &self.is_released())
            .field("state", &self.connection_state())
            .finish()
    }
}
