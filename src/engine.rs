//! Boundary with the external media engine.
//!
//! The engine owns transport, SDP and packetization. The facade only talks to
//! it through these two traits and receives its pushes through an
//! [`EventSink`].

use crate::errors::EngineError;
use crate::types::{AudioConfig, AudioFrameInfo, OfferConfig, Track, TrackSet, VideoConfig};

pub use crate::notify::EventSink;

/// Factory for engine-side sessions.
pub trait MediaEngine: Send + Sync {
    /// Allocate one engine session.
    ///
    /// The engine keeps `events` and pushes connection-state transitions and
    /// statistics through it from whatever thread it likes.
    fn create_session(&self, events: EventSink) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One live engine session. Every call is made under the facade's handle lock.
pub trait EngineSession: Send {
    /// Build the local description and return it serialized.
    fn build_offer(
        &mut self,
        offer: &OfferConfig,
        video: Option<&VideoConfig>,
        audio: Option<&AudioConfig>,
    ) -> Result<String, EngineError>;

    /// Parse the remote answer and report the tracks it would produce.
    ///
    /// Nothing is applied and no events are pushed until `commit_answer`.
    /// A later `parse_answer` or `build_offer` discards the parsed answer.
    fn parse_answer(&mut self, answer: &str) -> Result<TrackSet, EngineError>;

    /// Apply the answer last returned by `parse_answer`.
    ///
    /// Only called once the facade has accepted that track set. On error the
    /// session stays unanswered and the offer may be answered again.
    fn commit_answer(&mut self) -> Result<(), EngineError>;

    /// Out-of-band codec configuration (parameter sets) for `track`.
    ///
    /// Buffers are only valid for the duration of the call.
    fn set_codec_specific_data(&mut self, track: &Track, buffers: &[&[u8]]) -> Result<(), EngineError>;

    /// One encoded access unit for `track`. `audio` is set for audio tracks.
    ///
    /// The buffer is only valid for the duration of the call.
    fn publish_frame(
        &mut self,
        track: &Track,
        buffer: &[u8],
        audio: Option<AudioFrameInfo>,
    ) -> Result<(), EngineError>;

    /// Free engine resources. Called exactly once.
    fn release(&mut self);
}
