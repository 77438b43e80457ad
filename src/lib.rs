//! srtc-publish: publish-only WebRTC sessions over an external media engine
//!
//! This crate wraps a native WebRTC engine (transport, SDP, packetization)
//! behind a thread-safe session object that a media producer drives:
//! build an offer, apply the answer, then publish encoded frames to the
//! negotiated tracks while connection state and statistics are delivered to
//! listeners on a dedicated thread.
//!
//! # Features
//! - Single-video, simulcast (up to three layers) and audio publishing
//! - Explicit release with idempotent, use-after-release-safe semantics
//! - Ordered connection-state delivery; `Closed` is always the last event
//! - Bounded statistics delivery that drops snapshots under backpressure
//!
//! # Usage
//! ```rust,no_run
//! use srtc_publish::testing::LoopbackEngine;
//! use srtc_publish::{OfferConfig, PeerConnection, PubVideoCodec, VideoConfig};
//!
//! # fn main() -> Result<(), srtc_publish::RtcError> {
//! let engine = LoopbackEngine::new();
//! let pc = PeerConnection::new(&engine)?;
//! let video = VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31)]);
//! let offer = pc.init_publish_offer(&OfferConfig::default(), Some(&video), None)?;
//! pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))?;
//! pc.publish_video_single_frame(&[0, 0, 0, 1, 0x65, 0x88])?;
//! pc.release();
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod engine;
pub mod errors;
pub mod frames;
mod negotiation;
pub mod notify;
pub mod peer_connection;
mod session;
pub mod types;

// Testing utilities - loopback engine and synthetic media
pub mod testing;

// Re-exports for convenience
pub use config::SrtcConfig;
pub use engine::{EngineSession, EventSink, MediaEngine};
pub use errors::{EngineError, RtcError, RtcErrorKind};
pub use frames::TrackSelector;
pub use notify::{ConnectionStateListener, PublishConnectionStatsListener};
pub use peer_connection::PeerConnection;
pub use types::{
    AudioConfig, AudioFrameInfo, Codec, CodecOptions, ConnectionState, MediaKind, OfferConfig,
    PubAudioCodec, PubVideoCodec, PublishConnectionStats, SimulcastLayer, Track, TrackSet,
    VideoConfig, MAX_SIMULCAST_LAYERS,
};

/// Initialize logging with the default filter
pub fn init_logging() {
    init_logging_with_filter("srtc_publish=info");
}

/// Initialize logging; `RUST_LOG` takes precedence over `default_filter`
pub fn init_logging_with_filter(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        max_simulcast_layers: MAX_SIMULCAST_LAYERS,
        codecs: vec![Codec::H264, Codec::Opus],
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub max_simulcast_layers: usize,
    pub codecs: Vec<Codec>,
}
