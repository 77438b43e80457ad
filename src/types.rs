//! Value types shared by the negotiation, publishing and notification paths.

use serde::{Deserialize, Serialize};

/// Hard limit on simulcast layers per publish request.
pub const MAX_SIMULCAST_LAYERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// Codecs the engine can publish. Discriminants are the stable wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Codec {
    H264 = 1,
    Opus = 100,
}

impl Codec {
    pub fn id(&self) -> i32 {
        *self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Codec::H264),
            100 => Some(Codec::Opus),
            _ => None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Codec::H264 => MediaKind::Video,
            Codec::Opus => MediaKind::Audio,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::Opus => "opus",
        }
    }
}

/// Negotiated per-codec parameters attached to a [`Track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecOptions {
    H264 { profile_id: u8, level: u8 },
    Opus { minptime: u32, stereo: bool },
}

impl CodecOptions {
    /// Packed H264 `profile-level-id`: profile in the high byte, constraint
    /// byte zero, level in the low byte.
    pub fn profile_level_id(&self) -> Option<u32> {
        match self {
            CodecOptions::H264 { profile_id, level } => {
                Some((u32::from(*profile_id) << 16) | u32::from(*level))
            }
            CodecOptions::Opus { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferConfig {
    /// Canonical name for the RTCP SDES item. Generated when empty.
    pub cname: String,
}

impl OfferConfig {
    pub fn new(cname: impl Into<String>) -> Self {
        Self {
            cname: cname.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubVideoCodec {
    pub codec: Codec,
    pub profile_id: u8,
    pub level: u8,
}

impl PubVideoCodec {
    pub fn h264(profile_id: u8, level: u8) -> Self {
        Self {
            codec: Codec::H264,
            profile_id,
            level,
        }
    }

    pub fn options(&self) -> CodecOptions {
        CodecOptions::H264 {
            profile_id: self.profile_id,
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubAudioCodec {
    pub codec: Codec,
    pub minptime: u32,
    pub stereo: bool,
}

impl PubAudioCodec {
    pub fn opus(minptime: u32, stereo: bool) -> Self {
        Self {
            codec: Codec::Opus,
            minptime,
            stereo,
        }
    }

    pub fn options(&self) -> CodecOptions {
        CodecOptions::Opus {
            minptime: self.minptime,
            stereo: self.stereo,
        }
    }
}

/// One parallel encoding of the video source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulcastLayer {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frames_per_second: Option<u32>,
    pub kilobit_per_second: u32,
}

impl SimulcastLayer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, kilobit_per_second: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            frames_per_second: None,
            kilobit_per_second,
        }
    }

    pub fn with_frame_rate(mut self, frames_per_second: u32) -> Self {
        self.frames_per_second = Some(frames_per_second);
        self
    }
}

/// Video part of a publish request. Codec order is preference order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub codec_list: Vec<PubVideoCodec>,
    /// Empty for a single (non-simulcast) video track.
    pub simulcast_layer_list: Vec<SimulcastLayer>,
}

impl VideoConfig {
    pub fn single(codec_list: Vec<PubVideoCodec>) -> Self {
        Self {
            codec_list,
            simulcast_layer_list: Vec::new(),
        }
    }

    pub fn simulcast(codec_list: Vec<PubVideoCodec>, layers: Vec<SimulcastLayer>) -> Self {
        Self {
            codec_list,
            simulcast_layer_list: layers,
        }
    }

    pub fn is_simulcast(&self) -> bool {
        !self.simulcast_layer_list.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub codec_list: Vec<PubAudioCodec>,
}

impl AudioConfig {
    pub fn new(codec_list: Vec<PubAudioCodec>) -> Self {
        Self { codec_list }
    }
}

/// A negotiated outbound media stream.
///
/// Only produced by a successful answer; never constructed by callers of
/// the facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    track_id: u32,
    payload_id: u8,
    codec: Codec,
    codec_options: Option<CodecOptions>,
    simulcast_layer: Option<SimulcastLayer>,
}

impl Track {
    pub fn new(
        track_id: u32,
        payload_id: u8,
        codec: Codec,
        codec_options: Option<CodecOptions>,
        simulcast_layer: Option<SimulcastLayer>,
    ) -> Self {
        Self {
            track_id,
            payload_id,
            codec,
            codec_options,
            simulcast_layer,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn payload_id(&self) -> u8 {
        self.payload_id
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn codec_options(&self) -> Option<CodecOptions> {
        self.codec_options
    }

    pub fn simulcast_layer(&self) -> Option<&SimulcastLayer> {
        self.simulcast_layer.as_ref()
    }

    pub fn media_kind(&self) -> MediaKind {
        self.codec.kind()
    }

    pub(crate) fn set_simulcast_layer(&mut self, layer: SimulcastLayer) {
        self.simulcast_layer = Some(layer);
    }
}

/// Tracks produced by an accepted answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSet {
    /// One entry without a layer, or one entry per simulcast layer.
    pub video: Vec<Track>,
    pub audio: Option<Track>,
}

impl TrackSet {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_none()
    }

    pub fn len(&self) -> usize {
        self.video.len() + usize::from(self.audio.is_some())
    }
}

/// Transport state of the publishing connection.
///
/// Ordered by severity; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ConnectionState {
    None = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 100,
    Closed = 200,
}

impl ConnectionState {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ConnectionState::None),
            1 => Some(ConnectionState::Connecting),
            2 => Some(ConnectionState::Connected),
            100 => Some(ConnectionState::Failed),
            200 => Some(ConnectionState::Closed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::Closed
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Periodic snapshot reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishConnectionStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub packets_lost_percent: f32,
    pub rtt_ms: f32,
    pub bandwidth_actual_kbps: f32,
    pub bandwidth_suggested_kbps: f32,
}

/// Timing metadata carried with every audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFrameInfo {
    pub sample_rate: u32,
    pub channels: u16,
}
