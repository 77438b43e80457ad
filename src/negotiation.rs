//! Offer validation and track derivation for the linear
//! offer -> answer -> active negotiation model.

use std::collections::HashSet;

use crate::errors::{Result, RtcError};
use crate::types::{
    AudioConfig, Codec, MediaKind, OfferConfig, SimulcastLayer, Track, TrackSet, VideoConfig,
    MAX_SIMULCAST_LAYERS,
};

/// A validated publish request, kept until the answer arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishRequest {
    pub offer: OfferConfig,
    pub video: Option<VideoConfig>,
    pub audio: Option<AudioConfig>,
}

impl PublishRequest {
    fn is_simulcast(&self) -> bool {
        self.video.as_ref().is_some_and(VideoConfig::is_simulcast)
    }

    fn requested_layer(&self, name: &str) -> Option<&SimulcastLayer> {
        self.video
            .as_ref()?
            .simulcast_layer_list
            .iter()
            .find(|l| l.name == name)
    }

    fn offers_video_codec(&self, codec: Codec) -> bool {
        self.video
            .as_ref()
            .is_some_and(|v| v.codec_list.iter().any(|c| c.codec == codec))
    }

    fn offers_audio_codec(&self, codec: Codec) -> bool {
        self.audio
            .as_ref()
            .is_some_and(|a| a.codec_list.iter().any(|c| c.codec == codec))
    }
}

/// Tracks installed by a successful answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveTracks {
    pub simulcast: bool,
    /// Ordered like the requested layer list when simulcast.
    pub video: Vec<Track>,
    pub audio: Option<Track>,
}

impl ActiveTracks {
    pub fn video_single(&self) -> Option<&Track> {
        if self.simulcast {
            None
        } else {
            self.video.first()
        }
    }

    pub fn simulcast_tracks(&self) -> &[Track] {
        if self.simulcast {
            &self.video
        } else {
            &[]
        }
    }

    pub fn simulcast_track(&self, name: &str) -> Option<&Track> {
        self.simulcast_tracks()
            .iter()
            .find(|t| t.simulcast_layer().is_some_and(|l| l.name == name))
    }

    pub fn to_track_set(&self) -> TrackSet {
        TrackSet {
            video: self.video.clone(),
            audio: self.audio.clone(),
        }
    }
}

/// Negotiation phase of one session. Guarded by the handle lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Negotiation {
    #[default]
    Idle,
    OfferPending(PublishRequest),
    Active(ActiveTracks),
}

impl Negotiation {
    /// Offers may be (re)built until an answer has been accepted.
    pub fn ensure_can_offer(&self) -> Result<()> {
        match self {
            Negotiation::Active(_) => Err(RtcError::negotiation_state(
                "publish negotiation already complete; renegotiation is not supported",
            )),
            Negotiation::Idle | Negotiation::OfferPending(_) => Ok(()),
        }
    }

    pub fn pending(&self) -> Result<&PublishRequest> {
        match self {
            Negotiation::OfferPending(request) => Ok(request),
            Negotiation::Idle => Err(RtcError::negotiation_state(
                "no publish offer has been created",
            )),
            Negotiation::Active(_) => Err(RtcError::negotiation_state(
                "publish answer has already been applied",
            )),
        }
    }

    pub fn active(&self) -> Option<&ActiveTracks> {
        match self {
            Negotiation::Active(tracks) => Some(tracks),
            Negotiation::Idle | Negotiation::OfferPending(_) => None,
        }
    }
}

/// Check a publish request against facade policy before the engine sees it.
///
/// An empty cname is replaced by a generated one.
pub(crate) fn validate_request(
    offer: &OfferConfig,
    video: Option<&VideoConfig>,
    audio: Option<&AudioConfig>,
    max_simulcast_layers: usize,
) -> Result<PublishRequest> {
    if video.is_none() && audio.is_none() {
        return Err(RtcError::configuration(
            "publish offer needs a video or an audio config",
        ));
    }

    if let Some(video) = video {
        validate_video(video, max_simulcast_layers.min(MAX_SIMULCAST_LAYERS))?;
    }
    if let Some(audio) = audio {
        validate_audio(audio)?;
    }

    let mut offer = offer.clone();
    if offer.cname.is_empty() {
        offer.cname = generate_cname();
        log::debug!("Generated cname {}", offer.cname);
    }

    Ok(PublishRequest {
        offer,
        video: video.cloned(),
        audio: audio.cloned(),
    })
}

fn validate_video(video: &VideoConfig, max_layers: usize) -> Result<()> {
    if video.codec_list.is_empty() {
        return Err(RtcError::configuration("video config has no codecs"));
    }
    if let Some(c) = video.codec_list.iter().find(|c| c.codec.kind() != MediaKind::Video) {
        return Err(RtcError::configuration(format!(
            "{} is not a video codec",
            c.codec.name()
        )));
    }

    let layers = &video.simulcast_layer_list;
    if layers.len() > max_layers {
        return Err(RtcError::configuration(format!(
            "{} simulcast layers requested, at most {} are allowed",
            layers.len(),
            max_layers
        )));
    }

    let mut names = HashSet::new();
    for layer in layers {
        if layer.name.is_empty() {
            return Err(RtcError::configuration("simulcast layer name is empty"));
        }
        if !names.insert(layer.name.as_str()) {
            return Err(RtcError::configuration(format!(
                "duplicate simulcast layer name: {}",
                layer.name
            )));
        }
        if layer.width == 0 || layer.height == 0 {
            return Err(RtcError::configuration(format!(
                "simulcast layer {} has no resolution",
                layer.name
            )));
        }
        if layer.kilobit_per_second == 0 {
            return Err(RtcError::configuration(format!(
                "simulcast layer {} has no bitrate",
                layer.name
            )));
        }
        if layer.frames_per_second == Some(0) {
            return Err(RtcError::configuration(format!(
                "simulcast layer {} has a zero frame rate cap",
                layer.name
            )));
        }
    }
    Ok(())
}

fn validate_audio(audio: &AudioConfig) -> Result<()> {
    if audio.codec_list.is_empty() {
        return Err(RtcError::configuration("audio config has no codecs"));
    }
    if let Some(c) = audio.codec_list.iter().find(|c| c.codec.kind() != MediaKind::Audio) {
        return Err(RtcError::configuration(format!(
            "{} is not an audio codec",
            c.codec.name()
        )));
    }
    Ok(())
}

fn generate_cname() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Check the engine's track set against the request that produced the offer.
///
/// Nothing is installed unless the whole set is consistent. Simulcast tracks
/// get the caller's own [`SimulcastLayer`] attached, matched by name.
pub(crate) fn derive_tracks(request: &PublishRequest, set: TrackSet) -> Result<ActiveTracks> {
    if set.is_empty() {
        return Err(RtcError::negotiation_state("answer accepted no tracks"));
    }

    let mut track_ids = HashSet::new();
    for track in set.video.iter().chain(set.audio.iter()) {
        if !track_ids.insert(track.track_id()) {
            return Err(RtcError::negotiation_state(format!(
                "duplicate track id {} in answer",
                track.track_id()
            )));
        }
    }

    if request.video.is_none() && !set.video.is_empty() {
        return Err(RtcError::negotiation_state(
            "answer contains video that was not offered",
        ));
    }
    for track in &set.video {
        if track.media_kind() != MediaKind::Video || !request.offers_video_codec(track.codec()) {
            return Err(RtcError::negotiation_state(format!(
                "answer selected codec {} that was not offered for video",
                track.codec().name()
            )));
        }
    }

    if let Some(audio) = &set.audio {
        if request.audio.is_none() {
            return Err(RtcError::negotiation_state(
                "answer contains audio that was not offered",
            ));
        }
        if audio.media_kind() != MediaKind::Audio || !request.offers_audio_codec(audio.codec()) {
            return Err(RtcError::negotiation_state(format!(
                "answer selected codec {} that was not offered for audio",
                audio.codec().name()
            )));
        }
    }

    let simulcast = request.is_simulcast();
    let video = if simulcast {
        map_simulcast_tracks(request, set.video)?
    } else {
        if set.video.len() > 1 {
            return Err(RtcError::negotiation_state(format!(
                "answer produced {} video tracks without simulcast",
                set.video.len()
            )));
        }
        if set.video.iter().any(|t| t.simulcast_layer().is_some()) {
            return Err(RtcError::negotiation_state(
                "answer produced a simulcast layer that was not offered",
            ));
        }
        set.video
    };

    Ok(ActiveTracks {
        simulcast,
        video,
        audio: set.audio,
    })
}

fn map_simulcast_tracks(request: &PublishRequest, tracks: Vec<Track>) -> Result<Vec<Track>> {
    let mut seen = HashSet::new();
    let mut mapped = Vec::with_capacity(tracks.len());

    for mut track in tracks {
        let name = track
            .simulcast_layer()
            .map(|l| l.name.clone())
            .ok_or_else(|| {
                RtcError::negotiation_state("simulcast answer produced a track without a layer")
            })?;
        let requested = request.requested_layer(&name).ok_or_else(|| {
            RtcError::negotiation_state(format!("answer accepted unknown simulcast layer {name}"))
        })?;
        if !seen.insert(name.clone()) {
            return Err(RtcError::negotiation_state(format!(
                "answer accepted simulcast layer {name} twice"
            )));
        }
        track.set_simulcast_layer(requested.clone());
        mapped.push(track);
    }

    // Present tracks in the caller's layer order.
    let order: Vec<&str> = request
        .video
        .as_ref()
        .map(|v| v.simulcast_layer_list.iter().map(|l| l.name.as_str()).collect())
        .unwrap_or_default();
    mapped.sort_by_key(|t| {
        t.simulcast_layer()
            .and_then(|l| order.iter().position(|n| *n == l.name))
            .unwrap_or(usize::MAX)
    });
    Ok(mapped)
}
