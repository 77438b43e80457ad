//! Routing of codec-specific data and encoded frames to negotiated tracks.

use crate::errors::{Result, RtcError};
use crate::negotiation::Negotiation;
use crate::types::{AudioFrameInfo, Track};

/// Which negotiated track a publish call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelector<'a> {
    /// The single video track of a non-simulcast session.
    VideoSingle,
    /// The video track implementing the named simulcast layer.
    VideoSimulcast(&'a str),
    Audio,
}

impl TrackSelector<'_> {
    fn describe(&self) -> &'static str {
        match self {
            TrackSelector::VideoSingle | TrackSelector::VideoSimulcast(_) => "video",
            TrackSelector::Audio => "audio",
        }
    }

    /// Find the negotiated track for this selector.
    pub(crate) fn resolve<'n>(&self, negotiation: &'n Negotiation) -> Result<&'n Track> {
        let active = negotiation
            .active()
            .ok_or_else(|| RtcError::not_negotiated(self.describe()))?;

        match *self {
            TrackSelector::VideoSingle => {
                if active.simulcast {
                    return Err(RtcError::configuration(
                        "session was negotiated with simulcast; publish to a layer",
                    ));
                }
                active
                    .video_single()
                    .ok_or_else(|| RtcError::not_negotiated("video"))
            }
            TrackSelector::VideoSimulcast(name) => {
                if active.video.is_empty() {
                    return Err(RtcError::not_negotiated("video"));
                }
                active
                    .simulcast_track(name)
                    .ok_or_else(|| RtcError::unknown_layer(name))
            }
            TrackSelector::Audio => active
                .audio
                .as_ref()
                .ok_or_else(|| RtcError::not_negotiated("audio")),
        }
    }
}

pub(crate) fn check_frame(buffer: &[u8]) -> Result<()> {
    if buffer.is_empty() {
        return Err(RtcError::configuration("frame buffer is empty"));
    }
    Ok(())
}

pub(crate) fn check_codec_specific_data(buffers: &[&[u8]]) -> Result<()> {
    if buffers.is_empty() {
        return Err(RtcError::configuration("no codec-specific data buffers"));
    }
    if buffers.iter().any(|b| b.is_empty()) {
        return Err(RtcError::configuration("codec-specific data buffer is empty"));
    }
    Ok(())
}

pub(crate) fn audio_frame_info(sample_rate: u32, channels: u16) -> Result<AudioFrameInfo> {
    if sample_rate == 0 {
        return Err(RtcError::configuration("audio sample rate must be positive"));
    }
    if channels == 0 {
        return Err(RtcError::configuration("audio channel count must be positive"));
    }
    Ok(AudioFrameInfo {
        sample_rate,
        channels,
    })
}
