//! Shared helpers for the integration tests

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use srtc_publish::testing::LoopbackEngine;
use srtc_publish::{
    AudioConfig, ConnectionState, OfferConfig, PeerConnection, PubAudioCodec, PubVideoCodec,
    SimulcastLayer, VideoConfig,
};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn h264_video() -> VideoConfig {
    VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31)])
}

pub fn opus_audio() -> AudioConfig {
    AudioConfig::new(vec![PubAudioCodec::opus(10, true)])
}

pub fn layers(names: &[&str]) -> Vec<SimulcastLayer> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| SimulcastLayer::new(*n, 320 << i, 180 << i, 500 * (i as u32 + 1)))
        .collect()
}

pub fn simulcast_video(names: &[&str]) -> VideoConfig {
    VideoConfig::simulcast(vec![PubVideoCodec::h264(0x42, 31)], layers(names))
}

/// Offer, then answer with the loopback engine's accepting answer.
pub fn negotiate(pc: &PeerConnection, video: Option<&VideoConfig>, audio: Option<&AudioConfig>) {
    let offer = pc
        .init_publish_offer(&OfferConfig::new("test-cname"), video, audio)
        .expect("offer");
    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .expect("answer");
}

/// Install a state listener that forwards into a channel.
pub fn record_states(pc: &PeerConnection) -> Receiver<ConnectionState> {
    let (tx, rx) = crossbeam_channel::unbounded();
    pc.set_connection_state_listener(move |state| {
        let _ = tx.send(state);
    });
    rx
}

/// Collect states until `Closed` or until the wait expires.
pub fn states_until_closed(rx: &Receiver<ConnectionState>) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    while let Ok(state) = rx.recv_timeout(WAIT) {
        seen.push(state);
        if state == ConnectionState::Closed {
            break;
        }
    }
    seen
}

pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
