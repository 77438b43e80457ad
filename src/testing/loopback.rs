//! In-process media engine for tests, benches and the CLI.
//!
//! `LoopbackEngine` speaks a small SDP dialect: it writes a send-only offer
//! with one `m=` section per media kind, and accepts any answer that selects
//! one of the offered payload types. Nothing leaves the process; published
//! frames are only counted.
//!
//! One engine may serve several sessions. Each session keeps its own event
//! sink; `emit_*` pushes to every session that has not been released.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::engine::{EngineSession, EventSink, MediaEngine};
use crate::errors::EngineError;
use crate::types::{
    AudioConfig, AudioFrameInfo, Codec, ConnectionState, OfferConfig, PubAudioCodec,
    PubVideoCodec, PublishConnectionStats, SimulcastLayer, Track, TrackSet, VideoConfig,
};

/// Engine code for malformed input.
pub const ERROR_INVALID_DATA: i32 = 1;
/// Engine code for calls made in the wrong order.
pub const ERROR_LOGIC: i32 = 2;

const FIRST_VIDEO_PAYLOAD: u8 = 96;
const FIRST_AUDIO_PAYLOAD: u8 = 111;
const LAST_DYNAMIC_PAYLOAD: u8 = 127;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateSession,
    BuildOffer { cname: String, simulcast_layers: usize },
    ParseAnswer,
    CommitAnswer,
    SetCodecSpecificData { track_id: u32, buffers: usize },
    PublishFrame { track_id: u32, bytes: usize },
    Release,
}

#[derive(Default)]
struct LoopbackState {
    fail_create: Option<EngineError>,
    fail_next_offer: Option<EngineError>,
    fail_next_answer: Option<EngineError>,
    fail_next_commit: Option<EngineError>,
    fail_next_publish: Option<EngineError>,
    publish_delay: Option<Duration>,
    calls: Vec<EngineCall>,
    skip_call_log: bool,
    frames: HashMap<u32, u64>,
    packets: u64,
    bytes: u64,
    releases: usize,
    sessions_created: u64,
    sinks: BTreeMap<u64, EventSink>,
}

impl LoopbackState {
    fn log(&mut self, call: EngineCall) {
        if !self.skip_call_log {
            self.calls.push(call);
        }
    }

    fn live_sinks(&self) -> Vec<EventSink> {
        self.sinks.values().cloned().collect()
    }
}

struct Shared {
    state: Mutex<LoopbackState>,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
}

/// Loopback engine. Clones share the same recorded state.
#[derive(Clone)]
pub struct LoopbackEngine {
    shared: Arc<Shared>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopbackState::default()),
                in_flight: AtomicUsize::new(0),
                overlaps: AtomicUsize::new(0),
            }),
        }
    }

    /// An engine whose `create_session` always fails with `error`.
    pub fn failing_create(error: EngineError) -> Self {
        let engine = Self::new();
        engine.state().fail_create = Some(error);
        engine
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.shared.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn fail_next_offer(&self, error: EngineError) {
        self.state().fail_next_offer = Some(error);
    }

    pub fn fail_next_answer(&self, error: EngineError) {
        self.state().fail_next_answer = Some(error);
    }

    /// Fail the next `commit_answer`, after the answer parsed cleanly.
    pub fn fail_next_commit(&self, error: EngineError) {
        self.state().fail_next_commit = Some(error);
    }

    pub fn fail_next_publish(&self, error: EngineError) {
        self.state().fail_next_publish = Some(error);
    }

    /// Make every publish call take at least `delay`.
    pub fn set_publish_delay(&self, delay: Duration) {
        self.state().publish_delay = Some(delay);
    }

    /// Stop recording calls. Counters keep working.
    pub fn disable_call_log(&self) {
        self.state().skip_call_log = true;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Frames published to `track_id`.
    pub fn frames_published(&self, track_id: u32) -> u64 {
        self.state().frames.get(&track_id).copied().unwrap_or(0)
    }

    pub fn total_frames(&self) -> u64 {
        self.state().frames.values().sum()
    }

    pub fn release_count(&self) -> usize {
        self.state().releases
    }

    /// Engine calls that started while another call was still running.
    pub fn overlapping_calls(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// Sessions created and not yet released.
    pub fn live_sessions(&self) -> usize {
        self.state().sinks.len()
    }

    /// Push a state transition to every live session, as a network thread
    /// would.
    ///
    /// Returns `false` if there is no live session.
    pub fn emit_state(&self, state: ConnectionState) -> bool {
        let sinks = self.state().live_sinks();
        for sink in &sinks {
            sink.connection_state(state);
        }
        !sinks.is_empty()
    }

    pub fn emit_stats(&self, stats: PublishConnectionStats) -> bool {
        let sinks = self.state().live_sinks();
        for sink in &sinks {
            sink.stats(stats);
        }
        !sinks.is_empty()
    }

    /// Push a snapshot built from the frames published so far.
    pub fn emit_stats_snapshot(&self) -> bool {
        let stats = {
            let state = self.state();
            PublishConnectionStats {
                packet_count: state.packets,
                byte_count: state.bytes,
                packets_lost_percent: 0.0,
                rtt_ms: 1.0,
                bandwidth_actual_kbps: (state.bytes * 8 / 1000) as f32,
                bandwidth_suggested_kbps: 2500.0,
            }
        };
        self.emit_stats(stats)
    }

    /// Accepting answer for `offer`, shaped like a WHIP server's reply.
    pub fn answer_for(offer: &str) -> String {
        let mut answer = String::new();
        for line in offer.lines() {
            if line.starts_with("a=ssrc:") || line.starts_with("a=ssrc-group:") {
                continue;
            }
            let line = if line == "a=sendonly" {
                "a=recvonly".to_string()
            } else if let Some(rid) = line.strip_prefix("a=rid:") {
                format!("a=rid:{}", rid.replace(" send", " recv"))
            } else if let Some(layers) = line.strip_prefix("a=simulcast:send ") {
                format!("a=simulcast:recv {layers}")
            } else {
                line.to_string()
            };
            answer.push_str(&line);
            answer.push_str("\r\n");
        }
        answer
    }

    fn enter(&self) -> CallGuard {
        if self.shared.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        CallGuard {
            shared: self.shared.clone(),
        }
    }
}

struct CallGuard {
    shared: Arc<Shared>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MediaEngine for LoopbackEngine {
    fn create_session(&self, events: EventSink) -> Result<Box<dyn EngineSession>, EngineError> {
        let mut state = self.state();
        if let Some(error) = state.fail_create.clone() {
            return Err(error);
        }
        state.log(EngineCall::CreateSession);
        state.sessions_created += 1;
        let index = state.sessions_created;
        state.sinks.insert(index, events);
        drop(state);

        Ok(Box::new(LoopbackSession {
            engine: self.clone(),
            index,
            offered: None,
            parsed: None,
            answered: false,
            next_track_id: 1,
            released: false,
        }))
    }
}

/// What the last offer put on the wire.
struct Offered {
    video: BTreeMap<u8, PubVideoCodec>,
    audio: BTreeMap<u8, PubAudioCodec>,
    layers: Vec<SimulcastLayer>,
}

struct LoopbackSession {
    engine: LoopbackEngine,
    /// Key of this session's sink in the engine state.
    index: u64,
    offered: Option<Offered>,
    /// Track id to continue from once the parsed answer is committed.
    parsed: Option<u32>,
    answered: bool,
    next_track_id: u32,
    released: bool,
}

impl LoopbackSession {
    fn record(&self, call: EngineCall) {
        self.engine.state().log(call);
    }

    fn sink(&self) -> Option<EventSink> {
        self.engine.state().sinks.get(&self.index).cloned()
    }
}

/// Consecutive payload types from `first`, within the dynamic range.
fn payload_types(first: u8, count: usize, kind: &str) -> Result<Vec<u8>, EngineError> {
    (0..count)
        .map(|i| {
            u8::try_from(i)
                .ok()
                .and_then(|i| first.checked_add(i))
                .filter(|pt| *pt <= LAST_DYNAMIC_PAYLOAD)
                .ok_or_else(|| {
                    EngineError::new(
                        ERROR_INVALID_DATA,
                        format!("Too many {kind} codecs for the dynamic payload range"),
                    )
                })
        })
        .collect()
}

impl EngineSession for LoopbackSession {
    fn build_offer(
        &mut self,
        offer: &OfferConfig,
        video: Option<&VideoConfig>,
        audio: Option<&AudioConfig>,
    ) -> Result<String, EngineError> {
        let _guard = self.engine.enter();
        self.record(EngineCall::BuildOffer {
            cname: offer.cname.clone(),
            simulcast_layers: video.map_or(0, |v| v.simulcast_layer_list.len()),
        });
        if let Some(error) = self.engine.state().fail_next_offer.take() {
            return Err(error);
        }
        self.parsed = None;
        self.answered = false;

        let mut offered = Offered {
            video: BTreeMap::new(),
            audio: BTreeMap::new(),
            layers: Vec::new(),
        };
        let mut sdp = String::new();
        let _ = write!(
            sdp,
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            uuid::Uuid::new_v4().as_u128() as u32
        );

        let mut mid = 0;
        let mut ssrc = 0x1000_u32;
        if let Some(video) = video {
            let payloads = payload_types(FIRST_VIDEO_PAYLOAD, video.codec_list.len(), "video")?;
            let _ = write!(sdp, "m=video 9 UDP/TLS/RTP/SAVPF {}\r\n", join(&payloads));
            let _ = write!(sdp, "a=mid:{mid}\r\na=sendonly\r\n");
            mid += 1;
            for (pt, codec) in payloads.iter().zip(&video.codec_list) {
                let plid = codec.options().profile_level_id().unwrap_or_default();
                let _ = write!(
                    sdp,
                    "a=rtpmap:{pt} {}/90000\r\na=fmtp:{pt} level-asymmetry-allowed=1;packetization-mode=1;profile-level-id={plid:06x}\r\n",
                    codec.codec.name()
                );
                offered.video.insert(*pt, *codec);
            }
            for layer in &video.simulcast_layer_list {
                let _ = write!(
                    sdp,
                    "a=rid:{} send max-width={};max-height={}\r\n",
                    layer.name, layer.width, layer.height
                );
            }
            if video.is_simulcast() {
                let names: Vec<&str> = video
                    .simulcast_layer_list
                    .iter()
                    .map(|l| l.name.as_str())
                    .collect();
                let _ = write!(sdp, "a=simulcast:send {}\r\n", names.join(";"));
                offered.layers = video.simulcast_layer_list.clone();
            }
            let _ = write!(sdp, "a=ssrc:{ssrc} cname:{}\r\n", offer.cname);
            ssrc += 1;
        }

        if let Some(audio) = audio {
            let payloads = payload_types(FIRST_AUDIO_PAYLOAD, audio.codec_list.len(), "audio")?;
            let _ = write!(sdp, "m=audio 9 UDP/TLS/RTP/SAVPF {}\r\n", join(&payloads));
            let _ = write!(sdp, "a=mid:{mid}\r\na=sendonly\r\n");
            for (pt, codec) in payloads.iter().zip(&audio.codec_list) {
                let _ = write!(
                    sdp,
                    "a=rtpmap:{pt} {}/48000/2\r\na=fmtp:{pt} minptime={};useinbandfec=1;stereo={}\r\n",
                    codec.codec.name(),
                    codec.minptime,
                    u8::from(codec.stereo)
                );
                offered.audio.insert(*pt, *codec);
            }
            let _ = write!(sdp, "a=ssrc:{ssrc} cname:{}\r\n", offer.cname);
        }

        self.offered = Some(offered);
        Ok(sdp)
    }

    fn parse_answer(&mut self, answer: &str) -> Result<TrackSet, EngineError> {
        let _guard = self.engine.enter();
        self.record(EngineCall::ParseAnswer);
        self.parsed = None;
        if let Some(error) = self.engine.state().fail_next_answer.take() {
            return Err(error);
        }
        if self.answered {
            return Err(EngineError::new(ERROR_LOGIC, "Answer has already been applied"));
        }

        let offered = self
            .offered
            .as_ref()
            .ok_or_else(|| EngineError::new(ERROR_LOGIC, "No offer has been built"))?;
        let parsed = ParsedAnswer::parse(answer)?;
        let mut next_id = self.next_track_id;
        let mut allocate = || {
            let id = next_id;
            next_id += 1;
            id
        };

        let mut video_tracks = Vec::new();
        if let Some(pts) = &parsed.video_payloads {
            let (pt, codec) = pts
                .iter()
                .find_map(|pt| offered.video.get(pt).map(|c| (*pt, *c)))
                .ok_or_else(|| {
                    EngineError::new(ERROR_INVALID_DATA, "Answer selected no offered video codec")
                })?;

            if offered.layers.is_empty() {
                let id = allocate();
                video_tracks.push(Track::new(id, pt, codec.codec, Some(codec.options()), None));
            } else {
                if parsed.rids.is_empty() {
                    return Err(EngineError::new(
                        ERROR_INVALID_DATA,
                        "Answer has no simulcast layers",
                    ));
                }
                for rid in &parsed.rids {
                    let layer = offered
                        .layers
                        .iter()
                        .find(|l| &l.name == rid)
                        .cloned()
                        .unwrap_or_else(|| SimulcastLayer::new(rid.clone(), 0, 0, 0));
                    let id = allocate();
                    video_tracks.push(Track::new(
                        id,
                        pt,
                        codec.codec,
                        Some(codec.options()),
                        Some(layer),
                    ));
                }
            }
        }

        let audio_track = match &parsed.audio_payloads {
            Some(pts) => {
                let (pt, codec) = pts
                    .iter()
                    .find_map(|pt| offered.audio.get(pt).map(|c| (*pt, *c)))
                    .ok_or_else(|| {
                        EngineError::new(ERROR_INVALID_DATA, "Answer selected no offered audio codec")
                    })?;
                let id = allocate();
                Some(Track::new(id, pt, codec.codec, Some(codec.options()), None))
            }
            None => None,
        };

        self.parsed = Some(next_id);
        Ok(TrackSet {
            video: video_tracks,
            audio: audio_track,
        })
    }

    fn commit_answer(&mut self) -> Result<(), EngineError> {
        let _guard = self.engine.enter();
        self.record(EngineCall::CommitAnswer);
        if let Some(error) = self.engine.state().fail_next_commit.take() {
            return Err(error);
        }
        let next_id = self
            .parsed
            .take()
            .ok_or_else(|| EngineError::new(ERROR_LOGIC, "No parsed answer to apply"))?;

        self.next_track_id = next_id;
        self.answered = true;
        if let Some(sink) = self.sink() {
            sink.connection_state(ConnectionState::Connecting);
        }
        Ok(())
    }

    fn set_codec_specific_data(&mut self, track: &Track, buffers: &[&[u8]]) -> Result<(), EngineError> {
        let _guard = self.engine.enter();
        self.record(EngineCall::SetCodecSpecificData {
            track_id: track.track_id(),
            buffers: buffers.len(),
        });
        if track.codec() != Codec::H264 {
            return Err(EngineError::new(
                ERROR_INVALID_DATA,
                format!("{} takes no codec-specific data", track.codec().name()),
            ));
        }
        Ok(())
    }

    fn publish_frame(
        &mut self,
        track: &Track,
        buffer: &[u8],
        _audio: Option<AudioFrameInfo>,
    ) -> Result<(), EngineError> {
        let _guard = self.engine.enter();
        let delay = {
            let mut state = self.engine.state();
            state.log(EngineCall::PublishFrame {
                track_id: track.track_id(),
                bytes: buffer.len(),
            });
            if let Some(error) = state.fail_next_publish.take() {
                return Err(error);
            }
            *state.frames.entry(track.track_id()).or_insert(0) += 1;
            // Roughly one packet per MTU-sized chunk.
            state.packets += (buffer.len() as u64).div_ceil(1200);
            state.bytes += buffer.len() as u64;
            state.publish_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            log::warn!("Loopback session released twice");
        }
        self.released = true;
        let mut state = self.engine.state();
        state.log(EngineCall::Release);
        state.releases += 1;
        state.sinks.remove(&self.index);
    }
}

fn join(payloads: &[u8]) -> String {
    payloads
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct ParsedAnswer {
    video_payloads: Option<Vec<u8>>,
    audio_payloads: Option<Vec<u8>>,
    rids: Vec<String>,
}

impl ParsedAnswer {
    fn parse(answer: &str) -> Result<Self, EngineError> {
        let mut lines = answer.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("v=0") {
            return Err(EngineError::new(ERROR_INVALID_DATA, "Answer is not a session description"));
        }

        let mut parsed = ParsedAnswer::default();
        let mut in_video = false;
        for line in lines {
            if let Some(media) = line.strip_prefix("m=") {
                let mut fields = media.split_whitespace();
                let kind = fields.next().unwrap_or_default();
                let payloads = fields
                    .skip(2)
                    .map(|pt| {
                        pt.parse::<u8>().map_err(|_| {
                            EngineError::new(ERROR_INVALID_DATA, format!("Bad payload type {pt}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                in_video = kind == "video";
                match kind {
                    "video" => parsed.video_payloads = Some(payloads),
                    "audio" => parsed.audio_payloads = Some(payloads),
                    _ => {}
                }
            } else if let Some(rid) = line.strip_prefix("a=rid:") {
                if in_video {
                    let mut fields = rid.split_whitespace();
                    if let (Some(name), Some("recv")) = (fields.next(), fields.next()) {
                        parsed.rids.push(name.to_string());
                    }
                }
            }
        }
        Ok(parsed)
    }
}
