//! Offer/answer negotiation and track derivation tests

mod common;

use common::*;
use srtc_publish::testing::loopback::{ERROR_INVALID_DATA, ERROR_LOGIC};
use srtc_publish::testing::{EngineCall, LoopbackEngine};
use srtc_publish::{
    AudioConfig, Codec, CodecOptions, ConnectionState, EngineError, MediaKind, OfferConfig,
    PeerConnection, PubVideoCodec, RtcErrorKind, SimulcastLayer, VideoConfig,
};

fn engine_and_pc() -> (LoopbackEngine, PeerConnection) {
    let engine = LoopbackEngine::new();
    let pc = PeerConnection::new(&engine).unwrap();
    (engine, pc)
}

fn offer_calls(engine: &LoopbackEngine) -> usize {
    engine
        .calls()
        .iter()
        .filter(|c| matches!(c, EngineCall::BuildOffer { .. }))
        .count()
}

#[test]
fn test_two_video_codecs_and_audio_give_one_track_each() {
    let (_engine, pc) = engine_and_pc();
    let video = VideoConfig::single(vec![
        PubVideoCodec::h264(0x42, 31),
        PubVideoCodec::h264(0x4d, 31),
    ]);
    negotiate(&pc, Some(&video), Some(&opus_audio()));

    let tracks = pc.tracks().unwrap();
    assert_eq!(tracks.len(), 2);

    let video_track = pc.video_single_track().unwrap().unwrap();
    assert_eq!(video_track.codec(), Codec::H264);
    assert_eq!(video_track.media_kind(), MediaKind::Video);
    assert_eq!(
        video_track.codec_options(),
        Some(CodecOptions::H264 {
            profile_id: 0x42,
            level: 31
        })
    );
    assert!(video_track.simulcast_layer().is_none());

    let audio_track = pc.audio_track().unwrap().unwrap();
    assert_eq!(audio_track.codec(), Codec::Opus);
    assert_ne!(audio_track.track_id(), video_track.track_id());

    assert!(pc.video_simulcast_tracks().unwrap().is_empty());
}

#[test]
fn test_simulcast_three_layers_map_by_name() {
    let (_engine, pc) = engine_and_pc();
    let video = simulcast_video(&["low", "mid", "high"]);
    negotiate(&pc, Some(&video), None);

    let tracks = pc.video_simulcast_tracks().unwrap();
    let names: Vec<&str> = tracks
        .iter()
        .map(|t| t.simulcast_layer().unwrap().name.as_str())
        .collect();
    assert_eq!(names, ["low", "mid", "high"]);

    for requested in &video.simulcast_layer_list {
        let track = pc.video_simulcast_track(&requested.name).unwrap().unwrap();
        assert_eq!(track.simulcast_layer(), Some(requested));
    }
    assert!(pc.video_simulcast_track("ultra").unwrap().is_none());
    assert!(pc.video_single_track().unwrap().is_none());
}

#[test]
fn test_four_layers_fail_without_engine_call() {
    let (engine, pc) = engine_and_pc();
    let video = simulcast_video(&["a", "b", "c", "d"]);
    let err = pc
        .init_publish_offer(&OfferConfig::default(), Some(&video), None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Configuration);
    assert_eq!(engine.calls(), vec![EngineCall::CreateSession]);
}

#[test]
fn test_three_layers_are_accepted() {
    let (engine, pc) = engine_and_pc();
    let video = simulcast_video(&["a", "b", "c"]);
    let sdp = pc
        .init_publish_offer(&OfferConfig::new("me"), Some(&video), None)
        .unwrap();
    assert!(sdp.contains("a=simulcast:send a;b;c"));
    assert_eq!(
        engine.calls().last(),
        Some(&EngineCall::BuildOffer {
            cname: "me".to_string(),
            simulcast_layers: 3
        })
    );
}

#[test]
fn test_duplicate_layer_names_fail() {
    let (engine, pc) = engine_and_pc();
    let video = VideoConfig::simulcast(
        vec![PubVideoCodec::h264(0x42, 31)],
        vec![
            SimulcastLayer::new("low", 320, 180, 300),
            SimulcastLayer::new("low", 640, 360, 900),
        ],
    );
    let err = pc
        .init_publish_offer(&OfferConfig::default(), Some(&video), None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Configuration);
    assert!(err.message.contains("low"));
    assert_eq!(offer_calls(&engine), 0);
}

#[test]
fn test_offer_without_media_fails() {
    let (engine, pc) = engine_and_pc();
    let err = pc
        .init_publish_offer(&OfferConfig::default(), None, None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Configuration);
    assert_eq!(offer_calls(&engine), 0);
}

#[test]
fn test_empty_codec_list_fails() {
    let (_engine, pc) = engine_and_pc();
    let err = pc
        .init_publish_offer(&OfferConfig::default(), None, Some(&AudioConfig::default()))
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Configuration);
}

#[test]
fn test_empty_cname_is_generated() {
    let (engine, pc) = engine_and_pc();
    pc.init_publish_offer(&OfferConfig::default(), None, Some(&opus_audio()))
        .unwrap();
    let cname = engine
        .calls()
        .into_iter()
        .find_map(|c| match c {
            EngineCall::BuildOffer { cname, .. } => Some(cname),
            _ => None,
        })
        .unwrap();
    assert_eq!(cname.len(), 32);
    assert!(cname.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_audio_only_session() {
    let (_engine, pc) = engine_and_pc();
    negotiate(&pc, None, Some(&opus_audio()));
    let audio = pc.audio_track().unwrap().unwrap();
    assert_eq!(
        audio.codec_options(),
        Some(CodecOptions::Opus {
            minptime: 10,
            stereo: true
        })
    );
    assert!(pc.video_single_track().unwrap().is_none());
}

#[test]
fn test_answer_before_offer_fails() {
    let (engine, pc) = engine_and_pc();
    let err = pc.set_publish_answer("v=0\r\n").unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(err.code, None);
    assert!(!engine.calls().contains(&EngineCall::ParseAnswer));
}

#[test]
fn test_offer_failure_carries_engine_code() {
    let (engine, pc) = engine_and_pc();
    engine.fail_next_offer(EngineError::new(ERROR_LOGIC, "no transport"));
    let err = pc
        .init_publish_offer(&OfferConfig::default(), Some(&h264_video()), None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(err.code, Some(ERROR_LOGIC));
    assert_eq!(err.message, "no transport");

    // No offer is pending after a failed offer.
    assert_eq!(
        pc.set_publish_answer("v=0\r\n").unwrap_err().kind,
        RtcErrorKind::Negotiation
    );
}

#[test]
fn test_rejected_answer_installs_nothing_and_can_be_retried() {
    let (engine, pc) = engine_and_pc();
    let offer = pc
        .init_publish_offer(&OfferConfig::default(), Some(&h264_video()), Some(&opus_audio()))
        .unwrap();

    let err = pc.set_publish_answer("not sdp").unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(err.code, Some(ERROR_INVALID_DATA));
    assert!(pc.tracks().unwrap().is_empty());

    engine.fail_next_answer(EngineError::new(7, "dtls setup failed"));
    let err = pc
        .set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .unwrap_err();
    assert_eq!(err.code, Some(7));
    assert!(pc.tracks().unwrap().is_empty());

    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .unwrap();
    assert_eq!(pc.tracks().unwrap().len(), 2);
}

#[test]
fn test_answer_with_unknown_codec_is_rejected() {
    let (_engine, pc) = engine_and_pc();
    pc.init_publish_offer(&OfferConfig::default(), Some(&h264_video()), None)
        .unwrap();
    let err = pc
        .set_publish_answer("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 120\r\n")
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert!(pc.video_single_track().unwrap().is_none());
}

#[test]
fn test_simulcast_answer_with_unrequested_layer_is_rejected() {
    let (_engine, pc) = engine_and_pc();
    let offer = pc
        .init_publish_offer(
            &OfferConfig::default(),
            Some(&simulcast_video(&["low", "high"])),
            None,
        )
        .unwrap();
    let answer = LoopbackEngine::answer_for(&offer).replace("a=rid:high recv", "a=rid:ultra recv");
    let err = pc.set_publish_answer(&answer).unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert!(pc.video_simulcast_tracks().unwrap().is_empty());
}

#[test]
fn test_answer_failing_layer_mapping_is_never_applied() {
    let (engine, pc) = engine_and_pc();
    let rx = record_states(&pc);
    let offer = pc
        .init_publish_offer(
            &OfferConfig::default(),
            Some(&simulcast_video(&["low", "high"])),
            None,
        )
        .unwrap();

    let bad = LoopbackEngine::answer_for(&offer).replace("a=rid:high recv", "a=rid:ultra recv");
    assert_eq!(
        pc.set_publish_answer(&bad).unwrap_err().kind,
        RtcErrorKind::Negotiation
    );
    assert!(!engine.calls().contains(&EngineCall::CommitAnswer));
    assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
    assert_eq!(pc.connection_state(), ConnectionState::None);
    assert!(pc.tracks().unwrap().is_empty());

    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .unwrap();
    assert_eq!(pc.video_simulcast_tracks().unwrap().len(), 2);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ConnectionState::Connecting);
    assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
}

#[test]
fn test_failed_commit_keeps_offer_pending() {
    let (engine, pc) = engine_and_pc();
    let rx = record_states(&pc);
    let offer = pc
        .init_publish_offer(&OfferConfig::default(), Some(&h264_video()), None)
        .unwrap();
    let answer = LoopbackEngine::answer_for(&offer);

    engine.fail_next_commit(EngineError::new(9, "transport gone"));
    let err = pc.set_publish_answer(&answer).unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(err.code, Some(9));
    assert!(pc.video_single_track().unwrap().is_none());
    assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());

    pc.set_publish_answer(&answer).unwrap();
    assert!(pc.video_single_track().unwrap().is_some());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ConnectionState::Connecting);
}

#[test]
fn test_codec_list_beyond_payload_range_fails_cleanly() {
    let (_engine, pc) = engine_and_pc();
    let video = VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31); 200]);
    let err = pc
        .init_publish_offer(&OfferConfig::default(), Some(&video), None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(err.code, Some(ERROR_INVALID_DATA));

    // The handle lock is still usable.
    negotiate(&pc, Some(&h264_video()), None);
    assert!(pc.video_single_track().unwrap().is_some());
}

#[test]
fn test_renegotiation_is_refused() {
    let (engine, pc) = engine_and_pc();
    negotiate(&pc, Some(&h264_video()), None);
    let offers = offer_calls(&engine);

    let err = pc
        .init_publish_offer(&OfferConfig::default(), Some(&h264_video()), None)
        .unwrap_err();
    assert_eq!(err.kind, RtcErrorKind::Negotiation);
    assert_eq!(offer_calls(&engine), offers);

    assert_eq!(
        pc.set_publish_answer("v=0\r\n").unwrap_err().kind,
        RtcErrorKind::Negotiation
    );
    assert!(pc.video_single_track().unwrap().is_some());
}

#[test]
fn test_offer_can_be_rebuilt_while_pending() {
    let (_engine, pc) = engine_and_pc();
    pc.init_publish_offer(&OfferConfig::default(), Some(&h264_video()), None)
        .unwrap();
    let offer = pc
        .init_publish_offer(&OfferConfig::default(), None, Some(&opus_audio()))
        .unwrap();
    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .unwrap();

    assert!(pc.audio_track().unwrap().is_some());
    assert!(pc.video_single_track().unwrap().is_none());
}

#[test]
fn test_answer_reports_connecting() {
    let (_engine, pc) = engine_and_pc();
    let rx = record_states(&pc);
    negotiate(&pc, Some(&h264_video()), None);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ConnectionState::Connecting);
}
