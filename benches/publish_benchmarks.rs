//! Publish path benchmarks for srtc-publish
//!
//! Run with: cargo bench --bench publish_benchmarks
//!
//! Measures the facade overhead per call (locking, track resolution,
//! argument checks) against the loopback engine, which does no real work.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use srtc_publish::testing::{
    synthetic_h264_access_unit, synthetic_opus_packet, LoopbackEngine,
};
use srtc_publish::{
    AudioConfig, OfferConfig, PeerConnection, PubAudioCodec, PubVideoCodec, PublishConnectionStats,
    SimulcastLayer, VideoConfig,
};
use std::time::Duration;

fn negotiated(video: &VideoConfig, audio: Option<&AudioConfig>) -> (LoopbackEngine, PeerConnection) {
    let engine = LoopbackEngine::new();
    engine.disable_call_log();
    let pc = PeerConnection::new(&engine).unwrap();
    let offer = pc
        .init_publish_offer(&OfferConfig::new("bench"), Some(video), audio)
        .unwrap();
    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
        .unwrap();
    (engine, pc)
}

fn simulcast_config() -> VideoConfig {
    VideoConfig::simulcast(
        vec![PubVideoCodec::h264(0x42, 31)],
        vec![
            SimulcastLayer::new("low", 320, 180, 500),
            SimulcastLayer::new("mid", 640, 360, 1500),
            SimulcastLayer::new("hi", 1280, 720, 2500),
        ],
    )
}

fn bench_single_video_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("Single video publish");
    group.measurement_time(Duration::from_secs(5));

    let video = VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31)]);
    let (_engine, pc) = negotiated(&video, None);

    for (size, name) in [(1200, "1.2KB"), (16 * 1024, "16KB"), (128 * 1024, "128KB")] {
        let au = synthetic_h264_access_unit(1, size, 60);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("frame", name), &au, |b, au| {
            b.iter(|| pc.publish_video_single_frame(black_box(au)).unwrap())
        });
    }
    group.finish();
}

fn bench_simulcast_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("Simulcast publish");
    let (_engine, pc) = negotiated(&simulcast_config(), None);

    let frames: Vec<(&str, Vec<u8>)> = [("low", 2000), ("mid", 6000), ("hi", 10000)]
        .into_iter()
        .map(|(name, size)| (name, synthetic_h264_access_unit(1, size, 60)))
        .collect();

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("all layers", |b| {
        b.iter(|| {
            for (layer, au) in &frames {
                pc.publish_video_simulcast_frame(black_box(layer), black_box(au))
                    .unwrap();
            }
        })
    });
    group.finish();
}

fn bench_audio_publish(c: &mut Criterion) {
    let video = VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31)]);
    let audio = AudioConfig::new(vec![PubAudioCodec::opus(10, true)]);
    let (_engine, pc) = negotiated(&video, Some(&audio));
    let packet = synthetic_opus_packet(1, true);

    c.bench_function("audio frame", |b| {
        b.iter(|| {
            pc.publish_audio_frame(black_box(&packet), 48000, 2)
                .unwrap()
        })
    });
}

fn bench_negotiation(c: &mut Criterion) {
    let engine = LoopbackEngine::new();
    engine.disable_call_log();
    let video = simulcast_config();
    let audio = AudioConfig::new(vec![PubAudioCodec::opus(10, true)]);

    c.bench_function("create, negotiate, release", |b| {
        b.iter(|| {
            let pc = PeerConnection::new(&engine).unwrap();
            let offer = pc
                .init_publish_offer(&OfferConfig::default(), Some(&video), Some(&audio))
                .unwrap();
            pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))
                .unwrap();
            pc.release();
        })
    });
}

fn bench_stats_delivery(c: &mut Criterion) {
    let video = VideoConfig::single(vec![PubVideoCodec::h264(0x42, 31)]);
    let (engine, pc) = negotiated(&video, None);
    pc.set_publish_connection_stats_listener(|stats| {
        black_box(stats);
    });

    c.bench_function("stats post", |b| {
        b.iter(|| engine.emit_stats(black_box(PublishConnectionStats::default())))
    });
}

criterion_group!(
    benches,
    bench_single_video_publish,
    bench_simulcast_publish,
    bench_audio_publish,
    bench_negotiation,
    bench_stats_delivery
);
criterion_main!(benches);
