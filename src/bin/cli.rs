use anyhow::{bail, Context};
use srtc_publish::testing::{
    synthetic_h264_access_unit, synthetic_opus_packet, synthetic_parameter_sets, LoopbackEngine,
    PublisherCharacteristics,
};
use srtc_publish::{
    AudioConfig, ConnectionState, OfferConfig, PeerConnection, PubAudioCodec, PubVideoCodec,
    PublishConnectionStats, SimulcastLayer, SrtcConfig, VideoConfig,
};
use std::env;
use std::sync::{Arc, Mutex};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: srtc-cli <offer|simulate|config> [args]");
        std::process::exit(1);
    }

    let config = SrtcConfig::load_or_default();
    srtc_publish::init_logging_with_filter(&config.logging.default_filter);

    let command = &args[1];
    match command.as_str() {
        "offer" => cmd_offer(&args, &config),
        "simulate" => cmd_simulate(&args, &config),
        "config" => cmd_config(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn demo_video(simulcast: bool) -> VideoConfig {
    let chars = PublisherCharacteristics::default();
    let codecs = vec![PubVideoCodec::h264(chars.profile_id, chars.level)];
    if simulcast {
        VideoConfig::simulcast(
            codecs,
            vec![
                SimulcastLayer::new("low", 320, 180, 500),
                SimulcastLayer::new("mid", 640, 360, 1500),
                SimulcastLayer::new("hi", 1280, 720, 2500),
            ],
        )
    } else {
        VideoConfig::single(codecs)
    }
}

fn demo_audio() -> AudioConfig {
    let chars = PublisherCharacteristics::default();
    AudioConfig::new(vec![PubAudioCodec::opus(
        chars.minptime,
        chars.audio_channels == 2,
    )])
}

fn cmd_offer(args: &[String], config: &SrtcConfig) -> anyhow::Result<()> {
    // offer [--simulcast] [--audio] [--json]
    let engine = LoopbackEngine::new();
    let pc = PeerConnection::with_config(&engine, config)?;

    let video = demo_video(has_flag(args, "--simulcast"));
    let audio = has_flag(args, "--audio").then(demo_audio);
    let sdp = pc.init_publish_offer(&OfferConfig::default(), Some(&video), audio.as_ref())?;

    if has_flag(args, "--json") {
        println!("{}", serde_json::json!({ "session": pc.id(), "sdp": sdp }));
    } else {
        print!("{}", sdp);
    }
    pc.release();
    Ok(())
}

fn cmd_simulate(args: &[String], config: &SrtcConfig) -> anyhow::Result<()> {
    // simulate [--simulcast] [--frames <n>] [--json]
    let mut frames: u64 = 90;
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--frames" {
            i += 1;
            let value = args.get(i).context("--frames needs a value")?;
            frames = value
                .parse()
                .with_context(|| format!("invalid frame count: {}", value))?;
        }
        i += 1;
    }
    let simulcast = has_flag(args, "--simulcast");
    let json = has_flag(args, "--json");

    let engine = LoopbackEngine::new();
    let pc = PeerConnection::with_config(&engine, config)?;

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = states.clone();
    pc.set_connection_state_listener(move |state: ConnectionState| {
        if let Ok(mut s) = recorded.lock() {
            s.push(state);
        }
    });
    let last_stats = Arc::new(Mutex::new(None));
    let recorded = last_stats.clone();
    pc.set_publish_connection_stats_listener(move |stats: PublishConnectionStats| {
        if let Ok(mut s) = recorded.lock() {
            *s = Some(stats);
        }
    });

    let chars = PublisherCharacteristics::default();
    let video = demo_video(simulcast);
    let audio = demo_audio();
    let offer = pc.init_publish_offer(&OfferConfig::default(), Some(&video), Some(&audio))?;
    pc.set_publish_answer(&LoopbackEngine::answer_for(&offer))?;
    engine.emit_state(ConnectionState::Connected);

    let (sps, pps) = synthetic_parameter_sets(chars.profile_id, chars.level);
    let layers: Vec<(String, usize)> = if simulcast {
        pc.video_simulcast_tracks()?
            .iter()
            .filter_map(|t| t.simulcast_layer())
            .map(|l| (l.name.clone(), (l.kilobit_per_second as usize * 125) / 30))
            .collect()
    } else {
        Vec::new()
    };

    if simulcast {
        for (name, _) in &layers {
            pc.set_video_simulcast_codec_specific_data(name, &[&sps, &pps])?;
        }
    } else {
        pc.set_video_single_codec_specific_data(&[&sps, &pps])?;
    }

    for n in 0..frames {
        if simulcast {
            for (name, size) in &layers {
                let au = synthetic_h264_access_unit(n, *size, chars.gop);
                pc.publish_video_simulcast_frame(name, &au)?;
            }
        } else {
            let au = synthetic_h264_access_unit(n, 4000, chars.gop);
            pc.publish_video_single_frame(&au)?;
        }
        let packet = synthetic_opus_packet(n, chars.audio_channels == 2);
        pc.publish_audio_frame(&packet, chars.audio_sample_rate, chars.audio_channels)?;

        if (n + 1) % u64::from(chars.frame_rate) == 0 {
            engine.emit_stats_snapshot();
        }
    }
    engine.emit_stats_snapshot();

    let tracks = pc.tracks()?;
    pc.release();
    drop(pc);

    let states: Vec<ConnectionState> = states.lock().map(|s| s.clone()).unwrap_or_default();
    let stats = last_stats.lock().ok().and_then(|s| *s);
    if json {
        println!(
            "{}",
            serde_json::json!({
                "tracks": tracks,
                "states": states,
                "frames_published": engine.total_frames(),
                "stats": stats,
            })
        );
    } else {
        println!("Tracks: {}", tracks.len());
        for t in tracks.video.iter().chain(tracks.audio.iter()) {
            let layer = t.simulcast_layer().map(|l| l.name.as_str()).unwrap_or("-");
            println!(
                "  track {} pt {} {} layer {}",
                t.track_id(),
                t.payload_id(),
                t.codec().name(),
                layer
            );
        }
        let states: Vec<String> = states.iter().map(|s| s.to_string()).collect();
        println!("States: {}", states.join(" -> "));
        println!("Frames published: {}", engine.total_frames());
        if let Some(s) = stats {
            println!("Last stats: {} packets, {} bytes", s.packet_count, s.byte_count);
        }
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    // config [path]: print the effective configuration, writing defaults if missing
    let path = args
        .get(2)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(SrtcConfig::default_path);

    let config = if path.exists() {
        SrtcConfig::load_from_file(&path)?
    } else {
        let config = SrtcConfig::default();
        config.save_to_file(&path)?;
        config
    };
    if let Err(e) = config.validate() {
        bail!("invalid configuration in {}: {}", path.display(), e);
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
