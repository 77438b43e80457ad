//! Synthetic encoded media
//!
//! Byte-level stand-ins for encoder output: Annex B H264 access units and
//! parameter sets, and Opus packets. The payloads are not decodable; they
//! only have the framing a publisher would hand to the engine.

/// Annex B start code
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H264 NAL unit types used by the generators
pub const NAL_IDR: u8 = 5;
pub const NAL_NON_IDR: u8 = 1;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// SPS and PPS for `profile_id`/`level`, each with its start code
///
/// Suitable for `set_video_*_codec_specific_data`.
pub fn synthetic_parameter_sets(profile_id: u8, level: u8) -> (Vec<u8>, Vec<u8>) {
    let mut sps = START_CODE.to_vec();
    sps.extend_from_slice(&[0x60 | NAL_SPS, profile_id, 0x00, level, 0xac, 0xd9, 0x40, 0x50]);

    let mut pps = START_CODE.to_vec();
    pps.extend_from_slice(&[0x60 | NAL_PPS, 0xeb, 0xe3, 0xcb, 0x22, 0xc0]);

    (sps, pps)
}

/// One encoded H264 access unit of roughly `size` bytes
///
/// Every `gop`-th frame is an IDR; the rest are P frames. Content varies with
/// the frame number so consecutive frames differ.
pub fn synthetic_h264_access_unit(frame_number: u64, size: usize, gop: u64) -> Vec<u8> {
    let keyframe = gop == 0 || frame_number % gop == 0;
    let nal_type = if keyframe { NAL_IDR } else { NAL_NON_IDR };
    let size = size.max(START_CODE.len() + 2);

    let mut data = Vec::with_capacity(size);
    data.extend_from_slice(&START_CODE);
    data.push(0x60 | nal_type);

    let base = (frame_number % 251) as u8;
    let mut i = 0usize;
    while data.len() < size {
        let byte = base.wrapping_add((i % 256) as u8);
        // Avoid emulating a start code inside the payload.
        data.push(if byte == 0 { 0x01 } else { byte });
        i += 1;
    }
    data
}

pub fn is_keyframe(access_unit: &[u8]) -> bool {
    access_unit.len() > START_CODE.len()
        && access_unit.starts_with(&START_CODE)
        && access_unit[START_CODE.len()] & 0x1f == NAL_IDR
}

/// One Opus packet for a 20ms frame
///
/// TOC byte for CELT fullband 20ms, stereo flag from `stereo`.
pub fn synthetic_opus_packet(frame_number: u64, stereo: bool) -> Vec<u8> {
    let toc = 0xf8 | if stereo { 0x04 } else { 0x00 };
    let mut packet = vec![toc];
    let len = 60 + (frame_number % 40) as usize;
    packet.extend((0..len).map(|i| (frame_number as u8).wrapping_mul(31).wrapping_add(i as u8)));
    packet
}

/// Media parameters of the demo publisher
pub struct PublisherCharacteristics {
    /// H264 Constrained Baseline
    pub profile_id: u8,
    /// Level 3.1
    pub level: u8,
    pub frame_rate: u32,
    pub gop: u64,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Opus minimum packet time, milliseconds
    pub minptime: u32,
}

impl Default for PublisherCharacteristics {
    fn default() -> Self {
        Self {
            profile_id: 0x42,
            level: 31,
            frame_rate: 30,
            gop: 60,
            audio_sample_rate: 48000,
            audio_channels: 2,
            minptime: 10,
        }
    }
}
