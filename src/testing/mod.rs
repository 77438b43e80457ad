//! Testing utilities for srtc-publish
//!
//! An in-process engine and synthetic encoded media, so the facade can be
//! driven end to end without a network or an encoder.

pub mod loopback;
pub mod synthetic_data;

pub use loopback::{EngineCall, LoopbackEngine};
pub use synthetic_data::{
    synthetic_h264_access_unit, synthetic_opus_packet, synthetic_parameter_sets,
    PublisherCharacteristics,
};
