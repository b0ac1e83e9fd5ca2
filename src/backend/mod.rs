//! Backend abstraction over the two sound services.
//!
//! The scheduler drives playback through [`PlaybackBackend`] and never knows
//! which service is behind it:
//!
//! - [`CsndBackend`] programs hardware channel registers directly. Looping is
//!   two memory blocks with the hardware running from block 0 into block 1.
//! - [`DspBackend`] queues wave-buffer descriptors on the DSP firmware, two
//!   per channel (lead-in, loop body), and pans through a mix matrix.
//!
//! The two accept different ADPCM flavours, so encoding support is always
//! asked of the active backend rather than assumed.
//!
//! The backend is chosen once, when the [`CwavContext`](crate::CwavContext)
//! is built. Swapping services after the first load is not supported: loaded
//! resources were validated against the first backend's encodings.

#[cfg(feature = "csnd")]
pub mod csnd;
#[cfg(feature = "dsp")]
pub mod dsp;

#[cfg(feature = "csnd")]
pub use csnd::{csnd_timer, csnd_volumes, CsndBackend, CsndService, SoundFlags, VaToPa};
#[cfg(feature = "dsp")]
pub use dsp::{dsp_mix, DspBackend, NdspFormat, NdspService, WaveBufStatus, WaveBuffer};

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cwav_parser::{AdpcmInfo, Encoding};
use crate::Result;

/// Sound service a backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Register-direct CSND service.
    Csnd,
    /// Streaming NDSP (DSP firmware) service.
    Dsp,
}

impl Environment {
    /// Whether support for this environment was compiled in.
    pub fn is_compiled_in(self) -> bool {
        match self {
            Environment::Csnd => cfg!(feature = "csnd"),
            Environment::Dsp => cfg!(feature = "dsp"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Csnd => f.write_str("CSND"),
            Environment::Dsp => f.write_str("DSP"),
        }
    }
}

/// Backend shared by a context, its resources and the lifecycle hook.
pub(crate) type SharedBackend = Arc<Mutex<Box<dyn PlaybackBackend>>>;

/// Failure result code returned by a sound service call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sound service call failed with result code 0x{0:08x}")]
pub struct ServiceError(pub u32);

/// Everything a backend needs to start one physical channel.
#[derive(Debug, Clone, Copy)]
pub struct PlayRequest<'a> {
    /// Physical channel to program.
    pub channel: u32,
    /// Whether the loop body repeats.
    pub looped: bool,
    /// Sample encoding.
    pub encoding: Encoding,
    /// Native sample rate in Hz.
    pub sample_rate: u32,
    /// Playback rate multiplier.
    pub pitch: f32,
    /// Linear volume, 0.0 to 1.0.
    pub volume: f32,
    /// Pan, -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Channel samples from the first sample up to the loop end.
    pub samples: &'a [u8],
    /// Byte offset of the loop body inside `samples` (0 for one-shot sounds).
    pub loop_offset: usize,
    /// Loop start in samples.
    pub loop_start: u32,
    /// Loop end in samples.
    pub loop_end: u32,
}

impl<'a> PlayRequest<'a> {
    /// The loop body, or the whole clip for one-shot sounds.
    pub fn loop_body(&self) -> &'a [u8] {
        &self.samples[self.loop_offset.min(self.samples.len())..]
    }

    /// Sample rate after applying pitch.
    pub fn effective_rate(&self) -> f32 {
        self.sample_rate as f32 * self.pitch
    }
}

/// Common interface for sound service backends
///
/// Status queries and stops are blocking round trips to the service. Once a
/// channel is programmed it plays on its own; `is_playing` may turn false
/// between two calls without any stop being issued.
pub trait PlaybackBackend: Send {
    /// Service this backend drives.
    fn environment(&self) -> Environment;

    /// Size of the physical channel pool.
    fn channel_count(&self) -> u32;

    /// Whether the service granted this channel to the application.
    fn is_channel_available(&self, channel: u32) -> bool;

    /// Whether sounds in `encoding` can be played.
    fn is_encoding_supported(&self, encoding: Encoding) -> bool;

    /// Whether the channel is currently producing sound.
    fn is_playing(&mut self, channel: u32) -> bool;

    /// Whether the channel may be assigned to a new sound.
    fn is_channel_free(&mut self, channel: u32) -> bool {
        self.is_channel_available(channel) && !self.is_playing(channel)
    }

    /// Load decoder state for the lead-in and loop segments of `channel`.
    ///
    /// One-shot sounds reuse the initial state for both segments.
    fn set_adpcm_state(&mut self, channel: u32, info: &AdpcmInfo, looped: bool);

    /// Start playback on `request.channel`.
    fn play(&mut self, request: &PlayRequest<'_>) -> Result<()>;

    /// Silence a channel immediately.
    fn stop(&mut self, channel: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_serializes_lowercase() {
        let json = serde_json::to_string(&Environment::Csnd).unwrap();
        assert_eq!(json, "\"csnd\"");
        let env: Environment = serde_json::from_str("\"dsp\"").unwrap();
        assert_eq!(env, Environment::Dsp);
    }

    #[test]
    fn test_loop_body_of_one_shot_is_whole_clip() {
        let samples = [1u8, 2, 3, 4];
        let request = PlayRequest {
            channel: 0,
            looped: false,
            encoding: Encoding::Pcm8,
            sample_rate: 22_050,
            pitch: 2.0,
            volume: 1.0,
            pan: 0.0,
            samples: &samples,
            loop_offset: 0,
            loop_start: 0,
            loop_end: 4,
        };
        assert_eq!(request.loop_body(), &samples);
        assert_eq!(request.effective_rate(), 44_100.0);
    }
}
