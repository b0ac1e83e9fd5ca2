//! Register-direct backend for the CSND service.
//!
//! A play is one channel-register write: two physical memory blocks, a byte
//! size, and a flags word carrying format, loop mode, channel and timer.
//! The hardware runs from block 0 into block 1 and then repeats block 1, so
//! a looped sound uses block 0 for the lead-in and block 1 for the loop
//! body. One-shot sounds point both blocks at the first sample and set the
//! one-shot loop mode instead.

use bitflags::bitflags;
use log::{trace, warn};

use super::{Environment, PlayRequest, PlaybackBackend, ServiceError};
use crate::cwav_parser::{AdpcmInfo, Encoding};
use crate::error::{CwavError, Result};

/// Hardware channels exposed by CSND.
pub const CSND_NUM_CHANNELS: u32 = 32;

/// Timer dividend: sample rate to timer register value.
pub const CSND_TIMER_BASE: u32 = 0x03FE_C3FC;

/// Fastest timer value the hardware accepts.
pub const CSND_TIMER_MIN: u32 = 0x0042;

/// Slowest timer value the hardware accepts.
pub const CSND_TIMER_MAX: u32 = 0xFFFF;

bitflags! {
    /// Channel register flags word
    ///
    /// Bits 0-4 hold the channel number and bits 16-31 the timer; build those
    /// with [`SoundFlags::channel`] and [`SoundFlags::timer`]. PCM8 is format
    /// zero, i.e. no format bit set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SoundFlags: u32 {
        /// Linear interpolation between samples
        const LINEAR_INTERP = 1 << 6;
        /// Loop mode: repeat block 1 after block 0
        const REPEAT = 1 << 10;
        /// Loop mode: play block 0 once
        const ONE_SHOT = 2 << 10;
        /// Signed 16-bit PCM
        const FORMAT_PCM16 = 1 << 12;
        /// IMA-ADPCM
        const FORMAT_ADPCM = 2 << 12;
        /// Start the channel
        const ENABLE = 1 << 14;
    }
}

impl SoundFlags {
    /// Channel number field.
    pub fn channel(channel: u32) -> Self {
        Self::from_bits_retain(channel & 0x1F)
    }

    /// Timer field.
    pub fn timer(timer: u32) -> Self {
        Self::from_bits_retain((timer & 0xFFFF) << 16)
    }

    /// Format bits for an encoding, `None` when CSND cannot decode it.
    pub fn format(encoding: Encoding) -> Option<Self> {
        match encoding {
            Encoding::Pcm8 => Some(Self::empty()),
            Encoding::Pcm16 => Some(Self::FORMAT_PCM16),
            Encoding::ImaAdpcm => Some(Self::FORMAT_ADPCM),
            Encoding::DspAdpcm => None,
        }
    }

    /// Channel number stored in the word.
    pub fn channel_index(self) -> u32 {
        self.bits() & 0x1F
    }

    /// Timer stored in the word.
    pub fn timer_value(self) -> u32 {
        self.bits() >> 16
    }
}

/// Timer register value for a playback rate in Hz, clamped to the hardware
/// range.
pub fn csnd_timer(rate: f32) -> u32 {
    let rate = rate as u32;
    if rate == 0 {
        return CSND_TIMER_MAX;
    }
    (CSND_TIMER_BASE / rate).clamp(CSND_TIMER_MIN, CSND_TIMER_MAX)
}

/// Volume register word: left volume in the low half, right in the high
/// half, each scaled to 0x8000.
pub fn csnd_volumes(volume: f32, pan: f32) -> u32 {
    let volume = volume.clamp(0.0, 1.0);
    let right = ((pan + 1.0) / 2.0).clamp(0.0, 1.0);
    let left_volume = (volume * (1.0 - right) * 32768.0) as u32;
    let right_volume = (volume * right * 32768.0) as u32;
    left_volume | (right_volume << 16)
}

/// Virtual to physical address translation applied before addresses reach
/// the hardware.
pub type VaToPa = Box<dyn Fn(*const u8) -> u32 + Send + Sync>;

/// Default translation: the address itself.
///
/// Only meaningful on 32-bit targets; 64-bit host pointers are truncated, so
/// hosted builds must install their own with [`CsndBackend::set_va_to_pa`].
fn identity_va_to_pa(addr: *const u8) -> u32 {
    addr as usize as u32
}

/// Commands of the CSND service
///
/// Register writes are queued; `exec_cmds` submits the queue.
pub trait CsndService: Send {
    /// Bitmask of the channels granted to this application.
    fn channel_mask(&self) -> u32;

    /// Program a channel's registers and start it when `flags` has ENABLE.
    fn set_channel_regs(
        &mut self,
        flags: SoundFlags,
        physaddr0: u32,
        physaddr1: u32,
        size: u32,
        volumes: u32,
        capture_volumes: u32,
    );

    /// Reprogram one memory block of a running channel.
    fn set_block(&mut self, channel: u32, block: u32, physaddr: u32, size: u32);

    /// Load IMA-ADPCM predictor and step index for a block.
    fn set_adpcm_state(&mut self, channel: u32, block: u32, sample: i16, index: u8);

    /// Start or stop a channel.
    fn set_play_state(&mut self, channel: u32, playing: bool);

    /// Query whether a channel is playing.
    fn is_playing(&mut self, channel: u32) -> std::result::Result<bool, ServiceError>;

    /// Submit queued commands, optionally waiting for completion.
    fn exec_cmds(&mut self, wait_done: bool) -> std::result::Result<(), ServiceError>;
}

/// Backend driving CSND hardware channels.
pub struct CsndBackend<S: CsndService> {
    service: S,
    va_to_pa: Option<VaToPa>,
}

impl<S: CsndService> CsndBackend<S> {
    /// Wrap a CSND service connection.
    pub fn new(service: S) -> Self {
        Self {
            service,
            va_to_pa: None,
        }
    }

    /// Replace the address translation; `None` restores the identity default.
    pub fn set_va_to_pa(&mut self, callback: Option<VaToPa>) {
        self.va_to_pa = callback;
    }

    /// The wrapped service.
    pub fn service(&self) -> &S {
        &self.service
    }

    fn translate(&self, addr: *const u8) -> u32 {
        match &self.va_to_pa {
            Some(callback) => callback(addr),
            None => identity_va_to_pa(addr),
        }
    }

    fn exec(&mut self) {
        if let Err(err) = self.service.exec_cmds(true) {
            warn!("CSND command submission failed: {err}");
        }
    }
}

impl<S: CsndService> PlaybackBackend for CsndBackend<S> {
    fn environment(&self) -> Environment {
        Environment::Csnd
    }

    fn channel_count(&self) -> u32 {
        CSND_NUM_CHANNELS
    }

    fn is_channel_available(&self, channel: u32) -> bool {
        channel < CSND_NUM_CHANNELS && (self.service.channel_mask() >> channel) & 1 != 0
    }

    fn is_encoding_supported(&self, encoding: Encoding) -> bool {
        SoundFlags::format(encoding).is_some()
    }

    fn is_playing(&mut self, channel: u32) -> bool {
        let playing = match self.service.is_playing(channel) {
            Ok(playing) => playing,
            Err(err) => {
                warn!("CSND status query for channel {channel} failed: {err}");
                false
            }
        };
        self.exec();
        playing
    }

    fn set_adpcm_state(&mut self, channel: u32, info: &AdpcmInfo, looped: bool) {
        let AdpcmInfo::Ima(ima) = info else {
            warn!("CSND cannot load DSP-ADPCM state on channel {channel}");
            return;
        };
        let loop_context = if looped { ima.loop_context } else { ima.context };
        self.service
            .set_adpcm_state(channel, 0, ima.context.predictor, ima.context.step_index);
        self.service
            .set_adpcm_state(channel, 1, loop_context.predictor, loop_context.step_index);
    }

    fn play(&mut self, request: &PlayRequest<'_>) -> Result<()> {
        let channel = request.channel;
        if !self.is_channel_available(channel) {
            return Err(CwavError::InvalidArgument(format!(
                "CSND channel {channel} is not granted to this application"
            )));
        }
        let format = SoundFlags::format(request.encoding).ok_or(CwavError::UnsupportedEncoding {
            raw: request.encoding as u8,
        })?;
        let loop_mode = if request.looped {
            SoundFlags::REPEAT
        } else {
            SoundFlags::ONE_SHOT
        };

        let paddr0 = self.translate(request.samples.as_ptr());
        let paddr1 = self.translate(request.loop_body().as_ptr());
        let size = request.samples.len() as u32;
        let timer = csnd_timer(request.effective_rate());
        let flags = SoundFlags::ENABLE
            | loop_mode
            | format
            | SoundFlags::channel(channel)
            | SoundFlags::timer(timer);
        let volumes = csnd_volumes(request.volume, request.pan);

        trace!(
            "CSND ch{channel}: {} {size} bytes, timer 0x{timer:04x}, block1 at +{}",
            request.encoding,
            request.loop_offset
        );
        self.service
            .set_channel_regs(flags, paddr0, paddr1, size, volumes, volumes);

        if request.looped && paddr1 > paddr0 {
            // Block 0 is already running; block 1 covers only the loop body.
            self.service
                .set_block(channel, 1, paddr1, size - (paddr1 - paddr0));
        }

        self.service.exec_cmds(true)?;
        Ok(())
    }

    fn stop(&mut self, channel: u32) {
        self.service.set_play_state(channel, false);
        self.exec();
    }
}
