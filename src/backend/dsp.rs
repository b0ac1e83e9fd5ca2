//! Streaming backend for the NDSP (DSP firmware) service.
//!
//! Each channel owns two wave-buffer descriptors: block 0 for the lead-in,
//! queued only when the sound loops from somewhere past its first sample,
//! and block 1 for the loop body (or the whole clip of a one-shot sound).
//! The firmware updates descriptor status as it consumes them, which is
//! what playing-status queries read back.

use log::{trace, warn};

use super::{Environment, PlayRequest, PlaybackBackend, ServiceError};
use crate::cwav_parser::{AdpcmInfo, DspAdpcmContext, Encoding};
use crate::error::{CwavError, Result};

/// Channels exposed by NDSP.
pub const NDSP_NUM_CHANNELS: u32 = 24;

/// Front weight of the mix matrix; the back channels get the rest.
const FRONT_WEIGHT: f32 = 0.8;
const BACK_WEIGHT: f32 = 0.2;

/// Sample format of a channel (mono formats only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NdspFormat {
    /// Mono signed 8-bit PCM
    Pcm8 = 1,
    /// Mono signed 16-bit PCM
    Pcm16 = 5,
    /// Mono DSP-ADPCM
    Adpcm = 9,
}

impl NdspFormat {
    /// Format for an encoding, `None` when NDSP cannot decode it.
    pub fn from_encoding(encoding: Encoding) -> Option<Self> {
        match encoding {
            Encoding::Pcm8 => Some(NdspFormat::Pcm8),
            Encoding::Pcm16 => Some(NdspFormat::Pcm16),
            Encoding::DspAdpcm => Some(NdspFormat::Adpcm),
            Encoding::ImaAdpcm => None,
        }
    }
}

/// Life cycle of a wave buffer as reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveBufStatus {
    /// Not handed to the firmware.
    #[default]
    Free,
    /// Waiting behind another buffer.
    Queued,
    /// Being played.
    Playing,
    /// Fully consumed.
    Done,
}

impl WaveBufStatus {
    /// Queued or playing.
    pub fn is_active(self) -> bool {
        matches!(self, WaveBufStatus::Queued | WaveBufStatus::Playing)
    }
}

/// One wave-buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveBuffer {
    /// 0 for the lead-in, 1 for the loop body.
    pub block: u32,
    /// Address of the first sample byte.
    pub data_vaddr: usize,
    /// Number of samples to play.
    pub nsamples: u32,
    /// Restart from the beginning when consumed.
    pub looping: bool,
    /// Decoder state at `data_vaddr` for DSP-ADPCM.
    pub adpcm: Option<DspAdpcmContext>,
    /// Last known status.
    pub status: WaveBufStatus,
}

/// Commands of the NDSP service
pub trait NdspService: Send {
    /// Stop a channel and drop its queued buffers.
    fn reset_channel(&mut self, channel: u32);

    /// Set the sample format.
    fn set_format(&mut self, channel: u32, format: NdspFormat);

    /// Set the playback rate in Hz.
    fn set_rate(&mut self, channel: u32, rate: f32);

    /// Set the 12-weight mix matrix.
    fn set_mix(&mut self, channel: u32, mix: &[f32; 12]);

    /// Load DSP-ADPCM coefficients.
    fn set_adpcm_coefs(&mut self, channel: u32, coefs: &[u16; 16]);

    /// Queue a buffer behind the ones already queued on `channel`.
    fn add_wave_buffer(
        &mut self,
        channel: u32,
        buffer: &WaveBuffer,
    ) -> std::result::Result<(), ServiceError>;

    /// Current status of a queued buffer.
    fn wave_buffer_status(&mut self, channel: u32, block: u32) -> WaveBufStatus;
}

/// Mix matrix for a volume and pan: left and right front/back weights,
/// everything else silent.
pub fn dsp_mix(volume: f32, pan: f32) -> [f32; 12] {
    let right = (pan + 1.0) / 2.0;
    let left = 1.0 - right;
    let mut mix = [0.0f32; 12];
    mix[0] = FRONT_WEIGHT * left * volume;
    mix[1] = FRONT_WEIGHT * right * volume;
    mix[2] = BACK_WEIGHT * left * volume;
    mix[3] = BACK_WEIGHT * right * volume;
    mix
}

/// Backend queueing wave buffers on NDSP channels.
pub struct DspBackend<S: NdspService> {
    service: S,
    buffers: Vec<[WaveBuffer; 2]>,
}

impl<S: NdspService> DspBackend<S> {
    /// Backend over all 24 NDSP channels.
    pub fn new(service: S) -> Self {
        Self::build(service, NDSP_NUM_CHANNELS)
    }

    /// Backend restricted to the first `count` channels.
    pub fn with_channel_count(service: S, count: u32) -> Result<Self> {
        if count == 0 || count > NDSP_NUM_CHANNELS {
            return Err(CwavError::Config(format!(
                "DSP channel count must be 1..={NDSP_NUM_CHANNELS}, got {count}"
            )));
        }
        Ok(Self::build(service, count))
    }

    fn build(service: S, count: u32) -> Self {
        let buffers = (0..count)
            .map(|_| {
                [
                    WaveBuffer {
                        block: 0,
                        ..WaveBuffer::default()
                    },
                    WaveBuffer {
                        block: 1,
                        ..WaveBuffer::default()
                    },
                ]
            })
            .collect();
        Self { service, buffers }
    }

    /// The wrapped service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Descriptors of a channel, lead-in first.
    pub fn wave_buffers(&self, channel: u32) -> Option<&[WaveBuffer; 2]> {
        self.buffers.get(channel as usize)
    }

    fn queue(&mut self, channel: u32, block: usize) -> Result<()> {
        let buffer = self.buffers[channel as usize][block];
        self.service.add_wave_buffer(channel, &buffer)?;
        self.buffers[channel as usize][block].status = WaveBufStatus::Queued;
        Ok(())
    }
}

impl<S: NdspService> PlaybackBackend for DspBackend<S> {
    fn environment(&self) -> Environment {
        Environment::Dsp
    }

    fn channel_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    fn is_channel_available(&self, channel: u32) -> bool {
        (channel as usize) < self.buffers.len()
    }

    fn is_encoding_supported(&self, encoding: Encoding) -> bool {
        NdspFormat::from_encoding(encoding).is_some()
    }

    fn is_playing(&mut self, channel: u32) -> bool {
        let Some(pair) = self.buffers.get_mut(channel as usize) else {
            return false;
        };
        let mut playing = false;
        for buffer in pair.iter_mut() {
            if buffer.status != WaveBufStatus::Free {
                buffer.status = self.service.wave_buffer_status(channel, buffer.block);
            }
            playing |= buffer.status.is_active();
        }
        playing
    }

    fn set_adpcm_state(&mut self, channel: u32, info: &AdpcmInfo, looped: bool) {
        let AdpcmInfo::Dsp(dsp) = info else {
            warn!("DSP cannot load IMA-ADPCM state on channel {channel}");
            return;
        };
        let Some(pair) = self.buffers.get_mut(channel as usize) else {
            return;
        };
        self.service.set_adpcm_coefs(channel, &dsp.coefs);
        pair[0].adpcm = Some(dsp.context);
        pair[1].adpcm = Some(if looped { dsp.loop_context } else { dsp.context });
    }

    fn play(&mut self, request: &PlayRequest<'_>) -> Result<()> {
        let channel = request.channel;
        if !self.is_channel_available(channel) {
            return Err(CwavError::InvalidArgument(format!(
                "DSP channel {channel} is outside the {} channel pool",
                self.buffers.len()
            )));
        }
        let format =
            NdspFormat::from_encoding(request.encoding).ok_or(CwavError::UnsupportedEncoding {
                raw: request.encoding as u8,
            })?;

        let rate = request.effective_rate();
        let mix = dsp_mix(request.volume, request.pan);
        self.service.set_format(channel, format);
        self.service.set_rate(channel, rate);
        self.service.set_mix(channel, &mix);

        let looped = request.looped;
        let keep_adpcm = request.encoding == Encoding::DspAdpcm;
        let pair = &mut self.buffers[channel as usize];
        for buffer in pair.iter_mut() {
            if !keep_adpcm {
                buffer.adpcm = None;
            }
        }
        pair[1].data_vaddr = request.loop_body().as_ptr() as usize;
        pair[1].nsamples = if looped {
            request.loop_end - request.loop_start
        } else {
            request.loop_end
        };
        pair[1].looping = looped;

        let lead_in = looped && request.loop_start > 0;
        if lead_in {
            pair[0].data_vaddr = request.samples.as_ptr() as usize;
            pair[0].nsamples = request.loop_start;
            pair[0].looping = false;
        }

        trace!(
            "DSP ch{channel}: {} at {rate} Hz, lead-in {}, body {} samples",
            request.encoding,
            if lead_in { request.loop_start } else { 0 },
            pair[1].nsamples
        );

        if lead_in {
            self.queue(channel, 0)?;
        }
        self.queue(channel, 1)
    }

    fn stop(&mut self, channel: u32) {
        let Some(pair) = self.buffers.get_mut(channel as usize) else {
            return;
        };
        self.service.reset_channel(channel);
        for buffer in pair.iter_mut() {
            buffer.status = WaveBufStatus::Free;
        }
    }
}

impl<S: NdspService> Drop for DspBackend<S> {
    fn drop(&mut self) {
        for (channel, pair) in self.buffers.iter().enumerate() {
            if pair.iter().any(|b| b.status != WaveBufStatus::Free) {
                self.service.reset_channel(channel as u32);
            }
        }
    }
}
