//! Shared helpers for integration tests: a BCWAV container builder and
//! fake sound services whose state the tests can inspect.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use cwav::{
    AppletCallback, AppletEvent, AppletHook, CsndService, Encoding, NdspFormat, NdspService,
    ServiceError, SoundFlags, WaveBufStatus, WaveBuffer,
};
use parking_lot::Mutex;

pub const HEADER_SIZE: usize = 0x40;
/// Padding between the DATA block header and the first channel's samples.
pub const DATA_PAD: usize = 0x18;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Positions of interesting fields in a built container, for corrupting.
#[derive(Debug, Clone)]
pub struct BuiltCwav {
    pub bytes: Vec<u8>,
    pub info_offset: usize,
    pub info_size: usize,
    pub data_offset: usize,
    /// Absolute offsets of the channel descriptors.
    pub descriptors: Vec<usize>,
    /// Absolute offsets of the ADPCM records.
    pub adpcm_records: Vec<usize>,
    /// Absolute offsets of each channel's first sample byte.
    pub samples: Vec<usize>,
}

impl BuiltCwav {
    pub fn put_u8(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    pub fn put_u16(&mut self, at: usize, value: u16) {
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Builds well-formed BCWAV containers.
#[derive(Debug, Clone)]
pub struct CwavBuilder {
    encoding: Encoding,
    raw_encoding: Option<u8>,
    looped: bool,
    sample_rate: u32,
    loop_start: u32,
    loop_end: u32,
    channels: usize,
}

impl Default for CwavBuilder {
    fn default() -> Self {
        Self {
            encoding: Encoding::Pcm16,
            raw_encoding: None,
            looped: false,
            sample_rate: 32_728,
            loop_start: 0,
            loop_end: 64,
            channels: 1,
        }
    }
}

impl CwavBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Write this byte as the encoding instead of `encoding`.
    pub fn raw_encoding(mut self, raw: u8) -> Self {
        self.raw_encoding = Some(raw);
        self
    }

    pub fn looped(mut self, loop_start: u32, loop_end: u32) -> Self {
        self.looped = true;
        self.loop_start = loop_start;
        self.loop_end = loop_end;
        self
    }

    pub fn one_shot(mut self, samples: u32) -> Self {
        self.looped = false;
        self.loop_start = 0;
        self.loop_end = samples;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    fn record_size(&self) -> usize {
        match self.encoding {
            Encoding::DspAdpcm => 46,
            Encoding::ImaAdpcm => 8,
            _ => 0,
        }
    }

    pub fn build(&self) -> BuiltCwav {
        let n = self.channels;
        let record_size = self.record_size();
        let channel_bytes = self.encoding.bytes_for_samples(self.loop_end);

        // INFO layout, offsets relative to the block start.
        let table = 0x1C;
        let descriptor_base = table + 4 + 8 * n;
        let record_base = descriptor_base + 20 * n;
        let info_size = align(record_base + record_size * n, 0x20);

        let info_offset = HEADER_SIZE;
        let data_offset = info_offset + info_size;
        let data_size = 8 + DATA_PAD + channel_bytes * n;
        let file_size = data_offset + data_size;

        let mut out = vec![0u8; file_size];
        let mut w = Writer(&mut out);

        // Header
        w.bytes(0x00, b"CWAV");
        w.u16(0x04, 0xFEFF);
        w.u16(0x06, HEADER_SIZE as u16);
        w.u32(0x08, 0x0201_0000);
        w.u32(0x0C, file_size as u32);
        w.u16(0x10, 2);
        w.sized_ref(0x14, 0x7000, info_offset as u32, info_size as u32);
        w.sized_ref(0x20, 0x7001, data_offset as u32, data_size as u32);

        // INFO
        let info = info_offset;
        w.bytes(info, b"INFO");
        w.u32(info + 0x04, info_size as u32);
        w.u8(
            info + 0x08,
            self.raw_encoding.unwrap_or(self.encoding as u8),
        );
        w.u8(info + 0x09, self.looped as u8);
        w.u32(info + 0x0C, self.sample_rate);
        w.u32(info + 0x10, self.loop_start);
        w.u32(info + 0x14, self.loop_end);
        w.u32(info + table, n as u32);

        let mut descriptors = Vec::with_capacity(n);
        let mut adpcm_records = Vec::new();
        let mut samples = Vec::with_capacity(n);
        for i in 0..n {
            let descriptor = descriptor_base + 20 * i;
            w.reference(info + table + 4 + 8 * i, 0x7100, (descriptor - table) as u32);

            let sample_rel = DATA_PAD + channel_bytes * i;
            w.reference(info + descriptor, 0x1F00, sample_rel as u32);

            match self.encoding.adpcm_reference() {
                Some(kind) => {
                    let record = record_base + record_size * i;
                    w.reference(info + descriptor + 8, kind as u16, (record - descriptor) as u32);
                    self.write_record(&mut w, info + record, i);
                    adpcm_records.push(info + record);
                }
                None => w.reference(info + descriptor + 8, 0, 0xFFFF_FFFF),
            }
            descriptors.push(info + descriptor);
            samples.push(data_offset + 8 + sample_rel);
        }

        // DATA
        w.bytes(data_offset, b"DATA");
        w.u32(data_offset + 4, data_size as u32);
        for (i, &start) in samples.iter().enumerate() {
            out[start..start + channel_bytes].fill(i as u8 + 1);
        }

        BuiltCwav {
            bytes: out,
            info_offset,
            info_size,
            data_offset,
            descriptors,
            adpcm_records,
            samples,
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().bytes
    }

    fn write_record(&self, w: &mut Writer<'_>, at: usize, channel: usize) {
        let seed = channel as u16 + 1;
        match self.encoding {
            Encoding::ImaAdpcm => {
                w.u16(at, 100 * seed);
                w.u8(at + 2, 10 + seed as u8);
                w.u16(at + 4, 200 * seed);
                w.u8(at + 6, 20 + seed as u8);
            }
            Encoding::DspAdpcm => {
                for c in 0..16 {
                    w.u16(at + 2 * c, seed * 0x100 + c as u16);
                }
                w.u16(at + 32, 0x10 + seed);
                w.u16(at + 34, 1);
                w.u16(at + 36, 2);
                w.u16(at + 38, 0x20 + seed);
                w.u16(at + 40, 3);
                w.u16(at + 42, 4);
            }
            _ => {}
        }
    }
}

fn align(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

struct Writer<'a>(&'a mut Vec<u8>);

impl Writer<'_> {
    fn bytes(&mut self, at: usize, bytes: &[u8]) {
        self.0[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn u8(&mut self, at: usize, value: u8) {
        self.0[at] = value;
    }

    fn u16(&mut self, at: usize, value: u16) {
        self.bytes(at, &value.to_le_bytes());
    }

    fn u32(&mut self, at: usize, value: u32) {
        self.bytes(at, &value.to_le_bytes());
    }

    fn reference(&mut self, at: usize, kind: u16, offset: u32) {
        self.u16(at, kind);
        self.u32(at + 4, offset);
    }

    fn sized_ref(&mut self, at: usize, kind: u16, offset: u32, size: u32) {
        self.reference(at, kind, offset);
        self.u32(at + 8, size);
    }
}

/// One `set_channel_regs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub flags: SoundFlags,
    pub paddr0: u32,
    pub paddr1: u32,
    pub size: u32,
    pub volumes: u32,
}

#[derive(Debug, Default)]
pub struct CsndState {
    pub mask: u32,
    pub playing: u32,
    pub regs: Vec<RegWrite>,
    pub blocks: Vec<(u32, u32, u32, u32)>,
    pub adpcm: Vec<(u32, u32, i16, u8)>,
    pub stops: Vec<u32>,
}

impl CsndState {
    /// Pretend the hardware reached the end of a one-shot sound.
    pub fn finish(&mut self, channel: u32) {
        self.playing &= !(1 << channel);
    }

    pub fn playing_count(&self) -> u32 {
        self.playing.count_ones()
    }
}

/// CSND service recording every command.
pub struct FakeCsnd {
    state: Arc<Mutex<CsndState>>,
}

impl FakeCsnd {
    /// Fake granted the channels in `mask`.
    pub fn new(mask: u32) -> (Self, Arc<Mutex<CsndState>>) {
        let state = Arc::new(Mutex::new(CsndState {
            mask,
            ..CsndState::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl CsndService for FakeCsnd {
    fn channel_mask(&self) -> u32 {
        self.state.lock().mask
    }

    fn set_channel_regs(
        &mut self,
        flags: SoundFlags,
        paddr0: u32,
        paddr1: u32,
        size: u32,
        volumes: u32,
        _capture_volumes: u32,
    ) {
        let mut state = self.state.lock();
        if flags.contains(SoundFlags::ENABLE) {
            state.playing |= 1 << flags.channel_index();
        }
        state.regs.push(RegWrite {
            flags,
            paddr0,
            paddr1,
            size,
            volumes,
        });
    }

    fn set_block(&mut self, channel: u32, block: u32, physaddr: u32, size: u32) {
        self.state
            .lock()
            .blocks
            .push((channel, block, physaddr, size));
    }

    fn set_adpcm_state(&mut self, channel: u32, block: u32, sample: i16, index: u8) {
        self.state.lock().adpcm.push((channel, block, sample, index));
    }

    fn set_play_state(&mut self, channel: u32, playing: bool) {
        let mut state = self.state.lock();
        if playing {
            state.playing |= 1 << channel;
        } else {
            state.playing &= !(1 << channel);
            state.stops.push(channel);
        }
    }

    fn is_playing(&mut self, channel: u32) -> Result<bool, ServiceError> {
        Ok((self.state.lock().playing >> channel) & 1 != 0)
    }

    fn exec_cmds(&mut self, _wait_done: bool) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NdspState {
    pub formats: Vec<(u32, NdspFormat)>,
    pub rates: Vec<(u32, f32)>,
    pub mixes: Vec<(u32, [f32; 12])>,
    pub coefs: Vec<(u32, [u16; 16])>,
    pub queued: Vec<(u32, WaveBuffer)>,
    pub resets: Vec<u32>,
    pub status: HashMap<(u32, u32), WaveBufStatus>,
}

impl NdspState {
    /// Pretend the firmware consumed every buffer of a channel.
    pub fn finish(&mut self, channel: u32) {
        for block in 0..2 {
            if let Some(status) = self.status.get_mut(&(channel, block)) {
                *status = WaveBufStatus::Done;
            }
        }
    }

    pub fn queued_on(&self, channel: u32) -> Vec<WaveBuffer> {
        self.queued
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, b)| *b)
            .collect()
    }
}

/// NDSP service recording every command.
pub struct FakeNdsp {
    state: Arc<Mutex<NdspState>>,
}

impl FakeNdsp {
    pub fn new() -> (Self, Arc<Mutex<NdspState>>) {
        let state = Arc::new(Mutex::new(NdspState::default()));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl NdspService for FakeNdsp {
    fn reset_channel(&mut self, channel: u32) {
        let mut state = self.state.lock();
        state.resets.push(channel);
        state.status.retain(|(c, _), _| *c != channel);
    }

    fn set_format(&mut self, channel: u32, format: NdspFormat) {
        self.state.lock().formats.push((channel, format));
    }

    fn set_rate(&mut self, channel: u32, rate: f32) {
        self.state.lock().rates.push((channel, rate));
    }

    fn set_mix(&mut self, channel: u32, mix: &[f32; 12]) {
        self.state.lock().mixes.push((channel, *mix));
    }

    fn set_adpcm_coefs(&mut self, channel: u32, coefs: &[u16; 16]) {
        self.state.lock().coefs.push((channel, *coefs));
    }

    fn add_wave_buffer(&mut self, channel: u32, buffer: &WaveBuffer) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.queued.push((channel, *buffer));
        state
            .status
            .insert((channel, buffer.block), WaveBufStatus::Playing);
        Ok(())
    }

    fn wave_buffer_status(&mut self, channel: u32, block: u32) -> WaveBufStatus {
        self.state
            .lock()
            .status
            .get(&(channel, block))
            .copied()
            .unwrap_or_default()
    }
}

/// Host notifier holding the installed callback.
#[derive(Default)]
pub struct FakeHook {
    pub callback: Option<AppletCallback>,
    pub installs: usize,
}

impl FakeHook {
    pub fn fire(&self, event: AppletEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl AppletHook for FakeHook {
    fn install(&mut self, callback: AppletCallback) {
        self.installs += 1;
        self.callback = Some(callback);
    }
}
