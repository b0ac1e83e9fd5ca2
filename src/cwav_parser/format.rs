//! Data structures describing a parsed CWAV container.
//!
//! Nothing here copies sample data: positions are absolute byte offsets into
//! the buffer the container was parsed from.

use std::fmt;

use num_derive::FromPrimitive;

/// `"CWAV"` read as a little-endian word.
pub const CWAV_MAGIC: u32 = 0x5641_5743;
/// `"INFO"` read as a little-endian word.
pub const INFO_MAGIC: u32 = 0x4F46_4E49;
/// `"DATA"` read as a little-endian word.
pub const DATA_MAGIC: u32 = 0x4154_4144;
/// Byte-order mark of a little-endian container.
pub const ENDIAN_MARKER: u16 = 0xFEFF;
/// The only container version understood.
pub const CWAV_VERSION: u32 = 0x0201_0000;
/// INFO + DATA.
pub const BLOCK_COUNT: u16 = 2;

/// Region of the container a read is bounded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// File header.
    Header,
    /// INFO block.
    Info,
    /// DATA block.
    Data,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Header => f.write_str("header"),
            BlockKind::Info => f.write_str("INFO block"),
            BlockKind::Data => f.write_str("DATA block"),
        }
    }
}

/// Type tag carried by every reference in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum ReferenceKind {
    /// Codec record for DSP-ADPCM.
    DspAdpcmInfo = 0x0300,
    /// Codec record for IMA-ADPCM.
    ImaAdpcmInfo = 0x0301,
    /// Raw sample data inside the DATA block.
    SampleData = 0x1F00,
    /// The INFO block.
    InfoBlock = 0x7000,
    /// The DATA block.
    DataBlock = 0x7001,
    /// A per-channel descriptor.
    ChannelInfo = 0x7100,
}

/// Sample encoding stored in the INFO block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Encoding {
    /// Signed 8-bit PCM.
    Pcm8 = 0,
    /// Signed 16-bit little-endian PCM.
    Pcm16 = 1,
    /// Nintendo DSP-ADPCM (8-byte frames of 14 samples).
    DspAdpcm = 2,
    /// IMA-ADPCM (4 bits per sample).
    ImaAdpcm = 3,
}

impl Encoding {
    /// Samples held by one DSP-ADPCM frame.
    pub const DSP_SAMPLES_PER_FRAME: u32 = 14;
    /// Bytes taken by one DSP-ADPCM frame (header byte plus 7 nibble pairs).
    pub const DSP_BYTES_PER_FRAME: usize = 8;

    /// Byte length of `samples` samples in this encoding.
    pub fn bytes_for_samples(self, samples: u32) -> usize {
        let samples = samples as usize;
        match self {
            Encoding::Pcm8 => samples,
            Encoding::Pcm16 => samples * 2,
            Encoding::ImaAdpcm => samples / 2,
            Encoding::DspAdpcm => {
                let per_frame = Self::DSP_SAMPLES_PER_FRAME as usize;
                let frames = samples / per_frame;
                let rest = samples % per_frame;
                let tail = if rest == 0 { 0 } else { 1 + rest.div_ceil(2) };
                frames * Self::DSP_BYTES_PER_FRAME + tail
            }
        }
    }

    /// Whether playback needs a codec-state record per channel.
    pub fn is_adpcm(self) -> bool {
        matches!(self, Encoding::DspAdpcm | Encoding::ImaAdpcm)
    }

    /// Reference kind the codec record of this encoding must carry.
    pub fn adpcm_reference(self) -> Option<ReferenceKind> {
        match self {
            Encoding::DspAdpcm => Some(ReferenceKind::DspAdpcmInfo),
            Encoding::ImaAdpcm => Some(ReferenceKind::ImaAdpcmInfo),
            Encoding::Pcm8 | Encoding::Pcm16 => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Pcm8 => "PCM8",
            Encoding::Pcm16 => "PCM16",
            Encoding::DspAdpcm => "DSP-ADPCM",
            Encoding::ImaAdpcm => "IMA-ADPCM",
        };
        f.write_str(name)
    }
}

/// Tagged offset into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Raw type tag.
    pub kind: u16,
    /// Offset relative to the reference's anchor.
    pub offset: u32,
}

impl Reference {
    /// Byte length of an encoded reference.
    pub const SIZE: usize = 8;

    /// True when the tag equals `kind`.
    pub fn is(&self, kind: ReferenceKind) -> bool {
        self.kind == kind as u16
    }
}

/// Reference that also records the size of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedReference {
    /// Tag and offset.
    pub reference: Reference,
    /// Size of the target block in bytes.
    pub size: u32,
}

impl SizedReference {
    /// Byte length of an encoded sized reference.
    pub const SIZE: usize = 12;
}

/// Fixed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwavHeader {
    /// Declared header length.
    pub header_size: u16,
    /// Declared file length.
    pub file_size: u32,
    /// Location of the INFO block (anchored at file start).
    pub info_block: SizedReference,
    /// Location of the DATA block (anchored at file start).
    pub data_block: SizedReference,
}

impl CwavHeader {
    /// Bytes of the header that carry fields.
    pub const SIZE: usize = 0x14 + 2 * SizedReference::SIZE;
}

/// Decoded INFO block fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoBlock {
    /// Sample encoding.
    pub encoding: Encoding,
    /// Loop flag.
    pub looped: bool,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// First sample of the loop body.
    pub loop_start: u32,
    /// One past the last sample played.
    pub loop_end: u32,
}

impl InfoBlock {
    /// Offset of the channel reference table (its count field) inside INFO.
    pub const REFERENCE_TABLE_OFFSET: usize = 0x1C;
}

/// IMA-ADPCM decoder state at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImaAdpcmContext {
    /// Predicted sample.
    pub predictor: i16,
    /// Index into the step table.
    pub step_index: u8,
}

/// IMA-ADPCM codec record of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImaAdpcmInfo {
    /// State at the first sample.
    pub context: ImaAdpcmContext,
    /// State at the loop start.
    pub loop_context: ImaAdpcmContext,
}

impl ImaAdpcmInfo {
    /// Encoded record length.
    pub const SIZE: usize = 8;
}

/// DSP-ADPCM decoder state at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DspAdpcmContext {
    /// Predictor/scale byte of the frame header.
    pub pred_scale: u16,
    /// Previous decoded sample.
    pub history0: i16,
    /// Sample before `history0`.
    pub history1: i16,
}

/// DSP-ADPCM codec record of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DspAdpcmInfo {
    /// Eight coefficient pairs.
    pub coefs: [u16; 16],
    /// State at the first sample.
    pub context: DspAdpcmContext,
    /// State at the loop start.
    pub loop_context: DspAdpcmContext,
}

impl DspAdpcmInfo {
    /// Encoded record length, trailing padding included.
    pub const SIZE: usize = 46;
}

/// Codec record attached to a channel of an ADPCM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdpcmInfo {
    /// IMA-ADPCM predictor/step pairs.
    Ima(ImaAdpcmInfo),
    /// DSP-ADPCM coefficients and history.
    Dsp(DspAdpcmInfo),
}

/// Per-channel descriptor after reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Absolute buffer offset of this channel's first sample byte.
    pub sample_offset: usize,
    /// Codec record, present for ADPCM encodings.
    pub adpcm: Option<AdpcmInfo>,
}

impl ChannelInfo {
    /// Encoded descriptor length.
    pub const SIZE: usize = 2 * Reference::SIZE + 4;
}

/// Byte geometry of the lead-in and loop segments of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    /// Bytes played once before the loop body (0 for one-shot sounds).
    pub lead_in_size: usize,
    /// Byte offset of the loop body from the first sample (0 for one-shot).
    pub loop_offset: usize,
    /// Bytes from the first sample to the loop end.
    pub total_size: usize,
}

impl SegmentLayout {
    /// Derive the segment geometry from sample positions.
    pub fn new(encoding: Encoding, looped: bool, loop_start: u32, loop_end: u32) -> Self {
        let total_size = encoding.bytes_for_samples(loop_end);
        let lead_in_size = if looped {
            encoding.bytes_for_samples(loop_start)
        } else {
            0
        };
        Self {
            lead_in_size,
            loop_offset: lead_in_size,
            total_size,
        }
    }
}

/// Everything the parser learned about a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CwavLayout {
    /// File header.
    pub header: CwavHeader,
    /// INFO block fields.
    pub info: InfoBlock,
    /// One descriptor per encoded channel.
    pub channels: Vec<ChannelInfo>,
    /// Absolute offset of the first DATA payload byte.
    pub data_payload_offset: usize,
    /// Length of the DATA payload.
    pub data_payload_len: usize,
}

impl CwavLayout {
    /// Number of encoded channels.
    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    /// Segment geometry shared by all channels.
    pub fn segments(&self) -> SegmentLayout {
        SegmentLayout::new(
            self.info.encoding,
            self.info.looped,
            self.info.loop_start,
            self.info.loop_end,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_looped_segments() {
        let seg = SegmentLayout::new(Encoding::Pcm16, true, 100, 500);
        assert_eq!(seg.lead_in_size, 200);
        assert_eq!(seg.loop_offset, 200);
        assert_eq!(seg.total_size, 1000);
    }

    #[test]
    fn test_one_shot_loops_from_first_sample() {
        let seg = SegmentLayout::new(Encoding::Pcm8, false, 100, 500);
        assert_eq!(seg.lead_in_size, 0);
        assert_eq!(seg.loop_offset, 0);
        assert_eq!(seg.total_size, 500);
    }

    #[test]
    fn test_ima_adpcm_is_half_a_byte_per_sample() {
        let seg = SegmentLayout::new(Encoding::ImaAdpcm, true, 64, 1000);
        assert_eq!(seg.lead_in_size, 32);
        assert_eq!(seg.total_size, 500);
    }

    #[test]
    fn test_dsp_adpcm_uses_frame_size() {
        assert_eq!(Encoding::DspAdpcm.bytes_for_samples(28), 16);
        // Partial frame: header byte plus two nibble pairs.
        assert_eq!(Encoding::DspAdpcm.bytes_for_samples(17), 8 + 1 + 2);
    }

    #[test]
    fn test_encoding_byte_round_trip() {
        use num_traits::FromPrimitive;
        assert_eq!(Encoding::from_u8(3), Some(Encoding::ImaAdpcm));
        assert_eq!(Encoding::from_u8(4), None);
        assert_eq!(ReferenceKind::from_u16(0x7100), Some(ReferenceKind::ChannelInfo));
    }
}
