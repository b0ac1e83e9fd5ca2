//! CWAV parser producing a [`CwavLayout`].
//!
//! Validation runs in a fixed order and stops at the first failure:
//! header constants, INFO magic and size, encoding support, channel
//! descriptor tags, codec record tags (ADPCM only), DATA magic, and finally
//! the sample ranges inside the DATA payload.
//!
//! Reference offsets are not all relative to the same place:
//!
//! | reference            | anchor                                   |
//! |----------------------|------------------------------------------|
//! | INFO / DATA block    | start of file                            |
//! | channel descriptor   | count field of the INFO reference table  |
//! | codec record         | start of the channel descriptor          |
//! | sample data          | first byte of the DATA payload           |

use num_traits::FromPrimitive;

use super::format::{
    AdpcmInfo, BlockKind, ChannelInfo, CwavHeader, CwavLayout, DspAdpcmContext, DspAdpcmInfo,
    Encoding, ImaAdpcmContext, ImaAdpcmInfo, InfoBlock, Reference, ReferenceKind,
    SegmentLayout, BLOCK_COUNT, CWAV_MAGIC, CWAV_VERSION, DATA_MAGIC, ENDIAN_MARKER, INFO_MAGIC,
};
use super::view::ByteView;
use crate::error::{CwavError, Result};

/// Parse a CWAV container from raw bytes.
///
/// `supports` decides whether the active backend can play the file's
/// encoding; a `false` answer fails the parse with
/// [`CwavError::UnsupportedEncoding`].
pub fn parse_cwav(data: &[u8], supports: impl Fn(Encoding) -> bool) -> Result<CwavLayout> {
    CwavParser { data }.parse(&supports)
}

struct CwavParser<'a> {
    data: &'a [u8],
}

/// Channel descriptor whose sample reference is not resolved yet.
struct PendingChannel {
    descriptor: usize,
    samples: Reference,
}

impl<'a> CwavParser<'a> {
    fn parse(&self, supports: &dyn Fn(Encoding) -> bool) -> Result<CwavLayout> {
        let header = self.parse_header()?;

        let info_view = self.info_view(&header)?;
        let info = Self::parse_info_fields(&info_view, &header, supports)?;
        let pending = Self::parse_channel_descriptors(&info_view)?;
        let adpcm = Self::parse_adpcm_records(&info_view, info.encoding, &pending)?;

        let data_view = self.data_view(&header)?;
        let payload_len = data_view.len() - 8;
        let payload_offset = header.data_block.reference.offset as usize + 8;
        let payload = ByteView::new(data_view.bytes(8, payload_len)?, BlockKind::Data);

        let segments =
            SegmentLayout::new(info.encoding, info.looped, info.loop_start, info.loop_end);
        let mut channels = Vec::with_capacity(pending.len());
        for (idx, channel) in pending.iter().enumerate() {
            let rel = payload
                .resolve(0, channel.samples.offset, segments.total_size)
                .map_err(|_| {
                    CwavError::InvalidDataBlock(format!(
                        "channel {idx}: {} sample bytes at payload offset 0x{:x} exceed {} byte payload",
                        segments.total_size, channel.samples.offset, payload_len
                    ))
                })?;
            channels.push(ChannelInfo {
                sample_offset: payload_offset + rel,
                adpcm: adpcm.get(idx).copied(),
            });
        }

        Ok(CwavLayout {
            header,
            info,
            channels,
            data_payload_offset: payload_offset,
            data_payload_len: payload_len,
        })
    }

    fn parse_header(&self) -> Result<CwavHeader> {
        let view = ByteView::new(self.data, BlockKind::Header);
        view.ensure_range(0, CwavHeader::SIZE)?;

        let magic = view.read_u32(0x00)?;
        if magic != CWAV_MAGIC {
            return Err(CwavError::UnknownFileFormat(format!(
                "bad magic 0x{magic:08x}"
            )));
        }
        let endian = view.read_u16(0x04)?;
        if endian != ENDIAN_MARKER {
            return Err(CwavError::UnknownFileFormat(format!(
                "unsupported byte order marker 0x{endian:04x}"
            )));
        }
        let version = view.read_u32(0x08)?;
        if version != CWAV_VERSION {
            return Err(CwavError::UnknownFileFormat(format!(
                "unsupported version 0x{version:08x}"
            )));
        }
        let block_count = view.read_u16(0x10)?;
        if block_count != BLOCK_COUNT {
            return Err(CwavError::UnknownFileFormat(format!(
                "expected {BLOCK_COUNT} blocks, found {block_count}"
            )));
        }

        Ok(CwavHeader {
            header_size: view.read_u16(0x06)?,
            file_size: view.read_u32(0x0C)?,
            info_block: view.read_sized_reference(0x14)?,
            data_block: view.read_sized_reference(0x20)?,
        })
    }

    fn info_view(&self, header: &CwavHeader) -> Result<ByteView<'a>> {
        let sized = header.info_block;
        if !sized.reference.is(ReferenceKind::InfoBlock) {
            return Err(CwavError::InvalidInfoBlock(format!(
                "header reference has kind 0x{:04x}",
                sized.reference.kind
            )));
        }
        ByteView::bounded(
            self.data,
            sized.reference.offset as usize,
            sized.size as usize,
            BlockKind::Info,
        )
    }

    fn parse_info_fields(
        view: &ByteView<'_>,
        header: &CwavHeader,
        supports: &dyn Fn(Encoding) -> bool,
    ) -> Result<InfoBlock> {
        let magic = view.read_u32(0x00)?;
        if magic != INFO_MAGIC {
            return Err(CwavError::InvalidInfoBlock(format!(
                "bad magic 0x{magic:08x}"
            )));
        }
        let size = view.read_u32(0x04)?;
        if size != header.info_block.size {
            return Err(CwavError::InvalidInfoBlock(format!(
                "block size {size} does not match header size {}",
                header.info_block.size
            )));
        }

        let raw = view.read_u8(0x08)?;
        let encoding = match Encoding::from_u8(raw) {
            Some(encoding) if supports(encoding) => encoding,
            _ => return Err(CwavError::UnsupportedEncoding { raw }),
        };

        let looped = view.read_u8(0x09)? != 0;
        let sample_rate = view.read_u32(0x0C)?;
        let loop_start = view.read_u32(0x10)?;
        let loop_end = view.read_u32(0x14)?;
        if looped && loop_start > loop_end {
            return Err(CwavError::InvalidInfoBlock(format!(
                "loop start {loop_start} is past loop end {loop_end}"
            )));
        }

        Ok(InfoBlock {
            encoding,
            looped,
            sample_rate,
            loop_start,
            loop_end,
        })
    }

    fn parse_channel_descriptors(view: &ByteView<'_>) -> Result<Vec<PendingChannel>> {
        let table = InfoBlock::REFERENCE_TABLE_OFFSET;
        let count = view.read_u32(table)? as usize;
        let table_len = count
            .checked_mul(Reference::SIZE)
            .ok_or_else(|| CwavError::InvalidInfoBlock(format!("channel count {count}")))?;
        view.ensure_range(table + 4, table_len)?;

        let mut pending = Vec::with_capacity(count);
        for idx in 0..count {
            let reference = view.read_reference(table + 4 + idx * Reference::SIZE)?;
            if !reference.is(ReferenceKind::ChannelInfo) {
                return Err(CwavError::InvalidInfoBlock(format!(
                    "channel {idx} reference has kind 0x{:04x}",
                    reference.kind
                )));
            }
            let descriptor = view.resolve(table, reference.offset, ChannelInfo::SIZE)?;
            let samples = view.read_reference(descriptor)?;
            if !samples.is(ReferenceKind::SampleData) {
                return Err(CwavError::InvalidInfoBlock(format!(
                    "channel {idx} sample reference has kind 0x{:04x}",
                    samples.kind
                )));
            }
            pending.push(PendingChannel {
                descriptor,
                samples,
            });
        }
        Ok(pending)
    }

    fn parse_adpcm_records(
        view: &ByteView<'_>,
        encoding: Encoding,
        pending: &[PendingChannel],
    ) -> Result<Vec<AdpcmInfo>> {
        let Some(expected) = encoding.adpcm_reference() else {
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(pending.len());
        for (idx, channel) in pending.iter().enumerate() {
            let reference = view.read_reference(channel.descriptor + Reference::SIZE)?;
            if !reference.is(expected) {
                return Err(CwavError::InvalidInfoBlock(format!(
                    "channel {idx} codec reference has kind 0x{:04x}, expected 0x{:04x}",
                    reference.kind, expected as u16
                )));
            }
            let record = match encoding {
                Encoding::DspAdpcm => {
                    let at = view.resolve(channel.descriptor, reference.offset, DspAdpcmInfo::SIZE)?;
                    AdpcmInfo::Dsp(Self::read_dsp_record(view, at)?)
                }
                _ => {
                    let at = view.resolve(channel.descriptor, reference.offset, ImaAdpcmInfo::SIZE)?;
                    AdpcmInfo::Ima(Self::read_ima_record(view, at)?)
                }
            };
            records.push(record);
        }
        Ok(records)
    }

    fn read_ima_record(view: &ByteView<'_>, at: usize) -> Result<ImaAdpcmInfo> {
        let context = |offset: usize| -> Result<ImaAdpcmContext> {
            Ok(ImaAdpcmContext {
                predictor: view.read_i16(offset)?,
                step_index: view.read_u8(offset + 2)?,
            })
        };
        Ok(ImaAdpcmInfo {
            context: context(at)?,
            loop_context: context(at + 4)?,
        })
    }

    fn read_dsp_record(view: &ByteView<'_>, at: usize) -> Result<DspAdpcmInfo> {
        let mut coefs = [0u16; 16];
        for (i, coef) in coefs.iter_mut().enumerate() {
            *coef = view.read_u16(at + i * 2)?;
        }
        let context = |offset: usize| -> Result<DspAdpcmContext> {
            Ok(DspAdpcmContext {
                pred_scale: view.read_u16(offset)?,
                history0: view.read_i16(offset + 2)?,
                history1: view.read_i16(offset + 4)?,
            })
        };
        Ok(DspAdpcmInfo {
            coefs,
            context: context(at + 32)?,
            loop_context: context(at + 38)?,
        })
    }

    fn data_view(&self, header: &CwavHeader) -> Result<ByteView<'a>> {
        let sized = header.data_block;
        if !sized.reference.is(ReferenceKind::DataBlock) {
            return Err(CwavError::InvalidDataBlock(format!(
                "header reference has kind 0x{:04x}",
                sized.reference.kind
            )));
        }
        let view = ByteView::bounded(
            self.data,
            sized.reference.offset as usize,
            sized.size as usize,
            BlockKind::Data,
        )?;
        let magic = view.read_u32(0x00)?;
        if magic != DATA_MAGIC {
            return Err(CwavError::InvalidDataBlock(format!(
                "bad magic 0x{magic:08x}"
            )));
        }
        view.ensure_range(0, 8)?;
        Ok(view)
    }
}
