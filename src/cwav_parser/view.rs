//! Bounds-checked little-endian reads over one block of the container.

use super::format::{BlockKind, Reference, SizedReference};
use crate::error::{CwavError, Result};

/// Read-only window onto a single block.
///
/// Offsets passed to the accessors are relative to the start of the window,
/// and every read is checked against the window length, so a view created
/// for a block can never read past that block's declared size.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
    block: BlockKind,
}

impl<'a> ByteView<'a> {
    /// Wrap `data` as the view of `block`.
    pub fn new(data: &'a [u8], block: BlockKind) -> Self {
        Self { data, block }
    }

    /// Window onto `len` bytes starting at `offset` of `data`.
    pub fn bounded(data: &'a [u8], offset: usize, len: usize, block: BlockKind) -> Result<Self> {
        let outer = ByteView::new(data, block);
        outer.ensure_range(offset, len)?;
        Ok(Self::new(&data[offset..offset + len], block))
    }

    /// Length of the window.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty window.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Block this view is bounded to.
    pub fn block(&self) -> BlockKind {
        self.block
    }

    /// Sub-slice of `len` bytes at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.ensure_range(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Byte at `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        self.ensure_range(offset, 1)?;
        Ok(self.data[offset])
    }

    /// Little-endian `u16` at `offset`.
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian `i16` at `offset`.
    pub fn read_i16(&self, offset: usize) -> Result<i16> {
        let b = self.bytes(offset, 2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian `u32` at `offset`.
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Tag (2 bytes), padding (2 bytes), offset (4 bytes).
    pub fn read_reference(&self, offset: usize) -> Result<Reference> {
        self.ensure_range(offset, Reference::SIZE)?;
        Ok(Reference {
            kind: self.read_u16(offset)?,
            offset: self.read_u32(offset + 4)?,
        })
    }

    /// Reference followed by a 4-byte size.
    pub fn read_sized_reference(&self, offset: usize) -> Result<SizedReference> {
        self.ensure_range(offset, SizedReference::SIZE)?;
        Ok(SizedReference {
            reference: self.read_reference(offset)?,
            size: self.read_u32(offset + Reference::SIZE)?,
        })
    }

    /// Resolve a reference offset against its anchor, both relative to this
    /// view, and check that `len` bytes fit at the target.
    pub fn resolve(&self, anchor: usize, rel: u32, len: usize) -> Result<usize> {
        let target = anchor
            .checked_add(rel as usize)
            .ok_or_else(|| self.truncated(anchor, len))?;
        self.ensure_range(target, len)?;
        Ok(target)
    }

    /// Fail unless `len` bytes are readable at `offset`.
    pub fn ensure_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(self.truncated(offset, len)),
        }
    }

    fn truncated(&self, offset: usize, len: usize) -> CwavError {
        CwavError::Truncated {
            block: self.block,
            offset,
            len,
            available: self.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_little_endian() {
        let data = [0x43, 0x57, 0x41, 0x56, 0xFF, 0xFE];
        let view = ByteView::new(&data, BlockKind::Header);
        assert_eq!(view.read_u32(0).unwrap(), 0x5641_5743);
        assert_eq!(view.read_u16(4).unwrap(), 0xFEFF);
    }

    #[test]
    fn test_bounded_view_stops_at_block_end() {
        let data = [0u8; 32];
        let view = ByteView::bounded(&data, 8, 8, BlockKind::Info).unwrap();
        assert!(view.read_u32(4).is_ok());
        match view.read_u32(5) {
            Err(CwavError::Truncated {
                block, available, ..
            }) => {
                assert_eq!(block, BlockKind::Info);
                assert_eq!(available, 8);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_bounded_view_rejects_window_past_buffer() {
        let data = [0u8; 16];
        assert!(ByteView::bounded(&data, 12, 8, BlockKind::Data).is_err());
        assert!(ByteView::bounded(&data, usize::MAX, 2, BlockKind::Data).is_err());
    }

    #[test]
    fn test_resolve_is_relative_to_anchor() {
        let data = [0u8; 64];
        let view = ByteView::new(&data, BlockKind::Info);
        assert_eq!(view.resolve(0x1C, 0x10, 20).unwrap(), 0x2C);
        assert!(view.resolve(0x1C, 0x20, 20).is_err());
    }

    #[test]
    fn test_reference_skips_padding() {
        let data = [0x00, 0x71, 0xAA, 0xBB, 0x14, 0x00, 0x00, 0x00];
        let view = ByteView::new(&data, BlockKind::Info);
        let r = view.read_reference(0).unwrap();
        assert_eq!(r.kind, 0x7100);
        assert_eq!(r.offset, 0x14);
    }
}
