//! CWAV Format Parsing
//!
//! Validates and indexes `.bcwav` containers: file header, INFO block with
//! its per-channel descriptors and codec records, and the DATA block holding
//! the raw sample payload. Parsing is done over bounds-checked [`ByteView`]s;
//! the result refers to the buffer by offset and never copies samples.

pub mod format;
mod parser;
pub mod view;

pub use format::{
    AdpcmInfo, BlockKind, ChannelInfo, CwavHeader, CwavLayout, DspAdpcmContext, DspAdpcmInfo,
    Encoding, ImaAdpcmContext, ImaAdpcmInfo, InfoBlock, Reference, ReferenceKind,
    SegmentLayout, SizedReference,
};
pub use parser::parse_cwav;
pub use view::ByteView;
