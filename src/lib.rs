//! BCWAV loading and multi-slot channel scheduling for the 3DS sound
//! services.
//!
//! Parses `.bcwav` containers (PCM8, PCM16, IMA-ADPCM, DSP-ADPCM) and plays
//! them on a fixed pool of hardware channels through one of two backends:
//! the register-direct CSND service or the streaming NDSP service. A sound
//! may be played several times at once; each concurrent play owns a slot
//! that maps the file's logical channels onto physical channels.
//!
//! # Features
//! - Bounds-checked container parsing, no copies of sample data
//! - Round-robin concurrent play slots with eviction
//! - ADPCM decoder state carried across the loop point
//! - Stop-everything on host suspend, sleep and exit
//!
//! # Crate feature flags
//! - `csnd` (default): CSND backend (`backend::csnd`)
//! - `dsp` (default): NDSP backend (`backend::dsp`)
//!
//! At least one of the two must be enabled.
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "dsp")]
//! # fn demo(service: impl cwav::NdspService + 'static) -> cwav::Result<()> {
//! use cwav::{CwavConfig, CwavContext, AppletEvent};
//!
//! let ctx = CwavContext::with_dsp(service, CwavConfig::default())?;
//! let mut sound = ctx.load_file("romfs:/beep.bcwav", 4);
//! if sound.load_status().is_success() {
//!     sound.set_volume(0.8);
//!     sound.play(0, Some(1))?;
//! }
//! ctx.notify_applet_event(AppletEvent::Suspend)?; // stops everything
//! sound.free();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[cfg(not(any(feature = "csnd", feature = "dsp")))]
compile_error!("enable at least one of the `csnd` and `dsp` features");

pub mod backend; // Sound service backends
pub mod config; // Context configuration
pub mod context; // Library entry point
pub mod cwav_parser; // CWAV format parsing
pub mod error; // Errors and load status
pub mod lifecycle; // Host lifecycle notifications
pub mod loader; // File I/O
mod registry;
pub mod resource; // Loaded sounds
pub mod scheduler; // Channel scheduling

pub use backend::{Environment, PlayRequest, PlaybackBackend, ServiceError};
#[cfg(feature = "csnd")]
pub use backend::{CsndBackend, CsndService, SoundFlags, VaToPa};
#[cfg(feature = "dsp")]
pub use backend::{DspBackend, NdspFormat, NdspService, WaveBufStatus, WaveBuffer};
pub use config::CwavConfig;
pub use context::CwavContext;
pub use cwav_parser::{
    parse_cwav, AdpcmInfo, ChannelInfo, CwavLayout, DspAdpcmContext, DspAdpcmInfo, Encoding,
    ImaAdpcmContext, ImaAdpcmInfo, SegmentLayout,
};
pub use error::{CwavError, LoadStatus, Result};
pub use lifecycle::{AppletCallback, AppletEvent, AppletHook, NotificationPath};
pub use resource::Cwav;
pub use scheduler::{PlaySettings, SlotTable};
