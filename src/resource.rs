//! Loaded sounds.
//!
//! A [`Cwav`] is what every load call returns, successful or not. It owns
//! the container bytes (or its clone of a shared buffer), the parsed layout
//! and the slot table, and releases them in that reverse order when freed:
//! channels are stopped first, then the table and layout are dropped, then
//! the bytes. Each part is optional so a resource that failed halfway
//! through loading frees just as safely as a complete one.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::backend::{PlaybackBackend, SharedBackend};
use crate::cwav_parser::{CwavLayout, Encoding};
use crate::error::{CwavError, LoadStatus, Result};
use crate::registry::Registry;
use crate::scheduler::{ChannelScheduler, PlaySettings, SlotTable};

/// Container bytes backing a resource.
#[derive(Debug, Clone)]
pub(crate) enum SampleBuffer {
    /// Bytes read or handed over by the caller.
    Owned(Vec<u8>),
    /// Bytes the caller keeps a handle to.
    Shared(Arc<[u8]>),
}

impl SampleBuffer {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            SampleBuffer::Owned(bytes) => bytes,
            SampleBuffer::Shared(bytes) => bytes,
        }
    }
}

/// Everything a loaded sound acquired, released field by field.
#[derive(Debug, Default)]
pub(crate) struct CwavState {
    pub(crate) buffer: Option<SampleBuffer>,
    pub(crate) layout: Option<CwavLayout>,
    pub(crate) slots: Option<SlotTable>,
}

impl CwavState {
    pub(crate) fn stop_all(&mut self, backend: &mut dyn PlaybackBackend) {
        if let Some(slots) = self.slots.as_mut() {
            ChannelScheduler::new(slots, backend).stop(None, None);
        }
    }

    pub(crate) fn refresh(&mut self, backend: &mut dyn PlaybackBackend) {
        if let Some(slots) = self.slots.as_mut() {
            ChannelScheduler::new(slots, backend).refresh();
        }
    }

    fn release(&mut self, backend: &mut dyn PlaybackBackend) {
        self.stop_all(backend);
        self.slots = None;
        self.layout = None;
        self.buffer = None;
    }
}

/// A loaded (or failed) CWAV sound.
///
/// Dropping the handle frees it; [`Cwav::free`] does the same explicitly and
/// may be called any number of times.
pub struct Cwav {
    id: u64,
    state: Option<Arc<Mutex<CwavState>>>,
    backend: SharedBackend,
    registry: Registry,
    status: LoadStatus,
    error: Option<CwavError>,
    registered: bool,
    settings: PlaySettings,
}

impl Cwav {
    pub(crate) fn loaded(
        id: u64,
        state: Arc<Mutex<CwavState>>,
        backend: SharedBackend,
        registry: Registry,
    ) -> Self {
        let registered = registry.add(id, &state);
        Self {
            id,
            state: Some(state),
            backend,
            registry,
            status: LoadStatus::Success,
            error: None,
            registered,
            settings: PlaySettings::default(),
        }
    }

    pub(crate) fn failed(
        id: u64,
        error: CwavError,
        backend: SharedBackend,
        registry: Registry,
    ) -> Self {
        Self {
            id,
            state: None,
            backend,
            registry,
            status: error.load_status(),
            error: Some(error),
            registered: false,
            settings: PlaySettings::default(),
        }
    }

    /// Outcome of the load; `NotAllocated` after [`Cwav::free`].
    pub fn load_status(&self) -> LoadStatus {
        self.status
    }

    /// Why the load failed.
    pub fn load_error(&self) -> Option<&CwavError> {
        self.error.as_ref()
    }

    /// True when loaded and not yet freed.
    pub fn is_loaded(&self) -> bool {
        self.status.is_success() && self.state.is_some()
    }

    fn with_layout<T>(&self, f: impl FnOnce(&CwavLayout) -> T) -> Option<T> {
        let state = self.state.as_ref()?.lock();
        state.layout.as_ref().map(f)
    }

    /// Number of logical channels, 0 when not loaded.
    pub fn channel_count(&self) -> u32 {
        self.with_layout(CwavLayout::channel_count).unwrap_or(0)
    }

    /// Whether the sound loops.
    pub fn is_looped(&self) -> bool {
        self.with_layout(|l| l.info.looped).unwrap_or(false)
    }

    /// Sample encoding.
    pub fn encoding(&self) -> Option<Encoding> {
        self.with_layout(|l| l.info.encoding)
    }

    /// Native sample rate in Hz, 0 when not loaded.
    pub fn sample_rate(&self) -> u32 {
        self.with_layout(|l| l.info.sample_rate).unwrap_or(0)
    }

    /// First sample of the loop body.
    pub fn loop_start(&self) -> u32 {
        self.with_layout(|l| l.info.loop_start).unwrap_or(0)
    }

    /// One past the last sample played.
    pub fn loop_end(&self) -> u32 {
        self.with_layout(|l| l.info.loop_end).unwrap_or(0)
    }

    /// Number of concurrent play slots, 0 when not loaded.
    pub fn max_concurrent_plays(&self) -> u32 {
        self.state
            .as_ref()
            .and_then(|s| s.lock().slots.as_ref().map(|t| t.rows() as u32))
            .unwrap_or(0)
    }

    /// Linear volume, 0.0 to 1.0.
    pub fn volume(&self) -> f32 {
        self.settings.volume
    }

    /// Set the volume of future plays, clamped to 0.0..=1.0.
    pub fn set_volume(&mut self, volume: f32) {
        self.settings.volume = volume.clamp(0.0, 1.0);
    }

    /// Pan of mono plays, -1.0 (left) to 1.0 (right).
    pub fn mono_pan(&self) -> f32 {
        self.settings.mono_pan
    }

    /// Set the pan of future mono plays, clamped to -1.0..=1.0.
    pub fn set_mono_pan(&mut self, pan: f32) {
        self.settings.mono_pan = pan.clamp(-1.0, 1.0);
    }

    /// Playback rate multiplier.
    pub fn pitch(&self) -> f32 {
        self.settings.pitch
    }

    /// Set the playback rate multiplier of future plays (1.0 is native).
    pub fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(CwavError::InvalidArgument(format!(
                "pitch must be positive, got {pitch}"
            )));
        }
        self.settings.pitch = pitch;
        Ok(())
    }

    /// Play logical channel `left`, or `left` and `right` as a stereo pair.
    ///
    /// Each call takes the next concurrent play slot, stopping whatever that
    /// slot was still playing.
    pub fn play(&self, left: u32, right: Option<u32>) -> Result<()> {
        let state = self.loaded_state()?;
        self.registry.refresh_all(&self.backend, self.id);
        let mut state = state.lock();
        let CwavState {
            buffer: Some(buffer),
            layout: Some(layout),
            slots: Some(slots),
        } = &mut *state
        else {
            return Err(CwavError::NotLoaded);
        };
        let mut backend = self.backend.lock();
        ChannelScheduler::new(slots, &mut **backend).play(
            layout,
            buffer.as_slice(),
            &self.settings,
            left,
            right,
        )
    }

    /// Stop logical channels in every slot; `(None, None)` stops them all.
    ///
    /// Indices past the channel count are ignored.
    pub fn stop(&self, left: Option<u32>, right: Option<u32>) {
        self.with_scheduler(|scheduler| scheduler.stop(left, right));
    }

    /// Stop every channel in every slot.
    pub fn stop_all(&self) {
        self.stop(None, None);
    }

    /// Whether a logical channel is still audible in any slot.
    pub fn is_playing(&self, logical: u32) -> bool {
        self.with_scheduler(|scheduler| scheduler.is_playing(logical))
            .unwrap_or(false)
    }

    /// Physical channel assigned to `logical` in `slot`, as last recorded.
    pub fn playing_channel(&self, slot: u32, logical: u32) -> Option<u32> {
        let state = self.state.as_ref()?.lock();
        state.slots.as_ref()?.get(slot as usize, logical as usize)
    }

    /// Stop playback and release everything the load acquired.
    pub fn free(&mut self) {
        if let Some(state) = self.state.take() {
            {
                let mut state = state.lock();
                let mut backend = self.backend.lock();
                state.release(&mut **backend);
            }
            if self.registered {
                self.registry.remove(self.id);
                self.registered = false;
            }
            debug!("freed CWAV #{}", self.id);
        }
        self.status = LoadStatus::NotAllocated;
    }

    fn loaded_state(&self) -> Result<&Arc<Mutex<CwavState>>> {
        match &self.state {
            Some(state) if self.status.is_success() => Ok(state),
            _ => Err(CwavError::NotLoaded),
        }
    }

    fn with_scheduler<T>(&self, f: impl FnOnce(&mut ChannelScheduler<'_>) -> T) -> Option<T> {
        let state = self.loaded_state().ok()?;
        let mut state = state.lock();
        let slots = state.slots.as_mut()?;
        let mut backend = self.backend.lock();
        Some(f(&mut ChannelScheduler::new(slots, &mut **backend)))
    }
}

impl Drop for Cwav {
    fn drop(&mut self) {
        self.free();
    }
}

impl std::fmt::Debug for Cwav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cwav")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("channels", &self.channel_count())
            .finish()
    }
}
