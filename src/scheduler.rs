//! Channel scheduling.
//!
//! A loaded sound has a small number of logical channels (one per encoded
//! channel in the file) and may be played several times concurrently. Each
//! concurrent play owns a row of the [`SlotTable`], mapping its logical
//! channels onto physical channels of the backend. Rows are reused in
//! round-robin order: a new play always takes the row after the last one
//! used and evicts whatever that row was still playing.
//!
//! The table only caches what the backend reports. Cells are cleared lazily
//! on the next play once the backend says the channel went quiet.

use log::{debug, trace, warn};

use crate::backend::{PlayRequest, PlaybackBackend};
use crate::cwav_parser::CwavLayout;
use crate::error::{CwavError, Result};

/// `slot × logical channel → physical channel` table of one sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    rows: usize,
    cols: usize,
    cells: Vec<Option<u32>>,
    current: usize,
}

impl SlotTable {
    /// Empty table; `rows` must be at least 1.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
            current: 0,
        }
    }

    /// Number of concurrent play slots.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of logical channels.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Slot used by the most recent play.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Physical channel of a cell, `None` when idle or out of range.
    pub fn get(&self, slot: usize, logical: usize) -> Option<u32> {
        self.index(slot, logical).and_then(|i| self.cells[i])
    }

    /// Overwrite a cell. Out-of-range cells are ignored.
    pub fn set(&mut self, slot: usize, logical: usize, physical: Option<u32>) {
        if let Some(i) = self.index(slot, logical) {
            self.cells[i] = physical;
        }
    }

    /// Clear a cell, returning what it held.
    pub fn take(&mut self, slot: usize, logical: usize) -> Option<u32> {
        self.index(slot, logical).and_then(|i| self.cells[i].take())
    }

    /// Move to the next slot and return it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.rows;
        self.current
    }

    /// Whether any cell holds a physical channel.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Occupied cells as `(slot, logical, physical)`.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.map(|physical| (i / self.cols, i % self.cols, physical))
        })
    }

    fn index(&self, slot: usize, logical: usize) -> Option<usize> {
        (slot < self.rows && logical < self.cols).then_some(slot * self.cols + logical)
    }
}

/// Per-resource playback parameters applied to every play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaySettings {
    /// Linear volume, 0.0 to 1.0.
    pub volume: f32,
    /// Pan of mono plays, -1.0 to 1.0.
    pub mono_pan: f32,
    /// Playback rate multiplier.
    pub pitch: f32,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            mono_pan: 0.0,
            pitch: 1.0,
        }
    }
}

/// Scheduler bound to one sound's table and the active backend.
pub struct ChannelScheduler<'a> {
    table: &'a mut SlotTable,
    backend: &'a mut dyn PlaybackBackend,
}

impl<'a> ChannelScheduler<'a> {
    /// Borrow a table and a backend for one operation.
    pub fn new(table: &'a mut SlotTable, backend: &'a mut dyn PlaybackBackend) -> Self {
        Self { table, backend }
    }

    /// Clear cells whose physical channel stopped on its own.
    pub fn refresh(&mut self) {
        let occupied: Vec<_> = self.table.occupied().collect();
        for (slot, logical, physical) in occupied {
            if !self.backend.is_playing(physical) {
                trace!("slot {slot} ch{logical}: physical {physical} finished");
                self.table.set(slot, logical, None);
            }
        }
    }

    /// Play `left` (and `right` for stereo) in the next slot.
    ///
    /// Stereo plays pan hard left and hard right; mono plays use the
    /// settings' mono pan. When the pool runs out for the second channel the
    /// first keeps playing and the call still fails.
    pub fn play(
        &mut self,
        layout: &CwavLayout,
        samples: &[u8],
        settings: &PlaySettings,
        left: u32,
        right: Option<u32>,
    ) -> Result<()> {
        let count = layout.channel_count();
        for logical in std::iter::once(left).chain(right) {
            if logical >= count {
                return Err(CwavError::ChannelOutOfRange {
                    channel: logical,
                    count,
                });
            }
        }

        self.refresh();
        let slot = self.table.advance();
        self.evict(slot, left, right);

        let segments = layout.segments();
        let info = layout.info;
        let mut previous = None;
        for (i, logical) in std::iter::once(left).chain(right).enumerate() {
            let physical = self.find_free_channel(previous).ok_or_else(|| {
                warn!("no free physical channel for logical channel {logical}");
                CwavError::NoFreeChannel { logical }
            })?;
            self.table.set(slot, logical as usize, Some(physical));
            previous = Some(physical);

            let pan = match (right, i) {
                (None, _) => settings.mono_pan,
                (Some(_), 0) => -1.0,
                (Some(_), _) => 1.0,
            };

            let channel = &layout.channels[logical as usize];
            let start = channel.sample_offset;
            let data = samples
                .get(start..start + segments.total_size)
                .ok_or_else(|| {
                    CwavError::InvalidDataBlock(format!(
                        "channel {logical} samples at 0x{start:x} outside buffer"
                    ))
                })?;

            if let Some(adpcm) = &channel.adpcm {
                self.backend.set_adpcm_state(physical, adpcm, info.looped);
            }

            let request = PlayRequest {
                channel: physical,
                looped: info.looped,
                encoding: info.encoding,
                sample_rate: info.sample_rate,
                pitch: settings.pitch,
                volume: settings.volume,
                pan,
                samples: data,
                loop_offset: segments.loop_offset,
                loop_start: info.loop_start,
                loop_end: info.loop_end,
            };
            trace!("slot {slot} ch{logical} -> physical {physical}, pan {pan}");
            if let Err(err) = self.backend.play(&request) {
                self.table.set(slot, logical as usize, None);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stop logical channels in every slot; `(None, None)` stops everything.
    pub fn stop(&mut self, left: Option<u32>, right: Option<u32>) {
        if left.is_none() && right.is_none() {
            let occupied: Vec<_> = self.table.occupied().collect();
            for (slot, logical, physical) in occupied {
                self.backend.stop(physical);
                self.table.set(slot, logical, None);
            }
            return;
        }
        for logical in left.into_iter().chain(right) {
            for slot in 0..self.table.rows() {
                if let Some(physical) = self.table.take(slot, logical as usize) {
                    self.backend.stop(physical);
                }
            }
        }
    }

    /// Whether a logical channel is still audible in any slot.
    pub fn is_playing(&mut self, logical: u32) -> bool {
        (0..self.table.rows()).any(|slot| match self.table.get(slot, logical as usize) {
            Some(physical) => self.backend.is_playing(physical),
            None => false,
        })
    }

    fn evict(&mut self, slot: usize, left: u32, right: Option<u32>) {
        for logical in std::iter::once(left).chain(right) {
            if let Some(physical) = self.table.take(slot, logical as usize) {
                debug!("evicting slot {slot} ch{logical} from physical {physical}");
                self.backend.stop(physical);
            }
        }
    }

    fn find_free_channel(&mut self, exclude: Option<u32>) -> Option<u32> {
        (0..self.backend.channel_count())
            .find(|&physical| Some(physical) != exclude && self.backend.is_channel_free(physical))
    }
}
