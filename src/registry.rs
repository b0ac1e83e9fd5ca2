//! Process-wide list of loaded sounds.
//!
//! Used to clear finished channels from every sound before a play, and to
//! silence everything when the host application is suspended or exits.
//! Entries hold weak references so the registry never keeps a sound alive;
//! a resource adds itself once after a successful load and removes itself
//! once when freed.

use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::Mutex;

use crate::backend::SharedBackend;
use crate::resource::CwavState;

struct RegistryEntry {
    id: u64,
    state: Weak<Mutex<CwavState>>,
}

/// Shared handle to the list of live resources.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    entries: Arc<Mutex<Vec<RegistryEntry>>>,
}

impl Registry {
    /// Register a loaded resource. Returns `false` if `id` is already listed.
    pub(crate) fn add(&self, id: u64, state: &Arc<Mutex<CwavState>>) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.id == id) {
            return false;
        }
        entries.push(RegistryEntry {
            id,
            state: Arc::downgrade(state),
        });
        true
    }

    /// Deregister a resource, keeping the remaining entries contiguous.
    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|e| e.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registered resources.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Clear finished channels from every registered resource but `skip`.
    pub(crate) fn refresh_all(&self, backend: &SharedBackend, skip: u64) {
        let live: Vec<_> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.id != skip)
            .filter_map(|e| e.state.upgrade())
            .collect();

        for state in &live {
            let mut state = state.lock();
            let mut backend = backend.lock();
            state.refresh(&mut **backend);
        }
    }

    /// Stop every channel of every registered resource.
    ///
    /// The list lock is released before any resource is touched, so a
    /// resource being freed concurrently cannot deadlock against this.
    pub(crate) fn stop_all(&self, backend: &SharedBackend) -> usize {
        let live: Vec<_> = self
            .entries
            .lock()
            .iter()
            .filter_map(|e| e.state.upgrade())
            .collect();

        for state in &live {
            let mut state = state.lock();
            let mut backend = backend.lock();
            state.stop_all(&mut **backend);
        }
        debug!("stopped all channels of {} resources", live.len());
        live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SlotTable;

    #[test]
    fn test_add_rejects_duplicates_and_remove_compacts() {
        let registry = Registry::default();
        let states: Vec<_> = (0..3)
            .map(|_| Arc::new(Mutex::new(CwavState::default())))
            .collect();
        for (id, state) in states.iter().enumerate() {
            assert!(registry.add(id as u64, state));
        }
        assert!(!registry.add(1, &states[1]));
        assert_eq!(registry.len(), 3);

        assert!(registry.remove(1));
        assert!(!registry.remove(1));
        let ids: Vec<_> = registry.entries.lock().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_dropped_resources_are_skipped() {
        let registry = Registry::default();
        let state = Arc::new(Mutex::new(CwavState::default()));
        registry.add(7, &state);
        drop(state);

        let backend: SharedBackend = Arc::new(Mutex::new(Box::new(Silent)));
        assert_eq!(registry.stop_all(&backend), 0);
    }

    #[test]
    fn test_refresh_all_skips_the_caller() {
        let registry = Registry::default();
        let stale = || {
            let mut slots = SlotTable::new(1, 1);
            slots.set(0, 0, Some(3));
            Arc::new(Mutex::new(CwavState {
                slots: Some(slots),
                ..CwavState::default()
            }))
        };
        let (caller, other) = (stale(), stale());
        registry.add(1, &caller);
        registry.add(2, &other);

        let backend: SharedBackend = Arc::new(Mutex::new(Box::new(Silent)));
        registry.refresh_all(&backend, 1);
        let cell = |state: &Arc<Mutex<CwavState>>| {
            state.lock().slots.as_ref().and_then(|t| t.get(0, 0))
        };
        assert_eq!(cell(&caller), Some(3));
        assert_eq!(cell(&other), None);
    }

    struct Silent;

    impl crate::backend::PlaybackBackend for Silent {
        fn environment(&self) -> crate::backend::Environment {
            crate::backend::Environment::Dsp
        }
        fn channel_count(&self) -> u32 {
            0
        }
        fn is_channel_available(&self, _channel: u32) -> bool {
            false
        }
        fn is_encoding_supported(&self, _encoding: crate::Encoding) -> bool {
            false
        }
        fn is_playing(&mut self, _channel: u32) -> bool {
            false
        }
        fn set_adpcm_state(&mut self, _channel: u32, _info: &crate::AdpcmInfo, _looped: bool) {}
        fn play(&mut self, _request: &crate::backend::PlayRequest<'_>) -> crate::Result<()> {
            Ok(())
        }
        fn stop(&mut self, _channel: u32) {}
    }
}
