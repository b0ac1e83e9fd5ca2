//! Library context: the active backend, the registry of loaded sounds and
//! the lifecycle notification state.
//!
//! The backend is chosen once, when the context is built. Every sound
//! loaded through a context plays through that backend.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::backend::{Environment, PlaybackBackend, SharedBackend};
use crate::config::CwavConfig;
use crate::cwav_parser::{parse_cwav, CwavLayout};
use crate::error::{CwavError, Result};
use crate::lifecycle::{dispatch, AppletEvent, AppletHook, Lifecycle, NotificationPath};
use crate::loader;
use crate::registry::Registry;
use crate::resource::{Cwav, CwavState, SampleBuffer};
use crate::scheduler::SlotTable;

/// Entry point for loading and playing CWAV sounds.
pub struct CwavContext {
    backend: SharedBackend,
    registry: Registry,
    lifecycle: Arc<Lifecycle>,
    config: CwavConfig,
    next_id: AtomicU64,
}

impl CwavContext {
    /// Context over `backend` with default settings.
    pub fn new(backend: Box<dyn PlaybackBackend>) -> Self {
        let config = CwavConfig::default().with_environment(backend.environment());
        Self::build(config, backend)
    }

    /// Context over `backend`, which must drive the configured environment.
    pub fn with_config(config: CwavConfig, backend: Box<dyn PlaybackBackend>) -> Result<Self> {
        config.validate()?;
        if backend.environment() != config.environment {
            return Err(CwavError::Config(format!(
                "configured for {} but the backend drives {}",
                config.environment,
                backend.environment()
            )));
        }
        Ok(Self::build(config, backend))
    }

    /// Context playing through CSND.
    #[cfg(feature = "csnd")]
    pub fn with_csnd<S>(service: S, config: CwavConfig) -> Result<Self>
    where
        S: crate::backend::CsndService + 'static,
    {
        let backend = crate::backend::CsndBackend::new(service);
        Self::with_config(config, Box::new(backend))
    }

    /// Context playing through NDSP, using `config.dsp_channel_count` channels.
    #[cfg(feature = "dsp")]
    pub fn with_dsp<S>(service: S, config: CwavConfig) -> Result<Self>
    where
        S: crate::backend::NdspService + 'static,
    {
        let backend = crate::backend::DspBackend::with_channel_count(service, config.dsp_channel_count)?;
        Self::with_config(config, Box::new(backend))
    }

    fn build(config: CwavConfig, backend: Box<dyn PlaybackBackend>) -> Self {
        debug!(
            "cwav context on {} ({} channels)",
            config.environment,
            backend.channel_count()
        );
        Self {
            backend: Arc::new(Mutex::new(backend)),
            registry: Registry::default(),
            lifecycle: Arc::new(Lifecycle::default()),
            config,
            next_id: AtomicU64::new(0),
        }
    }

    /// Sound service in use.
    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Settings the context was built with.
    pub fn config(&self) -> &CwavConfig {
        &self.config
    }

    /// Concurrent plays to use when the caller has no preference.
    pub fn default_max_plays(&self) -> u32 {
        self.config.default_max_plays
    }

    /// Number of loaded, not yet freed sounds.
    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    /// Notification path in use, if any.
    pub fn notification_path(&self) -> Option<NotificationPath> {
        self.lifecycle.active()
    }

    /// Load a sound from an owned byte buffer.
    pub fn load_from_buffer(&self, data: Vec<u8>, max_plays: u32) -> Cwav {
        self.load(SampleBuffer::Owned(data), max_plays)
    }

    /// Load a sound from a buffer the caller keeps a handle to.
    ///
    /// The resource holds its clone of `data` until freed.
    pub fn load_from_shared(&self, data: Arc<[u8]>, max_plays: u32) -> Cwav {
        self.load(SampleBuffer::Shared(data), max_plays)
    }

    /// [`CwavContext::load_from_buffer`] with the configured default play count.
    pub fn load_from_buffer_default(&self, data: Vec<u8>) -> Cwav {
        self.load_from_buffer(data, self.config.default_max_plays)
    }

    /// [`CwavContext::load_from_shared`] with the configured default play count.
    pub fn load_from_shared_default(&self, data: Arc<[u8]>) -> Cwav {
        self.load_from_shared(data, self.config.default_max_plays)
    }

    /// [`CwavContext::load_file`] with the configured default play count.
    pub fn load_file_default(&self, path: impl AsRef<Path>) -> Cwav {
        self.load_file(path, self.config.default_max_plays)
    }

    /// Read a file and load it.
    pub fn load_file(&self, path: impl AsRef<Path>, max_plays: u32) -> Cwav {
        let path = path.as_ref();
        match loader::read_file(path) {
            Ok(data) => self.load(SampleBuffer::Owned(data), max_plays),
            Err(err) => {
                warn!("failed to load '{}': {err}", path.display());
                self.lifecycle.warn_if_unnotified();
                Cwav::failed(self.next_id(), err, self.backend.clone(), self.registry.clone())
            }
        }
    }

    fn load(&self, buffer: SampleBuffer, max_plays: u32) -> Cwav {
        self.lifecycle.warn_if_unnotified();
        let id = self.next_id();
        match self.parse(buffer.as_slice(), max_plays) {
            Ok(layout) => {
                debug!(
                    "loaded CWAV #{id}: {} {} Hz, {} channel(s), {}",
                    layout.info.encoding,
                    layout.info.sample_rate,
                    layout.channel_count(),
                    if layout.info.looped { "looped" } else { "one-shot" }
                );
                let slots = SlotTable::new(max_plays as usize, layout.channels.len());
                let state = Arc::new(Mutex::new(CwavState {
                    buffer: Some(buffer),
                    layout: Some(layout),
                    slots: Some(slots),
                }));
                Cwav::loaded(id, state, self.backend.clone(), self.registry.clone())
            }
            Err(err) => {
                warn!("failed to load CWAV #{id}: {err}");
                Cwav::failed(id, err, self.backend.clone(), self.registry.clone())
            }
        }
    }

    fn parse(&self, data: &[u8], max_plays: u32) -> Result<CwavLayout> {
        if max_plays == 0 {
            return Err(CwavError::InvalidArgument(
                "at least one concurrent play is required".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(CwavError::InvalidArgument("empty buffer".to_string()));
        }
        let backend = self.backend.lock();
        parse_cwav(data, |encoding| backend.is_encoding_supported(encoding))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Stop every channel of every loaded sound.
    pub fn stop_all(&self) {
        self.registry.stop_all(&self.backend);
    }

    /// Install the lifecycle callback into the host notifier.
    ///
    /// Installing twice is a no-op. Fails if events were already forwarded
    /// with [`CwavContext::notify_applet_event`].
    pub fn install_applet_hook(&self, hook: &mut dyn AppletHook) -> Result<()> {
        if !self.lifecycle.claim(NotificationPath::Hook)? {
            return Ok(());
        }
        let registry = self.registry.clone();
        let backend = self.backend.clone();
        hook.install(Box::new(move |event| dispatch(event, &registry, &backend)));
        Ok(())
    }

    /// Forward one lifecycle event from the embedder.
    ///
    /// Fails if a hook was installed with [`CwavContext::install_applet_hook`].
    pub fn notify_applet_event(&self, event: AppletEvent) -> Result<()> {
        self.lifecycle.claim(NotificationPath::Forwarded)?;
        dispatch(event, &self.registry, &self.backend);
        Ok(())
    }
}
