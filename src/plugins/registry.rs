// Process-wide plugin registry: three priority-sorted lists, one per
// transport class, built exactly once and read-only afterwards.

use std::sync::{Arc, Mutex, OnceLock};

use super::{Plugin, Transport};

static STAGED: Mutex<Vec<Arc<dyn Plugin>>> = Mutex::new(Vec::new());
static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Stage a plugin for the global registry.
///
/// Returns `false` (and discards the plugin) once the global registry has
/// been built; registration has to happen before the first scan.
pub fn register(plugin: Arc<dyn Plugin>) -> bool {
    if GLOBAL.get().is_some() {
        return false;
    }
    STAGED.lock().unwrap().push(plugin);
    true
}

/// Per-transport plugin lists, sorted by ascending priority.
pub struct Registry {
    tcp: Vec<Arc<dyn Plugin>>,
    tls: Vec<Arc<dyn Plugin>>,
    udp: Vec<Arc<dyn Plugin>>,
}

impl Registry {
    /// Build a registry from an explicit plugin set. The sort is stable,
    /// so plugins sharing a priority keep their registration order.
    pub fn new(plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        let mut tcp = Vec::new();
        let mut tls = Vec::new();
        let mut udp = Vec::new();

        for plugin in plugins {
            match plugin.transport() {
                Transport::Tcp => tcp.push(plugin),
                Transport::Tls => tls.push(plugin),
                Transport::Udp => udp.push(plugin),
            }
        }

        tcp.sort_by_key(|p| p.priority());
        tls.sort_by_key(|p| p.priority());
        udp.sort_by_key(|p| p.priority());

        Self { tcp, tls, udp }
    }

    /// The process-wide registry, built from all staged plugins on first
    /// use. Later calls return the same instance; rebuilding is a no-op.
    pub fn global() -> Arc<Registry> {
        GLOBAL
            .get_or_init(|| {
                let staged: Vec<_> = STAGED.lock().unwrap().drain(..).collect();
                Arc::new(Registry::new(staged))
            })
            .clone()
    }

    pub fn plugins(&self, transport: Transport) -> &[Arc<dyn Plugin>] {
        match transport {
            Transport::Tcp => &self.tcp,
            Transport::Tls => &self.tls,
            Transport::Udp => &self.udp,
        }
    }

    pub fn len(&self) -> usize {
        self.tcp.len() + self.tls.len() + self.udp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
