use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::descriptor::ResolvedDescriptor;
use crate::host::Host;

/// Resolved request descriptors, built once per requester.
///
/// The first call to [`Registry::ensure_initialized`] asks the host for its
/// declarations and binds every named reference. Later calls return the same
/// map. The map is owned by this registry, so two requesters never see each
/// other's resolved state even when their hosts share declarations.
pub struct Registry<H> {
    resolved: OnceLock<BTreeMap<String, Arc<ResolvedDescriptor<H>>>>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            resolved: OnceLock::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Host> Registry<H> {
    pub fn ensure_initialized(&self, host: &H) -> &BTreeMap<String, Arc<ResolvedDescriptor<H>>> {
        self.resolved.get_or_init(|| {
            let resolved: BTreeMap<_, _> = host
                .requests()
                .into_iter()
                .map(|(name, descriptor)| (name, Arc::new(descriptor.resolve(host))))
                .collect();
            log::debug!("Registered {} request(s)", resolved.len());
            resolved
        })
    }

    pub fn get(&self, host: &H, name: &str) -> Option<Arc<ResolvedDescriptor<H>>> {
        self.ensure_initialized(host).get(name).cloned()
    }

    pub fn names(&self, host: &H) -> Vec<String> {
        self.ensure_initialized(host).keys().cloned().collect()
    }
}
