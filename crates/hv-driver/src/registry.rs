//! Kind-to-driver dispatch, held by the agent (§4.5: "the agent holds a
//! mapping from kind to driver").

use std::collections::HashMap;
use std::sync::Arc;

use hv_core::InstanceKind;

use crate::trait_def::Driver;

/// Looks up the driver responsible for one instance kind.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<InstanceKind, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` as the handler for its own [`Driver::kind`].
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.kind(), driver);
    }

    /// Look up the driver for `kind`, if one is registered.
    #[must_use]
    pub fn get(&self, kind: InstanceKind) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&kind).cloned()
    }

    /// Every kind this registry can currently dispatch to.
    #[must_use]
    pub fn supported_kinds(&self) -> Vec<InstanceKind> {
        self.drivers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDriver;

    #[test]
    fn registers_and_looks_up_by_kind() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(FakeDriver::new(InstanceKind::Container)));
        assert!(registry.get(InstanceKind::Container).is_some());
        assert!(registry.get(InstanceKind::Vm).is_none());
    }
}
