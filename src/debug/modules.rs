//! Module instances currently loaded in the target.

use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::{
    debug::handles::{AppDomainHandle, ModuleHandle},
    metadata::module::{ModuleKey, ModuleView},
};

/// One loaded instance of a module
#[derive(Debug)]
pub struct LoadedModule {
    /// Transport handle of this instance
    pub handle: ModuleHandle,
    /// Application domain the module was loaded into
    pub app_domain: AppDomainHandle,
    /// Live metadata of this instance
    pub view: Arc<ModuleView>,
}

impl LoadedModule {
    /// Structural identity of the module
    pub fn key(&self) -> &ModuleKey {
        self.view.key()
    }
}

/// Loaded module instances, ordered by handle
#[derive(Default)]
pub struct ModuleRegistry {
    modules: SkipMap<ModuleHandle, Arc<LoadedModule>>,
}

impl ModuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module`, replacing an earlier instance with the same handle. The engine unloads
    /// such an instance before it gets here.
    pub fn add(&self, module: Arc<LoadedModule>) {
        self.modules.insert(module.handle, module);
    }

    /// Forget the instance `handle`, returning it
    pub fn remove(&self, handle: ModuleHandle) -> Option<Arc<LoadedModule>> {
        self.modules.remove(&handle).map(|entry| entry.value().clone())
    }

    /// The instance `handle`
    pub fn get(&self, handle: ModuleHandle) -> Option<Arc<LoadedModule>> {
        self.modules.get(&handle).map(|entry| entry.value().clone())
    }

    /// Every loaded instance of the module `key`. A module loaded into several application
    /// domains has several instances.
    pub fn find_by_key(&self, key: &ModuleKey) -> Vec<Arc<LoadedModule>> {
        self.modules
            .iter()
            .filter(|entry| entry.value().key() == key)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Every loaded instance
    pub fn all(&self) -> Vec<Arc<LoadedModule>> {
        self.modules
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove every instance, returning them
    pub fn drain(&self) -> Vec<Arc<LoadedModule>> {
        let mut drained = Vec::with_capacity(self.modules.len());
        while let Some(entry) = self.modules.pop_front() {
            drained.push(entry.value().clone());
        }
        drained
    }

    /// Number of loaded instances
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// `true` if nothing is loaded
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|entry| *entry.key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{loaded_module, MetadataBuilder};

    #[test]
    fn registry() {
        let builder = MetadataBuilder::new();
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());

        let first = loaded_module(&builder, 1, "App.dll");
        let second = loaded_module(&builder, 2, "App.dll");
        let other = loaded_module(&builder, 3, "Lib.dll");
        registry.add(first.clone());
        registry.add(second);
        registry.add(other);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.find_by_key(first.key()).len(), 2);
        assert!(Arc::ptr_eq(&registry.get(ModuleHandle(1)).unwrap(), &first));

        let removed = registry.remove(ModuleHandle(1)).unwrap();
        assert!(Arc::ptr_eq(&removed, &first));
        assert!(registry.get(ModuleHandle(1)).is_none());
        assert_eq!(registry.find_by_key(first.key()).len(), 1);

        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
