// src/module/loader.rs
//! Import resolution for `.aca` source modules.
//!
//! Builtin modules are resolved by the analyzer before asking the
//! loader. The loader maps a dotted import path to a canonical file
//! path next to the importing unit, keeps the loaded-module cache, and
//! detects import cycles: a path is at most one of not-started,
//! in-progress, or done.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::sema::types::ModuleId;

#[derive(Debug, Default)]
pub struct ModuleLoader {
    /// Directory of the unit being compiled; imports resolve here
    base_dir: Option<PathBuf>,
    /// Done modules, keyed by canonical path
    cache: FxHashMap<PathBuf, ModuleId>,
    /// In-progress modules (cycle detection)
    loading: FxHashSet<PathBuf>,
}

impl ModuleLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            cache: FxHashMap::default(),
            loading: FxHashSet::default(),
        }
    }

    /// Map `a.b` to `<base>/a/b.aca`, canonicalized when possible.
    pub fn resolve(&self, segments: &[&str]) -> Option<PathBuf> {
        let mut path = self.base_dir.clone()?;
        for segment in segments {
            path.push(segment);
        }
        path.set_extension("aca");
        if !path.exists() {
            return None;
        }
        Some(path.canonicalize().unwrap_or(path))
    }

    pub fn cached(&self, path: &Path) -> Option<ModuleId> {
        self.cache.get(path).copied()
    }

    pub fn is_loading(&self, path: &Path) -> bool {
        self.loading.contains(path)
    }

    pub fn begin(&mut self, path: PathBuf) {
        self.loading.insert(path);
    }

    pub fn finish(&mut self, path: PathBuf, id: ModuleId) {
        self.loading.remove(&path);
        self.cache.insert(path, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_requires_base_dir() {
        let loader = ModuleLoader::new(None);
        assert!(loader.resolve(&["util"]).is_none());
    }

    #[test]
    fn cycle_state_transitions() {
        let mut loader = ModuleLoader::new(None);
        let path = PathBuf::from("/tmp/util.aca");
        assert!(!loader.is_loading(&path));
        loader.begin(path.clone());
        assert!(loader.is_loading(&path));
        loader.finish(path.clone(), ModuleId(0));
        assert!(!loader.is_loading(&path));
        assert_eq!(loader.cached(&path), Some(ModuleId(0)));
    }
}
