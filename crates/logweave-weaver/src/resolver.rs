//! Module resolution
//!
//! The weaver never loads dependencies itself: the host supplies a
//! [`ModuleResolver`] that turns a [`ModuleReference`] into a loaded
//! [`Module`]. Resolution fails per reference, and a failure never stops the
//! pass from trying the next one.
//!
//! | Type | Source |
//! |------|--------|
//! | [`MemoryResolver`] | Modules preloaded by the host or a test |
//! | [`DirectoryResolver`] | `<name>.json` files on a list of search paths |

use crate::error::ResolveError;
use logweave_il::{Module, ModuleReference};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loads referenced modules on behalf of the weaver
pub trait ModuleResolver {
    /// Resolve one reference
    fn resolve(&self, reference: &ModuleReference) -> Result<Arc<Module>, ResolveError>;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for &R {
    fn resolve(&self, reference: &ModuleReference) -> Result<Arc<Module>, ResolveError> {
        (**self).resolve(reference)
    }
}

/// Resolver over modules already in memory, keyed by module name
#[derive(Debug, Default)]
pub struct MemoryResolver {
    modules: FxHashMap<String, Arc<Module>>,
}

impl MemoryResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module under its own name
    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), Arc::new(module));
    }

    /// Builder form of [`MemoryResolver::insert`]
    pub fn with_module(mut self, module: Module) -> Self {
        self.insert(module);
        self
    }

    /// Number of modules available
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are available
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleResolver for MemoryResolver {
    fn resolve(&self, reference: &ModuleReference) -> Result<Arc<Module>, ResolveError> {
        self.modules
            .get(&reference.name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                name: reference.name.clone(),
            })
    }
}

/// Resolver that loads `<name>.json` module files from search paths
///
/// Paths are searched in order. Loaded modules are cached for the lifetime of
/// the resolver.
#[derive(Debug, Default)]
pub struct DirectoryResolver {
    search_paths: Vec<PathBuf>,
    cache: RefCell<FxHashMap<String, Arc<Module>>>,
}

impl DirectoryResolver {
    /// Create a resolver over the given search paths
    pub fn new(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_paths: search_paths.into_iter().collect(),
            cache: RefCell::default(),
        }
    }

    /// Append a search path
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Search paths, in lookup order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}.json", name);
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    fn load(path: &Path, name: &str) -> Result<Module, ResolveError> {
        Module::load(path).map_err(|source| ResolveError::Load {
            name: name.to_string(),
            source,
        })
    }
}

impl ModuleResolver for DirectoryResolver {
    fn resolve(&self, reference: &ModuleReference) -> Result<Arc<Module>, ResolveError> {
        if let Some(module) = self.cache.borrow().get(&reference.name) {
            return Ok(Arc::clone(module));
        }

        let path = self
            .locate(&reference.name)
            .ok_or_else(|| ResolveError::NotFound {
                name: reference.name.clone(),
            })?;
        debug!(module = %reference.name, path = %path.display(), "loading referenced module");

        let module = Arc::new(Self::load(&path, &reference.name)?);
        self.cache
            .borrow_mut()
            .insert(reference.name.clone(), Arc::clone(&module));
        Ok(module)
    }
}
