//! The module loader and its global, append-only namespace.
//!
//! Every `register "name" Class;` statement in a loaded module publishes a
//! [`UnitDefinition`] under `name`. Names are global to the loader and can
//! never be removed or replaced; a module that would reuse one is rejected
//! as a whole and registers nothing.

use crate::error::LoadError;
use crate::script::{CompiledModule, Program, compile_source};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A unit class published under a registration name.
#[derive(Debug)]
pub struct UnitDefinition {
    name: String,
    program: Arc<Program>,
}

impl UnitDefinition {
    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved class.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }
}

/// Loads unit-script modules into a shared namespace.
///
/// Cheap to clone; clones share the namespace.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    definitions: Arc<Mutex<HashMap<String, Arc<UnitDefinition>>>>,
}

impl ModuleLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and resolves `source` on a blocking worker, then registers its units.
    ///
    /// Returns the names registered, in source order.
    pub async fn add_module(&self, source: impl Into<String>) -> Result<Vec<String>, LoadError> {
        let source = source.into();
        let compiled = tokio::task::spawn_blocking(move || compile_source(&source))
            .await
            .map_err(|e| LoadError::Worker(e.to_string()))??;
        self.register(compiled)
    }

    /// Synchronous [`add_module`](Self::add_module) for callers outside a runtime.
    pub fn add_module_blocking(&self, source: &str) -> Result<Vec<String>, LoadError> {
        self.register(compile_source(source)?)
    }

    fn register(&self, compiled: CompiledModule) -> Result<Vec<String>, LoadError> {
        let mut definitions = self.definitions.lock();
        for (i, (name, _)) in compiled.registrations.iter().enumerate() {
            let repeated = compiled.registrations[..i].iter().any(|(n, _)| n == name);
            if repeated || definitions.contains_key(name) {
                return Err(LoadError::AlreadyRegistered(name.clone()));
            }
        }
        let mut names = Vec::with_capacity(compiled.registrations.len());
        for (name, program) in compiled.registrations {
            tracing::info!(module = %name, class = program.class(), "module registered");
            definitions.insert(
                name.clone(),
                Arc::new(UnitDefinition {
                    name: name.clone(),
                    program,
                }),
            );
            names.push(name);
        }
        Ok(names)
    }

    /// Looks a registration up.
    pub fn definition(&self, name: &str) -> Option<Arc<UnitDefinition>> {
        self.definitions.lock().get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.definitions.lock().contains_key(name)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.definitions.lock().len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.lock().is_empty()
    }
}
