//! The engine-wide module registry.
//!
//! The host's module namespace is global and append-only, so every load gets
//! a fresh name from a monotonic counter: `"1"`, `"2"`, and so on. A name is
//! consumed even if its load fails and is never reused. Registered modules
//! stay loaded for the life of the process; the registry grows by one entry
//! per successful compile, a leak bounded by how often the user recompiles.

use crate::codegen;
use crate::unit::ProcessingUnit;
use livefx_host::{LoadError, RenderContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A module loaded into the host under a registry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistration {
    /// Registry name.
    pub name: String,
    /// Full module text as loaded, registration statement included.
    pub source: String,
}

/// Allocates module names and loads generated sources.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    counter: AtomicU64,
    registrations: Mutex<Vec<ModuleRegistration>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_name(&self) -> String {
        (self.counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Registers `source` under the next name and instantiates one unit from it.
    ///
    /// Suspends while the host parses and resolves the module.
    pub async fn load(&self, context: &RenderContext, source: &str) -> Result<ProcessingUnit, LoadError> {
        let name = self.next_name();
        let text = format!("{source}{}", codegen::registration(&name));
        context.module_loader().add_module(text.clone()).await?;
        tracing::info!(module = %name, "module loaded");
        self.registrations.lock().push(ModuleRegistration {
            name: name.clone(),
            source: text,
        });
        let handle = context.create_unit(&name)?;
        Ok(ProcessingUnit::new(handle))
    }

    /// Every successful registration, oldest first.
    pub fn registrations(&self) -> Vec<ModuleRegistration> {
        self.registrations.lock().clone()
    }

    /// Number of names handed out, failed loads included.
    pub fn names_allocated(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Number of successful registrations.
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.lock().is_empty()
    }
}
