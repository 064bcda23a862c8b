//! Owner-side lifecycle of a processing unit.
//!
//! The render side decides when a unit actually goes away. The owner only
//! tracks whether it still considers the unit active or has asked it to
//! drain; once the host reports the unit released it can be forgotten.

use livefx_host::{NodeId, UnitHandle};

/// Lifecycle phase of a unit, as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    /// Connected and processing.
    Active,
    /// Sent `"disconnect"`; waiting for the host to reclaim it.
    Draining,
}

/// A live processing unit bound to one module registration.
#[derive(Debug, Clone)]
pub struct ProcessingUnit {
    handle: UnitHandle,
    phase: UnitPhase,
}

impl ProcessingUnit {
    pub(crate) fn new(handle: UnitHandle) -> Self {
        Self {
            handle,
            phase: UnitPhase::Active,
        }
    }

    /// The unit's node in the render graph.
    pub fn node(&self) -> NodeId {
        self.handle.node()
    }

    /// Registration name of the module the unit runs.
    pub fn module(&self) -> &str {
        self.handle.module()
    }

    /// Current phase.
    pub fn phase(&self) -> UnitPhase {
        self.phase
    }

    /// Host-side handle.
    pub fn handle(&self) -> &UnitHandle {
        &self.handle
    }

    /// Moves an active unit to draining. Returns `false` if it already was.
    pub(crate) fn begin_drain(&mut self) -> bool {
        let was_active = self.phase == UnitPhase::Active;
        self.phase = UnitPhase::Draining;
        was_active
    }

    /// Sets a k-rate parameter, clamped to its range. Returns whether it exists.
    pub fn set_parameter(&self, name: &str, value: f32) -> bool {
        match self.handle.params().get(name) {
            Some(param) => {
                param.set(value);
                true
            }
            None => false,
        }
    }

    /// Current value of a parameter.
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.handle.params().get(name).map(|p| p.get())
    }

    /// Whether the host has removed the unit.
    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }
}
