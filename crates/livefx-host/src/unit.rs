//! Scripted processing units on the render thread.
//!
//! A [`ScriptProcessor`] runs one instance of a registered unit class. Its
//! `process` routine decides each block whether the unit keeps running; the
//! render graph removes it on the block boundary after it reports "stop".
//!
//! Faults are never fatal to the host. A fault caught by the script and passed
//! to `warn` is logged once, repeats are counted and summarised periodically,
//! and the unit keeps running. A fault that escapes `process` silences that
//! block and stops the unit.

use crate::bus::AudioBus;
use crate::error::{LoadError, RuntimeFault};
use crate::loader::UnitDefinition;
use crate::params::ParamSet;
use crate::processor::{BlockProcessor, ProcessContext};
use crate::script::compile::Program;
use crate::script::eval::{Interpreter, Io, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Blocks between summaries of suppressed repeat warnings (about 1 s at 48 kHz).
pub const SUMMARY_INTERVAL_BLOCKS: u32 = 375;

/// Lifecycle counters shared between a unit on the render thread and its handle.
#[derive(Debug, Default)]
pub struct UnitStatus {
    released: AtomicBool,
    stopped: AtomicBool,
    messages_received: AtomicU64,
    fault_count: AtomicU64,
}

impl UnitStatus {
    /// Whether the render graph has removed the unit and handed it back.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether the unit has reported "stop".
    pub fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Control messages delivered to the unit so far.
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Acquire)
    }

    /// Runtime faults seen so far, caught or not.
    pub fn fault_count(&self) -> u64 {
        self.fault_count.load(Ordering::Acquire)
    }

    pub(crate) fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Deduplicating warning sink for one unit.
pub(crate) struct FaultReporter {
    module: Arc<str>,
    status: Arc<UnitStatus>,
    last: Option<Value>,
    suppressed: u64,
    blocks: u32,
}

impl FaultReporter {
    pub(crate) fn new(module: Arc<str>, status: Arc<UnitStatus>) -> Self {
        Self {
            module,
            status,
            last: None,
            suppressed: 0,
            blocks: 0,
        }
    }

    /// Handles `warn(value)` from a script.
    pub(crate) fn warn(&mut self, value: &Value) {
        if matches!(value, Value::Fault(_)) {
            self.status.fault_count.fetch_add(1, Ordering::AcqRel);
        }
        if self.last.as_ref() == Some(value) {
            self.suppressed += 1;
            return;
        }
        self.flush();
        tracing::warn!(module = %self.module, "{value}");
        self.last = Some(value.clone());
    }

    /// Logs a fault that escaped the script.
    pub(crate) fn uncaught(&mut self, fault: &RuntimeFault) {
        self.status.fault_count.fetch_add(1, Ordering::AcqRel);
        self.flush();
        tracing::error!(module = %self.module, %fault, "uncaught fault, unit stopped");
    }

    /// Called once per processed block; emits the periodic repeat summary.
    pub(crate) fn end_block(&mut self) {
        self.blocks += 1;
        if self.blocks >= SUMMARY_INTERVAL_BLOCKS {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.suppressed > 0 {
            tracing::warn!(
                module = %self.module,
                repeats = self.suppressed,
                "suppressed repeated warnings"
            );
            self.suppressed = 0;
        }
        self.blocks = 0;
    }

    #[cfg(test)]
    pub(crate) fn fault_count(&self) -> u64 {
        self.status.fault_count()
    }

    #[cfg(test)]
    pub(crate) fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Runs one instance of a scripted unit class.
pub struct ScriptProcessor {
    program: Arc<Program>,
    interp: Interpreter,
    params: Arc<ParamSet>,
    values: Vec<f32>,
    reporter: FaultReporter,
    status: Arc<UnitStatus>,
    sample_rate: f32,
    last_frame: u64,
    idle_in: AudioBus,
    idle_out: AudioBus,
}

impl ScriptProcessor {
    /// Instantiates `definition`, evaluating its state initializers.
    pub fn new(
        definition: &UnitDefinition,
        params: Arc<ParamSet>,
        status: Arc<UnitStatus>,
        sample_rate: f32,
    ) -> Result<Self, LoadError> {
        let program = Arc::clone(definition.program());
        let mut processor = Self {
            interp: Interpreter::new(&program),
            values: vec![0.0; params.len()],
            params,
            reporter: FaultReporter::new(Arc::from(definition.name()), Arc::clone(&status)),
            status,
            sample_rate,
            last_frame: 0,
            idle_in: AudioBus::new(0, 0),
            idle_out: AudioBus::new(0, 0),
            program,
        };
        processor.params.snapshot_into(&mut processor.values);
        let mut io = Io {
            input: &processor.idle_in,
            output: &mut processor.idle_out,
            params: &processor.values,
            sample_rate,
            current_frame: 0,
            reporter: &mut processor.reporter,
        };
        processor
            .interp
            .init_state(&processor.program, &mut io)
            .map_err(|fault| LoadError::Instantiation {
                class: processor.program.class().to_string(),
                message: fault.to_string(),
            })?;
        Ok(processor)
    }

    /// Shared status counters.
    pub fn status(&self) -> &Arc<UnitStatus> {
        &self.status
    }
}

impl BlockProcessor for ScriptProcessor {
    fn process(&mut self, ctx: ProcessContext<'_>) -> bool {
        let ProcessContext {
            input,
            output,
            sample_rate,
            current_frame,
        } = ctx;
        self.last_frame = current_frame;
        self.params.snapshot_into(&mut self.values);

        let mut io = Io {
            input,
            output: &mut *output,
            params: &self.values,
            sample_rate,
            current_frame,
            reporter: &mut self.reporter,
        };
        let result = self.interp.run(&self.program, &self.program.process, &mut io);
        self.reporter.end_block();

        let keep = match result {
            // A process routine that falls off the end keeps running.
            Ok(Value::Unit) => true,
            Ok(value) => value.truthy(),
            Err(fault) => {
                output.reset(output.channel_count());
                self.reporter.uncaught(&fault);
                false
            }
        };
        if !keep {
            self.status.mark_stopped();
        }
        keep
    }

    fn on_message(&mut self, message: &str) {
        self.status.messages_received.fetch_add(1, Ordering::AcqRel);
        let Some(routine) = self.program.handler(message) else {
            tracing::debug!(module = %self.reporter.module, message, "no handler for message");
            return;
        };
        let mut io = Io {
            input: &self.idle_in,
            output: &mut self.idle_out,
            params: &self.values,
            sample_rate: self.sample_rate,
            current_frame: self.last_frame,
            reporter: &mut self.reporter,
        };
        if let Err(fault) = self.interp.run(&self.program, routine, &mut io) {
            tracing::warn!(
                module = %self.reporter.module,
                handler = %routine.name,
                %fault,
                "message handler failed"
            );
            self.status.fault_count.fetch_add(1, Ordering::AcqRel);
        }
    }
}
