//=============================================
// src/runtime.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript embedding surface
// Objective: Bundle interpreter, resolver, screen registry, and scheduler
//            into the runtime object hosts drive
//=============================================

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::warn;
use once_cell::sync::OnceCell;

use crate::ast::Program;
use crate::error::ScriptResult;
use crate::interpreter::{Interpreter, OutputSink, RuntimeShared};
use crate::modules::ModuleResolver;
use crate::scheduler::{ScheduledCall, Scheduler};
use crate::value::Value;

/// One root execution environment: a root interpreter plus the shared state
/// and render thread that screen threads and callbacks attach to.
pub struct ScriptRuntime {
    shared: Arc<RuntimeShared>,
    scheduler: Arc<Scheduler>,
    interp: Interpreter,
}

impl ScriptRuntime {
    pub fn new() -> Self {
        Self::with_output(OutputSink::Stdout)
    }

    pub fn with_output(output: OutputSink) -> Self {
        let shared = RuntimeShared::new(output);
        let scheduler = start_scheduler(&shared);
        let resolver = ModuleResolver::shared();
        let interp = Interpreter::new(Arc::clone(&shared), Arc::clone(&scheduler), resolver);
        Self {
            shared,
            scheduler,
            interp,
        }
    }

    /// Parse and run a script in one step.
    pub fn execute_source(
        &mut self,
        source: &str,
        path: Option<&Path>,
    ) -> ScriptResult<Option<Value>> {
        let program = crate::parse(source)?;
        self.execute(&program, path)
    }

    pub fn execute(
        &mut self,
        program: &Program,
        path: Option<&Path>,
    ) -> ScriptResult<Option<Value>> {
        self.interp.execute(program, path)
    }

    /// Run a named function against the loaded units.
    pub fn invoke(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        self.interp.invoke(name, args)
    }

    pub fn get_variable(&self, screen: &str, name: &str) -> Option<Value> {
        self.shared.screens.get_var(screen, name)
    }

    pub fn set_variable(&self, screen: &str, name: &str, value: Value) {
        self.shared.screens.set_var(screen, name, value);
    }

    /// Editor-save hook: drop the parse cache entry for one file.
    pub fn invalidate_cache(&self, path: &Path) {
        self.interp.resolver().borrow_mut().invalidate(path);
    }

    /// A Send + Clone handle for other threads (one evaluation context per
    /// screen is the intended shape).
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shared: Arc::clone(&self.shared),
            scheduler: Arc::clone(&self.scheduler),
        }
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable cross-thread entry point into a runtime's shared state.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<RuntimeShared>,
    scheduler: Arc<Scheduler>,
}

impl RuntimeHandle {
    /// Build a fresh evaluation context on the calling thread. Each context
    /// has its own environment and module resolver; functions, screens, and
    /// the render queue are shared.
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.scheduler),
            ModuleResolver::shared(),
        )
    }

    pub fn get_variable(&self, screen: &str, name: &str) -> Option<Value> {
        self.shared.screens.get_var(screen, name)
    }

    pub fn set_variable(&self, screen: &str, name: &str, value: Value) {
        self.shared.screens.set_var(screen, name, value);
    }

    pub fn run_later(&self, call: ScheduledCall) {
        self.scheduler.run_later(call);
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }
}

/// Wire the render thread's executor: every callback runs in a fresh
/// context that carries the screen captured at scheduling time, and the
/// context is cleared once the call returns. A failing callback reports to
/// the output sink; it never takes other contexts down.
fn start_scheduler(shared: &Arc<RuntimeShared>) -> Arc<Scheduler> {
    let slot: Arc<OnceCell<Weak<Scheduler>>> = Arc::new(OnceCell::new());
    let executor_shared = Arc::clone(shared);
    let executor_slot = Arc::clone(&slot);
    let scheduler = Scheduler::start(Box::new(move |call: &ScheduledCall| {
        let scheduler = match executor_slot.get().and_then(Weak::upgrade) {
            Some(scheduler) => scheduler,
            None => return,
        };
        let mut interp = Interpreter::new(
            Arc::clone(&executor_shared),
            scheduler,
            ModuleResolver::shared(),
        );
        interp.set_current_screen(call.screen.clone());
        if let Err(err) = interp.invoke(&call.function, Vec::new()) {
            warn!("callback '{}' failed: {}", call.function, err);
            executor_shared
                .output
                .println(&format!("Error in callback '{}': {}", call.function, err));
        }
        interp.set_current_screen(None);
    }));
    let _ = slot.set(Arc::downgrade(&scheduler));
    scheduler
}
