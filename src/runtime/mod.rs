//! Executing programs.
//!
//! [`Executor`] is the entry point: it checks an invocation against the
//! entry function's signature, starts it, and hands back the root values.
//! The work itself is done by the dispatcher and the runners for control flow
//! and parallel loops.

pub mod arena;
mod control;
mod dispatcher;
mod kernels;
pub mod parallel;
mod stats;
pub mod value;

use std::sync::Arc;

use futures::task::Spawn;

use crate::console::{Console, Stdout};
use crate::error::{Error, Result};
use crate::program::Program;
use dispatcher::Dispatcher;
use value::{all_settled, AsyncValue, Outcome, Payload};

pub use dispatcher::Invocation;
pub use stats::Stats;

/// Runs functions of one program on a worker pool.
///
/// Cloning is cheap and clones share counters.
#[derive(Clone)]
pub struct Executor {
    dispatcher: Dispatcher,
}

impl Executor {
    pub fn new(program: Arc<Program>, spawner: Arc<dyn Spawn + Send + Sync>) -> Self {
        Self::with_console(program, spawner, Arc::new(Stdout))
    }

    pub fn with_console(
        program: Arc<Program>,
        spawner: Arc<dyn Spawn + Send + Sync>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(program, spawner, console),
        }
    }

    pub fn program(&self) -> &Program {
        self.dispatcher.program()
    }

    /// Start `name` with `args`. Argument values may still be pending.
    ///
    /// Fails right away if the function doesn't exist or the arguments don't
    /// fit its parameters; otherwise every error shows up in the returned
    /// values.
    pub fn invoke(&self, name: &str, args: Vec<AsyncValue>) -> Result<Invocation> {
        let program = self.program();
        let index = program
            .function(name)
            .ok_or_else(|| Error::UnknownCallee(Arc::from(name)))?;
        let params = &program.body(index).signature.params;
        if params.len() != args.len() {
            return Err(Error::signature(
                format!("@{}", name),
                format!("expected {} arguments, found {}", params.len(), args.len()),
            ));
        }
        for (param, arg) in params.iter().zip(&args) {
            if param != arg.ty() {
                return Err(Error::type_mismatch(format!("@{}", name), param, arg.ty()));
            }
        }
        tracing::debug!(function = name, "invoke");
        Ok(self.dispatcher.invoke_body(index, args))
    }

    /// Invoke `name` and wait until it has finished and every root value has
    /// settled.
    pub async fn run(&self, name: &str, args: Vec<AsyncValue>) -> Result<Execution> {
        let invocation = self.invoke(name, args)?;
        let _ = invocation.done.settled().await;
        let outcomes = all_settled(&invocation.results).await;
        Ok(Execution { outcomes })
    }

    pub fn stats(&self) -> Stats {
        self.dispatcher.stats()
    }
}

/// The settled root values of a finished invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    pub outcomes: Vec<Outcome>,
}

impl Execution {
    /// The error of the first failed root value, in result order.
    pub fn first_error(&self) -> Option<&Error> {
        self.outcomes.iter().find_map(|outcome| outcome.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.first_error().is_none()
    }

    /// All payloads, if nothing failed.
    pub fn payloads(&self) -> Result<Vec<Payload>> {
        self.outcomes.iter().cloned().collect()
    }
}
