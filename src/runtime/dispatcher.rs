//! The dispatcher turns a body into running operations.
//!
//! Invoking a body creates a [`Frame`]: one [`AsyncValue`] per register, with
//! argument registers aliasing the caller's values and every result register
//! pending. Each operation then registers a join on its gating operands (see
//! [`Gate`]). When the join fires with every gating operand ready, the
//! operation is handed to the worker pool. When it fires with a failure, the
//! operation's results fail with that error and its logic never runs.
//!
//! Nothing blocks a worker while waiting for a value. Operations that run a
//! nested invocation await its completion as a future, and the worker is free
//! in the meantime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::task::{Spawn, SpawnExt};

use crate::console::Console;
use crate::error::Error;
use crate::program::op::{Gate, OpKind};
use crate::program::types::Type;
use crate::program::{Body, Operation, Program, Register};
use crate::runtime::arena::Index;
use crate::runtime::kernels;
use crate::runtime::stats::{Counter, Counters, Stats};
use crate::runtime::value::{all_settled, when_all, AsyncValue, Payload};
use crate::runtime::{control, parallel};

/// The root values of one body invocation.
#[derive(Debug)]
pub struct Invocation {
    /// The operands of the body's `return`, in order.
    pub results: Vec<AsyncValue>,
    /// Settles once every operation of the body has finished, including
    /// everything nested inside it.
    pub done: AsyncValue,
}

pub(crate) struct Frame {
    body: Index<Body>,
    registers: Vec<AsyncValue>,
    outstanding: AtomicUsize,
    done: AsyncValue,
}

impl Frame {
    pub(crate) fn value(&self, register: Register) -> AsyncValue {
        self.registers[register.index()].clone()
    }

    pub(crate) fn values(&self, registers: &[Register]) -> Vec<AsyncValue> {
        registers.iter().map(|r| self.value(*r)).collect()
    }

    fn finish_op(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.set_payload(Payload::Chain);
        }
    }
}

struct Shared {
    program: Arc<Program>,
    spawner: Arc<dyn Spawn + Send + Sync>,
    console: Arc<dyn Console>,
    counters: Counters,
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(crate) fn new(
        program: Arc<Program>,
        spawner: Arc<dyn Spawn + Send + Sync>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                program,
                spawner,
                console,
                counters: Counters::default(),
            }),
        }
    }

    pub(crate) fn program(&self) -> &Program {
        &self.shared.program
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub(crate) fn stats(&self) -> Stats {
        self.shared.counters.snapshot()
    }

    fn operation(&self, frame: &Frame, position: usize) -> &Operation {
        let program = self.program();
        &program.operations(program.body(frame.body))[position]
    }

    /// Look up the function named by a symbol attribute.
    pub(crate) fn resolve(&self, op: &Operation, attribute: &str) -> Result<Index<Body>, Error> {
        let name = op.attributes.symbol(attribute).ok_or_else(|| {
            Error::signature(op.kind.name(), format!("missing `{}` attribute", attribute))
        })?;
        self.program()
            .function(name)
            .ok_or_else(|| Error::UnknownCallee(name.clone()))
    }

    /// Start running `body` with `args` bound to its parameters.
    ///
    /// Returns at once; the returned values settle as the body runs.
    pub(crate) fn invoke_body(&self, index: Index<Body>, args: Vec<AsyncValue>) -> Invocation {
        let body = self.program().body(index);
        let operations = self.program().operations(body);
        debug_assert_eq!(args.len(), body.signature.params.len());
        self.counters().bump(Counter::Invocations);
        tracing::trace!(body = %body.debug_name, "invoke");

        let mut registers = args;
        registers.extend(
            body.registers[registers.len()..]
                .iter()
                .map(|ty| AsyncValue::pending(ty.clone())),
        );

        // The return is last and is never dispatched: its operands are the
        // body's results.
        let (returned, scheduled) = match operations.split_last() {
            Some((last, rest)) if last.kind == OpKind::Return => (&last.operands[..], rest),
            _ => (&[][..], operations),
        };

        let frame = Arc::new(Frame {
            body: index,
            registers,
            outstanding: AtomicUsize::new(scheduled.len()),
            done: AsyncValue::pending(Type::Chain),
        });
        let invocation = Invocation {
            results: frame.values(returned),
            done: frame.done.clone(),
        };
        if scheduled.is_empty() {
            frame.done.set_payload(Payload::Chain);
        }
        for position in 0..scheduled.len() {
            self.schedule(&frame, position);
        }
        invocation
    }

    fn schedule(&self, frame: &Arc<Frame>, position: usize) {
        let op = self.operation(frame, position);
        let gating = match op.kind.info().gate {
            Gate::None => {
                self.run_immediate(frame, op);
                frame.finish_op();
                return;
            }
            Gate::All => &op.operands[..],
            Gate::Prefix(n) => &op.operands[..n.min(op.operands.len())],
        };
        let dispatcher = self.clone();
        let frame_ref = frame.clone();
        when_all(&frame.values(gating), move |ready| match ready {
            Ok(()) => dispatcher.spawn_node(frame_ref, position),
            Err(error) => {
                let op = dispatcher.operation(&frame_ref, position);
                tracing::trace!(op = %op.kind, %error, "short-circuit");
                dispatcher.counters().bump(Counter::ShortCircuited);
                dispatcher.fail(&frame_ref.values(&op.results), error);
                frame_ref.finish_op();
            }
        });
    }

    /// Operations without inputs complete on the spot.
    fn run_immediate(&self, frame: &Frame, op: &Operation) {
        let results = frame.values(&op.results);
        let payload = match &op.kind {
            OpKind::Constant(_) => match op.attributes.literal("value") {
                Some(value) => Ok(value.clone()),
                None => Err(Error::signature(op.kind.name(), "missing `value` attribute")),
            },
            _ => Ok(Payload::Chain),
        };
        self.counters().bump(Counter::Dispatched);
        self.complete(&results, payload.map(|p| vec![p]));
    }

    fn spawn_node(&self, frame: Arc<Frame>, position: usize) {
        let dispatcher = self.clone();
        let task_frame = frame.clone();
        let task = async move {
            dispatcher.run(&task_frame, position).await;
            task_frame.finish_op();
        };
        if let Err(error) = self.shared.spawner.spawn(task) {
            let op = self.operation(&frame, position);
            tracing::error!(op = %op.kind, %error, "worker pool rejected operation");
            self.fail(&frame.values(&op.results), Error::Spawn(error.to_string()));
            frame.finish_op();
        }
    }

    async fn run(&self, frame: &Frame, position: usize) {
        let op = self.operation(frame, position);
        let results = frame.values(&op.results);
        self.counters().bump(Counter::Dispatched);
        tracing::trace!(
            op = %op.kind,
            body = %self.program().body(frame.body).debug_name,
            "dispatch"
        );

        match &op.kind {
            OpKind::Call => self.run_call(frame, op, &results).await,
            OpKind::If | OpKind::Cond => control::run_branch(self, frame, op, &results).await,
            OpKind::Repeat => control::run_repeat(self, frame, op, &results).await,
            OpKind::ParallelFor | OpKind::ParallelCall => {
                parallel::run_parallel(self, frame, op, &results).await
            }
            OpKind::MergeChains => self.complete(&results, Ok(vec![Payload::Chain])),
            OpKind::Print(_) => {
                let outcome = ready_payloads(frame, &op.operands).map(|operands| {
                    self.shared.console.print(&kernels::render(&operands[0]));
                    self.counters().bump(Counter::Prints);
                    vec![Payload::Chain]
                });
                self.complete(&results, outcome)
            }
            OpKind::Add(_) | OpKind::And | OpKind::Equal(_) | OpKind::Div(_) => {
                let outcome = ready_payloads(frame, &op.operands)
                    .and_then(|operands| kernels::evaluate(&op.kind, &operands));
                self.complete(&results, outcome)
            }
            OpKind::Constant(_) | OpKind::NewChain => self.run_immediate(frame, op),
            OpKind::Return => {}
        }
    }

    async fn run_call(&self, frame: &Frame, op: &Operation, results: &[AsyncValue]) {
        let callee = match self.resolve(op, "callee") {
            Ok(callee) => callee,
            Err(error) => return self.fail(results, error),
        };
        let invocation = self.invoke_body(callee, frame.values(&op.operands));
        self.adopt(invocation, results).await;
    }

    /// Wire a nested invocation's results to `results`, then wait for the
    /// nested body to finish and for every result to settle.
    pub(crate) async fn adopt(&self, invocation: Invocation, results: &[AsyncValue]) {
        for (source, target) in invocation.results.iter().zip(results) {
            source.forward_to(target.clone());
        }
        let _ = invocation.done.settled().await;
        all_settled(results).await;
    }

    /// Settle `results` from the outcome of a synchronous kernel.
    pub(crate) fn complete(&self, results: &[AsyncValue], outcome: Result<Vec<Payload>, Error>) {
        match outcome {
            Ok(payloads) => {
                for (result, payload) in results.iter().zip(payloads) {
                    result.set_payload(payload);
                }
            }
            Err(error) => {
                self.counters().bump(Counter::Failures);
                tracing::debug!(%error, "operation failed");
                self.fail(results, error);
            }
        }
    }

    pub(crate) fn fail(&self, results: &[AsyncValue], error: Error) {
        for result in results {
            result.set_error(error.clone());
        }
    }
}

/// Payloads of operands that are known to be settled.
pub(crate) fn ready_payloads(frame: &Frame, operands: &[Register]) -> Result<Vec<Payload>, Error> {
    operands
        .iter()
        .map(|r| {
            frame
                .value(*r)
                .outcome()
                .unwrap_or(Err(Error::Abandoned))
        })
        .collect()
}
