//! `if`, `cond` and `repeat`.
//!
//! These only gate on their first operand. Everything else is handed to the
//! nested body as it is, possibly still pending, so a branch or iteration can
//! start before all of its inputs exist.

use crate::error::Error;
use crate::program::op::OpKind;
use crate::program::types::Type;
use crate::program::Operation;
use crate::runtime::dispatcher::{Dispatcher, Frame};
use crate::runtime::stats::Counter;
use crate::runtime::value::{all_ready, all_settled, AsyncValue, Payload};

fn gate_payload(frame: &Frame, op: &Operation) -> Result<Payload, Error> {
    frame
        .value(op.operands[0])
        .outcome()
        .unwrap_or(Err(Error::Abandoned))
}

/// Run exactly one of two bodies, picked by the condition. The other one is
/// never instantiated.
pub(crate) async fn run_branch(
    dispatcher: &Dispatcher,
    frame: &Frame,
    op: &Operation,
    results: &[AsyncValue],
) {
    let condition = match gate_payload(frame, op) {
        Ok(Payload::Bool(b)) => b,
        Ok(other) => {
            return dispatcher.fail(
                results,
                Error::type_mismatch(op.kind.name(), &Type::I1, &other.ty()),
            )
        }
        Err(error) => return dispatcher.fail(results, error),
    };

    let target = match op.kind {
        OpKind::If => op
            .regions
            .get(if condition { 0 } else { 1 })
            .copied()
            .ok_or_else(|| Error::signature(op.kind.name(), "expected two regions")),
        _ => dispatcher.resolve(op, if condition { "true_fn" } else { "false_fn" }),
    };
    let target = match target {
        Ok(target) => target,
        Err(error) => return dispatcher.fail(results, error),
    };

    dispatcher.counters().bump(Counter::Branches);
    tracing::debug!(
        op = %op.kind,
        condition,
        target = %dispatcher.program().body(target).debug_name,
        "branch selected"
    );
    let invocation = dispatcher.invoke_body(target, frame.values(&op.operands[1..]));
    dispatcher.adopt(invocation, results).await;
}

/// Run the body `trip count` times in sequence, threading the carried values
/// through. Zero or fewer trips forwards the initial values unchanged.
pub(crate) async fn run_repeat(
    dispatcher: &Dispatcher,
    frame: &Frame,
    op: &Operation,
    results: &[AsyncValue],
) {
    let trips = match gate_payload(frame, op) {
        Ok(Payload::I32(n)) => n.max(0),
        Ok(other) => {
            return dispatcher.fail(
                results,
                Error::type_mismatch(op.kind.name(), &Type::I32, &other.ty()),
            )
        }
        Err(error) => return dispatcher.fail(results, error),
    };
    let Some(&body) = op.regions.first() else {
        return dispatcher.fail(results, Error::signature(op.kind.name(), "expected a region"));
    };
    tracing::debug!(
        trips,
        body = %dispatcher.program().body(body).debug_name,
        "repeat"
    );

    let mut carried = frame.values(&op.operands[1..]);
    for iteration in 0..trips {
        if let Err(error) = all_ready(&carried).await {
            tracing::debug!(iteration, %error, "loop-carried value failed");
            return dispatcher.fail(results, error);
        }
        dispatcher.counters().bump(Counter::Iterations);
        tracing::trace!(iteration, "iteration");
        let invocation = dispatcher.invoke_body(body, carried);
        let _ = invocation.done.settled().await;
        carried = invocation.results;
    }

    for (source, target) in carried.iter().zip(results) {
        source.forward_to(target.clone());
    }
    all_settled(results).await;
}
