//! `parallel_for` and `parallel_call`.
//!
//! The range `[start, end)` is cut into consecutive blocks of `block_size`,
//! the last one possibly shorter. Every block gets its own invocation of the
//! body with `(block_start, block_end, shared...)` as arguments, and all of
//! them are started at once. No order between blocks is guaranteed.
//!
//! A block is complete when its body's chain result settles, or when the body
//! finishes if it returns nothing. The operation's chain settles once every
//! block is complete, or as soon as one of them fails.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::program::op::OpKind;
use crate::program::types::Type;
use crate::program::Operation;
use crate::runtime::dispatcher::{ready_payloads, Dispatcher, Frame, Invocation};
use crate::runtime::stats::Counter;
use crate::runtime::value::{all_ready, all_settled, AsyncValue, Payload};

pub fn check_range(start: i64, end: i64, block_size: i64) -> Result<()> {
    if block_size <= 0 || end < start {
        return Err(Error::InvalidRange {
            start,
            end,
            block_size,
        });
    }
    Ok(())
}

/// Split `[start, end)` into blocks. Arithmetic is done in 64 bits so block
/// bounds never overflow for 32-bit ranges.
pub fn partition(start: i64, end: i64, block_size: i64) -> Result<Vec<Range<i64>>> {
    check_range(start, end, block_size)?;
    let mut blocks = Vec::new();
    let mut low = start;
    while low < end {
        let high = low.saturating_add(block_size).min(end);
        blocks.push(low..high);
        low = high;
    }
    Ok(blocks)
}

fn block_bound(op: &Operation, bound: i64) -> Result<AsyncValue> {
    let bound = i32::try_from(bound)
        .map_err(|_| Error::type_mismatch(op.kind.name(), &Type::I32, &Type::I64))?;
    Ok(AsyncValue::ready(Payload::I32(bound)))
}

pub(crate) async fn run_parallel(
    dispatcher: &Dispatcher,
    frame: &Frame,
    op: &Operation,
    results: &[AsyncValue],
) {
    let blocks = ready_payloads(frame, &op.operands[..3]).and_then(|range| {
        let bound = |i: usize| {
            range[i].as_i64().ok_or_else(|| {
                Error::type_mismatch(op.kind.name(), &Type::I32, &range[i].ty())
            })
        };
        partition(bound(0)?, bound(1)?, bound(2)?)
    });
    let blocks = match blocks {
        Ok(blocks) => blocks,
        Err(error) => return dispatcher.fail(results, error),
    };
    let target = match op.kind {
        OpKind::ParallelCall => dispatcher.resolve(op, "callee"),
        _ => op
            .regions
            .first()
            .copied()
            .ok_or_else(|| Error::signature(op.kind.name(), "expected a region")),
    };
    let target = match target {
        Ok(target) => target,
        Err(error) => return dispatcher.fail(results, error),
    };

    tracing::debug!(
        op = %op.kind,
        blocks = blocks.len(),
        body = %dispatcher.program().body(target).debug_name,
        "parallel dispatch"
    );
    dispatcher
        .counters()
        .add(Counter::Blocks, blocks.len() as u64);

    let shared = frame.values(&op.operands[3..]);
    let arguments = blocks
        .iter()
        .map(|block| {
            let bounds = vec![block_bound(op, block.start)?, block_bound(op, block.end)?];
            Ok([bounds, shared.clone()].concat())
        })
        .collect::<Result<Vec<_>>>();
    let invocations: Vec<Invocation> = match arguments {
        Ok(arguments) => arguments
            .into_iter()
            .map(|args| dispatcher.invoke_body(target, args))
            .collect(),
        Err(error) => return dispatcher.fail(results, error),
    };

    let signals: Vec<AsyncValue> = invocations
        .iter()
        .map(|invocation| {
            invocation
                .results
                .first()
                .cloned()
                .unwrap_or_else(|| invocation.done.clone())
        })
        .collect();
    let joined = all_ready(&signals).await;
    match results.first() {
        Some(chain) => chain.settle(joined.map(|()| Payload::Chain)),
        None => {
            if let Err(error) = joined {
                tracing::warn!(op = %op.kind, %error, "block failed");
            }
        }
    }

    let done: Vec<AsyncValue> = invocations.iter().map(|i| i.done.clone()).collect();
    all_settled(&done).await;
}
