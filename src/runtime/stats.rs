use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters, bumped by the dispatcher from any worker thread.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    dispatched: AtomicU64,
    short_circuited: AtomicU64,
    invocations: AtomicU64,
    branches: AtomicU64,
    iterations: AtomicU64,
    blocks: AtomicU64,
    prints: AtomicU64,
    failures: AtomicU64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Counter {
    Dispatched,
    ShortCircuited,
    Invocations,
    Branches,
    Iterations,
    Blocks,
    Prints,
    Failures,
}

impl Counters {
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Dispatched => &self.dispatched,
            Counter::ShortCircuited => &self.short_circuited,
            Counter::Invocations => &self.invocations,
            Counter::Branches => &self.branches,
            Counter::Iterations => &self.iterations,
            Counter::Blocks => &self.blocks,
            Counter::Prints => &self.prints,
            Counter::Failures => &self.failures,
        }
    }

    pub(crate) fn bump(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub(crate) fn add(&self, counter: Counter, n: u64) {
        self.slot(counter).fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let get = |counter| self.slot(counter).load(Ordering::Relaxed);
        Stats {
            dispatched: get(Counter::Dispatched),
            short_circuited: get(Counter::ShortCircuited),
            invocations: get(Counter::Invocations),
            branches: get(Counter::Branches),
            iterations: get(Counter::Iterations),
            blocks: get(Counter::Blocks),
            prints: get(Counter::Prints),
            failures: get(Counter::Failures),
        }
    }
}

/// What the engine has done since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Operations whose gating operands all became ready and that ran.
    pub dispatched: u64,
    /// Operations skipped because a gating operand failed.
    pub short_circuited: u64,
    /// Body invocations, including nested ones.
    pub invocations: u64,
    pub branches: u64,
    pub iterations: u64,
    pub blocks: u64,
    pub prints: u64,
    /// Values settled as failed by an operation itself.
    pub failures: u64,
}

impl Stats {
    pub fn show(&self, elapsed: Duration) -> String {
        let per_second = if elapsed.is_zero() {
            0
        } else {
            (self.dispatched as f64 / elapsed.as_secs_f64()) as u64
        };
        format!(
            "\
            \tDispatched: {}\n\
            \tShort-circuited: {}\n\
            \tInvocations: {}\n\
            \tBranches: {}\n\
            \tIterations: {}\n\
            \tBlocks: {}\n\
            \tPrints: {}\n\
            \tFailures: {}\n\
            \tTime (ms): {}\n\
            \tDispatched per second: {}\n\
        ",
            self.dispatched,
            self.short_circuited,
            self.invocations,
            self.branches,
            self.iterations,
            self.blocks,
            self.prints,
            self.failures,
            elapsed.as_millis(),
            per_second,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_bumps() {
        let counters = Counters::default();
        counters.bump(Counter::Dispatched);
        counters.add(Counter::Blocks, 4);
        let stats = counters.snapshot();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.blocks, 4);
        assert_eq!(stats.prints, 0);
        assert!(stats.show(Duration::from_millis(2)).contains("Blocks: 4"));
    }
}
