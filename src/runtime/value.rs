//! Single-assignment future cells.
//!
//! An [`AsyncValue`] is one dataflow edge. It starts out pending with a list of
//! continuations, and is filled exactly once with either a [`Payload`] or an
//! [`Error`]. Filling it drains the continuation list; anyone registering later
//! is invoked on the spot. This is the only point where threads synchronize:
//! there is no lock over the graph as a whole.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::program::types::Type;

pub type Outcome = Result<Payload, Error>;

type Continuation = Box<dyn FnOnce(&Outcome) + Send>;

/// A host object passed through the graph untouched.
#[derive(Clone)]
pub struct Opaque {
    type_name: Arc<str>,
    handle: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            handle: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref()
    }
}

impl Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum Payload {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Chain,
    Opaque(Opaque),
}

impl Payload {
    pub fn ty(&self) -> Type {
        match self {
            Payload::Bool(_) => Type::I1,
            Payload::I32(_) => Type::I32,
            Payload::I64(_) => Type::I64,
            Payload::F32(_) => Type::F32,
            Payload::F64(_) => Type::F64,
            Payload::Chain => Type::Chain,
            Payload::Opaque(o) => Type::Opaque(o.type_name.clone()),
        }
    }

    /// Parses a literal of a scalar type, as written in program documents and
    /// on the command line.
    pub fn parse_literal(ty: &Type, text: &str) -> Result<Payload, String> {
        let text = text.trim();
        let bad = |e: &dyn Display| format!("invalid {} literal `{}`: {}", ty, text, e);
        Ok(match ty {
            Type::I1 => match text {
                "true" | "1" => Payload::Bool(true),
                "false" | "0" => Payload::Bool(false),
                _ => return Err(bad(&"expected true or false")),
            },
            Type::I32 => Payload::I32(text.parse().map_err(|e| bad(&e))?),
            Type::I64 => Payload::I64(text.parse().map_err(|e| bad(&e))?),
            Type::F32 => Payload::F32(text.parse().map_err(|e| bad(&e))?),
            Type::F64 => Payload::F64(text.parse().map_err(|e| bad(&e))?),
            Type::Chain | Type::Opaque(_) => {
                return Err(format!("type {} has no literal form", ty));
            }
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::I32(i) => Some(*i as i64),
            Payload::I64(i) => Some(*i),
            _ => None,
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::I32(a), Payload::I32(b)) => a == b,
            (Payload::I64(a), Payload::I64(b)) => a == b,
            (Payload::F32(a), Payload::F32(b)) => a == b,
            (Payload::F64(a), Payload::F64(b)) => a == b,
            (Payload::Chain, Payload::Chain) => true,
            (Payload::Opaque(a), Payload::Opaque(b)) => Arc::ptr_eq(&a.handle, &b.handle),
            _ => false,
        }
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bool(b) => write!(f, "{}", b),
            Payload::I32(i) => write!(f, "{}", i),
            Payload::I64(i) => write!(f, "{}", i),
            Payload::F32(x) => write!(f, "{:?}", x),
            Payload::F64(x) => write!(f, "{:?}", x),
            Payload::Chain => write!(f, "chain"),
            Payload::Opaque(o) => write!(f, "<{}>", o.type_name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Pending,
    Ready,
    Failed,
}

enum Slot {
    Unfilled(Vec<Continuation>),
    Filled(Outcome),
}

struct Inner {
    ty: Type,
    slot: Mutex<Slot>,
}

/// A shared handle to a single-assignment cell.
///
/// Clones refer to the same cell. Only the producing operation settles it;
/// every other holder is a reader.
#[derive(Clone)]
pub struct AsyncValue {
    inner: Arc<Inner>,
}

impl AsyncValue {
    pub fn pending(ty: Type) -> Self {
        Self::with_slot(ty, Slot::Unfilled(vec![]))
    }

    pub fn ready(payload: Payload) -> Self {
        Self::with_slot(payload.ty(), Slot::Filled(Ok(payload)))
    }

    pub fn failed(ty: Type, error: Error) -> Self {
        Self::with_slot(ty, Slot::Filled(Err(error)))
    }

    pub fn chain() -> Self {
        Self::ready(Payload::Chain)
    }

    fn with_slot(ty: Type, slot: Slot) -> Self {
        Self {
            inner: Arc::new(Inner {
                ty,
                slot: Mutex::new(slot),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ty(&self) -> &Type {
        &self.inner.ty
    }

    pub fn state(&self) -> State {
        match &*self.lock() {
            Slot::Unfilled(_) => State::Pending,
            Slot::Filled(Ok(_)) => State::Ready,
            Slot::Filled(Err(_)) => State::Failed,
        }
    }

    /// The outcome, if the value has settled.
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.lock() {
            Slot::Unfilled(_) => None,
            Slot::Filled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn payload(&self) -> Option<Payload> {
        self.outcome().and_then(Result::ok)
    }

    pub fn error(&self) -> Option<Error> {
        self.outcome().and_then(Result::err)
    }

    /// Fill the cell and run every continuation registered so far.
    ///
    /// A cell settles at most once; later attempts are dropped and the first
    /// outcome stands.
    pub(crate) fn settle(&self, outcome: Outcome) {
        let continuations = {
            let mut lock = self.lock();
            match &*lock {
                Slot::Filled(_) => {
                    tracing::error!(
                        ty = %self.inner.ty,
                        "value settled twice; keeping first outcome"
                    );
                    return;
                }
                Slot::Unfilled(_) => {}
            }
            let Slot::Unfilled(continuations) =
                core::mem::replace(&mut *lock, Slot::Filled(outcome.clone()))
            else {
                unreachable!()
            };
            continuations
        };
        for continuation in continuations {
            stacker::maybe_grow(32 * 1024, 1024 * 1024, || continuation(&outcome));
        }
    }

    pub(crate) fn set_payload(&self, payload: Payload) {
        self.settle(Ok(payload))
    }

    pub(crate) fn set_error(&self, error: Error) {
        self.settle(Err(error))
    }

    /// Run `f` once the value settles. If it already has, `f` runs right away
    /// on the calling thread.
    pub fn on_settled(&self, f: impl FnOnce(&Outcome) + Send + 'static) {
        let mut lock = self.lock();
        match &mut *lock {
            Slot::Unfilled(continuations) => continuations.push(Box::new(f)),
            Slot::Filled(outcome) => {
                let outcome = outcome.clone();
                drop(lock);
                f(&outcome);
            }
        }
    }

    /// Await settlement without holding a worker thread.
    pub fn settled(&self) -> impl Future<Output = Outcome> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        async move { rx.await.unwrap_or(Err(Error::Abandoned)) }
    }

    /// Settle `target` with whatever this value settles with.
    pub(crate) fn forward_to(&self, target: AsyncValue) {
        self.on_settled(move |outcome| target.settle(outcome.clone()));
    }
}

impl Debug for AsyncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.lock() {
            Slot::Unfilled(waiting) => write!(
                f,
                "AsyncValue<{}>(pending, {} waiting)",
                self.inner.ty,
                waiting.len()
            ),
            Slot::Filled(Ok(payload)) => write!(f, "AsyncValue<{}>({})", self.inner.ty, payload),
            Slot::Filled(Err(error)) => {
                write!(f, "AsyncValue<{}>(failed: {})", self.inner.ty, error)
            }
        }
    }
}

struct Join {
    remaining: AtomicUsize,
    callback: Mutex<Option<Box<dyn FnOnce(Result<(), Error>) + Send>>>,
}

impl Join {
    fn fire(&self, result: Result<(), Error>) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

/// Call `f` once every value in `values` is ready, or as soon as the first of
/// them fails. `f` runs exactly once.
pub(crate) fn when_all(
    values: &[AsyncValue],
    f: impl FnOnce(Result<(), Error>) + Send + 'static,
) {
    if values.is_empty() {
        f(Ok(()));
        return;
    }
    let join = Arc::new(Join {
        remaining: AtomicUsize::new(values.len()),
        callback: Mutex::new(Some(Box::new(f))),
    });
    for value in values {
        let join = join.clone();
        value.on_settled(move |outcome| match outcome {
            Err(error) => join.fire(Err(error.clone())),
            Ok(_) => {
                if join.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    join.fire(Ok(()));
                }
            }
        });
    }
}

/// Awaitable form of [`when_all`].
pub(crate) fn all_ready(
    values: &[AsyncValue],
) -> impl Future<Output = Result<(), Error>> + Send + 'static {
    let (tx, rx) = oneshot::channel();
    when_all(values, move |result| {
        let _ = tx.send(result);
    });
    async move { rx.await.unwrap_or(Err(Error::Abandoned)) }
}

/// Wait until every value has settled, failed or not.
pub(crate) async fn all_settled(values: &[AsyncValue]) -> Vec<Outcome> {
    join_all(values.iter().map(AsyncValue::settled)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn continuation_runs_once_after_settlement() {
        let value = AsyncValue::pending(Type::I32);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        {
            let calls = calls.clone();
            let seen = seen.clone();
            value.on_settled(move |outcome| {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some(outcome.clone());
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(value.state(), State::Pending);

        value.set_payload(Payload::I32(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), Some(Ok(Payload::I32(7))));

        value.set_payload(Payload::I32(8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(value.payload(), Some(Payload::I32(7)));
    }

    #[test]
    fn late_registration_runs_immediately() {
        let value = AsyncValue::failed(Type::I32, Error::DivideByZero);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        value.on_settled(move |outcome| {
            assert_eq!(outcome, &Err(Error::DivideByZero));
            flag.store(true, Ordering::SeqCst);
        });
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(value.state(), State::Failed);
    }

    #[test]
    fn when_all_waits_for_every_input() {
        let a = AsyncValue::pending(Type::Chain);
        let b = AsyncValue::pending(Type::Chain);
        let fired = Arc::new(Mutex::new(None));
        let sink = fired.clone();
        when_all(&[a.clone(), b.clone()], move |result| {
            *sink.lock().unwrap() = Some(result);
        });
        a.set_payload(Payload::Chain);
        assert!(fired.lock().unwrap().is_none());
        b.set_payload(Payload::Chain);
        assert_eq!(*fired.lock().unwrap(), Some(Ok(())));
    }

    #[test]
    fn when_all_fires_early_on_failure() {
        let a = AsyncValue::pending(Type::Chain);
        let b = AsyncValue::pending(Type::Chain);
        let count = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(Mutex::new(None));
        {
            let count = count.clone();
            let fired = fired.clone();
            when_all(&[a.clone(), b.clone()], move |result| {
                count.fetch_add(1, Ordering::SeqCst);
                *fired.lock().unwrap() = Some(result);
            });
        }
        b.set_error(Error::DivideByZero);
        assert_eq!(*fired.lock().unwrap(), Some(Err(Error::DivideByZero)));
        a.set_payload(Payload::Chain);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settled_resolves_after_fill() {
        let value = AsyncValue::pending(Type::I1);
        let waiter = value.settled();
        let producer = value.clone();
        tokio::spawn(async move { producer.set_payload(Payload::Bool(true)) });
        assert_eq!(waiter.await, Ok(Payload::Bool(true)));
    }

    #[tokio::test]
    async fn dropped_pending_value_is_abandoned() {
        let value = AsyncValue::pending(Type::I1);
        let waiter = value.settled();
        drop(value);
        assert_eq!(waiter.await, Err(Error::Abandoned));
    }

    #[tokio::test]
    async fn all_ready_reports_first_failure() {
        let a = AsyncValue::pending(Type::I32);
        let b = AsyncValue::failed(Type::I32, Error::DivideByZero);
        assert_eq!(all_ready(&[a.clone(), b]).await, Err(Error::DivideByZero));
        a.set_payload(Payload::I32(1));
        assert_eq!(all_ready(&[a]).await, Ok(()));
    }

    #[test]
    fn parses_literals() {
        assert_eq!(
            Payload::parse_literal(&Type::I1, "true"),
            Ok(Payload::Bool(true))
        );
        assert_eq!(
            Payload::parse_literal(&Type::I64, " -4 "),
            Ok(Payload::I64(-4))
        );
        assert!(Payload::parse_literal(&Type::I32, "x").is_err());
        assert!(Payload::parse_literal(&Type::Chain, "chain").is_err());
    }
}
