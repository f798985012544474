//! An asynchronous dataflow engine.
//!
//! Programs are tables of functions over single-assignment values. Every
//! operation runs as soon as the inputs it actually needs are ready, on a
//! pool of workers, and side effects are ordered only by explicit `chain`
//! tokens threaded between them.
//!
//! ```no_run
//! # async fn demo() -> miette::Result<()> {
//! use std::sync::Arc;
//! use hostflow::{encoding, runtime::Executor, spawn::TokioSpawn};
//!
//! let program = Arc::new(encoding::load("program.json".as_ref())?);
//! let executor = Executor::new(program, Arc::new(TokioSpawn::new()));
//! let execution = executor.run("main", vec![]).await?;
//! for outcome in &execution.outcomes {
//!     println!("{:?}", outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
pub mod encoding;
pub mod error;
pub mod program;
pub mod runtime;
pub mod spawn;
pub mod test_runner;

mod test;

pub use error::{Error, Result};
pub use program::{Program, ProgramBuilder};
pub use runtime::{Execution, Executor};
