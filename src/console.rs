//! Where `print` operations write to.

use std::sync::{Mutex, PoisonError};

pub trait Console: Send + Sync {
    fn print(&self, line: &str);
}

/// Writes each line to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stdout;

impl Console for Stdout {
    fn print(&self, line: &str) {
        println!("{}", line);
    }
}

/// Keeps every printed line in memory, in the order the prints ran.
#[derive(Debug, Default)]
pub struct Recording {
    lines: Mutex<Vec<String>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for Recording {
    fn print(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }
}
