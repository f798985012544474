use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::runtime::Runtime;

use crate::console::Recording;
use crate::encoding;
use crate::program::Program;
use crate::runtime::value::{Outcome, Payload};
use crate::runtime::Executor;
use crate::spawn::TokioSpawn;

/// Functions whose name starts with this, and that take no parameters, are
/// tests.
pub const TEST_PREFIX: &str = "test_";

#[derive(Debug)]
pub enum TestStatus {
    Passed,
    /// Results that settled as `false`, by position.
    FailedAssertions(Vec<usize>),
    Failed(String),
    LoadError(String),
}

impl TestStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }
}

impl Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => f.write_str("ok"),
            TestStatus::FailedAssertions(positions) => {
                write!(f, "{} result(s) settled as false", positions.len())
            }
            TestStatus::Failed(reason) => write!(f, "error: {}", reason),
            TestStatus::LoadError(reason) => write!(f, "could not load: {}", reason),
        }
    }
}

#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    duration: Duration,
    pub status: TestStatus,
    output: Vec<String>,
}

/// Passed and failed counts over a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, results: &[TestResult]) {
        for result in results {
            if result.status.is_passed() {
                self.passed += 1;
            } else {
                self.failed += 1;
            }
        }
    }
}

/// Run the tests of `file`, or of every document in the current directory.
/// Returns whether all of them passed.
pub fn run_tests(file: Option<PathBuf>, filter: Option<String>, worker_threads: usize) -> bool {
    let files = file
        .map(|file| vec![file])
        .unwrap_or_else(|| find_test_files(Path::new(".")));
    if files.is_empty() {
        println!("{}", "nothing to test: no program documents here".yellow());
        return false;
    }

    let clock = Instant::now();
    let mut tally = Tally::default();
    for file in &files {
        let results = run_test_file(file, &filter, worker_threads);
        report_file(file, &results);
        tally.record(&results);
    }
    println!();
    report_tally(tally, clock.elapsed());
    tally.failed == 0
}

/// Program documents directly inside `dir`, sorted by path.
pub fn find_test_files(dir: &Path) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .collect();
    documents.sort();
    documents
}

/// Load `file` and run each of its tests on a fresh worker pool.
pub fn run_test_file(
    file: &Path,
    filter: &Option<String>,
    worker_threads: usize,
) -> Vec<TestResult> {
    let whole_file = |status| {
        vec![TestResult {
            name: file.display().to_string(),
            duration: Duration::default(),
            status,
            output: vec![],
        }]
    };

    let program = match encoding::load(file) {
        Ok(program) => Arc::new(program),
        Err(error) => {
            return whole_file(TestStatus::LoadError(format!(
                "{:?}",
                miette::Report::new(error)
            )))
        }
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            return whole_file(TestStatus::Failed(format!(
                "could not start the worker pool: {}",
                error
            )))
        }
    };

    let selected = |name: &str| {
        name.starts_with(TEST_PREFIX)
            && filter.as_deref().map_or(true, |f| name.contains(f))
    };
    let names: Vec<String> = program
        .functions()
        .map(|(name, _)| name.to_string())
        .filter(|name| selected(name))
        .collect();
    names
        .into_iter()
        .map(|name| test_single_function(&runtime, &program, name))
        .collect()
}

fn test_single_function(
    runtime: &Runtime,
    program: &Arc<Program>,
    test_name: String,
) -> TestResult {
    let clock = Instant::now();
    let console = Arc::new(Recording::new());

    let status = match program.signature(&test_name) {
        Some(signature) if !signature.params.is_empty() => {
            TestStatus::Failed(format!("test takes parameters: {}", signature))
        }
        _ => runtime.block_on(async {
            let executor = Executor::with_console(
                program.clone(),
                Arc::new(TokioSpawn::from_handle(runtime.handle().clone())),
                console.clone(),
            );
            match executor.run(&test_name, vec![]).await {
                Ok(execution) => judge(&execution.outcomes),
                Err(error) => TestStatus::Failed(error.to_string()),
            }
        }),
    };

    TestResult {
        duration: clock.elapsed(),
        name: test_name,
        status,
        output: console.lines(),
    }
}

/// A test passes when every result is ready and every boolean result is true.
fn judge(outcomes: &[Outcome]) -> TestStatus {
    let mut false_results = vec![];
    for (position, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Err(error) => {
                return TestStatus::Failed(format!("result {} failed: {}", position, error))
            }
            Ok(Payload::Bool(false)) => false_results.push(position),
            Ok(_) => {}
        }
    }
    if false_results.is_empty() {
        TestStatus::Passed
    } else {
        TestStatus::FailedAssertions(false_results)
    }
}

fn mark(passed: bool) -> colored::ColoredString {
    if passed {
        "✓".green()
    } else {
        "✗".red()
    }
}

fn report_file(file: &Path, results: &[TestResult]) {
    let label = file.display().to_string();
    let all_passed = results.iter().all(|r| r.status.is_passed());
    println!("{} {}", mark(all_passed), label.bold());

    for result in results {
        let passed = result.status.is_passed();
        println!(
            "  {} {} {}",
            mark(passed),
            result.name,
            format!("[{} ms]", result.duration.as_millis()).dimmed()
        );
        match &result.status {
            TestStatus::Passed => continue,
            TestStatus::FailedAssertions(positions) => {
                for position in positions {
                    println!("      result #{} is false", position);
                }
            }
            TestStatus::Failed(message) | TestStatus::LoadError(message) => {
                for line in message.lines() {
                    println!("      {}", line.red());
                }
            }
        }
        if !result.output.is_empty() {
            println!("      {}", "printed:".dimmed());
            for line in &result.output {
                println!("        {}", line.dimmed());
            }
        }
    }
}

fn report_tally(tally: Tally, elapsed: Duration) {
    let line = format!(
        "{} passed, {} failed in {:.2}s",
        tally.passed,
        tally.failed,
        elapsed.as_secs_f64()
    );
    if tally.failed == 0 {
        println!("{}", line.green());
    } else {
        println!("{}", line.red().bold());
    }
}
