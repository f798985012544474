#![cfg(test)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::encoding;
use crate::test_runner::run_test_file;

/// Every `.json` file under `dir`, subdirectories included.
fn collect_documents(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_documents(&path, found)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            found.push(path);
        }
    }
    Ok(())
}

fn program_files() -> Vec<PathBuf> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs");
    let mut files = vec![];
    collect_documents(&root, &mut files).unwrap();
    files.sort();
    files
}

#[test]
fn test_all_files() -> Result<(), String> {
    let files = program_files();
    assert!(!files.is_empty(), "no program files under tests/programs");
    let mut result = Ok(());
    for file in files {
        let results = run_test_file(&file, &None, 4);
        if results.is_empty() {
            result = result.and(Err(format!("{} has no tests", file.display())));
        }
        for failed in results.iter().filter(|r| !r.status.is_passed()) {
            result = result.and(Err(format!(
                "{}: {} {}",
                file.display(),
                failed.name,
                failed.status
            )));
        }
    }
    result
}

#[test]
fn dump_reloads_every_file() -> Result<(), String> {
    for file in program_files() {
        let program = encoding::load(&file).map_err(|e| format!("{}: {}", file.display(), e))?;
        let text = encoding::to_string(&program);
        let reloaded = encoding::parse(&text).map_err(|e| format!("{}: {}", file.display(), e))?;
        assert_eq!(text, encoding::to_string(&reloaded), "{}", file.display());
    }
    Ok(())
}
