//! Input expansion.
//!
//! Each `run` argument is a file, a directory (walked recursively), a glob
//! pattern, or `-` for stdin. Expansion happens up front so an unreadable
//! or missing input fails the run before any line is consumed.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSetBuilder};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One concrete input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '[', '{'])
}

/// Directory to walk for a glob: its components up to the first one
/// containing a metacharacter.
fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        if let Component::Normal(part) = component {
            if is_glob(&part.to_string_lossy()) {
                break;
            }
        }
        base.push(component);
    }
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Expand `args` into concrete inputs, in argument order.
pub fn expand_inputs(args: &[String]) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();

    for arg in args {
        if arg == "-" {
            inputs.push(Input::Stdin);
            continue;
        }

        let path = Path::new(arg);
        if path.is_file() {
            inputs.push(Input::File(path.to_path_buf()));
        } else if path.is_dir() {
            inputs.extend(walk_files(path)?.into_iter().map(Input::File));
        } else if is_glob(arg) {
            let matcher = GlobSetBuilder::new()
                .add(Glob::new(arg).with_context(|| format!("Invalid glob: {}", arg))?)
                .build()?;
            let base = glob_base(arg);
            let matched: Vec<PathBuf> = if base.is_dir() {
                walk_files(&base)?
                    .into_iter()
                    .filter(|p| {
                        // WalkDir yields "./x" for base "."; patterns rarely spell it.
                        let stripped = p.strip_prefix(".").unwrap_or(p);
                        matcher.is_match(p) || matcher.is_match(stripped)
                    })
                    .collect()
            } else {
                Vec::new()
            };
            if matched.is_empty() {
                bail!("No input files match: {}", arg);
            }
            inputs.extend(matched.into_iter().map(Input::File));
        } else {
            bail!("Input not found: {}", arg);
        }
    }

    if inputs.is_empty() {
        bail!("No input files");
    }
    Ok(inputs)
}

/// Open every input for line reading.
pub fn open_inputs(inputs: &[Input]) -> Result<Vec<Box<dyn BufRead + Send>>> {
    inputs
        .iter()
        .map(|input| -> Result<Box<dyn BufRead + Send>> {
            match input {
                Input::Stdin => Ok(Box::new(BufReader::new(std::io::stdin()))),
                Input::File(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("Failed to open input: {}", path.display()))?;
                    Ok(Box::new(BufReader::new(file)))
                }
            }
        })
        .collect()
}

/// The pattern memory key of a run: its arguments joined by `,`.
pub fn source_key(args: &[String]) -> String {
    args.join(",")
}
