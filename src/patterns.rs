//! `logmine patterns` and `logmine clean`: inspect and reset pattern memory.

use anyhow::Result;

use crate::config::Config;
use crate::memory::PatternMemory;

pub fn run_patterns(config: &Config, source: Option<&str>) -> Result<()> {
    let sources = PatternMemory::sources(&config.memory.path)?;
    let selected: Vec<_> = sources
        .iter()
        .filter(|(key, _)| source.map_or(true, |s| key.as_str() == s))
        .collect();

    if selected.is_empty() {
        match source {
            Some(s) => println!("No remembered patterns for '{}'.", s),
            None => println!("No remembered patterns."),
        }
        return Ok(());
    }

    for (key, templates) in selected {
        println!("{} ({} patterns)", key, templates.len());
        for template in templates {
            println!("  {}  [{} groups]", template, template.arity());
        }
    }
    Ok(())
}

pub fn run_clean(config: &Config) -> Result<()> {
    if PatternMemory::clean(&config.memory.path)? {
        println!("Removed {}", config.memory.path.display());
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}
