use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;

/// Compile a shell style wildcard pattern (* and ?) into an anchored
/// regular expression matching complete file names
pub fn pattern_to_regex(pattern: &str) -> anyhow::Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                expr.push('\\');
                expr.push(c);
            }
            c => expr.push(c),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("Invalid input file pattern {}", pattern))
}

/// Collect the plain files in dir whose names match reg.  The result is
/// sorted by name so that job order is deterministic.
pub fn find_files(dir: &Path, reg: &Regex) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for f in dir
        .read_dir()
        .with_context(|| format!("Error checking input directory {}", dir.display()))?
    {
        let entry =
            f.with_context(|| format!("Could not get directory entry from {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if reg.is_match(name) {
                trace!("Adding input file {}", path.display());
                files.push(path)
            }
        }
    }
    files.sort_unstable();
    Ok(files)
}
