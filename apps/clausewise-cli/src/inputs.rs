use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use clausewise_core::config::expand_path;
use clausewise_core::loader::PlainTextLoader;

/// Command-line path argument with `~` and environment variables expanded.
pub fn parse_path(arg: &str) -> Result<PathBuf, String> {
    if arg.trim().is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok(expand_path(arg))
}

/// Files named on the command line plus every supported file found under
/// named directories, sorted and deduplicated.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(list_supported_files(path));
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}

fn list_supported_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && PlainTextLoader::supports(path))
        .collect()
}
