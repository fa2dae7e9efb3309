//! Directory-structure summary handed to the model for orientation
//!
//! Lists every non-hidden entry, indented two spaces per level. The relevance
//! cap and dependency skip list do not apply here.

use std::fmt::Write;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Render the structure of `root` as an indented listing.
pub fn directory_structure(root: &Path) -> String {
    let mut structure = String::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker.flatten() {
        let indent = "  ".repeat(entry.depth() - 1);
        let name = entry.file_name().to_string_lossy();

        if entry.file_type().is_dir() {
            let _ = writeln!(structure, "{}{}/", indent, name);
        } else {
            let _ = writeln!(structure, "{}{}", indent, name);
        }
    }

    structure
}
