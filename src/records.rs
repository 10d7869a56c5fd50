use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::OrganizeError;
use crate::types::CandidateFile;

#[derive(Debug, Default)]
pub struct SourceListing {
    pub files: Vec<CandidateFile>,
    /// Entries that could not be inspected, with the reason.
    pub unreadable: Vec<(PathBuf, String)>,
    /// Symlinks whose target does not exist. Not regular files, so skipped.
    pub dangling: Vec<PathBuf>,
}

fn is_dangling_link(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
        && fs::metadata(path).is_err()
}

/// List regular files directly inside `source`, sorted by file name.
/// Subdirectories are not descended into.
pub fn collect_candidates(source: &Path) -> Result<SourceListing, OrganizeError> {
    if !source.is_dir() {
        return Err(OrganizeError::config(format!(
            "source {} is not a directory",
            source.display()
        )));
    }

    let mut listing = SourceListing::default();
    let walker = WalkDir::new(source)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source.to_path_buf());
                if is_dangling_link(&path) {
                    listing.dangling.push(path);
                } else {
                    listing.unreadable.push((path, err.to_string()));
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(meta) => listing
                .files
                .push(CandidateFile::new(entry.into_path(), meta.len())),
            Err(err) => listing
                .unreadable
                .push((entry.into_path(), err.to_string())),
        }
    }

    Ok(listing)
}
