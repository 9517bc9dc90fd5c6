//! Work enumeration: turns the operator's inputs into the run's [`WorkItem`]s.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BatchError, Result};

/// One input file processed in a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkItem {
    /// Base name without extension, e.g. `Drawing1`.
    pub identity: String,
    pub path: PathBuf,
}

impl WorkItem {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let identity = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                BatchError::InvalidInput(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        Ok(Self { identity, path })
    }

    /// File name including extension, e.g. `Drawing1.dwg`.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.identity)
    }
}

/// Lists the work items named by `inputs`.
///
/// Files are taken as given; directories are scanned one level deep for files whose
/// extension matches one of `extensions` (case-insensitive). The result is sorted by
/// path and contains each path once.
pub fn enumerate(inputs: &[PathBuf], extensions: &[String]) -> Result<Vec<WorkItem>> {
    let mut paths = BTreeSet::new();

    for input in inputs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && has_extension(&path, extensions) {
                    paths.insert(path);
                }
            }
        } else if input.is_file() {
            paths.insert(input.clone());
        } else {
            return Err(BatchError::InvalidInput(format!(
                "{} does not exist",
                input.display()
            )));
        }
    }

    if paths.is_empty() {
        return Err(BatchError::NoWork(extensions.join(", ")));
    }

    let items = paths
        .into_iter()
        .map(WorkItem::from_path)
        .collect::<Result<Vec<_>>>()?;
    debug!(count = items.len(), "enumerated work items");
    Ok(items)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn identity_is_file_stem() {
        let item = WorkItem::from_path("/plans/Level 2.Rev-A.dwg").unwrap();
        assert_eq!(item.identity, "Level 2.Rev-A");
        assert_eq!(item.file_name(), "Level 2.Rev-A.dwg");
    }

    #[test]
    fn directory_scan_filters_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "B.dwg");
        touch(dir.path(), "A.DWG");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested.dwg")).unwrap();

        let items = enumerate(&[dir.path().to_path_buf()], &["dwg".to_string()]).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.identity.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn explicit_files_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "Drawing1.dwg");

        let items = enumerate(
            &[file.clone(), dir.path().to_path_buf()],
            &[".dwg".to_string()],
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, file);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");
        let err = enumerate(&[dir.path().to_path_buf()], &["dwg".to_string()]).unwrap_err();
        assert!(matches!(err, BatchError::NoWork(_)));
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = enumerate(&[PathBuf::from("/no/such/place.dwg")], &[]).unwrap_err();
        assert!(matches!(err, BatchError::InvalidInput(_)));
    }
}
