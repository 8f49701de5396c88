use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::Result;
use crate::edgar::tickers::FilingMetadata;

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Where the workbook for `document` goes inside `output_dir`.
pub fn output_path(output_dir: &Path, metadata: &FilingMetadata, document: &str) -> PathBuf {
    output_dir.join(metadata.file_name(document))
}

/// Suffix `_1`, `_2`, ... onto paths already taken earlier in the list, so
/// entries that share a name do not overwrite each other.
pub fn distinct_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut taken: HashSet<PathBuf> = HashSet::with_capacity(paths.len());
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let mut candidate = path.clone();
        let mut n = 1;
        while taken.contains(&candidate) {
            let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            let name = match path.extension() {
                Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
                None => format!("{}_{}", stem, n),
            };
            candidate = path.with_file_name(name);
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_created_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/output");
        ensure_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(
            output_path(&out, &FilingMetadata::default(), "filings/acme-20250630.htm"),
            out.join("acme-20250630.xlsx")
        );
    }

    #[test]
    fn test_same_named_documents_get_distinct_outputs() {
        let out = Path::new("out");
        let paths: Vec<PathBuf> = ["a/x.htm", "b/x.htm", "c/y.htm", "d/x.htm"]
            .iter()
            .map(|doc| output_path(out, &FilingMetadata::default(), doc))
            .collect();
        assert_eq!(
            distinct_paths(paths),
            vec![
                out.join("x.xlsx"),
                out.join("x_1.xlsx"),
                out.join("y.xlsx"),
                out.join("x_2.xlsx")
            ]
        );
    }
}
