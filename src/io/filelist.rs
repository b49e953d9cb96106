use crate::types::{SarError, SarResult};
use std::path::Path;

/// Resolve the input file list from either a directory scan or an explicit list.
///
/// Exactly one of `dir` and `files` must be given. Directory entries (files
/// or product directories) are kept when their name ends with `ext`.
pub fn get_filelist(
    dir: Option<&Path>,
    files: Option<&[String]>,
    ext: Option<&str>,
) -> SarResult<Vec<String>> {
    match (dir, files) {
        (None, None) => Err(SarError::Configuration(
            "need to provide dir or files to build the file list".to_string(),
        )),
        (Some(_), Some(_)) => Err(SarError::Configuration(
            "choose between dir and files to build the file list".to_string(),
        )),
        (None, Some(files)) => Ok(files.to_vec()),
        (Some(dir), None) => {
            let ext = ext.unwrap_or("");
            let entries = std::fs::read_dir(dir).map_err(|e| {
                SarError::Configuration(format!("cannot list input dir {}: {}", dir.display(), e))
            })?;
            let mut list = Vec::new();
            for entry in entries {
                let path = entry?.path();
                let matches = path
                    .file_name()
                    .map(|n| n.to_string_lossy().ends_with(ext))
                    .unwrap_or(false);
                if matches {
                    list.push(path.to_string_lossy().into_owned());
                }
            }
            list.sort();
            Ok(list)
        }
    }
}

/// Create `dir` and its parents if missing
pub fn checkdir(dir: &Path) -> SarResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        SarError::Configuration(format!("cannot create directory {}: {}", dir.display(), e))
    })
}
