//! Local staging directory management
//!
//! Decompressed export files live in a staging directory for the duration of
//! one dataset's cycle. The directory is drained before a run (leftovers of a
//! crashed run) and after every successful ingestion, so nothing leaks into
//! the next dataset.

use crate::error::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Regular files directly inside `path`, sorted by file name.
///
/// Symlinks are followed; a link to a file counts as a file, a dangling link
/// is ignored.
pub fn list_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file() {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

/// Delete every regular file directly inside `path`.
///
/// Sub-directories and their contents are left alone. Returns the number of
/// files removed.
pub fn clear_directory(path: &Path) -> Result<usize> {
    let files = list_files(path)?;
    for file in &files {
        std::fs::remove_file(file)?;
        debug!(file = %file.display(), "Removed staged file");
    }
    Ok(files.len())
}

/// Copy the staged files of `job_type` to `backup_root/<job_type>/<date>/`.
///
/// Does nothing, and creates no directories, when the staging directory holds
/// no files. Returns the backup directory when something was copied.
pub fn backup(
    job_type: &str,
    staging_dir: &Path,
    backup_root: &Path,
    date: NaiveDate,
) -> Result<Option<PathBuf>> {
    let files = list_files(staging_dir)?;
    if files.is_empty() {
        debug!(job_type, "Nothing staged, skipping backup");
        return Ok(None);
    }

    let destination = backup_root
        .join(job_type)
        .join(date.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&destination)?;

    for file in &files {
        if let Some(name) = file.file_name() {
            std::fs::copy(file, destination.join(name))?;
        }
    }

    info!(
        job_type,
        files = files.len(),
        path = %destination.display(),
        "Backed up raw export"
    );
    Ok(Some(destination))
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_clear_directory_keeps_subdirectories() {
        let dir = staged(&[("a.json", "{}"), ("b.json", "{}")]);
        let nested = dir.path().join("2024-01-01_2024-01-31");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("c.json"), "{}").unwrap();

        assert_eq!(clear_directory(dir.path()).unwrap(), 2);

        assert!(list_files(dir.path()).unwrap().is_empty());
        assert!(nested.join("c.json").exists());
    }

    #[test]
    fn test_clear_directory_is_idempotent() {
        let dir = staged(&[("a.json", "{}")]);

        assert_eq!(clear_directory(dir.path()).unwrap(), 1);
        assert_eq!(clear_directory(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_clear_directory_missing_path_errors() {
        let dir = TempDir::new().unwrap();
        assert!(clear_directory(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_backup_copies_into_dated_folder() {
        let staging = staged(&[("part-0.json", "line\n"), ("part-1.json", "other\n")]);
        let backup_root = TempDir::new().unwrap();

        let destination = backup("custom", staging.path(), backup_root.path(), date())
            .unwrap()
            .unwrap();

        assert_eq!(destination, backup_root.path().join("custom").join("2024-03-09"));
        assert_eq!(
            std::fs::read_to_string(destination.join("part-1.json")).unwrap(),
            "other\n"
        );
        // staging is untouched by a backup
        assert_eq!(list_files(staging.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_backup_of_empty_staging_creates_nothing() {
        let staging = TempDir::new().unwrap();
        let backup_root = TempDir::new().unwrap();

        let result = backup("appStart", staging.path(), backup_root.path(), date()).unwrap();

        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(backup_root.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_files_follows_symlinks() {
        let dir = staged(&[("a.json", "{}")]);
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("linked.json"), "{}").unwrap();
        std::fs::create_dir(outside.path().join("sub")).unwrap();

        std::os::unix::fs::symlink(outside.path().join("linked.json"), dir.path().join("b.json"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("sub"), dir.path().join("c"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.json"), dir.path().join("d.json"))
            .unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.json"), dir.path().join("b.json")]);

        // clearing removes the link, not its target
        assert_eq!(clear_directory(dir.path()).unwrap(), 2);
        assert!(outside.path().join("linked.json").exists());
    }

    #[test]
    fn test_list_files_sorted() {
        let dir = staged(&[("b", ""), ("a", ""), ("c", "")]);
        let names: Vec<_> = list_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/data"), PathBuf::from("/var/data"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/exports"), home.join("exports"));
        }
    }
}
