//! src/backup/directory.rs
//! Content-addressed layout of a raw backup directory

use std::path::{Path, PathBuf};

/// On-disk location of file `file_id` inside `backup_root`.
///
/// Hashed ids live under a directory named after their first two characters;
/// ids shorter than that (or not ASCII) are looked up at the root.
#[must_use]
pub fn source_path(backup_root: &Path, file_id: &str) -> PathBuf {
    match file_id.get(..2) {
        Some(prefix) if file_id.len() > 2 && prefix.bytes().all(|b| b.is_ascii_hexdigit()) => {
            backup_root.join(prefix).join(file_id)
        }
        _ => backup_root.join(file_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_ids_use_prefix_directory() {
        assert_eq!(
            source_path(Path::new("b"), "3d0d7e5fb2ce288813306e4d4636395e047a3d28"),
            Path::new("b/3d/3d0d7e5fb2ce288813306e4d4636395e047a3d28")
        );
    }

    #[test]
    fn named_files_stay_at_root() {
        assert_eq!(source_path(Path::new("b"), "Manifest.db"), Path::new("b/Manifest.db"));
        assert_eq!(source_path(Path::new("b"), "ab"), Path::new("b/ab"));
    }
}
