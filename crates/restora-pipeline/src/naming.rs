//! Sequential names for locally saved results.

use std::io;
use std::path::Path;

/// Digits in the sequence number.
const WIDTH: usize = 3;

/// The next free `{prefix}_{NNN}.{ext}` name in `dir`.
///
/// `NNN` is one more than the highest number already present, so gaps
/// left by deleted files are not reused. A missing or empty directory
/// yields `001`. Numbers wider than three digits keep all their digits.
///
/// # Errors
///
/// Returns the underlying error if `dir` exists but cannot be listed.
pub fn allocate_result_name(dir: &Path, prefix: &str, ext: &str) -> io::Result<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(format_name(prefix, 1, ext));
        }
        Err(e) => return Err(e),
    };

    let mut highest = 0_u64;
    for entry in entries {
        let name = entry?.file_name();
        if let Some(n) = name.to_str().and_then(|name| sequence_number(name, prefix, ext)) {
            highest = highest.max(n);
        }
    }
    Ok(format_name(prefix, highest.saturating_add(1), ext))
}

fn format_name(prefix: &str, n: u64, ext: &str) -> String {
    format!("{prefix}_{n:0width$}.{ext}", width = WIDTH)
}

fn sequence_number(name: &str, prefix: &str, ext: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn missing_directory_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let name = allocate_result_name(&dir.path().join("absent"), "testimg", "jpg").unwrap();
        assert_eq!(name, "testimg_001.jpg");
    }

    #[test]
    fn empty_directory_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(allocate_result_name(dir.path(), "testimg", "jpg").unwrap(), "testimg_001.jpg");
    }

    #[test]
    fn gaps_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "testimg_001.jpg");
        touch(dir.path(), "testimg_003.jpg");
        assert_eq!(allocate_result_name(dir.path(), "testimg", "jpg").unwrap(), "testimg_004.jpg");
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "testimg_009.png");
        touch(dir.path(), "other_005.jpg");
        touch(dir.path(), "testimg_abc.jpg");
        touch(dir.path(), "testimg_002.jpg");
        assert_eq!(allocate_result_name(dir.path(), "testimg", "jpg").unwrap(), "testimg_003.jpg");
    }

    #[test]
    fn wide_numbers_keep_their_digits() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "restored_999.json");
        assert_eq!(
            allocate_result_name(dir.path(), "restored", "json").unwrap(),
            "restored_1000.json"
        );
    }
}
