//! Mount-point detection against the live mount table.
//!
//! The table is re-read on every query; nothing is cached between calls
//! because mounts come and go behind the plugin's back.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use justmount_common::defaults::DEFAULT_MOUNT_TABLE;

/// Index of the mount-point field in a mountinfo row.
const MOUNT_POINT_FIELD: usize = 4;

/// Reads mount-point facts from a proc-style mount table.
#[derive(Debug, Clone)]
pub struct MountTableReader {
    table: PathBuf,
}

impl Default for MountTableReader {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_TABLE)
    }
}

impl MountTableReader {
    /// Create a reader over the given mount table file.
    pub fn new(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Check whether `path` is currently a mount point.
    ///
    /// The mount table is authoritative. When it cannot be read, falls back
    /// to comparing the device of `path` with that of its parent, which
    /// cannot see bind mounts of the same device.
    pub fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        let cleaned = clean_path(path);

        match self.mount_points() {
            Ok(points) => Ok(points.iter().any(|p| clean_path(p) == cleaned)),
            Err(err) => {
                tracing::debug!(
                    table = %self.table.display(),
                    error = %err,
                    "Mount table unreadable, falling back to device comparison"
                );
                device_differs_from_parent(&cleaned)
            }
        }
    }

    /// All mount points listed in the table, unescaped.
    pub fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
        let data = fs::read(&self.table)?;
        Ok(parse_mount_points(&data))
    }
}

/// Parse the mount-point column out of mountinfo content.
///
/// Rows with fewer than five fields before the ` - ` separator are skipped.
#[must_use]
pub fn parse_mount_points(input: &[u8]) -> Vec<PathBuf> {
    input
        .split(|b| *b == b'\n')
        .filter_map(|line| {
            let left = split_optional_fields(line);
            left.split(u8::is_ascii_whitespace)
                .filter(|field| !field.is_empty())
                .nth(MOUNT_POINT_FIELD)
                .map(|field| PathBuf::from(OsString::from_vec(unescape_mount_field(field))))
        })
        .collect()
}

/// The part of a row before the ` - ` separator.
fn split_optional_fields(line: &[u8]) -> &[u8] {
    line.windows(3)
        .position(|w| w == b" - ")
        .map_or(line, |idx| &line[..idx])
}

/// Decode the `\ooo` octal escapes the kernel uses for space, tab, newline
/// and backslash.
#[must_use]
pub fn unescape_mount_field(value: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(value.len());
    let mut index = 0;

    while index < value.len() {
        if value[index] == b'\\' && index + 3 < value.len() {
            let digits = &value[index + 1..index + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let decoded = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(decoded) {
                    output.push(byte);
                    index += 4;
                    continue;
                }
            }
        }

        output.push(value[index]);
        index += 1;
    }

    output
}

/// Lexically normalise a path: drop `.` segments, resolve `..` against the
/// preceding segment, and collapse repeated separators.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(cleaned.components().next_back(), Some(Component::Normal(_)))
                    && cleaned.pop();
                if !popped && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

fn device_differs_from_parent(path: &Path) -> io::Result<bool> {
    let dev = fs::metadata(path)?.dev();
    let Some(parent) = path.parent() else {
        // The root directory is always a mount point.
        return Ok(true);
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    Ok(dev != fs::metadata(parent)?.dev())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "36 25 0:32 / /var/lib/kubelet/plugins/justmount.csi.driver/vol/globalmount rw,relatime - fuse.glusterfs gluster:media rw
37 25 0:33 / /var/lib/kubelet/plugins/justmount.csi.driver/vol/globalmount\\040with\\040space rw,relatime - fuse.sshfs sshfs#host:/ rw
garbage line
";

    fn reader_with(content: &str) -> (tempfile::TempDir, MountTableReader) {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("mountinfo");
        fs::write(&table, content).unwrap();
        (dir, MountTableReader::new(table))
    }

    #[test]
    fn parses_mount_points_and_skips_short_rows() {
        let points = parse_mount_points(SAMPLE.as_bytes());
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[1],
            PathBuf::from("/var/lib/kubelet/plugins/justmount.csi.driver/vol/globalmount with space")
        );
    }

    #[test]
    fn matches_escaped_paths() {
        let (_dir, reader) = reader_with(SAMPLE);
        let base = "/var/lib/kubelet/plugins/justmount.csi.driver/vol";

        assert!(reader.is_mount_point(Path::new(&format!("{base}/globalmount"))).unwrap());
        assert!(
            reader
                .is_mount_point(Path::new(&format!("{base}/globalmount with space")))
                .unwrap()
        );
        assert!(!reader.is_mount_point(Path::new(&format!("{base}/other"))).unwrap());
    }

    #[test]
    fn query_path_is_cleaned() {
        let (_dir, reader) = reader_with("36 25 0:32 / /mnt/test rw,relatime - tmpfs tmpfs rw\n");
        assert!(reader.is_mount_point(Path::new("/mnt/./x/../test/")).unwrap());
        assert!(reader.is_mount_point(Path::new("//mnt//test")).unwrap());
        assert!(!reader.is_mount_point(Path::new("/mnt/test/sub")).unwrap());
    }

    #[test]
    fn table_is_reread_on_every_query() {
        let (dir, reader) = reader_with("");
        assert!(!reader.is_mount_point(Path::new("/mnt/late")).unwrap());

        fs::write(
            dir.path().join("mountinfo"),
            "40 25 0:40 / /mnt/late rw - tmpfs tmpfs rw\n",
        )
        .unwrap();
        assert!(reader.is_mount_point(Path::new("/mnt/late")).unwrap());
    }

    #[test]
    fn falls_back_to_device_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let reader = MountTableReader::new(dir.path().join("missing-mountinfo"));

        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        assert!(!reader.is_mount_point(&sub).unwrap());
        assert!(reader.is_mount_point(Path::new("/")).unwrap());
        assert!(reader.is_mount_point(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn clean_path_rules() {
        assert_eq!(clean_path(Path::new("/a/b/../c/./d/")), PathBuf::from("/a/c/d"));
        assert_eq!(clean_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(clean_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(clean_path(Path::new("")), PathBuf::from("."));
    }

    #[test]
    fn unescapes_known_sequences() {
        assert_eq!(unescape_mount_field(br"a\040b"), b"a b");
        assert_eq!(unescape_mount_field(br"a\011b\012c"), b"a\tb\nc");
        assert_eq!(unescape_mount_field(br"a\134b"), b"a\\b");
        assert_eq!(unescape_mount_field(br"trailing\04"), br"trailing\04");
        assert_eq!(unescape_mount_field(br"not\999octal"), br"not\999octal");
    }

    proptest! {
        #[test]
        fn plain_fields_are_untouched(s in "[a-zA-Z0-9/._-]{0,64}") {
            prop_assert_eq!(unescape_mount_field(s.as_bytes()), s.as_bytes());
        }

        #[test]
        fn escaped_mount_point_round_trips(name in "[a-z]{1,8}( [a-z]{1,8}){0,3}") {
            let escaped = name.replace(' ', "\\040");
            let row = format!("1 2 0:1 / /mnt/{escaped} rw - tmpfs tmpfs rw\n");
            let points = parse_mount_points(row.as_bytes());
            prop_assert_eq!(points, vec![PathBuf::from(format!("/mnt/{name}"))]);
        }
    }
}
