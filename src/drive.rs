//! Drive label resolution
//!
//! Reflections usually live on removable drives. A record remembers the
//! drive's label and the reflection's path relative to the mountpoint, so the
//! monitor can follow the drive wherever it is mounted next.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

pub trait DriveResolver: Send + Sync {
    /// Current mountpoint of the drive with this label, if mounted
    fn label_to_mount_point(&self, label: &str) -> Option<PathBuf>;

    /// Label of the drive holding `path` and the path relative to its mountpoint
    fn path_to_label(&self, path: &Path) -> Option<(String, PathBuf)>;
}

/// Pick the deepest mountpoint containing `path`
fn best_mount<'a, I>(mounts: I, path: &Path) -> Option<(String, PathBuf)>
where
    I: IntoIterator<Item = (&'a str, &'a Path)>,
{
    mounts
        .into_iter()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .and_then(|(label, mount)| {
            path.strip_prefix(mount)
                .ok()
                .map(|rel| (label.to_string(), rel.to_path_buf()))
        })
}

/// Resolver backed by `lsblk`
#[derive(Debug, Default, Clone)]
pub struct LsblkDriveResolver;

impl LsblkDriveResolver {
    /// (label, mountpoint) for every labelled, mounted block device
    fn mounts(&self) -> Vec<(String, PathBuf)> {
        let output = match Command::new("lsblk")
            .args(["--pairs", "--output", "LABEL,MOUNTPOINT"])
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(status = %output.status, "lsblk failed");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Could not run lsblk");
                return Vec::new();
            }
        };
        parse_lsblk(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `LABEL="..." MOUNTPOINT="..."` rows; rows missing either value are skipped
fn parse_lsblk(text: &str) -> Vec<(String, PathBuf)> {
    text.lines()
        .filter_map(|line| {
            let pairs = parse_pairs(line);
            let label = pairs.get("LABEL").filter(|l| !l.is_empty())?;
            let mount = pairs.get("MOUNTPOINT").filter(|m| m.starts_with('/'))?;
            Some((label.clone(), PathBuf::from(mount)))
        })
        .collect()
}

/// Split one `--pairs` row into its `KEY="value"` fields
fn parse_pairs(line: &str) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    let mut rest = line.trim();
    while let Some(eq) = rest.find("=\"") {
        let key = rest[..eq].trim().to_string();
        let value_start = &rest[eq + 2..];
        let Some(close) = value_start.find('"') else {
            break;
        };
        pairs.insert(key, unescape_lsblk(&value_start[..close]));
        rest = &value_start[close + 1..];
    }
    pairs
}

/// lsblk writes unsafe bytes as `\xNN`
fn unescape_lsblk(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') && i + 3 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl DriveResolver for LsblkDriveResolver {
    fn label_to_mount_point(&self, label: &str) -> Option<PathBuf> {
        self.mounts()
            .into_iter()
            .find(|(l, _)| l == label)
            .map(|(_, mount)| mount)
    }

    fn path_to_label(&self, path: &Path) -> Option<(String, PathBuf)> {
        let mounts = self.mounts();
        let found = best_mount(mounts.iter().map(|(l, m)| (l.as_str(), m.as_path())), path);
        debug!(path = %path.display(), label = ?found.as_ref().map(|(l, _)| l), "Resolved drive label");
        found
    }
}

/// Fixed label table, swappable at runtime; used in tests
#[derive(Debug, Default)]
pub struct StaticDriveResolver {
    mounts: parking_lot::RwLock<BTreeMap<String, PathBuf>>,
}

impl StaticDriveResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, label: impl Into<String>, mount_point: impl Into<PathBuf>) {
        self.mounts.write().insert(label.into(), mount_point.into());
    }

    pub fn unmount(&self, label: &str) {
        self.mounts.write().remove(label);
    }
}

impl DriveResolver for StaticDriveResolver {
    fn label_to_mount_point(&self, label: &str) -> Option<PathBuf> {
        self.mounts.read().get(label).cloned()
    }

    fn path_to_label(&self, path: &Path) -> Option<(String, PathBuf)> {
        let mounts = self.mounts.read();
        best_mount(mounts.iter().map(|(l, m)| (l.as_str(), m.as_path())), path)
    }
}
