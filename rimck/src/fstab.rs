// SPDX-License-Identifier: MIT

//! Minimal filesystem table support: `fstab(5)` style files, the kernel's
//! mount list and `/dev/disk/by-*` tag lookups.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rimck_core::TableEntry;
use rimck_core::catalog::{MountTable, SpecResolver};

pub const DEFAULT_FSTAB: &str = "/etc/fstab";
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Rows read from a table, plus the line numbers that did not parse.
#[derive(Debug, Default)]
pub struct Table {
    pub rows: Vec<TableEntry>,
    pub bad_lines: Vec<usize>,
}

/// Undoes the `\040` style octal escapes of mount table fields.
pub fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let oct = &field[i + 1..i + 4];
            if let Ok(v) = u8::from_str_radix(oct, 8) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse(content: &str) -> Table {
    let mut table = Table::default();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = line.split_whitespace().map(unescape).collect();
        let [source, target, rest @ ..] = fields.as_slice() else {
            table.bad_lines.push(n + 1);
            continue;
        };

        let mut row = TableEntry::new(source.as_str()).with_target(target.as_str());
        if let Some(fstype) = rest.first() {
            row = row.with_fstype(fstype.as_str());
        }
        if let Some(options) = rest.get(1) {
            row = row.with_options(options.as_str());
        }
        // rest[2] is the dump frequency
        match rest.get(3).map(|p| p.parse::<u32>()) {
            Some(Ok(passno)) => row = row.with_passno(passno),
            Some(Err(_)) => {
                table.bad_lines.push(n + 1);
                continue;
            }
            None => {}
        }
        table.rows.push(row);
    }
    table
}

/// Reads a table file. A missing file is an empty table.
pub fn load(path: &Path) -> io::Result<Table> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse(&content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Table::default()),
        Err(e) => Err(e),
    }
}

/// Resolves `LABEL=`, `UUID=`, `PARTLABEL=` and `PARTUUID=` through the
/// udev symlink directories, and canonicalizes plain paths.
#[derive(Debug, Clone)]
pub struct TagResolver {
    root: PathBuf,
}

impl Default for TagResolver {
    fn default() -> Self {
        Self::with_root("/dev/disk")
    }
}

impl TagResolver {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tag_dir(tag: &str) -> Option<&'static str> {
        match tag {
            "LABEL" => Some("by-label"),
            "UUID" => Some("by-uuid"),
            "PARTLABEL" => Some("by-partlabel"),
            "PARTUUID" => Some("by-partuuid"),
            _ => None,
        }
    }

    /// Whether `spec` is a tag this resolver understands.
    pub fn is_tag(spec: &str) -> bool {
        spec.split_once('=')
            .is_some_and(|(tag, _)| Self::tag_dir(tag).is_some())
    }
}

impl SpecResolver for TagResolver {
    fn resolve(&self, spec: &str) -> Option<String> {
        let path = match spec.split_once('=') {
            Some((tag, value)) => {
                let dir = Self::tag_dir(tag)?;
                let value = value.trim_matches('"');
                self.root.join(dir).join(value)
            }
            None if spec.starts_with('/') => PathBuf::from(spec),
            None => return None,
        };
        fs::canonicalize(path)
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// Snapshot of the mounted filesystems.
#[derive(Debug, Default, Clone)]
pub struct Mounts {
    sources: Vec<String>,
}

impl Mounts {
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_table(&parse(&content)))
    }

    pub fn from_table(table: &Table) -> Self {
        Self {
            sources: table.rows.iter().map(|r| r.source.clone()).collect(),
        }
    }
}

impl MountTable for Mounts {
    fn is_mounted(&self, source: &str, device: &str) -> bool {
        self.sources.iter().any(|s| s == source || s == device)
    }
}
