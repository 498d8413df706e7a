use tar::{Builder, EntryType, Header};
use tracing::debug;

use super::error::{Result, StackError};
use super::orchestrator::Orchestrator;

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Split an absolute container path into its components.
fn components(path: &str) -> Result<Vec<&str>> {
    let invalid = |reason| StackError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    let rel = path.strip_prefix('/').ok_or_else(|| invalid("must be absolute"))?;
    if rel.ends_with('/') {
        return Err(invalid("must name a file"));
    }
    let parts: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(invalid("must name a file"));
    }
    if parts.iter().any(|p| *p == ".." || *p == ".") {
        return Err(invalid("must not contain relative segments"));
    }
    Ok(parts)
}

fn header(kind: EntryType, mode: u32, size: u64) -> Header {
    let mut h = Header::new_gnu();
    h.set_entry_type(kind);
    h.set_mode(mode);
    h.set_size(size);
    h.set_mtime(0);
    h.set_uid(0);
    h.set_gid(0);
    h
}

/// Build a tar stream that places `data` at `path` when extracted at `/`.
///
/// Every parent directory gets its own entry, root first, so extraction
/// behaves like `mkdir -p`. Output is byte-for-byte stable for equal input.
pub fn build_archive(path: &str, data: &[u8]) -> Result<Vec<u8>> {
    let parts = components(path)?;
    let (file, dirs) = parts.split_last().ok_or_else(|| StackError::InvalidPath {
        path: path.to_string(),
        reason: "must name a file",
    })?;

    let mut builder = Builder::new(Vec::new());
    let mut cur = String::new();
    for dir in dirs {
        if !cur.is_empty() {
            cur.push('/');
        }
        cur.push_str(dir);
        let mut h = header(EntryType::Directory, DIR_MODE, 0);
        builder.append_data(&mut h, format!("{cur}/"), std::io::empty())?;
    }

    let full = if cur.is_empty() {
        file.to_string()
    } else {
        format!("{cur}/{file}")
    };
    let mut h = header(EntryType::Regular, FILE_MODE, data.len() as u64);
    builder.append_data(&mut h, full, data)?;

    Ok(builder.into_inner()?)
}

impl Orchestrator {
    /// Place a single file into a created (not necessarily started)
    /// container. The path is checked before the daemon is contacted.
    pub fn inject(&self, container: &str, path: &str, data: &[u8]) -> Result<()> {
        let archive = build_archive(path, data)?;
        debug!(container, path, bytes = data.len(), "injecting file");
        self.daemon
            .copy_archive(container, "/", &archive)
            .map_err(|source| StackError::Copy {
                container: container.to_string(),
                source,
            })
    }
}
