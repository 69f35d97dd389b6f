use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{now_millis, Node, Result, Soul};

/// Name of the index file inside the storage directory.
pub const INDEX_FILE: &str = "index.json";

const NODE_EXT: &str = "json";
const TMP_SUFFIX: &str = ".tmp";

/// Where a node lives on disk and how large it was when last written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Soul the entry describes. Stored as the map key, not inside the entry.
    #[serde(skip)]
    pub soul: Soul,
    /// File name relative to the storage directory.
    #[serde(rename = "file")]
    pub file_name: String,
    /// Size of the node file in bytes.
    #[serde(default)]
    pub size: u64,
    /// First write, milliseconds since the epoch.
    #[serde(rename = "created", default)]
    pub created_at: u64,
    /// Latest write, milliseconds since the epoch.
    #[serde(rename = "updated", default)]
    pub updated_at: u64,
}

impl IndexEntry {
    /// Fresh entry for a soul that has never been written.
    pub fn new(soul: impl Into<Soul>) -> Self {
        let soul = soul.into();
        let now = now_millis();
        Self {
            file_name: sanitize_file_name(&soul),
            soul,
            size: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Soul-keyed index of every node ever written.
pub type IndexMap = BTreeMap<Soul, IndexEntry>;

/// Sum of recorded node sizes.
pub fn total_size(index: &IndexMap) -> u64 {
    index.values().map(|e| e.size).sum()
}

/// Maps a soul to its node file name: every character outside
/// `[A-Za-z0-9]` becomes `_`, then `.json` is appended.
///
/// The mapping is not injective; `a#b` and `a$b` share `a_b.json`.
pub fn sanitize_file_name(soul: &str) -> String {
    let mut name: String = soul
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    name.push('.');
    name.push_str(NODE_EXT);
    name
}

/// The on-disk half of the store: `index.json` plus one file per node.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    /// Store rooted at the storage directory `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `index.json`.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Path of the file `entry` points at.
    pub fn node_path(&self, entry: &IndexEntry) -> PathBuf {
        self.dir.join(&entry.file_name)
    }

    /// Creates the storage directory and its parents.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Reads the index. A missing or unreadable index yields an empty map;
    /// the failure is logged and never propagated.
    pub fn load(&self) -> IndexMap {
        match self.try_load() {
            Ok(Some(index)) => index,
            Ok(None) => {
                debug!(path = %self.index_path().display(), "store.index.absent");
                IndexMap::new()
            }
            Err(err) => {
                warn!(
                    path = %self.index_path().display(),
                    error = %err,
                    "store.index.unreadable"
                );
                IndexMap::new()
            }
        }
    }

    /// Reads the index, distinguishing "absent" from "corrupt".
    pub fn try_load(&self) -> Result<Option<IndexMap>> {
        let bytes = match fs::read(self.index_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut index: IndexMap = serde_json::from_slice(&bytes)?;
        for (soul, entry) in index.iter_mut() {
            entry.soul.clone_from(soul);
        }
        Ok(Some(index))
    }

    /// Rewrites the whole index through a temp file and rename.
    pub fn save(&self, index: &IndexMap) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes)?;
        debug!(entries = index.len(), bytes = bytes.len(), "store.index.saved");
        Ok(())
    }

    /// Writes a node file and returns its size in bytes.
    pub fn write_node(&self, file_name: &str, node: &Node) -> Result<u64> {
        let bytes = node.to_file_bytes()?;
        write_atomic(&self.dir.join(file_name), &bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Reads the node file `entry` points at.
    pub fn read_node(&self, entry: &IndexEntry) -> Result<Node> {
        let bytes = fs::read(self.node_path(entry))?;
        Node::from_file_bytes(&bytes)
    }

    /// Node files present in the storage directory, excluding the index and
    /// temp files.
    pub fn node_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };
        for entry in read_dir {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_node = path.extension().and_then(|e| e.to_str()) == Some(NODE_EXT)
                && path.file_name().and_then(|n| n.to_str()) != Some(INDEX_FILE);
            if is_node {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Reconstructs an index by reading the soul out of every node file.
    ///
    /// Unparsable files are skipped with a warning. When two files claim the
    /// same soul, the most recently modified one wins.
    pub fn rebuild(&self) -> Result<IndexMap> {
        let mut index = IndexMap::new();
        for path in self.node_files()? {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "store.rebuild.read_failed");
                    continue;
                }
            };
            let node = match Node::from_file_bytes(&bytes) {
                Ok(node) => node,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "store.rebuild.parse_failed");
                    continue;
                }
            };
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let modified = modified_millis(&path).unwrap_or_else(now_millis);
            let entry = IndexEntry {
                soul: node.soul().to_string(),
                file_name: file_name.to_string(),
                size: bytes.len() as u64,
                created_at: modified,
                updated_at: modified,
            };
            match index.get(node.soul()) {
                Some(existing) if existing.updated_at > entry.updated_at => {}
                _ => {
                    index.insert(entry.soul.clone(), entry);
                }
            }
        }
        info!(
            dir = %self.dir.display(),
            entries = index.len(),
            "store.rebuild.complete"
        );
        Ok(index)
    }
}

/// Writes `bytes` to `<path>.tmp`, syncs, then renames over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp_name);
    {
        let mut file: File = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn modified_millis(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let ms = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    Some(ms.min(u128::from(u64::MAX)) as u64)
}
