//! Filesystem-backed tier stores.
//!
//! Layout:
//!
//! ```text
//! <primary root>/<partition dir>/<id>.json
//! <archive root>/<container>/<id>.json
//! ```
//!
//! The partition dir is the partition key, with a leading `.` and any `%`,
//! `/`, `\` or NUL escaped as `%XX`.
//!
//! Every write goes to a temporary sibling file first and is renamed into
//! place, so readers never observe a half-written record or blob. A missing
//! root directory is reported as `StorageError::Unavailable`, never as a
//! missing record.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, instrument};

use crate::codec::{self, EXTENSION};
use crate::error::StorageError;
use crate::key::RecordKey;
use crate::record::Record;
use crate::traits::{ArchiveStore, PrimaryStore, PutStatus, RecordStream};

/// Default archive container name.
pub const DEFAULT_CONTAINER: &str = "archived-records";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{EXTENSION}.tmp{}-{n}", std::process::id()));
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

async fn ensure_root(root: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(root).await.map_err(|e| {
        StorageError::Unavailable(format!("cannot create {}: {e}", root.display()))
    })
}

/// Map an I/O error on a record path. A missing file is a missing record
/// only while the root itself is still present.
async fn classify(root: &Path, id: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        if fs::try_exists(root).await.unwrap_or(false) {
            StorageError::not_found(id)
        } else {
            StorageError::Unavailable(format!("{} is missing", root.display()))
        }
    } else {
        StorageError::Backend(format!("{id}: {err}"))
    }
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("corrupt record file {}: {err}", path.display()))
}

// ── Primary ──────────────────────────────────────────────────────────────────

/// Primary tier stored as one JSON file per record, grouped by partition.
#[derive(Debug, Clone)]
pub struct FsPrimary {
    root: PathBuf,
}

impl FsPrimary {
    /// Open (creating if needed) a primary store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        ensure_root(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &RecordKey) -> Result<PathBuf, StorageError> {
        codec::validate_id(&key.id)?;
        Ok(self
            .root
            .join(partition_dir(&key.partition_key))
            .join(codec::blob_name(&key.id)))
    }
}

/// Directory name for a partition key.
///
/// Keys are not ids: a prefix policy turns `"..x"` into `".."`. A leading
/// dot, `%`, path separators and NUL are written as `%XX` so every key gets
/// its own plain directory under the root. The empty key maps to `"%"`,
/// which no escape sequence produces.
fn partition_dir(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(key.len());
    for (i, c) in key.char_indices() {
        let escape = matches!(c, '%' | '/' | '\\' | '\0') || (i == 0 && c == '.');
        if escape {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

async fn read_record(path: &Path) -> io::Result<Result<Record, StorageError>> {
    let bytes = fs::read(path).await?;
    Ok(codec::decode(&bytes).map_err(|e| corrupt(path, e)))
}

/// Cursor over `<root>/<partition>/<id>.json`, one directory at a time.
struct Walk {
    cutoff: OffsetDateTime,
    partitions: fs::ReadDir,
    files: Option<fs::ReadDir>,
    done: bool,
}

impl Walk {
    async fn next_record(&mut self) -> Option<Result<Record, StorageError>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(files) = self.files.as_mut() {
                match files.next_entry().await {
                    Ok(Some(entry)) => {
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                            continue;
                        }
                        match read_record(&path).await {
                            Ok(Ok(r)) if r.is_eligible(self.cutoff) => return Some(Ok(r)),
                            Ok(Ok(_)) => continue,
                            Ok(Err(e)) => return Some(Err(e)),
                            // deleted between listing and reading
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Some(Err(corrupt(&path, e))),
                        }
                    }
                    Ok(None) => self.files = None,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(StorageError::Backend(e.to_string())));
                    }
                }
                continue;
            }
            match self.partitions.next_entry().await {
                Ok(Some(entry)) => {
                    if !matches!(entry.file_type().await, Ok(ft) if ft.is_dir()) {
                        continue;
                    }
                    match fs::read_dir(entry.path()).await {
                        Ok(rd) => self.files = Some(rd),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(StorageError::Backend(e.to_string())));
                        }
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    self.done = true;
                    return Some(Err(StorageError::Backend(e.to_string())));
                }
            }
        }
    }
}

#[async_trait]
impl PrimaryStore for FsPrimary {
    #[instrument(skip(self), fields(root = %self.root.display(), cutoff = %cutoff))]
    async fn query_eligible(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<RecordStream<'_>, StorageError> {
        let partitions = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.root.display())))?;
        let walk = Walk {
            cutoff,
            partitions,
            files: None,
            done: false,
        };
        Ok(Box::pin(stream::unfold(walk, |mut walk| async move {
            walk.next_record().await.map(|item| (item, walk))
        })))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError> {
        let path = self.path_for(key)?;
        match read_record(&path).await {
            Ok(record) => record,
            Err(e) => Err(classify(&self.root, &key.id, e).await),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) => Err(classify(&self.root, &key.id, e).await),
        }
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn upsert(&self, record: Record) -> Result<(), StorageError> {
        let path = self.path_for(&record.key())?;
        let bytes = codec::encode(&record).map_err(|e| StorageError::Backend(e.to_string()))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("{}: {e}", record.id)))
    }
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// Archive tier stored as one `<id>.json` blob per record in a container
/// directory.
#[derive(Debug, Clone)]
pub struct FsArchive {
    dir: PathBuf,
}

impl FsArchive {
    /// Open (creating if needed) `<root>/<container>`.
    pub async fn open(root: impl AsRef<Path>, container: &str) -> Result<Self, StorageError> {
        codec::validate_id(container).map_err(|_| StorageError::InvalidId {
            id: container.to_string(),
            reason: "unusable container name".into(),
        })?;
        let dir = root.as_ref().join(container);
        ensure_root(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        codec::validate_id(id)?;
        Ok(self.dir.join(codec::blob_name(id)))
    }
}

#[async_trait]
impl ArchiveStore for FsArchive {
    #[instrument(skip(self, bytes), fields(dir = %self.dir.display(), len = bytes.len()))]
    async fn put(
        &self,
        id: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<PutStatus, StorageError> {
        let path = self.path_for(id)?;
        match fs::read(&path).await {
            Ok(existing) if existing == bytes => return Ok(PutStatus::Unchanged),
            Ok(_) if !overwrite => {
                return Err(StorageError::AlreadyExists { id: id.to_string() })
            }
            Ok(_) => debug!(id = %id, "replacing archived blob"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(classify(&self.dir, id, e).await),
        }
        match write_atomic(&path, bytes).await {
            Ok(()) => Ok(PutStatus::Written),
            Err(e) => Err(classify(&self.dir, id, e).await),
        }
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(classify(&self.dir, id, e).await),
        }
    }
}
