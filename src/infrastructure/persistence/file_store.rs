//! File-backed signal store.
//!
//! One JSON file per record:
//!
//! ```text
//! <root>/signal/<strategy>/<symbol>.json     active namespace
//! <root>/schedule/<strategy>/<symbol>.json   scheduled namespace
//! ```
//!
//! Writes are atomic per record: serialize to a sibling temp file, fsync,
//! rename over the destination. A reader therefore always sees either the
//! previous complete record or the new one, never a torn write, and a write
//! that returned `Ok` survives a crash of the process.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::errors::EngineError;
use crate::domain::ports::SignalStore;
use crate::domain::signal::SignalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Active,
    Scheduled,
}

impl Namespace {
    fn dir(&self) -> &'static str {
        match self {
            Namespace::Active => "signal",
            Namespace::Scheduled => "schedule",
        }
    }
}

pub struct FileSignalStore {
    root: PathBuf,
}

impl FileSignalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, namespace: Namespace, strategy: &str, symbol: &str) -> PathBuf {
        self.root
            .join(namespace.dir())
            .join(strategy)
            .join(format!("{symbol}.json"))
    }

    async fn read(
        &self,
        namespace: Namespace,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError> {
        let path = self.record_path(namespace, strategy, symbol);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Persistence(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };
        let record: SignalRecord = serde_json::from_str(&raw).map_err(|e| {
            EngineError::Persistence(format!("parse {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    async fn write(
        &self,
        namespace: Namespace,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError> {
        let path = self.record_path(namespace, strategy, symbol);
        match record {
            Some(record) => {
                let parent = path.parent().expect("record path always has a parent");
                fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::Persistence(format!("mkdir {}: {e}", parent.display()))
                })?;
                let body = serde_json::to_vec_pretty(record).map_err(|e| {
                    EngineError::Persistence(format!("serialize {}: {e}", path.display()))
                })?;
                let tmp = path.with_extension("json.tmp");
                let mut file = fs::File::create(&tmp).await.map_err(|e| {
                    EngineError::Persistence(format!("create {}: {e}", tmp.display()))
                })?;
                file.write_all(&body).await.map_err(|e| {
                    EngineError::Persistence(format!("write {}: {e}", tmp.display()))
                })?;
                file.sync_all().await.map_err(|e| {
                    EngineError::Persistence(format!("fsync {}: {e}", tmp.display()))
                })?;
                drop(file);
                fs::rename(&tmp, &path).await.map_err(|e| {
                    EngineError::Persistence(format!("rename {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "persisted signal record");
                Ok(())
            }
            None => match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted signal record");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(EngineError::Persistence(format!(
                    "unlink {}: {e}",
                    path.display()
                ))),
            },
        }
    }
}

#[async_trait]
impl SignalStore for FileSignalStore {
    async fn read_active(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError> {
        self.read(Namespace::Active, strategy, symbol).await
    }

    async fn write_active(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError> {
        self.write(Namespace::Active, strategy, symbol, record).await
    }

    async fn read_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError> {
        self.read(Namespace::Scheduled, strategy, symbol).await
    }

    async fn write_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError> {
        self.write(Namespace::Scheduled, strategy, symbol, record).await
    }
}
