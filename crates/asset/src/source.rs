//! Where asset bytes come from.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::task::Poll;

use futures::future::{self, LocalBoxFuture};

use crate::error::{AssetError, AssetResult};

/// Byte counters reported while a fetch is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchProgress {
    pub loaded: u64,
    /// `None` when the transport does not announce a length.
    pub total: Option<u64>,
}

impl FetchProgress {
    /// Percentage in `[0, 100]`, if the total is known.
    pub fn percent(&self) -> Option<f32> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.loaded as f32 / total as f32 * 100.0).clamp(0.0, 100.0)),
            None => None,
        }
    }
}

pub trait AssetSource {
    /// Retrieve all bytes for `key`, calling `progress` as they arrive.
    fn fetch<'a>(
        &'a self,
        key: &'a str,
        progress: &'a dyn Fn(FetchProgress),
    ) -> LocalBoxFuture<'a, AssetResult<Vec<u8>>>;
}

/// Reads `root/key` from disk in chunks, yielding to the executor between
/// chunks so a large file does not starve other tasks.
#[derive(Clone, Debug)]
pub struct FileSource {
    root: PathBuf,
    chunk_size: usize,
}

impl FileSource {
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FileSource {
    fn fetch<'a>(
        &'a self,
        key: &'a str,
        progress: &'a dyn Fn(FetchProgress),
    ) -> LocalBoxFuture<'a, AssetResult<Vec<u8>>> {
        Box::pin(async move {
            let path = self.root.join(key);
            log::debug!("Reading asset {:?}", path);
            let mut file = File::open(&path)
                .map_err(|e| AssetError::fetch(key, format!("{}: {}", path.display(), e)))?;
            let total = file.metadata().ok().map(|m| m.len());

            let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
            let mut chunk = vec![0u8; self.chunk_size];
            loop {
                let n = file
                    .read(&mut chunk)
                    .map_err(|e| AssetError::fetch(key, format!("{}: {}", path.display(), e)))?;
                if n == 0 {
                    break;
                }
                bytes.extend_from_slice(&chunk[..n]);
                progress(FetchProgress {
                    loaded: bytes.len() as u64,
                    total,
                });
                yield_now().await;
            }
            Ok(bytes)
        })
    }
}

/// Serves blobs registered up front (built-in assets, tests).
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(key, bytes);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(key.into(), bytes.into());
    }
}

impl AssetSource for MemorySource {
    fn fetch<'a>(
        &'a self,
        key: &'a str,
        progress: &'a dyn Fn(FetchProgress),
    ) -> LocalBoxFuture<'a, AssetResult<Vec<u8>>> {
        Box::pin(async move {
            let bytes = self
                .blobs
                .get(key)
                .cloned()
                .ok_or_else(|| AssetError::fetch(key, "no such asset"))?;
            let len = bytes.len() as u64;
            progress(FetchProgress {
                loaded: len,
                total: Some(len),
            });
            Ok(bytes)
        })
    }
}

/// Returns `Pending` once after waking itself, so other tasks get a turn.
/// `futures` 0.3 ships no executor-agnostic yield helper.
async fn yield_now() {
    let mut yielded = false;
    future::poll_fn(|cx| {
        if yielded {
            return Poll::Ready(());
        }
        yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}
