use std::{
    path::Path,
    time::{Duration, SystemTime},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::FetchError;

pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn modified(path: impl AsRef<Path>) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// A cache file is stale when it is missing or was last written more than `max_age` before `now`.
pub async fn is_stale_at(path: impl AsRef<Path>, max_age: Duration, now: SystemTime) -> bool {
    match modified(path).await {
        Some(mtime) => now
            .duration_since(mtime)
            .map(|age| age > max_age)
            .unwrap_or(false),
        None => true,
    }
}

pub async fn is_stale(path: impl AsRef<Path>, max_age: Duration) -> bool {
    is_stale_at(path, max_age, SystemTime::now()).await
}

pub async fn remove_if_exists(path: &Path) -> Result<bool, FetchError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FetchError::io(path, e)),
    }
}

pub async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| FetchError::io(path, e))
}

pub async fn read_bytes(path: &Path) -> Result<Vec<u8>, FetchError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| FetchError::io(path, e))
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FetchError> {
    let bytes = read_bytes(path).await?;
    serde_json::from_slice(&bytes).map_err(|source| FetchError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FetchError> {
    let text = serde_json::to_vec_pretty(value).map_err(|source| FetchError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes(path, &text).await
}

/// Create an empty marker file, or bump the mtime of an existing one.
pub async fn touch(path: &Path) -> Result<(), FetchError> {
    remove_if_exists(path).await?;
    write_bytes(path, b"").await
}

/// Stamp a file with a modification time, e.g. the server's `Last-Modified`.
pub async fn set_modified(path: &Path, at: SystemTime) -> Result<(), FetchError> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| FetchError::io(path, e))?
        .into_std()
        .await;
    file.set_modified(at).map_err(|e| FetchError::io(path, e))
}
