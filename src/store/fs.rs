//! Atomic filesystem primitives. Every durable write goes through
//! write-to-temp-then-rename so a concurrent reader never observes a
//! partial document.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{OfficeError, Result};

pub async fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    Ok(())
}

pub async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

fn json_error_reason(err: &serde_json::Error) -> &'static str {
    use serde_json::error::Category;
    match err.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

fn parse_error(path: &Path, err: serde_json::Error) -> OfficeError {
    OfficeError::storage(
        format!("Stored document is not valid JSON: {}", path.display()),
        Some(json!({ "reason": json_error_reason(&err) })),
    )
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| parse_error(path, e))
}

pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path_exists(path).await {
        return Ok(T::default());
    }
    read_json(path).await
}

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| {
        OfficeError::storage(
            format!("Document could not be serialized: {}", path.display()),
            Some(json!({ "reason": json_error_reason(&e) })),
        )
    })?;
    write_atomic(path, &format!("{}\n", content)).await
}

pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| OfficeError::storage("Write target has no parent directory", None))?;
    ensure_dir(parent).await?;

    let tmp_name = format!(
        "{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string()),
        Uuid::new_v4().simple()
    );
    let tmp_path = parent.join(tmp_name);

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }

    debug!(path = %path.display(), "atomic write completed");
    Ok(())
}

pub async fn append_ndjson<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| OfficeError::storage("Append target has no parent directory", None))?;
    ensure_dir(parent).await?;

    let line = serde_json::to_string(value).map_err(|e| {
        OfficeError::storage(
            format!("Log entry could not be serialized: {}", path.display()),
            Some(json!({ "reason": json_error_reason(&e) })),
        )
    })?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", line).as_bytes()).await?;
    Ok(())
}

pub async fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path_exists(path).await {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line).map_err(|e| parse_error(path, e))?);
    }
    Ok(entries)
}
