use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageResult;

pub async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// `None` when the file is missing or empty.
pub async fn read_json_file<T>(path: &Path) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
{
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
        Ok(bytes) => Ok(Some(serde_json::from_slice::<T>(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Atomically write json to disk using a temp file + rename.
///
/// The write is fsync'd before the rename.
pub async fn write_json_file<T>(path: &Path, value: &T) -> StorageResult<()>
where
    T: Serialize,
{
    ensure_parent_dir(path).await?;

    let tmp_path = temp_path(path);
    let json = serde_json::to_vec_pretty(value)?;

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

pub async fn load_or_default<T>(path: &Path) -> StorageResult<T>
where
    T: DeserializeOwned + Default,
{
    Ok(read_json_file::<T>(path).await?.unwrap_or_default())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|name| format!("{}.{}.tmp", name.to_string_lossy(), std::process::id()))
        .unwrap_or_else(|| "store.json.tmp".to_string());
    tmp.set_file_name(file_name);
    tmp
}
