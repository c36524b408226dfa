//! 文档编解码
//!
//! 所有落盘文档都是 2 空格缩进的 UTF-8 JSON。写入先落到同目录的临时文件并
//! fsync，再原子重命名到目标路径，读者在任何时刻只会看到完整的旧内容或新内容。

use crate::error::{AppError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// 临时文件后缀
pub const TEMP_SUFFIX: &str = "tmp";

/// 序列化为规范文本
pub fn encode<T: Serialize + ?Sized>(record: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

/// 目标路径对应的临时文件路径
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// 已写入临时文件、尚未提交的文档
#[derive(Debug)]
#[must_use = "staged documents must be committed or discarded"]
pub struct StagedDocument {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedDocument {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// 原子替换目标文件
    pub async fn commit(self) -> Result<()> {
        if let Err(e) = fs::rename(&self.temp_path, &self.final_path).await {
            remove_quietly(&self.temp_path).await;
            return Err(AppError::io(&self.final_path, e));
        }
        Ok(())
    }

    /// 放弃写入，目标文件保持不变
    pub async fn discard(self) {
        remove_quietly(&self.temp_path).await;
    }
}

/// 序列化并写入临时文件
pub async fn stage<T: Serialize + ?Sized>(path: &Path, record: &T) -> Result<StagedDocument> {
    let content = encode(record)?;
    let temp_path = temp_path_for(path);

    if let Err(e) = write_synced(&temp_path, content.as_bytes()).await {
        remove_quietly(&temp_path).await;
        return Err(AppError::io(&temp_path, e));
    }

    Ok(StagedDocument {
        temp_path,
        final_path: path.to_path_buf(),
    })
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Failed to remove temp file {}: {}", path.display(), e);
        }
    }
}

/// 原子写入文档
///
/// 失败时原文件不受影响，也不会留下临时文件。
pub async fn write_document<T: Serialize + ?Sized>(path: &Path, record: &T) -> Result<()> {
    stage(path, record).await?.commit().await
}

/// 读取并解码文档
///
/// 文件不存在或只含空白时返回 `Ok(None)`（后者记录警告）；
/// 内容存在但无法解析时返回 [`AppError::Malformed`]。
pub async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::io(path, e)),
    };

    if content.trim().is_empty() {
        tracing::warn!("Empty document {}", path.display());
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| AppError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_temp_path_is_sibling() {
        let temp = temp_path_for(Path::new("/data/profiles/42.json"));
        assert_eq!(temp, PathBuf::from("/data/profiles/42.json.tmp"));
    }

    #[test]
    fn test_encode_uses_two_space_indent() {
        let text = encode(&json!({"a": 1})).unwrap();
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_document(&path, &json!({"mood": "happy"})).await.unwrap();
        let doc: Option<Value> = read_document(&path).await.unwrap();

        assert_eq!(doc, Some(json!({"mood": "happy"})));
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_missing_and_blank_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let blank = dir.path().join("blank.json");
        std::fs::write(&blank, "  \n\t ").unwrap();

        assert!(read_document::<Value>(&missing).await.unwrap().is_none());
        assert!(read_document::<Value>(&blank).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_document::<Value>(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_uncommitted_stage_leaves_original_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("42.json");
        std::fs::write(&path, "{\"mood\": \"old\"}").unwrap();
        let before = std::fs::read(&path).unwrap();

        let staged = stage(&path, &json!({"mood": "new"})).await.unwrap();
        // 相当于进程在重命名前终止
        assert!(staged.temp_path().exists());
        assert_eq!(std::fs::read(&path).unwrap(), before);

        staged.commit().await.unwrap();
        let after: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(after, json!({"mood": "new"}));
    }

    #[tokio::test]
    async fn test_discard_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7.json");

        let staged = stage(&path, &json!([1, 2])).await.unwrap();
        let temp = staged.temp_path().to_path_buf();
        staged.discard().await;

        assert!(!temp.exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("1.json");

        let err = write_document(&path, &json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
        assert!(!path.exists());
    }
}
