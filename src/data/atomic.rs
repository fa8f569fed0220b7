//! 原子写入与文件锁
//!
//! - `write_atomic`: 同目录临时文件写入后 rename，崩溃时不会留下半写文件
//! - `StoreLock`: 基于 fs2 的排他锁，跨进程串行化同一存储文件的写入

use crate::data::{DataError, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 在目标文件同目录创建临时文件并写入内容（尚未替换目标）
///
/// 自动创建父目录，临时文件权限在 Unix 平台设置为 0o600。
pub fn stage_temp(path: &Path, content: &[u8]) -> Result<NamedTempFile> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|e| DataError::io(&parent, e))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| DataError::io(&parent, e))?;
    temp.write_all(content)
        .map_err(|e| DataError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| DataError::io(temp.path(), e))?;
    set_permissions(temp.path())?;
    Ok(temp)
}

/// 将已写好的临时文件替换到目标路径
pub fn persist_temp(temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.persist(path)
        .map(|_| ())
        .map_err(|e| DataError::io(path, e.error))
}

/// 原子写入文件
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let temp = stage_temp(path, content)?;
    persist_temp(temp, path)
}

/// 读取文件内容，不存在时返回 None
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DataError::io(path, e)),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// 存储文件的排他锁（锁文件与目标同目录，扩展名为 `.lock`）
///
/// 锁在 guard drop 时自动释放。
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(target: &Path) -> Result<Self> {
        let lock_path = target.with_extension("lock");
        let parent = parent_dir(&lock_path);
        fs::create_dir_all(&parent).map_err(|e| DataError::io(&parent, e))?;

        let file = File::create(&lock_path).map_err(|e| DataError::io(&lock_path, e))?;
        // 阻塞等待其他写操作完成
        file.lock_exclusive().map_err(|e| DataError::Lock {
            path: lock_path.clone(),
            source: e,
        })?;

        Ok(Self {
            file,
            path: lock_path,
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = ?self.path, error = ?e, "释放文件锁失败");
        }
    }
}

/// 设置文件权限（Unix 平台 0o600）
#[cfg(unix)]
pub(crate) fn set_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path).map_err(|e| DataError::io(path, e))?;
    let mut perms = metadata.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms).map_err(|e| DataError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parent_and_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        // 目录中只剩目标文件，没有残留的临时文件
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn read_optional_distinguishes_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_optional(&path).unwrap().is_none());

        fs::write(&path, "x").unwrap();
        assert_eq!(read_optional(&path).unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn store_lock_is_reentrant_after_drop() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("store.json");

        let lock = StoreLock::acquire(&target).unwrap();
        drop(lock);
        let _again = StoreLock::acquire(&target).unwrap();
        assert!(dir.path().join("store.lock").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_unix() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.json");
        write_atomic(&path, b"{}").unwrap();

        let perms = fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
