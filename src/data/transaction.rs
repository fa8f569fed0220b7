//! 多文件写入事务
//!
//! 先为每个目标文件在同目录写好临时文件（stage），再依次 rename 提交。
//! 提交前读取目标原内容作为备份；任一 rename 失败时，已提交的文件按备份还原，
//! 原本不存在的文件被删除，保证多文件要么全部更新、要么全部保持原样。

use crate::data::atomic::{persist_temp, read_optional, stage_temp, write_atomic};
use crate::data::{DataError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

struct StagedWrite {
    target: PathBuf,
    temp: NamedTempFile,
}

struct Committed {
    target: PathBuf,
    backup: Option<Vec<u8>>,
}

/// 多文件原子写入事务
#[derive(Default)]
pub struct FileTransaction {
    staged: Vec<StagedWrite>,
}

impl FileTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存一个目标文件的新内容
    pub fn stage(&mut self, target: &Path, content: &[u8]) -> Result<()> {
        let temp = stage_temp(target, content)?;
        self.staged.push(StagedWrite {
            target: target.to_path_buf(),
            temp,
        });
        Ok(())
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.staged.iter().map(|s| s.target.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// 按暂存顺序提交所有文件
    ///
    /// 失败时返回首个失败路径的错误，已提交的文件会被回滚。
    pub fn commit(self) -> Result<()> {
        let mut committed: Vec<Committed> = Vec::with_capacity(self.staged.len());

        for staged in self.staged {
            let target = staged.target;
            let result = read_optional(&target)
                .and_then(|backup| persist_temp(staged.temp, &target).map(|_| backup));

            match result {
                Ok(backup) => committed.push(Committed { target, backup }),
                Err(err) => {
                    tracing::warn!(
                        path = ?target,
                        error = %err,
                        rollback = committed.len(),
                        "多文件写入失败，回滚已提交文件"
                    );
                    rollback(committed);
                    return Err(err);
                }
            }
        }

        Ok(())
    }
}

fn rollback(committed: Vec<Committed>) {
    for entry in committed.into_iter().rev() {
        let restored = match &entry.backup {
            Some(bytes) => write_atomic(&entry.target, bytes),
            None => fs::remove_file(&entry.target).map_err(|e| DataError::io(&entry.target, e)),
        };
        if let Err(e) = restored {
            tracing::error!(path = ?entry.target, error = %e, "回滚文件失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_writes_all_targets() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("config.toml");
        let b = dir.path().join("auth.json");

        let mut tx = FileTransaction::new();
        tx.stage(&a, b"model = \"x\"").unwrap();
        tx.stage(&b, b"{}").unwrap();
        assert_eq!(tx.targets(), vec![a.clone(), b.clone()]);
        tx.commit().unwrap();

        assert_eq!(fs::read_to_string(&a).unwrap(), "model = \"x\"");
        assert_eq!(fs::read_to_string(&b).unwrap(), "{}");
    }

    #[test]
    fn failed_second_target_rolls_back_first() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("config.toml");
        let b = dir.path().join("auth.json");
        fs::write(&a, "old").unwrap();

        let mut tx = FileTransaction::new();
        tx.stage(&a, b"new").unwrap();
        tx.stage(&b, b"{}").unwrap();

        // 暂存后把第二个目标替换为非空目录，使其提交失败
        fs::create_dir_all(b.join("blocker")).unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, DataError::Io { ref path, .. } if path == &b));
        assert_eq!(fs::read_to_string(&a).unwrap(), "old");
    }

    #[test]
    fn rollback_removes_files_that_did_not_exist() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("fresh.json");
        let b = dir.path().join("blocked.json");

        let mut tx = FileTransaction::new();
        tx.stage(&a, b"{}").unwrap();
        tx.stage(&b, b"{}").unwrap();
        fs::create_dir_all(b.join("blocker")).unwrap();

        assert!(tx.commit().is_err());
        assert!(!a.exists());
    }
}
