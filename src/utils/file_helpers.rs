//! 文件操作辅助函数
//!
//! 提供文件校验和计算，用于识别应用自身写入与外部修改。

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

/// 计算内容的 SHA256 哈希值（十六进制字符串）
pub fn content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// 计算文件的 SHA256 哈希值
///
/// 文件不存在时返回 `Ok(None)`。
pub fn file_checksum(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content_checksum(&content))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_checksum() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let checksum = file_checksum(temp_file.path())?.unwrap();

        // 64 位十六进制字符串（SHA256）
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(checksum, content_checksum(b"test content"));
        Ok(())
    }

    #[test]
    fn test_file_checksum_nonexistent() {
        let result = file_checksum(Path::new("/nonexistent/file.txt")).unwrap();
        assert!(result.is_none());
    }
}
