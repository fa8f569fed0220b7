//! 路径工具

use std::path::{Component, Path, PathBuf};

/// 展开开头的 `~`（仅支持当前用户）
pub fn expand_tilde(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

/// 路径中是否包含 `..`
pub fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// 去掉 `.` 分量（不解析符号链接）
pub fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// 解析符号链接后的真实路径
///
/// 从目标向上找到第一个存在的祖先目录做 canonicalize，再拼回不存在的部分。
pub fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut cursor = path;
    loop {
        match cursor.canonicalize() {
            Ok(real) => {
                let mut out = real;
                for part in missing.iter().rev() {
                    out.push(part);
                }
                return Ok(out);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (cursor.parent(), cursor.file_name()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                cursor = parent;
            }
            Err(e) => return Err(e),
        }
    }
}
