//! 进程内按文件路径的写锁
//!
//! Apply 与远程同步覆盖同一个原生配置文件前都要先拿到该路径的锁。
//! 一次请求的多个路径要么全部获得、要么等待，不会出现持有部分路径的情况。

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Default)]
struct Inner {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

#[derive(Clone, Default)]
pub struct PathLocks {
    inner: Arc<Inner>,
}

/// 持有期间其它调用方无法获取相同路径；drop 时释放
pub struct PathLockGuard {
    inner: Arc<Inner>,
    paths: Vec<PathBuf>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 阻塞直到所有路径都可用
    pub fn acquire<I>(&self, paths: I) -> PathLockGuard
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut paths: Vec<PathBuf> = paths.into_iter().collect();
        paths.sort();
        paths.dedup();

        let mut held = self.inner.held.lock().unwrap_or_else(|p| p.into_inner());
        while paths.iter().any(|p| held.contains(p)) {
            held = self
                .inner
                .released
                .wait(held)
                .unwrap_or_else(|p| p.into_inner());
        }
        held.extend(paths.iter().cloned());

        PathLockGuard {
            inner: Arc::clone(&self.inner),
            paths,
        }
    }

    pub fn is_locked(&self, path: &PathBuf) -> bool {
        self.inner
            .held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(path)
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        let mut held = self.inner.held.lock().unwrap_or_else(|p| p.into_inner());
        for path in &self.paths {
            held.remove(path);
        }
        drop(held);
        self.inner.released.notify_all();
    }
}
