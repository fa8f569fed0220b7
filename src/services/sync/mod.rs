// 远程 SSH 同步
//
// - transport: 远程会话抽象
// - openssh: 基于系统 ssh 客户端的实现
// - resolver: 文件映射解析与校验
// - engine: 同步运行（单会话、逐映射隔离失败、可取消）

pub mod engine;
#[cfg(test)]
pub mod memory;
pub mod openssh;
pub mod resolver;
pub mod transport;

pub use engine::{SyncEngine, SyncEvent, SyncHandle};
pub use openssh::{test_connection, OpenSshTransport};
pub use resolver::{default_file_mappings, MappingResolver, ResolvedOperation};
pub use transport::{RemoteSession, RemoteStat, RemoteTransport, TransportError};
