pub mod config;
pub mod provider;
pub mod settings;
pub mod ssh;
pub mod sync;
pub mod tool;

pub use config::*;
pub use provider::*;
pub use settings::*;
pub use ssh::*;
pub use sync::*;
pub use tool::*;
