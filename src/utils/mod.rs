pub mod config;
pub mod file_helpers;
pub mod path;

pub use config::{load_app_config, save_app_config, AppPaths};
pub use file_helpers::{content_checksum, file_checksum};
