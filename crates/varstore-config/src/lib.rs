pub mod config;

pub use config::{resolve_data_dir, AppConfig, DATA_DIR_ENV};
