//! unitpath-backends: progress stores, content clients and configuration.
//!
//! Implements `ProgressStore` in memory and on JSON files, `ContentSource`
//! over an HTTP content service, and builds both from `unitpath.toml`.

pub mod config;
pub mod http_content;
pub mod json_file;
pub mod memory;
pub mod mock;

#[cfg(test)]
mod testutil;

pub use config::{
    create_content, create_store, load_config, load_config_from, ContentConfig, StoreConfig,
    UnitpathConfig,
};
pub use http_content::HttpContentSource;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use mock::FaultyStore;
