pub mod config;
pub mod types;

pub use config::ShardConfig;
pub use types::*;
