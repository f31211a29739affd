pub mod config;
pub mod debug_log;
pub mod error;
pub mod identity;
pub mod messages;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod storage;
