pub mod config;
pub mod discovery;
pub mod logging;
pub mod service;
pub mod storage;
pub mod version;
