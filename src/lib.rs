pub mod config;
pub mod pipeline;
pub mod process;
pub mod session;
pub mod storage;
