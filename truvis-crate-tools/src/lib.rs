//! Truvis 工具集
//!
//! 提供日志初始化、性能分析 span 等在各个 crate 之间共享的工具。

pub mod init_log;
pub mod profiling;

#[doc(hidden)]
pub use tracy_client;
