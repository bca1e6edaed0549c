//! # Audine Tools - 共享数据结构
//!
//! **依赖原则**: 只依赖 `audine-protocol`，避免依赖 `audine-driver` / `audine-client`
//!
//! ## 包含模块
//!
//! - `fits` - FITS 头部卡片存储（元数据接收端）
//! - `timestamp` - UTC 时间戳格式化（纯函数）
//! - `config` - 相机配置（TOML）

pub mod config;
pub mod fits;
pub mod timestamp;

// 重新导出常用类型
pub use config::{CameraConfig, PhotometryConfig, ShutterConfig, TransformConfig};
pub use fits::{CardValue, FitsError, FitsHeader, MetadataSink};
pub use timestamp::{exposure_start, format_fits_date};
