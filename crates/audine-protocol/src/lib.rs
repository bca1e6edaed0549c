//! # Audine Protocol
//!
//! Audine CCD 相机经 COR 集线器通信的线路协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `sensor`: 传感器型号目录（几何参数 + 时钟序列选择）
//! - `sequences`: 厂商时钟序列字节表
//! - `request`: 曝光请求记录（含取消变体）及其子记录
//! - `incoming`: 像素分片与图像结束记录的解析
//!
//! ## 字节序
//!
//! COR 集线器为小端设备：所有多字节整数（包括 16 位像素采样）均为小端字节序。
//! FITS 文件要求大端采样，字节交换由驱动层的流写入器完成。

pub mod incoming;
pub mod request;
pub mod sensor;
pub mod sequences;

// 重新导出常用类型
pub use incoming::*;
pub use request::*;
pub use sensor::*;

use thiserror::Error;

/// 协议解析/编码错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 数据长度不足
    #[error("Invalid record length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// 字段取值无效
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },

    /// 时钟序列超出记录容量
    #[error("Sequence {field} too long: {len} bytes (max {max})")]
    SequenceTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// 小端字节序转换工具函数
///
/// 将小端字节序的字节数组转换为 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 将小端字节序的字节数组转换为 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// 将 i16 转换为小端字节序的字节数组
pub fn i16_to_bytes_le(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

/// 将 u16 转换为小端字节序的字节数组
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}
