//! 驱动层错误类型定义

use audine_protocol::ProtocolError;
use audine_tools::FitsError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 文件 IO 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 协议解析/编码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 元数据写入错误
    #[error("Metadata error: {0}")]
    Metadata(#[from] FitsError),

    /// 无效输入（如越界的型号索引或合并因子）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 分片不是整数行
    #[error("Partial-row fragment: {len} bytes is not a multiple of the {row_bytes}-byte row")]
    PartialRow { len: usize, row_bytes: usize },

    /// 接收字节数超出预期图像大小
    #[error("Fragment overflows image: {received} bytes received, {expected} expected")]
    Overflow { expected: u64, received: u64 },

    /// 结束时字节计数不一致
    #[error(
        "Byte count mismatch at finish: expected {expected}, written {written}, received {received}"
    )]
    ByteCountMismatch {
        expected: u64,
        written: u64,
        received: u64,
    },

    /// 文件游标偏离线路进度推算的位置
    #[error("File cursor at {actual}, expected {expected}")]
    CursorMismatch { expected: u64, actual: u64 },

    /// 没有进行中的存储会话
    #[error("No active stream session")]
    NoActiveSession,
}

impl DriverError {
    /// 是否为协议违例（对当前曝光致命，需转入告警状态）
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            DriverError::Protocol(_)
                | DriverError::PartialRow { .. }
                | DriverError::Overflow { .. }
                | DriverError::ByteCountMismatch { .. }
                | DriverError::CursorMismatch { .. }
        )
    }
}
