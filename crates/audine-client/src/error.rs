//! 客户端层错误类型定义

use audine_driver::DriverError;
use thiserror::Error;

/// 客户端层错误类型
#[derive(Error, Debug)]
pub enum ClientError {
    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 硬件链路错误
    #[error("Link error: {0}")]
    Link(String),

    /// 事件循环已停止
    #[error("Event loop is not running")]
    LoopStopped,

    /// 线程创建失败
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// 事件循环线程崩溃
    #[error("Event loop thread panicked")]
    ThreadPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_conversion() {
        let err: ClientError = DriverError::NoActiveSession.into();
        assert!(matches!(err, ClientError::Driver(DriverError::NoActiveSession)));
        assert_eq!(err.to_string(), "Driver error: No active stream session");
    }
}
