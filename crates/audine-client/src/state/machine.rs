//! 相机状态机
//!
//! 六个状态加一个纯转换函数 `(state, trigger, guards) → state`。
//! 转换函数不做任何副作用，副作用由编排器在转换前后执行。

use std::fmt;

// ==================== 状态 ====================

/// 相机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraState {
    /// 链路未连接
    #[default]
    Idle,
    /// 已连接，可接受命令
    Ready,
    /// 等待张间延迟
    Waiting,
    /// 曝光中
    Exposing,
    /// 读出中
    Reading,
    /// 告警（超时、链路告警或协议违例）
    Alert,
}

impl CameraState {
    /// 是否有进行中的采集序列
    pub fn is_acquiring(self) -> bool {
        matches!(
            self,
            CameraState::Waiting | CameraState::Exposing | CameraState::Reading
        )
    }

    /// 进入状态时发布的状态灯
    pub fn light(self) -> StatusLight {
        match self {
            CameraState::Idle => StatusLight::Idle,
            CameraState::Ready => StatusLight::Ok,
            CameraState::Waiting | CameraState::Exposing | CameraState::Reading => {
                StatusLight::Busy
            },
            CameraState::Alert => StatusLight::Alert,
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CameraState::Idle => "idle",
            CameraState::Ready => "ready",
            CameraState::Waiting => "waiting",
            CameraState::Exposing => "exposing",
            CameraState::Reading => "reading",
            CameraState::Alert => "alert",
        };
        f.write_str(s)
    }
}

/// 状态灯
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLight {
    Idle,
    Ok,
    Busy,
    Alert,
}

// ==================== 触发事件 ====================

/// 状态转换触发事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// 链路连接（或告警后重连确认）
    LinkConnected,
    /// 链路断开
    LinkDisconnected,
    /// 链路告警
    LinkAlert,
    /// 开始命令
    Start,
    /// 停止命令
    Stop,
    /// 定时节拍
    Tick,
    /// 延迟到期
    DelayElapsed,
    /// 曝光超时
    ExposureTimeout,
    /// 读出超时
    ReadoutTimeout,
    /// 像素分片
    Fragment,
    /// 图像结束标记
    ImageComplete,
    /// 协议违例或链路发送失败
    Fault,
}

/// 转换守卫（由序列器提供）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Guards {
    pub has_configured_delay: bool,
    pub has_remaining_count: bool,
}

// ==================== 转换函数 ====================

/// 计算下一个状态
///
/// 返回 `None` 表示该状态不接受此事件（拒绝或忽略由调用方决定）。
pub fn next_state(state: CameraState, trigger: Trigger, guards: Guards) -> Option<CameraState> {
    use CameraState::*;
    use Trigger::*;

    match (state, trigger) {
        // 链路信号在任何状态都有效
        (_, LinkDisconnected) => Some(Idle),
        (_, LinkAlert) => Some(Alert),
        (Idle | Alert, LinkConnected) => Some(Ready),

        (Ready, Start) if guards.has_configured_delay => Some(Waiting),
        (Ready, Start) => Some(Exposing),

        (Waiting, Tick) => Some(Waiting),
        (Waiting, DelayElapsed) => Some(Exposing),
        (Waiting | Exposing, Stop) => Some(Ready),

        (Exposing, Tick) => Some(Exposing),
        (Exposing, Fragment) => Some(Reading),
        (Exposing, ExposureTimeout) => Some(Alert),

        (Reading, Fragment) => Some(Reading),
        (Reading, ImageComplete) => Some(match guards {
            Guards {
                has_remaining_count: true,
                has_configured_delay: true,
            } => Waiting,
            Guards {
                has_remaining_count: true,
                ..
            } => Exposing,
            _ => Ready,
        }),
        (Reading, ReadoutTimeout) => Some(Alert),

        (Waiting | Exposing | Reading, Fault) => Some(Alert),

        _ => None,
    }
}
