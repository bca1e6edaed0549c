//! 客户端接口模块
//!
//! 本模块把驱动层的各个组件组装成完整的采集流程，包括：
//! - 相机状态机（纯转换函数）
//! - 采集编排器（命令、链路事件、节拍、闹钟的串行处理）
//! - 硬件链路抽象（含记录链路和模拟相机）
//! - 事件循环线程
//!
//! # 使用场景
//!
//! 测试和离线工具直接驱动 [`CameraController::handle`]；实际采集通过
//! [`EventLoop::spawn`] 在后台线程运行编排器。

mod error;
pub mod controller;
pub mod event_loop;
pub mod link;
pub mod state;
pub mod timer;

// 重新导出常用类型
pub use controller::{CameraController, Command, CommandStatus, Event, Notification};
pub use error::ClientError;
pub use event_loop::{EventLoop, EventLoopHandle};
pub use link::{HardwareLink, LinkEvent, RecordingLink, SimulatedLink};
pub use state::{CameraState, Guards, StatusLight, Trigger, next_state};
pub use timer::{AlarmToken, ArmedAlarm, TICK_INTERVAL, Timers};
