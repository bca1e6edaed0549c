//! 驱动层模块
//!
//! 本模块提供 Audine CCD 相机采集核心的各个组件：
//! - 几何规划（型号/合并/ADC 速度/区域选择 → 时钟序列与线路矩形）
//! - 曝光序列（计数器与超时预测）
//! - 快门子记录
//! - 流式 FITS 存储（字节序转换与方向变换）
//! - 附加元数据（视场标定、用户注释、集线器遥测）
//!
//! 组件之间不共享可变状态，由 `audine-client` 的编排器按事件顺序调用。

pub mod annotations;
mod error;
pub mod geometry;
pub mod sequencer;
pub mod shutter;
pub mod storage;

pub use annotations::{Telemetry, UserComment, WcsSeed};
pub use error::DriverError;
pub use geometry::{
    AreaSelection, Bounds, GeometryPlanner, GeometryState, OverscanSections, Preset, Section,
    SelectionMode, VisibleRect,
};
pub use sequencer::{
    ExposureLimits, ExposureSequencer, ExposureTiming, ImageCategory, TICK_MS, TimeoutPrediction,
    predict_timeouts,
};
pub use shutter::Shutter;
pub use storage::{ImagePathSource, SequentialPaths, StreamWriter, TransformMode};
