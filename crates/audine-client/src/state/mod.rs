//! 相机状态机模块

mod machine;

pub use machine::{CameraState, Guards, StatusLight, Trigger, next_state};
