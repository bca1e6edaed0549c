//! 传感器型号目录
//!
//! 描述每种 Kodak KAF 传感器的几何参数（前/后过扫描区、有效区）以及
//! 该型号对应的时钟序列。目录在编译期固定，运行时只读。

use crate::request::ClockSequences;
use crate::sequences::{SEQ_CLEAR, SEQ_READ_TABLE, SEQ_V5US, SEQ_V10US};

/// 列对齐常数（快速方向）
///
/// 读出时水平方向以 `binning × SEQ_KCOL` 列为单位对齐。
/// 该值为本系列传感器的调校数据（暂定值），不是通用不变量。
pub const SEQ_KCOL: i32 = 5;

/// 支持的最大合并因子
pub const MAX_BINNING: u8 = 4;

/// 二维尺寸/偏移（未合并的传感器像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent {
    pub x: i32,
    pub y: i32,
}

impl Extent {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// ADC 转换速度
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    num_enum::TryFromPrimitive,
    num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum AdcSpeed {
    /// 慢速（低噪声）
    #[default]
    Slow = 0,
    /// 快速
    Fast = 1,
}

impl AdcSpeed {
    /// 序列表中的列索引
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

/// 传感器型号（只读目录项）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    /// 型号名称（用于 INSTRUME 关键字）
    pub name: &'static str,
    /// 有效区之前的过扫描列/行
    pub overscan_before: Extent,
    /// 有效感光区
    pub active: Extent,
    /// 有效区之后的过扫描列/行
    pub overscan_after: Extent,
    /// 像素尺寸（微米）
    pub pixel_size_um: f64,
    /// 移位寄存器虚像素数
    pub dummy_pixels: u32,
    /// 清除序列
    pub clear_sequence: &'static [u8],
    /// 垂直转移序列
    pub vertical_sequence: &'static [u8],
    /// 读出序列，索引为 `[binning-1][adc]`
    pub readout_sequences: [[&'static [u8]; 2]; 4],
}

impl SensorModel {
    /// 传感器全尺寸（过扫描 + 有效区 + 过扫描）
    pub fn max_extent(&self) -> Extent {
        Extent::new(
            self.overscan_before.x + self.active.x + self.overscan_after.x,
            self.overscan_before.y + self.active.y + self.overscan_after.y,
        )
    }

    /// 有效区在未合并坐标中的结束位置
    pub fn active_end(&self) -> Extent {
        Extent::new(
            self.overscan_before.x + self.active.x,
            self.overscan_before.y + self.active.y,
        )
    }

    /// 按合并因子和 ADC 速度选取读出序列
    ///
    /// `binning` 超出 1..=4 时夹到边界。
    pub fn readout_sequence(&self, binning: u8, adc: AdcSpeed) -> &'static [u8] {
        let row = (binning.clamp(1, MAX_BINNING) - 1) as usize;
        self.readout_sequences[row][adc.index()]
    }

    /// 生成该组合下的完整时钟序列载荷
    pub fn clock_sequences(&self, binning: u8, adc: AdcSpeed) -> ClockSequences {
        ClockSequences {
            clear: self.clear_sequence,
            vertical: self.vertical_sequence,
            readout: self.readout_sequence(binning, adc),
        }
    }
}

/// 传感器目录（索引即型号编号）
pub static SENSOR_CATALOG: [SensorModel; 4] = [
    SensorModel {
        name: "KAF-400",
        overscan_before: Extent::new(14, 4),
        active: Extent::new(768, 512),
        overscan_after: Extent::new(14, 4),
        pixel_size_um: 9.0,
        dummy_pixels: 10,
        clear_sequence: SEQ_CLEAR,
        vertical_sequence: SEQ_V5US,
        readout_sequences: SEQ_READ_TABLE,
    },
    SensorModel {
        name: "KAF-1600",
        overscan_before: Extent::new(14, 4),
        active: Extent::new(1536, 1024),
        overscan_after: Extent::new(14, 4),
        pixel_size_um: 9.0,
        dummy_pixels: 10,
        clear_sequence: SEQ_CLEAR,
        vertical_sequence: SEQ_V5US,
        readout_sequences: SEQ_READ_TABLE,
    },
    SensorModel {
        name: "KAF-3000",
        overscan_before: Extent::new(44, 17),
        active: Extent::new(2016, 1512),
        overscan_after: Extent::new(20, 14),
        pixel_size_um: 9.0,
        dummy_pixels: 10,
        clear_sequence: SEQ_CLEAR,
        vertical_sequence: SEQ_V10US,
        readout_sequences: SEQ_READ_TABLE,
    },
    SensorModel {
        name: "KAF-3200",
        overscan_before: Extent::new(46, 34),
        active: Extent::new(2184, 1472),
        overscan_after: Extent::new(37, 4),
        pixel_size_um: 6.8,
        dummy_pixels: 8,
        clear_sequence: SEQ_CLEAR,
        vertical_sequence: SEQ_V10US,
        readout_sequences: SEQ_READ_TABLE,
    },
];

/// 按索引查找传感器型号
pub fn sensor_model(index: usize) -> Option<&'static SensorModel> {
    SENSOR_CATALOG.get(index)
}
