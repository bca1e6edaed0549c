//! 曝光请求记录
//!
//! 发往 COR 集线器的曝光请求由三个不可变子记录组合而成：
//! 几何子记录（[`GeometryRecord`]）、快门子记录（[`ShutterRecord`]）
//! 和曝光时长子记录（[`ExposureTimeRecord`]）。编排器在发送时刻组合，
//! 各组件之间不共享可变的请求结构。
//!
//! # 线路布局（小端，107 字节）
//!
//! ```text
//! 0      peripheral      u8
//! 1      origin          u8
//! 2..4   cols            i16   传感器总列数（含过扫描）
//! 4..6   rows            i16   传感器总行数（含过扫描）
//! 6..14  x1 y1 x2 y2     i16×4 未合并坐标
//! 14     binning         u8    合并因子（测试图样时 +10）
//! 15     n_clear         u8
//! 16     shutter_mode    u8
//! 17..19 delay           u16   快门延迟（0.1 s）
//! 19..21 t_sec           u16
//! 21..23 t_msec          u16
//! 23     cancel          u8
//! 24     clear_len       u8    + 32 字节清除序列
//! 57     v_len           u8    + 16 字节垂直序列
//! 74     read_len        u8    + 32 字节读出序列
//! ```

use crate::{ProtocolError, bytes_to_u16_le, i16_to_bytes_le, u16_to_bytes_le};
use bilge::prelude::*;

/// 请求来源标识（主机）
pub const ORIGIN_HOST: u8 = 0x00;

/// 清除序列最大长度
pub const CLEAR_SEQ_MAX: usize = 32;
/// 垂直序列最大长度
pub const VERTICAL_SEQ_MAX: usize = 16;
/// 读出序列最大长度
pub const READOUT_SEQ_MAX: usize = 32;

/// 曝光请求记录总长度
pub const EXPOSURE_REQUEST_LEN: usize = 24 + 1 + CLEAR_SEQ_MAX + 1 + VERTICAL_SEQ_MAX + 1 + READOUT_SEQ_MAX;

/// 测试图样在合并编码值上的偏移
pub const TEST_PATTERN_OFFSET: u8 = 10;

const OFFSET_CLEAR: usize = 24;
const OFFSET_VERTICAL: usize = OFFSET_CLEAR + 1 + CLEAR_SEQ_MAX;
const OFFSET_READOUT: usize = OFFSET_VERTICAL + 1 + VERTICAL_SEQ_MAX;

// ============================================================================
// 几何子记录
// ============================================================================

/// 线路矩形（未合并传感器坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl WireRect {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 未合并宽度
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    /// 未合并高度
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// 时钟序列载荷（引用只读序列表）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSequences {
    pub clear: &'static [u8],
    pub vertical: &'static [u8],
    pub readout: &'static [u8],
}

/// 几何子记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRecord {
    /// 传感器总列数
    pub cols: i16,
    /// 传感器总行数
    pub rows: i16,
    /// 请求读出的矩形
    pub rect: WireRect,
    /// 合并编码值
    pub binning: u8,
    /// 时钟序列
    pub sequences: ClockSequences,
}

// ============================================================================
// 快门子记录
// ============================================================================

/// 快门模式位域（Byte 16）
///
/// - Bit 0: 快门线电平
/// - Bit 1: 保持（整个曝光期间不动作快门）
/// - Bit 2-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct ShutterMode {
    pub level: bool,  // Bit 0: 快门线电平
    pub hold: bool,   // Bit 1: 保持
    pub reserved: u6, // Bit 2-7: 保留
}

impl ShutterMode {
    /// 从低两位构造（保留位清零）
    pub fn compose(hold: bool, level: bool) -> Self {
        let mut mode = ShutterMode::from(u8::new(0));
        mode.set_hold(hold);
        mode.set_level(level);
        mode
    }
}

/// 快门驱动逻辑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ShutterLogic {
    /// 正逻辑
    #[default]
    Normal,
    /// 反逻辑
    Inverted,
}

impl ShutterLogic {
    pub fn is_inverted(self) -> bool {
        matches!(self, ShutterLogic::Inverted)
    }
}

/// 快门子记录
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShutterRecord {
    pub mode: ShutterMode,
    /// 快门延迟（0.1 s 单位）
    pub delay_ds: u16,
}

// ============================================================================
// 曝光时长子记录
// ============================================================================

/// 曝光时长子记录（整秒 + 毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExposureTimeRecord {
    pub seconds: u16,
    pub millis: u16,
}

impl ExposureTimeRecord {
    /// 整秒字段可表达的最长曝光（秒）
    pub const MAX_SECONDS: u16 = u16::MAX;

    /// 从秒数拆分（截断到毫秒）
    ///
    /// 输入须在 `[0, MAX_SECONDS]` 内，由调用方校验。
    pub fn from_seconds(exposure_s: f64) -> Self {
        let seconds = exposure_s as u16;
        let millis = (1000.0 * (exposure_s - f64::from(seconds))) as u16;
        Self { seconds, millis }
    }
}

// ============================================================================
// 曝光请求
// ============================================================================

/// 曝光请求（含取消变体）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureRequest {
    pub peripheral: u8,
    pub geometry: GeometryRecord,
    pub clear_count: u8,
    pub shutter: ShutterRecord,
    pub exposure: ExposureTimeRecord,
    pub cancel: bool,
}

impl ExposureRequest {
    /// 组合子记录生成曝光请求
    pub fn new(
        peripheral: u8,
        geometry: GeometryRecord,
        clear_count: u8,
        shutter: ShutterRecord,
        exposure: ExposureTimeRecord,
    ) -> Self {
        Self {
            peripheral,
            geometry,
            clear_count,
            shutter,
            exposure,
            cancel: false,
        }
    }

    /// 生成取消变体（其余字段保持不变）
    pub fn into_cancel(self) -> Self {
        Self {
            cancel: true,
            ..self
        }
    }

    /// 编码为线路字节
    pub fn to_bytes(&self) -> Result<[u8; EXPOSURE_REQUEST_LEN], ProtocolError> {
        let mut data = [0u8; EXPOSURE_REQUEST_LEN];
        let g = &self.geometry;

        data[0] = self.peripheral;
        data[1] = ORIGIN_HOST;
        data[2..4].copy_from_slice(&i16_to_bytes_le(g.cols));
        data[4..6].copy_from_slice(&i16_to_bytes_le(g.rows));
        data[6..8].copy_from_slice(&i16_to_bytes_le(g.rect.x1 as i16));
        data[8..10].copy_from_slice(&i16_to_bytes_le(g.rect.y1 as i16));
        data[10..12].copy_from_slice(&i16_to_bytes_le(g.rect.x2 as i16));
        data[12..14].copy_from_slice(&i16_to_bytes_le(g.rect.y2 as i16));
        data[14] = g.binning;
        data[15] = self.clear_count;
        data[16] = u8::from(self.shutter.mode);
        data[17..19].copy_from_slice(&u16_to_bytes_le(self.shutter.delay_ds));
        data[19..21].copy_from_slice(&u16_to_bytes_le(self.exposure.seconds));
        data[21..23].copy_from_slice(&u16_to_bytes_le(self.exposure.millis));
        data[23] = u8::from(self.cancel);

        write_sequence(&mut data, OFFSET_CLEAR, "clear", g.sequences.clear, CLEAR_SEQ_MAX)?;
        write_sequence(
            &mut data,
            OFFSET_VERTICAL,
            "vertical",
            g.sequences.vertical,
            VERTICAL_SEQ_MAX,
        )?;
        write_sequence(
            &mut data,
            OFFSET_READOUT,
            "readout",
            g.sequences.readout,
            READOUT_SEQ_MAX,
        )?;

        Ok(data)
    }
}

/// 写入带长度前缀的序列（不足部分补零）
fn write_sequence(
    data: &mut [u8],
    offset: usize,
    field: &'static str,
    seq: &[u8],
    max: usize,
) -> Result<(), ProtocolError> {
    if seq.len() > max {
        return Err(ProtocolError::SequenceTooLong {
            field,
            len: seq.len(),
            max,
        });
    }
    data[offset] = seq.len() as u8;
    data[offset + 1..offset + 1 + seq.len()].copy_from_slice(seq);
    Ok(())
}

/// 曝光请求的固定头部字段（接收端视角，不含时钟序列）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestHeader {
    pub peripheral: u8,
    pub cols: i16,
    pub rows: i16,
    pub rect: WireRect,
    pub binning: u8,
    pub clear_count: u8,
    pub shutter_mode: ShutterMode,
    pub delay_ds: u16,
    pub exposure: ExposureTimeRecord,
    pub cancel: bool,
}

impl RequestHeader {
    /// 解析合并因子（去除测试图样偏移）
    pub fn binning_factor(&self) -> u8 {
        if self.binning > TEST_PATTERN_OFFSET {
            self.binning - TEST_PATTERN_OFFSET
        } else {
            self.binning
        }
    }
}

impl TryFrom<&[u8]> for RequestHeader {
    type Error = ProtocolError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < EXPOSURE_REQUEST_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: EXPOSURE_REQUEST_LEN,
                actual: data.len(),
            });
        }
        let i16_at = |i: usize| bytes_to_u16_le([data[i], data[i + 1]]) as i16;
        let u16_at = |i: usize| bytes_to_u16_le([data[i], data[i + 1]]);

        let cancel = match data[23] {
            0 => false,
            1 => true,
            value => {
                return Err(ProtocolError::InvalidValue {
                    field: "cancel".to_string(),
                    value,
                });
            },
        };

        Ok(Self {
            peripheral: data[0],
            cols: i16_at(2),
            rows: i16_at(4),
            rect: WireRect::new(
                i32::from(i16_at(6)),
                i32::from(i16_at(8)),
                i32::from(i16_at(10)),
                i32::from(i16_at(12)),
            ),
            binning: data[14],
            clear_count: data[15],
            shutter_mode: ShutterMode::from(data[16]),
            delay_ds: u16_at(17),
            exposure: ExposureTimeRecord {
                seconds: u16_at(19),
                millis: u16_at(21),
            },
            cancel,
        })
    }
}
