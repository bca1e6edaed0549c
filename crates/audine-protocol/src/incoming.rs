//! 入站记录解析
//!
//! 集线器为每个外设地址提供两个逻辑通道：
//! - 像素通道（地址 = 外设地址）：携带像素分片
//! - 结束通道（地址 = 外设地址 + 1）：携带图像结束标记及硬件时间戳

use crate::{ProtocolError, bytes_to_u16_le, bytes_to_u32_le};

/// 像素分片头部长度
pub const FRAGMENT_HEADER_LEN: usize = 6;

/// 图像结束记录长度
pub const IMAGE_END_LEN: usize = 12;

/// 通道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// 像素数据
    Pixels,
    /// 图像结束标记
    ImageEnd,
    /// 与本外设无关的通道
    Other(u8),
}

impl Channel {
    /// 根据外设地址分类通道号
    pub fn classify(peripheral: u8, channel_id: u8) -> Self {
        if channel_id == peripheral {
            Channel::Pixels
        } else if channel_id == peripheral.wrapping_add(1) {
            Channel::ImageEnd
        } else {
            Channel::Other(channel_id)
        }
    }
}

// ============================================================================
// 像素分片
// ============================================================================

/// 像素分片头部
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentHeader {
    /// 分片序号
    pub sequence: u16,
    /// 首行行号
    pub first_row: u16,
    /// 行数
    pub rows: u16,
}

impl FragmentHeader {
    pub fn to_bytes(&self) -> [u8; FRAGMENT_HEADER_LEN] {
        let mut data = [0u8; FRAGMENT_HEADER_LEN];
        data[0..2].copy_from_slice(&self.sequence.to_le_bytes());
        data[2..4].copy_from_slice(&self.first_row.to_le_bytes());
        data[4..6].copy_from_slice(&self.rows.to_le_bytes());
        data
    }
}

/// 像素分片（借用原始字节）
///
/// `samples` 为小端 16 位采样，按行主序排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFragment<'a> {
    pub header: FragmentHeader,
    pub samples: &'a [u8],
}

impl<'a> PixelFragment<'a> {
    /// 从原始字节解析
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        if data.len() < FRAGMENT_HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: FRAGMENT_HEADER_LEN,
                actual: data.len(),
            });
        }
        let header = FragmentHeader {
            sequence: bytes_to_u16_le([data[0], data[1]]),
            first_row: bytes_to_u16_le([data[2], data[3]]),
            rows: bytes_to_u16_le([data[4], data[5]]),
        };
        Ok(Self {
            header,
            samples: &data[FRAGMENT_HEADER_LEN..],
        })
    }

    /// 编码为原始字节（头部 + 采样）
    pub fn encode(header: FragmentHeader, samples: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(FRAGMENT_HEADER_LEN + samples.len());
        data.extend_from_slice(&header.to_bytes());
        data.extend_from_slice(samples);
        data
    }
}

// ============================================================================
// 图像结束记录
// ============================================================================

/// 图像结束记录（硬件时钟毫秒时间戳）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageEnd {
    /// 曝光开始
    pub exp_time_ms: u32,
    /// 读出开始
    pub read_time_ms: u32,
    /// 读出结束
    pub end_time_ms: u32,
}

impl ImageEnd {
    pub fn to_bytes(&self) -> [u8; IMAGE_END_LEN] {
        let mut data = [0u8; IMAGE_END_LEN];
        data[0..4].copy_from_slice(&self.exp_time_ms.to_le_bytes());
        data[4..8].copy_from_slice(&self.read_time_ms.to_le_bytes());
        data[8..12].copy_from_slice(&self.end_time_ms.to_le_bytes());
        data
    }
}

impl TryFrom<&[u8]> for ImageEnd {
    type Error = ProtocolError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < IMAGE_END_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: IMAGE_END_LEN,
                actual: data.len(),
            });
        }
        let u32_at = |i: usize| bytes_to_u32_le([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            exp_time_ms: u32_at(0),
            read_time_ms: u32_at(4),
            end_time_ms: u32_at(8),
        })
    }
}
