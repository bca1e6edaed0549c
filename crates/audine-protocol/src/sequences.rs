//! 厂商时钟序列字节表
//!
//! 每个字节驱动一个 CCD 电荷转移时钟节拍。表在编译期固定，只读共享，
//! 通过 [`crate::sensor::SensorModel`] 按型号/合并因子/ADC 速度索引。

// ============================================================================
// 清除序列
// ============================================================================

/// 曝光前清空整个传感器的序列（所有型号通用）
pub const SEQ_CLEAR: &[u8] = &[
    0x09, 0x09, 0x0A, 0x08, 0x09, 0x08, 0x0A, 0x08, 0x09, 0x09, 0x0A, 0x08, 0x09, 0x09, 0x0A,
    0x08, 0x09, 0x09, 0x0A, 0x08, 0x89,
];

// ============================================================================
// 垂直转移序列
// ============================================================================

/// 5 µs 垂直转移（KAF-400 / KAF-1600）
pub const SEQ_V5US: &[u8] = &[0x01, 0x02, 0x01, 0x00];

/// 10 µs 垂直转移（KAF-3000 / KAF-3200）
pub const SEQ_V10US: &[u8] = &[0x01, 0x01, 0x02, 0x02, 0x01, 0x01, 0x00, 0x00];

// ============================================================================
// 读出序列（按合并因子）
// ============================================================================

/// 1x1 合并读出
pub const SEQ_READ_1X1: &[u8] = &[
    0x09, 0x09, 0x0A, 0x08, 0x08, 0x08, 0x08, 0x0C, 0x1C, 0x28, 0x38, 0x48, 0x58, 0x68, 0x79,
    0x09, 0x09, 0x09, 0x09, 0x09, 0x09, 0x01, 0x89, 0x09,
];

/// 2x2 合并读出
pub const SEQ_READ_2X2: &[u8] = &[
    0x09, 0x09, 0x0A, 0x08, 0x08, 0x08, 0x08, 0x0C, 0x1C, 0x28, 0x38, 0x48, 0x58, 0x69, 0x78,
    0x09, 0x09, 0x09, 0x09, 0x09, 0x09, 0x01, 0x89, 0x09,
];

/// 3x3 合并读出
pub const SEQ_READ_3X3: &[u8] = &[
    0x09, 0x09, 0x0A, 0x08, 0x08, 0x08, 0x08, 0x0C, 0x1C, 0x28, 0x38, 0x48, 0x58, 0x69, 0x78,
    0x09, 0x08, 0x09, 0x09, 0x09, 0x09, 0x01, 0x89, 0x09,
];

/// 4x4 合并读出
pub const SEQ_READ_4X4: &[u8] = &[
    0x09, 0x09, 0x0A, 0x08, 0x08, 0x08, 0x08, 0x0C, 0x1C, 0x28, 0x38, 0x49, 0x58, 0x69, 0x78,
    0x09, 0x08, 0x09, 0x09, 0x09, 0x09, 0x01, 0x89, 0x09,
];

/// 读出序列表，索引为 `[binning-1][adc]`（慢速/快速共用同一序列）
pub const SEQ_READ_TABLE: [[&[u8]; 2]; 4] = [
    [SEQ_READ_1X1, SEQ_READ_1X1],
    [SEQ_READ_2X2, SEQ_READ_2X2],
    [SEQ_READ_3X3, SEQ_READ_3X3],
    [SEQ_READ_4X4, SEQ_READ_4X4],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readout_tables_differ_only_in_known_bytes() {
        // 2x2 与 1x1 仅在第 13-14 字节不同
        let diff: Vec<usize> = (0..SEQ_READ_1X1.len())
            .filter(|&i| SEQ_READ_1X1[i] != SEQ_READ_2X2[i])
            .collect();
        assert_eq!(diff, vec![13, 14]);

        // 3x3 在 2x2 基础上改变第 16 字节
        assert_eq!(SEQ_READ_3X3[16], 0x08);
        // 4x4 在 3x3 基础上改变第 11 字节
        assert_eq!(SEQ_READ_4X4[11], 0x49);
    }

    #[test]
    fn test_sequence_lengths() {
        assert_eq!(SEQ_CLEAR.len(), 21);
        assert_eq!(*SEQ_CLEAR.last().unwrap(), 0x89);
        for row in SEQ_READ_TABLE.iter() {
            for seq in row.iter() {
                assert_eq!(seq.len(), 24);
            }
        }
    }
}
