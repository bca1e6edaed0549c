//! 附加元数据
//!
//! 与几何和曝光计数无关、但随每幅图像保存的关键字：
//! - 视场标定种子（CDELT1/CDELT2/CROTA2，仅天体图像）
//! - 用户注释（一张 COMMENT 卡片）
//! - 集线器遥测（CCD 温度、固件版本）

use crate::DriverError;
use crate::sequencer::ImageCategory;
use audine_tools::{FitsError, MetadataSink};

/// 字符串卡片可容纳的最大长度
const TEXT_VALUE_MAX: usize = 68;

const WCS_KEYS: [&str; 3] = ["CDELT1", "CDELT2", "CROTA2"];

// ==================== 视场标定 ====================

/// 视场标定种子
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WcsSeed {
    /// 像素比例（角秒/像素），0 表示未标定
    pub scale_arcsec: f64,
    /// 视场旋转（度）
    pub rotation_deg: f64,
}

impl WcsSeed {
    pub fn validate(&self) -> Result<(), DriverError> {
        if !self.scale_arcsec.is_finite() || self.scale_arcsec < 0.0 {
            return Err(DriverError::InvalidInput(format!(
                "WCS scale {} arcsec/pixel",
                self.scale_arcsec
            )));
        }
        if !self.rotation_deg.is_finite() {
            return Err(DriverError::InvalidInput(format!(
                "WCS rotation {} deg",
                self.rotation_deg
            )));
        }
        Ok(())
    }

    /// 写入比例和旋转；非天体图像或未标定时删除这三个关键字
    pub fn publish_metadata(
        &self,
        sink: &mut dyn MetadataSink,
        category: ImageCategory,
    ) -> Result<(), FitsError> {
        let scale_deg = self.scale_arcsec / 3600.0;
        if category != ImageCategory::Object || scale_deg == 0.0 {
            for key in WCS_KEYS {
                sink.erase(key);
            }
            return Ok(());
        }
        sink.set("CDELT1", scale_deg.into(), "[deg/pixel] image scale")?;
        sink.set("CDELT2", scale_deg.into(), "[deg/pixel] image scale")?;
        sink.set("CROTA2", self.rotation_deg.into(), "[deg] field rotation")
    }
}

// ==================== 用户注释 ====================

/// 用户注释
///
/// 头部自带的 COMMENT 卡片保持不动：首次设置非空文本时追加一张，
/// 之后原位替换，设置为空时删除。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserComment {
    text: Option<String>,
}

impl UserComment {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn update(&mut self, text: &str, sink: &mut dyn MetadataSink) -> Result<(), FitsError> {
        match (&self.text, text.is_empty()) {
            (None, false) => sink.append_void("COMMENT", text)?,
            (Some(_), false) => sink.set_void("COMMENT", text)?,
            (Some(_), true) => sink.erase("COMMENT"),
            (None, true) => {},
        }
        self.text = (!text.is_empty()).then(|| text.to_string());
        Ok(())
    }
}

// ==================== 集线器遥测 ====================

/// 集线器遥测
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// 冷端/散热器温度（°C）和帕尔贴电压（V）
    Temperature {
        cold_c: f64,
        hot_c: f64,
        peltier_v: f64,
    },
    /// COR 固件版本
    Firmware {
        program: String,
        date: String,
        time: String,
    },
}

impl Telemetry {
    pub fn publish_metadata(&self, sink: &mut dyn MetadataSink) -> Result<(), FitsError> {
        match self {
            Telemetry::Temperature {
                cold_c,
                hot_c,
                peltier_v,
            } => {
                sink.set("CCD-TEMP", (*cold_c).into(), "[C] cold finger temperature")?;
                sink.set("HOT-TEMP", (*hot_c).into(), "[C] heatsink temperature")?;
                sink.set("VPELT", (*peltier_v).into(), "[V] peltier voltage")
            },
            Telemetry::Firmware {
                program,
                date,
                time,
            } => {
                let version: String = format!("{} {} {}", program, date, time)
                    .chars()
                    .take(TEXT_VALUE_MAX)
                    .collect();
                sink.set("FIRMWARE", version.into(), "COR firmware version")
            },
        }
    }
}
