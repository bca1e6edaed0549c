//! # 相机配置
//!
//! 采集核心的启动参数，以 TOML 文件保存。缺省字段取默认值。
//!
//! ```toml
//! device = "Audine"
//! peripheral = 32
//! output_dir = "/data/images"
//! model = 1
//! binning = 2
//! adc_speed = "fast"
//!
//! [shutter]
//! delay_ms = 300
//! logic = "inverted"
//! ```

use anyhow::{Context, Result};
use audine_protocol::{AdcSpeed, ShutterLogic};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 相机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// 设备名称（INSTRUME 关键字前缀）
    pub device: String,
    /// COR 集线器上的外设地址
    pub peripheral: u8,
    /// 图像输出目录
    pub output_dir: PathBuf,
    /// 图像文件名前缀
    pub file_prefix: String,
    /// 传感器型号索引
    pub model: usize,
    /// 合并因子（1-4）
    pub binning: u8,
    /// ADC 速度
    pub adc_speed: AdcSpeed,
    /// 曝光前清除次数
    pub clear_count: u8,
    /// 硬件测试图样
    pub test_pattern: bool,
    /// 快门
    pub shutter: ShutterConfig,
    /// 方向变换
    pub transform: TransformConfig,
    /// 光度参数
    pub photometry: PhotometryConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "Audine".to_string(),
            peripheral: 0x20,
            output_dir: PathBuf::from("."),
            file_prefix: "img".to_string(),
            model: 0,
            binning: 1,
            adc_speed: AdcSpeed::Slow,
            clear_count: 2,
            test_pattern: false,
            shutter: ShutterConfig::default(),
            transform: TransformConfig::default(),
            photometry: PhotometryConfig::default(),
        }
    }
}

/// 快门配置
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutterConfig {
    /// 快门开启延迟（毫秒）
    pub delay_ms: u32,
    /// 驱动逻辑
    pub logic: ShutterLogic,
}

/// 方向变换配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// 左右翻转
    pub flip_lr: bool,
    /// 上下翻转
    pub flip_ud: bool,
}

/// 光度参数（增益为 0 时不写入 GAIN/RDNOISE）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotometryConfig {
    /// 增益（e-/ADU）
    pub gain: f64,
    /// 读出噪声（e-）
    pub readout_noise: f64,
}

impl CameraConfig {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("解析相机配置失败")
    }

    /// 序列化为 TOML 字符串
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化相机配置失败")
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("创建配置目录失败")?;
        }
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!(config.binning, 1);
        assert_eq!(config.adc_speed, AdcSpeed::Slow);
        assert_eq!(config.shutter.logic, ShutterLogic::Normal);
        assert!(!config.transform.flip_ud);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CameraConfig::from_toml_str(
            r#"
            model = 2
            adc_speed = "fast"

            [shutter]
            logic = "inverted"
            "#,
        )
        .unwrap();

        assert_eq!(config.model, 2);
        assert_eq!(config.adc_speed, AdcSpeed::Fast);
        assert_eq!(config.shutter.logic, ShutterLogic::Inverted);
        assert_eq!(config.shutter.delay_ms, 0);
        assert_eq!(config.device, "Audine");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(CameraConfig::from_toml_str("binning = \"two\"").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audine").join("camera.toml");

        let mut config = CameraConfig::default();
        config.binning = 3;
        config.transform.flip_lr = true;
        config.photometry.gain = 2.3;
        config.save(&path).unwrap();

        let loaded = CameraConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(CameraConfig::load(dir.path().join("nope.toml")).is_err());
    }
}
