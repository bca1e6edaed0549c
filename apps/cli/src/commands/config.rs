//! 配置管理命令
//!
//! 相机配置保存在 `<config_dir>/audine/camera.toml`。

use anyhow::{Context, Result};
use audine_protocol::ShutterLogic;
use audine_tools::CameraConfig;
use clap::Subcommand;
use std::path::{Path, PathBuf};

use super::AdcArg;

/// 默认配置文件路径
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("audine");
    path.push("camera.toml");
    Ok(path)
}

/// 加载配置（文件不存在时返回默认配置）
pub fn load_config(path: &Path) -> Result<CameraConfig> {
    if !path.exists() {
        return Ok(CameraConfig::default());
    }
    CameraConfig::load(path)
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 传感器型号索引
        #[arg(long)]
        model: Option<usize>,

        /// 合并因子（1-4）
        #[arg(long)]
        binning: Option<u8>,

        /// ADC 速度
        #[arg(long, value_enum)]
        adc: Option<AdcArg>,

        /// 外设地址
        #[arg(long)]
        peripheral: Option<u8>,

        /// 图像输出目录
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// 图像文件名前缀
        #[arg(long)]
        prefix: Option<String>,

        /// 曝光前清除次数
        #[arg(long)]
        clear: Option<u8>,

        /// 快门延迟（毫秒）
        #[arg(long)]
        shutter_delay: Option<u32>,

        /// 快门反逻辑
        #[arg(long)]
        shutter_inverted: Option<bool>,
    },

    /// 获取配置项（点号分隔，如 `shutter.delay_ms`）
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                model,
                binning,
                adc,
                peripheral,
                output_dir,
                prefix,
                clear,
                shutter_delay,
                shutter_inverted,
            } => {
                let mut config = load_config(path)?;
                if let Some(v) = model {
                    config.model = v;
                }
                if let Some(v) = binning {
                    config.binning = v;
                }
                if let Some(v) = adc {
                    config.adc_speed = v.into();
                }
                if let Some(v) = peripheral {
                    config.peripheral = v;
                }
                if let Some(v) = output_dir {
                    config.output_dir = v;
                }
                if let Some(v) = prefix {
                    config.file_prefix = v;
                }
                if let Some(v) = clear {
                    config.clear_count = v;
                }
                if let Some(v) = shutter_delay {
                    config.shutter.delay_ms = v;
                }
                if let Some(v) = shutter_inverted {
                    config.shutter.logic = if v {
                        ShutterLogic::Inverted
                    } else {
                        ShutterLogic::Normal
                    };
                }
                // 保存前校验型号与合并因子
                audine_driver::GeometryPlanner::new(config.model, config.binning, config.adc_speed)
                    .context("配置无效")?;
                config.save(path)?;
                println!("✅ 配置已保存: {}", path.display());
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let config = load_config(path)?;
                let content = config.to_toml_string()?;
                if key == "all" {
                    print!("{}", content);
                    return Ok(());
                }
                let table: toml::Table = toml::from_str(&content).context("解析配置失败")?;
                let value = key
                    .split('.')
                    .try_fold(None::<&toml::Value>, |current, part| {
                        let next = match current {
                            None => table.get(part),
                            Some(value) => value.get(part),
                        };
                        next.map(Some)
                    })
                    .flatten();
                match value {
                    Some(value) => println!("{}", value),
                    None => println!("(未设置)"),
                }
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", path.display());
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_persists_and_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camera.toml");

        ConfigCommand::Set {
            model: Some(1),
            binning: Some(2),
            adc: None,
            peripheral: None,
            output_dir: None,
            prefix: Some("m42".to_string()),
            clear: None,
            shutter_delay: Some(300),
            shutter_inverted: Some(true),
        }
        .execute(&path)
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model, 1);
        assert_eq!(config.binning, 2);
        assert_eq!(config.file_prefix, "m42");
        assert_eq!(config.shutter.delay_ms, 300);
        assert_eq!(config.shutter.logic, ShutterLogic::Inverted);

        // 无效合并因子不写入
        let bad = ConfigCommand::Set {
            model: None,
            binning: Some(7),
            adc: None,
            peripheral: None,
            output_dir: None,
            prefix: None,
            clear: None,
            shutter_delay: None,
            shutter_inverted: None,
        };
        assert!(bad.execute(&path).is_err());
        assert_eq!(load_config(&path).unwrap().binning, 2);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CameraConfig::default());
    }
}
