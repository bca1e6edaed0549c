//! 超时预测命令

use anyhow::Result;
use audine_driver::{GeometryPlanner, predict_timeouts};
use audine_tools::CameraConfig;
use clap::Args;

use super::{AdcArg, AreaArgs};

/// 超时预测参数
#[derive(Args, Debug)]
pub struct TimeoutsCommand {
    /// 曝光时长（秒）
    #[arg(short, long)]
    pub exposure: f64,

    /// 传感器型号索引（默认取配置）
    #[arg(long)]
    pub model: Option<usize>,

    /// 合并因子（默认取配置）
    #[arg(long)]
    pub binning: Option<u8>,

    /// ADC 速度（默认取配置）
    #[arg(long, value_enum)]
    pub adc: Option<AdcArg>,

    /// 曝光前清除次数（默认取配置）
    #[arg(long)]
    pub clear: Option<u8>,

    /// 快门延迟毫秒（默认取配置）
    #[arg(long)]
    pub shutter_delay: Option<u32>,

    #[command(flatten)]
    pub area: AreaArgs,
}

impl TimeoutsCommand {
    pub fn execute(&self, config: &CameraConfig) -> Result<()> {
        let mut planner = GeometryPlanner::new(
            self.model.unwrap_or(config.model),
            self.binning.unwrap_or(config.binning),
            self.adc.map(Into::into).unwrap_or(config.adc_speed),
        )?;
        let bounds = planner.apply_area_selection(self.area.selection());
        if !bounds.is_ok() {
            anyhow::bail!("区域选择越界: {}", bounds);
        }

        let prediction = predict_timeouts(
            &planner,
            self.clear.unwrap_or(config.clear_count),
            self.exposure,
            self.shutter_delay.unwrap_or(config.shutter.delay_ms),
        );
        let (width, height) = planner.image_dimensions();
        println!("{} {}x{}:", planner.model().name, width, height);
        println!("  exposure timeout: {} ms", prediction.exposure_ms);
        println!("  readout timeout:  {} ms", prediction.readout_ms);
        Ok(())
    }
}
