//! 几何规划命令
//!
//! 离线计算区域选择对应的线路矩形、图像尺寸和过扫描区段，输出 JSON。

use anyhow::{Context, Result, bail};
use audine_driver::GeometryPlanner;
use audine_tools::CameraConfig;
use clap::Args;
use serde_json::json;

use super::{AdcArg, AreaArgs};

/// 几何规划参数
#[derive(Args, Debug)]
pub struct GeometryCommand {
    /// 传感器型号索引（默认取配置）
    #[arg(long)]
    pub model: Option<usize>,

    /// 合并因子（默认取配置）
    #[arg(long)]
    pub binning: Option<u8>,

    /// ADC 速度（默认取配置）
    #[arg(long, value_enum)]
    pub adc: Option<AdcArg>,

    #[command(flatten)]
    pub area: AreaArgs,
}

impl GeometryCommand {
    pub fn execute(&self, config: &CameraConfig) -> Result<()> {
        let planner = self.plan(config)?;
        println!("{}", serde_json::to_string_pretty(&describe(&planner)?)?);
        Ok(())
    }

    fn plan(&self, config: &CameraConfig) -> Result<GeometryPlanner> {
        let mut planner = GeometryPlanner::new(
            self.model.unwrap_or(config.model),
            self.binning.unwrap_or(config.binning),
            self.adc.map(Into::into).unwrap_or(config.adc_speed),
        )?;
        let bounds = planner.apply_area_selection(self.area.selection());
        if !bounds.is_ok() {
            bail!("区域选择越界: {}", bounds);
        }
        Ok(planner)
    }
}

/// 几何状态的 JSON 描述
pub fn describe(planner: &GeometryPlanner) -> Result<serde_json::Value> {
    let state = planner.state();
    let record = planner.record().context("生成几何子记录失败")?;
    let (width, height) = planner.image_dimensions();
    let visible = planner.visible_dimensions();
    Ok(json!({
        "model": planner.model().name,
        "binning": state.binning,
        "encoded_binning": planner.encoded_binning(),
        "mode": format!("{:?}", state.mode),
        "wire": [state.wire.x1, state.wire.y1, state.wire.x2, state.wire.y2],
        "image": [width, height],
        "visible": [visible.x, visible.y],
        "selection": [
            state.visible.origin_x,
            state.visible.origin_y,
            state.visible.width,
            state.visible.height,
        ],
        "sensor": [record.cols, record.rows],
        "pixel_size_um": planner.pixel_size_um(),
        "biassec": state.sections.map(|s| s.bias.to_string()),
        "trimsec": state.sections.map(|s| s.trim.to_string()),
        "readout_sequence_len": record.sequences.readout.len(),
    }))
}
