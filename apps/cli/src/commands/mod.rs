//! 命令定义和实现

pub mod config;
pub mod geometry;
pub mod simulate;
pub mod timeouts;

pub use config::ConfigCommand;
pub use geometry::GeometryCommand;
pub use simulate::SimulateCommand;
pub use timeouts::TimeoutsCommand;

use audine_driver::{ImageCategory, Preset};
use audine_protocol::AdcSpeed;
use clap::ValueEnum;

/// ADC 速度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdcArg {
    Slow,
    Fast,
}

impl From<AdcArg> for AdcSpeed {
    fn from(arg: AdcArg) -> Self {
        match arg {
            AdcArg::Slow => AdcSpeed::Slow,
            AdcArg::Fast => AdcSpeed::Fast,
        }
    }
}

/// 预设位置参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    Corner1,
    Corner2,
    Corner3,
    Corner4,
    Center,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Corner1 => Preset::Corner1,
            PresetArg::Corner2 => Preset::Corner2,
            PresetArg::Corner3 => Preset::Corner3,
            PresetArg::Corner4 => Preset::Corner4,
            PresetArg::Center => Preset::Center,
        }
    }
}

/// 图像类别参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Object,
    Dark,
    Flat,
    Bias,
    Focus,
}

impl From<CategoryArg> for ImageCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Object => ImageCategory::Object,
            CategoryArg::Dark => ImageCategory::Dark,
            CategoryArg::Flat => ImageCategory::Flat,
            CategoryArg::Bias => ImageCategory::Bias,
            CategoryArg::Focus => ImageCategory::Focus,
        }
    }
}

/// 区域选择参数（geometry 与 simulate 共用）
#[derive(clap::Args, Debug, Clone)]
pub struct AreaArgs {
    /// 全幅含过扫描区
    #[arg(long, conflicts_with_all = ["preset", "rect"])]
    pub overscan: bool,

    /// 预设正方形位置
    #[arg(long, value_enum, requires = "width", conflicts_with = "rect")]
    pub preset: Option<PresetArg>,

    /// 预设正方形边长（合并像素）
    #[arg(long)]
    pub width: Option<i32>,

    /// 用户矩形 x,y,w,h（合并坐标）
    #[arg(long, value_delimiter = ',', num_args = 4)]
    pub rect: Option<Vec<i32>>,
}

impl AreaArgs {
    pub fn selection(&self) -> audine_driver::AreaSelection {
        use audine_driver::{AreaSelection, VisibleRect};

        if self.overscan {
            return AreaSelection::FullFrameOverscan;
        }
        if let (Some(preset), Some(width)) = (self.preset, self.width) {
            return AreaSelection::Preset {
                preset: preset.into(),
                width,
            };
        }
        match self.rect.as_deref() {
            Some(&[x, y, w, h]) => AreaSelection::UserDefined(VisibleRect::new(x, y, w, h)),
            _ => AreaSelection::FullFrame,
        }
    }
}
