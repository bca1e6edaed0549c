//! 几何规划
//!
//! 把 {传感器型号, 合并因子, ADC 速度, 区域选择方式} 映射为时钟序列载荷和
//! 经过边界检查的像素矩形。
//!
//! 坐标约定：
//! - 线路矩形（[`WireRect`]）使用未合并传感器坐标，含过扫描区
//! - 可见矩形（[`VisibleRect`]）使用合并坐标，原点相对有效区左上角
//!
//! 所有区域计算都是纯函数，先得到完整候选状态再一次性提交；越界时返回
//! [`Bounds`] 标志，状态保持原样。

use crate::DriverError;
use audine_protocol::{
    AdcSpeed, Extent, GeometryRecord, MAX_BINNING, SEQ_KCOL, SENSOR_CATALOG, SensorModel,
    TEST_PATTERN_OFFSET, WireRect,
};
use audine_tools::{FitsError, MetadataSink, PhotometryConfig};
use std::fmt;
use std::ops::BitOr;
use tracing::{debug, info, warn};

// ==================== 类型定义 ====================

/// 边界检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bounds {
    #[default]
    Ok,
    /// X 方向越界
    XOutOfBounds,
    /// Y 方向越界
    YOutOfBounds,
    /// 两个方向都越界
    BothOutOfBounds,
}

impl Bounds {
    fn from_flags(x: bool, y: bool) -> Self {
        match (x, y) {
            (false, false) => Bounds::Ok,
            (true, false) => Bounds::XOutOfBounds,
            (false, true) => Bounds::YOutOfBounds,
            (true, true) => Bounds::BothOutOfBounds,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Bounds::Ok
    }

    fn x(self) -> bool {
        matches!(self, Bounds::XOutOfBounds | Bounds::BothOutOfBounds)
    }

    fn y(self) -> bool {
        matches!(self, Bounds::YOutOfBounds | Bounds::BothOutOfBounds)
    }
}

impl BitOr for Bounds {
    type Output = Bounds;

    fn bitor(self, rhs: Bounds) -> Bounds {
        Bounds::from_flags(self.x() || rhs.x(), self.y() || rhs.y())
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bounds::Ok => "ok",
            Bounds::XOutOfBounds => "X out of bounds",
            Bounds::YOutOfBounds => "Y out of bounds",
            Bounds::BothOutOfBounds => "X and Y out of bounds",
        };
        f.write_str(s)
    }
}

/// 区域选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// 全幅（仅有效区）
    #[default]
    FullFrame,
    /// 全幅含过扫描区
    FullFrameOverscan,
    /// 预设正方形
    Presets,
    /// 用户自定义矩形
    UserDefined,
}

/// 预设位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// 左上角（读出最快）
    #[default]
    Corner1,
    /// 右上角
    Corner2,
    /// 左下角
    Corner3,
    /// 右下角（读出最慢）
    Corner4,
    /// 中心
    Center,
}

/// 可见矩形（合并坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRect {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: i32,
    pub height: i32,
}

impl VisibleRect {
    pub const fn new(origin_x: i32, origin_y: i32, width: i32, height: i32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }
}

/// 区域选择请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaSelection {
    FullFrame,
    FullFrameOverscan,
    Preset { preset: Preset, width: i32 },
    UserDefined(VisibleRect),
}

/// IRAF 风格区段（1 起始，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub x1: i32,
    pub x2: i32,
    pub y1: i32,
    pub y2: i32,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{},{}:{}]", self.x1, self.x2, self.y1, self.y2)
    }
}

/// 过扫描模式下的偏置区和裁剪区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverscanSections {
    pub bias: Section,
    pub trim: Section,
}

/// 几何状态
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryState {
    pub model: usize,
    pub binning: u8,
    pub adc: AdcSpeed,
    pub mode: SelectionMode,
    pub preset: Preset,
    /// 预设正方形边长（合并像素）
    pub preset_width: i32,
    pub visible: VisibleRect,
    pub wire: WireRect,
    pub sections: Option<OverscanSections>,
    pub test_pattern: bool,
    pub photometry: PhotometryConfig,
}

/// 候选区域（尚未提交）
#[derive(Debug, Clone, Copy)]
struct Candidate {
    binning: u8,
    mode: SelectionMode,
    preset: Preset,
    preset_width: i32,
    visible: VisibleRect,
    wire: WireRect,
    sections: Option<OverscanSections>,
}

// ==================== 对齐与边界 ====================

/// 向上对齐到 `factor` 的倍数
fn align_up(value: i32, factor: i32) -> i32 {
    let rem = value % factor;
    if rem == 0 { value } else { value + factor - rem }
}

/// 向下对齐到 `factor` 的倍数
fn align_down(value: i32, factor: i32) -> i32 {
    value - value % factor
}

/// 对齐后的过扫描偏移（x 对齐到 binning×SEQ_KCOL，y 对齐到 binning）
fn aligned_origin(model: &SensorModel, bin: i32) -> Extent {
    Extent::new(
        align_up(model.overscan_before.x, bin * SEQ_KCOL),
        align_up(model.overscan_before.y, bin),
    )
}

/// 检查矩形是否落在 `[lo, hi]` 内且非空
fn check_within(rect: &WireRect, lo: Extent, hi: Extent) -> Bounds {
    let x = rect.x1 < lo.x || rect.x2 > hi.x || rect.x2 <= rect.x1;
    let y = rect.y1 < lo.y || rect.y2 > hi.y || rect.y2 <= rect.y1;
    Bounds::from_flags(x, y)
}

/// 检查矩形是否落在有效区内
fn check_active(model: &SensorModel, rect: &WireRect) -> Bounds {
    check_within(rect, model.overscan_before, model.active_end())
}

// ==================== 区域算法（纯函数） ====================

fn full_frame(model: &SensorModel, binning: u8) -> Result<Candidate, Bounds> {
    let bin = i32::from(binning);
    let origin = aligned_origin(model, bin);
    let end = model.active_end();
    let wire = WireRect::new(
        origin.x,
        origin.y,
        align_down(end.x, bin),
        align_down(end.y, bin),
    );
    let bounds = check_active(model, &wire);
    if !bounds.is_ok() {
        return Err(bounds);
    }
    Ok(Candidate {
        binning,
        mode: SelectionMode::FullFrame,
        preset: Preset::default(),
        preset_width: 0,
        visible: VisibleRect::new(
            (wire.x1 - model.overscan_before.x) / bin,
            (wire.y1 - model.overscan_before.y) / bin,
            wire.width() / bin,
            wire.height() / bin,
        ),
        wire,
        sections: None,
    })
}

fn full_frame_overscan(model: &SensorModel, binning: u8) -> Result<Candidate, Bounds> {
    let bin = i32::from(binning);
    let total = model.max_extent();
    let wire = WireRect::new(0, 0, align_down(total.x, bin), align_down(total.y, bin));
    let bounds = check_within(&wire, Extent::default(), total);
    if !bounds.is_ok() {
        return Err(bounds);
    }
    let dim_x = wire.x2 / bin;
    let dim_y = wire.y2 / bin;
    Ok(Candidate {
        binning,
        mode: SelectionMode::FullFrameOverscan,
        preset: Preset::default(),
        preset_width: 0,
        visible: VisibleRect::new(0, 0, dim_x, dim_y),
        wire,
        sections: Some(overscan_sections(model, bin, dim_x, dim_y)),
    })
}

/// 偏置区：最后一列；裁剪区：有效区去掉合并余数
fn overscan_sections(model: &SensorModel, bin: i32, dim_x: i32, dim_y: i32) -> OverscanSections {
    // y 起点为经验值
    let bias = Section {
        x1: dim_x,
        x2: dim_x,
        y1: (model.overscan_before.y + 8 * bin) / bin + 1,
        y2: dim_y,
    };
    let end = model.active_end();
    let trim = Section {
        x1: align_up(model.overscan_before.x, bin) / bin + 1,
        x2: align_down(end.x, bin) / bin,
        y1: align_up(model.overscan_before.y, bin) / bin + 1,
        y2: align_down(end.y, bin) / bin,
    };
    OverscanSections { bias, trim }
}

fn user_defined(model: &SensorModel, binning: u8, rect: VisibleRect) -> Result<Candidate, Bounds> {
    let bin = i32::from(binning);
    let x1 = model.overscan_before.x + rect.origin_x * bin;
    let y1 = model.overscan_before.y + rect.origin_y * bin;
    let wire = WireRect::new(x1, y1, x1 + rect.width * bin, y1 + rect.height * bin);
    let bounds = check_active(model, &wire);
    if !bounds.is_ok() {
        return Err(bounds);
    }
    Ok(Candidate {
        binning,
        mode: SelectionMode::UserDefined,
        preset: Preset::default(),
        preset_width: 0,
        visible: rect,
        wire,
        sections: None,
    })
}

fn preset_square(
    model: &SensorModel,
    binning: u8,
    preset: Preset,
    width: i32,
) -> Result<Candidate, Bounds> {
    let bin = i32::from(binning);
    let pix_width = width * bin;
    let origin = aligned_origin(model, bin);

    // 右/下侧预设：从有效区末端回退并按过扫描偏移取整
    let far = |active: i32, step: i32| {
        let v = active - pix_width;
        if step > 0 { v - v % step } else { v }
    };
    let center = |active: i32, step: i32| {
        let v = (active - pix_width) / 2;
        if step > 0 { v - v % step } else { v }
    };

    let (x1, y1) = match preset {
        Preset::Corner1 => (origin.x, origin.y),
        Preset::Corner2 => (far(model.active.x, origin.x), origin.y),
        Preset::Corner3 => (origin.x, far(model.active.y, origin.y)),
        Preset::Corner4 => (far(model.active.x, origin.x), far(model.active.y, origin.y)),
        Preset::Center => (
            center(model.active.x, origin.x),
            center(model.active.y, origin.y),
        ),
    };
    let wire = WireRect::new(x1, y1, x1 + pix_width, y1 + pix_width);
    let bounds = check_active(model, &wire);
    if !bounds.is_ok() {
        return Err(bounds);
    }
    Ok(Candidate {
        binning,
        mode: SelectionMode::Presets,
        preset,
        preset_width: width,
        visible: VisibleRect::new(
            (x1 - model.overscan_before.x) / bin,
            (y1 - model.overscan_before.y) / bin,
            width,
            width,
        ),
        wire,
        sections: None,
    })
}

// ==================== 几何规划器 ====================

/// 几何规划器
///
/// 只在 Ready 状态下由几何命令修改；其它组件只读。
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryPlanner {
    state: GeometryState,
}

impl Default for GeometryPlanner {
    fn default() -> Self {
        let model = &SENSOR_CATALOG[0];
        let mut planner = Self {
            state: GeometryState {
                model: 0,
                binning: 1,
                adc: AdcSpeed::Slow,
                mode: SelectionMode::FullFrame,
                preset: Preset::Corner1,
                preset_width: 0,
                visible: VisibleRect::default(),
                wire: WireRect::default(),
                sections: None,
                test_pattern: false,
                photometry: PhotometryConfig::default(),
            },
        };
        if let Ok(candidate) = full_frame(model, 1) {
            planner.commit(candidate);
        }
        planner
    }
}

impl GeometryPlanner {
    /// 按初始参数创建（全幅选择）
    pub fn new(model: usize, binning: u8, adc: AdcSpeed) -> Result<Self, DriverError> {
        let mut planner = Self::default();
        planner.select_model(model)?;
        planner.select_binning(binning)?;
        planner.select_speed(adc);
        Ok(planner)
    }

    /// 当前状态（只读）
    pub fn state(&self) -> &GeometryState {
        &self.state
    }

    /// 当前传感器型号
    pub fn model(&self) -> &'static SensorModel {
        &SENSOR_CATALOG[self.state.model]
    }

    // ==================== 型号 / 速度 / 合并 ====================

    /// 切换传感器型号
    ///
    /// 重新应用当前区域选择；若在新型号上越界则回退到全幅，并返回越界标志。
    pub fn select_model(&mut self, index: usize) -> Result<Bounds, DriverError> {
        if index >= SENSOR_CATALOG.len() {
            return Err(DriverError::InvalidInput(format!(
                "sensor model index {} (catalog has {})",
                index,
                SENSOR_CATALOG.len()
            )));
        }
        self.state.model = index;
        let model = self.model();

        let result = match self.state.mode {
            SelectionMode::FullFrame => full_frame(model, self.state.binning),
            SelectionMode::FullFrameOverscan => full_frame_overscan(model, self.state.binning),
            SelectionMode::Presets => preset_square(
                model,
                self.state.binning,
                self.state.preset,
                self.state.preset_width,
            ),
            SelectionMode::UserDefined => {
                user_defined(model, self.state.binning, self.state.visible)
            },
        };

        let bounds = match result {
            Ok(candidate) => {
                self.commit(candidate);
                Bounds::Ok
            },
            Err(bounds) => {
                warn!(
                    "Selection {:?} out of bounds on {} ({}), falling back to full frame",
                    self.state.mode, model.name, bounds
                );
                self.apply_full_frame_fallback();
                bounds
            },
        };
        info!("Sensor model set to {}", model.name);
        Ok(bounds)
    }

    /// 切换 ADC 速度（只影响读出序列）
    pub fn select_speed(&mut self, adc: AdcSpeed) {
        self.state.adc = adc;
        debug!("ADC speed set to {:?}", adc);
    }

    /// 切换合并因子
    ///
    /// 全幅类模式直接重算；预设和自定义矩形按比例缩放，缩放后越界则拒绝。
    pub fn select_binning(&mut self, factor: u8) -> Result<Bounds, DriverError> {
        if !(1..=MAX_BINNING).contains(&factor) {
            return Err(DriverError::InvalidInput(format!(
                "binning factor {} (expected 1..={})",
                factor, MAX_BINNING
            )));
        }
        let model = self.model();
        let old = i32::from(self.state.binning);
        let new = i32::from(factor);

        let result = match self.state.mode {
            SelectionMode::FullFrame => full_frame(model, factor),
            SelectionMode::FullFrameOverscan => full_frame_overscan(model, factor),
            SelectionMode::Presets => {
                let width = old * self.state.preset_width / new;
                preset_square(model, factor, self.state.preset, width)
            },
            SelectionMode::UserDefined => {
                let v = self.state.visible;
                let scaled = VisibleRect::new(
                    v.origin_x * old / new,
                    v.origin_y * old / new,
                    v.width * old / new,
                    v.height * old / new,
                );
                user_defined(model, factor, scaled)
            },
        };
        Ok(self.commit_or_reject(result, "binning change"))
    }

    /// 开关硬件测试图样
    pub fn set_test_pattern(&mut self, on: bool) {
        self.state.test_pattern = on;
    }

    /// 设置光度参数
    pub fn set_photometry(&mut self, photometry: PhotometryConfig) {
        self.state.photometry = photometry;
    }

    // ==================== 区域选择 ====================

    /// 应用区域选择
    pub fn apply_area_selection(&mut self, selection: AreaSelection) -> Bounds {
        let model = self.model();
        let binning = self.state.binning;
        let result = match selection {
            AreaSelection::FullFrame => full_frame(model, binning),
            AreaSelection::FullFrameOverscan => full_frame_overscan(model, binning),
            AreaSelection::Preset { preset, width } => {
                preset_square(model, binning, preset, width)
            },
            AreaSelection::UserDefined(rect) => user_defined(model, binning, rect),
        };
        self.commit_or_reject(result, "area selection")
    }

    fn commit_or_reject(&mut self, result: Result<Candidate, Bounds>, what: &str) -> Bounds {
        match result {
            Ok(candidate) => {
                self.commit(candidate);
                debug!(
                    "Geometry committed after {}: wire {:?}, visible {:?}",
                    what, self.state.wire, self.state.visible
                );
                Bounds::Ok
            },
            Err(bounds) => {
                warn!("Rejected {}: {}", what, bounds);
                bounds
            },
        }
    }

    fn apply_full_frame_fallback(&mut self) {
        if let Ok(candidate) = full_frame(self.model(), self.state.binning) {
            self.commit(candidate);
        }
    }

    fn commit(&mut self, c: Candidate) {
        self.state.binning = c.binning;
        self.state.mode = c.mode;
        if c.mode == SelectionMode::Presets {
            self.state.preset = c.preset;
            self.state.preset_width = c.preset_width;
        }
        self.state.visible = c.visible;
        self.state.wire = c.wire;
        self.state.sections = c.sections;
    }

    // ==================== 只读查询 ====================

    /// 传感器最大尺寸（未合并，含过扫描）
    pub fn max_dimensions(&self) -> Extent {
        self.model().max_extent()
    }

    /// 可见尺寸（合并后）
    ///
    /// 全幅含过扫描时为整片传感器，否则为有效区。
    pub fn visible_dimensions(&self) -> Extent {
        let bin = i32::from(self.state.binning);
        let model = self.model();
        match self.state.mode {
            SelectionMode::FullFrameOverscan => {
                let total = model.max_extent();
                Extent::new(total.x / bin, total.y / bin)
            },
            _ => Extent::new(model.active.x / bin, model.active.y / bin),
        }
    }

    /// 硬件实际传送的图像尺寸（合并像素）
    pub fn image_dimensions(&self) -> (u32, u32) {
        let bin = i32::from(self.state.binning);
        let w = self.state.wire.width() / bin;
        let h = self.state.wire.height() / bin;
        (w.max(0) as u32, h.max(0) as u32)
    }

    /// 合并后的像素尺寸（微米）
    pub fn pixel_size_um(&self) -> f64 {
        self.model().pixel_size_um * f64::from(self.state.binning)
    }

    /// 合并编码值（测试图样时加偏移）
    pub fn encoded_binning(&self) -> u8 {
        if self.state.test_pattern {
            self.state.binning + TEST_PATTERN_OFFSET
        } else {
            self.state.binning
        }
    }

    /// 生成几何子记录（时钟序列按当前组合重新选取）
    ///
    /// 传感器全尺寸超出线路字段（i16）时返回 `InvalidInput`。
    pub fn record(&self) -> Result<GeometryRecord, DriverError> {
        let model = self.model();
        let total = model.max_extent();
        let wire_extent = |value: i32, axis: &str| {
            i16::try_from(value).map_err(|_| {
                DriverError::InvalidInput(format!(
                    "{} sensor {} {} exceeds the wire field",
                    model.name, axis, value
                ))
            })
        };
        Ok(GeometryRecord {
            cols: wire_extent(total.x, "width")?,
            rows: wire_extent(total.y, "height")?,
            rect: self.state.wire,
            binning: self.encoded_binning(),
            sequences: model.clock_sequences(self.state.binning, self.state.adc),
        })
    }

    /// 写入几何相关的元数据关键字
    pub fn publish_metadata(
        &self,
        sink: &mut dyn MetadataSink,
        device: &str,
    ) -> Result<(), FitsError> {
        let bin = i64::from(self.state.binning);
        let pixel = self.pixel_size_um();

        sink.set("PIXSZ1", pixel.into(), "[um] equivalent pixel size")?;
        sink.set("PIXSZ2", pixel.into(), "[um] equivalent pixel size")?;
        sink.set("CCDBIN1", bin.into(), "binned columns")?;
        sink.set("CCDBIN2", bin.into(), "binned rows")?;
        sink.set(
            "INSTRUME",
            format!("{} {} + COR", device, self.model().name).into(),
            "instrument",
        )?;

        match self.state.sections {
            Some(sections) => {
                sink.set(
                    "BIASSEC",
                    sections.bias.to_string().into(),
                    "overscan portion of frame",
                )?;
                sink.set(
                    "TRIMSEC",
                    sections.trim.to_string().into(),
                    "region to be extracted",
                )?;
            },
            None => {
                sink.erase("BIASSEC");
                sink.erase("TRIMSEC");
            },
        }

        let photometry = self.state.photometry;
        if photometry.gain != 0.0 {
            let noise = photometry.readout_noise * (bin * bin) as f64;
            sink.set("GAIN", photometry.gain.into(), "[e-/ADU] CCD gain")?;
            sink.set("RDNOISE", noise.into(), "[e-] binning-dependent readout noise")?;
        } else {
            sink.erase("GAIN");
            sink.erase("RDNOISE");
        }
        Ok(())
    }
}
