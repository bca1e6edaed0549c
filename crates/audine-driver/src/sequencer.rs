//! 曝光序列器
//!
//! 管理单次采集序列的计数器（延迟、曝光、剩余张数、读出进度），并按经验
//! 常数预测曝光/读出超时。
//!
//! # 超时模型
//!
//! ```text
//! Tclear = n_clear × NR × (Tv + Kc × Tsk / 4)
//! Texp   = max(3000, 1.2 × (Tclear + shutter_ms + 1000 × exposure_s))
//! Tread  = max(3000, 1.2 × (Th × w × h + K1 × h))
//! ```
//!
//! 其中 `Kc = max_width / 5 + 1`，`NR = max_height`，结果截断为整数毫秒。

use crate::DriverError;
use crate::geometry::GeometryPlanner;
use audine_protocol::{AdcSpeed, ExposureTimeRecord, ImageEnd};
use audine_tools::{FitsError, MetadataSink, exposure_start, format_fits_date};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// 定时器节拍（毫秒）
pub const TICK_MS: u32 = 500;

/// 超时下限（毫秒）
pub const TIMEOUT_FLOOR_MS: u32 = 3000;

/// 超时安全系数
pub const TIMEOUT_MARGIN: f64 = 1.2;

/// 最长延迟（秒），毫秒计数为 u32
const MAX_DELAY_S: f64 = u32::MAX as f64 / 1000.0;

// ==================== 经验常数 ====================

/// 读出时序经验常数（毫秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingConstants {
    /// 单行垂直转移时间
    pub tv: f64,
    /// 单次水平跳过时间
    pub tsk: f64,
    /// 单像素读出时间
    pub th: f64,
    /// 每行固定开销
    pub k1: f64,
}

/// 按 ADC 速度索引（目前两种速度取值相同）
const TIMING_TABLE: [TimingConstants; 2] = [
    TimingConstants {
        tv: 0.057,
        tsk: 0.006,
        th: 0.023,
        k1: 3.5,
    },
    TimingConstants {
        tv: 0.057,
        tsk: 0.006,
        th: 0.023,
        k1: 3.5,
    },
];

impl TimingConstants {
    pub fn for_speed(adc: AdcSpeed) -> Self {
        TIMING_TABLE[adc.index()]
    }
}

/// 超时预测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutPrediction {
    pub exposure_ms: u32,
    pub readout_ms: u32,
}

/// 预测曝光/读出超时（纯函数）
pub fn predict_timeouts(
    geometry: &GeometryPlanner,
    clear_count: u8,
    exposure_s: f64,
    shutter_delay_ms: u32,
) -> TimeoutPrediction {
    let k = TimingConstants::for_speed(geometry.state().adc);
    let max = geometry.max_dimensions();
    let (width, height) = geometry.image_dimensions();

    let columns_in_k = f64::from(max.x / 5 + 1);
    let max_rows = f64::from(max.y);
    let clear_ms = f64::from(clear_count) * max_rows * (k.tv + columns_in_k * k.tsk / 4.0);

    let exposure = TIMEOUT_MARGIN * (clear_ms + f64::from(shutter_delay_ms) + 1000.0 * exposure_s);
    let readout = TIMEOUT_MARGIN
        * (k.th * f64::from(width) * f64::from(height) + k.k1 * f64::from(height));

    TimeoutPrediction {
        exposure_ms: (exposure as u32).max(TIMEOUT_FLOOR_MS),
        readout_ms: (readout as u32).max(TIMEOUT_FLOOR_MS),
    }
}

// ==================== 图像类别 ====================

/// 图像类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageCategory {
    /// 天体
    #[default]
    Object,
    /// 暗场
    Dark,
    /// 平场
    Flat,
    /// 偏置（零曝光）
    Bias,
    /// 调焦
    Focus,
}

impl ImageCategory {
    /// IMAGETYP 关键字取值
    pub fn imagetyp(self) -> &'static str {
        match self {
            ImageCategory::Object | ImageCategory::Focus => "object",
            ImageCategory::Dark => "dark",
            ImageCategory::Flat => "flat",
            ImageCategory::Bias => "zero",
        }
    }

    /// 是否为零曝光类别
    pub fn is_zero_exposure(self) -> bool {
        self == ImageCategory::Bias
    }

    /// 是否强制无延迟
    pub fn forbids_delay(self) -> bool {
        matches!(self, ImageCategory::Bias | ImageCategory::Dark)
    }
}

/// 用户设定的序列参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureLimits {
    /// 曝光时长（秒）
    pub exposure_s: f64,
    /// 张与张之间的延迟（秒）
    pub delay_s: f64,
    /// 张数
    pub count: u32,
}

impl ExposureLimits {
    /// 校验曝光与延迟：有限、非负，曝光不超过线路整秒字段
    pub fn validate(&self) -> Result<(), DriverError> {
        let max_exposure = f64::from(ExposureTimeRecord::MAX_SECONDS);
        check_seconds("exposure", self.exposure_s, max_exposure)?;
        check_seconds("delay", self.delay_s, MAX_DELAY_S)
    }

    fn constrain(&mut self, category: ImageCategory) {
        if category.is_zero_exposure() {
            self.exposure_s = 0.0;
        }
        if category.forbids_delay() {
            self.delay_s = 0.0;
        }
    }

    fn exposure_ms(&self) -> u32 {
        (self.exposure_s * 1000.0) as u32
    }

    fn delay_ms(&self) -> u32 {
        (self.delay_s * 1000.0) as u32
    }
}

fn check_seconds(field: &str, value: f64, max: f64) -> Result<(), DriverError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(DriverError::InvalidInput(format!(
            "{} of {} s outside [0, {}]",
            field, value, max
        )))
    }
}

/// 单张图像的完成时刻信息
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureTiming {
    /// 曝光开始（UTC）
    pub date_obs: DateTime<Utc>,
    pub exptime_s: f64,
    pub readtime_s: f64,
    pub darktime_s: f64,
}

impl ExposureTiming {
    /// 由硬件时间戳推算
    ///
    /// `now` 为收到结束标记的时刻，开始时刻 = now − (曝光 + 读出 + 快门延迟)。
    pub fn from_image_end(end: &ImageEnd, shutter_delay_ms: u32, now: DateTime<Utc>) -> Self {
        let exptime = end.read_time_ms.saturating_sub(end.exp_time_ms);
        let readtime = end.end_time_ms.saturating_sub(end.read_time_ms);
        let duration = f64::from(end.end_time_ms.saturating_sub(end.exp_time_ms))
            + f64::from(shutter_delay_ms);
        Self {
            date_obs: exposure_start(now, duration),
            exptime_s: f64::from(exptime) / 1000.0,
            readtime_s: f64::from(readtime) / 1000.0,
            darktime_s: duration / 1000.0,
        }
    }

    /// 写入计时关键字
    pub fn publish_metadata(&self, sink: &mut dyn MetadataSink) -> Result<(), FitsError> {
        sink.set(
            "DATE-OBS",
            format_fits_date(self.date_obs).into(),
            "UTC start of exposure",
        )?;
        sink.set("EXPTIME", self.exptime_s.into(), "[s] exposure duration")?;
        sink.set("READTIME", self.readtime_s.into(), "[s] readout duration")?;
        sink.set("DARKTIME", self.darktime_s.into(), "[s] dark current duration")?;
        Ok(())
    }
}

// ==================== 序列器 ====================

/// 曝光序列器
#[derive(Debug, Clone, Default)]
pub struct ExposureSequencer {
    limits: ExposureLimits,
    category: ImageCategory,
    delay_remaining_ms: u32,
    exposure_remaining_ms: u32,
    count_remaining: u32,
    progress_percent: u8,
    received_bytes: u64,
    expected_bytes: u64,
    timeouts: TimeoutPrediction,
}

impl ExposureSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 设置 ====================

    pub fn limits(&self) -> ExposureLimits {
        self.limits
    }

    /// 设置曝光/延迟/张数（受当前类别约束）
    pub fn set_limits(&mut self, limits: ExposureLimits) {
        self.limits = limits;
        self.limits.constrain(self.category);
    }

    pub fn category(&self) -> ImageCategory {
        self.category
    }

    /// 切换图像类别
    ///
    /// 零曝光类别立即把曝光/延迟设定和剩余值清零；暗场清零延迟。
    pub fn set_category(&mut self, category: ImageCategory) {
        self.category = category;
        self.limits.constrain(category);
        if category.is_zero_exposure() {
            self.exposure_remaining_ms = 0;
        }
        if category.forbids_delay() {
            self.delay_remaining_ms = 0;
        }
        debug!("Image category set to {:?}", category);
    }

    /// 写入 IMAGETYP
    pub fn publish_metadata(&self, sink: &mut dyn MetadataSink) -> Result<(), FitsError> {
        sink.set("IMAGETYP", self.category.imagetyp().into(), "frame type")
    }

    // ==================== 超时 ====================

    /// 预测并缓存超时
    pub fn predict_timeouts(
        &mut self,
        geometry: &GeometryPlanner,
        clear_count: u8,
        shutter_delay_ms: u32,
    ) -> TimeoutPrediction {
        self.timeouts =
            predict_timeouts(geometry, clear_count, self.limits.exposure_s, shutter_delay_ms);
        debug!(
            "Predicted timeouts: exposure {} ms, readout {} ms",
            self.timeouts.exposure_ms, self.timeouts.readout_ms
        );
        self.timeouts
    }

    pub fn timeouts(&self) -> TimeoutPrediction {
        self.timeouts
    }

    // ==================== 周期 ====================

    /// 开始新的采集周期
    pub fn start_cycle(&mut self, total_count: u32) {
        self.count_remaining = total_count;
        self.reload();
        info!(
            "Exposure cycle started: {} x {:.3} s, delay {:.3} s",
            total_count, self.limits.exposure_s, self.limits.delay_s
        );
    }

    /// 从设定值重新装载延迟和曝光剩余时间（进入等待阶段）
    pub fn reload(&mut self) {
        self.delay_remaining_ms = self.limits.delay_ms();
        self.exposure_remaining_ms = self.limits.exposure_ms();
        self.reset_progress();
    }

    /// 直接开始曝光（无延迟阶段）
    pub fn begin_exposure(&mut self, shutter_delay_ms: u32) {
        self.delay_remaining_ms = 0;
        self.exposure_remaining_ms = self.limits.exposure_ms().saturating_add(shutter_delay_ms);
        self.reset_progress();
    }

    pub fn tick_delay(&mut self) {
        self.delay_remaining_ms = self.delay_remaining_ms.saturating_sub(TICK_MS);
    }

    pub fn tick_exposure(&mut self) {
        self.exposure_remaining_ms = self.exposure_remaining_ms.saturating_sub(TICK_MS);
    }

    /// 开始读出，记录预期字节数
    pub fn begin_readout(&mut self, width: u32, height: u32) {
        self.expected_bytes = 2 * u64::from(width) * u64::from(height);
        self.received_bytes = 0;
        self.progress_percent = 0;
    }

    /// 累计接收字节并更新进度
    pub fn on_fragment(&mut self, byte_count: usize) -> u8 {
        self.received_bytes += byte_count as u64;
        self.progress_percent = if self.expected_bytes == 0 {
            0
        } else {
            (100 * self.received_bytes / self.expected_bytes).min(100) as u8
        };
        self.progress_percent
    }

    /// 一张图像完成：剩余张数减一，返回计时信息
    pub fn on_image_complete(
        &mut self,
        end: &ImageEnd,
        shutter_delay_ms: u32,
        now: DateTime<Utc>,
    ) -> ExposureTiming {
        self.count_remaining = self.count_remaining.saturating_sub(1);
        self.progress_percent = 100;
        let timing = ExposureTiming::from_image_end(end, shutter_delay_ms, now);
        info!(
            "Image complete: exptime {:.3} s, readtime {:.3} s, {} remaining",
            timing.exptime_s, timing.readtime_s, self.count_remaining
        );
        timing
    }

    /// 取消序列，回到空闲默认值（保留用户设定）
    pub fn cancel(&mut self) {
        self.delay_remaining_ms = 0;
        self.exposure_remaining_ms = 0;
        self.count_remaining = 0;
        self.received_bytes = 0;
        self.expected_bytes = 0;
        self.progress_percent = 0;
    }

    fn reset_progress(&mut self) {
        self.progress_percent = 0;
        self.received_bytes = 0;
    }

    // ==================== 查询 ====================

    pub fn has_remaining_count(&self) -> bool {
        self.count_remaining > 0
    }

    pub fn has_configured_delay(&self) -> bool {
        self.limits.delay_ms() > 0
    }

    pub fn count_remaining(&self) -> u32 {
        self.count_remaining
    }

    pub fn delay_remaining_ms(&self) -> u32 {
        self.delay_remaining_ms
    }

    pub fn exposure_remaining_ms(&self) -> u32 {
        self.exposure_remaining_ms
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }
}
