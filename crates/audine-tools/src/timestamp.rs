//! # 时间戳处理
//!
//! FITS 日期关键字格式化（纯函数）

use chrono::{DateTime, TimeDelta, Utc};

/// FITS 日期格式（ISO 8601，秒精度，UTC）
pub const FITS_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 格式化为 FITS 日期字符串
pub fn format_fits_date(t: DateTime<Utc>) -> String {
    t.format(FITS_DATE_FORMAT).to_string()
}

/// 由结束时刻和总时长（毫秒）反推曝光开始时刻
///
/// 时长截断到整秒。
pub fn exposure_start(end: DateTime<Utc>, duration_ms: f64) -> DateTime<Utc> {
    let seconds = (duration_ms / 1000.0) as i64;
    end - TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::zero())
}
