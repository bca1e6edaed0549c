//! 快门子记录生成

use crate::sequencer::ImageCategory;
use audine_protocol::{ShutterLogic, ShutterMode, ShutterRecord};
use audine_tools::{FitsError, MetadataSink, ShutterConfig};

/// 快门
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shutter {
    logic: ShutterLogic,
    delay_ms: u32,
}

impl From<ShutterConfig> for Shutter {
    fn from(config: ShutterConfig) -> Self {
        Self::new(config.logic, config.delay_ms)
    }
}

impl Shutter {
    pub fn new(logic: ShutterLogic, delay_ms: u32) -> Self {
        Self { logic, delay_ms }
    }

    pub fn set_logic(&mut self, logic: ShutterLogic) {
        self.logic = logic;
    }

    pub fn set_delay_ms(&mut self, delay_ms: u32) {
        self.delay_ms = delay_ms;
    }

    pub fn logic(&self) -> ShutterLogic {
        self.logic
    }

    /// 该类别下实际使用的延迟（偏置和调焦不等待快门）
    pub fn effective_delay_ms(&self, category: ImageCategory) -> u32 {
        match category {
            ImageCategory::Bias | ImageCategory::Focus => 0,
            _ => self.delay_ms,
        }
    }

    /// 模式位：(保持, 电平)
    ///
    /// | 类别 | 正逻辑 | 反逻辑 |
    /// |------|--------|--------|
    /// | 天体/平场 | 0 | 1 |
    /// | 偏置/暗场 | 2 | 3 |
    /// | 调焦 | 3 | 2 |
    pub fn mode(&self, category: ImageCategory) -> ShutterMode {
        let inverted = self.logic.is_inverted();
        let (hold, level) = match category {
            ImageCategory::Object | ImageCategory::Flat => (false, inverted),
            ImageCategory::Bias | ImageCategory::Dark => (true, inverted),
            ImageCategory::Focus => (true, !inverted),
        };
        ShutterMode::compose(hold, level)
    }

    /// 生成快门子记录（延迟以 0.1 s 为单位）
    pub fn record(&self, category: ImageCategory) -> ShutterRecord {
        let delay_ds = (self.effective_delay_ms(category) / 100).min(u32::from(u16::MAX)) as u16;
        ShutterRecord {
            mode: self.mode(category),
            delay_ds,
        }
    }

    /// 写入 SHUTDLY（秒）
    pub fn publish_metadata(
        &self,
        sink: &mut dyn MetadataSink,
        category: ImageCategory,
    ) -> Result<(), FitsError> {
        let seconds = f64::from(self.record(category).delay_ds) / 10.0;
        sink.set("SHUTDLY", seconds.into(), "[s] shutter opening delay")
    }
}
