//! 定时器簿记
//!
//! 控制器只记录"应当存在哪些定时器"，实际计时由事件循环完成。
//! 每次布防都生成新的令牌，到期事件携带令牌；令牌与当前布防不符即为过期事件。

use std::time::Duration;

/// 节拍周期
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// 闹钟令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmToken(u64);

impl AlarmToken {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// 已布防的闹钟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedAlarm {
    pub token: AlarmToken,
    pub duration: Duration,
}

/// 定时器状态
#[derive(Debug, Default)]
pub struct Timers {
    ticking: bool,
    armed: Option<ArmedAlarm>,
    next_id: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 布防一次性闹钟（替换之前的闹钟）
    pub fn arm(&mut self, duration: Duration) -> AlarmToken {
        self.next_id += 1;
        let token = AlarmToken(self.next_id);
        self.armed = Some(ArmedAlarm { token, duration });
        token
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<ArmedAlarm> {
        self.armed
    }

    /// 令牌与当前闹钟一致时撤防并返回 true
    pub fn take_if_current(&mut self, token: AlarmToken) -> bool {
        match self.armed {
            Some(alarm) if alarm.token == token => {
                self.armed = None;
                true
            },
            _ => false,
        }
    }

    pub fn set_ticking(&mut self, ticking: bool) {
        self.ticking = ticking;
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }
}
