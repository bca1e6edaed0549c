//! 硬件链路抽象
//!
//! 编排器只通过 [`HardwareLink`] 向集线器发送曝光请求；集线器的回传
//! （像素数据、结束标记、连接状态、遥测）以 [`LinkEvent`] 送入事件循环。

use crate::ClientError;
use audine_driver::Telemetry;
use audine_protocol::{FragmentHeader, ImageEnd, PixelFragment, RequestHeader, TEST_PATTERN_OFFSET};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 链路事件
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// 链路连接（告警后为重连确认）
    Connected,
    /// 链路断开
    Disconnected,
    /// 链路告警
    Alert,
    /// 数据到达
    Data { channel: u8, payload: Vec<u8> },
    /// 集线器遥测（温度、固件版本）
    Telemetry(Telemetry),
}

/// 硬件链路（发送方向）
pub trait HardwareLink {
    /// 发送一条线路记录
    fn send(&mut self, record: &[u8]) -> Result<(), ClientError>;
}

impl<T: HardwareLink + ?Sized> HardwareLink for Box<T> {
    fn send(&mut self, record: &[u8]) -> Result<(), ClientError> {
        (**self).send(record)
    }
}

// ============================================================================
// 记录链路
// ============================================================================

/// 只记录发送内容的链路
///
/// 克隆共享同一记录缓冲区，测试中保留一份克隆用于检查。
#[derive(Debug, Clone, Default)]
pub struct RecordingLink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的记录
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 让后续发送失败
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl HardwareLink for RecordingLink {
    fn send(&mut self, record: &[u8]) -> Result<(), ClientError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ClientError::Link("send failed".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| ClientError::Link("record buffer poisoned".to_string()))?
            .push(record.to_vec());
        Ok(())
    }
}

// ============================================================================
// 模拟链路
// ============================================================================

/// 模拟相机
///
/// 收到曝光请求后在后台线程中等待曝光时长，然后按线路格式回传像素分片
/// 和图像结束记录。取消请求会中止尚未完成的曝光。
#[derive(Debug)]
pub struct SimulatedLink {
    peripheral: u8,
    events: Sender<LinkEvent>,
    rows_per_fragment: u16,
    clock: Instant,
    cancel: Arc<AtomicBool>,
}

impl SimulatedLink {
    pub fn new(peripheral: u8, events: Sender<LinkEvent>) -> Self {
        Self {
            peripheral,
            events,
            rows_per_fragment: 16,
            clock: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 每个分片的行数
    pub fn with_rows_per_fragment(mut self, rows: u16) -> Self {
        self.rows_per_fragment = rows.max(1);
        self
    }

    /// 通知事件循环链路已连接
    pub fn connect(&self) -> Result<(), ClientError> {
        self.events
            .send(LinkEvent::Connected)
            .map_err(|_| ClientError::LoopStopped)
    }
}

impl HardwareLink for SimulatedLink {
    fn send(&mut self, record: &[u8]) -> Result<(), ClientError> {
        let header =
            RequestHeader::try_from(record).map_err(|e| ClientError::Link(e.to_string()))?;
        if header.peripheral != self.peripheral {
            return Err(ClientError::Link(format!(
                "request for peripheral 0x{:02X}, simulating 0x{:02X}",
                header.peripheral, self.peripheral
            )));
        }
        if header.cancel {
            debug!("Simulated camera: exposure cancelled");
            self.cancel.store(true, Ordering::Relaxed);
            return Ok(());
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Arc::clone(&cancel);
        let binning = i32::from(header.binning_factor().max(1));
        let exposure = SimulatedExposure {
            peripheral: self.peripheral,
            width: (header.rect.width() / binning).max(0) as u16,
            height: (header.rect.height() / binning).max(0) as u16,
            test_pattern: header.binning > TEST_PATTERN_OFFSET,
            duration: Duration::from_millis(
                u64::from(header.exposure.seconds) * 1000
                    + u64::from(header.exposure.millis)
                    + u64::from(header.delay_ds) * 100,
            ),
            rows_per_fragment: self.rows_per_fragment,
            clock: self.clock,
        };
        let events = self.events.clone();
        thread::Builder::new()
            .name("audine-sim".into())
            .spawn(move || exposure.run(&events, &cancel))?;
        Ok(())
    }
}

struct SimulatedExposure {
    peripheral: u8,
    width: u16,
    height: u16,
    test_pattern: bool,
    duration: Duration,
    rows_per_fragment: u16,
    clock: Instant,
}

impl SimulatedExposure {
    fn run(self, events: &Sender<LinkEvent>, cancel: &AtomicBool) {
        let exp_time_ms = self.elapsed_ms();
        let deadline = Instant::now() + self.duration;
        while Instant::now() < deadline {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(remaining.min(Duration::from_millis(10)));
        }
        let read_time_ms = self.elapsed_ms();

        let mut first_row = 0u16;
        let mut sequence = 0u16;
        while first_row < self.height {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let rows = self.rows_per_fragment.min(self.height - first_row);
            let samples = self.samples(first_row, rows);
            let payload = PixelFragment::encode(
                FragmentHeader {
                    sequence,
                    first_row,
                    rows,
                },
                &samples,
            );
            trace!("Simulated camera: fragment {} ({} rows)", sequence, rows);
            if events
                .send(LinkEvent::Data {
                    channel: self.peripheral,
                    payload,
                })
                .is_err()
            {
                warn!("Simulated camera: event loop gone");
                return;
            }
            first_row += rows;
            sequence = sequence.wrapping_add(1);
        }

        let end = ImageEnd {
            exp_time_ms,
            read_time_ms,
            end_time_ms: self.elapsed_ms(),
        };
        let _ = events.send(LinkEvent::Data {
            channel: self.peripheral.wrapping_add(1),
            payload: end.to_bytes().to_vec(),
        });
    }

    /// 渐变图像；测试图样模式下为棋盘格
    fn samples(&self, first_row: u16, rows: u16) -> Vec<u8> {
        let mut data = Vec::with_capacity(usize::from(rows) * usize::from(self.width) * 2);
        for r in first_row..first_row + rows {
            for c in 0..self.width {
                let value = if self.test_pattern {
                    if (r / 8 + c / 8) % 2 == 0 { 0xFFFF } else { 0 }
                } else {
                    r.wrapping_mul(64).wrapping_add(c)
                };
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        data
    }

    fn elapsed_ms(&self) -> u32 {
        self.clock.elapsed().as_millis().min(u128::from(u32::MAX)) as u32
    }
}
