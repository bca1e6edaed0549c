//! 采集编排器
//!
//! [`CameraController`] 持有几何规划器、曝光序列器、快门、流式写入器和
//! FITS 头部，按事件顺序逐个处理（命令、链路事件、节拍、闹钟），每个事件
//! 处理完毕才接受下一个。状态转换由 [`next_state`] 决定，副作用在这里执行。

use crate::ClientError;
use crate::link::{HardwareLink, LinkEvent};
use crate::state::{CameraState, Guards, StatusLight, Trigger, next_state};
use crate::timer::{AlarmToken, Timers};
use audine_driver::{
    AreaSelection, Bounds, DriverError, ExposureLimits, ExposureSequencer, GeometryPlanner,
    ImageCategory, ImagePathSource, SequentialPaths, Shutter, StreamWriter, Telemetry,
    TransformMode, UserComment, WcsSeed,
};
use audine_protocol::{
    AdcSpeed, Channel, ExposureRequest, ExposureTimeRecord, ImageEnd, PixelFragment,
    ShutterLogic,
};
use audine_tools::{CameraConfig, FitsHeader, PhotometryConfig};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

// ==================== 命令 / 事件 / 通知 ====================

/// 用户命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SetModel(usize),
    SetSpeed(AdcSpeed),
    SetBinning(u8),
    SetArea(AreaSelection),
    SetTestPattern(bool),
    SetPhotometry(PhotometryConfig),
    SetLimits(ExposureLimits),
    SetCategory(ImageCategory),
    SetTransform { flip_lr: bool, flip_ud: bool },
    SetClearCount(u8),
    SetShutter { delay_ms: u32, logic: ShutterLogic },
    SetWcsSeed(WcsSeed),
    SetComment(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::SetModel(_) => "set_model",
            Command::SetSpeed(_) => "set_speed",
            Command::SetBinning(_) => "set_binning",
            Command::SetArea(_) => "set_area",
            Command::SetTestPattern(_) => "set_test_pattern",
            Command::SetPhotometry(_) => "set_photometry",
            Command::SetLimits(_) => "set_limits",
            Command::SetCategory(_) => "set_category",
            Command::SetTransform { .. } => "set_transform",
            Command::SetClearCount(_) => "set_clear_count",
            Command::SetShutter { .. } => "set_shutter",
            Command::SetWcsSeed(_) => "set_wcs_seed",
            Command::SetComment(_) => "set_comment",
        }
    }

    /// 几何类和头部注释类命令只在 Ready 状态下接受
    fn requires_ready(&self) -> bool {
        matches!(
            self,
            Command::SetModel(_)
                | Command::SetSpeed(_)
                | Command::SetBinning(_)
                | Command::SetArea(_)
                | Command::SetTestPattern(_)
                | Command::SetPhotometry(_)
                | Command::SetWcsSeed(_)
                | Command::SetComment(_)
        )
    }
}

/// 命令处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Accepted,
    Rejected { reason: String },
}

impl CommandStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandStatus::Accepted)
    }
}

/// 编排器输入事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    Link(LinkEvent),
    Tick,
    Alarm(AlarmToken),
}

/// 编排器输出通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// 状态转换（附带进入状态的状态灯）
    StateChanged {
        from: CameraState,
        to: CameraState,
        light: StatusLight,
    },
    /// 命令处理结果
    Command {
        command: &'static str,
        status: CommandStatus,
    },
    /// 型号切换后原选区越界，已回退到全幅
    SelectionReset { bounds: Bounds },
    /// 倒计时
    Countdown { delay_ms: u32, exposure_ms: u32 },
    /// 读出进度
    Progress { percent: u8 },
    /// 新图像已保存
    ImageSaved { path: PathBuf, remaining: u32 },
    /// 当前曝光被放弃
    Fault { reason: String },
}

// ==================== 编排器 ====================

/// 采集编排器
#[derive(Debug)]
pub struct CameraController<L: HardwareLink> {
    state: CameraState,
    link: L,
    device: String,
    peripheral: u8,
    clear_count: u8,
    geometry: GeometryPlanner,
    sequencer: ExposureSequencer,
    shutter: Shutter,
    writer: StreamWriter,
    header: FitsHeader,
    wcs: WcsSeed,
    comment: UserComment,
    timers: Timers,
    last_request: Option<ExposureRequest>,
    notifications: Vec<Notification>,
}

impl<L: HardwareLink> CameraController<L> {
    /// 按配置创建，图像保存到 `output_dir/{prefix}_NNNN.fits`
    pub fn new(config: &CameraConfig, link: L) -> Result<Self, ClientError> {
        let paths = SequentialPaths::new(&config.output_dir, config.file_prefix.as_str());
        Self::with_paths(config, link, Box::new(paths))
    }

    /// 使用自定义文件命名
    pub fn with_paths(
        config: &CameraConfig,
        link: L,
        paths: Box<dyn ImagePathSource>,
    ) -> Result<Self, ClientError> {
        let mut geometry = GeometryPlanner::new(config.model, config.binning, config.adc_speed)?;
        geometry.set_test_pattern(config.test_pattern);
        geometry.set_photometry(config.photometry);
        let transform =
            TransformMode::from_flags(config.transform.flip_lr, config.transform.flip_ud);

        Ok(Self {
            state: CameraState::Idle,
            link,
            device: config.device.clone(),
            peripheral: config.peripheral,
            clear_count: config.clear_count,
            geometry,
            sequencer: ExposureSequencer::new(),
            shutter: Shutter::from(config.shutter),
            writer: StreamWriter::new(paths, transform),
            header: FitsHeader::new(),
            wcs: WcsSeed::default(),
            comment: UserComment::default(),
            timers: Timers::new(),
            last_request: None,
            notifications: Vec::new(),
        })
    }

    // ==================== 只读访问 ====================

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn geometry(&self) -> &GeometryPlanner {
        &self.geometry
    }

    pub fn sequencer(&self) -> &ExposureSequencer {
        &self.sequencer
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn header(&self) -> &FitsHeader {
        &self.header
    }

    pub fn wcs_seed(&self) -> WcsSeed {
        self.wcs
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn is_streaming(&self) -> bool {
        self.writer.is_active()
    }

    /// 取出累积的通知
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // ==================== 事件入口 ====================

    /// 处理一个事件并返回产生的通知
    pub fn handle(&mut self, event: Event) -> Vec<Notification> {
        match event {
            Event::Command(command) => {
                self.execute(command);
            },
            Event::Link(event) => self.on_link(event),
            Event::Tick => self.on_tick(),
            Event::Alarm(token) => self.on_alarm(token),
        }
        self.drain_notifications()
    }

    /// 执行用户命令
    pub fn execute(&mut self, command: Command) -> CommandStatus {
        let name = command.name();
        let status = match self.apply_command(command) {
            Ok(()) => CommandStatus::Accepted,
            Err(reason) => {
                warn!("Command {} rejected while {}: {}", name, self.state, reason);
                CommandStatus::Rejected { reason }
            },
        };
        self.notify(Notification::Command {
            command: name,
            status: status.clone(),
        });
        status
    }

    fn apply_command(&mut self, command: Command) -> Result<(), String> {
        if command.requires_ready() && self.state != CameraState::Ready {
            return Err(format!("{} is locked while {}", command.name(), self.state));
        }

        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::SetModel(index) => {
                let bounds = self.geometry.select_model(index).map_err(|e| e.to_string())?;
                if !bounds.is_ok() {
                    self.notify(Notification::SelectionReset { bounds });
                }
                Ok(())
            },
            Command::SetSpeed(adc) => {
                self.geometry.select_speed(adc);
                Ok(())
            },
            Command::SetBinning(factor) => {
                let bounds = self.geometry.select_binning(factor).map_err(|e| e.to_string())?;
                bounds_to_result(bounds)
            },
            Command::SetArea(selection) => {
                bounds_to_result(self.geometry.apply_area_selection(selection))
            },
            Command::SetTestPattern(on) => {
                self.geometry.set_test_pattern(on);
                Ok(())
            },
            Command::SetPhotometry(photometry) => {
                self.geometry.set_photometry(photometry);
                Ok(())
            },
            Command::SetLimits(limits) => {
                limits.validate().map_err(|e| e.to_string())?;
                self.sequencer.set_limits(limits);
                Ok(())
            },
            Command::SetCategory(category) => {
                self.sequencer.set_category(category);
                self.wcs
                    .publish_metadata(&mut self.header, category)
                    .map_err(|e| e.to_string())
            },
            Command::SetTransform { flip_lr, flip_ud } => {
                self.writer.set_transform(TransformMode::from_flags(flip_lr, flip_ud));
                Ok(())
            },
            Command::SetClearCount(count) => {
                self.clear_count = count;
                Ok(())
            },
            Command::SetShutter { delay_ms, logic } => {
                self.shutter.set_delay_ms(delay_ms);
                self.shutter.set_logic(logic);
                Ok(())
            },
            Command::SetWcsSeed(seed) => {
                seed.validate().map_err(|e| e.to_string())?;
                seed.publish_metadata(&mut self.header, self.sequencer.category())
                    .map_err(|e| e.to_string())?;
                self.wcs = seed;
                Ok(())
            },
            Command::SetComment(text) => self
                .comment
                .update(&text, &mut self.header)
                .map_err(|e| e.to_string()),
        }
    }

    // ==================== 开始 / 停止 ====================

    fn start(&mut self) -> Result<(), String> {
        let Some(next) = next_state(self.state, Trigger::Start, self.guards()) else {
            return Err(format!("cannot start while {}", self.state));
        };
        let count = self.sequencer.limits().count;
        if count == 0 {
            return Err("exposure count is zero".to_string());
        }

        self.sequencer.start_cycle(count);

        if let Err(e) = self.prepare_frame() {
            self.discard_cycle();
            return Err(e.to_string());
        }

        let entered = match next {
            CameraState::Waiting => {
                self.begin_waiting();
                Ok(())
            },
            _ => self.begin_exposing(),
        };
        entered.map_err(|e| {
            self.discard_cycle();
            e.to_string()
        })
    }

    fn stop(&mut self) -> Result<(), String> {
        let Some(next) = next_state(self.state, Trigger::Stop, self.guards()) else {
            return Err(format!("cannot stop while {}", self.state));
        };
        if self.state == CameraState::Exposing {
            self.send_cancel();
        }
        self.discard_cycle();
        info!("Exposure sequence stopped by user");
        self.set_state(next);
        Ok(())
    }

    // ==================== 链路事件 ====================

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                let Some(next) = next_state(self.state, Trigger::LinkConnected, self.guards())
                else {
                    debug!("Link connected while {}, ignored", self.state);
                    return;
                };
                if self.state == CameraState::Alert {
                    self.sequencer.cancel();
                }
                self.set_state(next);
            },
            LinkEvent::Disconnected => {
                self.discard_cycle();
                if let Some(next) =
                    next_state(self.state, Trigger::LinkDisconnected, self.guards())
                {
                    self.set_state(next);
                }
            },
            LinkEvent::Alert => self.abort("link alert".to_string(), Trigger::LinkAlert),
            LinkEvent::Data { channel, payload } => {
                match Channel::classify(self.peripheral, channel) {
                    Channel::Pixels => self.on_pixels(&payload),
                    Channel::ImageEnd => self.on_image_end(&payload),
                    Channel::Other(id) => trace!("Ignoring data on channel 0x{:02X}", id),
                }
            },
            LinkEvent::Telemetry(telemetry) => self.on_telemetry(&telemetry),
        }
    }

    /// 遥测在任何状态下都写入头部，下一次保存时生效
    fn on_telemetry(&mut self, telemetry: &Telemetry) {
        debug!("Telemetry while {}: {:?}", self.state, telemetry);
        if let Err(e) = telemetry.publish_metadata(&mut self.header) {
            warn!("Failed to record telemetry: {}", e);
        }
    }

    fn on_pixels(&mut self, payload: &[u8]) {
        if !matches!(self.state, CameraState::Exposing | CameraState::Reading) {
            debug!("Ignoring pixel data while {}", self.state);
            return;
        }
        let fragment = match PixelFragment::parse(payload) {
            Ok(fragment) => fragment,
            Err(e) => return self.fault(e.into()),
        };

        if self.state == CameraState::Exposing {
            let Some(next) = next_state(self.state, Trigger::Fragment, self.guards()) else {
                return;
            };
            let (width, height) = self.geometry.image_dimensions();
            self.sequencer.begin_readout(width, height);
            let readout_ms = self.sequencer.timeouts().readout_ms;
            self.timers.arm(Duration::from_millis(u64::from(readout_ms)));
            self.timers.set_ticking(false);
            self.set_state(next);
        }

        trace!(
            "Fragment {} (rows {}+{})",
            fragment.header.sequence, fragment.header.first_row, fragment.header.rows
        );
        if let Err(e) = self.writer.handle(fragment.samples) {
            return self.fault(e);
        }
        let percent = self.sequencer.on_fragment(fragment.samples.len());
        self.notify(Notification::Progress { percent });
    }

    fn on_image_end(&mut self, payload: &[u8]) {
        match self.state {
            CameraState::Reading => {},
            CameraState::Exposing => {
                // 没有任何像素数据就收到结束标记
                return self.fault(DriverError::ByteCountMismatch {
                    expected: self.writer.expected_bytes(),
                    written: 0,
                    received: 0,
                });
            },
            _ => {
                debug!("Ignoring end-of-image marker while {}", self.state);
                return;
            },
        }
        let end = match ImageEnd::try_from(payload) {
            Ok(end) => end,
            Err(e) => return self.fault(e.into()),
        };
        if let Err(e) = self.complete_image(&end) {
            self.fault(e);
        }
    }

    fn complete_image(&mut self, end: &ImageEnd) -> Result<(), DriverError> {
        let shutter_ms = self.shutter_delay_ms();
        let timing = self.sequencer.on_image_complete(end, shutter_ms, Utc::now());
        timing.publish_metadata(&mut self.header)?;
        let path = self.writer.finish(&self.header)?;
        self.timers.disarm();
        self.notify(Notification::ImageSaved {
            path,
            remaining: self.sequencer.count_remaining(),
        });

        let Some(next) = next_state(self.state, Trigger::ImageComplete, self.guards()) else {
            return Ok(());
        };
        match next {
            CameraState::Waiting => {
                self.prepare_frame()?;
                self.sequencer.reload();
                self.begin_waiting();
            },
            CameraState::Exposing => {
                self.prepare_frame()?;
                if let Err(e) = self.begin_exposing() {
                    self.abort(e.to_string(), Trigger::Fault);
                }
            },
            _ => {
                self.timers.set_ticking(false);
                self.last_request = None;
                info!("Exposure sequence complete");
                self.set_state(next);
            },
        }
        Ok(())
    }

    // ==================== 定时器 ====================

    fn on_tick(&mut self) {
        if !self.timers.is_ticking() {
            return;
        }
        if next_state(self.state, Trigger::Tick, self.guards()).is_none() {
            return;
        }
        match self.state {
            CameraState::Waiting => self.sequencer.tick_delay(),
            CameraState::Exposing => self.sequencer.tick_exposure(),
            _ => {},
        }
        self.notify(Notification::Countdown {
            delay_ms: self.sequencer.delay_remaining_ms(),
            exposure_ms: self.sequencer.exposure_remaining_ms(),
        });
    }

    fn on_alarm(&mut self, token: AlarmToken) {
        if !self.timers.take_if_current(token) {
            debug!("Stale alarm {} ignored", token.id());
            return;
        }
        let trigger = match self.state {
            CameraState::Waiting => Trigger::DelayElapsed,
            CameraState::Exposing => Trigger::ExposureTimeout,
            CameraState::Reading => Trigger::ReadoutTimeout,
            _ => {
                debug!("Alarm {} fired while {}, ignored", token.id(), self.state);
                return;
            },
        };

        match trigger {
            Trigger::DelayElapsed => {
                if let Err(e) = self.begin_exposing() {
                    self.abort(e.to_string(), Trigger::Fault);
                }
            },
            _ => {
                warn!("{:?} while {}", trigger, self.state);
                if self.state == CameraState::Exposing {
                    self.send_cancel();
                }
                self.abort(format!("{} timed out", self.state), trigger);
            },
        }
    }

    // ==================== 阶段进入 ====================

    /// 发布元数据并打开下一幅图像的存储会话
    fn prepare_frame(&mut self) -> Result<(), DriverError> {
        let category = self.sequencer.category();
        self.geometry.publish_metadata(&mut self.header, &self.device)?;
        self.shutter.publish_metadata(&mut self.header, category)?;
        self.sequencer.publish_metadata(&mut self.header)?;
        let (width, height) = self.geometry.image_dimensions();
        self.writer.start(width, height, &mut self.header)
    }

    fn begin_waiting(&mut self) {
        let delay_ms = self.sequencer.delay_remaining_ms();
        self.timers.arm(Duration::from_millis(u64::from(delay_ms)));
        self.timers.set_ticking(true);
        self.set_state(CameraState::Waiting);
    }

    /// 发送曝光请求并布防曝光超时
    fn begin_exposing(&mut self) -> Result<(), ClientError> {
        let shutter_ms = self.shutter_delay_ms();
        self.sequencer.begin_exposure(shutter_ms);
        self.sequencer
            .predict_timeouts(&self.geometry, self.clear_count, shutter_ms);
        let request = ExposureRequest::new(
            self.peripheral,
            self.geometry.record()?,
            self.clear_count,
            self.shutter.record(self.sequencer.category()),
            ExposureTimeRecord::from_seconds(self.sequencer.limits().exposure_s),
        );
        let bytes = request.to_bytes().map_err(DriverError::from)?;
        debug!("Exposure request: {:?}", request);
        self.link.send(&bytes)?;
        self.last_request = Some(request);

        let timeout_ms = self.sequencer.timeouts().exposure_ms;
        self.timers.arm(Duration::from_millis(u64::from(timeout_ms)));
        self.timers.set_ticking(true);
        self.set_state(CameraState::Exposing);
        Ok(())
    }

    /// 通知硬件中止当前曝光
    fn send_cancel(&mut self) {
        let Some(request) = self.last_request.take() else {
            return;
        };
        let cancel = request.into_cancel();
        debug!("Cancel request: {:?}", cancel);
        let sent = cancel
            .to_bytes()
            .map_err(|e| ClientError::from(DriverError::from(e)))
            .and_then(|bytes| self.link.send(&bytes));
        if let Err(e) = sent {
            warn!("Failed to send cancel request: {}", e);
        }
    }

    // ==================== 放弃 / 故障 ====================

    /// 丢弃进行中的序列和存储会话
    fn discard_cycle(&mut self) {
        self.sequencer.cancel();
        self.writer.cancel();
        self.timers.disarm();
        self.timers.set_ticking(false);
        self.last_request = None;
    }

    fn abort(&mut self, reason: String, trigger: Trigger) {
        self.discard_cycle();
        if let Some(next) = next_state(self.state, trigger, self.guards()) {
            self.notify(Notification::Fault { reason });
            self.set_state(next);
        }
    }

    fn fault(&mut self, err: DriverError) {
        error!("Protocol violation while {}: {}", self.state, err);
        self.abort(err.to_string(), Trigger::Fault);
    }

    // ==================== 辅助 ====================

    fn guards(&self) -> Guards {
        Guards {
            has_configured_delay: self.sequencer.has_configured_delay(),
            has_remaining_count: self.sequencer.has_remaining_count(),
        }
    }

    fn shutter_delay_ms(&self) -> u32 {
        self.shutter.effective_delay_ms(self.sequencer.category())
    }

    fn set_state(&mut self, to: CameraState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("Camera state: {} -> {}", from, to);
        self.state = to;
        self.notify(Notification::StateChanged {
            from,
            to,
            light: to.light(),
        });
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

fn bounds_to_result(bounds: Bounds) -> Result<(), String> {
    if bounds.is_ok() {
        Ok(())
    } else {
        Err(bounds.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::RecordingLink;
    use audine_driver::{Preset, VisibleRect};
    use audine_protocol::RequestHeader;
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> CameraController<RecordingLink> {
        let config = CameraConfig {
            output_dir: dir.path().to_path_buf(),
            ..CameraConfig::default()
        };
        let mut c = CameraController::new(&config, RecordingLink::new()).unwrap();
        c.handle(Event::Link(LinkEvent::Connected));
        c
    }

    #[test]
    fn test_connect_publishes_state() {
        let dir = TempDir::new().unwrap();
        let config = CameraConfig {
            output_dir: dir.path().to_path_buf(),
            ..CameraConfig::default()
        };
        let mut c = CameraController::new(&config, RecordingLink::new()).unwrap();
        let notes = c.handle(Event::Link(LinkEvent::Connected));
        assert_eq!(c.state(), CameraState::Ready);
        assert_eq!(notes, vec![Notification::StateChanged {
            from: CameraState::Idle,
            to: CameraState::Ready,
            light: StatusLight::Ok,
        }]);
    }

    #[test]
    fn test_geometry_rejected_out_of_bounds() {
        let dir = TempDir::new().unwrap();
        let mut c = controller(&dir);
        let before = c.geometry().state().clone();

        let status = c.execute(Command::SetArea(AreaSelection::UserDefined(VisibleRect::new(
            0, 0, 900, 10,
        ))));
        assert_eq!(status, CommandStatus::Rejected {
            reason: "X out of bounds".to_string()
        });
        assert_eq!(c.geometry().state(), &before);
    }

    #[test]
    fn test_start_rejected_outside_ready() {
        let dir = TempDir::new().unwrap();
        let config = CameraConfig {
            output_dir: dir.path().to_path_buf(),
            ..CameraConfig::default()
        };
        let mut c = CameraController::new(&config, RecordingLink::new()).unwrap();
        assert!(!c.execute(Command::Start).is_accepted());
        assert_eq!(c.state(), CameraState::Idle);
    }

    #[test]
    fn test_start_with_zero_count_rejected() {
        let dir = TempDir::new().unwrap();
        let mut c = controller(&dir);
        assert!(!c.execute(Command::Start).is_accepted());
        assert!(!c.is_streaming());
    }

    #[test]
    fn test_direct_exposure_sends_request() {
        let dir = TempDir::new().unwrap();
        let mut c = controller(&dir);
        c.execute(Command::SetArea(AreaSelection::Preset {
            preset: Preset::Corner1,
            width: 16,
        }));
        c.execute(Command::SetLimits(ExposureLimits {
            exposure_s: 2.5,
            delay_s: 0.0,
            count: 1,
        }));
        assert!(c.execute(Command::Start).is_accepted());
        assert_eq!(c.state(), CameraState::Exposing);
        assert!(c.is_streaming());

        let sent = c.link().sent();
        assert_eq!(sent.len(), 1);
        let header = RequestHeader::try_from(&sent[0][..]).unwrap();
        assert_eq!(header.exposure.seconds, 2);
        assert_eq!(header.exposure.millis, 500);
        assert_eq!(header.rect.width(), 16);

        // 曝光中几何被锁定
        assert!(!c.execute(Command::SetBinning(2)).is_accepted());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let dir = TempDir::new().unwrap();
        let mut c = controller(&dir);
        let valid = ExposureLimits {
            exposure_s: 4.0,
            delay_s: 1.0,
            count: 2,
        };
        assert!(c.execute(Command::SetLimits(valid)).is_accepted());

        for exposure_s in [-1.0, f64::NAN, 70000.0] {
            let status = c.execute(Command::SetLimits(ExposureLimits {
                exposure_s,
                ..valid
            }));
            assert!(!status.is_accepted());
        }
        assert_eq!(c.sequencer().limits(), valid);
    }

    #[test]
    fn test_link_send_failure_rejects_start() {
        let dir = TempDir::new().unwrap();
        let mut c = controller(&dir);
        c.execute(Command::SetLimits(ExposureLimits {
            exposure_s: 1.0,
            delay_s: 0.0,
            count: 1,
        }));
        c.link().set_failing(true);

        assert!(!c.execute(Command::Start).is_accepted());
        assert_eq!(c.state(), CameraState::Ready);
        assert!(!c.is_streaming());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
