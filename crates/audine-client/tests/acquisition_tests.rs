//! 采集流程集成测试
//!
//! 直接向编排器投递事件（记录链路 + 临时目录），逐步检查状态转换、
//! 发送的线路请求和保存的文件；最后用模拟相机跑一遍完整的事件循环。

use audine_client::{
    CameraController, CameraState, Command, Event, EventLoop, LinkEvent, Notification,
    RecordingLink, SimulatedLink,
};
use audine_driver::{
    AreaSelection, ExposureLimits, ImageCategory, Preset, Telemetry, VisibleRect, WcsSeed,
};
use audine_protocol::{FragmentHeader, ImageEnd, PixelFragment, RequestHeader};
use audine_tools::CameraConfig;
use audine_tools::fits::{BLOCK_LEN, HEADER_LEN};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PERIPHERAL: u8 = 0x20;
const SIDE: u32 = 8;

// ==================== 辅助函数 ====================

fn config(dir: &Path) -> CameraConfig {
    CameraConfig {
        output_dir: dir.to_path_buf(),
        peripheral: PERIPHERAL,
        ..CameraConfig::default()
    }
}

/// 已连接、选区为 8x8 左上角预设的编排器
fn ready_controller(dir: &Path) -> (CameraController<RecordingLink>, RecordingLink) {
    let link = RecordingLink::new();
    let mut controller = CameraController::new(&config(dir), link.clone()).unwrap();
    controller.handle(Event::Link(LinkEvent::Connected));
    assert_eq!(controller.state(), CameraState::Ready);
    assert!(
        controller
            .execute(Command::SetArea(AreaSelection::Preset {
                preset: Preset::Corner1,
                width: SIDE as i32,
            }))
            .is_accepted()
    );
    (controller, link)
}

fn set_limits(
    controller: &mut CameraController<RecordingLink>,
    exposure_s: f64,
    delay_s: f64,
    count: u32,
) {
    let status = controller.execute(Command::SetLimits(ExposureLimits {
        exposure_s,
        delay_s,
        count,
    }));
    assert!(status.is_accepted());
}

fn pixel_event(first_row: u16, rows: u16, width: u32) -> Event {
    let mut samples = Vec::new();
    for r in first_row..first_row + rows {
        for c in 0..width as u16 {
            samples.extend_from_slice(&(r * 64 + c).to_le_bytes());
        }
    }
    let payload = PixelFragment::encode(
        FragmentHeader {
            sequence: first_row,
            first_row,
            rows,
        },
        &samples,
    );
    Event::Link(LinkEvent::Data {
        channel: PERIPHERAL,
        payload,
    })
}

fn end_event() -> Event {
    let end = ImageEnd {
        exp_time_ms: 1000,
        read_time_ms: 1500,
        end_time_ms: 1600,
    };
    Event::Link(LinkEvent::Data {
        channel: PERIPHERAL + 1,
        payload: end.to_bytes().to_vec(),
    })
}

/// 投递一整幅 8x8 图像（每分片 3 行）和结束标记
fn feed_image(controller: &mut CameraController<RecordingLink>) -> Vec<Notification> {
    let mut notes = Vec::new();
    let mut row = 0u16;
    while u32::from(row) < SIDE {
        let rows = 3.min(SIDE as u16 - row);
        notes.extend(controller.handle(pixel_event(row, rows, SIDE)));
        row += rows;
    }
    notes.extend(controller.handle(end_event()));
    notes
}

fn fire_alarm(controller: &mut CameraController<RecordingLink>) -> Vec<Notification> {
    let token = controller.timers().armed().expect("alarm armed").token;
    controller.handle(Event::Alarm(token))
}

fn states(notes: &[Notification]) -> Vec<CameraState> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

fn saved_remaining(notes: &[Notification]) -> Vec<u32> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::ImageSaved { remaining, .. } => Some(*remaining),
            _ => None,
        })
        .collect()
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

// ==================== 完整序列 ====================

#[test]
fn test_three_images_with_delay() {
    let dir = TempDir::new().unwrap();
    let (mut c, link) = ready_controller(dir.path());
    set_limits(&mut c, 0.5, 1.0, 3);

    let notes = c.handle(Event::Command(Command::Start));
    assert_eq!(states(&notes), vec![CameraState::Waiting]);
    // 延迟阶段不发送请求
    assert!(link.sent().is_empty());

    let notes = c.handle(Event::Tick);
    assert_eq!(notes, vec![Notification::Countdown {
        delay_ms: 500,
        exposure_ms: 500,
    }]);

    for expected_remaining in [2, 1, 0] {
        let notes = fire_alarm(&mut c);
        assert_eq!(states(&notes), vec![CameraState::Exposing]);

        let notes = feed_image(&mut c);
        assert_eq!(saved_remaining(&notes), vec![expected_remaining]);
        let next = if expected_remaining > 0 {
            CameraState::Waiting
        } else {
            CameraState::Ready
        };
        assert_eq!(states(&notes), vec![CameraState::Reading, next]);
    }

    assert_eq!(c.state(), CameraState::Ready);
    assert_eq!(link.sent().len(), 3);
    assert!(c.timers().armed().is_none());
    assert!(!c.timers().is_ticking());

    for n in 1..=3 {
        let path = dir.path().join(format!("img_{:04}.fits", n));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + BLOCK_LEN);
        // 第 0 行第 1 列，大端
        assert_eq!(&bytes[HEADER_LEN + 2..HEADER_LEN + 4], &[0, 1]);
        // 第 1 行第 0 列 = 64
        let second_row = HEADER_LEN + SIDE as usize * 2;
        assert_eq!(&bytes[second_row..second_row + 2], &[0, 64]);
    }
    assert!(c.header().card("IMAGETYP").unwrap().contains("'object  '"));
}

#[test]
fn test_direct_exposure_sequence_without_delay() {
    let dir = TempDir::new().unwrap();
    let (mut c, link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 2);

    let notes = c.handle(Event::Command(Command::Start));
    assert_eq!(states(&notes), vec![CameraState::Exposing]);

    let notes = feed_image(&mut c);
    // 无延迟时直接重新曝光
    assert_eq!(states(&notes), vec![CameraState::Reading, CameraState::Exposing]);
    assert_eq!(link.sent().len(), 2);

    let notes = feed_image(&mut c);
    assert_eq!(states(&notes), vec![CameraState::Reading, CameraState::Ready]);
    assert_eq!(file_count(dir.path()), 2);
}

// ==================== 停止与过期闹钟 ====================

#[test]
fn test_stale_alarm_after_stop_is_ignored() {
    let dir = TempDir::new().unwrap();
    let (mut c, link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 5.0, 1);

    c.handle(Event::Command(Command::Start));
    assert_eq!(c.state(), CameraState::Waiting);
    assert_eq!(file_count(dir.path()), 1);
    let token = c.timers().armed().unwrap().token;

    let notes = c.handle(Event::Command(Command::Stop));
    assert_eq!(states(&notes), vec![CameraState::Ready]);
    assert_eq!(file_count(dir.path()), 0);

    let notes = c.handle(Event::Alarm(token));
    assert!(notes.is_empty());
    assert_eq!(c.state(), CameraState::Ready);
    assert!(link.sent().is_empty());

    // Ready 状态下节拍不计数
    assert!(c.handle(Event::Tick).is_empty());
}

#[test]
fn test_stop_while_exposing_sends_cancel() {
    let dir = TempDir::new().unwrap();
    let (mut c, link) = ready_controller(dir.path());
    set_limits(&mut c, 30.0, 0.0, 1);

    c.handle(Event::Command(Command::Start));
    assert!(c.execute(Command::Stop).is_accepted());
    assert_eq!(c.state(), CameraState::Ready);

    let sent = link.sent();
    assert_eq!(sent.len(), 2);
    let request = RequestHeader::try_from(&sent[0][..]).unwrap();
    let cancel = RequestHeader::try_from(&sent[1][..]).unwrap();
    assert!(!request.cancel);
    assert!(cancel.cancel);
    assert_eq!(cancel.exposure, request.exposure);
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn test_stop_rejected_while_reading() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);

    c.handle(Event::Command(Command::Start));
    c.handle(pixel_event(0, 2, SIDE));
    assert_eq!(c.state(), CameraState::Reading);
    assert!(!c.execute(Command::Stop).is_accepted());
    assert_eq!(c.state(), CameraState::Reading);
}

// ==================== 命令接受策略 ====================

#[test]
fn test_category_change_during_waiting_zeroes_counters() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 5.0, 2.0, 2);

    c.handle(Event::Command(Command::Start));
    assert_eq!(c.sequencer().delay_remaining_ms(), 2000);
    assert_eq!(c.sequencer().exposure_remaining_ms(), 5000);

    assert!(c.execute(Command::SetCategory(ImageCategory::Bias)).is_accepted());
    assert_eq!(c.sequencer().limits().exposure_s, 0.0);
    assert_eq!(c.sequencer().limits().delay_s, 0.0);
    assert_eq!(c.sequencer().delay_remaining_ms(), 0);
    assert_eq!(c.sequencer().exposure_remaining_ms(), 0);
    assert_eq!(c.state(), CameraState::Waiting);
}

#[test]
fn test_geometry_locked_outside_ready() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 10.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));
    let before = c.geometry().state().clone();

    for command in [
        Command::SetBinning(2),
        Command::SetModel(1),
        Command::SetArea(AreaSelection::FullFrame),
        Command::SetTestPattern(true),
    ] {
        assert!(!c.execute(command).is_accepted());
    }
    assert_eq!(c.geometry().state(), &before);

    // 非几何设置随时接受，下一次曝光生效
    assert!(c.execute(Command::SetClearCount(4)).is_accepted());
    assert!(
        c.execute(Command::SetTransform {
            flip_lr: true,
            flip_ud: false,
        })
        .is_accepted()
    );
}

#[test]
fn test_out_of_bounds_area_leaves_geometry_unchanged() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    let before = c.geometry().state().clone();

    let status = c.execute(Command::SetArea(AreaSelection::UserDefined(VisibleRect::new(
        760, 500, 20, 20,
    ))));
    assert!(!status.is_accepted());
    assert_eq!(c.geometry().state(), &before);
}

// ==================== 附加元数据 ====================

const SEED: WcsSeed = WcsSeed {
    scale_arcsec: 3.6,
    rotation_deg: 12.5,
};

fn saved_header(path: &Path) -> String {
    let bytes = fs::read(path).unwrap();
    String::from_utf8_lossy(&bytes[..HEADER_LEN]).into_owned()
}

#[test]
fn test_annotations_saved_in_header() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    assert!(c.execute(Command::SetWcsSeed(SEED)).is_accepted());
    assert!(c.execute(Command::SetComment("seeing 2 arcsec".to_string())).is_accepted());
    c.handle(Event::Link(LinkEvent::Telemetry(Telemetry::Temperature {
        cold_c: -12.5,
        hot_c: 21.0,
        peltier_v: 4.2,
    })));
    c.handle(Event::Link(LinkEvent::Telemetry(Telemetry::Firmware {
        program: "COR".to_string(),
        date: "2024-03-09".to_string(),
        time: "21:04".to_string(),
    })));
    set_limits(&mut c, 1.0, 0.0, 1);

    c.handle(Event::Command(Command::Start));
    // 曝光中的遥测在保存时生效
    c.handle(Event::Link(LinkEvent::Telemetry(Telemetry::Temperature {
        cold_c: -15.0,
        hot_c: 22.0,
        peltier_v: 4.5,
    })));
    feed_image(&mut c);
    assert_eq!(c.state(), CameraState::Ready);

    let text = saved_header(&dir.path().join("img_0001.fits"));
    assert!(text.contains("CDELT1  =                0.001"));
    assert!(text.contains("CDELT2  =                0.001"));
    assert!(text.contains("CROTA2  =                 12.5"));
    assert!(text.contains("COMMENT seeing 2 arcsec"));
    assert!(text.contains("COMMENT Written by the Audine acquisition core"));
    assert!(text.contains("CCD-TEMP=                  -15"));
    assert!(text.contains("HOT-TEMP=                   22"));
    assert!(text.contains("VPELT   =                  4.5"));
    assert!(text.contains("FIRMWARE= 'COR 2024-03-09 21:04'"));
}

#[test]
fn test_wcs_cards_follow_category() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    assert!(c.execute(Command::SetWcsSeed(SEED)).is_accepted());
    assert!(c.header().card("CDELT1").is_some());

    assert!(c.execute(Command::SetCategory(ImageCategory::Dark)).is_accepted());
    for key in ["CDELT1", "CDELT2", "CROTA2"] {
        assert!(c.header().card(key).is_none(), "{} kept for dark", key);
    }

    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));
    feed_image(&mut c);
    let text = saved_header(&dir.path().join("img_0001.fits"));
    assert!(!text.contains("CDELT1"));
    assert!(!text.contains("CROTA2"));
    assert!(text.contains("IMAGETYP= 'dark    '"));

    // 切回天体图像时按保存的种子恢复
    assert!(c.execute(Command::SetCategory(ImageCategory::Object)).is_accepted());
    assert!(c.header().card("CROTA2").unwrap().contains("12.5"));
}

#[test]
fn test_annotation_commands_locked_outside_ready() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 10.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));
    assert_eq!(c.state(), CameraState::Exposing);

    assert!(!c.execute(Command::SetWcsSeed(SEED)).is_accepted());
    assert!(!c.execute(Command::SetComment("late".to_string())).is_accepted());
    assert_eq!(c.wcs_seed(), WcsSeed::default());
    assert!(c.header().card("CDELT1").is_none());

    let invalid = WcsSeed {
        scale_arcsec: f64::NAN,
        ..SEED
    };
    c.handle(Event::Command(Command::Stop));
    assert!(!c.execute(Command::SetWcsSeed(invalid)).is_accepted());
    assert_eq!(c.wcs_seed(), WcsSeed::default());
}

// ==================== 告警路径 ====================

#[test]
fn test_exposure_timeout_raises_alert_and_recovers() {
    let dir = TempDir::new().unwrap();
    let (mut c, link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 3);

    c.handle(Event::Command(Command::Start));
    let notes = fire_alarm(&mut c);
    assert_eq!(states(&notes), vec![CameraState::Alert]);
    assert!(notes.iter().any(|n| matches!(n, Notification::Fault { .. })));
    assert_eq!(file_count(dir.path()), 0);
    assert!(RequestHeader::try_from(&link.sent()[1][..]).unwrap().cancel);
    assert_eq!(c.sequencer().count_remaining(), 0);

    // 告警状态下拒绝开始，重连后恢复
    assert!(!c.execute(Command::Start).is_accepted());
    let notes = c.handle(Event::Link(LinkEvent::Connected));
    assert_eq!(states(&notes), vec![CameraState::Ready]);
}

#[test]
fn test_readout_timeout_raises_alert() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);

    c.handle(Event::Command(Command::Start));
    c.handle(pixel_event(0, 3, SIDE));
    assert_eq!(c.state(), CameraState::Reading);

    let notes = fire_alarm(&mut c);
    assert_eq!(states(&notes), vec![CameraState::Alert]);
    assert!(!c.is_streaming());
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn test_partial_row_fragment_raises_alert() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));

    let mut payload = FragmentHeader {
        sequence: 0,
        first_row: 0,
        rows: 1,
    }
    .to_bytes()
    .to_vec();
    payload.extend_from_slice(&[0u8; 19]);
    let notes = c.handle(Event::Link(LinkEvent::Data {
        channel: PERIPHERAL,
        payload,
    }));

    assert_eq!(states(&notes), vec![CameraState::Reading, CameraState::Alert]);
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn test_end_marker_before_pixels_raises_alert() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));

    let notes = c.handle(end_event());
    assert_eq!(states(&notes), vec![CameraState::Alert]);
}

#[test]
fn test_short_image_raises_alert() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));

    c.handle(pixel_event(0, 5, SIDE));
    let notes = c.handle(end_event());
    assert_eq!(states(&notes), vec![CameraState::Alert]);
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn test_disconnect_discards_image() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));
    c.handle(pixel_event(0, 3, SIDE));

    let notes = c.handle(Event::Link(LinkEvent::Disconnected));
    assert_eq!(states(&notes), vec![CameraState::Idle]);
    assert_eq!(file_count(dir.path()), 0);
    assert!(c.timers().armed().is_none());
}

#[test]
fn test_foreign_channel_ignored() {
    let dir = TempDir::new().unwrap();
    let (mut c, _link) = ready_controller(dir.path());
    set_limits(&mut c, 1.0, 0.0, 1);
    c.handle(Event::Command(Command::Start));

    let notes = c.handle(Event::Link(LinkEvent::Data {
        channel: 0x40,
        payload: vec![1, 2, 3],
    }));
    assert!(notes.is_empty());
    assert_eq!(c.state(), CameraState::Exposing);
}

// ==================== 事件循环 + 模拟相机 ====================

#[test]
fn test_event_loop_with_simulated_camera() {
    let dir = TempDir::new().unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let link = SimulatedLink::new(PERIPHERAL, tx).with_rows_per_fragment(5);
    link.connect().unwrap();
    let controller = CameraController::new(&config(dir.path()), link).unwrap();
    let handle = EventLoop::spawn(controller, rx).unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    let wait_for = |pred: &dyn Fn(&Notification) -> bool| loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let note = handle
            .notifications()
            .recv_timeout(remaining)
            .expect("notification before deadline");
        if pred(&note) {
            return note;
        }
    };

    wait_for(&|n| matches!(n, Notification::StateChanged { to: CameraState::Ready, .. }));

    handle
        .send(Command::SetArea(AreaSelection::Preset {
            preset: Preset::Center,
            width: 16,
        }))
        .unwrap();
    handle
        .send(Command::SetLimits(ExposureLimits {
            exposure_s: 0.1,
            delay_s: 0.0,
            count: 2,
        }))
        .unwrap();
    handle.send(Command::Start).unwrap();

    for expected in [1, 0] {
        let note = wait_for(&|n| matches!(n, Notification::ImageSaved { .. }));
        let Notification::ImageSaved { path, remaining } = note else {
            unreachable!();
        };
        assert_eq!(remaining, expected);
        assert_eq!(fs::metadata(&path).unwrap().len(), (HEADER_LEN + BLOCK_LEN) as u64);
    }
    wait_for(&|n| matches!(n, Notification::StateChanged { to: CameraState::Ready, .. }));

    let controller = handle.shutdown().unwrap();
    assert_eq!(controller.state(), CameraState::Ready);
    assert_eq!(file_count(dir.path()), 2);
}
