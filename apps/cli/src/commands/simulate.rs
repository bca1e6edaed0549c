//! 模拟采集命令
//!
//! 用模拟相机驱动完整的事件循环，把图像写入输出目录。Ctrl+C 发送停止命令。

use anyhow::{Context, Result};
use audine_client::{
    CameraController, CameraState, Command, EventLoop, Notification, SimulatedLink,
};
use audine_driver::{ExposureLimits, WcsSeed};
use audine_tools::CameraConfig;
use clap::Args;
use crossbeam_channel::{select, unbounded};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{AreaArgs, CategoryArg};

/// 模拟采集参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 张数
    #[arg(short, long, default_value_t = 1)]
    pub count: u32,

    /// 曝光时长（秒）
    #[arg(short, long, default_value_t = 1.0)]
    pub exposure: f64,

    /// 张间延迟（秒）
    #[arg(short, long, default_value_t = 0.0)]
    pub delay: f64,

    /// 图像类别
    #[arg(long, value_enum, default_value = "object")]
    pub category: CategoryArg,

    /// 合并因子（默认取配置）
    #[arg(long)]
    pub binning: Option<u8>,

    /// 左右翻转
    #[arg(long)]
    pub flip_lr: bool,

    /// 上下翻转
    #[arg(long)]
    pub flip_ud: bool,

    /// 硬件测试图样
    #[arg(long)]
    pub test_pattern: bool,

    /// 输出目录（默认取配置）
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// 每个分片的行数
    #[arg(long, default_value_t = 32)]
    pub rows_per_fragment: u16,

    /// 用户注释（COMMENT 卡片）
    #[arg(long)]
    pub comment: Option<String>,

    /// 像素比例（角秒/像素），天体图像写入 CDELT1/CDELT2
    #[arg(long)]
    pub wcs_scale: Option<f64>,

    /// 视场旋转（度）
    #[arg(long, default_value_t = 0.0)]
    pub wcs_rotation: f64,

    #[command(flatten)]
    pub area: AreaArgs,
}

impl SimulateCommand {
    pub fn execute(&self, config: &CameraConfig) -> Result<()> {
        let mut config = config.clone();
        if let Some(out) = &self.out {
            config.output_dir = out.clone();
        }
        if let Some(binning) = self.binning {
            config.binning = binning;
        }
        config.test_pattern = self.test_pattern;
        config.transform.flip_lr = self.flip_lr;
        config.transform.flip_ud = self.flip_ud;
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("创建输出目录失败: {}", config.output_dir.display()))?;

        let (link_tx, link_rx) = unbounded();
        let link = SimulatedLink::new(config.peripheral, link_tx)
            .with_rows_per_fragment(self.rows_per_fragment);
        link.connect()?;
        let controller = CameraController::new(&config, link)?;
        let handle = EventLoop::spawn(controller, link_rx)?;

        let (stop_tx, stop_rx) = unbounded();
        ctrlc::set_handler(move || {
            let _ = stop_tx.send(());
        })
        .context("注册 Ctrl+C 处理器失败")?;

        let mut configured = false;
        let mut saved = Vec::new();
        loop {
            select! {
                recv(stop_rx) -> _ => {
                    warn!("Interrupted, stopping sequence");
                    handle.send(Command::Stop)?;
                    break;
                },
                recv(handle.notifications()) -> note => {
                    let note = note.context("事件循环已退出")?;
                    match note {
                        Notification::StateChanged { to: CameraState::Ready, .. } if !configured => {
                            configured = true;
                            for command in self.commands() {
                                handle.send(command)?;
                            }
                        },
                        Notification::StateChanged { to: CameraState::Ready, .. } => break,
                        Notification::StateChanged { to: CameraState::Alert, .. } => {
                            anyhow::bail!("相机进入告警状态");
                        },
                        Notification::Command { command, status } if !status.is_accepted() => {
                            anyhow::bail!("命令 {} 被拒绝: {:?}", command, status);
                        },
                        Notification::Progress { percent } => {
                            tracing::debug!("Readout {}%", percent);
                        },
                        Notification::ImageSaved { path, remaining } => {
                            println!("✅ {} ({} remaining)", path.display(), remaining);
                            saved.push(path);
                        },
                        Notification::Fault { reason } => warn!("Fault: {}", reason),
                        _ => {},
                    }
                },
            }
        }

        handle.shutdown()?;
        info!("Simulation finished, {} image(s) saved", saved.len());
        Ok(())
    }

    fn commands(&self) -> Vec<Command> {
        let mut commands = vec![
            Command::SetArea(self.area.selection()),
            Command::SetCategory(self.category.into()),
            Command::SetLimits(ExposureLimits {
                exposure_s: self.exposure,
                delay_s: self.delay,
                count: self.count,
            }),
        ];
        if let Some(scale_arcsec) = self.wcs_scale {
            commands.push(Command::SetWcsSeed(WcsSeed {
                scale_arcsec,
                rotation_deg: self.wcs_rotation,
            }));
        }
        if let Some(text) = &self.comment {
            commands.push(Command::SetComment(text.clone()));
        }
        commands.push(Command::Start);
        commands
    }
}
