//! # Audine CLI
//!
//! Command-line interface for the Audine CCD acquisition core.
//!
//! ```bash
//! # 保存默认配置
//! audine-cli config set --model 1 --binning 2 --output-dir ./frames
//!
//! # 离线计算几何与超时
//! audine-cli geometry --preset center --width 256
//! audine-cli timeouts --exposure 30
//!
//! # 用模拟相机跑完整采集序列
//! audine-cli simulate --count 3 --exposure 0.5 --delay 1 --flip-ud
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::config::{default_config_file, load_config};
use commands::{ConfigCommand, GeometryCommand, SimulateCommand, TimeoutsCommand};

/// Audine CLI - CCD 相机采集工具
#[derive(Parser, Debug)]
#[command(name = "audine-cli")]
#[command(about = "Command-line interface for the Audine CCD acquisition core", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/audine/camera.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 计算区域选择的几何
    Geometry {
        #[command(flatten)]
        args: GeometryCommand,
    },

    /// 预测曝光与读出超时
    Timeouts {
        #[command(flatten)]
        args: TimeoutsCommand,
    },

    /// 用模拟相机运行采集序列
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("audine_cli=info,audine_client=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_file()?,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config_path),
        Commands::Geometry { args } => args.execute(&load_config(&config_path)?),
        Commands::Timeouts { args } => args.execute(&load_config(&config_path)?),
        Commands::Simulate { args } => args.execute(&load_config(&config_path)?),
    }
}
