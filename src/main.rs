use std::time::Duration;

use anyhow::{Context, Result};
use batcher::app::Application;
use batcher::shutdown::{wait_for_shutdown_signal, ShutdownSignal};
use batcher_config::{AppConfig, LogLevel, OutputFormat};
use clap::{Arg, ArgAction, Command};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("batcher")
        .version("1.0.0")
        .about("流水线批处理调度器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认位置查找"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("diagnostics")
                .short('d')
                .long("diagnostics")
                .help("输出tick级诊断信息")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .value_name("BOOL")
                .help("是否输出周期统计，覆盖配置文件")
                .value_parser(clap::value_parser!(bool)),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认位置>")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level =
            level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format =
            format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    if matches.get_flag("diagnostics") {
        config.observability.diagnostics = true;
    }
    if let Some(stats_enabled) = matches.get_one::<bool>("stats") {
        config.observability.stats_enabled = *stats_enabled;
    }

    init_logging(&config)?;

    info!("启动流水线批处理调度器");
    if let Err(e) = run(config).await {
        error!("调度器异常退出: {:#}", e);
        return Err(e);
    }
    info!("流水线批处理调度器已退出");
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let app = Application::new(config)?;
    let shutdown = ShutdownSignal::new();
    let shutdown_rx = shutdown.subscribe();

    let mut app_handle = tokio::spawn(app.run(shutdown_rx));

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        result = &mut app_handle => {
            result.context("调度器任务异常终止")??;
            return Ok(());
        }
    }

    shutdown.trigger();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(result) => {
            let stats = result.context("调度器任务异常终止")??;
            info!(
                "应用已优雅关闭, 成功批次 {}, 运行 {}s",
                stats.succeeded_total,
                stats.uptime_ms / 1000
            );
        }
        Err(_) => {
            warn!("应用关闭超时，强制退出");
        }
    }
    Ok(())
}

/// 初始化日志系统；RUST_LOG 优先于配置
fn init_logging(config: &AppConfig) -> Result<()> {
    let observability = &config.observability;
    let default_filter = if observability.diagnostics {
        format!("{},batcher=debug,batcher_dispatcher=debug", observability.log_level)
    } else {
        observability.log_level.to_string()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    match observability.log_format {
        OutputFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        OutputFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}
