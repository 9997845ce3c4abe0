use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_core::config::AppConfig;

mod app;

use app::Application;

/// MCP任务委派与调度核心
#[derive(Debug, Parser)]
#[command(name = "mcp-scheduler", version, about = "MCP任务委派与调度核心")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 嵌入式模式：使用内存存储，不依赖Redis
    #[arg(long)]
    embedded: bool,

    /// 日志级别（被RUST_LOG环境变量覆盖）
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 以JSON格式输出日志
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    info!("启动MCP调度核心");
    let config = AppConfig::load(cli.config.as_deref())
        .with_context(|| format!("加载配置失败: {:?}", cli.config))?;

    let app = Application::build(&config, cli.embedded).await?;
    let monitor_handle = app.start_monitor();

    // 启动快照：队列规模与封锁状态
    let stats = app.task_service.get_queue_stats().await;
    info!(
        "队列状态: {} (排队 {})",
        stats.service_status,
        stats.stats.map(|s| s.total_queued).unwrap_or(0)
    );
    if app.lockdown.is_lockdown_active().await.unwrap_or(false) {
        tracing::warn!("注意：全局封锁当前生效");
    }

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    monitor_handle.shutdown().await;
    info!("MCP调度核心已退出");
    Ok(())
}

fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志失败")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("初始化日志失败")?;
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}
