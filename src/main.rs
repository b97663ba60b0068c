use anyhow::Context;
use clap::Parser;
use relaygate::config::{Config, KeyPool};
use relaygate::server::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relaygate")]
#[command(about = "多提供商 AI 补全网关", long_about = None)]
struct Args {
    /// 配置文件路径（不指定时从 <PROVIDER>_API_KEYS 环境变量读取密钥）
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path))?,
        None => Config::from_env().context("无法从环境变量构建配置")?,
    };

    let configured = KeyPool::from_config(&config).configured();
    if configured.is_empty() {
        warn!("没有任何提供商配置了密钥，所有补全请求都会失败");
    } else {
        info!(providers = ?configured, "已加载提供商密钥");
    }

    let state = Arc::new(AppState::from_config(&config)?);

    // 解析监听地址
    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", args.bind))?;

    // 启动服务器
    server::start_server(state, addr).await?;

    Ok(())
}
