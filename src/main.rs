// ==========================================
// 机加工排产系统 - 命令行入口
// ==========================================
// 输入: 订单 JSON 数组 + 全局设置 JSON（+ 可选引擎参数 JSON）
// 输出: 排产结果 JSON（stdout），日志输出到 stderr
// ==========================================

use anyhow::{Context, Result};
use clap::Parser;
use machining_aps::api::{ScheduleApi, ScheduleRequest};
use machining_aps::importer::{load_orders, RawSettings};
use machining_aps::logging;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "machining-aps")]
#[command(about = "机加工排产: 订单分批、机床/操作工分配与单件流计时")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// 订单文件（JSON 数组）
    #[arg(long)]
    orders: PathBuf,

    /// 全局设置文件（默认: <配置目录>/machining-aps/settings.json）
    #[arg(long)]
    settings: Option<PathBuf>,

    /// 引擎参数文件（JSON 对象，键见 config_keys）
    #[arg(long)]
    engine_config: Option<PathBuf>,

    /// 格式化输出
    #[arg(long)]
    pretty: bool,

    /// JSON 格式日志
    #[arg(long)]
    json_log: bool,
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("machining-aps").join("settings.json"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("读取{}失败: {}", what, path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析{}失败: {}", what, path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_log {
        logging::init_json();
    } else {
        logging::init();
    }

    info!(version = machining_aps::VERSION, "{} 启动", machining_aps::APP_NAME);

    let settings_path = cli
        .settings
        .clone()
        .or_else(default_settings_path)
        .context("无法确定设置文件路径，请使用 --settings 指定")?;

    let orders = load_orders(&cli.orders)
        .with_context(|| format!("加载订单失败: {}", cli.orders.display()))?;
    let settings: RawSettings = read_json(&settings_path, "设置文件")?;
    let engine_config: HashMap<String, serde_json::Value> = match &cli.engine_config {
        Some(path) => read_json(path, "引擎参数文件")?,
        None => HashMap::new(),
    };

    info!(
        orders = orders.len(),
        settings = %settings_path.display(),
        "输入加载完成"
    );

    let output = ScheduleApi::new().run(ScheduleRequest {
        orders,
        settings,
        engine_config,
    });

    let text = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);

    Ok(())
}
