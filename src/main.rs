/// 定位服务入口
///
/// 用法: trinav <config.json>
///
/// 从标准输入逐行读取 `主题 JSON消息体`，接入后周期定位；
/// 输入结束或 Ctrl-C 时停止调度，并以 JSON 输出最终的位置表。

use chrono::Utc;
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trinav::{ConfigError, MessageError, PositioningConfig, PositioningSystem};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).ok_or_else(|| ConfigError::InvalidParameter {
        parameter: "config".to_string(),
        reason: "用法: trinav <config.json>".to_string(),
    })?;

    let config = PositioningConfig::from_file(&path)?;
    let system = Arc::new(PositioningSystem::from_config(&config)?);
    info!(config = %path, "配置已加载");

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_task = {
        let system = Arc::clone(&system);
        tokio::spawn(async move { system.run_scheduler(stop_rx).await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("收到中断信号，正在停止");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&system, &line),
                Ok(None) => {
                    info!("输入结束");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "读取输入失败");
                    break;
                }
            }
        }
    }

    // 进行中的调度会完整执行后再退出
    let _ = stop_tx.send(true);
    let ticks = scheduler_task.await?;
    info!(ticks, "定位服务已停止");

    println!("{}", serde_json::to_string_pretty(&system.position_feed())?);
    Ok(())
}

fn handle_line(system: &PositioningSystem, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let Some((topic, payload)) = line.split_once(char::is_whitespace) else {
        warn!(line, "输入行缺少消息体");
        return;
    };

    match system.ingest_message(topic, payload.trim().as_bytes(), Utc::now()) {
        Ok(()) => {}
        Err(MessageError::Decode(e)) => warn!(topic, error = %e, "消息解码失败"),
        // 路由已记录拒绝原因
        Err(MessageError::Ingest(_)) => {}
    }
}
