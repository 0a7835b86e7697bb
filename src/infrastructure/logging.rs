//! 日志系统配置模块
//! 控制台日志（文本或JSON）+ 可选的按天轮转文件日志

use std::path::{Path, PathBuf};

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 初始化日志系统
///
/// 启用文件日志时返回 `WorkerGuard`，调用方必须持有到进程退出，否则缓冲区中的日志会丢失。
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let json = config.format == "json";
    let mut guard = None;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(console_layer(json));

    if config.enable_file_logging {
        let log_dir = log_dir(config);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = rolling::daily(&log_dir, "pspay.log");
        let (writer, file_guard) = non_blocking(file_appender);
        guard = Some(file_guard);

        let file_layer = if json {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    // RUST_LOG 优先于配置
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(guard)
}

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).boxed()
    } else {
        fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .boxed()
    }
}

fn log_dir(config: &LoggingConfig) -> PathBuf {
    config
        .log_file_path
        .as_ref()
        .and_then(|p| Path::new(p).parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            enable_file_logging: true,
            log_file_path: path.map(str::to_string),
        }
    }

    #[test]
    fn test_log_dir_from_file_path() {
        let dir = log_dir(&config(Some("/var/log/pspay/app.log")));
        assert_eq!(dir, PathBuf::from("/var/log/pspay"));
    }

    #[test]
    fn test_log_dir_defaults() {
        assert_eq!(log_dir(&config(None)), PathBuf::from("./logs"));
        // 仅文件名时没有父目录
        assert_eq!(log_dir(&config(Some("app.log"))), PathBuf::from("./logs"));
    }
}
