//! 日志系统
//!
//! 基于 `tracing` 的结构化日志，控制台输出加可选的按天滚动文件输出。
//! 原生验证层的消息统一走 [`VALIDATION_TARGET`]，即使全局级别是 `error`，
//! 验证层警告也会保留下来。
//!
//! ```no_run
//! use dist_device::core::{config::LogLevel, log};
//!
//! log::init_logger(LogLevel::Info, false, None);
//! tracing::info!(adapter = "Mock GPU", "Device ready");
//! ```

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use super::config::LogLevel;

/// 原生验证层消息使用的 target
pub const VALIDATION_TARGET: &str = "dist_device::validation";

const DEFAULT_LOG_FILE: &str = "dist_device.log";

/// 按配置级别生成的过滤指令
///
/// 验证层 target 至少保留到 `warn`。
pub fn filter_directives(level: LogLevel) -> String {
    let validation = match level {
        LogLevel::Error => LogLevel::Warn,
        other => other,
    };
    format!("{},{}={}", level.as_filter(), VALIDATION_TARGET, validation.as_filter())
}

/// 初始化日志系统
///
/// 进程内只能调用一次。`RUST_LOG` 存在时优先使用它。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否同时写入文件
/// * `log_file_path` - 日志文件路径，缺省为 `dist_device.log`
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));
    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = file_output.then(|| {
        let path = Path::new(log_file_path.unwrap_or(DEFAULT_LOG_FILE));
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_LOG_FILE);

        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(RollingFileAppender::new(Rotation::DAILY, directory, filename))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

impl LogLevel {
    /// 转换为 `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives(LogLevel::Info),
            "info,dist_device::validation=info"
        );
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_validation_warnings_survive_error_level() {
        assert_eq!(
            filter_directives(LogLevel::Error),
            "error,dist_device::validation=warn"
        );
        assert!(EnvFilter::try_new(filter_directives(LogLevel::Error)).is_ok());
    }
}
