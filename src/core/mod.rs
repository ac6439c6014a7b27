//! 核心功能模块
//!
//! 本模块提供了与具体图形 API 无关的基础功能：日志系统、配置管理、
//! 错误处理，以及进程级的后端支持缓存。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件加载设备设置
//! - `error`：错误处理，定义统一的错误类型
//! - `runtime`：进程级缓存（后端是否可用只探测一次）

pub mod log;
pub mod config;
pub mod error;
pub mod runtime;

// 重新导出常用类型，方便使用
pub use error::{Result, DistDeviceError, GraphicsError, NativeError, NativeErrorKind, NativeResult};
pub use config::{Config, DeviceConfig, GraphicsBackend, PowerPreference, ValidationMode};
