//! 错误处理模块
//!
//! 定义了设备创建流程中使用的统一错误类型。
//!
//! # 错误分类
//!
//! - **平台不支持**（`GraphicsError::UnsupportedPlatform`）：没有合适的适配器，
//!   或缺少必需的扩展。只在构造时出现，且不可恢复。
//! - **原生调用失败**（`GraphicsError::NativeCall`）：底层 API 返回了非成功状态码
//!   （HRESULT / VkResult）。除了验证层相关的两种情况外，一律向上传播。
//! - **资源创建失败**（`GraphicsError::ResourceCreation`）：立即返回给调用者，
//!   不会返回半成品对象。

use std::fmt;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, DistDeviceError>;

/// DistDevice 的错误类型
#[derive(Debug)]
pub enum DistDeviceError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 没有满足要求的适配器或必需扩展，调用者需要换一个后端
    UnsupportedPlatform(String),

    /// 原生 API 调用失败
    NativeCall(NativeError),

    /// 设备创建失败
    DeviceCreation(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 交换链错误
    SwapchainError(String),

    /// 命令执行失败
    CommandExecution(String),

    /// 设备已经被销毁
    DeviceDisposed,
}

/// 原生调用失败的类别
///
/// 驱动实现负责把 HRESULT / VkResult 归类到这里，
/// 上层逻辑只根据类别做决策（例如验证层回退）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// 验证层 / SDK 调试组件不存在
    LayerUnavailable,
    /// 请求的接口或扩展不可用
    InterfaceUnavailable,
    /// 主机或显存不足
    OutOfMemory,
    /// 设备丢失
    DeviceLost,
    /// 当前驱动不支持该操作
    Unsupported,
    /// 其他失败
    Other,
}

/// 一次失败的原生调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// 失败的原生入口点名称，例如 `vkCreateDevice`
    pub call: &'static str,
    /// 原始状态码（HRESULT 或 VkResult）
    pub code: i64,
    /// 归类后的失败类别
    pub kind: NativeErrorKind,
}

impl NativeError {
    pub fn new(call: &'static str, code: i64, kind: NativeErrorKind) -> Self {
        Self { call, code, kind }
    }

    /// 不对应任何状态码的失败（例如缺少窗口句柄）
    pub fn unsupported(call: &'static str) -> Self {
        Self::new(call, 0, NativeErrorKind::Unsupported)
    }

    pub fn is_layer_unavailable(&self) -> bool {
        self.kind == NativeErrorKind::LayerUnavailable
    }
}

/// 原生调用的 Result 类型
pub type NativeResult<T> = std::result::Result<T, NativeError>;

impl fmt::Display for DistDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistDeviceError::Config(e) => write!(f, "Configuration error: {}", e),
            DistDeviceError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DistDeviceError::Io(e) => write!(f, "IO error: {}", e),
            DistDeviceError::Log(msg) => write!(f, "Log error: {}", msg),
            DistDeviceError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::UnsupportedPlatform(msg) => write!(f, "Unsupported platform: {}", msg),
            GraphicsError::NativeCall(e) => write!(f, "{}", e),
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::DeviceDisposed => write!(f, "Device has already been destroyed"),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Native call {} failed with code {:#x} ({:?})",
            self.call, self.code, self.kind
        )
    }
}

impl std::error::Error for DistDeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistDeviceError::Io(e) => Some(e),
            DistDeviceError::Graphics(GraphicsError::NativeCall(e)) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}
impl std::error::Error for NativeError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for DistDeviceError {
    fn from(err: std::io::Error) -> Self {
        DistDeviceError::Io(err)
    }
}

impl From<ConfigError> for DistDeviceError {
    fn from(err: ConfigError) -> Self {
        DistDeviceError::Config(err)
    }
}

impl From<GraphicsError> for DistDeviceError {
    fn from(err: GraphicsError) -> Self {
        DistDeviceError::Graphics(err)
    }
}

impl From<NativeError> for GraphicsError {
    fn from(err: NativeError) -> Self {
        GraphicsError::NativeCall(err)
    }
}

impl From<NativeError> for DistDeviceError {
    fn from(err: NativeError) -> Self {
        DistDeviceError::Graphics(GraphicsError::NativeCall(err))
    }
}
