//! 配置管理模块
//!
//! 提供设备配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [device]
//! backend = "vulkan"            # 或 "dx12"
//! validation = "enabled"        # disabled | enabled | gpu | verbose
//! power_preference = "high_performance"  # 或 "low_power"
//! label = "dist_device"
//! software_fallback = false
//! minimum_feature_level = "12.0"
//!
//! [swapchain]
//! width = 1280
//! height = 720
//! buffer_count = 2
//! format = "bgra8_unorm"
//! vsync = true
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::gfx::backend::FeatureLevel;
use crate::renderer::resource::TextureFormat;

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 设备配置
    #[serde(default)]
    pub device: DeviceConfig,

    /// 交换链配置（仅在带窗口运行时使用）
    #[serde(default)]
    pub swapchain: SwapChainConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 设备配置
///
/// 对应设备创建时的描述信息：后端、验证模式、电源偏好和调试名称。
/// 设备创建之后不会再被修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 验证层模式
    #[serde(default = "default_validation")]
    pub validation: ValidationMode,

    /// 适配器选择偏好
    #[serde(default = "default_power_preference")]
    pub power_preference: PowerPreference,

    /// 设备调试名称
    #[serde(default)]
    pub label: Option<String>,

    /// 没有合格的硬件适配器时，是否允许使用软件光栅化适配器
    #[serde(default)]
    pub software_fallback: bool,

    /// 最低特性等级（Vulkan 为 API 版本，D3D 为 feature level）
    ///
    /// 未设置时使用后端的默认值。
    #[serde(default)]
    pub minimum_feature_level: Option<FeatureLevel>,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// Vulkan 后端
    Vulkan,
    /// DirectX 12 后端
    Dx12,
}

/// 验证层模式
///
/// 四个等级彼此独立，不是一条线性链：
/// `Verbose` 是 `Enabled` 的过滤规则再加上 Info 级消息，
/// `Gpu` 在 `Enabled` 的基础上额外开启 GPU 辅助验证。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// 不启用任何验证
    Disabled,
    /// 启用基础验证层
    Enabled,
    /// 基础验证层 + GPU 辅助验证
    Gpu,
    /// 基础验证层 + Info 级消息
    Verbose,
}

/// 适配器选择偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    /// 优先独立显卡
    HighPerformance,
    /// 优先集成显卡
    LowPower,
}

/// 交换链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapChainConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// 后备缓冲数量
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    #[serde(default = "default_format")]
    pub format: TextureFormat,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_backend() -> GraphicsBackend { GraphicsBackend::Vulkan }
fn default_validation() -> ValidationMode {
    if cfg!(debug_assertions) { ValidationMode::Enabled } else { ValidationMode::Disabled }
}
fn default_power_preference() -> PowerPreference { PowerPreference::HighPerformance }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_buffer_count() -> u32 { 2 }
fn default_format() -> TextureFormat { TextureFormat::Bgra8Unorm }
fn default_vsync() -> bool { true }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dist_device.log".to_string() }

/// 没有配置调试名称时使用的设备名
pub const DEFAULT_DEVICE_LABEL: &str = "dist_device";

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            validation: default_validation(),
            power_preference: default_power_preference(),
            label: None,
            software_fallback: false,
            minimum_feature_level: None,
        }
    }
}

impl Default for SwapChainConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            buffer_count: default_buffer_count(),
            format: default_format(),
            vsync: default_vsync(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use dist_device::core::Config;
    ///
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--backend <vulkan|dx12>`: 选择图形后端
    /// - `--dx12`: 等同于 `--backend dx12`
    /// - `--validation <disabled|enabled|gpu|verbose>`: 验证层模式
    /// - `--low-power`: 优先选择低功耗适配器
    /// - `--label <name>`: 设备调试名称
    /// - `--software-fallback`: 允许回退到软件适配器
    ///
    /// 无法识别的值会被忽略，保留原配置。
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.device.backend = GraphicsBackend::Dx12;
        }

        if let Some(value) = value_after(&args, "--backend") {
            match value {
                "vulkan" => self.device.backend = GraphicsBackend::Vulkan,
                "dx12" => self.device.backend = GraphicsBackend::Dx12,
                _ => {}
            }
        }

        if let Some(value) = value_after(&args, "--validation") {
            if let Some(mode) = ValidationMode::parse(value) {
                self.device.validation = mode;
            }
        }

        if args.iter().any(|a| a == "--low-power") {
            self.device.power_preference = PowerPreference::LowPower;
        }

        if args.iter().any(|a| a == "--software-fallback") {
            self.device.software_fallback = true;
        }

        if let Some(label) = value_after(&args, "--label") {
            self.device.label = Some(label.to_string());
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.swapchain.width == 0 || self.swapchain.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "swapchain.width/height".to_string(),
                reason: "Swapchain dimensions must be greater than 0".to_string(),
            }.into());
        }

        if !(2..=16).contains(&self.swapchain.buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "swapchain.buffer_count".to_string(),
                reason: "Buffer count must be between 2 and 16".to_string(),
            }.into());
        }

        if let Some(level) = self.device.minimum_feature_level {
            if level.major == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "device.minimum_feature_level".to_string(),
                    reason: format!("Feature level {} is below 1.0", level),
                }.into());
            }
        }

        Ok(())
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

impl DeviceConfig {
    /// 设备调试名称，未配置时为 [`DEFAULT_DEVICE_LABEL`]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_DEVICE_LABEL)
    }

    /// 生效的最低特性等级
    pub fn minimum_feature_level(&self) -> FeatureLevel {
        self.minimum_feature_level
            .unwrap_or_else(|| self.backend.default_minimum_feature_level())
    }
}

impl GraphicsBackend {
    pub fn is_dx12(&self) -> bool {
        matches!(self, GraphicsBackend::Dx12)
    }

    pub fn is_vulkan(&self) -> bool {
        matches!(self, GraphicsBackend::Vulkan)
    }

    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Vulkan => "Vulkan",
            GraphicsBackend::Dx12 => "DirectX 12",
        }
    }

    /// 后端默认的最低特性等级
    ///
    /// Vulkan 需要 1.2（时间线信号量），DX12 与常见做法一致使用 11.0。
    pub fn default_minimum_feature_level(&self) -> FeatureLevel {
        match self {
            GraphicsBackend::Vulkan => FeatureLevel::new(1, 2),
            GraphicsBackend::Dx12 => FeatureLevel::new(11, 0),
        }
    }
}

impl ValidationMode {
    /// 解析命令行中的验证模式
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "disabled" | "off" => Some(ValidationMode::Disabled),
            "enabled" | "on" => Some(ValidationMode::Enabled),
            "gpu" => Some(ValidationMode::Gpu),
            "verbose" => Some(ValidationMode::Verbose),
            _ => None,
        }
    }

    /// 是否需要启用验证层
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ValidationMode::Disabled)
    }
}
