//! 验证层配置
//!
//! 根据 [`ValidationMode`] 决定：
//! - 是否启用调试 / 验证层
//! - 是否启用 GPU 辅助验证和同步队列验证
//! - 消息过滤规则：严重级别白名单、消息 ID 黑名单、按严重级别中断
//!
//! `Disabled` 模式下不会向驱动发出任何启用调用。
//! 验证层接口不可用只记录警告，验证保持关闭，不会让设备创建失败。

use tracing::{debug, info, warn};

use crate::core::config::ValidationMode;
use crate::gfx::backend::NativeDriver;

/// 验证消息严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSeverity {
    Corruption,
    Error,
    Warning,
    Message,
    Info,
}

/// 所有验证模式都允许的严重级别
pub const BASE_SEVERITIES: [MessageSeverity; 4] = [
    MessageSeverity::Corruption,
    MessageSeverity::Error,
    MessageSeverity::Warning,
    MessageSeverity::Message,
];

/// 触发调试中断的严重级别
pub const BREAK_SEVERITIES: [MessageSeverity; 2] = [
    MessageSeverity::Corruption,
    MessageSeverity::Error,
];

/// 驱动消息 ID（`D3D12_MESSAGE_ID` / Vulkan `messageIdNumber`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// 驱动层消息过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    /// 允许通过的严重级别
    pub allow: Vec<MessageSeverity>,
    /// 直接丢弃的消息 ID
    pub deny: Vec<MessageId>,
    /// 触发调试中断的严重级别
    pub break_on: Vec<MessageSeverity>,
}

impl MessageFilter {
    pub fn allows(&self, severity: MessageSeverity) -> bool {
        self.allow.contains(&severity)
    }

    pub fn is_denied(&self, id: MessageId) -> bool {
        self.deny.contains(&id)
    }

    pub fn breaks_on(&self, severity: MessageSeverity) -> bool {
        self.break_on.contains(&severity)
    }

    /// 一条消息是否应该到达应用日志
    pub fn passes(&self, severity: MessageSeverity, id: MessageId) -> bool {
        self.allows(severity) && !self.is_denied(id)
    }
}

/// 验证模式展开后的目标设置（纯数据，不涉及驱动调用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSettings {
    pub mode: ValidationMode,
    pub debug_layer: bool,
    pub gpu_based: bool,
    pub synchronized_queue: bool,
    /// 验证层启用时安装的过滤器
    pub filter: Option<MessageFilter>,
}

impl ValidationSettings {
    /// 由验证模式和后端的无害消息列表得出设置
    pub fn for_mode(mode: ValidationMode, benign: &[MessageId]) -> Self {
        if !mode.is_enabled() {
            return Self {
                mode,
                debug_layer: false,
                gpu_based: false,
                synchronized_queue: false,
                filter: None,
            };
        }

        let mut allow = BASE_SEVERITIES.to_vec();
        if mode == ValidationMode::Verbose {
            allow.push(MessageSeverity::Info);
        }

        let gpu_based = mode == ValidationMode::Gpu;

        Self {
            mode,
            debug_layer: true,
            gpu_based,
            synchronized_queue: gpu_based,
            filter: Some(MessageFilter {
                allow,
                deny: benign.to_vec(),
                break_on: BREAK_SEVERITIES.to_vec(),
            }),
        }
    }
}

/// 验证层在本次设备创建中的实际状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationState {
    settings: ValidationSettings,
    layer_active: bool,
    gpu_active: bool,
    fallback_used: bool,
}

impl ValidationState {
    fn inactive(settings: ValidationSettings) -> Self {
        Self {
            settings,
            layer_active: false,
            gpu_active: false,
            fallback_used: false,
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    pub fn mode(&self) -> ValidationMode {
        self.settings.mode
    }

    /// 验证层是否真正处于启用状态
    pub fn is_active(&self) -> bool {
        self.layer_active
    }

    pub fn gpu_active(&self) -> bool {
        self.layer_active && self.gpu_active
    }

    /// 是否已经因为验证层不可用而回退过
    pub fn fallback_used(&self) -> bool {
        self.fallback_used
    }

    /// 当前生效的过滤器；验证层未启用时为 `None`
    pub fn filter(&self) -> Option<&MessageFilter> {
        if self.layer_active {
            self.settings.filter.as_ref()
        } else {
            None
        }
    }

    /// 验证层不可用时关闭验证，整个创建流程中只允许一次
    ///
    /// 返回 `true` 表示本次回退生效，调用者可以重试一次。
    pub(crate) fn fall_back(&mut self) -> bool {
        if !self.layer_active || self.fallback_used {
            return false;
        }
        self.layer_active = false;
        self.gpu_active = false;
        self.fallback_used = true;
        true
    }
}

/// 验证层配置器
pub struct ValidationConfigurator {
    mode: ValidationMode,
}

impl ValidationConfigurator {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// 向驱动发出启用调用，返回实际生效的状态
    pub fn configure<D: NativeDriver>(&self, driver: &mut D) -> ValidationState {
        let settings = ValidationSettings::for_mode(self.mode, driver.benign_message_ids());
        let mut state = ValidationState::inactive(settings);

        if !state.settings.debug_layer {
            debug!("Validation disabled");
            return state;
        }

        if let Err(e) = driver.enable_validation_layer() {
            warn!(error = %e, "Validation layer unavailable, continuing without validation");
            return state;
        }
        state.layer_active = true;

        if state.settings.gpu_based {
            match driver.enable_gpu_validation(state.settings.synchronized_queue) {
                Ok(()) => state.gpu_active = true,
                Err(e) => {
                    warn!(error = %e, "GPU-based validation unavailable, using basic validation");
                }
            }
        }

        info!(
            mode = ?self.mode,
            gpu_based = state.gpu_active,
            "Validation layer enabled"
        );
        state
    }
}
