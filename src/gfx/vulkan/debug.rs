//! Vulkan 调试信使
//!
//! `VK_EXT_debug_utils` 的回调把验证消息转发到 tracing 的
//! [`VALIDATION_TARGET`]。过滤器在设备创建之后才安装，
//! 在此之前使用只屏蔽已知无害消息的默认规则。

use std::borrow::Cow;
use std::ffi::{c_void, CStr};
use std::sync::RwLock;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::core::log::VALIDATION_TARGET;
use crate::gfx::validation::{MessageFilter, MessageId, MessageSeverity};

/// `VUID-VkSwapchainCreateInfoKHR-imageExtent-01274`
///
/// 窗口缩放过程中 surface 尺寸和交换链尺寸短暂不一致，属于正常现象。
pub const SWAPCHAIN_EXTENT_MISMATCH: MessageId = MessageId(0x7cd0911d);

pub(super) const BENIGN_MESSAGE_IDS: &[MessageId] = &[SWAPCHAIN_EXTENT_MISMATCH];

/// 回调通过 `pUserData` 访问的状态，由驱动装箱持有，地址在实例生命周期内不变
pub(super) struct MessengerState {
    filter: RwLock<Option<MessageFilter>>,
}

impl MessengerState {
    pub fn new() -> Self {
        Self {
            filter: RwLock::new(None),
        }
    }

    pub fn install(&self, filter: &MessageFilter) {
        let mut slot = self
            .filter
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(filter.clone());
    }

    fn passes(&self, severity: MessageSeverity, id: MessageId) -> bool {
        let slot = self
            .filter
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slot.as_ref() {
            Some(filter) => filter.passes(severity, id),
            None => !BENIGN_MESSAGE_IDS.contains(&id),
        }
    }
}

/// Vulkan 严重级别到统一严重级别的映射
pub(super) fn severity_from_vk(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> MessageSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        MessageSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        MessageSeverity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        MessageSeverity::Message
    } else {
        MessageSeverity::Info
    }
}

pub(super) fn messenger_create_info(
    state: &MessengerState,
) -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'_> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .user_data(state as *const MessengerState as *mut c_void)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*callback_data;
    let id = MessageId(data.message_id_number);
    let severity = severity_from_vk(severity);

    if !user_data.is_null() {
        let state = &*(user_data as *const MessengerState);
        if !state.passes(severity, id) {
            return vk::FALSE;
        }
    }

    let message = if data.p_message.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    let id_name = if data.p_message_id_name.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(data.p_message_id_name).to_string_lossy()
    };

    match severity {
        MessageSeverity::Corruption | MessageSeverity::Error => {
            error!(target: VALIDATION_TARGET, id = id.0, name = %id_name, kind = ?message_type, "{}", message)
        }
        MessageSeverity::Warning => {
            warn!(target: VALIDATION_TARGET, id = id.0, name = %id_name, kind = ?message_type, "{}", message)
        }
        MessageSeverity::Message => {
            info!(target: VALIDATION_TARGET, id = id.0, name = %id_name, kind = ?message_type, "{}", message)
        }
        MessageSeverity::Info => {
            debug!(target: VALIDATION_TARGET, id = id.0, name = %id_name, kind = ?message_type, "{}", message)
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::validation::{BASE_SEVERITIES, BREAK_SEVERITIES};

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            MessageSeverity::Error
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            MessageSeverity::Warning
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::INFO),
            MessageSeverity::Message
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            MessageSeverity::Info
        );
    }

    #[test]
    fn test_default_rules_drop_benign_ids() {
        let state = MessengerState::new();
        assert!(!state.passes(MessageSeverity::Warning, SWAPCHAIN_EXTENT_MISMATCH));
        assert!(state.passes(MessageSeverity::Info, MessageId(1)));
    }

    #[test]
    fn test_installed_filter_replaces_defaults() {
        let state = MessengerState::new();
        state.install(&MessageFilter {
            allow: BASE_SEVERITIES.to_vec(),
            deny: vec![MessageId(7)],
            break_on: BREAK_SEVERITIES.to_vec(),
        });

        assert!(!state.passes(MessageSeverity::Error, MessageId(7)));
        assert!(!state.passes(MessageSeverity::Info, MessageId(1)));
        assert!(state.passes(MessageSeverity::Warning, SWAPCHAIN_EXTENT_MISMATCH));
    }
}
