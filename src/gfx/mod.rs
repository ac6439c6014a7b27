//! 图形设备协商层
//!
//! 把"选择适配器、配置验证层、创建设备、采集能力"这套流程
//! 针对 [`NativeDriver`] 写一次，Vulkan 和 DirectX 12 各提供一个驱动实现。
//!
//! - `backend`：原生驱动 trait 与共用的数据类型
//! - `extensions`：实例扩展解析
//! - `validation`：验证层配置与消息过滤
//! - `adapter`：适配器枚举与筛选
//! - `factory`：实例 / 逻辑设备创建（含验证层回退）
//! - `capabilities`：能力快照
//! - `device`：[`GraphicsDevice`]，串起整个流程并拥有原生设备

pub mod adapter;
pub mod backend;
pub mod capabilities;
pub mod device;
pub mod extensions;
pub mod factory;
pub mod validation;
pub mod vulkan;
#[cfg(target_os = "windows")]
pub mod dx12;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{AdapterCandidate, AdapterType, ArchitectureInfo, FeatureLevel, NativeDriver};
pub use capabilities::{AdapterIdentity, DeviceCapabilities, DeviceLimits};
pub use device::GraphicsDevice;
pub use validation::{MessageFilter, MessageId, MessageSeverity, ValidationState};
pub use vulkan::VulkanDriver;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Driver;
