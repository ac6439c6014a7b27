//! Vulkan 后端
//!
//! - driver: [`VulkanDriver`]，实例 / 适配器 / 设备 / 命令 / 围栏
//! - debug: 调试信使与验证消息过滤
//! - memory: 缓冲区和图像的内存分配
//! - surface: surface 与交换链

pub mod debug;
pub mod driver;
pub mod memory;
pub mod surface;

pub use driver::{VulkanAdapter, VulkanCommandAllocator, VulkanDevice, VulkanDriver, VulkanFence};
pub use memory::{VulkanBuffer, VulkanTexture};
pub use surface::VulkanSwapChain;
