//! DistDevice - 多后端图形设备初始化
//!
//! 负责在 Vulkan 或 DirectX 12 上完成一次完整的设备协商：
//! 选择适配器、配置验证层、创建逻辑设备，并生成只读的能力快照。
//! 设备之上提供缓冲区、纹理、交换链、命令池和围栏等基础对象。
//!
//! # 模块结构
//!
//! - `core`: 配置、日志、错误处理、后端可用性缓存
//! - `gfx`: 设备协商流程与各后端的原生驱动
//! - `renderer`: 资源、命令与同步对象
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_device::core::Config;
//! use dist_device::gfx::{GraphicsDevice, VulkanDriver};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let driver = VulkanDriver::new()?;
//! let device = GraphicsDevice::new(driver, &config.device)?;
//!
//! println!("{}", device.capabilities().adapter());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
