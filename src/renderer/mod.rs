//! 设备上的对象
//!
//! 与具体图形 API 无关的资源、命令和同步封装，
//! 全部通过 [`NativeDriver`](crate::gfx::NativeDriver) 访问原生对象。
//!
//! - `resource`：缓冲区、纹理、交换链及其描述符
//! - `command`：命令池、命令缓冲区、命令队列
//! - `sync`：围栏

pub mod command;
pub mod resource;
pub mod sync;

pub use command::{CommandBuffer, CommandBufferState, CommandPool, CommandQueue};
pub use resource::{
    Buffer, BufferDescriptor, BufferUsage, MemoryType, PresentMode, SurfaceTarget, SwapChain,
    SwapChainDescriptor, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsage,
};
pub use sync::{Fence, FenceValue};
