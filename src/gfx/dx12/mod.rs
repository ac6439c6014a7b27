//! DirectX 12 后端（仅 Windows）
//!
//! - driver: [`Dx12Driver`]，DXGI 工厂 / 适配器 / D3D12 设备 / 命令 / 围栏
//! - convert: 统一类型到 D3D12 / DXGI 枚举的转换

mod convert;
pub mod driver;

pub use driver::{
    Dx12Adapter, Dx12Buffer, Dx12CommandAllocator, Dx12Device, Dx12Driver, Dx12Fence, Dx12SwapChain,
    Dx12Texture,
};
