//! 资源描述与资源对象
//!
//! 描述符是纯数据，可以在设备之外构造和校验；
//! [`Buffer`]、[`Texture`]、[`SwapChain`] 持有原生句柄和设备的共享引用，
//! 离开作用域时释放原生句柄。设备本身在最后一个引用消失后才会被销毁。

use std::mem::ManuallyDrop;
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use serde::{Deserialize, Serialize};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::NativeDriver;
use crate::gfx::capabilities::DeviceLimits;
use crate::gfx::device::DeviceShared;

/// 常量缓冲区对齐（D3D12 要求 256 字节）
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 缓冲区使用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// 常量缓冲区（Uniform Buffer）
    Constant,
    Storage,
    /// 上传缓冲区（CPU -> GPU）
    Upload,
    /// 读回缓冲区（GPU -> CPU）
    ReadBack,
}

/// 缓冲区内存类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// GPU本地内存（最快，仅GPU可访问）
    DeviceLocal,
    /// CPU可见内存（CPU和GPU都可访问）
    HostVisible,
    /// GPU -> CPU 读回
    HostCached,
}

/// 缓冲区描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// 缓冲区大小（字节）
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_type: MemoryType,
    /// 调试名称（可选）
    pub label: Option<String>,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage, memory_type: MemoryType) -> Self {
        Self {
            size,
            usage,
            memory_type,
            label: None,
        }
    }

    /// 设置调试名称
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// 计算对齐后的大小（常量缓冲区对齐到 256 字节），对齐后超出 `u64` 时返回 `None`
    pub fn aligned_size(&self) -> Option<u64> {
        if self.usage == BufferUsage::Constant {
            self.size
                .checked_add(CONSTANT_BUFFER_ALIGNMENT - 1)
                .map(|size| size & !(CONSTANT_BUFFER_ALIGNMENT - 1))
        } else {
            Some(self.size)
        }
    }

    /// 校验描述，返回实际需要分配的大小
    pub fn validate(&self) -> Result<u64> {
        if self.size == 0 {
            return Err(GraphicsError::ResourceCreation(
                "Buffer size must be greater than 0".to_string(),
            )
            .into());
        }
        self.aligned_size().ok_or_else(|| {
            GraphicsError::ResourceCreation(format!(
                "Buffer size {} overflows when aligned to {} bytes",
                self.size, CONSTANT_BUFFER_ALIGNMENT
            ))
            .into()
        })
    }
}

/// 纹理格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    /// RGBA 8位无符号归一化
    Rgba8Unorm,
    /// RGBA 8位sRGB
    Rgba8Srgb,
    /// BGRA 8位无符号归一化
    Bgra8Unorm,
    /// BGRA 8位sRGB
    Bgra8Srgb,
    /// RGBA 16位浮点
    Rgba16Float,
    /// R 32位浮点
    R32Float,
    /// RGBA 32位浮点
    Rgba32Float,
    /// 深度 24位 + 模板 8位
    Depth24PlusStencil8,
    /// 深度 32位浮点
    Depth32Float,
}

impl TextureFormat {
    /// 每个像素的字节数
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8Srgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8Srgb
            | TextureFormat::R32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth32Float
        )
    }
}

/// 纹理维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    /// 立方体贴图（数组层数为 6 的倍数）
    Cube,
}

/// 纹理用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// 着色器采样
    Sampled,
    RenderTarget,
    DepthStencil,
    /// 无序访问 / 存储图像
    Storage,
}

/// 纹理描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    /// 深度（3D纹理）或数组层数
    pub depth_or_array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub usage: TextureUsage,
    pub label: Option<String>,
}

impl TextureDescriptor {
    /// 单层、单 mip 的 2D 纹理
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
            mip_levels: 1,
            format,
            dimension: TextureDimension::D2,
            usage,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// 完整 mip 链的层数
    pub fn max_mip_levels(&self) -> u32 {
        let extent = match self.dimension {
            TextureDimension::D3 => self.width.max(self.height).max(self.depth_or_array_layers),
            _ => self.width.max(self.height),
        };
        32 - extent.max(1).leading_zeros()
    }

    /// 在调用原生接口之前按设备限制校验
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        let fail = |reason: String| -> Result<()> {
            Err(GraphicsError::ResourceCreation(reason).into())
        };

        if self.width == 0 || self.height == 0 || self.depth_or_array_layers == 0 {
            return fail("Texture extent must be greater than 0".to_string());
        }
        if self.mip_levels == 0 || self.mip_levels > self.max_mip_levels() {
            return fail(format!(
                "Mip level count {} is outside 1..={}",
                self.mip_levels,
                self.max_mip_levels()
            ));
        }
        if self.usage == TextureUsage::DepthStencil && !self.format.is_depth_stencil() {
            return fail(format!("{:?} is not a depth-stencil format", self.format));
        }

        match self.dimension {
            TextureDimension::D1 => {
                if self.height != 1 {
                    return fail("1D textures must have a height of 1".to_string());
                }
                if self.width > limits.max_texture_dimension_1d {
                    return fail(format!(
                        "Width {} exceeds the 1D limit {}",
                        self.width, limits.max_texture_dimension_1d
                    ));
                }
                if self.depth_or_array_layers > limits.max_texture_array_layers {
                    return fail(format!(
                        "{} array layers exceed the limit {}",
                        self.depth_or_array_layers, limits.max_texture_array_layers
                    ));
                }
            }
            TextureDimension::D2 => {
                let max = limits.max_texture_dimension_2d;
                if self.width > max || self.height > max {
                    return fail(format!(
                        "{}x{} exceeds the 2D limit {}",
                        self.width, self.height, max
                    ));
                }
                if self.depth_or_array_layers > limits.max_texture_array_layers {
                    return fail(format!(
                        "{} array layers exceed the limit {}",
                        self.depth_or_array_layers, limits.max_texture_array_layers
                    ));
                }
            }
            TextureDimension::D3 => {
                let max = limits.max_texture_dimension_3d;
                if self.width > max || self.height > max || self.depth_or_array_layers > max {
                    return fail(format!(
                        "{}x{}x{} exceeds the 3D limit {}",
                        self.width, self.height, self.depth_or_array_layers, max
                    ));
                }
            }
            TextureDimension::Cube => {
                if self.width != self.height {
                    return fail("Cube faces must be square".to_string());
                }
                if self.depth_or_array_layers % 6 != 0 {
                    return fail("Cube textures need a multiple of 6 layers".to_string());
                }
                if self.width > limits.max_texture_dimension_cube {
                    return fail(format!(
                        "Face size {} exceeds the cube limit {}",
                        self.width, limits.max_texture_dimension_cube
                    ));
                }
                if self.depth_or_array_layers > limits.max_texture_array_layers {
                    return fail(format!(
                        "{} array layers exceed the limit {}",
                        self.depth_or_array_layers, limits.max_texture_array_layers
                    ));
                }
            }
        }

        Ok(())
    }
}

/// 呈现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentMode {
    /// 垂直同步
    Fifo,
    /// 不等待垂直同步
    Immediate,
    Mailbox,
}

impl PresentMode {
    pub fn from_vsync(vsync: bool) -> Self {
        if vsync {
            PresentMode::Fifo
        } else {
            PresentMode::Immediate
        }
    }
}

/// 交换链的呈现目标（原生窗口 / 显示句柄）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTarget {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

impl SurfaceTarget {
    /// 从窗口对象获取原生句柄
    ///
    /// 返回的句柄只在窗口存活期间有效。
    pub fn from_window<W>(window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let window_handle = window.window_handle().map_err(|e| {
            GraphicsError::SwapchainError(format!("Failed to get window handle: {}", e))
        })?;
        let display_handle = window.display_handle().map_err(|e| {
            GraphicsError::SwapchainError(format!("Failed to get display handle: {}", e))
        })?;

        Ok(Self {
            display: display_handle.as_raw(),
            window: window_handle.as_raw(),
        })
    }
}

/// 交换链描述信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub buffer_count: u32,
    pub present_mode: PresentMode,
    pub target: SurfaceTarget,
}

impl SwapChainDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GraphicsError::SwapchainError(
                "Swapchain dimensions must be greater than 0".to_string(),
            )
            .into());
        }
        if !(2..=16).contains(&self.buffer_count) {
            return Err(GraphicsError::SwapchainError(format!(
                "Buffer count {} is outside 2..=16",
                self.buffer_count
            ))
            .into());
        }
        if self.format.is_depth_stencil() {
            return Err(GraphicsError::SwapchainError(format!(
                "{:?} cannot be presented",
                self.format
            ))
            .into());
        }
        Ok(())
    }
}

/// GPU 缓冲区
pub struct Buffer<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    raw: ManuallyDrop<D::Buffer>,
    desc: BufferDescriptor,
    size: u64,
}

impl<D: NativeDriver> Buffer<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>, raw: D::Buffer, desc: BufferDescriptor, size: u64) -> Self {
        Self {
            device,
            raw: ManuallyDrop::new(raw),
            desc,
            size,
        }
    }

    /// 实际分配的大小（已对齐）
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn memory_type(&self) -> MemoryType {
        self.desc.memory_type
    }

    pub fn label(&self) -> Option<&str> {
        self.desc.label.as_deref()
    }

    pub fn raw(&self) -> &D::Buffer {
        &self.raw
    }
}

impl<D: NativeDriver> Drop for Buffer<D> {
    fn drop(&mut self) {
        // SAFETY: raw 只在这里取出一次
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.device.driver().destroy_buffer(self.device.raw(), raw);
    }
}

/// GPU 纹理
pub struct Texture<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    raw: ManuallyDrop<D::Texture>,
    desc: TextureDescriptor,
}

impl<D: NativeDriver> Texture<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>, raw: D::Texture, desc: TextureDescriptor) -> Self {
        Self {
            device,
            raw: ManuallyDrop::new(raw),
            desc,
        }
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn raw(&self) -> &D::Texture {
        &self.raw
    }
}

impl<D: NativeDriver> Drop for Texture<D> {
    fn drop(&mut self) {
        // SAFETY: raw 只在这里取出一次
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.device.driver().destroy_texture(self.device.raw(), raw);
    }
}

/// 交换链
///
/// 只负责创建和调整尺寸；呈现由上层渲染器完成。
pub struct SwapChain<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    raw: ManuallyDrop<D::SwapChain>,
    width: u32,
    height: u32,
    format: TextureFormat,
    buffer_count: u32,
    present_mode: PresentMode,
}

impl<D: NativeDriver> SwapChain<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>, raw: D::SwapChain, desc: &SwapChainDescriptor) -> Self {
        Self {
            device,
            raw: ManuallyDrop::new(raw),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            buffer_count: desc.buffer_count,
            present_mode: desc.present_mode,
        }
    }

    /// 调整交换链尺寸
    ///
    /// 尺寸为 0（窗口最小化）或没有变化时什么都不做。
    /// 调整之前会等待设备空闲。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return Ok(());
        }
        self.device.ensure_alive()?;

        self.device.wait_idle()?;
        self.device
            .driver()
            .resize_swap_chain(self.device.raw(), &mut *self.raw, width, height)
            .map_err(|e| GraphicsError::SwapchainError(e.to_string()))?;

        tracing::debug!(width, height, "Swapchain resized");
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    pub fn raw(&self) -> &D::SwapChain {
        &self.raw
    }
}

impl<D: NativeDriver> Drop for SwapChain<D> {
    fn drop(&mut self) {
        // SAFETY: raw 只在这里取出一次
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.device.driver().destroy_swap_chain(self.device.raw(), raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor_alignment() {
        let desc = BufferDescriptor::new(100, BufferUsage::Constant, MemoryType::HostVisible);
        assert_eq!(desc.aligned_size(), Some(256));

        let desc2 = BufferDescriptor::new(300, BufferUsage::Constant, MemoryType::HostVisible);
        assert_eq!(desc2.aligned_size(), Some(512));

        let desc3 = BufferDescriptor::new(100, BufferUsage::Vertex, MemoryType::DeviceLocal);
        assert_eq!(desc3.aligned_size(), Some(100)); // 顶点缓冲区不需要对齐
    }

    #[test]
    fn test_constant_buffer_alignment_overflow_rejected() {
        let desc = BufferDescriptor::new(u64::MAX - 10, BufferUsage::Constant, MemoryType::HostVisible);
        assert_eq!(desc.aligned_size(), None);
        assert!(desc.validate().is_err());

        // 不需要对齐的用途不受影响
        let desc = BufferDescriptor::new(u64::MAX - 10, BufferUsage::Storage, MemoryType::DeviceLocal);
        assert_eq!(desc.validate().unwrap(), u64::MAX - 10);
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let desc = BufferDescriptor::new(0, BufferUsage::Storage, MemoryType::DeviceLocal);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_texture_within_limits() {
        let desc = TextureDescriptor::new_2d(1920, 1080, TextureFormat::Rgba8Unorm, TextureUsage::Sampled)
            .with_mip_levels(11);
        assert!(desc.validate(&DeviceLimits::D3D12).is_ok());
        assert_eq!(desc.max_mip_levels(), 11);
    }

    #[test]
    fn test_texture_exceeding_limits() {
        let too_wide = TextureDescriptor::new_2d(32768, 16, TextureFormat::Rgba8Unorm, TextureUsage::Sampled);
        assert!(too_wide.validate(&DeviceLimits::D3D12).is_err());

        let too_many_mips = TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::Sampled)
            .with_mip_levels(6);
        assert!(too_many_mips.validate(&DeviceLimits::D3D12).is_err());

        let mut volume = TextureDescriptor::new_2d(256, 256, TextureFormat::R32Float, TextureUsage::Storage);
        volume.dimension = TextureDimension::D3;
        volume.depth_or_array_layers = 4096;
        assert!(volume.validate(&DeviceLimits::D3D12).is_err());
    }

    #[test]
    fn test_cube_texture_rules() {
        let mut cube = TextureDescriptor::new_2d(512, 512, TextureFormat::Rgba16Float, TextureUsage::Sampled);
        cube.dimension = TextureDimension::Cube;
        cube.depth_or_array_layers = 6;
        assert!(cube.validate(&DeviceLimits::D3D12).is_ok());

        cube.depth_or_array_layers = 5;
        assert!(cube.validate(&DeviceLimits::D3D12).is_err());

        cube.depth_or_array_layers = 6;
        cube.height = 256;
        assert!(cube.validate(&DeviceLimits::D3D12).is_err());
    }

    #[test]
    fn test_depth_usage_requires_depth_format() {
        let desc = TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::DepthStencil);
        assert!(desc.validate(&DeviceLimits::D3D12).is_err());

        let desc = TextureDescriptor::new_2d(64, 64, TextureFormat::Depth32Float, TextureUsage::DepthStencil);
        assert!(desc.validate(&DeviceLimits::D3D12).is_ok());
    }

    #[test]
    fn test_present_mode_from_vsync() {
        assert_eq!(PresentMode::from_vsync(true), PresentMode::Fifo);
        assert_eq!(PresentMode::from_vsync(false), PresentMode::Immediate);
    }
}
