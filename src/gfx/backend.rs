//! 原生图形驱动的统一抽象接口
//!
//! 每个后端（Vulkan、DirectX 12）提供一个 [`NativeDriver`] 实现，
//! 把"原生句柄 + 有序函数表"包装成一组 trait 方法。
//! 适配器选择、验证层配置、设备创建等流程只针对这个 trait 编写一次。
//!
//! # 调用阶段
//!
//! 1. **实例阶段**：探测扩展/层，启用验证层，创建实例（`&mut self`）
//! 2. **适配器阶段**：枚举、探测、释放适配器（`&mut self`）
//! 3. **设备阶段**：设备创建之后的所有调用（`&self`），驱动此时已被设备独占持有，
//!    需要外部同步的调用由上层的锁保护

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::{GraphicsBackend, PowerPreference};
use crate::core::error::NativeResult;
use crate::gfx::capabilities::DeviceLimits;
use crate::gfx::extensions::ExtensionRequest;
use crate::gfx::validation::{MessageFilter, MessageId};
use crate::renderer::resource::{BufferDescriptor, SwapChainDescriptor, TextureDescriptor};

/// 特性等级
///
/// D3D 下对应 `D3D_FEATURE_LEVEL`（如 12.0），Vulkan 下对应 API 版本（如 1.2）。
/// 先比较主版本号，再比较次版本号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureLevel {
    pub major: u32,
    pub minor: u32,
}

impl FeatureLevel {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for FeatureLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (major, minor) = value
            .split_once('.')
            .unwrap_or((value.as_str(), "0"));
        let major = major
            .trim()
            .parse()
            .map_err(|_| format!("invalid feature level '{}'", value))?;
        let minor = minor
            .trim()
            .parse()
            .map_err(|_| format!("invalid feature level '{}'", value))?;
        Ok(Self { major, minor })
    }
}

impl From<FeatureLevel> for String {
    fn from(level: FeatureLevel) -> Self {
        level.to_string()
    }
}

/// 适配器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    /// 独立显卡
    Discrete,
    /// 集成显卡（与 CPU 共享内存）
    Integrated,
    /// 软件光栅化（WARP、llvmpipe 等）
    Software,
}

/// 枚举得到的一个物理适配器
///
/// 只在选择过程中短暂存在：被选中或被拒绝后即丢弃。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCandidate {
    /// 在驱动枚举顺序中的位置
    pub index: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub name: String,
    /// 是否为软件适配器
    pub is_software: bool,
    /// 驱动报告的特性等级 / API 版本
    pub feature_level: FeatureLevel,
    /// 驱动直接给出的设备类型（Vulkan 的 `VkPhysicalDeviceType`），没有则为 `None`
    pub device_type: Option<AdapterType>,
}

/// 架构查询结果
///
/// 只有在活动设备上才能查询（D3D12 的 `D3D12_FEATURE_ARCHITECTURE`）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchitectureInfo {
    /// 统一内存架构
    pub uma: Option<bool>,
    /// 缓存一致的统一内存架构
    pub cache_coherent_uma: Option<bool>,
}

/// 实例阶段的探测结果
#[derive(Debug, Clone, Default)]
pub struct InstanceProbe {
    /// 驱动报告的实例扩展
    pub extensions: Vec<String>,
    /// 驱动报告的实例层
    pub layers: Vec<String>,
}

/// 实例创建参数
#[derive(Debug, Clone, Copy)]
pub struct InstanceCreateInfo<'a> {
    /// 解析后的扩展列表（已排好序）
    pub extensions: &'a [String],
    /// 是否启用验证层
    pub validation: bool,
    /// 是否启用 GPU 辅助验证
    pub gpu_validation: bool,
}

/// 逻辑设备创建参数
#[derive(Debug, Clone, Copy)]
pub struct DeviceCreateInfo<'a> {
    pub minimum_feature_level: FeatureLevel,
    /// 是否以验证模式创建设备
    pub validation: bool,
    pub label: &'a str,
}

/// 原生驱动接口
///
/// 关联类型是各后端的原生句柄。句柄的释放总是通过对应的 `release_*` /
/// `destroy_*` 方法显式完成，上层保证每个句柄恰好释放一次。
pub trait NativeDriver {
    type Adapter;
    type Device;
    type Buffer;
    type Texture;
    type SwapChain;
    type CommandAllocator;
    type Fence;

    /// 驱动对应的后端
    fn backend(&self) -> GraphicsBackend;

    // ---------------------------------------------------------------
    // 实例阶段
    // ---------------------------------------------------------------

    /// 查询可用的实例扩展和层。查询失败时返回空列表。
    fn probe_instance(&self) -> InstanceProbe;

    /// 本后端希望请求的扩展
    fn extension_request(&self) -> ExtensionRequest;

    /// 启用调试 / 验证层
    fn enable_validation_layer(&mut self) -> NativeResult<()>;

    /// 启用 GPU 辅助验证，可选同时开启同步队列验证
    fn enable_gpu_validation(&mut self, synchronized_queue: bool) -> NativeResult<()>;

    /// 已知无害、需要在驱动层过滤掉的消息 ID
    fn benign_message_ids(&self) -> &'static [MessageId];

    /// 创建实例（DXGI 工厂 / VkInstance）
    fn create_instance(&mut self, info: &InstanceCreateInfo<'_>) -> NativeResult<()>;

    // ---------------------------------------------------------------
    // 适配器阶段
    // ---------------------------------------------------------------

    /// 驱动是否支持按电源偏好排序枚举
    fn supports_preference_enumeration(&self) -> bool;

    /// 打开第 `index` 个适配器；`Ok(None)` 表示没有更多适配器
    fn enumerate_adapter(
        &mut self,
        index: u32,
        preference: Option<PowerPreference>,
    ) -> NativeResult<Option<(Self::Adapter, AdapterCandidate)>>;

    /// 不创建设备，只判断适配器能否以 `minimum` 特性等级创建设备
    fn probe_adapter(&mut self, adapter: &Self::Adapter, minimum: FeatureLevel) -> bool;

    /// 释放适配器句柄
    fn release_adapter(&mut self, adapter: Self::Adapter);

    // ---------------------------------------------------------------
    // 设备阶段
    // ---------------------------------------------------------------

    fn create_device(
        &mut self,
        adapter: &Self::Adapter,
        info: &DeviceCreateInfo<'_>,
    ) -> NativeResult<Self::Device>;

    /// 设置设备调试名称
    fn set_device_name(&self, device: &Self::Device, name: &str) -> NativeResult<()>;

    /// 在驱动层安装消息过滤器和按严重级别中断
    fn install_message_filter(&self, device: &Self::Device, filter: &MessageFilter) -> NativeResult<()>;

    fn query_architecture(&self, device: &Self::Device) -> ArchitectureInfo;

    fn query_limits(&self, device: &Self::Device) -> NativeResult<DeviceLimits>;

    /// 等待设备上所有工作完成
    fn wait_idle(&self, device: &Self::Device) -> NativeResult<()>;

    fn destroy_device(&self, device: Self::Device);

    // ---------------------------------------------------------------
    // 资源
    // ---------------------------------------------------------------

    fn create_buffer(&self, device: &Self::Device, desc: &BufferDescriptor) -> NativeResult<Self::Buffer>;

    fn destroy_buffer(&self, device: &Self::Device, buffer: Self::Buffer);

    fn create_texture(&self, device: &Self::Device, desc: &TextureDescriptor) -> NativeResult<Self::Texture>;

    fn destroy_texture(&self, device: &Self::Device, texture: Self::Texture);

    fn create_swap_chain(
        &self,
        device: &Self::Device,
        desc: &SwapChainDescriptor,
    ) -> NativeResult<Self::SwapChain>;

    /// 调整交换链尺寸。调用前设备必须空闲。
    fn resize_swap_chain(
        &self,
        device: &Self::Device,
        swap_chain: &mut Self::SwapChain,
        width: u32,
        height: u32,
    ) -> NativeResult<()>;

    fn destroy_swap_chain(&self, device: &Self::Device, swap_chain: Self::SwapChain);

    // ---------------------------------------------------------------
    // 命令与同步
    // ---------------------------------------------------------------

    /// 创建命令分配器（DX12 CommandAllocator + CommandList / Vulkan CommandPool + CommandBuffer）
    fn create_command_allocator(&self, device: &Self::Device) -> NativeResult<Self::CommandAllocator>;

    fn begin_commands(&self, device: &Self::Device, allocator: &mut Self::CommandAllocator) -> NativeResult<()>;

    fn end_commands(&self, device: &Self::Device, allocator: &mut Self::CommandAllocator) -> NativeResult<()>;

    /// 重置命令分配器。调用前其中的命令必须已经执行完毕。
    fn reset_command_allocator(
        &self,
        device: &Self::Device,
        allocator: &mut Self::CommandAllocator,
    ) -> NativeResult<()>;

    fn destroy_command_allocator(&self, device: &Self::Device, allocator: Self::CommandAllocator);

    fn create_fence(&self, device: &Self::Device, initial_value: u64) -> NativeResult<Self::Fence>;

    /// 提交命令，并在执行完成后把 `fence` 设为 `signal_value`
    fn submit(
        &self,
        device: &Self::Device,
        allocators: &[&Self::CommandAllocator],
        fence: &Self::Fence,
        signal_value: u64,
    ) -> NativeResult<()>;

    fn fence_completed_value(&self, device: &Self::Device, fence: &Self::Fence) -> NativeResult<u64>;

    /// 阻塞等待 `fence` 达到 `value`，没有超时
    fn wait_fence(&self, device: &Self::Device, fence: &Self::Fence, value: u64) -> NativeResult<()>;

    fn destroy_fence(&self, device: &Self::Device, fence: Self::Fence);
}
