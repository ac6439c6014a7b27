//! DirectX 12 原生驱动
//!
//! - 实例阶段：`ID3D12Debug` 调试层，DXGI 工厂
//! - 适配器阶段：`EnumAdapterByGpuPreference`（IDXGIFactory6），不可用时退回 `EnumAdapters1`
//! - 设备阶段：直接命令队列，`ID3D12Fence` 作为围栏，InfoQueue 过滤验证消息

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info, warn};
use windows::core::{Interface, HSTRING};
use windows::Win32::Foundation::{CloseHandle, HWND};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::config::{GraphicsBackend, PowerPreference};
use crate::core::error::{NativeError, NativeErrorKind, NativeResult};
use crate::gfx::backend::{
    AdapterCandidate, ArchitectureInfo, DeviceCreateInfo, FeatureLevel, InstanceCreateInfo,
    InstanceProbe, NativeDriver,
};
use crate::gfx::capabilities::DeviceLimits;
use crate::gfx::extensions::ExtensionRequest;
use crate::gfx::validation::{MessageFilter, MessageId};
use crate::renderer::resource::{
    BufferDescriptor, PresentMode, SwapChainDescriptor, TextureDescriptor, TextureDimension,
};

use super::convert::{
    buffer_flags, feature_level_from_d3d, feature_level_to_d3d, format_to_dxgi, heap_for,
    hresult_error, message_id_to_d3d, severity_to_d3d, swap_chain_format, texture_dimension,
    texture_flags, FEATURE_LEVELS,
};

/// 已知无害的 D3D12 调试消息
const BENIGN_MESSAGE_IDS: &[MessageId] = &[
    MessageId(D3D12_MESSAGE_ID_CLEARRENDERTARGETVIEW_MISMATCHINGCLEARVALUE.0),
    MessageId(D3D12_MESSAGE_ID_CLEARDEPTHSTENCILVIEW_MISMATCHINGCLEARVALUE.0),
    MessageId(D3D12_MESSAGE_ID_MAP_INVALID_NULLRANGE.0),
    MessageId(D3D12_MESSAGE_ID_UNMAP_INVALID_NULLRANGE.0),
    MessageId(D3D12_MESSAGE_ID_EXECUTECOMMANDLISTS_WRONGSWAPCHAINBUFFERREFERENCE.0),
    MessageId(D3D12_MESSAGE_ID_RESOURCE_BARRIER_MISMATCHING_COMMAND_LIST_TYPE.0),
    MessageId(D3D12_MESSAGE_ID_EXECUTECOMMANDLISTS_GPU_WRITTEN_READBACK_RESOURCE_MAPPED.0),
];

/// `DXGI_ADAPTER_DESC1::Description` 是以 NUL 结尾的 UTF-16
fn adapter_name(description: &[u16]) -> String {
    let len = description.iter().position(|&c| c == 0).unwrap_or(description.len());
    String::from_utf16_lossy(&description[..len])
}

/// 阻塞等待围栏达到 `value`；每次等待使用独立的事件，多个线程可以同时等待
fn wait_for_value(fence: &ID3D12Fence, value: u64) -> NativeResult<()> {
    unsafe {
        if fence.GetCompletedValue() >= value {
            return Ok(());
        }
        let event = CreateEventA(None, false, false, None).map_err(|e| hresult_error("CreateEventA", e))?;
        let result = fence
            .SetEventOnCompletion(value, event)
            .map_err(|e| hresult_error("ID3D12Fence::SetEventOnCompletion", e));
        if result.is_ok() {
            WaitForSingleObject(event, INFINITE);
        }
        let _ = CloseHandle(event);
        result
    }
}

/// DXGI 适配器
#[derive(Debug, Clone)]
pub struct Dx12Adapter {
    pub adapter: IDXGIAdapter1,
}

/// D3D12 设备及其直接命令队列
///
/// 自带一个空闲围栏，`wait_idle` 不依赖上层的围栏。
pub struct Dx12Device {
    pub device: ID3D12Device,
    pub queue: ID3D12CommandQueue,
    idle_fence: ID3D12Fence,
    idle_value: AtomicU64,
}

// COM 接口本身是线程安全的；需要外部同步的调用由上层的锁保护
unsafe impl Send for Dx12Device {}
unsafe impl Sync for Dx12Device {}

/// 提交资源
#[derive(Debug)]
pub struct Dx12Buffer {
    pub resource: ID3D12Resource,
    pub size: u64,
}

#[derive(Debug)]
pub struct Dx12Texture {
    pub resource: ID3D12Resource,
    pub format: DXGI_FORMAT,
}

/// DXGI 交换链
pub struct Dx12SwapChain {
    pub swap_chain: IDXGISwapChain3,
    pub format: DXGI_FORMAT,
    pub buffer_count: u32,
    pub sync_interval: u32,
}

/// 命令分配器和绑定在它上面的命令列表
#[derive(Debug)]
pub struct Dx12CommandAllocator {
    pub allocator: ID3D12CommandAllocator,
    pub list: ID3D12GraphicsCommandList,
}

#[derive(Debug)]
pub struct Dx12Fence {
    pub fence: ID3D12Fence,
}

/// DirectX 12 驱动
pub struct Dx12Driver {
    factory: Option<IDXGIFactory4>,
    /// 支持按 GPU 偏好枚举的工厂，Windows 10 1803 之前不可用
    factory6: Option<IDXGIFactory6>,
    debug: Option<ID3D12Debug>,
}

unsafe impl Send for Dx12Driver {}
unsafe impl Sync for Dx12Driver {}

impl Dx12Driver {
    pub fn new() -> Self {
        Self {
            factory: None,
            factory6: None,
            debug: None,
        }
    }

    /// 当前系统能否创建 DXGI 工厂
    pub fn probe_support() -> bool {
        unsafe { CreateDXGIFactory2::<IDXGIFactory4>(DXGI_CREATE_FACTORY_FLAGS(0)) }.is_ok()
    }

    fn factory(&self, call: &'static str) -> NativeResult<&IDXGIFactory4> {
        self.factory
            .as_ref()
            .ok_or_else(|| NativeError::unsupported(call))
    }

    /// 适配器支持的最高特性等级；一个都不支持时返回 0.0
    fn max_feature_level(adapter: &IDXGIAdapter1) -> FeatureLevel {
        FEATURE_LEVELS
            .iter()
            .find(|&&level| unsafe {
                D3D12CreateDevice(adapter, level, std::ptr::null_mut::<Option<ID3D12Device>>()).is_ok()
            })
            .map(|&level| feature_level_from_d3d(level))
            .unwrap_or(FeatureLevel::new(0, 0))
    }

    fn create_committed(
        device: &Dx12Device,
        heap_type: D3D12_HEAP_TYPE,
        desc: &D3D12_RESOURCE_DESC,
        state: D3D12_RESOURCE_STATES,
    ) -> NativeResult<ID3D12Resource> {
        let heap = D3D12_HEAP_PROPERTIES {
            Type: heap_type,
            ..Default::default()
        };
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            device
                .device
                .CreateCommittedResource(&heap, D3D12_HEAP_FLAG_NONE, desc, state, None, &mut resource)
        }
        .map_err(|e| hresult_error("ID3D12Device::CreateCommittedResource", e))?;
        resource.ok_or_else(|| NativeError::unsupported("ID3D12Device::CreateCommittedResource"))
    }
}

impl Default for Dx12Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeDriver for Dx12Driver {
    type Adapter = Dx12Adapter;
    type Device = Dx12Device;
    type Buffer = Dx12Buffer;
    type Texture = Dx12Texture;
    type SwapChain = Dx12SwapChain;
    type CommandAllocator = Dx12CommandAllocator;
    type Fence = Dx12Fence;

    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::Dx12
    }

    fn probe_instance(&self) -> InstanceProbe {
        InstanceProbe::default()
    }

    fn extension_request(&self) -> ExtensionRequest {
        ExtensionRequest::none()
    }

    fn enable_validation_layer(&mut self) -> NativeResult<()> {
        let mut debug: Option<ID3D12Debug> = None;
        unsafe { D3D12GetDebugInterface(&mut debug) }.map_err(|e| hresult_error("D3D12GetDebugInterface", e))?;
        let debug = debug.ok_or_else(|| {
            NativeError::new("D3D12GetDebugInterface", 0, NativeErrorKind::InterfaceUnavailable)
        })?;
        unsafe { debug.EnableDebugLayer() };
        self.debug = Some(debug);
        Ok(())
    }

    fn enable_gpu_validation(&mut self, synchronized_queue: bool) -> NativeResult<()> {
        let debug = self.debug.as_ref().ok_or_else(|| {
            NativeError::new("ID3D12Debug1", 0, NativeErrorKind::InterfaceUnavailable)
        })?;
        let debug1: ID3D12Debug1 = debug.cast().map_err(|e| hresult_error("ID3D12Debug1", e))?;
        unsafe {
            debug1.SetEnableGPUBasedValidation(true);
            if synchronized_queue {
                debug1.SetEnableSynchronizedCommandQueueValidation(true);
            }
        }
        Ok(())
    }

    fn benign_message_ids(&self) -> &'static [MessageId] {
        BENIGN_MESSAGE_IDS
    }

    fn create_instance(&mut self, info: &InstanceCreateInfo<'_>) -> NativeResult<()> {
        let flags = if info.validation {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory2(flags) }.map_err(|e| hresult_error("CreateDXGIFactory2", e))?;
        self.factory6 = factory.cast().ok();
        self.factory = Some(factory);

        info!(
            validation = info.validation,
            gpu_preference = self.factory6.is_some(),
            "DXGI factory created"
        );
        Ok(())
    }

    fn supports_preference_enumeration(&self) -> bool {
        self.factory6.is_some()
    }

    fn enumerate_adapter(
        &mut self,
        index: u32,
        preference: Option<PowerPreference>,
    ) -> NativeResult<Option<(Dx12Adapter, AdapterCandidate)>> {
        let (call, result) = match (preference, self.factory6.as_ref()) {
            (Some(preference), Some(factory6)) => {
                let gpu_preference = match preference {
                    PowerPreference::HighPerformance => DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
                    PowerPreference::LowPower => DXGI_GPU_PREFERENCE_MINIMUM_POWER,
                };
                (
                    "IDXGIFactory6::EnumAdapterByGpuPreference",
                    unsafe { factory6.EnumAdapterByGpuPreference::<IDXGIAdapter1>(index, gpu_preference) },
                )
            }
            _ => {
                let call = "IDXGIFactory1::EnumAdapters1";
                (call, unsafe { self.factory(call)?.EnumAdapters1(index) })
            }
        };

        let adapter = match result {
            Ok(adapter) => adapter,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => return Ok(None),
            Err(e) => return Err(hresult_error(call, e)),
        };
        let desc = unsafe { adapter.GetDesc1() }.map_err(|e| hresult_error("IDXGIAdapter1::GetDesc1", e))?;

        let candidate = AdapterCandidate {
            index,
            vendor_id: desc.VendorId,
            device_id: desc.DeviceId,
            name: adapter_name(&desc.Description),
            is_software: desc.Flags & (DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0,
            feature_level: Self::max_feature_level(&adapter),
            device_type: None,
        };
        Ok(Some((Dx12Adapter { adapter }, candidate)))
    }

    fn probe_adapter(&mut self, adapter: &Dx12Adapter, minimum: FeatureLevel) -> bool {
        unsafe {
            D3D12CreateDevice(
                &adapter.adapter,
                feature_level_to_d3d(minimum),
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
    }

    fn release_adapter(&mut self, adapter: Dx12Adapter) {
        drop(adapter);
    }

    /// D3D12 的调试层在实例阶段（`enable_validation_layer`）全局打开，
    /// 设备创建不会因缺少调试层而以 `LayerUnavailable` 失败，`info.validation` 只用于日志。
    fn create_device(&mut self, adapter: &Dx12Adapter, info: &DeviceCreateInfo<'_>) -> NativeResult<Dx12Device> {
        let mut device: Option<ID3D12Device> = None;
        unsafe {
            D3D12CreateDevice(
                &adapter.adapter,
                feature_level_to_d3d(info.minimum_feature_level),
                &mut device,
            )
        }
        .map_err(|e| hresult_error("D3D12CreateDevice", e))?;
        let device = device.ok_or_else(|| NativeError::unsupported("D3D12CreateDevice"))?;

        let queue_desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = unsafe { device.CreateCommandQueue(&queue_desc) }
            .map_err(|e| hresult_error("ID3D12Device::CreateCommandQueue", e))?;
        let idle_fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| hresult_error("ID3D12Device::CreateFence", e))?;

        debug!(validation = info.validation, "D3D12 device created");
        Ok(Dx12Device {
            device,
            queue,
            idle_fence,
            idle_value: AtomicU64::new(0),
        })
    }

    fn set_device_name(&self, device: &Dx12Device, name: &str) -> NativeResult<()> {
        unsafe { device.device.SetName(&HSTRING::from(name)) }
            .map_err(|e| hresult_error("ID3D12Object::SetName", e))
    }

    fn install_message_filter(&self, device: &Dx12Device, filter: &MessageFilter) -> NativeResult<()> {
        let info_queue: ID3D12InfoQueue = device
            .device
            .cast()
            .map_err(|e| hresult_error("ID3D12InfoQueue", e))?;

        let mut severities: Vec<D3D12_MESSAGE_SEVERITY> =
            filter.allow.iter().map(|s| severity_to_d3d(*s)).collect();
        let mut ids: Vec<D3D12_MESSAGE_ID> = filter.deny.iter().map(|id| message_id_to_d3d(*id)).collect();

        let storage_filter = D3D12_INFO_QUEUE_FILTER {
            AllowList: D3D12_INFO_QUEUE_FILTER_DESC {
                NumSeverities: severities.len() as u32,
                pSeverityList: severities.as_mut_ptr(),
                ..Default::default()
            },
            DenyList: D3D12_INFO_QUEUE_FILTER_DESC {
                NumIDs: ids.len() as u32,
                pIDList: ids.as_mut_ptr(),
                ..Default::default()
            },
        };

        unsafe {
            info_queue
                .PushStorageFilter(&storage_filter)
                .map_err(|e| hresult_error("ID3D12InfoQueue::PushStorageFilter", e))?;
            for severity in &filter.break_on {
                info_queue
                    .SetBreakOnSeverity(severity_to_d3d(*severity), true)
                    .map_err(|e| hresult_error("ID3D12InfoQueue::SetBreakOnSeverity", e))?;
            }
        }
        debug!(
            allowed = severities.len(),
            denied = ids.len(),
            "D3D12 info queue filter installed"
        );
        Ok(())
    }

    fn query_architecture(&self, device: &Dx12Device) -> ArchitectureInfo {
        let mut data = D3D12_FEATURE_DATA_ARCHITECTURE::default();
        let result = unsafe {
            device.device.CheckFeatureSupport(
                D3D12_FEATURE_ARCHITECTURE,
                &mut data as *mut _ as *mut c_void,
                std::mem::size_of::<D3D12_FEATURE_DATA_ARCHITECTURE>() as u32,
            )
        };
        match result {
            Ok(()) => ArchitectureInfo {
                uma: Some(data.UMA.as_bool()),
                cache_coherent_uma: Some(data.CacheCoherentUMA.as_bool()),
            },
            Err(e) => {
                warn!(error = %e, "D3D12_FEATURE_ARCHITECTURE query failed");
                ArchitectureInfo::default()
            }
        }
    }

    fn query_limits(&self, _device: &Dx12Device) -> NativeResult<DeviceLimits> {
        Ok(DeviceLimits::D3D12)
    }

    fn wait_idle(&self, device: &Dx12Device) -> NativeResult<()> {
        let value = device.idle_value.fetch_add(1, Ordering::SeqCst) + 1;
        unsafe { device.queue.Signal(&device.idle_fence, value) }
            .map_err(|e| hresult_error("ID3D12CommandQueue::Signal", e))?;
        wait_for_value(&device.idle_fence, value)
    }

    fn destroy_device(&self, device: Dx12Device) {
        if let Err(e) = self.wait_idle(&device) {
            warn!(error = %e, "Failed to drain the queue before device destruction");
        }
        drop(device);
        debug!("D3D12 device destroyed");
    }

    fn create_buffer(&self, device: &Dx12Device, desc: &BufferDescriptor) -> NativeResult<Dx12Buffer> {
        let size = desc
            .aligned_size()
            .ok_or_else(|| NativeError::unsupported("ID3D12Device::CreateCommittedResource"))?;
        let (heap_type, state) = heap_for(desc.memory_type);
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: buffer_flags(desc.usage),
            ..Default::default()
        };
        let resource = Self::create_committed(device, heap_type, &resource_desc, state)?;
        if let Some(label) = desc.label.as_deref() {
            let _ = unsafe { resource.SetName(&HSTRING::from(label)) };
        }
        Ok(Dx12Buffer { resource, size })
    }

    fn destroy_buffer(&self, _device: &Dx12Device, buffer: Dx12Buffer) {
        drop(buffer);
    }

    fn create_texture(&self, device: &Dx12Device, desc: &TextureDescriptor) -> NativeResult<Dx12Texture> {
        let format = format_to_dxgi(desc.format);
        let height = match desc.dimension {
            TextureDimension::D1 => 1,
            _ => desc.height,
        };
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: texture_dimension(desc.dimension),
            Width: desc.width as u64,
            Height: height,
            DepthOrArraySize: desc.depth_or_array_layers as u16,
            MipLevels: desc.mip_levels as u16,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: texture_flags(desc.usage),
            ..Default::default()
        };
        let resource = Self::create_committed(device, D3D12_HEAP_TYPE_DEFAULT, &resource_desc, D3D12_RESOURCE_STATE_COMMON)?;
        if let Some(label) = desc.label.as_deref() {
            let _ = unsafe { resource.SetName(&HSTRING::from(label)) };
        }
        Ok(Dx12Texture { resource, format })
    }

    fn destroy_texture(&self, _device: &Dx12Device, texture: Dx12Texture) {
        drop(texture);
    }

    fn create_swap_chain(&self, device: &Dx12Device, desc: &SwapChainDescriptor) -> NativeResult<Dx12SwapChain> {
        let hwnd = match desc.target.window {
            RawWindowHandle::Win32(handle) => HWND(handle.hwnd.get() as *mut c_void),
            _ => return Err(NativeError::unsupported("IDXGIFactory2::CreateSwapChainForHwnd")),
        };
        let factory = self.factory("IDXGIFactory2::CreateSwapChainForHwnd")?;
        let format = swap_chain_format(desc.format);

        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                ..Default::default()
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };
        let swap_chain: IDXGISwapChain1 = unsafe {
            factory.CreateSwapChainForHwnd(&device.queue, hwnd, &swap_chain_desc, None, None)
        }
        .map_err(|e| hresult_error("IDXGIFactory2::CreateSwapChainForHwnd", e))?;
        let swap_chain: IDXGISwapChain3 = swap_chain
            .cast()
            .map_err(|e| hresult_error("IDXGISwapChain3", e))?;

        debug!(
            width = desc.width,
            height = desc.height,
            buffers = desc.buffer_count,
            "DXGI swap chain created"
        );
        Ok(Dx12SwapChain {
            swap_chain,
            format,
            buffer_count: desc.buffer_count,
            sync_interval: match desc.present_mode {
                PresentMode::Fifo => 1,
                PresentMode::Immediate | PresentMode::Mailbox => 0,
            },
        })
    }

    fn resize_swap_chain(
        &self,
        _device: &Dx12Device,
        swap_chain: &mut Dx12SwapChain,
        width: u32,
        height: u32,
    ) -> NativeResult<()> {
        unsafe {
            swap_chain.swap_chain.ResizeBuffers(
                swap_chain.buffer_count,
                width,
                height,
                swap_chain.format,
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .map_err(|e| hresult_error("IDXGISwapChain::ResizeBuffers", e))
    }

    fn destroy_swap_chain(&self, _device: &Dx12Device, swap_chain: Dx12SwapChain) {
        drop(swap_chain);
    }

    fn create_command_allocator(&self, device: &Dx12Device) -> NativeResult<Dx12CommandAllocator> {
        unsafe {
            let allocator: ID3D12CommandAllocator = device
                .device
                .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
                .map_err(|e| hresult_error("ID3D12Device::CreateCommandAllocator", e))?;
            let list: ID3D12GraphicsCommandList = device
                .device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None)
                .map_err(|e| hresult_error("ID3D12Device::CreateCommandList", e))?;
            // 命令列表创建后处于录制状态，先关闭，begin 时再 Reset
            list.Close()
                .map_err(|e| hresult_error("ID3D12GraphicsCommandList::Close", e))?;
            Ok(Dx12CommandAllocator { allocator, list })
        }
    }

    fn begin_commands(&self, _device: &Dx12Device, allocator: &mut Dx12CommandAllocator) -> NativeResult<()> {
        unsafe { allocator.list.Reset(&allocator.allocator, None) }
            .map_err(|e| hresult_error("ID3D12GraphicsCommandList::Reset", e))
    }

    fn end_commands(&self, _device: &Dx12Device, allocator: &mut Dx12CommandAllocator) -> NativeResult<()> {
        unsafe { allocator.list.Close() }.map_err(|e| hresult_error("ID3D12GraphicsCommandList::Close", e))
    }

    fn reset_command_allocator(
        &self,
        _device: &Dx12Device,
        allocator: &mut Dx12CommandAllocator,
    ) -> NativeResult<()> {
        unsafe { allocator.allocator.Reset() }.map_err(|e| hresult_error("ID3D12CommandAllocator::Reset", e))
    }

    fn destroy_command_allocator(&self, _device: &Dx12Device, allocator: Dx12CommandAllocator) {
        drop(allocator);
    }

    fn create_fence(&self, device: &Dx12Device, initial_value: u64) -> NativeResult<Dx12Fence> {
        let fence: ID3D12Fence = unsafe { device.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| hresult_error("ID3D12Device::CreateFence", e))?;
        Ok(Dx12Fence { fence })
    }

    fn submit(
        &self,
        device: &Dx12Device,
        allocators: &[&Dx12CommandAllocator],
        fence: &Dx12Fence,
        signal_value: u64,
    ) -> NativeResult<()> {
        let lists = allocators
            .iter()
            .map(|a| a.list.cast::<ID3D12CommandList>().map(Some))
            .collect::<windows::core::Result<Vec<_>>>()
            .map_err(|e| hresult_error("ID3D12CommandList", e))?;

        unsafe {
            if !lists.is_empty() {
                device.queue.ExecuteCommandLists(&lists);
            }
            device
                .queue
                .Signal(&fence.fence, signal_value)
                .map_err(|e| hresult_error("ID3D12CommandQueue::Signal", e))
        }
    }

    fn fence_completed_value(&self, device: &Dx12Device, fence: &Dx12Fence) -> NativeResult<u64> {
        let value = unsafe { fence.fence.GetCompletedValue() };
        // 设备移除后 GetCompletedValue 返回 u64::MAX
        if value == u64::MAX {
            if let Err(e) = unsafe { device.device.GetDeviceRemovedReason() } {
                return Err(hresult_error("ID3D12Device::GetDeviceRemovedReason", e));
            }
        }
        Ok(value)
    }

    fn wait_fence(&self, _device: &Dx12Device, fence: &Dx12Fence, value: u64) -> NativeResult<()> {
        wait_for_value(&fence.fence, value)
    }

    fn destroy_fence(&self, _device: &Dx12Device, fence: Dx12Fence) {
        drop(fence);
    }
}
