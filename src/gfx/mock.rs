//! 测试用的脚本化驱动
//!
//! 在内存中模拟适配器列表和各类失败，记录每一次原生调用，
//! 供测试检查调用次数以及创建 / 释放是否成对。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::config::{GraphicsBackend, PowerPreference};
use crate::core::error::{NativeError, NativeErrorKind, NativeResult};
use crate::gfx::backend::{
    AdapterCandidate, AdapterType, ArchitectureInfo, DeviceCreateInfo, FeatureLevel,
    InstanceCreateInfo, InstanceProbe, NativeDriver,
};
use crate::gfx::capabilities::DeviceLimits;
use crate::gfx::extensions::ExtensionRequest;
use crate::gfx::validation::{MessageFilter, MessageId};
use crate::renderer::resource::{BufferDescriptor, SwapChainDescriptor, TextureDescriptor};

/// 被记录的原生调用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    ProbeInstance,
    EnableValidationLayer,
    EnableGpuValidation,
    CreateInstance,
    EnumerateAdapter,
    ProbeAdapter,
    ReleaseAdapter,
    CreateDevice,
    SetDeviceName,
    InstallMessageFilter,
    QueryArchitecture,
    QueryLimits,
    WaitIdle,
    DestroyDevice,
    CreateBuffer,
    DestroyBuffer,
    CreateTexture,
    DestroyTexture,
    CreateSwapChain,
    ResizeSwapChain,
    DestroySwapChain,
    CreateCommandAllocator,
    BeginCommands,
    EndCommands,
    ResetCommandAllocator,
    DestroyCommandAllocator,
    CreateFence,
    Submit,
    WaitFence,
    DestroyFence,
}

/// 调用记录，可以在驱动被设备持有之后继续查看
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<MockCall>>,
    preferences: Mutex<Vec<Option<PowerPreference>>>,
    instance_validation: Mutex<Vec<bool>>,
    instance_extensions: Mutex<Vec<Vec<String>>>,
    device_validation: Mutex<Vec<bool>>,
    device_names: Mutex<Vec<String>>,
    filters: Mutex<Vec<MessageFilter>>,
    released_adapters: Mutex<Vec<u32>>,
    device_adapter: Mutex<Option<u32>>,
    open_adapters: AtomicI64,
    open_devices: AtomicI64,
}

impl CallLog {
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: MockCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    /// 每次枚举时传给驱动的电源偏好
    pub fn preferences(&self) -> Vec<Option<PowerPreference>> {
        self.preferences.lock().unwrap().clone()
    }

    /// 每次创建实例时是否启用了验证
    pub fn instance_validation(&self) -> Vec<bool> {
        self.instance_validation.lock().unwrap().clone()
    }

    pub fn instance_extensions(&self) -> Vec<Vec<String>> {
        self.instance_extensions.lock().unwrap().clone()
    }

    /// 每次创建设备时是否启用了验证
    pub fn device_validation(&self) -> Vec<bool> {
        self.device_validation.lock().unwrap().clone()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.device_names.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<MessageFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub fn released_adapters(&self) -> Vec<u32> {
        self.released_adapters.lock().unwrap().clone()
    }

    /// 设备创建在哪个适配器上
    pub fn device_adapter(&self) -> Option<u32> {
        *self.device_adapter.lock().unwrap()
    }

    /// 尚未释放的适配器句柄数量
    pub fn open_adapters(&self) -> i64 {
        self.open_adapters.load(Ordering::SeqCst)
    }

    /// 尚未销毁的设备数量
    pub fn open_devices(&self) -> i64 {
        self.open_devices.load(Ordering::SeqCst)
    }
}

/// 脚本中的一个适配器
#[derive(Debug, Clone)]
pub struct MockAdapter {
    pub name: String,
    pub is_software: bool,
    pub feature_level: FeatureLevel,
    pub device_type: Option<AdapterType>,
    pub probe_ok: bool,
}

impl MockAdapter {
    pub fn discrete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_software: false,
            feature_level: FeatureLevel::new(1, 3),
            device_type: Some(AdapterType::Discrete),
            probe_ok: true,
        }
    }

    pub fn integrated(name: &str) -> Self {
        Self {
            device_type: Some(AdapterType::Integrated),
            ..Self::discrete(name)
        }
    }

    pub fn software(name: &str) -> Self {
        Self {
            is_software: true,
            device_type: Some(AdapterType::Software),
            ..Self::discrete(name)
        }
    }

    pub fn with_level(mut self, level: FeatureLevel) -> Self {
        self.feature_level = level;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.probe_ok = false;
        self
    }
}

#[derive(Debug)]
pub struct MockAdapterHandle {
    pub index: u32,
}

#[derive(Debug)]
pub struct MockDevice {
    pub adapter_index: u32,
}

#[derive(Debug)]
pub struct MockBuffer {
    pub size: u64,
}

#[derive(Debug)]
pub struct MockTexture {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct MockSwapChain {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct MockAllocator {
    pub id: u32,
    pub recording: bool,
}

#[derive(Debug)]
pub struct MockFence {
    completed: AtomicU64,
    pending: AtomicU64,
}

/// 脚本化驱动
pub struct MockDriver {
    log: Arc<CallLog>,
    backend: GraphicsBackend,
    adapters: Vec<MockAdapter>,
    extensions: Vec<String>,
    request: ExtensionRequest,
    benign: &'static [MessageId],
    debug_layer: bool,
    gpu_validation: bool,
    preference_enumeration: bool,
    instance_failures: VecDeque<NativeErrorKind>,
    device_failures: VecDeque<NativeErrorKind>,
    limits: DeviceLimits,
    architecture: ArchitectureInfo,
    fail_limits: bool,
    fail_buffers: bool,
    fail_end_commands: bool,
    deferred_completion: bool,
    next_allocator: AtomicU32,
}

const MOCK_BENIGN: [MessageId; 2] = [MessageId(820), MessageId(821)];

impl MockDriver {
    /// 一个独立显卡、验证层可用的驱动
    pub fn new() -> Self {
        Self {
            log: Arc::new(CallLog::default()),
            backend: GraphicsBackend::Vulkan,
            adapters: vec![MockAdapter::discrete("Mock Discrete GPU")],
            extensions: vec!["VK_KHR_surface".to_string()],
            request: ExtensionRequest::none(),
            benign: &MOCK_BENIGN,
            debug_layer: true,
            gpu_validation: true,
            preference_enumeration: true,
            instance_failures: VecDeque::new(),
            device_failures: VecDeque::new(),
            limits: DeviceLimits::D3D12,
            architecture: ArchitectureInfo::default(),
            fail_limits: false,
            fail_buffers: false,
            fail_end_commands: false,
            deferred_completion: false,
            next_allocator: AtomicU32::new(0),
        }
    }

    pub fn log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    pub fn with_backend(mut self, backend: GraphicsBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_adapters(mut self, adapters: Vec<MockAdapter>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_extensions(mut self, available: &[&str], request: ExtensionRequest) -> Self {
        self.extensions = available.iter().map(|s| s.to_string()).collect();
        self.request = request;
        self
    }

    pub fn without_debug_layer(mut self) -> Self {
        self.debug_layer = false;
        self
    }

    pub fn without_gpu_validation(mut self) -> Self {
        self.gpu_validation = false;
        self
    }

    pub fn without_preference_enumeration(mut self) -> Self {
        self.preference_enumeration = false;
        self
    }

    /// 接下来的实例创建依次以这些类别失败
    pub fn failing_instance(mut self, kinds: &[NativeErrorKind]) -> Self {
        self.instance_failures = kinds.iter().copied().collect();
        self
    }

    /// 接下来的设备创建依次以这些类别失败
    pub fn failing_device(mut self, kinds: &[NativeErrorKind]) -> Self {
        self.device_failures = kinds.iter().copied().collect();
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_architecture(mut self, architecture: ArchitectureInfo) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn failing_limits(mut self) -> Self {
        self.fail_limits = true;
        self
    }

    pub fn failing_buffers(mut self) -> Self {
        self.fail_buffers = true;
        self
    }

    pub fn failing_end_commands(mut self) -> Self {
        self.fail_end_commands = true;
        self
    }

    /// 提交的工作直到有人等待时才算完成
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred_completion = true;
        self
    }

    /// 直接在第一个适配器上打开一个设备，供资源层测试使用
    pub fn open_test_device(&mut self) -> MockDevice {
        self.log.open_devices.fetch_add(1, Ordering::SeqCst);
        MockDevice { adapter_index: 0 }
    }

    fn error(call: &'static str, kind: NativeErrorKind) -> NativeError {
        NativeError::new(call, -1, kind)
    }
}

impl NativeDriver for MockDriver {
    type Adapter = MockAdapterHandle;
    type Device = MockDevice;
    type Buffer = MockBuffer;
    type Texture = MockTexture;
    type SwapChain = MockSwapChain;
    type CommandAllocator = MockAllocator;
    type Fence = MockFence;

    fn backend(&self) -> GraphicsBackend {
        self.backend
    }

    fn probe_instance(&self) -> InstanceProbe {
        self.log.record(MockCall::ProbeInstance);
        InstanceProbe {
            extensions: self.extensions.clone(),
            layers: Vec::new(),
        }
    }

    fn extension_request(&self) -> ExtensionRequest {
        self.request.clone()
    }

    fn enable_validation_layer(&mut self) -> NativeResult<()> {
        self.log.record(MockCall::EnableValidationLayer);
        if self.debug_layer {
            Ok(())
        } else {
            Err(Self::error("GetDebugInterface", NativeErrorKind::InterfaceUnavailable))
        }
    }

    fn enable_gpu_validation(&mut self, _synchronized_queue: bool) -> NativeResult<()> {
        self.log.record(MockCall::EnableGpuValidation);
        if self.gpu_validation {
            Ok(())
        } else {
            Err(Self::error("QueryInterface", NativeErrorKind::InterfaceUnavailable))
        }
    }

    fn benign_message_ids(&self) -> &'static [MessageId] {
        self.benign
    }

    fn create_instance(&mut self, info: &InstanceCreateInfo<'_>) -> NativeResult<()> {
        self.log.record(MockCall::CreateInstance);
        self.log.instance_validation.lock().unwrap().push(info.validation);
        self.log
            .instance_extensions
            .lock()
            .unwrap()
            .push(info.extensions.to_vec());
        match self.instance_failures.pop_front() {
            Some(kind) => Err(Self::error("CreateInstance", kind)),
            None => Ok(()),
        }
    }

    fn supports_preference_enumeration(&self) -> bool {
        self.preference_enumeration
    }

    fn enumerate_adapter(
        &mut self,
        index: u32,
        preference: Option<PowerPreference>,
    ) -> NativeResult<Option<(Self::Adapter, AdapterCandidate)>> {
        self.log.record(MockCall::EnumerateAdapter);
        self.log.preferences.lock().unwrap().push(preference);

        let Some(adapter) = self.adapters.get(index as usize) else {
            return Ok(None);
        };
        self.log.open_adapters.fetch_add(1, Ordering::SeqCst);

        let candidate = AdapterCandidate {
            index,
            vendor_id: 0x1234,
            device_id: 0x1000 + index,
            name: adapter.name.clone(),
            is_software: adapter.is_software,
            feature_level: adapter.feature_level,
            device_type: adapter.device_type,
        };
        Ok(Some((MockAdapterHandle { index }, candidate)))
    }

    fn probe_adapter(&mut self, adapter: &Self::Adapter, minimum: FeatureLevel) -> bool {
        self.log.record(MockCall::ProbeAdapter);
        self.adapters
            .get(adapter.index as usize)
            .map(|a| a.probe_ok && a.feature_level >= minimum)
            .unwrap_or(false)
    }

    fn release_adapter(&mut self, adapter: Self::Adapter) {
        self.log.record(MockCall::ReleaseAdapter);
        self.log.open_adapters.fetch_sub(1, Ordering::SeqCst);
        self.log.released_adapters.lock().unwrap().push(adapter.index);
    }

    fn create_device(
        &mut self,
        adapter: &Self::Adapter,
        info: &DeviceCreateInfo<'_>,
    ) -> NativeResult<Self::Device> {
        self.log.record(MockCall::CreateDevice);
        self.log.device_validation.lock().unwrap().push(info.validation);
        if let Some(kind) = self.device_failures.pop_front() {
            return Err(Self::error("CreateDevice", kind));
        }
        self.log.open_devices.fetch_add(1, Ordering::SeqCst);
        *self.log.device_adapter.lock().unwrap() = Some(adapter.index);
        Ok(MockDevice { adapter_index: adapter.index })
    }

    fn set_device_name(&self, _device: &Self::Device, name: &str) -> NativeResult<()> {
        self.log.record(MockCall::SetDeviceName);
        self.log.device_names.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn install_message_filter(&self, _device: &Self::Device, filter: &MessageFilter) -> NativeResult<()> {
        self.log.record(MockCall::InstallMessageFilter);
        self.log.filters.lock().unwrap().push(filter.clone());
        Ok(())
    }

    fn query_architecture(&self, _device: &Self::Device) -> ArchitectureInfo {
        self.log.record(MockCall::QueryArchitecture);
        self.architecture
    }

    fn query_limits(&self, _device: &Self::Device) -> NativeResult<DeviceLimits> {
        self.log.record(MockCall::QueryLimits);
        if self.fail_limits {
            Err(Self::error("GetDeviceLimits", NativeErrorKind::DeviceLost))
        } else {
            Ok(self.limits)
        }
    }

    fn wait_idle(&self, _device: &Self::Device) -> NativeResult<()> {
        self.log.record(MockCall::WaitIdle);
        Ok(())
    }

    fn destroy_device(&self, _device: Self::Device) {
        self.log.record(MockCall::DestroyDevice);
        self.log.open_devices.fetch_sub(1, Ordering::SeqCst);
    }

    fn create_buffer(&self, _device: &Self::Device, desc: &BufferDescriptor) -> NativeResult<Self::Buffer> {
        self.log.record(MockCall::CreateBuffer);
        if self.fail_buffers {
            return Err(Self::error("CreateBuffer", NativeErrorKind::OutOfMemory));
        }
        let size = desc
            .aligned_size()
            .ok_or_else(|| NativeError::unsupported("CreateBuffer"))?;
        Ok(MockBuffer { size })
    }

    fn destroy_buffer(&self, _device: &Self::Device, _buffer: Self::Buffer) {
        self.log.record(MockCall::DestroyBuffer);
    }

    fn create_texture(&self, _device: &Self::Device, desc: &TextureDescriptor) -> NativeResult<Self::Texture> {
        self.log.record(MockCall::CreateTexture);
        Ok(MockTexture { width: desc.width, height: desc.height })
    }

    fn destroy_texture(&self, _device: &Self::Device, _texture: Self::Texture) {
        self.log.record(MockCall::DestroyTexture);
    }

    fn create_swap_chain(
        &self,
        _device: &Self::Device,
        desc: &SwapChainDescriptor,
    ) -> NativeResult<Self::SwapChain> {
        self.log.record(MockCall::CreateSwapChain);
        Ok(MockSwapChain { width: desc.width, height: desc.height })
    }

    fn resize_swap_chain(
        &self,
        _device: &Self::Device,
        swap_chain: &mut Self::SwapChain,
        width: u32,
        height: u32,
    ) -> NativeResult<()> {
        self.log.record(MockCall::ResizeSwapChain);
        swap_chain.width = width;
        swap_chain.height = height;
        Ok(())
    }

    fn destroy_swap_chain(&self, _device: &Self::Device, _swap_chain: Self::SwapChain) {
        self.log.record(MockCall::DestroySwapChain);
    }

    fn create_command_allocator(&self, _device: &Self::Device) -> NativeResult<Self::CommandAllocator> {
        self.log.record(MockCall::CreateCommandAllocator);
        Ok(MockAllocator {
            id: self.next_allocator.fetch_add(1, Ordering::SeqCst),
            recording: false,
        })
    }

    fn begin_commands(&self, _device: &Self::Device, allocator: &mut Self::CommandAllocator) -> NativeResult<()> {
        self.log.record(MockCall::BeginCommands);
        allocator.recording = true;
        Ok(())
    }

    fn end_commands(&self, _device: &Self::Device, allocator: &mut Self::CommandAllocator) -> NativeResult<()> {
        self.log.record(MockCall::EndCommands);
        if self.fail_end_commands {
            return Err(Self::error("EndCommandBuffer", NativeErrorKind::DeviceLost));
        }
        allocator.recording = false;
        Ok(())
    }

    fn reset_command_allocator(
        &self,
        _device: &Self::Device,
        allocator: &mut Self::CommandAllocator,
    ) -> NativeResult<()> {
        self.log.record(MockCall::ResetCommandAllocator);
        allocator.recording = false;
        Ok(())
    }

    fn destroy_command_allocator(&self, _device: &Self::Device, _allocator: Self::CommandAllocator) {
        self.log.record(MockCall::DestroyCommandAllocator);
    }

    fn create_fence(&self, _device: &Self::Device, initial_value: u64) -> NativeResult<Self::Fence> {
        self.log.record(MockCall::CreateFence);
        Ok(MockFence {
            completed: AtomicU64::new(initial_value),
            pending: AtomicU64::new(initial_value),
        })
    }

    fn submit(
        &self,
        _device: &Self::Device,
        _allocators: &[&Self::CommandAllocator],
        fence: &Self::Fence,
        signal_value: u64,
    ) -> NativeResult<()> {
        self.log.record(MockCall::Submit);
        fence.pending.fetch_max(signal_value, Ordering::SeqCst);
        if !self.deferred_completion {
            fence.completed.fetch_max(signal_value, Ordering::SeqCst);
        }
        Ok(())
    }

    fn fence_completed_value(&self, _device: &Self::Device, fence: &Self::Fence) -> NativeResult<u64> {
        Ok(fence.completed.load(Ordering::SeqCst))
    }

    fn wait_fence(&self, _device: &Self::Device, fence: &Self::Fence, value: u64) -> NativeResult<()> {
        self.log.record(MockCall::WaitFence);
        if fence.pending.load(Ordering::SeqCst) < value {
            return Err(Self::error("WaitFence", NativeErrorKind::DeviceLost));
        }
        fence.completed.fetch_max(value, Ordering::SeqCst);
        Ok(())
    }

    fn destroy_fence(&self, _device: &Self::Device, _fence: Self::Fence) {
        self.log.record(MockCall::DestroyFence);
    }
}
