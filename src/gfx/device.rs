//! 图形设备
//!
//! [`GraphicsDevice::new`] 按固定顺序完成整个协商流程：
//!
//! 1. 探测实例扩展 / 层
//! 2. 配置验证层
//! 3. 解析扩展并创建实例
//! 4. 枚举并筛选适配器
//! 5. 在第一个合格的适配器上创建逻辑设备
//! 6. 安装验证消息过滤器，生成能力快照
//!
//! 任何一步失败都会释放已经打开的适配器和设备，然后返回错误。
//!
//! 原生设备由 [`DeviceShared`] 持有，缓冲区、纹理、交换链和命令池各自持有它的
//! 共享引用；最后一个引用消失时销毁原生设备，保证只销毁一次。

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::core::config::{DeviceConfig, GraphicsBackend};
use crate::core::error::{GraphicsError, Result};
use crate::gfx::adapter::{select_adapter, AdapterRequest};
use crate::gfx::backend::NativeDriver;
use crate::gfx::capabilities::DeviceCapabilities;
use crate::gfx::extensions::{resolve_extensions, ExtensionSet};
use crate::gfx::factory::{create_instance, create_logical_device};
use crate::gfx::validation::{ValidationConfigurator, ValidationState};
use crate::renderer::command::{CommandPool, CommandQueue};
use crate::renderer::resource::{
    Buffer, BufferDescriptor, SwapChain, SwapChainDescriptor, Texture, TextureDescriptor,
};
use crate::renderer::sync::Fence;

/// 驱动 + 原生设备，被设备和它创建的所有对象共享
pub(crate) struct DeviceShared<D: NativeDriver> {
    driver: D,
    raw: ManuallyDrop<D::Device>,
    disposed: AtomicBool,
    /// 队列访问锁：提交和设备空闲等待都要求队列没有并发访问
    queue_lock: Mutex<()>,
}

impl<D: NativeDriver> DeviceShared<D> {
    fn new(driver: D, raw: D::Device) -> Self {
        Self {
            driver,
            raw: ManuallyDrop::new(raw),
            disposed: AtomicBool::new(false),
            queue_lock: Mutex::new(()),
        }
    }

    pub(crate) fn lock_queue(&self) -> Result<MutexGuard<'_, ()>> {
        self.queue_lock.lock().map_err(|_| {
            GraphicsError::CommandExecution("Queue lock poisoned".to_string()).into()
        })
    }

    /// 持有队列锁等待设备空闲
    pub(crate) fn wait_idle(&self) -> Result<()> {
        let _guard = self.lock_queue()?;
        self.driver.wait_idle(self.raw())?;
        Ok(())
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    pub(crate) fn raw(&self) -> &D::Device {
        &self.raw
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// 设备已销毁时返回 [`GraphicsError::DeviceDisposed`]
    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(GraphicsError::DeviceDisposed.into());
        }
        Ok(())
    }
}

impl<D: NativeDriver> Drop for DeviceShared<D> {
    fn drop(&mut self) {
        // SAFETY: raw 只在这里取出一次
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.driver.destroy_device(raw);
        debug!("Native device destroyed");
    }
}

#[cfg(test)]
impl DeviceShared<crate::gfx::mock::MockDriver> {
    /// 跳过协商流程，直接得到一个可用的共享设备
    pub(crate) fn for_tests(mut driver: crate::gfx::mock::MockDriver) -> Arc<Self> {
        let raw = driver.open_test_device();
        Arc::new(Self::new(driver, raw))
    }
}

/// 图形设备
///
/// 构造完成后能力快照和验证状态都不再改变。
pub struct GraphicsDevice<D: NativeDriver> {
    shared: Arc<DeviceShared<D>>,
    capabilities: DeviceCapabilities,
    validation: ValidationState,
    extensions: ExtensionSet,
    label: String,
    queue: Option<CommandQueue<D>>,
    command_pool: Option<CommandPool<D>>,
}

impl<D: NativeDriver> GraphicsDevice<D> {
    /// 在 `driver` 上完成设备协商
    ///
    /// # 参数
    ///
    /// * `driver` - 后端驱动，设备创建后由设备独占持有
    /// * `config` - 验证模式、电源偏好、调试名称等
    ///
    /// # 错误
    ///
    /// - 缺少必需扩展或没有合格的适配器：[`GraphicsError::UnsupportedPlatform`]
    /// - 设备创建失败（验证层回退之外）：[`GraphicsError::NativeCall`]
    pub fn new(mut driver: D, config: &DeviceConfig) -> Result<Self> {
        let backend = driver.backend();
        let minimum = config.minimum_feature_level();
        let label = config.label().to_string();

        info!(
            backend = backend.name(),
            validation = ?config.validation,
            power_preference = ?config.power_preference,
            minimum_feature_level = %minimum,
            "Creating graphics device"
        );

        let probe = driver.probe_instance();
        debug!(
            extensions = probe.extensions.len(),
            layers = probe.layers.len(),
            "Instance probed"
        );

        let mut validation = ValidationConfigurator::new(config.validation).configure(&mut driver);

        let extensions = resolve_extensions(
            &driver.extension_request(),
            &probe.extensions,
            validation.is_active(),
        )?;
        create_instance(&mut driver, &extensions, &mut validation)?;

        let adapter = select_adapter(
            &mut driver,
            &AdapterRequest {
                minimum_feature_level: minimum,
                power_preference: config.power_preference,
                software_fallback: config.software_fallback,
            },
        )?;

        let raw = match create_logical_device(
            &mut driver,
            &adapter.handle,
            &mut validation,
            minimum,
            &label,
        ) {
            Ok(raw) => raw,
            Err(e) => {
                driver.release_adapter(adapter.handle);
                return Err(e);
            }
        };

        if let Some(filter) = validation.filter() {
            if let Err(e) = driver.install_message_filter(&raw, filter) {
                warn!(error = %e, "Failed to install validation message filter");
            }
        }

        // 有些信息（例如 UMA）只能在活动设备上查询
        let architecture = driver.query_architecture(&raw);
        let limits = match driver.query_limits(&raw) {
            Ok(limits) => limits,
            Err(e) => {
                driver.destroy_device(raw);
                driver.release_adapter(adapter.handle);
                return Err(GraphicsError::NativeCall(e).into());
            }
        };
        let capabilities = DeviceCapabilities::snapshot(&adapter.candidate, architecture, limits);
        driver.release_adapter(adapter.handle);

        info!(adapter = %capabilities.adapter(), "Graphics device ready");

        let shared = Arc::new(DeviceShared::new(driver, raw));
        let fence = Arc::new(Fence::new(Arc::clone(&shared))?);
        let queue = CommandQueue::new(Arc::clone(&shared), Arc::clone(&fence));
        let command_pool = CommandPool::new(Arc::clone(&shared), fence);

        Ok(Self {
            shared,
            capabilities,
            validation,
            extensions,
            label,
            queue: Some(queue),
            command_pool: Some(command_pool),
        })
    }

    pub fn backend(&self) -> GraphicsBackend {
        self.shared.driver().backend()
    }

    /// 能力快照
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// 实际生效的验证状态
    pub fn validation(&self) -> &ValidationState {
        &self.validation
    }

    /// 实例创建时请求的扩展
    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn driver(&self) -> &D {
        self.shared.driver()
    }

    pub fn raw(&self) -> &D::Device {
        self.shared.raw()
    }

    /// 创建缓冲区
    pub fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Buffer<D>> {
        self.shared.ensure_alive()?;
        let size = desc.validate()?;

        let raw = self
            .shared
            .driver()
            .create_buffer(self.shared.raw(), desc)
            .map_err(|e| GraphicsError::ResourceCreation(format!("buffer: {}", e)))?;
        debug!(size, usage = ?desc.usage, "Buffer created");
        Ok(Buffer::new(Arc::clone(&self.shared), raw, desc.clone(), size))
    }

    /// 创建纹理
    ///
    /// 描述先按设备限制校验，不合法时不会发出任何原生调用。
    pub fn create_texture(&self, desc: &TextureDescriptor) -> Result<Texture<D>> {
        self.shared.ensure_alive()?;
        desc.validate(self.capabilities.limits())?;

        let raw = self
            .shared
            .driver()
            .create_texture(self.shared.raw(), desc)
            .map_err(|e| GraphicsError::ResourceCreation(format!("texture: {}", e)))?;
        debug!(
            width = desc.width,
            height = desc.height,
            format = ?desc.format,
            "Texture created"
        );
        Ok(Texture::new(Arc::clone(&self.shared), raw, desc.clone()))
    }

    /// 在窗口上创建交换链
    pub fn create_swap_chain(&self, desc: &SwapChainDescriptor) -> Result<SwapChain<D>> {
        self.shared.ensure_alive()?;
        desc.validate()?;

        let raw = self
            .shared
            .driver()
            .create_swap_chain(self.shared.raw(), desc)
            .map_err(|e| GraphicsError::SwapchainError(e.to_string()))?;
        info!(
            width = desc.width,
            height = desc.height,
            buffers = desc.buffer_count,
            "Swapchain created"
        );
        Ok(SwapChain::new(Arc::clone(&self.shared), raw, desc))
    }

    /// 命令分配器池
    pub fn command_pool(&self) -> Result<&CommandPool<D>> {
        self.command_pool
            .as_ref()
            .ok_or_else(|| GraphicsError::DeviceDisposed.into())
    }

    /// 命令队列
    pub fn queue(&self) -> Result<&CommandQueue<D>> {
        self.queue
            .as_ref()
            .ok_or_else(|| GraphicsError::DeviceDisposed.into())
    }

    /// 等待设备上所有工作完成
    pub fn wait_idle(&self) -> Result<()> {
        self.shared.ensure_alive()?;
        let queue = self.queue()?;
        queue.flush()?;
        queue.wait_device_idle()
    }

    /// 销毁设备
    ///
    /// 可以重复调用。先等待设备空闲，之后所有创建操作都返回
    /// [`GraphicsError::DeviceDisposed`]。原生设备在最后一个资源释放后才真正销毁。
    pub fn destroy(&mut self) {
        if self.shared.is_disposed() {
            return;
        }

        if let Err(e) = self.wait_idle() {
            warn!(error = %e, "Failed to wait for device idle during destroy");
        }

        self.shared.disposed.store(true, Ordering::Release);
        self.command_pool = None;
        self.queue = None;

        info!(label = %self.label, "Graphics device destroyed");
    }
}

impl<D: NativeDriver> Drop for GraphicsDevice<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{PowerPreference, ValidationMode};
    use crate::core::error::{DistDeviceError, NativeErrorKind};
    use crate::gfx::backend::{AdapterType, ArchitectureInfo, FeatureLevel};
    use crate::gfx::extensions::ExtensionRequest;
    use crate::gfx::mock::{MockAdapter, MockCall, MockDriver};
    use crate::gfx::validation::MessageSeverity;
    use crate::renderer::resource::{
        BufferUsage, MemoryType, PresentMode, SurfaceTarget, TextureFormat, TextureUsage,
    };
    use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};

    fn config(validation: ValidationMode) -> DeviceConfig {
        DeviceConfig {
            validation,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_bring_up_order() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Enabled)).unwrap();

        let calls = log.calls();
        let position = |call| calls.iter().position(|c| *c == call).unwrap();
        assert!(position(MockCall::ProbeInstance) < position(MockCall::EnableValidationLayer));
        assert!(position(MockCall::EnableValidationLayer) < position(MockCall::CreateInstance));
        assert!(position(MockCall::CreateInstance) < position(MockCall::EnumerateAdapter));
        assert!(position(MockCall::EnumerateAdapter) < position(MockCall::CreateDevice));
        assert!(position(MockCall::CreateDevice) < position(MockCall::QueryLimits));

        assert_eq!(device.label(), "dist_device");
        assert!(device.validation().is_active());
        assert_eq!(log.open_adapters(), 0);
    }

    #[test]
    fn test_filter_installed_only_with_validation() {
        let driver = MockDriver::new();
        let log = driver.log();
        let _device = GraphicsDevice::new(driver, &config(ValidationMode::Verbose)).unwrap();
        let filters = log.filters();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].allows(MessageSeverity::Info));
        assert!(filters[0].breaks_on(MessageSeverity::Error));

        let driver = MockDriver::new();
        let log = driver.log();
        let _device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();
        assert_eq!(log.count(MockCall::InstallMessageFilter), 0);
        assert_eq!(log.count(MockCall::EnableValidationLayer), 0);
    }

    #[test]
    fn test_gpu_validation_unavailable_still_succeeds() {
        let driver = MockDriver::new().without_gpu_validation();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Gpu)).unwrap();

        assert!(device.validation().is_active());
        assert!(!device.validation().gpu_active());
    }

    #[test]
    fn test_failed_device_creation_is_balanced() {
        let driver = MockDriver::new()
            .with_adapters(vec![MockAdapter::software("WARP"), MockAdapter::discrete("GPU")])
            .failing_device(&[NativeErrorKind::OutOfMemory]);
        let log = driver.log();

        let result = GraphicsDevice::new(driver, &config(ValidationMode::Enabled));
        assert!(result.is_err());
        assert_eq!(log.open_adapters(), 0);
        assert_eq!(log.open_devices(), 0);
        assert_eq!(log.count(MockCall::EnumerateAdapter), log.count(MockCall::ReleaseAdapter));
    }

    #[test]
    fn test_failed_snapshot_releases_device() {
        let driver = MockDriver::new().failing_limits();
        let log = driver.log();

        assert!(GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).is_err());
        assert_eq!(log.open_devices(), 0);
        assert_eq!(log.open_adapters(), 0);
        assert_eq!(log.count(MockCall::DestroyDevice), 1);
    }

    #[test]
    fn test_missing_required_extension_fails_before_instance() {
        let request = ExtensionRequest {
            required: vec!["VK_KHR_surface"],
            optional: vec![],
            validation: vec![],
        };
        let driver = MockDriver::new().with_extensions(&[], request);
        let log = driver.log();

        match GraphicsDevice::new(driver, &config(ValidationMode::Disabled)) {
            Err(DistDeviceError::Graphics(GraphicsError::UnsupportedPlatform(_))) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("device creation should fail"),
        }
        assert_eq!(log.count(MockCall::CreateInstance), 0);
    }

    #[test]
    fn test_snapshot_taken_from_selected_adapter() {
        let driver = MockDriver::new()
            .with_adapters(vec![MockAdapter::discrete("Laptop GPU")])
            .with_architecture(ArchitectureInfo { uma: Some(true), cache_coherent_uma: Some(true) });
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let adapter = device.capabilities().adapter();
        assert_eq!(adapter.name(), "Laptop GPU");
        assert_eq!(adapter.adapter_type(), AdapterType::Integrated);
        assert_eq!(adapter.feature_level(), FeatureLevel::new(1, 3));
    }

    #[test]
    fn test_power_preference_forwarded() {
        let driver = MockDriver::new();
        let log = driver.log();
        let config = DeviceConfig {
            power_preference: PowerPreference::LowPower,
            ..config(ValidationMode::Disabled)
        };
        let _device = GraphicsDevice::new(driver, &config).unwrap();
        assert_eq!(log.preferences()[0], Some(PowerPreference::LowPower));
    }

    #[test]
    fn test_custom_label() {
        let driver = MockDriver::new();
        let log = driver.log();
        let config = DeviceConfig {
            label: Some("probe".to_string()),
            ..config(ValidationMode::Disabled)
        };
        let device = GraphicsDevice::new(driver, &config).unwrap();
        assert_eq!(device.label(), "probe");
        assert_eq!(log.device_names(), vec!["probe".to_string()]);
    }

    #[test]
    fn test_texture_validated_before_native_call() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let too_big = TextureDescriptor::new_2d(65536, 4, TextureFormat::Rgba8Unorm, TextureUsage::Sampled);
        assert!(device.create_texture(&too_big).is_err());
        assert_eq!(log.count(MockCall::CreateTexture), 0);

        let ok = TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba8Unorm, TextureUsage::Sampled);
        let texture = device.create_texture(&ok).unwrap();
        assert_eq!(texture.width(), 256);
        drop(texture);
        assert_eq!(log.count(MockCall::DestroyTexture), 1);
    }

    #[test]
    fn test_buffer_failure_returns_no_object() {
        let driver = MockDriver::new().failing_buffers();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let desc = BufferDescriptor::new(1024, BufferUsage::Vertex, MemoryType::DeviceLocal);
        match device.create_buffer(&desc) {
            Err(DistDeviceError::Graphics(GraphicsError::ResourceCreation(_))) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("buffer creation should fail"),
        }
    }

    #[test]
    fn test_oversized_constant_buffer_rejected_before_native_call() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let desc = BufferDescriptor::new(u64::MAX - 10, BufferUsage::Constant, MemoryType::HostVisible);
        match device.create_buffer(&desc) {
            Err(DistDeviceError::Graphics(GraphicsError::ResourceCreation(_))) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("buffer creation should fail"),
        }
        assert_eq!(log.count(MockCall::CreateBuffer), 0);

        let buffer = device
            .create_buffer(&BufferDescriptor::new(300, BufferUsage::Constant, MemoryType::HostVisible))
            .unwrap();
        assert_eq!(buffer.size(), 512);
    }

    fn swap_chain_desc(width: u32, height: u32) -> SwapChainDescriptor {
        SwapChainDescriptor {
            width,
            height,
            format: TextureFormat::Bgra8Unorm,
            buffer_count: 2,
            present_mode: PresentMode::Fifo,
            target: SurfaceTarget {
                display: RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
                window: RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
            },
        }
    }

    #[test]
    fn test_swap_chain_resize_ignores_zero_and_unchanged_sizes() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();
        let mut swap_chain = device.create_swap_chain(&swap_chain_desc(800, 600)).unwrap();
        let wait_idle_before = log.count(MockCall::WaitIdle);

        swap_chain.resize(0, 600).unwrap();
        swap_chain.resize(800, 0).unwrap();
        swap_chain.resize(800, 600).unwrap();

        assert_eq!(swap_chain.extent(), (800, 600));
        assert_eq!(log.count(MockCall::ResizeSwapChain), 0);
        assert_eq!(log.count(MockCall::WaitIdle), wait_idle_before);
    }

    #[test]
    fn test_swap_chain_resize_waits_idle_first() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();
        let mut swap_chain = device.create_swap_chain(&swap_chain_desc(800, 600)).unwrap();

        swap_chain.resize(1024, 768).unwrap();
        assert_eq!(swap_chain.extent(), (1024, 768));
        assert_eq!(swap_chain.raw().width, 1024);

        let calls = log.calls();
        let created = calls
            .iter()
            .position(|c| *c == MockCall::CreateSwapChain)
            .unwrap();
        assert_eq!(
            &calls[created + 1..],
            &[MockCall::WaitIdle, MockCall::ResizeSwapChain]
        );
    }

    #[test]
    fn test_swap_chain_resize_after_destroy() {
        let driver = MockDriver::new();
        let log = driver.log();
        let mut device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();
        let mut swap_chain = device.create_swap_chain(&swap_chain_desc(800, 600)).unwrap();

        device.destroy();
        match swap_chain.resize(1024, 768) {
            Err(DistDeviceError::Graphics(GraphicsError::DeviceDisposed)) => {}
            other => panic!("expected DeviceDisposed, got {:?}", other.err()),
        }
        assert_eq!(swap_chain.extent(), (800, 600));
        assert_eq!(log.count(MockCall::ResizeSwapChain), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let driver = MockDriver::new();
        let log = driver.log();
        let mut device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        device.destroy();
        device.destroy();
        assert!(device.is_disposed());
        assert_eq!(log.count(MockCall::WaitIdle), 1);

        let desc = BufferDescriptor::new(64, BufferUsage::Constant, MemoryType::HostVisible);
        match device.create_buffer(&desc) {
            Err(DistDeviceError::Graphics(GraphicsError::DeviceDisposed)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("creation after destroy should fail"),
        }
        assert!(device.queue().is_err());
        assert!(device.wait_idle().is_err());

        drop(device);
        assert_eq!(log.count(MockCall::DestroyDevice), 1);
        assert_eq!(log.open_devices(), 0);
    }

    #[test]
    fn test_native_device_outlives_resources() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let buffer = device
            .create_buffer(&BufferDescriptor::new(100, BufferUsage::Constant, MemoryType::HostVisible))
            .unwrap();
        assert_eq!(buffer.size(), 256);

        drop(device);
        assert_eq!(log.count(MockCall::DestroyDevice), 0);

        drop(buffer);
        assert_eq!(log.count(MockCall::DestroyBuffer), 1);
        assert_eq!(log.count(MockCall::DestroyDevice), 1);
    }

    #[test]
    fn test_wait_idle_drains_queue() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = GraphicsDevice::new(driver, &config(ValidationMode::Disabled)).unwrap();

        let pool = device.command_pool().unwrap();
        let queue = device.queue().unwrap();
        let value = queue.submit(pool.rent().unwrap()).unwrap();

        device.wait_idle().unwrap();
        assert!(queue.fence().is_completed(value).unwrap());
        assert_eq!(log.count(MockCall::Submit), 2);
        assert_eq!(log.count(MockCall::WaitIdle), 1);
    }
}
