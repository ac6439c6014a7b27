//! Vulkan 原生驱动
//!
//! 基于 ash 实现 [`NativeDriver`]：
//! - 实例阶段：加载器、`VK_LAYER_KHRONOS_validation`、调试信使
//! - 适配器阶段：`vkEnumeratePhysicalDevices`，按设备类型稳定排序实现电源偏好
//! - 设备阶段：单个图形队列，timeline semaphore 作为围栏
//!
//! 需要 Vulkan 1.2（timeline semaphore 已进入核心）。

use std::ffi::{c_char, CStr, CString};

use ash::extensions::{ext::DebugUtils, khr};
use ash::vk;
use ash::vk::Handle;
use tracing::{debug, info, warn};

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

use super::debug::{messenger_create_info, MessengerState, BENIGN_MESSAGE_IDS};
use super::memory::{self, VulkanBuffer, VulkanTexture};
use super::surface::{self, SwapChainContext, VulkanSwapChain};

/// Khronos 验证层
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

const SURFACE_EXTENSION: &str = "VK_KHR_surface";
const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
const VALIDATION_FEATURES_EXTENSION: &str = "VK_EXT_validation_features";
const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// 实例使用的 API 版本
const API_VERSION: u32 = vk::API_VERSION_1_2;

/// 把 `VkResult` 归类为 [`NativeError`]
pub(super) fn vk_error(call: &'static str, result: vk::Result) -> NativeError {
    let kind = match result {
        vk::Result::ERROR_LAYER_NOT_PRESENT => NativeErrorKind::LayerUnavailable,
        vk::Result::ERROR_EXTENSION_NOT_PRESENT | vk::Result::ERROR_FEATURE_NOT_PRESENT => {
            NativeErrorKind::InterfaceUnavailable
        }
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            NativeErrorKind::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => NativeErrorKind::DeviceLost,
        vk::Result::ERROR_INCOMPATIBLE_DRIVER | vk::Result::ERROR_INITIALIZATION_FAILED => {
            NativeErrorKind::Unsupported
        }
        _ => NativeErrorKind::Other,
    };
    NativeError::new(call, result.as_raw() as i64, kind)
}

fn c_name(raw: &[c_char]) -> String {
    // SAFETY: Vulkan 保证名称数组以 NUL 结尾
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn to_cstrings(names: &[String]) -> Vec<CString> {
    names
        .iter()
        .filter_map(|name| CString::new(name.as_str()).ok())
        .collect()
}

fn feature_level_of(api_version: u32) -> FeatureLevel {
    FeatureLevel::new(vk::api_version_major(api_version), vk::api_version_minor(api_version))
}

fn adapter_type_of(device_type: vk::PhysicalDeviceType) -> Option<AdapterType> {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => Some(AdapterType::Discrete),
        vk::PhysicalDeviceType::INTEGRATED_GPU => Some(AdapterType::Integrated),
        vk::PhysicalDeviceType::CPU => Some(AdapterType::Software),
        _ => None,
    }
}

/// 电源偏好下的排序键，数值越小越靠前
pub(super) fn preference_rank(device_type: vk::PhysicalDeviceType, preference: PowerPreference) -> u32 {
    let (first, second) = match preference {
        PowerPreference::HighPerformance => (
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
        ),
        PowerPreference::LowPower => (
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ),
    };
    match device_type {
        t if t == first => 0,
        t if t == second => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// 从内存类型推断统一内存架构：所有设备本地内存都对主机可见
pub(super) fn architecture_from_memory(properties: &vk::PhysicalDeviceMemoryProperties) -> ArchitectureInfo {
    let device_local: Vec<vk::MemoryPropertyFlags> = properties.memory_types
        [..properties.memory_type_count as usize]
        .iter()
        .map(|t| t.property_flags)
        .filter(|flags| flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL))
        .collect();
    if device_local.is_empty() {
        return ArchitectureInfo::default();
    }

    let uma = device_local
        .iter()
        .all(|flags| flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
    let coherent = uma
        && device_local
            .iter()
            .all(|flags| flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    ArchitectureInfo {
        uma: Some(uma),
        cache_coherent_uma: Some(coherent),
    }
}

pub(super) fn limits_from_vk(limits: &vk::PhysicalDeviceLimits) -> DeviceLimits {
    DeviceLimits {
        max_texture_dimension_1d: limits.max_image_dimension1_d,
        max_texture_dimension_2d: limits.max_image_dimension2_d,
        max_texture_dimension_3d: limits.max_image_dimension3_d,
        max_texture_dimension_cube: limits.max_image_dimension_cube,
        max_texture_array_layers: limits.max_image_array_layers,
        max_color_attachments: limits.max_color_attachments,
        min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
        buffer_copy_row_pitch_alignment: limits.optimal_buffer_copy_row_pitch_alignment,
        max_compute_workgroup_size: limits.max_compute_work_group_size,
        max_compute_invocations_per_workgroup: limits.max_compute_work_group_invocations,
        max_compute_workgroups_per_dimension: limits
            .max_compute_work_group_count
            .iter()
            .copied()
            .min()
            .unwrap_or(0),
        max_sampler_anisotropy: limits.max_sampler_anisotropy as u32,
    }
}

/// 物理设备句柄
#[derive(Debug, Clone, Copy)]
pub struct VulkanAdapter {
    pub physical_device: vk::PhysicalDevice,
}

/// 逻辑设备及其图形队列
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    swapchain_loader: khr::Swapchain,
}

/// 命令池和从中分配的一个主命令缓冲区
#[derive(Debug)]
pub struct VulkanCommandAllocator {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

/// timeline semaphore
#[derive(Debug)]
pub struct VulkanFence {
    pub semaphore: vk::Semaphore,
}

/// 实例及实例级扩展加载器
struct InstanceState {
    instance: ash::Instance,
    surface_loader: khr::Surface,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    enabled_extensions: Vec<String>,
}

/// Vulkan 驱动
pub struct VulkanDriver {
    entry: ash::Entry,
    instance: Option<InstanceState>,
    /// 按当前偏好排好序的物理设备，枚举从 0 开始时刷新
    physical_devices: Vec<vk::PhysicalDevice>,
    validation_layer: bool,
    gpu_validation: bool,
    messenger: Box<MessengerState>,
}

impl VulkanDriver {
    /// 加载 Vulkan 加载器
    pub fn new() -> NativeResult<Self> {
        // SAFETY: 加载动态库，Entry 在驱动的整个生命周期内保留
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            warn!(error = %e, "Failed to load the Vulkan loader");
            NativeError::new("vkGetInstanceProcAddr", 0, NativeErrorKind::Unsupported)
        })?;

        Ok(Self {
            entry,
            instance: None,
            physical_devices: Vec::new(),
            validation_layer: false,
            gpu_validation: false,
            messenger: Box::new(MessengerState::new()),
        })
    }

    /// 当前系统是否有可用的 Vulkan 1.2 加载器
    pub fn probe_support() -> bool {
        // SAFETY: 只做一次版本查询，Entry 随即丢弃
        let entry = match unsafe { ash::Entry::load() } {
            Ok(entry) => entry,
            Err(_) => return false,
        };
        match entry.try_enumerate_instance_version() {
            Ok(Some(version)) => version >= API_VERSION,
            _ => false,
        }
    }

    fn instance_state(&self, call: &'static str) -> NativeResult<&InstanceState> {
        self.instance
            .as_ref()
            .ok_or_else(|| NativeError::unsupported(call))
    }

    fn layer_available(&self, layer: &str) -> bool {
        self.entry
            .enumerate_instance_layer_properties()
            .map(|layers| layers.iter().any(|l| c_name(&l.layer_name) == layer))
            .unwrap_or(false)
    }

    fn graphics_queue_family(&self, instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<u32> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        families
            .iter()
            .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
    }

    fn supports_timeline_semaphore(&self, instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut vulkan12);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
        vulkan12.timeline_semaphore == vk::TRUE
    }

    fn set_object_name<H: Handle>(&self, device: &VulkanDevice, handle: H, name: &str) {
        let Some((debug_utils, _)) = self.instance.as_ref().and_then(|s| s.debug.as_ref()) else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(device.device.handle(), &name_info) } {
            debug!(error = ?e, "vkSetDebugUtilsObjectNameEXT failed");
        }
    }

    fn swap_chain_context<'a>(&'a self, device: &'a VulkanDevice) -> NativeResult<SwapChainContext<'a>> {
        let state = self.instance_state("vkCreateSwapchainKHR")?;
        Ok(SwapChainContext {
            surface_loader: &state.surface_loader,
            swapchain_loader: &device.swapchain_loader,
            physical_device: device.physical_device,
            queue_family_index: device.queue_family_index,
        })
    }
}

impl NativeDriver for VulkanDriver {
    type Adapter = VulkanAdapter;
    type Device = VulkanDevice;
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type SwapChain = VulkanSwapChain;
    type CommandAllocator = VulkanCommandAllocator;
    type Fence = VulkanFence;

    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::Vulkan
    }

    fn probe_instance(&self) -> InstanceProbe {
        let mut probe = InstanceProbe::default();

        match self.entry.enumerate_instance_extension_properties(None) {
            Ok(extensions) => {
                probe.extensions = extensions.iter().map(|e| c_name(&e.extension_name)).collect();
            }
            Err(e) => debug!(error = ?e, "vkEnumerateInstanceExtensionProperties failed"),
        }
        if let Ok(layers) = self.entry.enumerate_instance_layer_properties() {
            probe.layers = layers.iter().map(|l| c_name(&l.layer_name)).collect();
        }

        // 验证层自带的扩展（VK_EXT_validation_features）只在按层查询时出现
        if probe.layers.iter().any(|l| l == VALIDATION_LAYER) {
            let layer = CString::new(VALIDATION_LAYER).ok();
            if let Ok(extensions) = self
                .entry
                .enumerate_instance_extension_properties(layer.as_deref())
            {
                for name in extensions.iter().map(|e| c_name(&e.extension_name)) {
                    if !probe.extensions.contains(&name) {
                        probe.extensions.push(name);
                    }
                }
            }
        }

        debug!(
            extensions = probe.extensions.len(),
            layers = probe.layers.len(),
            "Vulkan instance probe"
        );
        probe
    }

    fn extension_request(&self) -> ExtensionRequest {
        ExtensionRequest {
            required: vec![SURFACE_EXTENSION],
            optional: vec![
                "VK_KHR_xlib_surface",
                "VK_KHR_wayland_surface",
                "VK_KHR_win32_surface",
                DEBUG_UTILS_EXTENSION,
            ],
            validation: vec![VALIDATION_FEATURES_EXTENSION],
        }
    }

    fn enable_validation_layer(&mut self) -> NativeResult<()> {
        if !self.layer_available(VALIDATION_LAYER) {
            return Err(NativeError::new(
                "vkEnumerateInstanceLayerProperties",
                vk::Result::ERROR_LAYER_NOT_PRESENT.as_raw() as i64,
                NativeErrorKind::InterfaceUnavailable,
            ));
        }
        self.validation_layer = true;
        Ok(())
    }

    fn enable_gpu_validation(&mut self, synchronized_queue: bool) -> NativeResult<()> {
        let layer = CString::new(VALIDATION_LAYER)
            .map_err(|_| NativeError::unsupported("vkEnumerateInstanceExtensionProperties"))?;
        let extensions = self
            .entry
            .enumerate_instance_extension_properties(Some(&layer))
            .map_err(|e| vk_error("vkEnumerateInstanceExtensionProperties", e))?;
        if !extensions
            .iter()
            .any(|e| c_name(&e.extension_name) == VALIDATION_FEATURES_EXTENSION)
        {
            return Err(NativeError::new(
                "vkEnumerateInstanceExtensionProperties",
                0,
                NativeErrorKind::InterfaceUnavailable,
            ));
        }
        self.gpu_validation = true;
        debug!(synchronized_queue, "GPU-assisted validation requested");
        Ok(())
    }

    fn benign_message_ids(&self) -> &'static [MessageId] {
        BENIGN_MESSAGE_IDS
    }

    fn create_instance(&mut self, info: &InstanceCreateInfo<'_>) -> NativeResult<()> {
        // 关闭验证重试时，验证层提供的扩展也随之去掉
        let extension_names: Vec<String> = info
            .extensions
            .iter()
            .filter(|name| info.validation || name.as_str() != VALIDATION_FEATURES_EXTENSION)
            .cloned()
            .collect();
        let extensions = to_cstrings(&extension_names);
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let layers = if info.validation && self.validation_layer {
            to_cstrings(&[VALIDATION_LAYER.to_string()])
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let app_name = CString::new("dist_device").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(0)
            .engine_name(&app_name)
            .engine_version(0)
            .api_version(API_VERSION);

        let enabled_features = [
            vk::ValidationFeatureEnableEXT::GPU_ASSISTED,
            vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION,
        ];
        let mut validation_features =
            vk::ValidationFeaturesEXT::builder().enabled_validation_features(&enabled_features);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        let gpu_assisted = info.validation
            && info.gpu_validation
            && self.gpu_validation
            && extension_names.iter().any(|e| e == VALIDATION_FEATURES_EXTENSION);
        if gpu_assisted {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .map_err(|e| vk_error("vkCreateInstance", e))?;

        let debug = if info.validation && extension_names.iter().any(|e| e == DEBUG_UTILS_EXTENSION) {
            let debug_utils = DebugUtils::new(&self.entry, &instance);
            let messenger_info = messenger_create_info(&self.messenger);
            match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) } {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    warn!(error = ?e, "Failed to create debug messenger");
                    None
                }
            }
        } else {
            None
        };

        info!(
            extensions = extension_names.len(),
            validation = info.validation,
            gpu_assisted,
            "Vulkan instance created"
        );
        self.instance = Some(InstanceState {
            surface_loader: khr::Surface::new(&self.entry, &instance),
            instance,
            debug,
            enabled_extensions: extension_names,
        });
        Ok(())
    }

    fn supports_preference_enumeration(&self) -> bool {
        true
    }

    fn enumerate_adapter(
        &mut self,
        index: u32,
        preference: Option<PowerPreference>,
    ) -> NativeResult<Option<(VulkanAdapter, AdapterCandidate)>> {
        let state = self.instance_state("vkEnumeratePhysicalDevices")?;
        let instance = state.instance.clone();

        if index == 0 || self.physical_devices.is_empty() {
            let mut devices = unsafe { instance.enumerate_physical_devices() }
                .map_err(|e| vk_error("vkEnumeratePhysicalDevices", e))?;
            if let Some(preference) = preference {
                devices.sort_by_key(|&pd| {
                    let properties = unsafe { instance.get_physical_device_properties(pd) };
                    preference_rank(properties.device_type, preference)
                });
            }
            self.physical_devices = devices;
        }

        let Some(&physical_device) = self.physical_devices.get(index as usize) else {
            return Ok(None);
        };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let candidate = AdapterCandidate {
            index,
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            name: c_name(&properties.device_name),
            is_software: properties.device_type == vk::PhysicalDeviceType::CPU,
            feature_level: feature_level_of(properties.api_version),
            device_type: adapter_type_of(properties.device_type),
        };
        Ok(Some((VulkanAdapter { physical_device }, candidate)))
    }

    fn probe_adapter(&mut self, adapter: &VulkanAdapter, minimum: FeatureLevel) -> bool {
        let Ok(state) = self.instance_state("vkGetPhysicalDeviceProperties") else {
            return false;
        };
        let instance = &state.instance;
        let pd = adapter.physical_device;

        let properties = unsafe { instance.get_physical_device_properties(pd) };
        if feature_level_of(properties.api_version) < minimum {
            return false;
        }

        let has_swapchain = unsafe { instance.enumerate_device_extension_properties(pd) }
            .map(|exts| exts.iter().any(|e| c_name(&e.extension_name) == SWAPCHAIN_EXTENSION))
            .unwrap_or(false);
        if !has_swapchain {
            debug!(adapter = %c_name(&properties.device_name), "Missing VK_KHR_swapchain");
            return false;
        }

        self.graphics_queue_family(instance, pd).is_some() && self.supports_timeline_semaphore(instance, pd)
    }

    fn release_adapter(&mut self, _adapter: VulkanAdapter) {
        // 物理设备归实例所有，无需释放
    }

    fn create_device(&mut self, adapter: &VulkanAdapter, info: &DeviceCreateInfo<'_>) -> NativeResult<VulkanDevice> {
        let state = self.instance_state("vkCreateDevice")?;
        let instance = &state.instance;
        let pd = adapter.physical_device;

        let properties = unsafe { instance.get_physical_device_properties(pd) };
        if feature_level_of(properties.api_version) < info.minimum_feature_level {
            return Err(vk_error("vkCreateDevice", vk::Result::ERROR_INCOMPATIBLE_DRIVER));
        }
        let queue_family_index = self
            .graphics_queue_family(instance, pd)
            .ok_or_else(|| vk_error("vkCreateDevice", vk::Result::ERROR_FEATURE_NOT_PRESENT))?;

        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities);
        let queue_infos = [queue_info.build()];

        let supported = unsafe { instance.get_physical_device_features(pd) };
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::builder().timeline_semaphore(true);

        let extension_ptrs = [khr::Swapchain::name().as_ptr()];
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features)
            .push_next(&mut vulkan12);

        let device = unsafe { instance.create_device(pd, &create_info, None) }
            .map_err(|e| vk_error("vkCreateDevice", e))?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(pd) };
        let swapchain_loader = khr::Swapchain::new(instance, &device);

        debug!(
            adapter = %c_name(&properties.device_name),
            queue_family_index,
            validation = info.validation,
            "Vulkan device created"
        );
        Ok(VulkanDevice {
            device,
            physical_device: pd,
            queue,
            queue_family_index,
            properties,
            memory_properties,
            swapchain_loader,
        })
    }

    fn set_device_name(&self, device: &VulkanDevice, name: &str) -> NativeResult<()> {
        self.set_object_name(device, device.device.handle(), name);
        Ok(())
    }

    fn install_message_filter(&self, _device: &VulkanDevice, filter: &MessageFilter) -> NativeResult<()> {
        let has_messenger = self
            .instance
            .as_ref()
            .map_or(false, |s| s.debug.is_some());
        if !has_messenger {
            return Err(NativeError::new(
                "vkCreateDebugUtilsMessengerEXT",
                0,
                NativeErrorKind::InterfaceUnavailable,
            ));
        }
        // Vulkan 没有按严重级别中断的机制，break_on 只在 D3D12 上生效
        self.messenger.install(filter);
        Ok(())
    }

    fn query_architecture(&self, device: &VulkanDevice) -> ArchitectureInfo {
        architecture_from_memory(&device.memory_properties)
    }

    fn query_limits(&self, device: &VulkanDevice) -> NativeResult<DeviceLimits> {
        Ok(limits_from_vk(&device.properties.limits))
    }

    fn wait_idle(&self, device: &VulkanDevice) -> NativeResult<()> {
        unsafe { device.device.device_wait_idle() }.map_err(|e| vk_error("vkDeviceWaitIdle", e))
    }

    fn destroy_device(&self, device: VulkanDevice) {
        unsafe {
            if let Err(e) = device.device.device_wait_idle() {
                warn!(error = ?e, "vkDeviceWaitIdle failed before device destruction");
            }
            device.device.destroy_device(None);
        }
        debug!("Vulkan device destroyed");
    }

    fn create_buffer(&self, device: &VulkanDevice, desc: &BufferDescriptor) -> NativeResult<VulkanBuffer> {
        let buffer = memory::create_buffer(&device.device, &device.memory_properties, desc)?;
        if let Some(label) = desc.label.as_deref() {
            self.set_object_name(device, buffer.buffer, label);
        }
        Ok(buffer)
    }

    fn destroy_buffer(&self, device: &VulkanDevice, buffer: VulkanBuffer) {
        memory::destroy_buffer(&device.device, buffer);
    }

    fn create_texture(&self, device: &VulkanDevice, desc: &TextureDescriptor) -> NativeResult<VulkanTexture> {
        let texture = memory::create_texture(&device.device, &device.memory_properties, desc)?;
        if let Some(label) = desc.label.as_deref() {
            self.set_object_name(device, texture.image, label);
        }
        Ok(texture)
    }

    fn destroy_texture(&self, device: &VulkanDevice, texture: VulkanTexture) {
        memory::destroy_texture(&device.device, texture);
    }

    fn create_swap_chain(&self, device: &VulkanDevice, desc: &SwapChainDescriptor) -> NativeResult<VulkanSwapChain> {
        let state = self.instance_state("vkCreateSwapchainKHR")?;
        let surface = surface::create_surface(&self.entry, &state.instance, &state.enabled_extensions, &desc.target)?;

        let context = self.swap_chain_context(device)?;
        surface::create_swap_chain(&context, surface, desc).map_err(|e| {
            unsafe { state.surface_loader.destroy_surface(surface, None) };
            e
        })
    }

    fn resize_swap_chain(
        &self,
        device: &VulkanDevice,
        swap_chain: &mut VulkanSwapChain,
        width: u32,
        height: u32,
    ) -> NativeResult<()> {
        let context = self.swap_chain_context(device)?;
        unsafe { surface::build_swapchain(&context, swap_chain, width, height) }
    }

    fn destroy_swap_chain(&self, device: &VulkanDevice, swap_chain: VulkanSwapChain) {
        unsafe {
            device.swapchain_loader.destroy_swapchain(swap_chain.swapchain, None);
            if let Some(state) = self.instance.as_ref() {
                state.surface_loader.destroy_surface(swap_chain.surface, None);
            }
        }
    }

    fn create_command_allocator(&self, device: &VulkanDevice) -> NativeResult<VulkanCommandAllocator> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(device.queue_family_index);

        unsafe {
            let pool = device
                .device
                .create_command_pool(&pool_info, None)
                .map_err(|e| vk_error("vkCreateCommandPool", e))?;
            let allocate_info = vk::CommandBufferAllocateInfo::builder()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffers = match device.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    device.device.destroy_command_pool(pool, None);
                    return Err(vk_error("vkAllocateCommandBuffers", e));
                }
            };
            Ok(VulkanCommandAllocator {
                pool,
                buffer: buffers[0],
            })
        }
    }

    fn begin_commands(&self, device: &VulkanDevice, allocator: &mut VulkanCommandAllocator) -> NativeResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.device.begin_command_buffer(allocator.buffer, &begin_info) }
            .map_err(|e| vk_error("vkBeginCommandBuffer", e))
    }

    fn end_commands(&self, device: &VulkanDevice, allocator: &mut VulkanCommandAllocator) -> NativeResult<()> {
        unsafe { device.device.end_command_buffer(allocator.buffer) }
            .map_err(|e| vk_error("vkEndCommandBuffer", e))
    }

    fn reset_command_allocator(
        &self,
        device: &VulkanDevice,
        allocator: &mut VulkanCommandAllocator,
    ) -> NativeResult<()> {
        unsafe {
            device
                .device
                .reset_command_pool(allocator.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| vk_error("vkResetCommandPool", e))
    }

    fn destroy_command_allocator(&self, device: &VulkanDevice, allocator: VulkanCommandAllocator) {
        unsafe { device.device.destroy_command_pool(allocator.pool, None) };
    }

    fn create_fence(&self, device: &VulkanDevice, initial_value: u64) -> NativeResult<VulkanFence> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        let semaphore = unsafe { device.device.create_semaphore(&create_info, None) }
            .map_err(|e| vk_error("vkCreateSemaphore", e))?;
        Ok(VulkanFence { semaphore })
    }

    fn submit(
        &self,
        device: &VulkanDevice,
        allocators: &[&VulkanCommandAllocator],
        fence: &VulkanFence,
        signal_value: u64,
    ) -> NativeResult<()> {
        let command_buffers: Vec<vk::CommandBuffer> = allocators.iter().map(|a| a.buffer).collect();
        let signal_values = [signal_value];
        let signal_semaphores = [fence.semaphore];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            device
                .device
                .queue_submit(device.queue, &[submit_info.build()], vk::Fence::null())
        }
        .map_err(|e| vk_error("vkQueueSubmit", e))
    }

    fn fence_completed_value(&self, device: &VulkanDevice, fence: &VulkanFence) -> NativeResult<u64> {
        unsafe { device.device.get_semaphore_counter_value(fence.semaphore) }
            .map_err(|e| vk_error("vkGetSemaphoreCounterValue", e))
    }

    fn wait_fence(&self, device: &VulkanDevice, fence: &VulkanFence, value: u64) -> NativeResult<()> {
        let semaphores = [fence.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { device.device.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(|e| vk_error("vkWaitSemaphores", e))
    }

    fn destroy_fence(&self, device: &VulkanDevice, fence: VulkanFence) {
        unsafe { device.device.destroy_semaphore(fence.semaphore, None) };
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        if let Some(state) = self.instance.take() {
            unsafe {
                if let Some((debug_utils, messenger)) = state.debug {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
                state.instance.destroy_instance(None);
            }
            debug!("Vulkan instance destroyed");
        }
    }
}
