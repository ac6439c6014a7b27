//! Vulkan surface 与交换链
//!
//! surface 直接由窗口的原始句柄创建，支持 Xlib、Wayland 和 Win32。

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::debug;

use crate::core::error::{NativeError, NativeErrorKind, NativeResult};
use crate::renderer::resource::{PresentMode, SurfaceTarget, SwapChainDescriptor};

use super::driver::vk_error;
use super::memory::format_to_vk;

/// Vulkan 交换链及其 surface
pub struct VulkanSwapChain {
    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    min_image_count: u32,
}

/// 根据窗口句柄创建 surface
///
/// # 参数
///
/// * `enabled` - 实例上实际启用的扩展，对应平台的 surface 扩展必须在其中
pub(super) fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    enabled: &[String],
    target: &SurfaceTarget,
) -> NativeResult<vk::SurfaceKHR> {
    let require = |name: &str, call: &'static str| {
        if enabled.iter().any(|e| e == name) {
            Ok(())
        } else {
            Err(NativeError::new(call, 0, NativeErrorKind::InterfaceUnavailable))
        }
    };

    match (target.display, target.window) {
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            require("VK_KHR_xlib_surface", "vkCreateXlibSurfaceKHR")?;
            let dpy = display
                .display
                .ok_or_else(|| NativeError::unsupported("vkCreateXlibSurfaceKHR"))?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut vk::Display)
                .window(window.window);
            let loader = khr::XlibSurface::new(entry, instance);
            unsafe { loader.create_xlib_surface(&create_info, None) }
                .map_err(|e| vk_error("vkCreateXlibSurfaceKHR", e))
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            require("VK_KHR_wayland_surface", "vkCreateWaylandSurfaceKHR")?;
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());
            let loader = khr::WaylandSurface::new(entry, instance);
            unsafe { loader.create_wayland_surface(&create_info, None) }
                .map_err(|e| vk_error("vkCreateWaylandSurfaceKHR", e))
        }
        (_, RawWindowHandle::Win32(window)) => {
            require("VK_KHR_win32_surface", "vkCreateWin32SurfaceKHR")?;
            let hinstance = window
                .hinstance
                .map_or(std::ptr::null(), |h| h.get() as *const std::ffi::c_void);
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(window.hwnd.get() as *const std::ffi::c_void);
            let loader = khr::Win32Surface::new(entry, instance);
            unsafe { loader.create_win32_surface(&create_info, None) }
                .map_err(|e| vk_error("vkCreateWin32SurfaceKHR", e))
        }
        _ => Err(NativeError::unsupported("vkCreateSurfaceKHR")),
    }
}

fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
    }
}

/// 选择 surface 格式：优先请求的格式，否则取第一个
pub(super) fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    requested: vk::Format,
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| f.format == requested && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| available.first().copied())
}

/// 选择呈现模式：不支持请求的模式时回退到总是可用的 FIFO
pub(super) fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// surface 给出固定尺寸时必须使用它，否则把请求尺寸夹到允许范围内
pub(super) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub(super) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// 交换链创建所需的设备端上下文
pub(super) struct SwapChainContext<'a> {
    pub surface_loader: &'a khr::Surface,
    pub swapchain_loader: &'a khr::Swapchain,
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
}

pub(super) fn create_swap_chain(
    context: &SwapChainContext<'_>,
    surface: vk::SurfaceKHR,
    desc: &SwapChainDescriptor,
) -> NativeResult<VulkanSwapChain> {
    let loader = context.surface_loader;
    let physical_device = context.physical_device;

    unsafe {
        let supported = loader
            .get_physical_device_surface_support(physical_device, context.queue_family_index, surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceSupportKHR", e))?;
        if !supported {
            return Err(NativeError::unsupported("vkGetPhysicalDeviceSurfaceSupportKHR"));
        }

        let caps = loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
        let formats = loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;
        let present_modes = loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_err(|e| vk_error("vkGetPhysicalDeviceSurfacePresentModesKHR", e))?;

        let format = choose_surface_format(&formats, format_to_vk(desc.format))
            .ok_or_else(|| NativeError::unsupported("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        let present_mode = choose_present_mode(&present_modes, present_mode_to_vk(desc.present_mode));
        let min_image_count = choose_image_count(&caps, desc.buffer_count);

        let mut swap_chain = VulkanSwapChain {
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format,
            present_mode,
            extent: vk::Extent2D::default(),
            min_image_count,
        };
        build_swapchain(context, &mut swap_chain, desc.width, desc.height)?;

        debug!(
            width = swap_chain.extent.width,
            height = swap_chain.extent.height,
            images = swap_chain.images.len(),
            present_mode = ?present_mode,
            "Vulkan swapchain created"
        );
        Ok(swap_chain)
    }
}

/// 创建（或重建）交换链；旧的交换链在新交换链创建成功后销毁
pub(super) unsafe fn build_swapchain(
    context: &SwapChainContext<'_>,
    swap_chain: &mut VulkanSwapChain,
    width: u32,
    height: u32,
) -> NativeResult<()> {
    let caps = context
        .surface_loader
        .get_physical_device_surface_capabilities(context.physical_device, swap_chain.surface)
        .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
    let extent = choose_extent(&caps, width, height);

    let create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(swap_chain.surface)
        .min_image_count(swap_chain.min_image_count)
        .image_format(swap_chain.format.format)
        .image_color_space(swap_chain.format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(swap_chain.present_mode)
        .clipped(true)
        .old_swapchain(swap_chain.swapchain);

    let swapchain = context
        .swapchain_loader
        .create_swapchain(&create_info, None)
        .map_err(|e| vk_error("vkCreateSwapchainKHR", e))?;
    let images = match context.swapchain_loader.get_swapchain_images(swapchain) {
        Ok(images) => images,
        Err(e) => {
            context.swapchain_loader.destroy_swapchain(swapchain, None);
            return Err(vk_error("vkGetSwapchainImagesKHR", e));
        }
    };

    if swap_chain.swapchain != vk::SwapchainKHR::null() {
        context
            .swapchain_loader
            .destroy_swapchain(swap_chain.swapchain, None);
    }
    swap_chain.swapchain = swapchain;
    swap_chain.images = images;
    swap_chain.extent = extent;
    Ok(())
}
