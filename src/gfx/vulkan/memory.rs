//! Vulkan 缓冲区 / 图像的内存分配
//!
//! 每个资源独占一块 `VkDeviceMemory`，不做子分配。

use ash::vk;

use crate::core::error::{NativeError, NativeErrorKind, NativeResult};
use crate::renderer::resource::{
    BufferDescriptor, BufferUsage, MemoryType, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsage,
};

use super::driver::vk_error;

/// Vulkan 缓冲区
#[derive(Debug)]
pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
}

/// Vulkan 图像
#[derive(Debug)]
pub struct VulkanTexture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub format: vk::Format,
}

pub(super) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
    }
}

fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let transfer = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | transfer,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER | transfer,
        BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER | transfer,
        BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER | transfer,
        BufferUsage::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferUsage::ReadBack => vk::BufferUsageFlags::TRANSFER_DST,
    }
}

fn texture_usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let base = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC;
    match usage {
        TextureUsage::Sampled => vk::ImageUsageFlags::SAMPLED | base,
        TextureUsage::RenderTarget => {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED | base
        }
        TextureUsage::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        TextureUsage::Storage => vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED | base,
    }
}

/// 各内存类型按优先级排列的属性要求
fn memory_property_candidates(memory_type: MemoryType) -> &'static [vk::MemoryPropertyFlags] {
    const DEVICE_LOCAL: &[vk::MemoryPropertyFlags] = &[vk::MemoryPropertyFlags::DEVICE_LOCAL];
    const HOST_VISIBLE: &[vk::MemoryPropertyFlags] = &[vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    )];
    const HOST_CACHED: &[vk::MemoryPropertyFlags] = &[
        vk::MemoryPropertyFlags::from_raw(
            vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_CACHED.as_raw(),
        ),
        vk::MemoryPropertyFlags::HOST_VISIBLE,
    ];
    match memory_type {
        MemoryType::DeviceLocal => DEVICE_LOCAL,
        MemoryType::HostVisible => HOST_VISIBLE,
        MemoryType::HostCached => HOST_CACHED,
    }
}

/// 在 `type_bits` 允许的内存类型中查找满足 `flags` 的第一个
pub(super) fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0
            && properties.memory_types[i as usize].property_flags.contains(flags)
    })
}

fn allocate(
    device: &ash::Device,
    properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    memory_type: MemoryType,
) -> NativeResult<vk::DeviceMemory> {
    let type_index = memory_property_candidates(memory_type)
        .iter()
        .find_map(|flags| find_memory_type(properties, requirements.memory_type_bits, *flags))
        .ok_or_else(|| NativeError::new("vkAllocateMemory", 0, NativeErrorKind::Unsupported))?;

    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(type_index);
    unsafe { device.allocate_memory(&allocate_info, None) }.map_err(|e| vk_error("vkAllocateMemory", e))
}

pub(super) fn create_buffer(
    device: &ash::Device,
    properties: &vk::PhysicalDeviceMemoryProperties,
    desc: &BufferDescriptor,
) -> NativeResult<VulkanBuffer> {
    let size = desc.aligned_size().ok_or_else(|| NativeError::unsupported("vkCreateBuffer"))?;
    let create_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(buffer_usage_to_vk(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe {
        let buffer = device
            .create_buffer(&create_info, None)
            .map_err(|e| vk_error("vkCreateBuffer", e))?;
        let requirements = device.get_buffer_memory_requirements(buffer);

        let memory = match allocate(device, properties, requirements, desc.memory_type) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };
        if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
            return Err(vk_error("vkBindBufferMemory", e));
        }

        Ok(VulkanBuffer { buffer, memory, size })
    }
}

pub(super) fn destroy_buffer(device: &ash::Device, buffer: VulkanBuffer) {
    unsafe {
        device.destroy_buffer(buffer.buffer, None);
        device.free_memory(buffer.memory, None);
    }
}

pub(super) fn create_texture(
    device: &ash::Device,
    properties: &vk::PhysicalDeviceMemoryProperties,
    desc: &TextureDescriptor,
) -> NativeResult<VulkanTexture> {
    let (image_type, depth, layers, flags) = match desc.dimension {
        TextureDimension::D1 => (vk::ImageType::TYPE_1D, 1, desc.depth_or_array_layers, vk::ImageCreateFlags::empty()),
        TextureDimension::D2 => (vk::ImageType::TYPE_2D, 1, desc.depth_or_array_layers, vk::ImageCreateFlags::empty()),
        TextureDimension::D3 => (vk::ImageType::TYPE_3D, desc.depth_or_array_layers, 1, vk::ImageCreateFlags::empty()),
        TextureDimension::Cube => (
            vk::ImageType::TYPE_2D,
            1,
            desc.depth_or_array_layers,
            vk::ImageCreateFlags::CUBE_COMPATIBLE,
        ),
    };
    let format = format_to_vk(desc.format);

    let create_info = vk::ImageCreateInfo::builder()
        .flags(flags)
        .image_type(image_type)
        .format(format)
        .extent(vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth,
        })
        .mip_levels(desc.mip_levels)
        .array_layers(layers)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(texture_usage_to_vk(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    unsafe {
        let image = device
            .create_image(&create_info, None)
            .map_err(|e| vk_error("vkCreateImage", e))?;
        let requirements = device.get_image_memory_requirements(image);

        let memory = match allocate(device, properties, requirements, MemoryType::DeviceLocal) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_image(image, None);
                return Err(e);
            }
        };
        if let Err(e) = device.bind_image_memory(image, memory, 0) {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
            return Err(vk_error("vkBindImageMemory", e));
        }

        Ok(VulkanTexture { image, memory, format })
    }
}

pub(super) fn destroy_texture(device: &ash::Device, texture: VulkanTexture) {
    unsafe {
        device.destroy_image(texture.image, None);
        device.free_memory(texture.memory, None);
    }
}
