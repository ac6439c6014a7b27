//! 统一类型与 D3D12 / DXGI 枚举之间的转换

use windows::core::HRESULT;
use windows::Win32::Foundation::{E_NOINTERFACE, E_OUTOFMEMORY};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::core::error::{NativeError, NativeErrorKind};
use crate::gfx::backend::FeatureLevel;
use crate::gfx::validation::{MessageId, MessageSeverity};
use crate::renderer::resource::{BufferUsage, MemoryType, TextureDimension, TextureFormat, TextureUsage};

/// 把失败的 HRESULT 归类为 [`NativeError`]
pub(super) fn hresult_error(call: &'static str, error: windows::core::Error) -> NativeError {
    let code: HRESULT = error.code();
    let kind = match code {
        DXGI_ERROR_SDK_COMPONENT_MISSING => NativeErrorKind::LayerUnavailable,
        E_NOINTERFACE => NativeErrorKind::InterfaceUnavailable,
        E_OUTOFMEMORY => NativeErrorKind::OutOfMemory,
        DXGI_ERROR_DEVICE_REMOVED | DXGI_ERROR_DEVICE_RESET | DXGI_ERROR_DEVICE_HUNG => {
            NativeErrorKind::DeviceLost
        }
        DXGI_ERROR_UNSUPPORTED => NativeErrorKind::Unsupported,
        _ => NativeErrorKind::Other,
    };
    // HRESULT 按无符号 32 位记录，和 SDK 文档中的写法一致
    NativeError::new(call, code.0 as u32 as i64, kind)
}

/// 设备创建时依次尝试的特性等级，从高到低
pub(super) const FEATURE_LEVELS: [D3D_FEATURE_LEVEL; 5] = [
    D3D_FEATURE_LEVEL_12_2,
    D3D_FEATURE_LEVEL_12_1,
    D3D_FEATURE_LEVEL_12_0,
    D3D_FEATURE_LEVEL_11_1,
    D3D_FEATURE_LEVEL_11_0,
];

/// `D3D_FEATURE_LEVEL_x_y` 的值是 `0xX000 | 0xY00`
pub(super) fn feature_level_to_d3d(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    D3D_FEATURE_LEVEL(((level.major << 12) | (level.minor << 8)) as i32)
}

pub(super) fn feature_level_from_d3d(level: D3D_FEATURE_LEVEL) -> FeatureLevel {
    let raw = level.0 as u32;
    FeatureLevel::new((raw >> 12) & 0xf, (raw >> 8) & 0xf)
}

pub(super) fn severity_to_d3d(severity: MessageSeverity) -> D3D12_MESSAGE_SEVERITY {
    match severity {
        MessageSeverity::Corruption => D3D12_MESSAGE_SEVERITY_CORRUPTION,
        MessageSeverity::Error => D3D12_MESSAGE_SEVERITY_ERROR,
        MessageSeverity::Warning => D3D12_MESSAGE_SEVERITY_WARNING,
        MessageSeverity::Message => D3D12_MESSAGE_SEVERITY_MESSAGE,
        MessageSeverity::Info => D3D12_MESSAGE_SEVERITY_INFO,
    }
}

pub(super) fn message_id_to_d3d(id: MessageId) -> D3D12_MESSAGE_ID {
    D3D12_MESSAGE_ID(id.0)
}

pub(super) fn format_to_dxgi(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::Rgba8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        TextureFormat::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        TextureFormat::Bgra8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        TextureFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        TextureFormat::R32Float => DXGI_FORMAT_R32_FLOAT,
        TextureFormat::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        TextureFormat::Depth24PlusStencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
        TextureFormat::Depth32Float => DXGI_FORMAT_D32_FLOAT,
    }
}

/// flip 模型交换链不接受 sRGB 格式，sRGB 只能体现在渲染目标视图上
pub(super) fn swap_chain_format(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Rgba8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::Bgra8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM,
        other => format_to_dxgi(other),
    }
}

/// 内存类型对应的堆类型和资源初始状态
pub(super) fn heap_for(memory_type: MemoryType) -> (D3D12_HEAP_TYPE, D3D12_RESOURCE_STATES) {
    match memory_type {
        MemoryType::DeviceLocal => (D3D12_HEAP_TYPE_DEFAULT, D3D12_RESOURCE_STATE_COMMON),
        MemoryType::HostVisible => (D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_STATE_GENERIC_READ),
        MemoryType::HostCached => (D3D12_HEAP_TYPE_READBACK, D3D12_RESOURCE_STATE_COPY_DEST),
    }
}

pub(super) fn buffer_flags(usage: BufferUsage) -> D3D12_RESOURCE_FLAGS {
    match usage {
        BufferUsage::Storage => D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
        _ => D3D12_RESOURCE_FLAG_NONE,
    }
}

pub(super) fn texture_flags(usage: TextureUsage) -> D3D12_RESOURCE_FLAGS {
    match usage {
        TextureUsage::Sampled => D3D12_RESOURCE_FLAG_NONE,
        TextureUsage::RenderTarget => D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
        TextureUsage::DepthStencil => D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
        TextureUsage::Storage => D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
    }
}

pub(super) fn texture_dimension(dimension: TextureDimension) -> D3D12_RESOURCE_DIMENSION {
    match dimension {
        TextureDimension::D1 => D3D12_RESOURCE_DIMENSION_TEXTURE1D,
        TextureDimension::D2 | TextureDimension::Cube => D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        TextureDimension::D3 => D3D12_RESOURCE_DIMENSION_TEXTURE3D,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_level_encoding() {
        assert_eq!(feature_level_to_d3d(FeatureLevel::new(11, 0)), D3D_FEATURE_LEVEL_11_0);
        assert_eq!(feature_level_to_d3d(FeatureLevel::new(12, 1)), D3D_FEATURE_LEVEL_12_1);
        for level in FEATURE_LEVELS {
            assert_eq!(feature_level_to_d3d(feature_level_from_d3d(level)), level);
        }
    }

    #[test]
    fn test_sdk_component_missing_is_layer_unavailable() {
        let error = hresult_error("CreateDXGIFactory2", DXGI_ERROR_SDK_COMPONENT_MISSING.into());
        assert_eq!(error.kind, NativeErrorKind::LayerUnavailable);
        assert_eq!(error.code, 0x887A002D);

        let error = hresult_error("D3D12CreateDevice", E_NOINTERFACE.into());
        assert_eq!(error.kind, NativeErrorKind::InterfaceUnavailable);
    }

    #[test]
    fn test_swap_chain_format_drops_srgb() {
        assert_eq!(swap_chain_format(TextureFormat::Bgra8Srgb), DXGI_FORMAT_B8G8R8A8_UNORM);
        assert_eq!(format_to_dxgi(TextureFormat::Bgra8Srgb), DXGI_FORMAT_B8G8R8A8_UNORM_SRGB);
    }

    #[test]
    fn test_heap_selection() {
        assert_eq!(heap_for(MemoryType::HostVisible).0, D3D12_HEAP_TYPE_UPLOAD);
        assert_eq!(heap_for(MemoryType::HostCached).1, D3D12_RESOURCE_STATE_COPY_DEST);
    }
}
