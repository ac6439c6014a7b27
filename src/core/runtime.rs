use std::sync::OnceLock;

use tracing::debug;

use crate::core::config::GraphicsBackend;
use crate::gfx::vulkan::VulkanDriver;

static VULKAN_SUPPORTED: OnceLock<bool> = OnceLock::new();
static DX12_SUPPORTED: OnceLock<bool> = OnceLock::new();

/// 当前进程能否使用指定后端
///
/// 第一次调用时探测一次原生运行库，之后永久缓存结果。
pub fn is_backend_supported(backend: GraphicsBackend) -> bool {
    let cell = match backend {
        GraphicsBackend::Vulkan => &VULKAN_SUPPORTED,
        GraphicsBackend::Dx12 => &DX12_SUPPORTED,
    };

    *cell.get_or_init(|| {
        let supported = probe_backend(backend);
        debug!(backend = backend.name(), supported, "Backend support probed");
        supported
    })
}

/// 按优先级列出当前进程可用的后端
pub fn supported_backends() -> Vec<GraphicsBackend> {
    [GraphicsBackend::Dx12, GraphicsBackend::Vulkan]
        .into_iter()
        .filter(|backend| is_backend_supported(*backend))
        .collect()
}

fn probe_backend(backend: GraphicsBackend) -> bool {
    match backend {
        GraphicsBackend::Vulkan => VulkanDriver::probe_support(),
        #[cfg(target_os = "windows")]
        GraphicsBackend::Dx12 => crate::gfx::dx12::Dx12Driver::probe_support(),
        #[cfg(not(target_os = "windows"))]
        GraphicsBackend::Dx12 => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_is_memoized() {
        let first = is_backend_supported(GraphicsBackend::Dx12);
        let second = is_backend_supported(GraphicsBackend::Dx12);
        assert_eq!(first, second);
        assert_eq!(DX12_SUPPORTED.get().copied(), Some(first));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_dx12_unsupported_off_windows() {
        assert!(!is_backend_supported(GraphicsBackend::Dx12));
        assert!(!supported_backends().contains(&GraphicsBackend::Dx12));
    }
}
