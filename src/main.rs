//! DistDevice 设备探测程序
//!
//! 按配置完成一次设备协商，并把选中的适配器和能力快照写入日志。
//! 加上 `--window` 时会打开一个窗口，创建交换链并跟随窗口尺寸调整。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # DirectX 12 + GPU 辅助验证
//! cargo run -- --dx12 --validation gpu
//!
//! # 打开窗口测试交换链
//! cargo run -- --window
//! ```

use anyhow::{bail, Context};
use tracing::{debug, error, info};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

use dist_device::core::runtime::is_backend_supported;
use dist_device::core::{log, Config, GraphicsBackend};
use dist_device::gfx::{GraphicsDevice, NativeDriver, VulkanDriver};
use dist_device::renderer::{PresentMode, SurfaceTarget, SwapChainDescriptor};

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 初始化日志系统
/// 4. 创建图形设备并输出能力
/// 5. 可选：打开窗口并创建交换链
fn main() -> anyhow::Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    let args: Vec<String> = std::env::args().collect();
    config.apply_args(args.iter().cloned());
    let window_mode = args.iter().any(|a| a == "--window");

    config.validate().context("Invalid configuration")?;

    // 3. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "DistDevice starting");

    let backend = config.device.backend;
    if !is_backend_supported(backend) {
        bail!("{} is not available on this system", backend.name());
    }

    // 4. 按后端创建驱动
    match backend {
        GraphicsBackend::Vulkan => run(VulkanDriver::new()?, &config, window_mode),
        #[cfg(target_os = "windows")]
        GraphicsBackend::Dx12 => run(dist_device::gfx::Dx12Driver::new(), &config, window_mode),
        #[cfg(not(target_os = "windows"))]
        GraphicsBackend::Dx12 => bail!("DirectX 12 is only available on Windows"),
    }
}

fn run<D: NativeDriver>(driver: D, config: &Config, window_mode: bool) -> anyhow::Result<()> {
    let mut device = GraphicsDevice::new(driver, &config.device).context("Device creation failed")?;

    let capabilities = device.capabilities();
    let limits = capabilities.limits();
    info!(
        backend = device.backend().name(),
        adapter = %capabilities.adapter(),
        validation = ?device.validation().mode(),
        validation_active = device.validation().is_active(),
        extensions = device.extensions().len(),
        "Device ready"
    );
    info!(
        max_texture_2d = limits.max_texture_dimension_2d,
        max_array_layers = limits.max_texture_array_layers,
        max_color_attachments = limits.max_color_attachments,
        uniform_alignment = limits.min_uniform_buffer_offset_alignment,
        uma = ?capabilities.architecture().uma,
        "Device limits"
    );

    // 提交一个空命令缓冲区，确认队列和围栏可用
    let commands = device.command_pool()?.rent()?;
    let value = device.queue()?.submit(commands)?;
    device.queue()?.wait(value)?;
    debug!(fence = value.value(), "Empty submission completed");

    if window_mode {
        run_window(&device, config)?;
    }

    device.destroy();
    info!("DistDevice shut down");
    Ok(())
}

/// 打开窗口并在其上创建交换链，窗口关闭时返回
fn run_window<D: NativeDriver>(device: &GraphicsDevice<D>, config: &Config) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(format!("DistDevice [{}]", device.backend().name()))
        .with_inner_size(PhysicalSize::new(config.swapchain.width, config.swapchain.height))
        .build(&event_loop)?;

    let size = window.inner_size();
    let mut swap_chain = device.create_swap_chain(&SwapChainDescriptor {
        width: size.width,
        height: size.height,
        format: config.swapchain.format,
        buffer_count: config.swapchain.buffer_count,
        present_mode: PresentMode::from_vsync(config.swapchain.vsync),
        target: SurfaceTarget::from_window(&window)?,
    })?;
    info!(
        width = size.width,
        height = size.height,
        present_mode = ?swap_chain.present_mode(),
        "Swap chain ready"
    );

    event_loop.run(move |event, target| {
        if let Event::WindowEvent { event, .. } = event {
            match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested, shutting down...");
                    if let Err(e) = device.wait_idle() {
                        error!("Failed to wait for the device: {}", e);
                    }
                    target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    debug!(width = new_size.width, height = new_size.height, "Window resized");
                    if let Err(e) = swap_chain.resize(new_size.width, new_size.height) {
                        error!("Swap chain resize failed: {}", e);
                        target.exit();
                    }
                }
                _ => (),
            }
        }
    })?;
    Ok(())
}
