//! 命令缓冲区管理模块
//!
//! - [`CommandPool`]：命令分配器池。提交后的分配器带着 Fence 值回到池中，
//!   GPU 完成该值之后才会被重置并再次借出。
//! - [`CommandBuffer`]：从池中借出的分配器 + 记录状态机。
//! - [`CommandQueue`]：提交命令并分配 Fence 值。
//!
//! 池的借出 / 归还持有池自己的互斥锁，队列提交持有设备共享的队列锁，
//! 任何调用路径都不会同时持有两把。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use crate::core::error::{DistDeviceError, GraphicsError, Result};
use crate::gfx::backend::NativeDriver;
use crate::gfx::device::DeviceShared;
use crate::renderer::sync::{Fence, FenceValue};

/// 命令缓冲区状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// 初始状态
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录
    Executable,
    /// 已提交，分配器已经归还给池
    Submitted,
}

fn lock_poisoned<T>(_: PoisonError<T>) -> DistDeviceError {
    GraphicsError::CommandExecution("Command lock poisoned".to_string()).into()
}

/// 等待 GPU 完成后才能复用的分配器
struct RetiredAllocator<A> {
    raw: A,
    fence_value: FenceValue,
}

struct PoolShared<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    fence: Arc<Fence<D>>,
    retired: Mutex<Vec<RetiredAllocator<D::CommandAllocator>>>,
    created: AtomicUsize,
}

impl<D: NativeDriver> PoolShared<D> {
    fn retire(&self, raw: D::CommandAllocator, fence_value: FenceValue) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.push(RetiredAllocator { raw, fence_value });
    }
}

impl<D: NativeDriver> Drop for PoolShared<D> {
    fn drop(&mut self) {
        let retired = self.retired.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in retired.drain(..) {
            self.device
                .driver()
                .destroy_command_allocator(self.device.raw(), entry.raw);
        }
    }
}

/// 命令分配器池
///
/// 类似于 CommandAllocator（DX12）或 CommandPool（Vulkan）的复用池。
pub struct CommandPool<D: NativeDriver> {
    shared: Arc<PoolShared<D>>,
}

impl<D: NativeDriver> CommandPool<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>, fence: Arc<Fence<D>>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                device,
                fence,
                retired: Mutex::new(Vec::new()),
                created: AtomicUsize::new(0),
            }),
        }
    }

    /// 借出一个处于记录状态的命令缓冲区
    ///
    /// 优先复用 GPU 已经执行完毕的分配器，没有时创建新的。
    pub fn rent(&self) -> Result<CommandBuffer<D>> {
        let shared = &self.shared;
        shared.device.ensure_alive()?;

        let completed = shared.fence.completed_value()?;
        let reusable = {
            let mut retired = shared.retired.lock().map_err(lock_poisoned)?;
            let index = retired
                .iter()
                .position(|entry| entry.fence_value <= completed);
            index.map(|index| retired.swap_remove(index).raw)
        };

        let driver = shared.device.driver();
        let raw = match reusable {
            Some(mut raw) => {
                if let Err(e) = driver.reset_command_allocator(shared.device.raw(), &mut raw) {
                    driver.destroy_command_allocator(shared.device.raw(), raw);
                    return Err(e.into());
                }
                trace!("Reusing command allocator");
                raw
            }
            None => {
                let raw = driver.create_command_allocator(shared.device.raw())?;
                let total = shared.created.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(total, "Created command allocator");
                raw
            }
        };

        let mut buffer = CommandBuffer {
            pool: Arc::clone(shared),
            raw: Some(raw),
            state: CommandBufferState::Initial,
        };
        buffer.begin()?;
        Ok(buffer)
    }

    /// 池创建过的分配器总数
    pub fn allocator_count(&self) -> usize {
        self.shared.created.load(Ordering::Relaxed)
    }

    /// 当前在池中等待复用的分配器数量
    pub fn retired_count(&self) -> Result<usize> {
        Ok(self.shared.retired.lock().map_err(lock_poisoned)?.len())
    }
}

/// 命令缓冲区
///
/// 丢弃一个未提交的命令缓冲区会把分配器直接还给池。
pub struct CommandBuffer<D: NativeDriver> {
    pool: Arc<PoolShared<D>>,
    raw: Option<D::CommandAllocator>,
    state: CommandBufferState,
}

impl<D: NativeDriver> CommandBuffer<D> {
    /// 获取当前状态
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn raw(&self) -> Option<&D::CommandAllocator> {
        self.raw.as_ref()
    }

    pub fn raw_mut(&mut self) -> Option<&mut D::CommandAllocator> {
        self.raw.as_mut()
    }

    /// 开始记录命令
    pub fn begin(&mut self) -> Result<()> {
        match (self.state, self.raw.as_mut()) {
            (CommandBufferState::Initial | CommandBufferState::Executable, Some(raw)) => {
                let device = &self.pool.device;
                device.driver().begin_commands(device.raw(), raw)?;
                self.state = CommandBufferState::Recording;
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Cannot begin recording in state {:?}",
                self.state
            ))
            .into()),
        }
    }

    /// 结束记录命令
    pub fn end(&mut self) -> Result<()> {
        match (self.state, self.raw.as_mut()) {
            (CommandBufferState::Recording, Some(raw)) => {
                let device = &self.pool.device;
                device.driver().end_commands(device.raw(), raw)?;
                self.state = CommandBufferState::Executable;
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Cannot end recording in state {:?}",
                self.state
            ))
            .into()),
        }
    }

    /// 提交后把分配器带着 Fence 值还给池
    fn retire(&mut self, fence_value: FenceValue) {
        if let Some(raw) = self.raw.take() {
            self.pool.retire(raw, fence_value);
        }
        self.state = CommandBufferState::Submitted;
    }
}

impl<D: NativeDriver> Drop for CommandBuffer<D> {
    fn drop(&mut self) {
        if self.state == CommandBufferState::Recording {
            if let Err(e) = self.end() {
                warn!(error = %e, "Failed to close a dropped command buffer");
            }
        }
        self.retire(FenceValue::ZERO);
    }
}

/// 命令队列
pub struct CommandQueue<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    fence: Arc<Fence<D>>,
}

impl<D: NativeDriver> CommandQueue<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>, fence: Arc<Fence<D>>) -> Self {
        Self { device, fence }
    }

    /// 提交命令缓冲区，返回本次提交的 Fence 值
    ///
    /// 仍在记录中的缓冲区会先结束记录。
    pub fn submit(&self, mut buffer: CommandBuffer<D>) -> Result<FenceValue> {
        self.device.ensure_alive()?;

        if buffer.state == CommandBufferState::Recording {
            buffer.end()?;
        }
        let raw = match (buffer.state, buffer.raw.as_ref()) {
            (CommandBufferState::Executable, Some(raw)) => raw,
            _ => {
                return Err(GraphicsError::CommandExecution(format!(
                    "Cannot submit a command buffer in state {:?}",
                    buffer.state
                ))
                .into())
            }
        };

        let value = self.submit_raw(&[raw])?;
        buffer.retire(value);
        Ok(value)
    }

    /// 不带命令，只让队列在当前位置发出信号
    pub fn signal(&self) -> Result<FenceValue> {
        self.device.ensure_alive()?;
        self.submit_raw(&[])
    }

    fn submit_raw(&self, allocators: &[&D::CommandAllocator]) -> Result<FenceValue> {
        let _guard = self.device.lock_queue()?;
        let value = self.fence.next_value();
        self.device
            .driver()
            .submit(self.device.raw(), allocators, self.fence.raw(), value.value())?;
        trace!(fence_value = value.value(), commands = allocators.len(), "Submitted");
        Ok(value)
    }

    /// 阻塞等待 `value` 完成
    pub fn wait(&self, value: FenceValue) -> Result<()> {
        self.fence.wait(value)
    }

    /// 等待队列中所有已提交的工作完成
    pub fn flush(&self) -> Result<()> {
        let value = self.signal()?;
        self.wait(value)
    }

    /// 持有队列锁调用驱动的设备空闲等待（Vulkan 要求此时队列没有并发访问）
    pub(crate) fn wait_device_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    pub fn fence(&self) -> &Fence<D> {
        &self.fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::mock::{MockCall, MockDriver};

    fn setup(driver: MockDriver) -> (CommandPool<MockDriver>, CommandQueue<MockDriver>) {
        let device = DeviceShared::for_tests(driver);
        let fence = Arc::new(Fence::new(Arc::clone(&device)).unwrap());
        let pool = CommandPool::new(Arc::clone(&device), Arc::clone(&fence));
        let queue = CommandQueue::new(device, fence);
        (pool, queue)
    }

    #[test]
    fn test_rented_buffer_is_recording() {
        let (pool, _queue) = setup(MockDriver::new());
        let buffer = pool.rent().unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Recording);
    }

    #[test]
    fn test_command_buffer_state_machine() {
        let (pool, _queue) = setup(MockDriver::new());
        let mut buffer = pool.rent().unwrap();

        // 不能重复开始
        assert!(buffer.begin().is_err());

        buffer.end().unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Executable);
        assert!(buffer.end().is_err());

        // 已完成记录的缓冲区可以重新开始
        buffer.begin().unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Recording);
    }

    #[test]
    fn test_completed_allocator_is_reused() {
        let driver = MockDriver::new();
        let log = driver.log();
        let (pool, queue) = setup(driver);

        let value = queue.submit(pool.rent().unwrap()).unwrap();
        queue.wait(value).unwrap();

        let _buffer = pool.rent().unwrap();
        assert_eq!(pool.allocator_count(), 1);
        assert_eq!(log.count(MockCall::CreateCommandAllocator), 1);
        assert_eq!(log.count(MockCall::ResetCommandAllocator), 1);
    }

    #[test]
    fn test_in_flight_allocator_is_not_reused() {
        let driver = MockDriver::new().with_deferred_completion();
        let (pool, queue) = setup(driver);

        let first = queue.submit(pool.rent().unwrap()).unwrap();
        let _second = pool.rent().unwrap();
        assert_eq!(pool.allocator_count(), 2);

        queue.wait(first).unwrap();
        let _third = pool.rent().unwrap();
        assert_eq!(pool.allocator_count(), 2);
    }

    #[test]
    fn test_dropped_buffer_returns_to_pool() {
        let (pool, _queue) = setup(MockDriver::new());
        drop(pool.rent().unwrap());
        assert_eq!(pool.retired_count().unwrap(), 1);

        let _buffer = pool.rent().unwrap();
        assert_eq!(pool.allocator_count(), 1);
        assert_eq!(pool.retired_count().unwrap(), 0);
    }

    #[test]
    fn test_dropped_buffer_returns_to_pool_when_end_fails() {
        let driver = MockDriver::new().failing_end_commands();
        let log = driver.log();
        let (pool, _queue) = setup(driver);

        drop(pool.rent().unwrap());
        assert_eq!(log.count(MockCall::EndCommands), 1);
        assert_eq!(pool.retired_count().unwrap(), 1);
    }

    #[test]
    fn test_submit_values_increase() {
        let (pool, queue) = setup(MockDriver::new());

        let a = queue.submit(pool.rent().unwrap()).unwrap();
        let b = queue.signal().unwrap();
        let c = queue.submit(pool.rent().unwrap()).unwrap();
        assert!(a < b && b < c);

        queue.flush().unwrap();
        assert!(queue.fence().is_completed(c).unwrap());
    }

    #[test]
    fn test_pool_destroys_allocators() {
        let driver = MockDriver::new();
        let log = driver.log();
        let (pool, queue) = setup(driver);

        let first = pool.rent().unwrap();
        let second = pool.rent().unwrap();
        queue.submit(first).unwrap();
        drop(second);
        drop(pool);

        assert_eq!(log.count(MockCall::DestroyCommandAllocator), 2);
    }
}
