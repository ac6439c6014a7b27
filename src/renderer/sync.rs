//! GPU 同步机制模块
//!
//! CPU 通过 Fence 等待 GPU 完成工作。每次提交分配一个新的、
//! 严格递增的 [`FenceValue`]，GPU 执行完毕后把 Fence 设为该值。
//!
//! - Vulkan：时间线信号量（Vulkan 1.2）
//! - DX12：`ID3D12Fence` + Win32 事件

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::error::Result;
use crate::gfx::backend::NativeDriver;
use crate::gfx::device::DeviceShared;

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
/// CPU可以等待GPU完成特定Fence值对应的工作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 还没有任何提交时的值
    pub const ZERO: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Fence
///
/// 信号值由 [`CommandQueue`](crate::renderer::command::CommandQueue) 在提交时分配。
pub struct Fence<D: NativeDriver> {
    device: Arc<DeviceShared<D>>,
    raw: ManuallyDrop<D::Fence>,
    /// CPU 侧最后分配出去的值
    last_signaled: AtomicU64,
}

impl<D: NativeDriver> Fence<D> {
    pub(crate) fn new(device: Arc<DeviceShared<D>>) -> Result<Self> {
        let raw = device.driver().create_fence(device.raw(), 0)?;
        Ok(Self {
            device,
            raw: ManuallyDrop::new(raw),
            last_signaled: AtomicU64::new(0),
        })
    }

    /// 分配下一个信号值
    pub(crate) fn next_value(&self) -> FenceValue {
        FenceValue::new(self.last_signaled.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// 最后一次分配出去的信号值
    pub fn last_signaled(&self) -> FenceValue {
        FenceValue::new(self.last_signaled.load(Ordering::Acquire))
    }

    /// GPU 已经完成的值
    pub fn completed_value(&self) -> Result<FenceValue> {
        let value = self
            .device
            .driver()
            .fence_completed_value(self.device.raw(), &self.raw)?;
        Ok(FenceValue::new(value))
    }

    pub fn is_completed(&self, value: FenceValue) -> Result<bool> {
        Ok(self.completed_value()? >= value)
    }

    /// 阻塞等待 GPU 完成 `value` 对应的工作
    pub fn wait(&self, value: FenceValue) -> Result<()> {
        if self.is_completed(value)? {
            return Ok(());
        }
        self.device
            .driver()
            .wait_fence(self.device.raw(), &self.raw, value.value())?;
        Ok(())
    }

    pub(crate) fn raw(&self) -> &D::Fence {
        &self.raw
    }
}

impl<D: NativeDriver> Drop for Fence<D> {
    fn drop(&mut self) {
        // SAFETY: raw 只在这里取出一次
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.device.driver().destroy_fence(self.device.raw(), raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::mock::{MockCall, MockDriver};

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.value(), 1);

        let next = fence.next();
        assert_eq!(next.value(), 2);
        assert_eq!(fence.value(), 1); // 原值不变
        assert_eq!(FenceValue::default(), FenceValue::ZERO);
    }

    #[test]
    fn test_fence_ordering() {
        let f1 = FenceValue::new(1);
        let f2 = FenceValue::new(2);
        let f3 = FenceValue::new(1);

        assert!(f1 < f2);
        assert!(f2 > f1);
        assert_eq!(f1, f3);
    }

    #[test]
    fn test_signal_values_strictly_increase() {
        let device = DeviceShared::for_tests(MockDriver::new());
        let fence = Fence::new(device).unwrap();

        let mut previous = fence.last_signaled();
        for _ in 0..16 {
            let value = fence.next_value();
            assert!(value > previous);
            previous = value;
        }
        assert_eq!(fence.last_signaled().value(), 16);
    }

    #[test]
    fn test_wait_skips_completed_values() {
        let driver = MockDriver::new();
        let log = driver.log();
        let device = DeviceShared::for_tests(driver);
        let fence = Fence::new(device).unwrap();

        fence.wait(FenceValue::ZERO).unwrap();
        assert_eq!(log.count(MockCall::WaitFence), 0);

        drop(fence);
        assert_eq!(log.count(MockCall::DestroyFence), 1);
    }
}
