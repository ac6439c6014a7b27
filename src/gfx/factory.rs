//! 实例与逻辑设备的创建
//!
//! 验证层缺失（`NativeErrorKind::LayerUnavailable`）是唯一可以恢复的失败：
//! 关闭验证后重试一次。一次设备创建流程中这个回退只能发生一次，
//! 实例创建和设备创建共用同一个回退机会。

use tracing::{info, warn};

use crate::core::error::{GraphicsError, NativeError, Result};
use crate::gfx::backend::{DeviceCreateInfo, FeatureLevel, InstanceCreateInfo, NativeDriver};
use crate::gfx::extensions::ExtensionSet;
use crate::gfx::validation::ValidationState;

/// 创建实例
///
/// 缺少验证层时关闭验证并重试一次。
pub fn create_instance<D: NativeDriver>(
    driver: &mut D,
    extensions: &ExtensionSet,
    validation: &mut ValidationState,
) -> Result<()> {
    let attempt = |driver: &mut D, validation: &ValidationState| {
        driver.create_instance(&InstanceCreateInfo {
            extensions: extensions.names(),
            validation: validation.is_active(),
            gpu_validation: validation.gpu_active(),
        })
    };

    if let Err(e) = attempt(driver, validation) {
        if !retry_without_validation(&e, validation) {
            return Err(GraphicsError::NativeCall(e).into());
        }
        attempt(driver, validation).map_err(GraphicsError::NativeCall)?;
    }
    Ok(())
}

/// 在选中的适配器上创建逻辑设备
///
/// 成功后设置调试名称；改名失败只记录警告。
pub fn create_logical_device<D: NativeDriver>(
    driver: &mut D,
    adapter: &D::Adapter,
    validation: &mut ValidationState,
    minimum_feature_level: FeatureLevel,
    label: &str,
) -> Result<D::Device> {
    let attempt = |driver: &mut D, validation: &ValidationState| {
        driver.create_device(
            adapter,
            &DeviceCreateInfo {
                minimum_feature_level,
                validation: validation.is_active(),
                label,
            },
        )
    };

    let device = match attempt(driver, validation) {
        Ok(device) => device,
        Err(e) => {
            if !retry_without_validation(&e, validation) {
                return Err(GraphicsError::NativeCall(e).into());
            }
            attempt(driver, validation).map_err(GraphicsError::NativeCall)?
        }
    };

    if let Err(e) = driver.set_device_name(&device, label) {
        warn!(error = %e, label, "Failed to set device debug name");
    }

    info!(label, validation = validation.is_active(), "Logical device created");
    Ok(device)
}

/// 判断是否关闭验证后重试；会消耗本次流程唯一的回退机会
fn retry_without_validation(error: &NativeError, validation: &mut ValidationState) -> bool {
    if !error.is_layer_unavailable() || !validation.fall_back() {
        return false;
    }
    warn!(call = error.call, "Validation layer unavailable, retrying without validation");
    true
}
