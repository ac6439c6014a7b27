//! 适配器枚举与筛选
//!
//! 一次枚举决定结果：按驱动顺序逐个打开适配器，第一个合格的被选中，
//! 被拒绝的句柄立即释放。软件适配器在这一轮中一律被拒绝，
//! 只有在配置允许软件回退、并且没有任何硬件适配器合格时才会被重新打开。

use std::fmt;

use tracing::{debug, info, warn};

use crate::core::config::PowerPreference;
use crate::core::error::{GraphicsError, NativeResult, Result};
use crate::gfx::backend::{AdapterCandidate, FeatureLevel, NativeDriver};

/// 打开的适配器：原生句柄 + 描述
#[derive(Debug)]
pub struct EnumeratedAdapter<H> {
    pub handle: H,
    pub candidate: AdapterCandidate,
}

/// 适配器枚举器
///
/// 惰性、有限、可重新开始。驱动返回 `Ok(None)` 时结束。
pub struct AdapterEnumerator<'d, D: NativeDriver> {
    driver: &'d mut D,
    preference: Option<PowerPreference>,
    next_index: u32,
    finished: bool,
}

impl<'d, D: NativeDriver> AdapterEnumerator<'d, D> {
    /// 创建枚举器
    ///
    /// 驱动不支持按偏好枚举时使用默认顺序。
    pub fn new(driver: &'d mut D, preference: PowerPreference) -> Self {
        let preference = if driver.supports_preference_enumeration() {
            Some(preference)
        } else {
            debug!(?preference, "Preference enumeration unavailable, using default adapter order");
            None
        };

        Self {
            driver,
            preference,
            next_index: 0,
            finished: false,
        }
    }

    /// 实际转交给驱动的偏好
    pub fn preference(&self) -> Option<PowerPreference> {
        self.preference
    }

    /// 从头开始重新枚举
    pub fn restart(&mut self) {
        self.next_index = 0;
        self.finished = false;
    }

    /// 按索引重新打开单个适配器
    pub fn adapter_at(&mut self, index: u32) -> NativeResult<Option<EnumeratedAdapter<D::Adapter>>> {
        Ok(self
            .driver
            .enumerate_adapter(index, self.preference)?
            .map(|(handle, candidate)| EnumeratedAdapter { handle, candidate }))
    }

    pub fn driver(&mut self) -> &mut D {
        self.driver
    }
}

impl<D: NativeDriver> Iterator for AdapterEnumerator<'_, D> {
    type Item = NativeResult<EnumeratedAdapter<D::Adapter>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.adapter_at(self.next_index) {
            Ok(Some(adapter)) => {
                self.next_index += 1;
                Some(Ok(adapter))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// 适配器被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// 软件光栅化适配器
    Software,
    /// 报告的特性等级低于要求
    FeatureLevel {
        required: FeatureLevel,
        reported: FeatureLevel,
    },
    /// 驱动探测失败（无法以要求的特性等级创建设备）
    ProbeFailed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Software => write!(f, "software adapter"),
            Rejection::FeatureLevel { required, reported } => {
                write!(f, "feature level {} below required {}", reported, required)
            }
            Rejection::ProbeFailed => write!(f, "device creation probe failed"),
        }
    }
}

/// 适配器合格性检查
#[derive(Debug, Clone, Copy)]
pub struct SuitabilityFilter {
    minimum: FeatureLevel,
}

impl SuitabilityFilter {
    pub fn new(minimum: FeatureLevel) -> Self {
        Self { minimum }
    }

    pub fn minimum(&self) -> FeatureLevel {
        self.minimum
    }

    /// 检查适配器是否合格
    ///
    /// 探测不会创建持久的设备。
    pub fn check<D: NativeDriver>(
        &self,
        driver: &mut D,
        adapter: &EnumeratedAdapter<D::Adapter>,
    ) -> std::result::Result<(), Rejection> {
        if adapter.candidate.is_software {
            return Err(Rejection::Software);
        }
        self.check_capability(driver, adapter)
    }

    pub fn is_suitable<D: NativeDriver>(
        &self,
        driver: &mut D,
        adapter: &EnumeratedAdapter<D::Adapter>,
    ) -> bool {
        self.check(driver, adapter).is_ok()
    }

    /// 不考虑软件标志，只检查特性等级
    fn check_capability<D: NativeDriver>(
        &self,
        driver: &mut D,
        adapter: &EnumeratedAdapter<D::Adapter>,
    ) -> std::result::Result<(), Rejection> {
        let reported = adapter.candidate.feature_level;
        if reported < self.minimum {
            return Err(Rejection::FeatureLevel {
                required: self.minimum,
                reported,
            });
        }
        if !driver.probe_adapter(&adapter.handle, self.minimum) {
            return Err(Rejection::ProbeFailed);
        }
        Ok(())
    }
}

/// 适配器选择参数
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest {
    pub minimum_feature_level: FeatureLevel,
    pub power_preference: PowerPreference,
    /// 没有合格的硬件适配器时是否使用软件适配器
    pub software_fallback: bool,
}

/// 选出第一个合格的适配器
///
/// 没有合格的适配器时返回 [`GraphicsError::UnsupportedPlatform`]，不会重试。
pub fn select_adapter<D: NativeDriver>(
    driver: &mut D,
    request: &AdapterRequest,
) -> Result<EnumeratedAdapter<D::Adapter>> {
    let filter = SuitabilityFilter::new(request.minimum_feature_level);
    let mut enumerator = AdapterEnumerator::new(driver, request.power_preference);
    let mut first_software = None;
    let mut examined = 0u32;

    while let Some(item) = enumerator.next() {
        let adapter = item?;
        examined += 1;

        match filter.check(enumerator.driver(), &adapter) {
            Ok(()) => {
                info!(
                    index = adapter.candidate.index,
                    name = %adapter.candidate.name,
                    feature_level = %adapter.candidate.feature_level,
                    "Adapter selected"
                );
                return Ok(adapter);
            }
            Err(rejection) => {
                debug!(
                    index = adapter.candidate.index,
                    name = %adapter.candidate.name,
                    reason = %rejection,
                    "Adapter rejected"
                );
                if rejection == Rejection::Software && first_software.is_none() {
                    first_software = Some(adapter.candidate.index);
                }
                enumerator.driver().release_adapter(adapter.handle);
            }
        }
    }

    if let Some(index) = first_software.filter(|_| request.software_fallback) {
        if let Some(adapter) = enumerator.adapter_at(index)? {
            match filter.check_capability(enumerator.driver(), &adapter) {
                Ok(()) => {
                    warn!(
                        name = %adapter.candidate.name,
                        "No hardware adapter qualified, falling back to software adapter"
                    );
                    return Ok(adapter);
                }
                Err(rejection) => {
                    debug!(reason = %rejection, "Software fallback adapter rejected");
                    enumerator.driver().release_adapter(adapter.handle);
                }
            }
        }
    }

    Err(GraphicsError::UnsupportedPlatform(format!(
        "none of {} adapter(s) supports feature level {}",
        examined, request.minimum_feature_level
    ))
    .into())
}
