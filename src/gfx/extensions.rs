//! 实例扩展 / 层的解析
//!
//! 输入是驱动报告的可用扩展，输出是本次实际请求的扩展子集。
//! 这是一个纯函数：没有副作用，结果顺序确定。
//!
//! 顺序规则：
//! 1. 必需扩展（缺失即致命错误，例如 `VK_KHR_surface`）
//! 2. 可选扩展中存在的部分（例如各平台的 surface 扩展、`VK_EXT_debug_utils`）
//! 3. 仅在请求验证时才加入的扩展（例如 `VK_EXT_validation_features`）

use tracing::debug;

use crate::core::error::{GraphicsError, Result};

/// 后端希望请求的扩展
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionRequest {
    /// 必需扩展，缺失时设备创建失败
    pub required: Vec<&'static str>,
    /// 存在时才请求
    pub optional: Vec<&'static str>,
    /// 仅在启用验证时、且存在时才请求
    pub validation: Vec<&'static str>,
}

impl ExtensionRequest {
    /// 不请求任何扩展（D3D 通过接口查询而不是扩展名协商能力）
    pub fn none() -> Self {
        Self::default()
    }
}

/// 解析后的扩展集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    names: Vec<String>,
}

impl ExtensionSet {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn push_unique(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }
}

/// 根据可用扩展解析出要请求的扩展
///
/// 可用列表为空本身不是错误；只有必需扩展缺失才返回
/// [`GraphicsError::UnsupportedPlatform`]。
pub fn resolve_extensions(
    request: &ExtensionRequest,
    available: &[String],
    validation_requested: bool,
) -> Result<ExtensionSet> {
    let is_available = |name: &str| available.iter().any(|a| a == name);
    let mut set = ExtensionSet::default();

    for name in &request.required {
        if !is_available(*name) {
            return Err(GraphicsError::UnsupportedPlatform(format!(
                "required extension {} is not available",
                name
            ))
            .into());
        }
        set.push_unique(name);
    }

    for name in &request.optional {
        if is_available(*name) {
            set.push_unique(name);
        } else {
            debug!(extension = *name, "Optional extension not available");
        }
    }

    if validation_requested {
        for name in &request.validation {
            if is_available(*name) {
                set.push_unique(name);
            } else {
                debug!(extension = *name, "Validation extension not available");
            }
        }
    }

    Ok(set)
}
