//! 设备能力快照
//!
//! 逻辑设备创建成功之后只计算一次，之后只读。
//! 一部分信息（例如 D3D12 的 UMA 架构）只能在活动设备上查询，
//! 所以快照绝不会在设备创建之前生成。

use std::fmt;

use crate::gfx::backend::{AdapterCandidate, AdapterType, ArchitectureInfo, FeatureLevel};

/// 设备限制
///
/// 字段固定，所有后端都填充同一组数值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_dimension_cube: u32,
    pub max_texture_array_layers: u32,
    pub max_color_attachments: u32,
    /// 常量 / uniform 缓冲区偏移对齐
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    /// 缓冲区 <-> 纹理拷贝的行对齐
    pub buffer_copy_row_pitch_alignment: u64,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_invocations_per_workgroup: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_sampler_anisotropy: u32,
}

impl DeviceLimits {
    /// D3D12 硬件特性等级 11.0 以上保证的限制
    pub const D3D12: DeviceLimits = DeviceLimits {
        max_texture_dimension_1d: 16384,
        max_texture_dimension_2d: 16384,
        max_texture_dimension_3d: 2048,
        max_texture_dimension_cube: 16384,
        max_texture_array_layers: 2048,
        max_color_attachments: 8,
        min_uniform_buffer_offset_alignment: 256,
        min_storage_buffer_offset_alignment: 16,
        buffer_copy_row_pitch_alignment: 256,
        max_compute_workgroup_size: [1024, 1024, 64],
        max_compute_invocations_per_workgroup: 1024,
        max_compute_workgroups_per_dimension: 65535,
        max_sampler_anisotropy: 16,
    };
}

/// 适配器身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentity {
    vendor_id: u32,
    device_id: u32,
    name: String,
    adapter_type: AdapterType,
    feature_level: FeatureLevel,
}

impl AdapterIdentity {
    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter_type(&self) -> AdapterType {
        self.adapter_type
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    pub fn is_software(&self) -> bool {
        self.adapter_type == AdapterType::Software
    }
}

impl fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, vendor {:#06x}, device {:#06x}, level {})",
            self.name, self.adapter_type, self.vendor_id, self.device_id, self.feature_level
        )
    }
}

/// 设备能力快照（不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    adapter: AdapterIdentity,
    limits: DeviceLimits,
    architecture: ArchitectureInfo,
}

impl DeviceCapabilities {
    /// 由选中的适配器和活动设备上的查询结果生成快照
    pub fn snapshot(
        candidate: &AdapterCandidate,
        architecture: ArchitectureInfo,
        limits: DeviceLimits,
    ) -> Self {
        let adapter_type =
            classify_adapter(candidate.is_software, architecture, candidate.device_type);

        Self {
            adapter: AdapterIdentity {
                vendor_id: candidate.vendor_id,
                device_id: candidate.device_id,
                name: candidate.name.clone(),
                adapter_type,
                feature_level: candidate.feature_level,
            },
            limits,
            architecture,
        }
    }

    pub fn adapter(&self) -> &AdapterIdentity {
        &self.adapter
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn architecture(&self) -> ArchitectureInfo {
        self.architecture
    }
}

/// 判定适配器类型
///
/// 优先级：软件标志 > 统一内存架构 > 驱动给出的类型 > 独立显卡
pub fn classify_adapter(
    is_software: bool,
    architecture: ArchitectureInfo,
    hint: Option<AdapterType>,
) -> AdapterType {
    if is_software {
        return AdapterType::Software;
    }
    if architecture.uma == Some(true) {
        return AdapterType::Integrated;
    }
    hint.unwrap_or(AdapterType::Discrete)
}
