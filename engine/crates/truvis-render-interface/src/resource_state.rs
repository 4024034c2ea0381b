//! 资源状态定义
//!
//! 与后端无关的资源状态（D3D12 resource state 风格），
//! Vulkan 后端通过 `vk_mapping` 转换为 stage / access / layout。

use bitflags::bitflags;

use crate::handles::{GfxBufferHandle, GfxTextureHandle};

bitflags! {
    /// GPU 资源状态
    ///
    /// 同一 Pass 内对同一资源的多种使用会被合并（按位或）成一个状态。
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GfxResourceState: u32 {
        /// 着色器只读（SRV / sampled）
        const SHADER_RESOURCE = 1 << 0;
        /// 无序访问（UAV / storage）
        const UNORDERED_ACCESS = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_WRITE = 1 << 3;
        const DEPTH_READ = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
        const VERTEX_BUFFER = 1 << 7;
        const INDEX_BUFFER = 1 << 8;
        const UNIFORM_BUFFER = 1 << 9;
        const INDIRECT_ARGUMENT = 1 << 10;
        const PRESENT = 1 << 11;
    }
}

impl Default for GfxResourceState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl GfxResourceState {
    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self = Self::empty();

    /// 写操作的状态位
    const WRITE_STATES: Self = Self::UNORDERED_ACCESS
        .union(Self::RENDER_TARGET)
        .union(Self::DEPTH_WRITE)
        .union(Self::COPY_DST);

    /// 检查是否包含写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        !self.is_undefined() && !self.is_write()
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.is_empty()
    }
}

/// 纹理子资源范围（mip / array layer）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxSubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl GfxSubresourceRange {
    #[inline]
    pub const fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// 单个 mip 的所有层
    #[inline]
    pub const fn mip(mip: u32, layer_count: u32) -> Self {
        Self::new(mip, 1, 0, layer_count)
    }

    /// 检查范围是否落在 `mip_levels` x `layers` 内
    #[inline]
    pub fn fits(&self, mip_levels: u32, layers: u32) -> bool {
        self.mip_count > 0
            && self.layer_count > 0
            && self.base_mip.checked_add(self.mip_count).is_some_and(|end| end <= mip_levels)
            && self.base_layer.checked_add(self.layer_count).is_some_and(|end| end <= layers)
    }
}

/// Barrier 作用的物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxBarrierResource {
    Texture(GfxTextureHandle),
    Buffer(GfxBufferHandle),
}

/// 一次资源状态转换
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBarrier {
    pub resource: GfxBarrierResource,
    pub before: GfxResourceState,
    pub after: GfxResourceState,
    /// 为 `None` 时作用于整个资源
    pub range: Option<GfxSubresourceRange>,
    /// 内存别名切换（前一个使用者的内容被丢弃）
    pub aliasing: bool,
}

impl GfxBarrier {
    #[inline]
    pub fn texture(texture: GfxTextureHandle, before: GfxResourceState, after: GfxResourceState) -> Self {
        Self {
            resource: GfxBarrierResource::Texture(texture),
            before,
            after,
            range: None,
            aliasing: false,
        }
    }

    #[inline]
    pub fn buffer(buffer: GfxBufferHandle, before: GfxResourceState, after: GfxResourceState) -> Self {
        Self {
            resource: GfxBarrierResource::Buffer(buffer),
            before,
            after,
            range: None,
            aliasing: false,
        }
    }

    #[inline]
    pub fn with_range(mut self, range: Option<GfxSubresourceRange>) -> Self {
        self.range = range;
        self
    }

    #[inline]
    pub fn with_aliasing(mut self, aliasing: bool) -> Self {
        self.aliasing = aliasing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_states() {
        assert!(GfxResourceState::RENDER_TARGET.is_write());
        assert!((GfxResourceState::SHADER_RESOURCE | GfxResourceState::UNORDERED_ACCESS).is_write());
        assert!(GfxResourceState::SHADER_RESOURCE.is_read_only());
        assert!(!GfxResourceState::UNDEFINED.is_read_only());
    }

    #[test]
    fn test_subresource_range_fits() {
        assert!(GfxSubresourceRange::mip(2, 1).fits(4, 1));
        assert!(!GfxSubresourceRange::new(3, 2, 0, 1).fits(4, 1));
        assert!(!GfxSubresourceRange::new(0, 0, 0, 1).fits(4, 1));
        assert!(!GfxSubresourceRange::new(u32::MAX, 2, 0, 1).fits(4, 1));
    }
}
