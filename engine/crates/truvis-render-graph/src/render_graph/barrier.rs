//! Barrier 自动计算
//!
//! 编译期根据资源状态转换生成每个 Pass 的 barrier 描述（作用于逻辑资源），
//! 执行期再替换成物理句柄，得到 `GfxBarrier`。

use truvis_render_interface::handles::{GfxBufferHandle, GfxTextureHandle};
use truvis_render_interface::resource_state::{GfxBarrier, GfxResourceState};

use super::handle::RgNodeId;

/// 纹理 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgTextureBarrierDesc {
    /// 资源节点
    pub resource: RgNodeId,
    /// 源状态
    pub before: GfxResourceState,
    /// 目标状态
    pub after: GfxResourceState,
    /// 第一次使用别名内存（之前的内容无效）
    pub aliasing: bool,
}

impl RgTextureBarrierDesc {
    pub fn new(resource: RgNodeId, before: GfxResourceState, after: GfxResourceState) -> Self {
        Self {
            resource,
            before,
            after,
            aliasing: false,
        }
    }

    pub fn with_aliasing(mut self, aliasing: bool) -> Self {
        self.aliasing = aliasing;
        self
    }

    /// 检查是否需要 barrier
    ///
    /// 只读到相同的只读状态可以跳过。
    pub fn needs_barrier(&self) -> bool {
        needs_barrier(self.before, self.after) || self.aliasing
    }

    /// 转换为 GfxBarrier，需要提供实际的纹理句柄
    pub fn to_gfx_barrier(&self, texture: GfxTextureHandle) -> GfxBarrier {
        GfxBarrier::texture(texture, self.before, self.after).with_aliasing(self.aliasing)
    }
}

/// 缓冲区 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferBarrierDesc {
    pub resource: RgNodeId,
    pub before: GfxResourceState,
    pub after: GfxResourceState,
}

impl RgBufferBarrierDesc {
    pub fn new(resource: RgNodeId, before: GfxResourceState, after: GfxResourceState) -> Self {
        Self {
            resource,
            before,
            after,
        }
    }

    pub fn needs_barrier(&self) -> bool {
        needs_barrier(self.before, self.after)
    }

    pub fn to_gfx_barrier(&self, buffer: GfxBufferHandle) -> GfxBarrier {
        GfxBarrier::buffer(buffer, self.before, self.after)
    }
}

/// 状态不同，或者任意一侧包含写操作（保证可见性）
#[inline]
pub fn needs_barrier(before: GfxResourceState, after: GfxResourceState) -> bool {
    before != after || before.is_write() || after.is_write()
}

/// Pass 执行前需要的 Barrier 集合
///
/// 每个资源在一个 Pass 内最多一条 barrier，执行时合并成一次 `cmd_resource_barriers` 调用。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassBarriers {
    pub texture_barriers: Vec<RgTextureBarrierDesc>,
    pub buffer_barriers: Vec<RgBufferBarrierDesc>,
}

impl PassBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加纹理 barrier，不需要时忽略
    pub fn add_texture_barrier(&mut self, barrier: RgTextureBarrierDesc) {
        if barrier.needs_barrier() {
            self.texture_barriers.push(barrier);
        }
    }

    /// 添加缓冲区 barrier，不需要时忽略
    pub fn add_buffer_barrier(&mut self, barrier: RgBufferBarrierDesc) {
        if barrier.needs_barrier() {
            self.buffer_barriers.push(barrier);
        }
    }

    pub fn has_barriers(&self) -> bool {
        !self.texture_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    pub fn texture_barrier_count(&self) -> usize {
        self.texture_barriers.len()
    }

    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.texture_barriers.len() + self.buffer_barriers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_barriers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_to_same_read_is_skipped() {
        let barrier = RgTextureBarrierDesc::new(
            RgNodeId::from_index(0),
            GfxResourceState::SHADER_RESOURCE,
            GfxResourceState::SHADER_RESOURCE,
        );
        assert!(!barrier.needs_barrier());
        assert!(barrier.with_aliasing(true).needs_barrier());
    }

    #[test]
    fn test_write_after_write_needs_barrier() {
        let barrier = RgBufferBarrierDesc::new(
            RgNodeId::from_index(0),
            GfxResourceState::UNORDERED_ACCESS,
            GfxResourceState::UNORDERED_ACCESS,
        );
        assert!(barrier.needs_barrier());
    }

    #[test]
    fn test_pass_barriers_drop_redundant() {
        let mut barriers = PassBarriers::new();
        let node = RgNodeId::from_index(1);
        barriers.add_texture_barrier(RgTextureBarrierDesc::new(
            node,
            GfxResourceState::UNDEFINED,
            GfxResourceState::RENDER_TARGET,
        ));
        barriers.add_texture_barrier(RgTextureBarrierDesc::new(
            node,
            GfxResourceState::COPY_SRC,
            GfxResourceState::COPY_SRC,
        ));
        assert_eq!(barriers.texture_barrier_count(), 1);
        assert_eq!(barriers.len(), 1);
    }
}
