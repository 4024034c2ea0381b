//! Pass 执行时可见的上下文
//!
//! `RgPassContext` 只暴露当前 Pass 声明过的资源，
//! 访问未声明的资源返回 `RgError::UndeclaredResource`。

use truvis_render_interface::frame_counter::FrameLabel;
use truvis_render_interface::gfx_device::GfxDevice;
use truvis_render_interface::gfx_error::GfxResult;
use truvis_render_interface::handles::{
    GfxBindTableHandle, GfxBufferHandle, GfxDescriptorSetHandle, GfxEncoderHandle, GfxTextureHandle,
};
use truvis_render_interface::resource_desc::{GfxBufferDesc, GfxTextureDesc};

use super::error::{RgError, RgResult};
use super::handle::{RgBufferHandle, RgGraphId, RgNodeId, RgResourceHandle, RgTextureHandle};
use super::pass::{RgPassDecl, RgPassType, RgTextureWriteTarget};
use super::pool::RgFramePools;

/// 当前帧绑定到某个资源节点上的物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RgBoundResource {
    Texture { handle: GfxTextureHandle, desc: GfxTextureDesc },
    Buffer { handle: GfxBufferHandle, desc: GfxBufferDesc },
}

/// Pass 执行上下文
pub struct RgPassContext<'c> {
    pub(crate) graph_id: RgGraphId,
    pub(crate) decl: &'c RgPassDecl,
    pub(crate) frame_id: u64,
    pub(crate) frame_label: FrameLabel,
    /// 按节点 id 索引
    pub(crate) bound: &'c [Option<RgBoundResource>],
    pub(crate) device: &'c dyn GfxDevice,
    pub(crate) pools: &'c RgFramePools,
}

// getters
impl RgPassContext<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.decl.pass_type
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&str> {
        self.decl.pipeline.as_deref()
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        self.frame_label
    }

    /// Pass 自己的声明（读写列表、附件配置）
    #[inline]
    pub fn decl(&self) -> &RgPassDecl {
        self.decl
    }

    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device
    }
}

// 资源查询
impl RgPassContext<'_> {
    /// 获取纹理的物理句柄
    pub fn texture(&self, handle: RgTextureHandle) -> RgResult<GfxTextureHandle> {
        match self.resolve(handle)? {
            RgBoundResource::Texture { handle, .. } => Ok(handle),
            RgBoundResource::Buffer { .. } => Err(self.undeclared(handle)),
        }
    }

    pub fn texture_desc(&self, handle: RgTextureHandle) -> RgResult<GfxTextureDesc> {
        match self.resolve(handle)? {
            RgBoundResource::Texture { desc, .. } => Ok(desc),
            RgBoundResource::Buffer { .. } => Err(self.undeclared(handle)),
        }
    }

    /// 获取缓冲区的物理句柄
    pub fn buffer(&self, handle: RgBufferHandle) -> RgResult<GfxBufferHandle> {
        match self.resolve(handle)? {
            RgBoundResource::Buffer { handle, .. } => Ok(handle),
            RgBoundResource::Texture { .. } => Err(self.undeclared(handle)),
        }
    }

    pub fn buffer_desc(&self, handle: RgBufferHandle) -> RgResult<GfxBufferDesc> {
        match self.resolve(handle)? {
            RgBoundResource::Buffer { desc, .. } => Ok(desc),
            RgBoundResource::Texture { .. } => Err(self.undeclared(handle)),
        }
    }

    /// 第一个附件（按 MRT 顺序，其次是深度）的尺寸
    pub fn render_target_extent(&self) -> Option<[u32; 2]> {
        let mut attachments: Vec<_> = self
            .decl
            .texture_writes
            .iter()
            .filter_map(|write| match write.target {
                RgTextureWriteTarget::RenderTarget { mrt_index, .. } => Some((mrt_index, write.texture)),
                RgTextureWriteTarget::DepthStencil { .. } => Some((u32::MAX, write.texture)),
                _ => None,
            })
            .collect();
        attachments.sort_by_key(|(index, _)| *index);

        let (_, texture) = attachments.first()?;
        let desc = self.texture_desc(*texture).ok()?;
        Some([desc.width, desc.height])
    }

    fn resolve<H: RgResourceHandle>(&self, handle: H) -> RgResult<RgBoundResource> {
        if handle.graph_id() != self.graph_id {
            return Err(RgError::UnknownResourceHandle {
                handle: format!("{handle:?}"),
                reason: "handle belongs to another graph".to_string(),
            });
        }
        if !self.decl.declares(handle.node_id()) {
            return Err(self.undeclared(handle));
        }
        self.bound_at(handle.node_id()).ok_or_else(|| self.undeclared(handle))
    }

    #[inline]
    fn bound_at(&self, node: RgNodeId) -> Option<RgBoundResource> {
        self.bound.get(node.index()).copied().flatten()
    }

    fn undeclared(&self, handle: impl std::fmt::Debug) -> RgError {
        RgError::UndeclaredResource {
            pass: self.decl.name.clone(),
            resource: format!("{handle:?}"),
        }
    }
}

// 每帧池化对象
impl RgPassContext<'_> {
    /// 从当前帧的池中取一个 bind table，句柄只在本帧内有效
    pub fn alloc_bind_table(&self) -> RgResult<GfxBindTableHandle> {
        Ok(self.pools.bind_tables.pop(self.device)?)
    }

    /// 从当前帧的池中取一个 descriptor set，句柄只在本帧内有效
    pub fn alloc_descriptor_set(&self) -> RgResult<GfxDescriptorSetHandle> {
        Ok(self.pools.descriptor_sets.pop(self.device)?)
    }
}

/// Pass 录制命令使用的编码器
///
/// 已经 begin，barrier 已经录制；render pass 会在回调返回后结束。
pub struct RgEncoder<'e> {
    pub(crate) device: &'e dyn GfxDevice,
    pub(crate) encoder: GfxEncoderHandle,
}

impl RgEncoder<'_> {
    #[inline]
    pub fn handle(&self) -> GfxEncoderHandle {
        self.encoder
    }

    pub fn bind_table(&mut self, set: u32, bind_table: GfxBindTableHandle) -> GfxResult<()> {
        self.device.cmd_bind_table(self.encoder, set, bind_table)
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) -> GfxResult<()> {
        self.device.cmd_draw(self.encoder, vertex_count, instance_count)
    }

    pub fn dispatch(&mut self, group_count: [u32; 3]) -> GfxResult<()> {
        self.device.cmd_dispatch(self.encoder, group_count)
    }

    pub fn copy_texture(&mut self, src: GfxTextureHandle, dst: GfxTextureHandle) -> GfxResult<()> {
        self.device.cmd_copy_texture(self.encoder, src, dst)
    }

    pub fn copy_buffer(&mut self, src: GfxBufferHandle, dst: GfxBufferHandle) -> GfxResult<()> {
        self.device.cmd_copy_buffer(self.encoder, src, dst)
    }

    pub fn begin_label(&mut self, label: &str) {
        self.device.cmd_begin_label(self.encoder, label);
    }

    pub fn end_label(&mut self) {
        self.device.cmd_end_label(self.encoder);
    }
}
