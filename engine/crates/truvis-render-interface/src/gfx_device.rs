//! GPU 设备接口
//!
//! RenderGraph 只通过 [`GfxDevice`] 与后端交互：创建/销毁资源、录制 barrier、
//! 提交和 present。所有调用都是同步且可失败的。

use crate::gfx_error::GfxResult;
use crate::handles::{
    GfxBindTableHandle, GfxBufferHandle, GfxDescriptorSetHandle, GfxEncoderHandle, GfxSwapchainHandle,
    GfxTextureHandle,
};
use crate::resource_desc::{GfxBufferDesc, GfxTextureDesc};
use crate::resource_state::GfxBarrier;

/// Attachment 的加载操作
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum GfxLoadOp {
    Load,
    Clear([f32; 4]),
    #[default]
    DontCare,
}

/// Attachment 的存储操作
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GfxStoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxColorAttachment {
    pub texture: GfxTextureHandle,
    pub load_op: GfxLoadOp,
    pub store_op: GfxStoreOp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxDepthAttachment {
    pub texture: GfxTextureHandle,
    pub load_op: GfxLoadOp,
    pub store_op: GfxStoreOp,
    /// 只读深度（深度测试但不写入）
    pub read_only: bool,
}

/// 开始一个 render pass 所需的信息
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GfxRenderPassInfo {
    /// 按 MRT 索引排列
    pub color_attachments: Vec<GfxColorAttachment>,
    pub depth_attachment: Option<GfxDepthAttachment>,
    pub extent: [u32; 2],
}

/// 后端设备
///
/// 实现需要是 `Send + Sync`：RenderGraph 并行录制时，
/// 不同线程会同时向不同的 encoder 录制命令。
pub trait GfxDevice: Send + Sync {
    // 资源
    fn create_texture(&self, desc: &GfxTextureDesc, name: &str) -> GfxResult<GfxTextureHandle>;
    /// 创建一个与 `memory_source` 共享显存的纹理（内存别名）
    fn create_aliased_texture(
        &self,
        desc: &GfxTextureDesc,
        memory_source: GfxTextureHandle,
        name: &str,
    ) -> GfxResult<GfxTextureHandle>;
    fn destroy_texture(&self, texture: GfxTextureHandle);
    fn create_buffer(&self, desc: &GfxBufferDesc, name: &str) -> GfxResult<GfxBufferHandle>;
    fn destroy_buffer(&self, buffer: GfxBufferHandle);

    // 低层对象
    fn create_encoder(&self) -> GfxResult<GfxEncoderHandle>;
    fn destroy_encoder(&self, encoder: GfxEncoderHandle);
    fn create_bind_table(&self) -> GfxResult<GfxBindTableHandle>;
    fn destroy_bind_table(&self, bind_table: GfxBindTableHandle);
    fn create_descriptor_set(&self) -> GfxResult<GfxDescriptorSetHandle>;
    fn destroy_descriptor_set(&self, descriptor_set: GfxDescriptorSetHandle);

    // 命令录制
    fn begin_encoder(&self, encoder: GfxEncoderHandle, label: &str) -> GfxResult<()>;
    fn end_encoder(&self, encoder: GfxEncoderHandle) -> GfxResult<()>;
    /// 一次性提交一组 barrier
    fn cmd_resource_barriers(&self, encoder: GfxEncoderHandle, barriers: &[GfxBarrier]) -> GfxResult<()>;
    fn cmd_begin_render_pass(&self, encoder: GfxEncoderHandle, info: &GfxRenderPassInfo) -> GfxResult<()>;
    fn cmd_end_render_pass(&self, encoder: GfxEncoderHandle) -> GfxResult<()>;
    fn cmd_begin_label(&self, encoder: GfxEncoderHandle, label: &str);
    fn cmd_end_label(&self, encoder: GfxEncoderHandle);
    fn cmd_bind_table(&self, encoder: GfxEncoderHandle, set: u32, bind_table: GfxBindTableHandle) -> GfxResult<()>;
    fn cmd_draw(&self, encoder: GfxEncoderHandle, vertex_count: u32, instance_count: u32) -> GfxResult<()>;
    fn cmd_dispatch(&self, encoder: GfxEncoderHandle, group_count: [u32; 3]) -> GfxResult<()>;
    fn cmd_copy_texture(&self, encoder: GfxEncoderHandle, src: GfxTextureHandle, dst: GfxTextureHandle)
    -> GfxResult<()>;
    fn cmd_copy_buffer(&self, encoder: GfxEncoderHandle, src: GfxBufferHandle, dst: GfxBufferHandle) -> GfxResult<()>;

    // 队列
    /// 按给定顺序提交 encoder
    fn submit(&self, encoders: &[GfxEncoderHandle]) -> GfxResult<()>;
    fn acquire_backbuffer(&self, swapchain: GfxSwapchainHandle) -> GfxResult<GfxTextureHandle>;
    fn present(&self, swapchain: GfxSwapchainHandle) -> GfxResult<()>;
}
