//! Pass 定义和构建器
//!
//! 提供 `RgPass` trait 用于声明式定义渲染 Pass，
//! 以及 `RgPassBuilder` 用于在 setup 阶段声明资源依赖。

use std::fmt;

use truvis_render_interface::gfx_device::{GfxLoadOp, GfxStoreOp};
use truvis_render_interface::handles::GfxSwapchainHandle;
use truvis_render_interface::resource_state::{GfxResourceState, GfxSubresourceRange};

use super::context::{RgEncoder, RgPassContext};
use super::dependency_graph::RgDependencyGraph;
use super::error::{RgError, RgResult};
use super::graph::RgNode;
use super::handle::{RgBufferHandle, RgGraphId, RgNodeId, RgResourceHandle, RgTextureHandle};
use super::resource::{RgResourceNode, RgResourceSource};

/// 绑定 set 的上限
pub const RG_MAX_BIND_SETS: u32 = 8;
/// 每个 set 内 binding 的上限
pub const RG_MAX_BINDINGS_PER_SET: u32 = 1024;
/// MRT 数量上限
pub const RG_MAX_RENDER_TARGETS: u32 = 8;
/// UAV slot 上限
pub const RG_MAX_UAV_SLOTS: u32 = 64;

/// Pass 类型，构建后不可变
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassType {
    Render,
    Compute,
    Copy,
    Present,
}

impl fmt::Display for RgPassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Render => "Render",
            Self::Compute => "Compute",
            Self::Copy => "Copy",
            Self::Present => "Present",
        };
        f.write_str(name)
    }
}

/// 纹理读取
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgTextureRead {
    pub texture: RgTextureHandle,
    pub set: u32,
    pub binding: u32,
    pub state: GfxResourceState,
    /// 为 `None` 时表示整个纹理
    pub range: Option<GfxSubresourceRange>,
}

/// 纹理写入的目标
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgTextureWriteTarget {
    RenderTarget {
        mrt_index: u32,
        load_op: GfxLoadOp,
        store_op: GfxStoreOp,
    },
    DepthStencil {
        load_op: GfxLoadOp,
        store_op: GfxStoreOp,
    },
    Uav {
        slot: u32,
    },
    CopyDst,
}

/// 纹理写入
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgTextureWrite {
    pub texture: RgTextureHandle,
    pub target: RgTextureWriteTarget,
    pub state: GfxResourceState,
}

/// 缓冲区读取，`set`/`binding` 为 `None` 时表示非 descriptor 的使用（例如 copy 源）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferRead {
    pub buffer: RgBufferHandle,
    pub binding: Option<(u32, u32)>,
    pub state: GfxResourceState,
}

/// 缓冲区写入，`slot` 为 `None` 时表示 copy 目标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferWrite {
    pub buffer: RgBufferHandle,
    pub slot: Option<u32>,
    pub state: GfxResourceState,
}

/// Present Pass 的目标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgPresentTarget {
    pub backbuffer: RgTextureHandle,
    pub swapchain: GfxSwapchainHandle,
}

/// 依赖图中边的访问方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccess {
    Read,
    Write,
}

/// 边上的绑定信息，仅用于调试和导出
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgBinding {
    Descriptor { set: u32, binding: u32 },
    RenderTarget(u32),
    DepthStencil,
    Uav(u32),
    Copy,
    Present,
}

impl fmt::Display for RgBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor { set, binding } => write!(f, "set{set}.b{binding}"),
            Self::RenderTarget(mrt_index) => write!(f, "rt{mrt_index}"),
            Self::DepthStencil => write!(f, "depth"),
            Self::Uav(slot) => write!(f, "uav{slot}"),
            Self::Copy => write!(f, "copy"),
            Self::Present => write!(f, "present"),
        }
    }
}

/// 依赖图中边的数据
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgEdgeInfo {
    pub access: RgAccess,
    pub state: GfxResourceState,
    pub binding: RgBinding,
}

/// 一个 Pass 对某个资源的全部使用（同一 Pass 内合并）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgResourceUse {
    pub node: RgNodeId,
    pub is_texture: bool,
    /// 该 Pass 内所有使用的状态按位或
    pub state: GfxResourceState,
    pub reads: bool,
    pub writes: bool,
}

/// Pass 的声明部分（构建后不可变）
#[derive(Clone, Debug)]
pub struct RgPassDecl {
    pub name: String,
    pub pass_type: RgPassType,

    pub texture_reads: Vec<RgTextureRead>,
    pub texture_writes: Vec<RgTextureWrite>,
    pub buffer_reads: Vec<RgBufferRead>,
    pub buffer_writes: Vec<RgBufferWrite>,
    pub present: Option<RgPresentTarget>,

    /// 即使输出没有被使用也不会被剔除
    pub never_cull: bool,
    /// 绑定的 pipeline 名称（仅用于调试）
    pub pipeline: Option<String>,
}

// new & init
impl RgPassDecl {
    pub(crate) fn new(name: String, pass_type: RgPassType) -> Self {
        Self {
            name,
            pass_type,
            texture_reads: Vec::new(),
            texture_writes: Vec::new(),
            buffer_reads: Vec::new(),
            buffer_writes: Vec::new(),
            present: None,
            never_cull: false,
            pipeline: None,
        }
    }
}

// tools
impl RgPassDecl {
    /// 按首次声明的顺序合并每个资源的使用
    pub fn uses(&self) -> Vec<RgResourceUse> {
        let mut uses: Vec<RgResourceUse> = Vec::new();
        let mut merge = |node: RgNodeId, is_texture: bool, state: GfxResourceState, write: bool| {
            match uses.iter_mut().find(|used| used.node == node) {
                Some(used) => {
                    used.state |= state;
                    used.reads |= !write;
                    used.writes |= write;
                }
                None => uses.push(RgResourceUse {
                    node,
                    is_texture,
                    state,
                    reads: !write,
                    writes: write,
                }),
            }
        };

        for read in &self.texture_reads {
            merge(read.texture.node, true, read.state, false);
        }
        for read in &self.buffer_reads {
            merge(read.buffer.node, false, read.state, false);
        }
        for write in &self.texture_writes {
            merge(write.texture.node, true, write.state, true);
        }
        for write in &self.buffer_writes {
            merge(write.buffer.node, false, write.state, true);
        }
        if let Some(present) = &self.present {
            merge(present.backbuffer.node, true, GfxResourceState::PRESENT, false);
        }
        uses
    }

    /// 该 Pass 是否声明了某个资源
    pub fn declares(&self, node: RgNodeId) -> bool {
        self.texture_reads.iter().any(|read| read.texture.node == node)
            || self.texture_writes.iter().any(|write| write.texture.node == node)
            || self.buffer_reads.iter().any(|read| read.buffer.node == node)
            || self.buffer_writes.iter().any(|write| write.buffer.node == node)
            || self.present.is_some_and(|present| present.backbuffer.node == node)
    }

    /// 写入了任何资源
    #[inline]
    pub fn has_writes(&self) -> bool {
        !self.texture_writes.is_empty() || !self.buffer_writes.is_empty()
    }

    /// 依赖图中的边：读为 资源 -> Pass，写为 Pass -> 资源
    pub(crate) fn edges(&self) -> Vec<(RgNodeId, RgEdgeInfo)> {
        let mut edges = Vec::new();
        for read in &self.texture_reads {
            let binding = RgBinding::Descriptor {
                set: read.set,
                binding: read.binding,
            };
            let binding = if self.pass_type == RgPassType::Copy { RgBinding::Copy } else { binding };
            edges.push((read.texture.node, RgEdgeInfo { access: RgAccess::Read, state: read.state, binding }));
        }
        for read in &self.buffer_reads {
            let binding = match read.binding {
                Some((set, binding)) => RgBinding::Descriptor { set, binding },
                None => RgBinding::Copy,
            };
            edges.push((read.buffer.node, RgEdgeInfo { access: RgAccess::Read, state: read.state, binding }));
        }
        if let Some(present) = &self.present {
            edges.push((
                present.backbuffer.node,
                RgEdgeInfo {
                    access: RgAccess::Read,
                    state: GfxResourceState::PRESENT,
                    binding: RgBinding::Present,
                },
            ));
        }
        for write in &self.texture_writes {
            let binding = match write.target {
                RgTextureWriteTarget::RenderTarget { mrt_index, .. } => RgBinding::RenderTarget(mrt_index),
                RgTextureWriteTarget::DepthStencil { .. } => RgBinding::DepthStencil,
                RgTextureWriteTarget::Uav { slot } => RgBinding::Uav(slot),
                RgTextureWriteTarget::CopyDst => RgBinding::Copy,
            };
            edges.push((write.texture.node, RgEdgeInfo { access: RgAccess::Write, state: write.state, binding }));
        }
        for write in &self.buffer_writes {
            let binding = write.slot.map_or(RgBinding::Copy, RgBinding::Uav);
            edges.push((write.buffer.node, RgEdgeInfo { access: RgAccess::Write, state: write.state, binding }));
        }
        edges
    }
}

/// 类型擦除的 Pass 执行器 trait
///
/// 需要 `Send + Sync`：开启并行录制时，不同 Pass 的执行器会在不同线程上被调用。
pub trait RgPassExecutor: Send + Sync {
    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()>;
}

/// 闭包形式的执行器
pub(crate) struct RgClosureExecutor<F>(pub F);

impl<F> RgPassExecutor for RgClosureExecutor<F>
where
    F: Fn(&RgPassContext<'_>, &mut RgEncoder<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()> {
        (self.0)(ctx, encoder)
    }
}

/// 包装用户 Pass 实现的执行器
pub(crate) struct RgPassExecutorWrapper<P: RgPass> {
    pub pass: P,
}

impl<P: RgPass> RgPassExecutor for RgPassExecutorWrapper<P> {
    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()> {
        self.pass.execute(ctx, encoder)
    }
}

/// Pass 节点（声明 + 执行器）
pub struct RgPassNode<'a> {
    pub(crate) decl: RgPassDecl,
    /// Present Pass 没有执行器
    pub(crate) executor: Option<Box<dyn RgPassExecutor + 'a>>,
}

impl RgPassNode<'_> {
    #[inline]
    pub fn decl(&self) -> &RgPassDecl {
        &self.decl
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.decl.pass_type
    }
}

/// Pass 构建器
///
/// 在 setup 闭包（或 `RgPass::setup()`）中使用，声明 Pass 的资源依赖。
/// 所有声明在 setup 返回 `Ok` 之后才会写入 graph；setup 失败时 graph 保持不变。
pub struct RgPassBuilder<'g, 'a> {
    pub(crate) graph_id: RgGraphId,
    pub(crate) nodes: &'g RgDependencyGraph<RgNode<'a>, RgEdgeInfo>,
    pub(crate) decl: RgPassDecl,
    pub(crate) executor: Option<Box<dyn RgPassExecutor + 'a>>,
}

// new & init
impl<'g, 'a> RgPassBuilder<'g, 'a> {
    pub(crate) fn new(
        graph_id: RgGraphId,
        nodes: &'g RgDependencyGraph<RgNode<'a>, RgEdgeInfo>,
        name: String,
        pass_type: RgPassType,
    ) -> Self {
        Self {
            graph_id,
            nodes,
            decl: RgPassDecl::new(name, pass_type),
            executor: None,
        }
    }
}

// 资源声明
impl<'a> RgPassBuilder<'_, 'a> {
    /// 声明以 descriptor 方式读取纹理
    ///
    /// # 参数
    /// - `set`/`binding`: shader 中的绑定位置
    /// - `state`: 期望的资源状态（用于自动生成 barrier）
    pub fn read_texture(
        &mut self,
        texture: RgTextureHandle,
        set: u32,
        binding: u32,
        state: GfxResourceState,
    ) -> RgResult<RgTextureHandle> {
        self.read_texture_range(texture, set, binding, state, None)
    }

    /// 声明读取纹理的一部分 mip / array layer
    pub fn read_texture_range(
        &mut self,
        texture: RgTextureHandle,
        set: u32,
        binding: u32,
        state: GfxResourceState,
        range: Option<GfxSubresourceRange>,
    ) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Render, RgPassType::Compute], "descriptor reads")?;
        let resource = self.lookup(texture)?;
        self.check_descriptor_binding(set, binding)?;
        self.check_state(state, false)?;
        if let (Some(range), Some(desc)) = (range, resource.texture_desc()) {
            if !range.fits(desc.mip_levels, desc.depth_or_layers) {
                return Err(self.binding_error(format!(
                    "range {range:?} exceeds \"{}\" ({} mips, {} layers)",
                    resource.name(),
                    desc.mip_levels,
                    desc.depth_or_layers
                )));
            }
        }

        self.decl.texture_reads.push(RgTextureRead {
            texture,
            set,
            binding,
            state,
            range,
        });
        Ok(texture)
    }

    /// 声明作为 render target 写入
    pub fn write_render_target(
        &mut self,
        texture: RgTextureHandle,
        mrt_index: u32,
        load_op: GfxLoadOp,
        store_op: GfxStoreOp,
    ) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Render], "render targets")?;
        self.lookup(texture)?;
        if mrt_index >= RG_MAX_RENDER_TARGETS {
            return Err(self.binding_error(format!("mrt index {mrt_index} >= {RG_MAX_RENDER_TARGETS}")));
        }
        let duplicated = self.decl.texture_writes.iter().any(|write| {
            matches!(write.target, RgTextureWriteTarget::RenderTarget { mrt_index: used, .. } if used == mrt_index)
        });
        if duplicated {
            return Err(self.binding_error(format!("mrt index {mrt_index} is already bound")));
        }

        self.decl.texture_writes.push(RgTextureWrite {
            texture,
            target: RgTextureWriteTarget::RenderTarget {
                mrt_index,
                load_op,
                store_op,
            },
            state: GfxResourceState::RENDER_TARGET,
        });
        Ok(texture)
    }

    /// 声明作为深度模板附件写入
    pub fn write_depth_stencil(
        &mut self,
        texture: RgTextureHandle,
        load_op: GfxLoadOp,
        store_op: GfxStoreOp,
    ) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Render], "depth stencil attachments")?;
        let resource = self.lookup(texture)?;
        if !resource.texture_desc().is_some_and(|desc| desc.format.is_depth()) {
            return Err(RgError::InvalidDescriptor {
                resource: resource.name().to_string(),
                reason: "depth stencil attachment needs a depth format".to_string(),
            });
        }
        let duplicated = self
            .decl
            .texture_writes
            .iter()
            .any(|write| matches!(write.target, RgTextureWriteTarget::DepthStencil { .. }));
        if duplicated {
            return Err(self.binding_error("depth stencil attachment is already bound".to_string()));
        }

        self.decl.texture_writes.push(RgTextureWrite {
            texture,
            target: RgTextureWriteTarget::DepthStencil { load_op, store_op },
            state: GfxResourceState::DEPTH_WRITE,
        });
        Ok(texture)
    }

    /// 声明以 UAV 方式写入纹理
    pub fn write_texture(
        &mut self,
        texture: RgTextureHandle,
        slot: u32,
        state: GfxResourceState,
    ) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Render, RgPassType::Compute], "storage writes")?;
        self.lookup(texture)?;
        self.check_uav_slot(slot)?;
        self.check_state(state, true)?;

        self.decl.texture_writes.push(RgTextureWrite {
            texture,
            target: RgTextureWriteTarget::Uav { slot },
            state,
        });
        Ok(texture)
    }

    /// 声明读写纹理（同时读取和写入）
    ///
    /// 常用于累积操作（如 RT 累积、后处理）
    pub fn read_write_texture(
        &mut self,
        texture: RgTextureHandle,
        set: u32,
        binding: u32,
        slot: u32,
    ) -> RgResult<RgTextureHandle> {
        self.read_texture(texture, set, binding, GfxResourceState::UNORDERED_ACCESS)?;
        self.write_texture(texture, slot, GfxResourceState::UNORDERED_ACCESS)
    }

    /// 声明一次纹理拷贝
    pub fn copy_texture(&mut self, src: RgTextureHandle, dst: RgTextureHandle) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Copy], "texture copies")?;
        self.lookup(src)?;
        self.lookup(dst)?;

        self.decl.texture_reads.push(RgTextureRead {
            texture: src,
            set: 0,
            binding: 0,
            state: GfxResourceState::COPY_SRC,
            range: None,
        });
        self.decl.texture_writes.push(RgTextureWrite {
            texture: dst,
            target: RgTextureWriteTarget::CopyDst,
            state: GfxResourceState::COPY_DST,
        });
        Ok(dst)
    }

    /// 声明读取缓冲区
    pub fn read_buffer(
        &mut self,
        buffer: RgBufferHandle,
        set: u32,
        binding: u32,
        state: GfxResourceState,
    ) -> RgResult<RgBufferHandle> {
        self.require(&[RgPassType::Render, RgPassType::Compute], "descriptor reads")?;
        self.lookup(buffer)?;
        self.check_descriptor_binding(set, binding)?;
        self.check_state(state, false)?;

        self.decl.buffer_reads.push(RgBufferRead {
            buffer,
            binding: Some((set, binding)),
            state,
        });
        Ok(buffer)
    }

    /// 声明写入缓冲区
    pub fn write_buffer(
        &mut self,
        buffer: RgBufferHandle,
        slot: u32,
        state: GfxResourceState,
    ) -> RgResult<RgBufferHandle> {
        self.require(&[RgPassType::Render, RgPassType::Compute], "storage writes")?;
        self.lookup(buffer)?;
        self.check_uav_slot(slot)?;
        self.check_state(state, true)?;

        self.decl.buffer_writes.push(RgBufferWrite {
            buffer,
            slot: Some(slot),
            state,
        });
        Ok(buffer)
    }

    /// 声明一次缓冲区拷贝
    pub fn copy_buffer(&mut self, src: RgBufferHandle, dst: RgBufferHandle) -> RgResult<RgBufferHandle> {
        self.require(&[RgPassType::Copy], "buffer copies")?;
        self.lookup(src)?;
        self.lookup(dst)?;

        self.decl.buffer_reads.push(RgBufferRead {
            buffer: src,
            binding: None,
            state: GfxResourceState::COPY_SRC,
        });
        self.decl.buffer_writes.push(RgBufferWrite {
            buffer: dst,
            slot: None,
            state: GfxResourceState::COPY_DST,
        });
        Ok(dst)
    }

    /// 声明 present 的 backbuffer，每个 Present Pass 只能有一个
    pub fn present(&mut self, backbuffer: RgTextureHandle) -> RgResult<RgTextureHandle> {
        self.require(&[RgPassType::Present], "presenting")?;
        let resource = self.lookup(backbuffer)?;
        let RgResourceSource::Backbuffer { swapchain } = *resource.source() else {
            return Err(RgError::UnsupportedPassOperation {
                pass: self.decl.name.clone(),
                operation: "presenting a texture that is not a swapchain backbuffer",
            });
        };
        if self.decl.present.is_some() {
            return Err(RgError::UnsupportedPassOperation {
                pass: self.decl.name.clone(),
                operation: "presenting more than one backbuffer",
            });
        }

        self.decl.present = Some(RgPresentTarget { backbuffer, swapchain });
        Ok(backbuffer)
    }
}

// Pass 属性
impl<'a> RgPassBuilder<'_, 'a> {
    /// 输出没有被使用时也保留该 Pass
    pub fn never_cull(&mut self) -> &mut Self {
        self.decl.never_cull = true;
        self
    }

    /// 记录绑定的 pipeline（仅用于调试输出）
    pub fn bind_pipeline(&mut self, name: impl Into<String>) -> &mut Self {
        self.decl.pipeline = Some(name.into());
        self
    }

    /// 设置执行回调
    ///
    /// 回调在每帧最多执行一次，失败时整帧放弃提交。
    pub fn set_executor<F>(&mut self, executor: F) -> &mut Self
    where
        F: Fn(&RgPassContext<'_>, &mut RgEncoder<'_>) -> anyhow::Result<()> + Send + Sync + 'a,
    {
        self.executor = Some(Box::new(RgClosureExecutor(executor)));
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.decl.pass_type
    }
}

// validation
impl RgPassBuilder<'_, '_> {
    fn require(&self, allowed: &[RgPassType], operation: &'static str) -> RgResult<()> {
        if allowed.contains(&self.decl.pass_type) {
            Ok(())
        } else {
            Err(RgError::UnsupportedPassOperation {
                pass: self.decl.name.clone(),
                operation,
            })
        }
    }

    /// 检查句柄属于当前 graph 且类型匹配
    fn lookup<H: RgResourceHandle>(&self, handle: H) -> RgResult<&RgResourceNode> {
        lookup_resource(self.graph_id, self.nodes, handle)
    }

    fn check_descriptor_binding(&self, set: u32, binding: u32) -> RgResult<()> {
        if set >= RG_MAX_BIND_SETS {
            return Err(self.binding_error(format!("set {set} >= {RG_MAX_BIND_SETS}")));
        }
        if binding >= RG_MAX_BINDINGS_PER_SET {
            return Err(self.binding_error(format!("binding {binding} >= {RG_MAX_BINDINGS_PER_SET}")));
        }
        Ok(())
    }

    fn check_uav_slot(&self, slot: u32) -> RgResult<()> {
        if slot >= RG_MAX_UAV_SLOTS {
            return Err(self.binding_error(format!("uav slot {slot} >= {RG_MAX_UAV_SLOTS}")));
        }
        Ok(())
    }

    fn check_state(&self, state: GfxResourceState, write: bool) -> RgResult<()> {
        if state.is_undefined() {
            return Err(RgError::UnsupportedPassOperation {
                pass: self.decl.name.clone(),
                operation: "using a resource in the undefined state",
            });
        }
        if write && !state.is_write() {
            return Err(RgError::UnsupportedPassOperation {
                pass: self.decl.name.clone(),
                operation: "writing a resource in a read-only state",
            });
        }
        Ok(())
    }

    fn binding_error(&self, reason: String) -> RgError {
        RgError::InvalidBindingIndex {
            pass: self.decl.name.clone(),
            reason,
        }
    }
}

/// 在 graph 中查找资源节点，拒绝其他 graph 的句柄和类型不匹配的句柄
pub(crate) fn lookup_resource<'n, H: RgResourceHandle>(
    graph_id: RgGraphId,
    nodes: &'n RgDependencyGraph<RgNode<'_>, RgEdgeInfo>,
    handle: H,
) -> RgResult<&'n RgResourceNode> {
    let unknown = |reason: &str| RgError::UnknownResourceHandle {
        handle: format!("{handle:?}"),
        reason: reason.to_string(),
    };

    if handle.graph_id() != graph_id {
        return Err(unknown("handle belongs to another graph"));
    }
    match nodes.node_at(handle.node_id()) {
        Some(RgNode::Resource(resource)) if resource.is_texture() == H::IS_TEXTURE => Ok(resource),
        Some(RgNode::Resource(_)) => Err(unknown("resource kind mismatch")),
        Some(RgNode::Pass(_)) => Err(unknown("handle refers to a pass")),
        None => Err(unknown("no such node")),
    }
}

/// RgPass trait
///
/// 定义渲染图中的一个 Pass。用户需要实现此 trait 来创建自定义 Pass。
///
/// # 示例
///
/// ```ignore
/// struct BlurPass {
///     input: RgTextureHandle,
///     output: RgTextureHandle,
/// }
///
/// impl RgPass for BlurPass {
///     fn setup(&mut self, builder: &mut RgPassBuilder) -> RgResult<()> {
///         builder.read_texture(self.input, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
///         builder.write_texture(self.output, 0, GfxResourceState::UNORDERED_ACCESS)?;
///         Ok(())
///     }
///
///     fn execute(&self, ctx: &RgPassContext, encoder: &mut RgEncoder) -> anyhow::Result<()> {
///         let input = ctx.texture(self.input)?;
///         let output = ctx.texture(self.output)?;
///         // 绑定 descriptor sets, dispatch...
///         encoder.dispatch([8, 8, 1])?;
///         Ok(())
///     }
/// }
/// ```
///
/// # 线程安全
///
/// Pass 需要是 `Send + Sync`：开启并行录制时 `execute` 会在工作线程上调用。
pub trait RgPass: Send + Sync {
    /// 声明 Pass 的资源依赖
    fn setup(&mut self, builder: &mut RgPassBuilder<'_, '_>) -> RgResult<()>;

    /// 录制 Pass 的命令
    ///
    /// 命令编码器已经开始录制，barrier 已经插入。
    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()>;
}
