//! RenderGraph 构建器
//!
//! 单线程的声明阶段：创建/导入资源，添加 Pass，最后 `compile()`。
//! 构建过程中不会调用任何 GPU 接口。

use std::sync::Arc;

use truvis_render_interface::handles::{GfxBufferHandle, GfxSwapchainHandle, GfxTextureHandle};
use truvis_render_interface::resource_desc::{GfxBufferDesc, GfxTextureDesc};
use truvis_render_interface::resource_state::GfxResourceState;

use super::compiled::CompiledGraph;
use super::config::RgConfig;
use super::dependency_graph::RgDependencyGraph;
use super::error::{RgError, RgResult};
use super::export;
use super::handle::{RgBufferHandle, RgGraphId, RgPassHandle, RgResourceHandle, RgTextureHandle};
use super::pass::{
    RgAccess, RgEdgeInfo, RgPass, RgPassBuilder, RgPassExecutorWrapper, RgPassNode, RgPassType, lookup_resource,
};
use super::resource::{RgResourceDesc, RgResourceNode, RgResourceSource};
use super::scheduler::{RgScheduleCache, RgScheduleKey, RgScheduler, compute_shape_hash};

/// 依赖图中的节点
pub enum RgNode<'a> {
    Resource(RgResourceNode),
    Pass(RgPassNode<'a>),
}

impl<'a> RgNode<'a> {
    #[inline]
    pub fn as_resource(&self) -> Option<&RgResourceNode> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Pass(_) => None,
        }
    }

    #[inline]
    pub fn as_pass(&self) -> Option<&RgPassNode<'a>> {
        match self {
            Self::Pass(pass) => Some(pass),
            Self::Resource(_) => None,
        }
    }
}

/// RenderGraph 构建器
///
/// # 使用流程
///
/// 1. 创建 builder: `RenderGraphBuilder::new()`
/// 2. 创建临时资源 / 导入外部资源: `create_texture(...)` / `import_texture(...)`
/// 3. 添加 Pass: `add_render_pass("name", |builder| { ... })`
/// 4. 编译: `builder.compile()`
/// 5. 执行: `executor.execute(&compiled, &task_system)`
///
/// # 生命周期
///
/// `'a` 是 Pass 执行回调可以借用的外部数据的生命周期，
/// 回调可以直接引用外部的 pipeline、geometry 等，不需要 Arc 包装。
pub struct RenderGraphBuilder<'a> {
    id: RgGraphId,
    nodes: RgDependencyGraph<RgNode<'a>, RgEdgeInfo>,
}

impl Default for RenderGraphBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl RenderGraphBuilder<'_> {
    pub fn new() -> Self {
        Self {
            id: RgGraphId::next(),
            nodes: RgDependencyGraph::new(),
        }
    }
}

// getters
impl<'a> RenderGraphBuilder<'a> {
    #[inline]
    pub fn id(&self) -> RgGraphId {
        self.id
    }

    #[inline]
    pub fn nodes(&self) -> &RgDependencyGraph<RgNode<'a>, RgEdgeInfo> {
        &self.nodes
    }

    pub fn pass_count(&self) -> usize {
        self.nodes.iter_nodes().filter(|(_, node)| node.as_pass().is_some()).count()
    }

    pub fn resource_count(&self) -> usize {
        self.nodes.node_count() - self.pass_count()
    }

    pub fn resource<H: RgResourceHandle>(&self, handle: H) -> RgResult<&RgResourceNode> {
        lookup_resource(self.id, &self.nodes, handle)
    }
}

// 资源
impl RenderGraphBuilder<'_> {
    /// 创建由 graph 管理的临时纹理
    pub fn create_texture(&mut self, name: impl Into<String>, desc: GfxTextureDesc) -> RgResult<RgTextureHandle> {
        let name = name.into();
        Self::validate_texture_desc(&name, &desc)?;
        let node = self.nodes.insert(RgNode::Resource(RgResourceNode::new(
            name,
            RgResourceDesc::Texture(desc),
            RgResourceSource::Transient,
        )));
        Ok(RgTextureHandle::new(self.id, node))
    }

    /// 创建由 graph 管理的临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: GfxBufferDesc) -> RgResult<RgBufferHandle> {
        let name = name.into();
        Self::validate_buffer_desc(&name, &desc)?;
        let node = self.nodes.insert(RgNode::Resource(RgResourceNode::new(
            name,
            RgResourceDesc::Buffer(desc),
            RgResourceSource::Transient,
        )));
        Ok(RgBufferHandle::new(self.id, node))
    }

    /// 导入外部纹理
    ///
    /// # 参数
    /// - `handle`: 物理纹理句柄，整个帧内必须有效
    /// - `initial_state`: 纹理当前所处的状态
    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        handle: GfxTextureHandle,
        desc: GfxTextureDesc,
        initial_state: GfxResourceState,
    ) -> RgResult<RgTextureHandle> {
        let name = name.into();
        Self::validate_texture_desc(&name, &desc)?;
        let node = self.nodes.insert(RgNode::Resource(RgResourceNode::new(
            name,
            RgResourceDesc::Texture(desc),
            RgResourceSource::ImportedTexture { handle, initial_state },
        )));
        Ok(RgTextureHandle::new(self.id, node))
    }

    /// 导入外部缓冲区
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        handle: GfxBufferHandle,
        desc: GfxBufferDesc,
        initial_state: GfxResourceState,
    ) -> RgResult<RgBufferHandle> {
        let name = name.into();
        Self::validate_buffer_desc(&name, &desc)?;
        let node = self.nodes.insert(RgNode::Resource(RgResourceNode::new(
            name,
            RgResourceDesc::Buffer(desc),
            RgResourceSource::ImportedBuffer { handle, initial_state },
        )));
        Ok(RgBufferHandle::new(self.id, node))
    }

    /// 导入 swapchain 的 backbuffer，物理句柄在执行时才获取
    pub fn import_backbuffer(
        &mut self,
        name: impl Into<String>,
        swapchain: GfxSwapchainHandle,
        desc: GfxTextureDesc,
    ) -> RgResult<RgTextureHandle> {
        let name = name.into();
        Self::validate_texture_desc(&name, &desc)?;
        let node = self.nodes.insert(RgNode::Resource(RgResourceNode::new(
            name,
            RgResourceDesc::Texture(desc),
            RgResourceSource::Backbuffer { swapchain },
        )));
        Ok(RgTextureHandle::new(self.id, node))
    }

    /// 允许资源没有被任何 Pass 使用
    pub fn allow_lone<H: RgResourceHandle>(&mut self, handle: H) -> RgResult<()> {
        lookup_resource(self.id, &self.nodes, handle)?;
        if let Some(RgNode::Resource(resource)) = self.nodes.node_at_mut(handle.node_id()) {
            resource.set_allow_lone(true);
        }
        Ok(())
    }

    fn validate_texture_desc(name: &str, desc: &GfxTextureDesc) -> RgResult<()> {
        if desc.is_valid() {
            Ok(())
        } else {
            Err(RgError::InvalidDescriptor {
                resource: name.to_string(),
                reason: format!(
                    "{}x{}x{} with {} mips and {} samples",
                    desc.width, desc.height, desc.depth_or_layers, desc.mip_levels, desc.samples
                ),
            })
        }
    }

    fn validate_buffer_desc(name: &str, desc: &GfxBufferDesc) -> RgResult<()> {
        if desc.is_valid() {
            Ok(())
        } else {
            Err(RgError::InvalidDescriptor {
                resource: name.to_string(),
                reason: "buffer size is zero".to_string(),
            })
        }
    }
}

// Pass
impl<'a> RenderGraphBuilder<'a> {
    /// 添加 Render Pass
    ///
    /// `setup` 在本次调用中同步执行一次，用于声明读写并设置执行回调。
    /// `setup` 返回错误时 graph 不会被修改。
    pub fn add_render_pass<F>(&mut self, name: impl Into<String>, setup: F) -> RgResult<RgPassHandle>
    where
        F: FnOnce(&mut RgPassBuilder<'_, 'a>) -> RgResult<()>,
    {
        self.add_pass_node(name.into(), RgPassType::Render, setup)
    }

    pub fn add_compute_pass<F>(&mut self, name: impl Into<String>, setup: F) -> RgResult<RgPassHandle>
    where
        F: FnOnce(&mut RgPassBuilder<'_, 'a>) -> RgResult<()>,
    {
        self.add_pass_node(name.into(), RgPassType::Compute, setup)
    }

    pub fn add_copy_pass<F>(&mut self, name: impl Into<String>, setup: F) -> RgResult<RgPassHandle>
    where
        F: FnOnce(&mut RgPassBuilder<'_, 'a>) -> RgResult<()>,
    {
        self.add_pass_node(name.into(), RgPassType::Copy, setup)
    }

    /// 添加 Present Pass，只需要声明要 present 的 backbuffer
    pub fn add_present_pass(&mut self, name: impl Into<String>, backbuffer: RgTextureHandle) -> RgResult<RgPassHandle> {
        self.add_pass_node(name.into(), RgPassType::Present, |builder| {
            builder.present(backbuffer)?;
            Ok(())
        })
    }

    /// 添加实现了 `RgPass` 的 Pass
    pub fn add_pass<P: RgPass + 'a>(
        &mut self,
        name: impl Into<String>,
        pass_type: RgPassType,
        mut pass: P,
    ) -> RgResult<RgPassHandle> {
        self.add_pass_node(name.into(), pass_type, move |builder| {
            pass.setup(builder)?;
            builder.executor = Some(Box::new(RgPassExecutorWrapper { pass }));
            Ok(())
        })
    }

    fn add_pass_node<F>(&mut self, name: String, pass_type: RgPassType, setup: F) -> RgResult<RgPassHandle>
    where
        F: FnOnce(&mut RgPassBuilder<'_, 'a>) -> RgResult<()>,
    {
        let mut builder = RgPassBuilder::new(self.id, &self.nodes, name, pass_type);
        setup(&mut builder)?;
        let RgPassBuilder { decl, executor, .. } = builder;

        match (pass_type, executor.is_some()) {
            (RgPassType::Present, true) => {
                return Err(RgError::UnsupportedPassOperation {
                    pass: decl.name,
                    operation: "custom executors",
                });
            }
            (RgPassType::Present, false) if decl.present.is_none() => {
                return Err(RgError::UnsupportedPassOperation {
                    pass: decl.name,
                    operation: "presenting without a backbuffer",
                });
            }
            (RgPassType::Present, false) => {}
            (_, false) => return Err(RgError::MissingExecutor { pass: decl.name }),
            (_, true) => {}
        }

        let edges = decl.edges();
        log::trace!("RenderGraph: add {} pass \"{}\" with {} edges", pass_type, decl.name, edges.len());

        let pass_node = self.nodes.insert(RgNode::Pass(RgPassNode { decl, executor }));
        for (resource, info) in edges {
            let linked = match info.access {
                RgAccess::Read => self.nodes.link(resource, pass_node, info),
                RgAccess::Write => self.nodes.link(pass_node, resource, info),
            };
            debug_assert!(linked, "resource node was validated by the pass builder");
        }
        Ok(RgPassHandle::new(self.id, pass_node))
    }
}

// 编译与调试
impl<'a> RenderGraphBuilder<'a> {
    /// graph 结构的哈希，不包含名字和物理句柄
    ///
    /// 结构相同的两帧可以复用同一份编译结果。
    pub fn shape_hash(&self) -> u64 {
        compute_shape_hash(&self.nodes)
    }

    /// 导出 graphviz dot 格式，节点为资源/Pass 名字，边为绑定位置
    pub fn export_dot(&self) -> String {
        export::export_dot(&self.nodes, None)
    }

    /// 以默认配置编译
    pub fn compile(self) -> RgResult<CompiledGraph<'a>> {
        self.compile_with(&RgConfig::default(), None)
    }

    /// 编译渲染图
    ///
    /// 依次执行：孤立资源检查、依赖分析、拓扑排序、剔除、生命周期计算、别名分配、barrier 计算。
    /// 传入 `cache` 时，结构与上一次相同则直接复用上一次的结果。
    pub fn compile_with(self, config: &RgConfig, cache: Option<&mut RgScheduleCache>) -> RgResult<CompiledGraph<'a>> {
        let _span = truvis_crate_tools::profile_span!("RenderGraphBuilder::compile");

        let key = RgScheduleKey::new(self.shape_hash(), self.nodes.node_count(), config);
        let (schedule, fresh) = match cache {
            Some(cache) => cache.get_or_compile(key, || RgScheduler::schedule(&self.nodes, config, key))?,
            None => (Arc::new(RgScheduler::schedule(&self.nodes, config, key)?), true),
        };

        let compiled = CompiledGraph::new(self.id, self.nodes, schedule);
        if fresh && config.print_execution_plan {
            compiled.print_execution_plan();
        }
        Ok(compiled)
    }
}
