//! RenderGraph - 帧级声明式渲染图
//!
//! 每帧重新声明一次：注册资源和 Pass，编译出执行顺序、资源生命周期、显存别名和 barrier，
//! 然后交给执行器录制、提交、present。
//!
//! # 核心概念
//!
//! - **RgTextureHandle / RgBufferHandle**: 虚拟资源句柄，只在创建它的 graph 中有效
//! - **RgPassBuilder**: 在 setup 回调中声明 Pass 读写哪些资源、绑定在哪里
//! - **RenderGraphBuilder**: 构建器，单线程，不调用任何 GPU 接口
//! - **CompiledGraph**: 编译结果，包含执行顺序、生命周期、别名关系和每个 Pass 的 barrier
//! - **RenderGraphExecutor**: 跨帧持有对象池和临时资源池，每帧执行一个 `CompiledGraph`
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_render_graph::render_graph::*;
//!
//! let mut graph = RenderGraphBuilder::new();
//! let gbuffer = graph.create_texture("gbuffer", gbuffer_desc)?;
//! let backbuffer = graph.import_backbuffer("backbuffer", swapchain, backbuffer_desc)?;
//!
//! graph.add_render_pass("geometry", |builder| {
//!     builder.write_render_target(gbuffer, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
//!     builder.set_executor(|_ctx, encoder| {
//!         encoder.draw(3, 1)?;
//!         Ok(())
//!     });
//!     Ok(())
//! })?;
//! graph.add_render_pass("lighting", |builder| {
//!     builder.read_texture(gbuffer, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
//!     builder.write_render_target(backbuffer, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
//!     builder.set_executor(move |ctx, encoder| {
//!         let _gbuffer = ctx.texture(gbuffer)?;
//!         encoder.draw(3, 1)?;
//!         Ok(())
//!     });
//!     Ok(())
//! })?;
//! graph.add_present_pass("present", backbuffer)?;
//!
//! let compiled = graph.compile_with(&config, Some(&mut schedule_cache))?;
//! let report = executor.execute(&compiled, &task_system)?;
//! ```
//!
//! # 模块结构
//!
//! - `handle`: 虚拟句柄与 graph id
//! - `resource`: 资源节点与生命周期
//! - `pass`: Pass 声明、builder、`RgPass` trait
//! - `dependency_graph`: 节点/边的存储
//! - `scheduler`: 依赖分析、拓扑排序、剔除、生命周期、barrier 计划，以及编译结果缓存
//! - `aliasing`: 临时纹理的显存别名分配
//! - `barrier`: barrier 描述
//! - `compiled`: 编译结果与执行计划打印
//! - `context`: Pass 执行时可见的上下文与编码器
//! - `pool`: 每帧复用的 encoder / bind table / descriptor set 池
//! - `transient_pool`: 跨帧复用的临时资源
//! - `executor`: 解析、录制、提交
//! - `export`: graphviz 导出

mod aliasing;
mod barrier;
mod compiled;
mod config;
mod context;
mod dependency_graph;
mod error;
mod executor;
mod export;
mod graph;
mod handle;
mod pass;
mod pool;
mod resource;
mod scheduler;
mod transient_pool;

// Re-exports
pub use aliasing::{RgAliasAssignment, RgAliasCandidate, assign_aliasing, is_alias_compatible};
pub use barrier::{PassBarriers, RgBufferBarrierDesc, RgTextureBarrierDesc, needs_barrier};
pub use compiled::CompiledGraph;
pub use config::RgConfig;
pub use context::{RgEncoder, RgPassContext};
pub use dependency_graph::{RgDependencyGraph, RgEdge};
pub use error::{RgError, RgErrorPhase, RgResult};
pub use executor::{RenderGraphExecutor, RgFrameReport};
pub use graph::{RenderGraphBuilder, RgNode};
pub use handle::{RgBufferHandle, RgGraphId, RgNodeId, RgPassHandle, RgResourceHandle, RgTextureHandle};
pub use pass::{
    RG_MAX_BIND_SETS, RG_MAX_BINDINGS_PER_SET, RG_MAX_RENDER_TARGETS, RG_MAX_UAV_SLOTS, RgAccess, RgBinding,
    RgBufferRead, RgBufferWrite, RgEdgeInfo, RgPass, RgPassBuilder, RgPassDecl, RgPassExecutor, RgPassNode,
    RgPassType, RgPresentTarget, RgResourceUse, RgTextureRead, RgTextureWrite, RgTextureWriteTarget,
};
pub use pool::{RgFramePools, RgObjectPool, RgPooledObject};
pub use resource::{RgLifespan, RgResourceDesc, RgResourceNode, RgResourceSource};
pub use scheduler::{RgSchedule, RgScheduleCache, RgScheduleKey, RgScheduler, compute_shape_hash};
pub use transient_pool::RgTransientPool;
