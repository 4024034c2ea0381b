//! 执行器
//!
//! 每帧分三步：
//! 1. 解析：按执行顺序为资源绑定物理句柄（外部资源、backbuffer、资源池、别名内存），
//!    把编译期的 barrier 描述替换成物理 barrier
//! 2. 录制：每个 Pass 一个 encoder，开启 `parallel_recording` 时通过 `TaskSystem` 并行录制
//! 3. 提交：按执行顺序提交所有 encoder，然后 present
//!
//! 任何一步失败都放弃整帧：不提交，也不 present。

use std::sync::Arc;

use truvis_render_interface::frame_counter::{FrameCounter, FrameLabel};
use truvis_render_interface::gfx_device::{GfxColorAttachment, GfxDepthAttachment, GfxDevice, GfxRenderPassInfo};
use truvis_render_interface::gfx_error::GfxError;
use truvis_render_interface::handles::{GfxBufferHandle, GfxEncoderHandle, GfxSwapchainHandle, GfxTextureHandle};
use truvis_render_interface::resource_desc::{GfxBufferDesc, GfxTextureDesc};
use truvis_render_interface::resource_state::GfxBarrier;
use truvis_render_interface::task_system::{GfxTask, TaskCounter, TaskSystem};

use super::barrier::PassBarriers;
use super::compiled::CompiledGraph;
use super::config::RgConfig;
use super::context::{RgBoundResource, RgEncoder, RgPassContext};
use super::error::{RgError, RgResult};
use super::handle::{RgGraphId, RgNodeId};
use super::pass::{RgPassDecl, RgPassExecutor, RgPassType, RgTextureWriteTarget};
use super::pool::RgFramePools;
use super::resource::{RgResourceDesc, RgResourceNode, RgResourceSource};
use super::scheduler::RgSchedule;
use super::transient_pool::RgTransientPool;

/// 一帧的执行统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgFrameReport {
    pub frame_id: u64,
    pub passes_executed: usize,
    pub passes_culled: usize,
    /// barrier 总数
    pub barriers: usize,
    /// `cmd_resource_barriers` 调用次数
    pub barrier_batches: usize,
    pub textures_created: usize,
    pub textures_reused: usize,
    /// 复用了其他纹理显存的纹理数量
    pub textures_aliased: usize,
    pub buffers_created: usize,
    pub buffers_reused: usize,
    pub encoders_used: usize,
    /// 是否通过 TaskSystem 并行录制
    pub parallel: bool,
    pub presented: usize,
}

/// RenderGraph 执行器
///
/// 跨帧持有：每个 `FrameLabel` 一组对象池、临时资源池、帧计数器。
pub struct RenderGraphExecutor {
    device: Arc<dyn GfxDevice>,
    config: RgConfig,
    frame_counter: FrameCounter,
    frame_pools: [RgFramePools; FrameCounter::fif_count()],
    transient_pool: RgTransientPool,
}

// new & init
impl RenderGraphExecutor {
    pub fn new(device: Arc<dyn GfxDevice>, config: RgConfig) -> Self {
        let frame_pools = std::array::from_fn(|_| RgFramePools::new(&config));
        Self {
            device,
            config,
            frame_counter: FrameCounter::default(),
            frame_pools,
            transient_pool: RgTransientPool::new(),
        }
    }
}

// getters
impl RenderGraphExecutor {
    #[inline]
    pub fn config(&self) -> &RgConfig {
        &self.config
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn transient_pool(&self) -> &RgTransientPool {
        &self.transient_pool
    }

    #[inline]
    pub fn frame_pools(&self, frame_label: FrameLabel) -> &RgFramePools {
        &self.frame_pools[*frame_label]
    }
}

// 执行
impl RenderGraphExecutor {
    /// 执行一帧
    ///
    /// 无论成功与否帧计数器都会前进。返回 `DeviceLost` 时所有池化资源已经被销毁，
    /// 调用者需要重新导入外部资源后再执行下一帧。
    pub fn execute(&mut self, graph: &CompiledGraph<'_>, task_system: &dyn TaskSystem) -> RgResult<RgFrameReport> {
        let _span = truvis_crate_tools::profile_span!("RenderGraphExecutor::execute");

        let frame_id = self.frame_counter.frame_id();
        let frame_name = self.frame_counter.frame_name();
        let result = self.execute_frame(graph, task_system);

        match &result {
            Ok(report) => log::debug!(
                "{frame_name} RenderGraph: {} passes ({} culled), {} barriers in {} batches, textures {}/{}/{} (new/reused/aliased)",
                report.passes_executed,
                report.passes_culled,
                report.barriers,
                report.barrier_batches,
                report.textures_created,
                report.textures_reused,
                report.textures_aliased
            ),
            Err(err) if err.requires_teardown() => {
                log::warn!("{frame_name} RenderGraph: {err}, destroying all pooled resources");
                self.destroy();
            }
            Err(err) => log::warn!("{frame_name} RenderGraph: frame aborted: {err}"),
        }

        self.transient_pool.trim(self.device.as_ref(), frame_id, self.config.transient_max_idle_frames);
        self.frame_counter.next_frame();
        result
    }

    /// 销毁所有池化对象与临时资源
    pub fn destroy(&mut self) {
        self.transient_pool.destroy_all(self.device.as_ref());
        for pools in &self.frame_pools {
            pools.destroy(self.device.as_ref());
        }
    }

    fn execute_frame(&mut self, graph: &CompiledGraph<'_>, task_system: &dyn TaskSystem) -> RgResult<RgFrameReport> {
        let frame_label = self.frame_counter.frame_label();
        let env = RgFrameEnv {
            device: self.device.as_ref(),
            pools: &self.frame_pools[*frame_label],
            task_system,
            graph_id: graph.id(),
            frame_id: self.frame_counter.frame_id(),
            frame_label,
            parallel: self.config.parallel_recording,
        };
        env.pools.reset();

        let mut resources = RgFrameResources::new(graph.nodes().node_count());
        let result = Self::run_frame(graph, &env, &mut self.transient_pool, &mut resources);
        // 临时资源只在帧结束时归还，同一帧内不会被隐式复用
        resources.release(&mut self.transient_pool, env.frame_id);
        result
    }

    fn run_frame(
        graph: &CompiledGraph<'_>,
        env: &RgFrameEnv<'_>,
        transient_pool: &mut RgTransientPool,
        resources: &mut RgFrameResources,
    ) -> RgResult<RgFrameReport> {
        let schedule = graph.schedule();
        let mut report = RgFrameReport {
            frame_id: env.frame_id,
            passes_culled: schedule.culled().len(),
            ..Default::default()
        };

        let mut jobs = Vec::with_capacity(schedule.order().len());
        for (order_idx, &pass_node) in schedule.order().iter().enumerate() {
            for &node in &schedule.acquires[order_idx] {
                let resource = graph
                    .resource(node)
                    .ok_or_else(|| RgError::InvalidGfxHandle(format!("node {node:?} is not a resource")))?;
                resources.acquire(env.device, transient_pool, schedule, node, resource, &mut report)?;
            }

            let pass = graph
                .pass(pass_node)
                .ok_or_else(|| RgError::InvalidGfxHandle(format!("node {pass_node:?} is not a pass")))?;
            let barriers = resources.physical_barriers(&schedule.barriers[order_idx])?;
            let render_pass = resources.render_pass_info(&pass.decl)?;

            // 只记录生命周期事件，资源统一在帧末归还
            for &node in &schedule.retires[order_idx] {
                let name = graph.resource(node).map_or("<unknown>", RgResourceNode::name);
                match schedule.alias_successor(node) {
                    Some(successor) => log::trace!("RenderGraph: \"{name}\" hands its memory to {successor:?}"),
                    None => log::trace!("RenderGraph: retire \"{name}\" after \"{}\"", pass.name()),
                }
            }

            report.barriers += barriers.len();
            if !barriers.is_empty() {
                report.barrier_batches += 1;
            }
            jobs.push(RgRecordJob {
                decl: &pass.decl,
                executor: pass.executor.as_deref(),
                barriers,
                render_pass,
            });
        }

        let recorder = RgRecorder {
            graph_id: env.graph_id,
            device: env.device,
            pools: env.pools,
            bound: &resources.bound,
            frame_id: env.frame_id,
            frame_label: env.frame_label,
        };
        report.parallel = env.parallel && jobs.len() > 1;
        let encoders = if report.parallel {
            recorder.record_parallel(&jobs, env.task_system)?
        } else {
            jobs.iter().map(|job| recorder.record(job)).collect::<RgResult<Vec<_>>>()?
        };

        env.device.submit(&encoders)?;
        for job in &jobs {
            if let Some(present) = &job.decl.present {
                env.device.present(present.swapchain)?;
                report.presented += 1;
            }
        }

        report.passes_executed = jobs.len();
        report.encoders_used = encoders.len();
        Ok(report)
    }
}

impl Drop for RenderGraphExecutor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// 一帧内不变的执行环境
struct RgFrameEnv<'f> {
    device: &'f dyn GfxDevice,
    pools: &'f RgFramePools,
    task_system: &'f dyn TaskSystem,
    graph_id: RgGraphId,
    frame_id: u64,
    frame_label: FrameLabel,
    parallel: bool,
}

/// 一帧内资源的物理绑定，只由协调线程修改
struct RgFrameResources {
    /// 按节点 id 索引
    bound: Vec<Option<RgBoundResource>>,
    /// 临时纹理所在的物理内存：别名链的根纹理及其描述
    roots: Vec<Option<(GfxTextureHandle, GfxTextureDesc)>>,
    /// 本帧从资源池取出的资源，帧结束时归还
    held_textures: Vec<(GfxTextureDesc, GfxTextureHandle)>,
    held_buffers: Vec<(GfxBufferDesc, GfxBufferHandle)>,
    backbuffers: Vec<(GfxSwapchainHandle, GfxTextureHandle)>,
}

impl RgFrameResources {
    fn new(node_count: usize) -> Self {
        Self {
            bound: vec![None; node_count],
            roots: vec![None; node_count],
            held_textures: Vec::new(),
            held_buffers: Vec::new(),
            backbuffers: Vec::new(),
        }
    }

    /// 在资源第一次被使用之前绑定物理句柄
    fn acquire(
        &mut self,
        device: &dyn GfxDevice,
        transient_pool: &mut RgTransientPool,
        schedule: &RgSchedule,
        node: RgNodeId,
        resource: &RgResourceNode,
        report: &mut RgFrameReport,
    ) -> RgResult<()> {
        let name = resource.name();
        let bound = match (*resource.desc(), *resource.source()) {
            (RgResourceDesc::Texture(desc), RgResourceSource::ImportedTexture { handle, .. }) => {
                RgBoundResource::Texture { handle, desc }
            }
            (RgResourceDesc::Buffer(desc), RgResourceSource::ImportedBuffer { handle, .. }) => {
                RgBoundResource::Buffer { handle, desc }
            }
            (RgResourceDesc::Texture(desc), RgResourceSource::Backbuffer { swapchain }) => {
                let handle = match self.backbuffers.iter().find(|(owner, _)| *owner == swapchain) {
                    Some(&(_, handle)) => handle,
                    None => {
                        let handle = device.acquire_backbuffer(swapchain)?;
                        self.backbuffers.push((swapchain, handle));
                        handle
                    }
                };
                RgBoundResource::Texture { handle, desc }
            }
            (RgResourceDesc::Texture(desc), RgResourceSource::Transient) => {
                let alias_root = schedule.aliasing_source(node).and_then(|source| self.roots[source.index()]);
                let (handle, root) = match alias_root {
                    Some((root, root_desc)) => {
                        report.textures_aliased += 1;
                        let handle = if root_desc == desc {
                            root
                        } else {
                            transient_pool.acquire_alias_view(device, root, &desc, name)?.0
                        };
                        log::trace!("RenderGraph: \"{name}\" aliases {root:?} as {handle:?}");
                        (handle, (root, root_desc))
                    }
                    None => {
                        let (handle, reused) = transient_pool.acquire_texture(device, &desc, name)?;
                        if reused {
                            report.textures_reused += 1;
                        } else {
                            report.textures_created += 1;
                        }
                        self.held_textures.push((desc, handle));
                        (handle, (handle, desc))
                    }
                };
                self.roots[node.index()] = Some(root);
                RgBoundResource::Texture { handle, desc }
            }
            (RgResourceDesc::Buffer(desc), RgResourceSource::Transient) => {
                let (handle, reused) = transient_pool.acquire_buffer(device, &desc, name)?;
                if reused {
                    report.buffers_reused += 1;
                } else {
                    report.buffers_created += 1;
                }
                self.held_buffers.push((desc, handle));
                RgBoundResource::Buffer { handle, desc }
            }
            _ => {
                return Err(RgError::InvalidGfxHandle(format!(
                    "resource \"{name}\" has a source that does not match its kind"
                )));
            }
        };
        self.bound[node.index()] = Some(bound);
        Ok(())
    }

    fn texture(&self, node: RgNodeId) -> RgResult<(GfxTextureHandle, GfxTextureDesc)> {
        match self.bound.get(node.index()).copied().flatten() {
            Some(RgBoundResource::Texture { handle, desc }) => Ok((handle, desc)),
            _ => Err(RgError::InvalidGfxHandle(format!("texture node {node:?} is not bound"))),
        }
    }

    fn physical_barriers(&self, barriers: &PassBarriers) -> RgResult<Vec<GfxBarrier>> {
        let mut physical = Vec::with_capacity(barriers.len());
        for barrier in &barriers.texture_barriers {
            let (handle, _) = self.texture(barrier.resource)?;
            physical.push(barrier.to_gfx_barrier(handle));
        }
        for barrier in &barriers.buffer_barriers {
            match self.bound.get(barrier.resource.index()).copied().flatten() {
                Some(RgBoundResource::Buffer { handle, .. }) => physical.push(barrier.to_gfx_barrier(handle)),
                _ => {
                    return Err(RgError::InvalidGfxHandle(format!(
                        "buffer node {:?} is not bound",
                        barrier.resource
                    )));
                }
            }
        }
        Ok(physical)
    }

    /// Render Pass 的附件：颜色附件按 MRT 索引排序，尺寸取第一个附件
    fn render_pass_info(&self, decl: &RgPassDecl) -> RgResult<Option<GfxRenderPassInfo>> {
        if decl.pass_type != RgPassType::Render {
            return Ok(None);
        }

        let mut colors = Vec::new();
        let mut depth = None;
        let mut depth_extent = None;
        for write in &decl.texture_writes {
            match write.target {
                RgTextureWriteTarget::RenderTarget {
                    mrt_index,
                    load_op,
                    store_op,
                } => {
                    let (texture, desc) = self.texture(write.texture.node)?;
                    colors.push((mrt_index, desc, GfxColorAttachment {
                        texture,
                        load_op,
                        store_op,
                    }));
                }
                RgTextureWriteTarget::DepthStencil { load_op, store_op } => {
                    let (texture, desc) = self.texture(write.texture.node)?;
                    depth_extent = Some([desc.width, desc.height]);
                    depth = Some(GfxDepthAttachment {
                        texture,
                        load_op,
                        store_op,
                        read_only: false,
                    });
                }
                RgTextureWriteTarget::Uav { .. } | RgTextureWriteTarget::CopyDst => {}
            }
        }
        if colors.is_empty() && depth.is_none() {
            return Ok(None);
        }

        colors.sort_by_key(|(mrt_index, ..)| *mrt_index);
        let extent = colors.first().map(|(_, desc, _)| [desc.width, desc.height]).or(depth_extent);
        Ok(Some(GfxRenderPassInfo {
            color_attachments: colors.into_iter().map(|(_, _, attachment)| attachment).collect(),
            depth_attachment: depth,
            extent: extent.unwrap_or_default(),
        }))
    }

    fn release(&mut self, transient_pool: &mut RgTransientPool, frame_id: u64) {
        for (desc, handle) in self.held_textures.drain(..) {
            transient_pool.release_texture(desc, handle, frame_id);
        }
        for (desc, handle) in self.held_buffers.drain(..) {
            transient_pool.release_buffer(desc, handle, frame_id);
        }
    }
}

/// 一个 Pass 的录制任务，解析阶段就已经确定了所有物理资源
struct RgRecordJob<'j> {
    decl: &'j RgPassDecl,
    executor: Option<&'j dyn RgPassExecutor>,
    barriers: Vec<GfxBarrier>,
    render_pass: Option<GfxRenderPassInfo>,
}

/// 录制器，只读，可以在多个线程间共享
struct RgRecorder<'r> {
    graph_id: RgGraphId,
    device: &'r dyn GfxDevice,
    pools: &'r RgFramePools,
    bound: &'r [Option<RgBoundResource>],
    frame_id: u64,
    frame_label: FrameLabel,
}

impl RgRecorder<'_> {
    fn record(&self, job: &RgRecordJob<'_>) -> RgResult<GfxEncoderHandle> {
        let name = &job.decl.name;
        let encoder = self.pools.encoders.pop(self.device)?;
        self.device.begin_encoder(encoder, name)?;
        self.device.cmd_begin_label(encoder, name);

        if !job.barriers.is_empty() {
            self.device.cmd_resource_barriers(encoder, &job.barriers)?;
        }
        if let Some(info) = &job.render_pass {
            self.device.cmd_begin_render_pass(encoder, info)?;
        }

        if let Some(executor) = job.executor {
            let ctx = RgPassContext {
                graph_id: self.graph_id,
                decl: job.decl,
                frame_id: self.frame_id,
                frame_label: self.frame_label,
                bound: self.bound,
                device: self.device,
                pools: self.pools,
            };
            let mut rg_encoder = RgEncoder {
                device: self.device,
                encoder,
            };
            executor.execute(&ctx, &mut rg_encoder).map_err(|source| {
                if matches!(source.downcast_ref::<GfxError>(), Some(GfxError::DeviceLost)) {
                    RgError::DeviceLost
                } else {
                    RgError::PassExecutionFailed {
                        pass: name.clone(),
                        source,
                    }
                }
            })?;
        }

        if job.render_pass.is_some() {
            self.device.cmd_end_render_pass(encoder)?;
        }
        self.device.cmd_end_label(encoder);
        self.device.end_encoder(encoder)?;
        Ok(encoder)
    }

    /// 每个 Pass 一个任务；录制完成的顺序不影响提交顺序，失败时返回执行顺序上的第一个错误
    fn record_parallel(
        &self,
        jobs: &[RgRecordJob<'_>],
        task_system: &dyn TaskSystem,
    ) -> RgResult<Vec<GfxEncoderHandle>> {
        let _span = truvis_crate_tools::profile_span!("RgRecorder::record_parallel");

        let mut results: Vec<Option<RgResult<GfxEncoderHandle>>> = jobs.iter().map(|_| None).collect();
        let counter = TaskCounter::new();
        let tasks: Vec<GfxTask<'_>> = jobs
            .iter()
            .zip(results.iter_mut())
            .map(|(job, slot)| Box::new(move || *slot = Some(self.record(job))) as GfxTask<'_>)
            .collect();
        task_system.submit(tasks, &counter);
        task_system.wait(&counter);

        results
            .into_iter()
            .zip(jobs)
            .map(|(result, job)| {
                result.unwrap_or_else(|| {
                    Err(RgError::InvalidGfxHandle(format!("pass \"{}\" was not recorded", job.decl.name)))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use truvis_render_interface::gfx_device::{GfxLoadOp, GfxStoreOp};
    use truvis_render_interface::headless_device::{GfxHeadlessCommand, GfxHeadlessDevice};
    use truvis_render_interface::resource_desc::{GfxBufferUsage, GfxFormat, GfxTextureUsage};
    use truvis_render_interface::resource_state::{GfxBarrierResource, GfxResourceState};
    use truvis_render_interface::task_system::{InlineTaskSystem, RayonTaskSystem};

    use super::*;
    use crate::render_graph::graph::RenderGraphBuilder;

    const SIZE: u32 = 256;

    fn rt_desc(format: GfxFormat) -> GfxTextureDesc {
        GfxTextureDesc::new_2d(SIZE, SIZE, format, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED)
    }

    fn setup(config: RgConfig) -> (Arc<GfxHeadlessDevice>, GfxSwapchainHandle, RenderGraphExecutor) {
        let device = Arc::new(GfxHeadlessDevice::new());
        let swapchain = device.create_swapchain(SIZE, SIZE, GfxFormat::Bgra8Srgb, 2).unwrap();
        let executor = RenderGraphExecutor::new(device.clone(), config);
        (device, swapchain, executor)
    }

    /// T -> P1 -> P2 -> BB -> Present
    fn present_graph<'a>(swapchain: GfxSwapchainHandle, fail_lighting: bool) -> CompiledGraph<'a> {
        let mut graph = RenderGraphBuilder::new();
        let t = graph.create_texture("T", rt_desc(GfxFormat::Rgba8Unorm)).unwrap();
        let bb = graph.import_backbuffer("BB", swapchain, rt_desc(GfxFormat::Bgra8Srgb)).unwrap();

        graph
            .add_render_pass("P1", |builder| {
                builder.write_render_target(t, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
                builder.set_executor(|_, encoder| {
                    encoder.draw(3, 1)?;
                    Ok(())
                });
                Ok(())
            })
            .unwrap();
        graph
            .add_render_pass("P2", |builder| {
                builder.read_texture(t, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
                builder.write_render_target(bb, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
                builder.set_executor(move |ctx, encoder| {
                    if fail_lighting {
                        anyhow::bail!("lighting pipeline is missing");
                    }
                    ctx.texture(t)?;
                    encoder.draw(3, 1)?;
                    Ok(())
                });
                Ok(())
            })
            .unwrap();
        graph.add_present_pass("Present", bb).unwrap();
        graph.compile().unwrap()
    }

    fn labels(device: &GfxHeadlessDevice) -> Vec<String> {
        device.submissions().into_iter().map(|submission| submission.label).collect()
    }

    fn barrier_batches(commands: &[GfxHeadlessCommand]) -> Vec<&Vec<GfxBarrier>> {
        commands
            .iter()
            .filter_map(|command| match command {
                GfxHeadlessCommand::Barriers(barriers) => Some(barriers),
                _ => None,
            })
            .collect()
    }

    fn first_color_attachment(commands: &[GfxHeadlessCommand]) -> Option<GfxTextureHandle> {
        commands.iter().find_map(|command| match command {
            GfxHeadlessCommand::BeginRenderPass(info) => info.color_attachments.first().map(|color| color.texture),
            _ => None,
        })
    }

    #[test]
    fn test_frame_submits_in_order_and_presents() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());
        let compiled = present_graph(swapchain, false);

        let report = executor.execute(&compiled, &InlineTaskSystem).unwrap();
        assert_eq!(labels(&device), vec!["P1", "P2", "Present"]);
        assert_eq!(report.passes_executed, 3);
        assert_eq!(report.presented, 1);
        assert_eq!(report.textures_created, 1);
        assert_eq!(report.encoders_used, 3);
        assert_eq!(device.stats().presents, 1);

        let submissions = device.submissions();
        assert_eq!(submissions[0].commands.first(), Some(&GfxHeadlessCommand::BeginLabel("P1".to_string())));
        assert!(submissions[0].commands.contains(&GfxHeadlessCommand::Draw {
            vertex_count: 3,
            instance_count: 1
        }));
        assert!(!submissions[2].commands.iter().any(|command| matches!(command, GfxHeadlessCommand::BeginRenderPass(_))));
        assert_eq!(executor.frame_counter().frame_id(), 1);
    }

    #[test]
    fn test_second_frame_reuses_transient_textures() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());

        executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();
        let report = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();
        assert_eq!(report.textures_created, 0);
        assert_eq!(report.textures_reused, 1);
        assert_eq!(device.stats().textures_created, 1);
        assert_eq!(device.stats().presents, 2);
    }

    #[test]
    fn test_one_barrier_batch_per_pass() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());
        let report = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();

        assert_eq!(report.barriers, 4);
        assert_eq!(report.barrier_batches, 3);
        let submissions = device.submissions();
        for submission in &submissions {
            assert_eq!(barrier_batches(&submission.commands).len(), 1, "{}", submission.label);
        }

        let lighting = barrier_batches(&submissions[1].commands)[0];
        assert_eq!(lighting.len(), 2);
        let present = barrier_batches(&submissions[2].commands)[0];
        assert_eq!(present[0].before, GfxResourceState::RENDER_TARGET);
        assert_eq!(present[0].after, GfxResourceState::PRESENT);
    }

    /// T1 -> P1 -> P2 -> out, T3 -> P3 -> P4 -> out
    fn aliasing_graph<'a>(out: GfxTextureHandle) -> CompiledGraph<'a> {
        let mut graph = RenderGraphBuilder::new();
        let t1 = graph.create_texture("T1", rt_desc(GfxFormat::Rgba8Unorm)).unwrap();
        let t3 = graph.create_texture("T3", rt_desc(GfxFormat::R32Float)).unwrap();
        let out = graph
            .import_texture("out", out, rt_desc(GfxFormat::Rgba8Unorm), GfxResourceState::SHADER_RESOURCE)
            .unwrap();

        for (producer, consumer, texture) in [("P1", "P2", t1), ("P3", "P4", t3)] {
            graph
                .add_render_pass(producer, |builder| {
                    builder.write_render_target(texture, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
                    builder.set_executor(|_, _| Ok(()));
                    Ok(())
                })
                .unwrap();
            graph
                .add_render_pass(consumer, |builder| {
                    builder.read_texture(texture, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
                    builder.write_render_target(out, 0, GfxLoadOp::Load, GfxStoreOp::Store)?;
                    builder.set_executor(|_, _| Ok(()));
                    Ok(())
                })
                .unwrap();
        }
        graph.compile().unwrap()
    }

    #[test]
    fn test_aliased_texture_shares_memory() {
        let (device, _, mut executor) = setup(RgConfig::default());
        let out = device.create_texture(&rt_desc(GfxFormat::Rgba8Unorm), "out").unwrap();

        let report = executor.execute(&aliasing_graph(out), &InlineTaskSystem).unwrap();
        assert_eq!(report.textures_created, 1);
        assert_eq!(report.textures_aliased, 1);
        assert_eq!(device.stats().aliased_textures_created, 1);

        let submissions = device.submissions();
        let t1 = first_color_attachment(&submissions[0].commands).unwrap();
        let t3 = first_color_attachment(&submissions[2].commands).unwrap();
        assert_ne!(t1, t3);
        assert_eq!(device.texture_memory_source(t3), Some(t1));

        let p3_barriers = barrier_batches(&submissions[2].commands)[0];
        let t3_barrier = p3_barriers
            .iter()
            .find(|barrier| barrier.resource == GfxBarrierResource::Texture(t3))
            .unwrap();
        assert!(t3_barrier.aliasing);
        assert_eq!(t3_barrier.before, GfxResourceState::UNDEFINED);

        // 第二帧复用根纹理与别名 view
        let report = executor.execute(&aliasing_graph(out), &InlineTaskSystem).unwrap();
        assert_eq!(report.textures_reused, 1);
        assert_eq!(report.textures_aliased, 1);
        assert_eq!(device.stats().textures_created, 2);
        assert_eq!(device.stats().aliased_textures_created, 1);
    }

    #[test]
    fn test_out_of_memory_aborts_frame() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());
        device.set_memory_budget(Some(1024));

        let result = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem);
        assert!(matches!(result, Err(RgError::OutOfDeviceMemory(_))));
        assert!(device.submissions().is_empty());
        assert_eq!(device.stats().presents, 0);

        device.set_memory_budget(None);
        let report = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();
        assert_eq!(report.presented, 1);
    }

    #[test]
    fn test_failed_pass_skips_submit_and_present() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());

        match executor.execute(&present_graph(swapchain, true), &RayonTaskSystem::new()) {
            Err(RgError::PassExecutionFailed { pass, source }) => {
                assert_eq!(pass, "P2");
                assert!(source.to_string().contains("lighting pipeline"));
            }
            other => panic!("expected a pass failure, got {other:?}"),
        }
        assert_eq!(device.stats().submits, 0);
        assert_eq!(device.stats().presents, 0);
        // 失败的帧归还了临时纹理
        assert_eq!(executor.transient_pool().free_texture_count(), 1);
    }

    #[test]
    fn test_device_lost_destroys_pooled_resources() {
        let (device, swapchain, mut executor) = setup(RgConfig::default());
        executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();
        assert_eq!(executor.transient_pool().free_texture_count(), 1);

        device.set_device_lost(true);
        let result = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem);
        assert!(matches!(result, Err(RgError::DeviceLost)));
        assert_eq!(executor.transient_pool().free_texture_count(), 0);
        assert_eq!(device.live_encoder_count(), 0);
        assert_eq!(device.live_texture_count(), 0);

        device.set_device_lost(false);
        let report = executor.execute(&present_graph(swapchain, false), &InlineTaskSystem).unwrap();
        assert_eq!(report.textures_created, 1);
        assert_eq!(report.presented, 1);
    }

    fn compute_graph<'a>(buffers: &[GfxBufferHandle]) -> CompiledGraph<'a> {
        let mut graph = RenderGraphBuilder::new();
        for (idx, &buffer) in buffers.iter().enumerate() {
            let buffer = graph
                .import_buffer(
                    format!("buffer{idx}"),
                    buffer,
                    GfxBufferDesc::new(64, GfxBufferUsage::STORAGE),
                    GfxResourceState::UNDEFINED,
                )
                .unwrap();
            graph
                .add_compute_pass(format!("compute{idx}"), |builder| {
                    builder.write_buffer(buffer, 0, GfxResourceState::UNORDERED_ACCESS)?;
                    builder.set_executor(move |ctx, encoder| {
                        ctx.buffer(buffer)?;
                        let bind_table = ctx.alloc_bind_table()?;
                        encoder.bind_table(0, bind_table)?;
                        encoder.dispatch([8, 1, 1])?;
                        Ok(())
                    });
                    Ok(())
                })
                .unwrap();
        }
        graph.compile().unwrap()
    }

    #[test]
    fn test_parallel_recording_keeps_submission_order() {
        let (device, _, mut parallel_executor) = setup(RgConfig::default());
        let buffers: Vec<_> = (0..12)
            .map(|idx| device.create_buffer(&GfxBufferDesc::new(64, GfxBufferUsage::STORAGE), &format!("b{idx}")).unwrap())
            .collect();
        let task_system = RayonTaskSystem::with_threads(4).unwrap();

        let report = parallel_executor.execute(&compute_graph(&buffers), &task_system).unwrap();
        assert!(report.parallel);
        let parallel_labels = labels(&device);
        device.clear_submissions();

        let mut serial_executor = RenderGraphExecutor::new(device.clone(), RgConfig {
            parallel_recording: false,
            ..Default::default()
        });
        let report = serial_executor.execute(&compute_graph(&buffers), &task_system).unwrap();
        assert!(!report.parallel);

        let expected: Vec<_> = (0..12).map(|idx| format!("compute{idx}")).collect();
        assert_eq!(parallel_labels, expected);
        assert_eq!(labels(&device), expected);
        for submission in device.submissions() {
            assert!(submission.commands.contains(&GfxHeadlessCommand::Dispatch([8, 1, 1])));
        }
    }

    #[test]
    fn test_undeclared_resource_is_rejected() {
        let (_, _, mut executor) = setup(RgConfig::default());
        let mut graph = RenderGraphBuilder::new();
        let declared = graph.create_texture("declared", rt_desc(GfxFormat::Rgba8Unorm)).unwrap();
        let hidden = graph.create_texture("hidden", rt_desc(GfxFormat::Rgba8Unorm)).unwrap();
        graph.allow_lone(hidden).unwrap();
        graph
            .add_render_pass("sneaky", |builder| {
                builder.write_render_target(declared, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
                builder.never_cull();
                builder.set_executor(move |ctx, _| {
                    ctx.texture(hidden)?;
                    Ok(())
                });
                Ok(())
            })
            .unwrap();

        match executor.execute(&graph.compile().unwrap(), &InlineTaskSystem) {
            Err(RgError::PassExecutionFailed { source, .. }) => {
                assert!(matches!(source.downcast_ref::<RgError>(), Some(RgError::UndeclaredResource { .. })));
            }
            other => panic!("expected an undeclared resource failure, got {other:?}"),
        }
    }

    #[test]
    fn test_render_pass_attachments_and_extent() {
        let (device, _, mut executor) = setup(RgConfig::default());
        let mut graph = RenderGraphBuilder::new();
        let gbuffer0 =
            graph.create_texture("gbuffer0", GfxTextureDesc::new_2d(128, 128, GfxFormat::Rgba8Unorm, GfxTextureUsage::RENDER_TARGET)).unwrap();
        let gbuffer1 =
            graph.create_texture("gbuffer1", GfxTextureDesc::new_2d(128, 128, GfxFormat::Rgba16Float, GfxTextureUsage::RENDER_TARGET)).unwrap();
        let depth =
            graph.create_texture("depth", GfxTextureDesc::new_2d(128, 128, GfxFormat::D32Float, GfxTextureUsage::DEPTH_STENCIL)).unwrap();

        graph
            .add_render_pass("gbuffer", |builder| {
                builder.write_render_target(gbuffer1, 1, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
                builder.write_render_target(gbuffer0, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
                builder.write_depth_stencil(depth, GfxLoadOp::Clear([1.0, 0.0, 0.0, 0.0]), GfxStoreOp::DontCare)?;
                builder.never_cull();
                builder.set_executor(|ctx, encoder| {
                    anyhow::ensure!(ctx.render_target_extent() == Some([128, 128]));
                    anyhow::ensure!(ctx.frame_id() == 0);
                    encoder.draw(36, 4)?;
                    Ok(())
                });
                Ok(())
            })
            .unwrap();

        executor.execute(&graph.compile().unwrap(), &InlineTaskSystem).unwrap();
        let submissions = device.submissions();
        let info = submissions[0]
            .commands
            .iter()
            .find_map(|command| match command {
                GfxHeadlessCommand::BeginRenderPass(info) => Some(info.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(info.extent, [128, 128]);
        assert_eq!(info.color_attachments.len(), 2);
        assert_eq!(info.color_attachments[0].load_op, GfxLoadOp::Clear([0.0; 4]));
        assert!(info.depth_attachment.is_some());
        assert_eq!(submissions[0].commands.last(), Some(&GfxHeadlessCommand::EndLabel));
    }
}
