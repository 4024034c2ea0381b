use std::sync::Arc;

use ash::vk;
use itertools::Itertools;
use truvis_render_interface::resource_state::GfxResourceState;

use super::barrier::PassBarriers;
use super::dependency_graph::RgDependencyGraph;
use super::export;
use super::graph::RgNode;
use super::handle::{RgGraphId, RgNodeId, RgResourceHandle, RgTextureHandle};
use super::pass::{RgEdgeInfo, RgPassDecl, RgPassNode};
use super::resource::{RgLifespan, RgResourceNode};
use super::scheduler::RgSchedule;

/// 编译后的渲染图
///
/// 持有构建阶段的节点（包括 Pass 的执行回调）以及只读的编译结果，
/// 可以被执行器执行任意多次。
pub struct CompiledGraph<'a> {
    id: RgGraphId,
    nodes: RgDependencyGraph<RgNode<'a>, RgEdgeInfo>,
    schedule: Arc<RgSchedule>,
}

// new & init
impl<'a> CompiledGraph<'a> {
    pub(crate) fn new(
        id: RgGraphId,
        nodes: RgDependencyGraph<RgNode<'a>, RgEdgeInfo>,
        schedule: Arc<RgSchedule>,
    ) -> Self {
        Self { id, nodes, schedule }
    }
}

// getters
impl<'a> CompiledGraph<'a> {
    #[inline]
    pub fn id(&self) -> RgGraphId {
        self.id
    }

    #[inline]
    pub fn schedule(&self) -> &RgSchedule {
        &self.schedule
    }

    #[inline]
    pub fn schedule_arc(&self) -> &Arc<RgSchedule> {
        &self.schedule
    }

    #[inline]
    pub(crate) fn nodes(&self) -> &RgDependencyGraph<RgNode<'a>, RgEdgeInfo> {
        &self.nodes
    }

    /// 按执行顺序排列的 Pass
    #[inline]
    pub fn ordered_passes(&self) -> &[RgNodeId] {
        &self.schedule.order
    }

    pub fn ordered_pass_names(&self) -> Vec<&str> {
        self.schedule.order.iter().filter_map(|&node| self.pass(node)).map(RgPassNode::name).collect()
    }

    pub fn culled_pass_names(&self) -> Vec<&str> {
        self.schedule.culled.iter().filter_map(|&node| self.pass(node)).map(RgPassNode::name).collect()
    }

    #[inline]
    pub fn pass(&self, node: RgNodeId) -> Option<&RgPassNode<'a>> {
        self.nodes.node_at(node).and_then(RgNode::as_pass)
    }

    #[inline]
    pub fn pass_decl(&self, node: RgNodeId) -> Option<&RgPassDecl> {
        self.pass(node).map(RgPassNode::decl)
    }

    #[inline]
    pub fn resource(&self, node: RgNodeId) -> Option<&RgResourceNode> {
        self.nodes.node_at(node).and_then(RgNode::as_resource)
    }

    /// 资源的生命周期；属于其他 graph 的句柄返回 `UNSET`
    pub fn lifespan(&self, handle: impl RgResourceHandle) -> RgLifespan {
        if handle.graph_id() != self.id {
            return RgLifespan::UNSET;
        }
        self.schedule.lifespan(handle.node_id())
    }

    /// 纹理复用了哪个纹理的物理内存
    pub fn aliasing_source(&self, texture: RgTextureHandle) -> Option<RgTextureHandle> {
        if texture.graph() != self.id {
            return None;
        }
        self.schedule.aliasing_source(texture.node()).map(|source| RgTextureHandle::new(self.id, source))
    }

    /// 外部资源在帧结束时所处的状态
    pub fn final_state(&self, handle: impl RgResourceHandle) -> Option<GfxResourceState> {
        if handle.graph_id() != self.id {
            return None;
        }
        self.schedule.final_state(handle.node_id())
    }

    /// 第 `order_index` 个执行的 Pass 之前的 barriers
    #[inline]
    pub fn barriers(&self, order_index: usize) -> Option<&PassBarriers> {
        self.schedule.barriers(order_index)
    }
}

// 调试
impl CompiledGraph<'_> {
    /// 导出 graphviz dot 格式，被剔除的 Pass 会被标记
    pub fn export_dot(&self) -> String {
        export::export_dot(&self.nodes, Some(&self.schedule))
    }

    fn node_name(&self, node: RgNodeId) -> &str {
        match self.nodes.node_at(node) {
            Some(RgNode::Resource(resource)) => resource.name(),
            Some(RgNode::Pass(pass)) => pass.name(),
            None => "<unknown>",
        }
    }

    /// 打印执行计划（用于调试）
    pub fn print_execution_plan(&self) {
        let order = &self.schedule.order;
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            order.len(),
            self.ordered_pass_names().join(" → ")
        );
        if !self.schedule.culled.is_empty() {
            log::info!("║ Culled: [{}]", self.culled_pass_names().join(", "));
        }
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order_idx, &pass_node) in order.iter().enumerate() {
            let Some(pass) = self.pass(pass_node) else {
                continue;
            };

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] {} Pass: \"{}\"", order_idx + 1, order.len(), pass.pass_type(), pass.name());
            if let Some(pipeline) = pass.decl.pipeline.as_deref() {
                log::info!("│ Pipeline: {pipeline}");
            }
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            let reads = self.nodes.incoming(pass_node).collect_vec();
            if !reads.is_empty() {
                log::info!("│ Reads:");
                for edge in reads {
                    let vk_state = edge.data().state.to_vk();
                    log::info!(
                        "│   📖 \"{}\" [{}] @ {:?} (stage: {}, access: {})",
                        self.node_name(edge.from()),
                        edge.data().binding,
                        vk_state.layout,
                        format_pipeline_stage(vk_state.stage),
                        format_access_flags(vk_state.access)
                    );
                }
            }

            let writes = self.nodes.outgoing(pass_node).collect_vec();
            if !writes.is_empty() {
                log::info!("│ Writes:");
                for edge in writes {
                    let vk_state = edge.data().state.to_vk();
                    log::info!(
                        "│   ✏️  \"{}\" [{}] @ {:?} (stage: {}, access: {})",
                        self.node_name(edge.to()),
                        edge.data().binding,
                        vk_state.layout,
                        format_pipeline_stage(vk_state.stage),
                        format_access_flags(vk_state.access)
                    );
                }
            }

            let lifetime_events = self.schedule.acquires[order_idx]
                .iter()
                .map(|&node| match self.schedule.aliasing_source(node) {
                    Some(source) => format!("+{} (alias of {})", self.node_name(node), self.node_name(source)),
                    None => format!("+{}", self.node_name(node)),
                })
                .chain(self.schedule.retires[order_idx].iter().map(|&node| format!("-{}", self.node_name(node))))
                .collect_vec();
            if !lifetime_events.is_empty() {
                log::info!("│ Resources: {}", lifetime_events.join(", "));
            }

            let barriers = &self.schedule.barriers[order_idx];
            if barriers.has_barriers() {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!(
                    "│ Barriers: {} texture, {} buffer",
                    barriers.texture_barrier_count(),
                    barriers.buffer_barrier_count()
                );

                for barrier in &barriers.texture_barriers {
                    let before = barrier.before.to_vk();
                    let after = barrier.after.to_vk();
                    let layout_change = if before.layout != after.layout {
                        format!("{:?} → {:?}", before.layout, after.layout)
                    } else {
                        format!("{:?} (no change)", after.layout)
                    };
                    log::info!(
                        "│   🖼️  \"{}\"{}: {}",
                        self.node_name(barrier.resource),
                        if barrier.aliasing { " [aliasing]" } else { "" },
                        layout_change
                    );
                    log::info!(
                        "│       src: {} / {}",
                        format_pipeline_stage(before.stage),
                        format_access_flags(before.src_access())
                    );
                    log::info!(
                        "│       dst: {} / {}",
                        format_pipeline_stage(after.stage),
                        format_access_flags(after.access)
                    );
                }

                for barrier in &barriers.buffer_barriers {
                    let before = barrier.before.to_vk();
                    let after = barrier.after.to_vk();
                    log::info!("│   📦 \"{}\"", self.node_name(barrier.resource));
                    log::info!(
                        "│       src: {} / {}",
                        format_pipeline_stage(before.stage),
                        format_access_flags(before.src_access())
                    );
                    log::info!(
                        "│       dst: {} / {}",
                        format_pipeline_stage(after.stage),
                        format_access_flags(after.access)
                    );
                }
            }

            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }
    }
}

/// 格式化 Pipeline Stage 标志
fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }
    let stages = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if stages.is_empty() { format!("{stage:?}") } else { stages.join(" | ") }
}

/// 格式化 Access 标志
fn format_access_flags(access: vk::AccessFlags2) -> String {
    const NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];

    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    let flags = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if flags.is_empty() { format!("{access:?}") } else { flags.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flags() {
        let state = GfxResourceState::RENDER_TARGET.to_vk();
        assert_eq!(format_pipeline_stage(state.stage), "COLOR_ATTACHMENT_OUTPUT");
        assert_eq!(format_access_flags(state.access), "COLOR_ATTACH_READ | COLOR_ATTACH_WRITE");
        assert_eq!(format_access_flags(vk::AccessFlags2::NONE), "NONE");
    }
}
