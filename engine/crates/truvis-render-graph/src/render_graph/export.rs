//! 导出 graphviz dot 格式
//!
//! 资源节点标注名字与类型，Pass 节点标注名字与 Pass 类型，
//! 边标注绑定位置（`set0.b1`、`rt0`、`depth`、`uav3`、`copy`、`present`）。

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};

use super::dependency_graph::RgDependencyGraph;
use super::graph::RgNode;
use super::pass::RgEdgeInfo;
use super::scheduler::RgSchedule;

pub(crate) fn export_dot(nodes: &RgDependencyGraph<RgNode<'_>, RgEdgeInfo>, schedule: Option<&RgSchedule>) -> String {
    let mut graph: DiGraph<String, String> = DiGraph::with_capacity(nodes.node_count(), nodes.edge_count());

    let indices: Vec<NodeIndex> = nodes
        .iter_nodes()
        .map(|(id, node)| {
            let label = match node {
                RgNode::Resource(resource) => format!("{}\n({})", resource.name(), resource.kind_label()),
                RgNode::Pass(pass) => {
                    let culled = schedule.is_some_and(|schedule| schedule.culled().contains(&id));
                    format!("{}\n[{}]{}", pass.name(), pass.pass_type(), if culled { " (culled)" } else { "" })
                }
            };
            graph.add_node(label)
        })
        .collect();

    nodes.foreach_edges(|edge| {
        graph.add_edge(indices[edge.from().index()], indices[edge.to().index()], edge.data().binding.to_string());
    });

    format!("{}", Dot::new(&graph))
}

#[cfg(test)]
mod tests {
    use truvis_render_interface::gfx_device::{GfxLoadOp, GfxStoreOp};
    use truvis_render_interface::handles::GfxSwapchainHandle;
    use truvis_render_interface::resource_desc::{GfxFormat, GfxTextureDesc, GfxTextureUsage};
    use truvis_render_interface::resource_state::GfxResourceState;

    use crate::render_graph::graph::RenderGraphBuilder;

    #[test]
    fn test_dot_contains_nodes_and_bindings() {
        let desc = GfxTextureDesc::new_2d(64, 64, GfxFormat::Rgba8Unorm, GfxTextureUsage::RENDER_TARGET);
        let mut graph = RenderGraphBuilder::new();
        let gbuffer = graph.create_texture("gbuffer", desc).unwrap();
        let bb = graph.import_backbuffer("backbuffer", GfxSwapchainHandle::default(), desc).unwrap();
        graph
            .add_render_pass("geometry", |builder| {
                builder.write_render_target(gbuffer, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
                builder.set_executor(|_, _| Ok(()));
                Ok(())
            })
            .unwrap();
        graph
            .add_render_pass("lighting", |builder| {
                builder.read_texture(gbuffer, 0, 1, GfxResourceState::SHADER_RESOURCE)?;
                builder.write_render_target(bb, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
                builder.set_executor(|_, _| Ok(()));
                Ok(())
            })
            .unwrap();
        graph.add_present_pass("present", bb).unwrap();

        let dot = graph.export_dot();
        assert!(dot.starts_with("digraph"));
        for expected in ["gbuffer", "backbuffer", "geometry", "lighting", "set0.b1", "rt0", "present"] {
            assert!(dot.contains(expected), "missing {expected} in:\n{dot}");
        }
        assert!(!dot.contains("culled"));
    }
}
