//! 延迟渲染的一帧
//!
//! depth prepass -> gbuffer -> ssao / light culling -> lighting -> bloom -> tonemap -> present，
//! 另外有一个只在调试时被使用的 overlay pass，正常情况下会被剔除。

use truvis_render_graph::render_graph::{
    RenderGraphBuilder, RgBufferHandle, RgEncoder, RgPass, RgPassBuilder, RgPassContext, RgPassType, RgResult,
    RgTextureHandle,
};
use truvis_render_interface::gfx_device::{GfxLoadOp, GfxStoreOp};
use truvis_render_interface::handles::{GfxSwapchainHandle, GfxTextureHandle};
use truvis_render_interface::resource_desc::{
    GfxBufferDesc, GfxBufferUsage, GfxFormat, GfxTextureDesc, GfxTextureUsage,
};
use truvis_render_interface::resource_state::GfxResourceState;

/// 构建一帧 graph 需要的外部输入
#[derive(Clone, Copy, Debug)]
pub struct DeferredFrameInputs {
    pub swapchain: GfxSwapchainHandle,
    pub swapchain_extent: [u32; 2],
    pub swapchain_format: GfxFormat,
    /// 上一帧的结果，lighting 用来做时间累积
    pub history: GfxTextureHandle,
    /// 内部渲染分辨率相对 swapchain 的比例（百分比）
    pub render_scale: u32,
    pub light_count: u32,
    pub debug_overlay: bool,
}

impl DeferredFrameInputs {
    pub fn render_extent(&self) -> [u32; 2] {
        let scale = |size: u32| (size * self.render_scale / 100).max(1);
        [scale(self.swapchain_extent[0]), scale(self.swapchain_extent[1])]
    }

    pub fn history_desc(&self) -> GfxTextureDesc {
        GfxTextureDesc::new_2d(
            self.swapchain_extent[0],
            self.swapchain_extent[1],
            GfxFormat::Rgba16Float,
            GfxTextureUsage::SAMPLED | GfxTextureUsage::COPY_DST,
        )
    }
}

struct GBufferPass {
    depth: RgTextureHandle,
    albedo: RgTextureHandle,
    normal: RgTextureHandle,
}

impl RgPass for GBufferPass {
    fn setup(&mut self, builder: &mut RgPassBuilder<'_, '_>) -> RgResult<()> {
        builder.read_texture(self.depth, 0, 0, GfxResourceState::DEPTH_READ)?;
        builder.write_render_target(self.albedo, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
        builder.write_render_target(self.normal, 1, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
        builder.bind_pipeline("gbuffer");
        Ok(())
    }

    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()> {
        let bind_table = ctx.alloc_bind_table()?;
        encoder.bind_table(0, bind_table)?;
        // 三个 mesh，每个 mesh 一次 draw
        for vertex_count in [36, 2904, 17424] {
            encoder.draw(vertex_count, 1)?;
        }
        Ok(())
    }
}

struct SsaoPass {
    depth: RgTextureHandle,
    normal: RgTextureHandle,
    ao: RgTextureHandle,
}

impl RgPass for SsaoPass {
    fn setup(&mut self, builder: &mut RgPassBuilder<'_, '_>) -> RgResult<()> {
        builder.read_texture(self.depth, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_texture(self.normal, 0, 1, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_texture(self.ao, 0, GfxResourceState::UNORDERED_ACCESS)?;
        builder.bind_pipeline("ssao");
        Ok(())
    }

    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()> {
        let desc = ctx.texture_desc(self.ao)?;
        let bind_table = ctx.alloc_bind_table()?;
        encoder.bind_table(0, bind_table)?;
        encoder.dispatch([desc.width.div_ceil(8), desc.height.div_ceil(8), 1])?;
        Ok(())
    }
}

struct TonemapPass {
    hdr: RgTextureHandle,
    bloom: RgTextureHandle,
    backbuffer: RgTextureHandle,
}

impl RgPass for TonemapPass {
    fn setup(&mut self, builder: &mut RgPassBuilder<'_, '_>) -> RgResult<()> {
        builder.read_texture(self.hdr, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_texture(self.bloom, 0, 1, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_render_target(self.backbuffer, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
        builder.bind_pipeline("tonemap");
        Ok(())
    }

    fn execute(&self, ctx: &RgPassContext<'_>, encoder: &mut RgEncoder<'_>) -> anyhow::Result<()> {
        let descriptor_set = ctx.alloc_descriptor_set()?;
        log::trace!("{}: tonemap with descriptor set {descriptor_set:?}", ctx.name());
        encoder.draw(3, 1)?;
        Ok(())
    }
}

/// 声明一帧的延迟渲染 graph
pub fn build_deferred_graph<'a>(inputs: &DeferredFrameInputs) -> RgResult<RenderGraphBuilder<'a>> {
    let _span = truvis_crate_tools::profile_span!("build_deferred_graph");

    let [width, height] = inputs.render_extent();
    let target = |format: GfxFormat, usage: GfxTextureUsage| GfxTextureDesc::new_2d(width, height, format, usage);
    let light_count = inputs.light_count;

    let mut graph = RenderGraphBuilder::new();

    // 资源
    let depth = graph.create_texture(
        "depth",
        target(GfxFormat::D32Float, GfxTextureUsage::DEPTH_STENCIL | GfxTextureUsage::SAMPLED),
    )?;
    let albedo = graph.create_texture(
        "gbuffer-albedo",
        target(GfxFormat::Rgba8Unorm, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED),
    )?;
    let normal = graph.create_texture(
        "gbuffer-normal",
        target(GfxFormat::Rgba16Float, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED),
    )?;
    let ao = graph.create_texture("ao", target(GfxFormat::R8Unorm, GfxTextureUsage::STORAGE | GfxTextureUsage::SAMPLED))?;
    let hdr = graph.create_texture(
        "hdr",
        target(GfxFormat::Rgba16Float, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED | GfxTextureUsage::STORAGE),
    )?;
    // 与 gbuffer-albedo 同样是 32 bit，生命周期不重叠时复用它的显存
    let bloom = graph.create_texture(
        "bloom",
        target(GfxFormat::Rg11B10Float, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED),
    )?;
    let light_list: RgBufferHandle = graph.create_buffer(
        "light-list",
        GfxBufferDesc::new(u64::from(light_count.max(1)) * 64, GfxBufferUsage::STORAGE),
    )?;
    let history = graph.import_texture(
        "history",
        inputs.history,
        inputs.history_desc(),
        GfxResourceState::SHADER_RESOURCE,
    )?;
    let backbuffer = graph.import_backbuffer(
        "backbuffer",
        inputs.swapchain,
        GfxTextureDesc::new_2d(
            inputs.swapchain_extent[0],
            inputs.swapchain_extent[1],
            inputs.swapchain_format,
            GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::COPY_DST,
        ),
    )?;

    // Pass
    graph.add_render_pass("depth-prepass", |builder| {
        builder.write_depth_stencil(depth, GfxLoadOp::Clear([1.0, 0.0, 0.0, 0.0]), GfxStoreOp::Store)?;
        builder.bind_pipeline("depth-only");
        builder.set_executor(|_, encoder| {
            encoder.draw(20364, 1)?;
            Ok(())
        });
        Ok(())
    })?;
    graph.add_pass("gbuffer", RgPassType::Render, GBufferPass { depth, albedo, normal })?;
    graph.add_pass("ssao", RgPassType::Compute, SsaoPass { depth, normal, ao })?;
    graph.add_compute_pass("light-culling", |builder| {
        builder.read_texture(depth, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_buffer(light_list, 0, GfxResourceState::UNORDERED_ACCESS)?;
        builder.set_executor(move |ctx, encoder| {
            let tiles = ctx.texture_desc(depth)?;
            encoder.dispatch([tiles.width.div_ceil(16), tiles.height.div_ceil(16), 1])?;
            Ok(())
        });
        Ok(())
    })?;
    graph.add_render_pass("lighting", |builder| {
        builder.read_texture(albedo, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_texture(normal, 0, 1, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_texture(ao, 0, 2, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_texture(history, 0, 3, GfxResourceState::SHADER_RESOURCE)?;
        builder.read_buffer(light_list, 1, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_render_target(hdr, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
        builder.bind_pipeline("deferred-lighting");
        builder.set_executor(move |ctx, encoder| {
            let lights = ctx.buffer(light_list)?;
            let bind_table = ctx.alloc_bind_table()?;
            encoder.bind_table(0, bind_table)?;
            log::trace!("lighting: {light_count} lights in {lights:?}");
            encoder.draw(3, 1)?;
            Ok(())
        });
        Ok(())
    })?;
    graph.add_render_pass("bloom", |builder| {
        builder.read_texture(hdr, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_render_target(bloom, 0, GfxLoadOp::DontCare, GfxStoreOp::Store)?;
        builder.set_executor(|_, encoder| {
            encoder.draw(3, 1)?;
            Ok(())
        });
        Ok(())
    })?;
    graph.add_pass("tonemap", RgPassType::Render, TonemapPass { hdr, bloom, backbuffer })?;

    let overlay = graph.create_texture(
        "debug-overlay",
        target(GfxFormat::Rgba8Unorm, GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::SAMPLED),
    )?;
    let debug_overlay = inputs.debug_overlay;
    graph.add_render_pass("debug-overlay", |builder| {
        builder.read_texture(normal, 0, 0, GfxResourceState::SHADER_RESOURCE)?;
        builder.write_render_target(overlay, 0, GfxLoadOp::Clear([0.0; 4]), GfxStoreOp::Store)?;
        if debug_overlay {
            builder.never_cull();
        }
        builder.set_executor(|_, encoder| {
            encoder.draw(6, 1)?;
            Ok(())
        });
        Ok(())
    })?;

    graph.add_present_pass("present", backbuffer)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use truvis_render_graph::render_graph::{RenderGraphExecutor, RgConfig};
    use truvis_render_interface::gfx_device::GfxDevice;
    use truvis_render_interface::headless_device::GfxHeadlessDevice;
    use truvis_render_interface::task_system::InlineTaskSystem;

    use super::*;

    fn inputs(device: &GfxHeadlessDevice, debug_overlay: bool) -> DeferredFrameInputs {
        let swapchain = device.create_swapchain(320, 180, GfxFormat::Bgra8Srgb, 3).unwrap();
        let mut inputs = DeferredFrameInputs {
            swapchain,
            swapchain_extent: [320, 180],
            swapchain_format: GfxFormat::Bgra8Srgb,
            history: GfxTextureHandle::default(),
            render_scale: 100,
            light_count: 16,
            debug_overlay,
        };
        inputs.history = device.create_texture(&inputs.history_desc(), "history").unwrap();
        inputs
    }

    #[test]
    fn test_overlay_is_culled_unless_requested() {
        let device = GfxHeadlessDevice::new();

        let compiled = build_deferred_graph(&inputs(&device, false)).unwrap().compile().unwrap();
        assert_eq!(compiled.culled_pass_names(), vec!["debug-overlay"]);
        assert_eq!(compiled.ordered_pass_names().last(), Some(&"present"));

        let compiled = build_deferred_graph(&inputs(&device, true)).unwrap().compile().unwrap();
        assert!(compiled.culled_pass_names().is_empty());
    }

    #[test]
    fn test_frame_runs_on_headless_device() {
        let device = Arc::new(GfxHeadlessDevice::new());
        let inputs = inputs(&device, false);
        let mut executor = RenderGraphExecutor::new(device.clone(), RgConfig::default());

        let compiled = build_deferred_graph(&inputs).unwrap().compile().unwrap();
        let report = executor.execute(&compiled, &InlineTaskSystem).unwrap();
        assert_eq!(report.passes_culled, 1);
        assert_eq!(report.presented, 1);
        assert_eq!(report.textures_aliased, 1);
        assert_eq!(device.stats().presents, 1);
    }

    #[test]
    fn test_render_scale() {
        let device = GfxHeadlessDevice::new();
        let mut inputs = inputs(&device, false);
        inputs.render_scale = 50;
        assert_eq!(inputs.render_extent(), [160, 90]);
    }
}
