//! 在 headless 设备上运行若干帧延迟渲染 graph
//!
//! ```text
//! truvis-app [render-graph.toml]
//! ```
//!
//! 第 4 帧开始把渲染分辨率降到 50%，用来观察编译缓存失效和临时资源的回收。

mod deferred_graph;

use std::sync::Arc;

use anyhow::Context;
use truvis_crate_tools::init_log::init_log;
use truvis_render_graph::render_graph::{RenderGraphExecutor, RgConfig, RgScheduleCache};
use truvis_render_interface::gfx_device::GfxDevice;
use truvis_render_interface::headless_device::GfxHeadlessDevice;
use truvis_render_interface::resource_desc::GfxFormat;
use truvis_render_interface::task_system::{RayonTaskSystem, TaskSystem};

use crate::deferred_graph::{DeferredFrameInputs, build_deferred_graph};

const FRAME_COUNT: u64 = 16;
const SWAPCHAIN_EXTENT: [u32; 2] = [1280, 720];

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

fn load_config() -> anyhow::Result<RgConfig> {
    match std::env::args().nth(1) {
        Some(path) => RgConfig::from_file(&path),
        None => Ok(RgConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(panic_handler));
    init_log();
    truvis_crate_tools::profiling::start_profiler();

    let config = load_config()?;
    log::info!("render graph config: {config:?}");

    let device = Arc::new(GfxHeadlessDevice::new());
    let task_system = RayonTaskSystem::new();
    log::info!("task system: {}", task_system.name());

    let swapchain = device
        .create_swapchain(SWAPCHAIN_EXTENT[0], SWAPCHAIN_EXTENT[1], GfxFormat::Bgra8Srgb, 3)
        .context("failed to create swapchain")?;
    let mut inputs = DeferredFrameInputs {
        swapchain,
        swapchain_extent: SWAPCHAIN_EXTENT,
        swapchain_format: GfxFormat::Bgra8Srgb,
        history: Default::default(),
        render_scale: 100,
        light_count: 256,
        debug_overlay: false,
    };
    inputs.history = device.create_texture(&inputs.history_desc(), "history")?;

    let mut executor = RenderGraphExecutor::new(device.clone(), config.clone());
    let mut schedule_cache = RgScheduleCache::new();

    for frame in 0..FRAME_COUNT {
        if frame == 4 {
            inputs.render_scale = 50;
            log::info!("render scale -> {}%", inputs.render_scale);
        }
        // 每隔几帧打开一次调试 overlay
        inputs.debug_overlay = frame % 5 == 4;

        let graph = build_deferred_graph(&inputs)?;
        if frame == 0 {
            log::debug!("render graph:\n{}", graph.export_dot());
        }
        let compiled = graph.compile_with(&config, Some(&mut schedule_cache))?;

        let report = executor.execute(&compiled, &task_system)?;
        log::info!(
            "{} passes ({} culled), {} barriers, textures {}/{}/{} (new/reused/aliased), {} presented",
            report.passes_executed,
            report.passes_culled,
            report.barriers,
            report.textures_created,
            report.textures_reused,
            report.textures_aliased,
            report.presented
        );
    }

    let stats = device.stats();
    log::info!(
        "schedule cache: {} hits, {} misses",
        schedule_cache.hits(),
        schedule_cache.misses()
    );
    log::info!(
        "device: {} textures created ({} aliased), {} destroyed, {} submits, {} presents, {} bytes in use",
        stats.textures_created,
        stats.aliased_textures_created,
        stats.textures_destroyed,
        stats.submits,
        stats.presents,
        stats.bytes_in_use
    );

    executor.destroy();
    device.destroy_texture(inputs.history);
    Ok(())
}
