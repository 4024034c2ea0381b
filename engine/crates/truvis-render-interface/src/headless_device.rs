//! Headless 设备
//!
//! 不依赖真实 GPU 的 `GfxDevice` 实现：句柄由 SlotMap 分配，录制的命令保存在
//! 每个 encoder 中，提交后按提交顺序进入 `submissions`，可供测试检查。
//!
//! 可以设置显存预算（超出时返回 `OutOfDeviceMemory`），也可以模拟 `DeviceLost`。

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::SlotMap;

use crate::gfx_device::{GfxDevice, GfxRenderPassInfo};
use crate::gfx_error::{GfxError, GfxResult};
use crate::handles::{
    GfxBindTableHandle, GfxBufferHandle, GfxDescriptorSetHandle, GfxEncoderHandle, GfxSwapchainHandle,
    GfxTextureHandle,
};
use crate::resource_desc::{GfxBufferDesc, GfxFormat, GfxTextureDesc, GfxTextureUsage};
use crate::resource_state::{GfxBarrier, GfxBarrierResource};

/// 录制到 encoder 中的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum GfxHeadlessCommand {
    Barriers(Vec<GfxBarrier>),
    BeginRenderPass(GfxRenderPassInfo),
    EndRenderPass,
    BeginLabel(String),
    EndLabel,
    BindTable {
        set: u32,
        bind_table: GfxBindTableHandle,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch([u32; 3]),
    CopyTexture {
        src: GfxTextureHandle,
        dst: GfxTextureHandle,
    },
    CopyBuffer {
        src: GfxBufferHandle,
        dst: GfxBufferHandle,
    },
}

/// 一个已提交的 encoder
#[derive(Clone, Debug)]
pub struct GfxHeadlessSubmission {
    pub encoder: GfxEncoderHandle,
    pub label: String,
    pub commands: Vec<GfxHeadlessCommand>,
}

/// 设备统计数据
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxHeadlessStats {
    pub textures_created: usize,
    pub aliased_textures_created: usize,
    pub textures_destroyed: usize,
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub encoders_created: usize,
    pub bind_tables_created: usize,
    pub descriptor_sets_created: usize,
    pub barrier_calls: usize,
    pub submits: usize,
    pub presents: usize,
    /// 当前占用的显存（别名纹理不占用）
    pub bytes_in_use: u64,
}

struct HeadlessTexture {
    desc: GfxTextureDesc,
    name: String,
    /// 别名纹理指向真正持有显存的纹理
    memory_source: Option<GfxTextureHandle>,
    /// swapchain image 不能被销毁
    swapchain_owned: bool,
}

#[derive(Default)]
struct HeadlessEncoder {
    label: String,
    recording: bool,
    commands: Vec<GfxHeadlessCommand>,
}

struct HeadlessSwapchain {
    images: Vec<GfxTextureHandle>,
    current: usize,
    acquired: bool,
}

#[derive(Default)]
struct HeadlessState {
    textures: SlotMap<GfxTextureHandle, HeadlessTexture>,
    buffers: SlotMap<GfxBufferHandle, GfxBufferDesc>,
    encoders: SlotMap<GfxEncoderHandle, HeadlessEncoder>,
    bind_tables: SlotMap<GfxBindTableHandle, ()>,
    descriptor_sets: SlotMap<GfxDescriptorSetHandle, ()>,
    swapchains: SlotMap<GfxSwapchainHandle, HeadlessSwapchain>,

    submissions: Vec<GfxHeadlessSubmission>,
    memory_budget: Option<u64>,
    stats: GfxHeadlessStats,
}

// tools
impl HeadlessState {
    fn reserve_memory(&mut self, bytes: u64, name: &str) -> GfxResult<()> {
        let next = self.stats.bytes_in_use + bytes;
        if self.memory_budget.is_some_and(|budget| next > budget) {
            return Err(GfxError::OutOfDeviceMemory(name.to_string()));
        }
        self.stats.bytes_in_use = next;
        Ok(())
    }

    fn encoder_mut(&mut self, encoder: GfxEncoderHandle) -> GfxResult<&mut HeadlessEncoder> {
        let encoder_data = self
            .encoders
            .get_mut(encoder)
            .ok_or_else(|| GfxError::InvalidHandle(format!("encoder {encoder:?}")))?;
        if !encoder_data.recording {
            return Err(GfxError::InvalidHandle(format!("encoder {encoder:?} is not recording")));
        }
        Ok(encoder_data)
    }

    fn record(&mut self, encoder: GfxEncoderHandle, command: GfxHeadlessCommand) -> GfxResult<()> {
        self.encoder_mut(encoder)?.commands.push(command);
        Ok(())
    }

    fn check_texture(&self, texture: GfxTextureHandle) -> GfxResult<()> {
        if self.textures.contains_key(texture) {
            Ok(())
        } else {
            Err(GfxError::InvalidHandle(format!("texture {texture:?}")))
        }
    }

    fn check_buffer(&self, buffer: GfxBufferHandle) -> GfxResult<()> {
        if self.buffers.contains_key(buffer) {
            Ok(())
        } else {
            Err(GfxError::InvalidHandle(format!("buffer {buffer:?}")))
        }
    }
}

/// 记录型设备，用于测试与 headless 运行
pub struct GfxHeadlessDevice {
    state: Mutex<HeadlessState>,
    device_lost: AtomicBool,
}

impl Default for GfxHeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl GfxHeadlessDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            device_lost: AtomicBool::new(false),
        }
    }

    /// 设置显存预算，`None` 表示不限制
    pub fn with_memory_budget(self, budget: Option<u64>) -> Self {
        self.set_memory_budget(budget);
        self
    }

    /// 创建一个 swapchain，其 image 在 swapchain 的整个生命周期内有效
    pub fn create_swapchain(
        &self,
        width: u32,
        height: u32,
        format: GfxFormat,
        image_count: usize,
    ) -> GfxResult<GfxSwapchainHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        let desc = GfxTextureDesc::new_2d(
            width,
            height,
            format,
            GfxTextureUsage::RENDER_TARGET | GfxTextureUsage::COPY_DST,
        );
        let images = (0..image_count.max(1))
            .map(|idx| {
                state.textures.insert(HeadlessTexture {
                    desc,
                    name: format!("swapchain-image-{idx}"),
                    memory_source: None,
                    swapchain_owned: true,
                })
            })
            .collect();
        Ok(state.swapchains.insert(HeadlessSwapchain {
            images,
            current: 0,
            acquired: false,
        }))
    }
}

// getters & test controls
impl GfxHeadlessDevice {
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.state.lock().memory_budget = budget;
    }

    /// 之后的所有可失败调用都返回 `DeviceLost`
    pub fn set_device_lost(&self, lost: bool) {
        self.device_lost.store(lost, Ordering::Release);
    }

    #[inline]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> GfxHeadlessStats {
        self.state.lock().stats
    }

    /// 已提交的所有 encoder，按提交顺序排列
    pub fn submissions(&self) -> Vec<GfxHeadlessSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn clear_submissions(&self) {
        self.state.lock().submissions.clear();
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.lock().textures.values().filter(|texture| !texture.swapchain_owned).count()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_encoder_count(&self) -> usize {
        self.state.lock().encoders.len()
    }

    pub fn is_texture_alive(&self, texture: GfxTextureHandle) -> bool {
        self.state.lock().textures.contains_key(texture)
    }

    pub fn texture_desc(&self, texture: GfxTextureHandle) -> Option<GfxTextureDesc> {
        self.state.lock().textures.get(texture).map(|texture| texture.desc)
    }

    pub fn texture_name(&self, texture: GfxTextureHandle) -> Option<String> {
        self.state.lock().textures.get(texture).map(|texture| texture.name.clone())
    }

    /// 纹理实际使用的显存所属纹理（非别名纹理返回自身）
    pub fn texture_memory_source(&self, texture: GfxTextureHandle) -> Option<GfxTextureHandle> {
        self.state
            .lock()
            .textures
            .get(texture)
            .map(|data| data.memory_source.unwrap_or(texture))
    }

    #[inline]
    fn check_lost(&self) -> GfxResult<()> {
        if self.is_device_lost() { Err(GfxError::DeviceLost) } else { Ok(()) }
    }
}

impl GfxDevice for GfxHeadlessDevice {
    fn create_texture(&self, desc: &GfxTextureDesc, name: &str) -> GfxResult<GfxTextureHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.reserve_memory(desc.memory_size(), name)?;
        state.stats.textures_created += 1;
        let handle = state.textures.insert(HeadlessTexture {
            desc: *desc,
            name: name.to_string(),
            memory_source: None,
            swapchain_owned: false,
        });
        log::trace!("headless: create texture {name} {handle:?} ({} bytes)", desc.memory_size());
        Ok(handle)
    }

    fn create_aliased_texture(
        &self,
        desc: &GfxTextureDesc,
        memory_source: GfxTextureHandle,
        name: &str,
    ) -> GfxResult<GfxTextureHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        let source = state
            .textures
            .get(memory_source)
            .ok_or_else(|| GfxError::InvalidHandle(format!("alias source {memory_source:?}")))?;
        if source.desc.memory_size() < desc.memory_size() {
            return Err(GfxError::InvalidHandle(format!(
                "alias {name} needs {} bytes, source {} has {}",
                desc.memory_size(),
                source.name,
                source.desc.memory_size()
            )));
        }
        let root = source.memory_source.unwrap_or(memory_source);
        state.stats.aliased_textures_created += 1;
        let handle = state.textures.insert(HeadlessTexture {
            desc: *desc,
            name: name.to_string(),
            memory_source: Some(root),
            swapchain_owned: false,
        });
        log::trace!("headless: create aliased texture {name} {handle:?} -> {root:?}");
        Ok(handle)
    }

    fn destroy_texture(&self, texture: GfxTextureHandle) {
        let mut state = self.state.lock();
        if state.textures.get(texture).is_some_and(|data| data.swapchain_owned) {
            log::warn!("headless: refusing to destroy swapchain image {texture:?}");
            return;
        }
        if let Some(data) = state.textures.remove(texture) {
            if data.memory_source.is_none() {
                state.stats.bytes_in_use -= data.desc.memory_size();
            }
            state.stats.textures_destroyed += 1;
        }
    }

    fn create_buffer(&self, desc: &GfxBufferDesc, name: &str) -> GfxResult<GfxBufferHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.reserve_memory(desc.size, name)?;
        state.stats.buffers_created += 1;
        Ok(state.buffers.insert(*desc))
    }

    fn destroy_buffer(&self, buffer: GfxBufferHandle) {
        let mut state = self.state.lock();
        if let Some(desc) = state.buffers.remove(buffer) {
            state.stats.bytes_in_use -= desc.size;
            state.stats.buffers_destroyed += 1;
        }
    }

    fn create_encoder(&self) -> GfxResult<GfxEncoderHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.stats.encoders_created += 1;
        Ok(state.encoders.insert(HeadlessEncoder::default()))
    }

    fn destroy_encoder(&self, encoder: GfxEncoderHandle) {
        self.state.lock().encoders.remove(encoder);
    }

    fn create_bind_table(&self) -> GfxResult<GfxBindTableHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.stats.bind_tables_created += 1;
        Ok(state.bind_tables.insert(()))
    }

    fn destroy_bind_table(&self, bind_table: GfxBindTableHandle) {
        self.state.lock().bind_tables.remove(bind_table);
    }

    fn create_descriptor_set(&self) -> GfxResult<GfxDescriptorSetHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.stats.descriptor_sets_created += 1;
        Ok(state.descriptor_sets.insert(()))
    }

    fn destroy_descriptor_set(&self, descriptor_set: GfxDescriptorSetHandle) {
        self.state.lock().descriptor_sets.remove(descriptor_set);
    }

    fn begin_encoder(&self, encoder: GfxEncoderHandle, label: &str) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        let encoder_data = state
            .encoders
            .get_mut(encoder)
            .ok_or_else(|| GfxError::InvalidHandle(format!("encoder {encoder:?}")))?;
        encoder_data.label = label.to_string();
        encoder_data.recording = true;
        encoder_data.commands.clear();
        Ok(())
    }

    fn end_encoder(&self, encoder: GfxEncoderHandle) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.encoder_mut(encoder)?.recording = false;
        Ok(())
    }

    fn cmd_resource_barriers(&self, encoder: GfxEncoderHandle, barriers: &[GfxBarrier]) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        for barrier in barriers {
            match barrier.resource {
                GfxBarrierResource::Texture(texture) => state.check_texture(texture)?,
                GfxBarrierResource::Buffer(buffer) => state.check_buffer(buffer)?,
            }
        }
        state.record(encoder, GfxHeadlessCommand::Barriers(barriers.to_vec()))?;
        state.stats.barrier_calls += 1;
        Ok(())
    }

    fn cmd_begin_render_pass(&self, encoder: GfxEncoderHandle, info: &GfxRenderPassInfo) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        for attachment in &info.color_attachments {
            state.check_texture(attachment.texture)?;
        }
        if let Some(depth) = &info.depth_attachment {
            state.check_texture(depth.texture)?;
        }
        state.record(encoder, GfxHeadlessCommand::BeginRenderPass(info.clone()))
    }

    fn cmd_end_render_pass(&self, encoder: GfxEncoderHandle) -> GfxResult<()> {
        self.check_lost()?;
        self.state.lock().record(encoder, GfxHeadlessCommand::EndRenderPass)
    }

    fn cmd_begin_label(&self, encoder: GfxEncoderHandle, label: &str) {
        // label 只用于调试，录制失败时忽略
        let _ = self.state.lock().record(encoder, GfxHeadlessCommand::BeginLabel(label.to_string()));
    }

    fn cmd_end_label(&self, encoder: GfxEncoderHandle) {
        let _ = self.state.lock().record(encoder, GfxHeadlessCommand::EndLabel);
    }

    fn cmd_bind_table(&self, encoder: GfxEncoderHandle, set: u32, bind_table: GfxBindTableHandle) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        if !state.bind_tables.contains_key(bind_table) {
            return Err(GfxError::InvalidHandle(format!("bind table {bind_table:?}")));
        }
        state.record(encoder, GfxHeadlessCommand::BindTable { set, bind_table })
    }

    fn cmd_draw(&self, encoder: GfxEncoderHandle, vertex_count: u32, instance_count: u32) -> GfxResult<()> {
        self.check_lost()?;
        self.state.lock().record(
            encoder,
            GfxHeadlessCommand::Draw {
                vertex_count,
                instance_count,
            },
        )
    }

    fn cmd_dispatch(&self, encoder: GfxEncoderHandle, group_count: [u32; 3]) -> GfxResult<()> {
        self.check_lost()?;
        self.state.lock().record(encoder, GfxHeadlessCommand::Dispatch(group_count))
    }

    fn cmd_copy_texture(
        &self,
        encoder: GfxEncoderHandle,
        src: GfxTextureHandle,
        dst: GfxTextureHandle,
    ) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.check_texture(src)?;
        state.check_texture(dst)?;
        state.record(encoder, GfxHeadlessCommand::CopyTexture { src, dst })
    }

    fn cmd_copy_buffer(&self, encoder: GfxEncoderHandle, src: GfxBufferHandle, dst: GfxBufferHandle) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        state.check_buffer(src)?;
        state.check_buffer(dst)?;
        state.record(encoder, GfxHeadlessCommand::CopyBuffer { src, dst })
    }

    fn submit(&self, encoders: &[GfxEncoderHandle]) -> GfxResult<()> {
        self.check_lost()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        // 先全部校验，避免部分提交
        for &encoder in encoders {
            match state.encoders.get(encoder) {
                None => return Err(GfxError::InvalidHandle(format!("encoder {encoder:?}"))),
                Some(data) if data.recording => {
                    return Err(GfxError::InvalidHandle(format!("encoder {encoder:?} is still recording")));
                }
                Some(_) => {}
            }
        }

        for &encoder in encoders {
            if let Some(data) = state.encoders.get_mut(encoder) {
                let submission = GfxHeadlessSubmission {
                    encoder,
                    label: data.label.clone(),
                    commands: std::mem::take(&mut data.commands),
                };
                state.submissions.push(submission);
            }
        }
        state.stats.submits += 1;
        Ok(())
    }

    fn acquire_backbuffer(&self, swapchain: GfxSwapchainHandle) -> GfxResult<GfxTextureHandle> {
        self.check_lost()?;
        let mut state = self.state.lock();
        let swapchain_data = state
            .swapchains
            .get_mut(swapchain)
            .ok_or_else(|| GfxError::InvalidHandle(format!("swapchain {swapchain:?}")))?;
        swapchain_data.acquired = true;
        Ok(swapchain_data.images[swapchain_data.current])
    }

    fn present(&self, swapchain: GfxSwapchainHandle) -> GfxResult<()> {
        self.check_lost()?;
        let mut state = self.state.lock();
        let swapchain_data = state
            .swapchains
            .get_mut(swapchain)
            .ok_or_else(|| GfxError::InvalidHandle(format!("swapchain {swapchain:?}")))?;
        if !swapchain_data.acquired {
            return Err(GfxError::InvalidHandle(format!("swapchain {swapchain:?} has no acquired image")));
        }
        swapchain_data.acquired = false;
        swapchain_data.current = (swapchain_data.current + 1) % swapchain_data.images.len();
        state.stats.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_state::GfxResourceState;

    fn rt_desc(size: u32) -> GfxTextureDesc {
        GfxTextureDesc::new_2d(size, size, GfxFormat::Rgba8Unorm, GfxTextureUsage::RENDER_TARGET)
    }

    #[test]
    fn test_memory_budget() {
        let device = GfxHeadlessDevice::new().with_memory_budget(Some(256 * 256 * 4));
        let first = device.create_texture(&rt_desc(256), "first").unwrap();
        assert_eq!(
            device.create_texture(&rt_desc(256), "second"),
            Err(GfxError::OutOfDeviceMemory("second".to_string()))
        );

        // 别名纹理不占用额外显存
        let alias = device.create_aliased_texture(&rt_desc(128), first, "alias").unwrap();
        assert_eq!(device.texture_memory_source(alias), Some(first));

        device.destroy_texture(alias);
        device.destroy_texture(first);
        assert_eq!(device.stats().bytes_in_use, 0);
        assert!(device.create_texture(&rt_desc(256), "third").is_ok());
    }

    #[test]
    fn test_alias_larger_than_source_is_rejected() {
        let device = GfxHeadlessDevice::new();
        let small = device.create_texture(&rt_desc(64), "small").unwrap();
        assert!(matches!(
            device.create_aliased_texture(&rt_desc(128), small, "big"),
            Err(GfxError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_submit_order_and_commands() {
        let device = GfxHeadlessDevice::new();
        let texture = device.create_texture(&rt_desc(16), "tex").unwrap();
        let a = device.create_encoder().unwrap();
        let b = device.create_encoder().unwrap();

        device.begin_encoder(b, "b").unwrap();
        device.cmd_draw(b, 3, 1).unwrap();
        device.end_encoder(b).unwrap();

        device.begin_encoder(a, "a").unwrap();
        device
            .cmd_resource_barriers(
                a,
                &[GfxBarrier::texture(texture, GfxResourceState::UNDEFINED, GfxResourceState::RENDER_TARGET)],
            )
            .unwrap();
        device.end_encoder(a).unwrap();

        device.submit(&[a, b]).unwrap();
        let labels: Vec<_> = device.submissions().into_iter().map(|submission| submission.label).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(device.stats().barrier_calls, 1);
    }

    #[test]
    fn test_recording_into_ended_encoder_fails() {
        let device = GfxHeadlessDevice::new();
        let encoder = device.create_encoder().unwrap();
        assert!(device.cmd_dispatch(encoder, [1, 1, 1]).is_err());
    }

    #[test]
    fn test_device_lost() {
        let device = GfxHeadlessDevice::new();
        device.set_device_lost(true);
        assert_eq!(device.create_encoder(), Err(GfxError::DeviceLost));
    }

    #[test]
    fn test_swapchain_cycles_images() {
        let device = GfxHeadlessDevice::new();
        let swapchain = device.create_swapchain(64, 64, GfxFormat::Bgra8Srgb, 2).unwrap();
        let first = device.acquire_backbuffer(swapchain).unwrap();
        device.present(swapchain).unwrap();
        let second = device.acquire_backbuffer(swapchain).unwrap();
        assert_ne!(first, second);
        assert!(device.present(swapchain).is_ok());
        assert!(device.present(swapchain).is_err());
        assert_eq!(device.live_texture_count(), 0);
    }
}
