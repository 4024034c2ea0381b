//! 临时资源池
//!
//! 跨帧复用 graph 创建的临时纹理/缓冲区：按描述分桶的空闲列表，
//! 帧结束时归还，超过 `max_idle_frames` 帧没有被使用的资源在 `trim` 时销毁。
//!
//! 别名纹理（描述与根纹理不同）以 `(根纹理, 描述)` 为 key 缓存为 view，
//! 与根纹理一起销毁。

use std::collections::HashMap;

use itertools::Itertools;
use truvis_render_interface::gfx_device::GfxDevice;
use truvis_render_interface::gfx_error::GfxResult;
use truvis_render_interface::handles::{GfxBufferHandle, GfxTextureHandle};
use truvis_render_interface::resource_desc::{GfxBufferDesc, GfxTextureDesc};

#[derive(Clone, Copy, Debug)]
struct RgPoolEntry<H> {
    handle: H,
    last_used_frame: u64,
}

/// 临时资源池
#[derive(Default)]
pub struct RgTransientPool {
    free_textures: HashMap<GfxTextureDesc, Vec<RgPoolEntry<GfxTextureHandle>>>,
    free_buffers: HashMap<GfxBufferDesc, Vec<RgPoolEntry<GfxBufferHandle>>>,
    alias_views: HashMap<(GfxTextureHandle, GfxTextureDesc), GfxTextureHandle>,
}

// getters
impl RgTransientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空闲列表中的纹理数量
    pub fn free_texture_count(&self) -> usize {
        self.free_textures.values().map(Vec::len).sum()
    }

    pub fn free_buffer_count(&self) -> usize {
        self.free_buffers.values().map(Vec::len).sum()
    }

    pub fn alias_view_count(&self) -> usize {
        self.alias_views.len()
    }
}

// 纹理
impl RgTransientPool {
    /// 取一个描述完全相同的空闲纹理，没有时创建
    ///
    /// 返回 `(handle, 是否复用)`
    pub fn acquire_texture(
        &mut self,
        device: &dyn GfxDevice,
        desc: &GfxTextureDesc,
        name: &str,
    ) -> GfxResult<(GfxTextureHandle, bool)> {
        if let Some(entry) = self.free_textures.get_mut(desc).and_then(Vec::pop) {
            log::trace!("RgTransientPool: reuse texture {:?} for \"{name}\"", entry.handle);
            return Ok((entry.handle, true));
        }
        let handle = device.create_texture(desc, name)?;
        log::trace!("RgTransientPool: create texture {handle:?} for \"{name}\"");
        Ok((handle, false))
    }

    /// 归还纹理，只应在帧结束时调用
    pub fn release_texture(&mut self, desc: GfxTextureDesc, handle: GfxTextureHandle, frame_id: u64) {
        self.free_textures.entry(desc).or_default().push(RgPoolEntry {
            handle,
            last_used_frame: frame_id,
        });
    }

    /// 在 `root` 的内存上以 `desc` 解释的纹理
    ///
    /// 返回 `(handle, 是否新建)`
    pub fn acquire_alias_view(
        &mut self,
        device: &dyn GfxDevice,
        root: GfxTextureHandle,
        desc: &GfxTextureDesc,
        name: &str,
    ) -> GfxResult<(GfxTextureHandle, bool)> {
        if let Some(&view) = self.alias_views.get(&(root, *desc)) {
            return Ok((view, false));
        }
        let view = device.create_aliased_texture(desc, root, name)?;
        self.alias_views.insert((root, *desc), view);
        Ok((view, true))
    }

    fn destroy_texture_with_views(&mut self, device: &dyn GfxDevice, root: GfxTextureHandle) {
        let views = self.alias_views.keys().filter(|(owner, _)| *owner == root).copied().collect_vec();
        for key in views {
            if let Some(view) = self.alias_views.remove(&key) {
                device.destroy_texture(view);
            }
        }
        device.destroy_texture(root);
    }
}

// 缓冲区
impl RgTransientPool {
    pub fn acquire_buffer(
        &mut self,
        device: &dyn GfxDevice,
        desc: &GfxBufferDesc,
        name: &str,
    ) -> GfxResult<(GfxBufferHandle, bool)> {
        if let Some(entry) = self.free_buffers.get_mut(desc).and_then(Vec::pop) {
            return Ok((entry.handle, true));
        }
        Ok((device.create_buffer(desc, name)?, false))
    }

    pub fn release_buffer(&mut self, desc: GfxBufferDesc, handle: GfxBufferHandle, frame_id: u64) {
        self.free_buffers.entry(desc).or_default().push(RgPoolEntry {
            handle,
            last_used_frame: frame_id,
        });
    }
}

// 回收
impl RgTransientPool {
    /// 销毁超过 `max_idle_frames` 帧没有被使用的资源，返回销毁的数量
    pub fn trim(&mut self, device: &dyn GfxDevice, frame_id: u64, max_idle_frames: u64) -> usize {
        let expired = |last_used_frame: u64| frame_id.saturating_sub(last_used_frame) > max_idle_frames;

        let mut textures = Vec::new();
        for entries in self.free_textures.values_mut() {
            entries.retain(|entry| {
                let keep = !expired(entry.last_used_frame);
                if !keep {
                    textures.push(entry.handle);
                }
                keep
            });
        }
        let mut buffers = Vec::new();
        for entries in self.free_buffers.values_mut() {
            entries.retain(|entry| {
                let keep = !expired(entry.last_used_frame);
                if !keep {
                    buffers.push(entry.handle);
                }
                keep
            });
        }
        self.free_textures.retain(|_, entries| !entries.is_empty());
        self.free_buffers.retain(|_, entries| !entries.is_empty());

        let count = textures.len() + buffers.len();
        for texture in textures {
            self.destroy_texture_with_views(device, texture);
        }
        for buffer in buffers {
            device.destroy_buffer(buffer);
        }
        if count > 0 {
            log::debug!("RgTransientPool: trimmed {count} idle resources at frame {frame_id}");
        }
        count
    }

    /// 销毁池中所有资源
    pub fn destroy_all(&mut self, device: &dyn GfxDevice) {
        for (_, view) in self.alias_views.drain() {
            device.destroy_texture(view);
        }
        for entry in self.free_textures.drain().flat_map(|(_, entries)| entries) {
            device.destroy_texture(entry.handle);
        }
        for entry in self.free_buffers.drain().flat_map(|(_, entries)| entries) {
            device.destroy_buffer(entry.handle);
        }
    }
}
