//! 每帧复用的底层 GPU 对象池
//!
//! 命令编码器、bind table、descriptor set 都按"每帧 reset、不够时扩容"的方式管理：
//! - `pop()` 只推进一个原子游标，不会阻塞；
//! - 游标超过容量时才会扩容；
//! - `reset()` 把游标拨回 0，上一轮取出的句柄不能再被调用者持有。

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use truvis_render_interface::gfx_device::GfxDevice;
use truvis_render_interface::gfx_error::GfxResult;
use truvis_render_interface::handles::{GfxBindTableHandle, GfxDescriptorSetHandle, GfxEncoderHandle};

use super::config::RgConfig;

/// 可以被池化的底层对象
pub trait RgPooledObject: Copy + Send + Sync + 'static {
    const NAME: &'static str;

    fn create(device: &dyn GfxDevice) -> GfxResult<Self>;
    fn destroy(self, device: &dyn GfxDevice);
}

impl RgPooledObject for GfxEncoderHandle {
    const NAME: &'static str = "encoder";

    fn create(device: &dyn GfxDevice) -> GfxResult<Self> {
        device.create_encoder()
    }

    fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_encoder(self);
    }
}

impl RgPooledObject for GfxBindTableHandle {
    const NAME: &'static str = "bind table";

    fn create(device: &dyn GfxDevice) -> GfxResult<Self> {
        device.create_bind_table()
    }

    fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_bind_table(self);
    }
}

impl RgPooledObject for GfxDescriptorSetHandle {
    const NAME: &'static str = "descriptor set";

    fn create(device: &dyn GfxDevice) -> GfxResult<Self> {
        device.create_descriptor_set()
    }

    fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_descriptor_set(self);
    }
}

/// 对象池
///
/// 多个录制线程可以同时 `pop()`；`reset()`/`destroy()` 只由协调线程在帧边界调用。
pub struct RgObjectPool<H: RgPooledObject> {
    items: RwLock<Vec<H>>,
    /// 下一个要取出的位置，可能超过容量（等待扩容）
    cursor: AtomicUsize,
    grow_step: usize,
    expand_count: AtomicUsize,
}

// new & init
impl<H: RgPooledObject> RgObjectPool<H> {
    pub fn new(grow_step: usize) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            grow_step: grow_step.max(1),
            expand_count: AtomicUsize::new(0),
        }
    }
}

// getters
impl<H: RgPooledObject> RgObjectPool<H> {
    /// 已经创建的对象数量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.read().len()
    }

    /// 本轮已经取出的数量
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// 累计扩容次数
    #[inline]
    pub fn expand_count(&self) -> usize {
        self.expand_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn grow_step(&self) -> usize {
        self.grow_step
    }
}

// tools
impl<H: RgPooledObject> RgObjectPool<H> {
    /// 取出下一个空闲对象，容量不足时先扩容
    pub fn pop(&self, device: &dyn GfxDevice) -> GfxResult<H> {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        if let Some(&item) = self.items.read().get(index) {
            return Ok(item);
        }

        let mut items = self.items.write();
        // 其他线程可能已经扩容过
        while items.len() <= index {
            self.grow(&mut items, self.grow_step, device)?;
        }
        Ok(items[index])
    }

    /// 额外创建 `count` 个对象
    pub fn expand(&self, count: usize, device: &dyn GfxDevice) -> GfxResult<()> {
        if count == 0 {
            return Ok(());
        }
        let mut items = self.items.write();
        self.grow(&mut items, count, device)
    }

    /// 帧开始时调用
    #[inline]
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// 销毁所有对象
    pub fn destroy(&self, device: &dyn GfxDevice) {
        let mut items = self.items.write();
        for item in items.drain(..) {
            item.destroy(device);
        }
        self.cursor.store(0, Ordering::Release);
    }

    fn grow(&self, items: &mut Vec<H>, count: usize, device: &dyn GfxDevice) -> GfxResult<()> {
        items.reserve(count);
        for _ in 0..count {
            items.push(H::create(device)?);
        }
        self.expand_count.fetch_add(1, Ordering::Relaxed);
        log::trace!("RgObjectPool<{}>: expanded by {count}, capacity {}", H::NAME, items.len());
        Ok(())
    }
}

/// 一帧（一个 `FrameLabel`）使用的所有对象池
pub struct RgFramePools {
    pub encoders: RgObjectPool<GfxEncoderHandle>,
    pub bind_tables: RgObjectPool<GfxBindTableHandle>,
    pub descriptor_sets: RgObjectPool<GfxDescriptorSetHandle>,
}

impl RgFramePools {
    pub fn new(config: &RgConfig) -> Self {
        Self {
            encoders: RgObjectPool::new(config.encoder_pool_grow),
            bind_tables: RgObjectPool::new(config.bind_table_pool_grow),
            descriptor_sets: RgObjectPool::new(config.descriptor_set_pool_grow),
        }
    }

    pub fn reset(&self) {
        self.encoders.reset();
        self.bind_tables.reset();
        self.descriptor_sets.reset();
    }

    pub fn destroy(&self, device: &dyn GfxDevice) {
        self.encoders.destroy(device);
        self.bind_tables.destroy(device);
        self.descriptor_sets.destroy(device);
    }
}
