//! 资源节点
//!
//! 只描述逻辑资源本身（描述、来源、是否允许孤立）。
//! 生命周期与别名关系由调度器写入 `RgSchedule`，每帧的物理句柄与状态由执行器维护，
//! 节点本身在构建完成后不再改变。

use truvis_render_interface::handles::{GfxBufferHandle, GfxSwapchainHandle, GfxTextureHandle};
use truvis_render_interface::resource_desc::{GfxBufferDesc, GfxTextureDesc};
use truvis_render_interface::resource_state::GfxResourceState;

/// 资源在执行顺序中的存活区间 `[from, to)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgLifespan {
    pub from: u32,
    pub to: u32,
}

impl Default for RgLifespan {
    fn default() -> Self {
        Self::UNSET
    }
}

impl RgLifespan {
    /// 尚未计算（或资源只被剔除的 Pass 使用）
    pub const UNSET: Self = Self {
        from: u32::MAX,
        to: u32::MAX,
    };

    #[inline]
    pub const fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.from != u32::MAX
    }

    #[inline]
    pub fn contains(&self, order_index: u32) -> bool {
        self.is_set() && self.from <= order_index && order_index < self.to
    }

    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_set() && other.is_set() && self.from < other.to && other.from < self.to
    }

    /// 把一次使用并入区间
    #[inline]
    pub(crate) fn touch(&mut self, order_index: u32) {
        if self.is_set() {
            self.from = self.from.min(order_index);
            self.to = self.to.max(order_index + 1);
        } else {
            *self = Self::new(order_index, order_index + 1);
        }
    }
}

/// 资源描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceDesc {
    Texture(GfxTextureDesc),
    Buffer(GfxBufferDesc),
}

/// 资源的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgResourceSource {
    /// 由 graph 创建和回收
    Transient,
    /// 外部纹理，整个帧内有效，不会被别名或销毁
    ImportedTexture {
        handle: GfxTextureHandle,
        initial_state: GfxResourceState,
    },
    ImportedBuffer {
        handle: GfxBufferHandle,
        initial_state: GfxResourceState,
    },
    /// swapchain 当前的 backbuffer，执行时才获取
    Backbuffer { swapchain: GfxSwapchainHandle },
}

/// 资源节点
#[derive(Clone, Debug)]
pub struct RgResourceNode {
    name: String,
    desc: RgResourceDesc,
    source: RgResourceSource,
    /// 允许没有任何 Pass 使用
    allow_lone: bool,
}

// new & init
impl RgResourceNode {
    pub(crate) fn new(name: impl Into<String>, desc: RgResourceDesc, source: RgResourceSource) -> Self {
        Self {
            name: name.into(),
            desc,
            source,
            allow_lone: false,
        }
    }

    #[inline]
    pub(crate) fn set_allow_lone(&mut self, allow_lone: bool) {
        self.allow_lone = allow_lone;
    }
}

// getters
impl RgResourceNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn desc(&self) -> &RgResourceDesc {
        &self.desc
    }

    #[inline]
    pub fn texture_desc(&self) -> Option<&GfxTextureDesc> {
        match &self.desc {
            RgResourceDesc::Texture(desc) => Some(desc),
            RgResourceDesc::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn buffer_desc(&self) -> Option<&GfxBufferDesc> {
        match &self.desc {
            RgResourceDesc::Buffer(desc) => Some(desc),
            RgResourceDesc::Texture(_) => None,
        }
    }

    #[inline]
    pub fn is_texture(&self) -> bool {
        matches!(self.desc, RgResourceDesc::Texture(_))
    }

    #[inline]
    pub fn source(&self) -> &RgResourceSource {
        &self.source
    }

    /// 外部资源（包括 backbuffer）
    #[inline]
    pub fn is_imported(&self) -> bool {
        !matches!(self.source, RgResourceSource::Transient)
    }

    #[inline]
    pub fn allow_lone(&self) -> bool {
        self.allow_lone
    }

    /// 帧开始时资源所处的状态
    ///
    /// 临时资源与 backbuffer 的内容在帧开始时都没有意义。
    #[inline]
    pub fn initial_state(&self) -> GfxResourceState {
        match self.source {
            RgResourceSource::ImportedTexture { initial_state, .. }
            | RgResourceSource::ImportedBuffer { initial_state, .. } => initial_state,
            RgResourceSource::Transient | RgResourceSource::Backbuffer { .. } => GfxResourceState::UNDEFINED,
        }
    }

    /// 简短的类型描述，用于日志和导出
    pub fn kind_label(&self) -> &'static str {
        match (&self.desc, &self.source) {
            (_, RgResourceSource::Backbuffer { .. }) => "backbuffer",
            (RgResourceDesc::Texture(_), RgResourceSource::Transient) => "texture",
            (RgResourceDesc::Texture(_), _) => "imported texture",
            (RgResourceDesc::Buffer(_), RgResourceSource::Transient) => "buffer",
            (RgResourceDesc::Buffer(_), _) => "imported buffer",
        }
    }
}
