//! RenderGraph 句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与 `GfxDevice` 的物理句柄分离。
//! 每个句柄都带有所属 graph 的 id，把一个 graph 的句柄用在另一个 graph 上会被拒绝，
//! 而不是悄悄指向另一个资源。

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// RenderGraph 实例的唯一标识
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RgGraphId(u32);

impl RgGraphId {
    /// 进程内唯一
    pub(crate) fn next() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// 依赖图中的节点 id
///
/// 按插入顺序稠密分配，仅在一次 build-compile-execute 周期内稳定。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgNodeId(u32);

impl RgNodeId {
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for RgNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

macro_rules! rg_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) graph: RgGraphId,
            pub(crate) node: RgNodeId,
        }

        impl $name {
            #[inline]
            pub(crate) fn new(graph: RgGraphId, node: RgNodeId) -> Self {
                Self { graph, node }
            }

            /// 所属 graph
            #[inline]
            pub fn graph(&self) -> RgGraphId {
                self.graph
            }

            /// 依赖图中的节点 id
            #[inline]
            pub fn node(&self) -> RgNodeId {
                self.node
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(g{}#{})", $label, self.graph.0, self.node.0)
            }
        }
    };
}

rg_handle!(
    /// Graph 内部的纹理句柄
    RgTextureHandle,
    "RgTexture"
);
rg_handle!(
    /// Graph 内部的缓冲区句柄
    RgBufferHandle,
    "RgBuffer"
);
rg_handle!(
    /// Pass 句柄
    RgPassHandle,
    "RgPass"
);

/// 纹理或缓冲区句柄
pub trait RgResourceHandle: Copy + fmt::Debug {
    const IS_TEXTURE: bool;

    fn graph_id(&self) -> RgGraphId;
    fn node_id(&self) -> RgNodeId;
}

impl RgResourceHandle for RgTextureHandle {
    const IS_TEXTURE: bool = true;

    #[inline]
    fn graph_id(&self) -> RgGraphId {
        self.graph
    }

    #[inline]
    fn node_id(&self) -> RgNodeId {
        self.node
    }
}

impl RgResourceHandle for RgBufferHandle {
    const IS_TEXTURE: bool = false;

    #[inline]
    fn graph_id(&self) -> RgGraphId {
        self.graph
    }

    #[inline]
    fn node_id(&self) -> RgNodeId {
        self.node
    }
}
