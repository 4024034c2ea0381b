//! 资源描述
//!
//! 与后端无关的纹理/缓冲区描述，RenderGraph 用它们创建临时资源、判断别名兼容性。

use bitflags::bitflags;

/// 纹理格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    R32Uint,
    Rg32Float,
    Rgba32Float,
    Rgb10A2Unorm,
    Rg11B10Float,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl GfxFormat {
    /// 每个 texel 的位数
    ///
    /// 位数相同的格式之间允许 typeless 别名。
    pub const fn bits_per_texel(self) -> u32 {
        match self {
            Self::R8Unorm => 8,
            Self::Rg8Unorm | Self::R16Float | Self::D16Unorm => 16,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::Bgra8Srgb
            | Self::Rg16Float
            | Self::R32Float
            | Self::R32Uint
            | Self::Rgb10A2Unorm
            | Self::Rg11B10Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 32,
            Self::Rgba16Float | Self::Rg32Float | Self::D32FloatS8Uint => 64,
            Self::Rgba32Float => 128,
        }
    }

    #[inline]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    #[inline]
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }
}

bitflags! {
    /// 纹理用途
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GfxTextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

bitflags! {
    /// 缓冲区用途
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GfxBufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

/// 纹理维度
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GfxTextureDimension {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

/// 纹理描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxTextureDesc {
    pub width: u32,
    pub height: u32,
    /// 3D 纹理为深度，其余为数组层数
    pub depth_or_layers: u32,
    pub mip_levels: u32,
    pub format: GfxFormat,
    pub usage: GfxTextureUsage,
    /// 采样数（1 表示不开启 MSAA）
    pub samples: u32,
    pub dimension: GfxTextureDimension,
}

impl Default for GfxTextureDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth_or_layers: 1,
            mip_levels: 1,
            format: GfxFormat::Rgba8Unorm,
            usage: GfxTextureUsage::SAMPLED | GfxTextureUsage::STORAGE,
            samples: 1,
            dimension: GfxTextureDimension::D2,
        }
    }
}

// new & builder
impl GfxTextureDesc {
    /// 创建 2D 纹理描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: GfxFormat, usage: GfxTextureUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.depth_or_layers = layers;
        self
    }

    #[inline]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    #[inline]
    pub fn with_format(mut self, format: GfxFormat) -> Self {
        self.format = format;
        self
    }

    #[inline]
    pub fn with_usage(mut self, usage: GfxTextureUsage) -> Self {
        self.usage = usage;
        self
    }
}

// getters
impl GfxTextureDesc {
    /// 所有尺寸非零，采样数为 2 的幂
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.depth_or_layers > 0
            && self.mip_levels > 0
            && self.samples > 0
            && self.samples.is_power_of_two()
            && self.samples <= 64
            && self.mip_levels <= 32 - self.width.max(self.height).leading_zeros()
    }

    /// 占用的显存字节数（所有 mip、所有层）
    pub fn memory_size(&self) -> u64 {
        let bytes_per_texel = u64::from(self.format.bits_per_texel().div_ceil(8));
        let depth_scales = self.dimension == GfxTextureDimension::D3;

        (0..self.mip_levels)
            .map(|mip| {
                let w = u64::from((self.width >> mip).max(1));
                let h = u64::from((self.height >> mip).max(1));
                let d = if depth_scales {
                    u64::from((self.depth_or_layers >> mip).max(1))
                } else {
                    u64::from(self.depth_or_layers)
                };
                w * h * d * bytes_per_texel * u64::from(self.samples)
            })
            .sum()
    }
}

/// 缓冲区描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferDesc {
    /// 字节数
    pub size: u64,
    pub usage: GfxBufferUsage,
}

impl Default for GfxBufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: GfxBufferUsage::STORAGE,
        }
    }
}

impl GfxBufferDesc {
    #[inline]
    pub fn new(size: u64, usage: GfxBufferUsage) -> Self {
        Self { size, usage }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_size_with_mips() {
        let desc = GfxTextureDesc::new_2d(4, 4, GfxFormat::Rgba8Unorm, GfxTextureUsage::SAMPLED).with_mip_levels(3);
        // 4x4 + 2x2 + 1x1 texels, 4 bytes each
        assert_eq!(desc.memory_size(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn test_invalid_desc() {
        let desc = GfxTextureDesc::new_2d(0, 256, GfxFormat::Rgba8Unorm, GfxTextureUsage::SAMPLED);
        assert!(!desc.is_valid());

        let desc = GfxTextureDesc::new_2d(256, 256, GfxFormat::Rgba8Unorm, GfxTextureUsage::SAMPLED).with_samples(3);
        assert!(!desc.is_valid());

        // 256 最多 9 级 mip
        let desc = GfxTextureDesc::new_2d(256, 256, GfxFormat::Rgba8Unorm, GfxTextureUsage::SAMPLED).with_mip_levels(10);
        assert!(!desc.is_valid());
        assert!(desc.with_mip_levels(9).is_valid());
    }

    #[test]
    fn test_typeless_bits() {
        assert_eq!(GfxFormat::Rgba8Unorm.bits_per_texel(), GfxFormat::R32Float.bits_per_texel());
        assert_ne!(GfxFormat::Rgba8Unorm.bits_per_texel(), GfxFormat::Rgba16Float.bits_per_texel());
    }
}
