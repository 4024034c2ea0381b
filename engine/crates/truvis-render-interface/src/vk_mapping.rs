//! Vulkan 映射
//!
//! 将 `GfxResourceState` / `GfxFormat` 转换为 Vulkan synchronization2 所需的
//! stage、access 与 image layout。Vulkan 后端录制 barrier 时使用。

use ash::vk;

use crate::resource_desc::GfxFormat;
use crate::resource_state::GfxResourceState;

/// 一个资源状态在 Vulkan 中的表示
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VkResourceState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl VkResourceState {
    /// 获取用于 barrier src 的 access（去掉读操作）
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access
            & !(vk::AccessFlags2::SHADER_SAMPLED_READ
                | vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::TRANSFER_READ
                | vk::AccessFlags2::MEMORY_READ
                | vk::AccessFlags2::UNIFORM_READ
                | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags2::INDEX_READ
                | vk::AccessFlags2::INDIRECT_COMMAND_READ)
    }
}

impl GfxResourceState {
    /// 转换为 Vulkan 的 stage / access / layout
    ///
    /// 组合状态的 stage 与 access 按位或；layout 取优先级最高的一项，
    /// 多种互斥 layout 同时出现时退化为 GENERAL。
    pub fn to_vk(self) -> VkResourceState {
        if self.is_undefined() {
            return VkResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            };
        }

        let mut stage = vk::PipelineStageFlags2::NONE;
        let mut access = vk::AccessFlags2::NONE;
        let mut layouts = Vec::with_capacity(2);

        let shader_stages = vk::PipelineStageFlags2::VERTEX_SHADER
            | vk::PipelineStageFlags2::FRAGMENT_SHADER
            | vk::PipelineStageFlags2::COMPUTE_SHADER;
        let depth_stages =
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;

        if self.contains(Self::SHADER_RESOURCE) {
            stage |= shader_stages;
            access |= vk::AccessFlags2::SHADER_SAMPLED_READ;
            layouts.push(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }
        if self.contains(Self::UNORDERED_ACCESS) {
            stage |= shader_stages;
            access |= vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE;
            layouts.push(vk::ImageLayout::GENERAL);
        }
        if self.contains(Self::RENDER_TARGET) {
            stage |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
            access |= vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
            layouts.push(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
        if self.contains(Self::DEPTH_WRITE) {
            stage |= depth_stages;
            access |=
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
            layouts.push(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        } else if self.contains(Self::DEPTH_READ) {
            stage |= depth_stages;
            access |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ;
            layouts.push(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        }
        if self.contains(Self::COPY_SRC) {
            stage |= vk::PipelineStageFlags2::TRANSFER;
            access |= vk::AccessFlags2::TRANSFER_READ;
            layouts.push(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        }
        if self.contains(Self::COPY_DST) {
            stage |= vk::PipelineStageFlags2::TRANSFER;
            access |= vk::AccessFlags2::TRANSFER_WRITE;
            layouts.push(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        }
        if self.contains(Self::VERTEX_BUFFER) {
            stage |= vk::PipelineStageFlags2::VERTEX_INPUT;
            access |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ;
        }
        if self.contains(Self::INDEX_BUFFER) {
            stage |= vk::PipelineStageFlags2::INDEX_INPUT;
            access |= vk::AccessFlags2::INDEX_READ;
        }
        if self.contains(Self::UNIFORM_BUFFER) {
            stage |= shader_stages;
            access |= vk::AccessFlags2::UNIFORM_READ;
        }
        if self.contains(Self::INDIRECT_ARGUMENT) {
            stage |= vk::PipelineStageFlags2::DRAW_INDIRECT;
            access |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
        }
        if self.contains(Self::PRESENT) {
            stage |= vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
            layouts.push(vk::ImageLayout::PRESENT_SRC_KHR);
        }

        let layout = match layouts.as_slice() {
            [] => vk::ImageLayout::UNDEFINED,
            [single] => *single,
            _ => vk::ImageLayout::GENERAL,
        };

        VkResourceState { stage, access, layout }
    }
}

impl GfxFormat {
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::R8Unorm => vk::Format::R8_UNORM,
            Self::Rg8Unorm => vk::Format::R8G8_UNORM,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::R16Float => vk::Format::R16_SFLOAT,
            Self::Rg16Float => vk::Format::R16G16_SFLOAT,
            Self::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            Self::R32Float => vk::Format::R32_SFLOAT,
            Self::R32Uint => vk::Format::R32_UINT,
            Self::Rg32Float => vk::Format::R32G32_SFLOAT,
            Self::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            Self::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
            Self::Rg11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
            Self::D16Unorm => vk::Format::D16_UNORM,
            Self::D32Float => vk::Format::D32_SFLOAT,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// 推断 barrier 使用的 aspect
    pub fn vk_aspect(self) -> vk::ImageAspectFlags {
        match (self.is_depth(), self.has_stencil()) {
            (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            (true, false) => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_target_layout() {
        let vk_state = GfxResourceState::RENDER_TARGET.to_vk();
        assert_eq!(vk_state.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(vk_state.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_combined_state_falls_back_to_general() {
        let vk_state = (GfxResourceState::SHADER_RESOURCE | GfxResourceState::COPY_SRC).to_vk();
        assert_eq!(vk_state.layout, vk::ImageLayout::GENERAL);
        assert!(vk_state.access.contains(vk::AccessFlags2::TRANSFER_READ));
    }

    #[test]
    fn test_src_access_drops_reads() {
        let vk_state = GfxResourceState::UNORDERED_ACCESS.to_vk();
        assert_eq!(vk_state.src_access(), vk::AccessFlags2::SHADER_STORAGE_WRITE);
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(GfxFormat::D32Float.vk_aspect(), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            GfxFormat::D24UnormS8Uint.vk_aspect(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(GfxFormat::Rgba8Unorm.vk_aspect(), vk::ImageAspectFlags::COLOR);
    }
}
