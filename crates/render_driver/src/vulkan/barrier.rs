//! Image layout transitions
//!
//! Textures move between layouts only through the fixed table in
//! [`lookup_transition`]. Pairs outside the table are rejected with
//! [`DriverError::UnsupportedTransition`]; no barrier is recorded for them and
//! the tracked layout stays where it was.

use ash::{vk, Device};

use crate::error::{DriverError, DriverResult};

/// Layouts a [`crate::resources::Texture2DHandle`] can be tracked in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureLayout {
    /// Contents undefined; the initial layout of every texture
    Undefined,
    /// Destination of transfer commands
    TransferDst,
    /// Sampled from shaders
    ShaderReadOnly,
    /// Depth/stencil attachment
    DepthStencilAttachment,
}

impl TextureLayout {
    /// Every layout, in declaration order
    pub const ALL: [Self; 4] = [
        Self::Undefined,
        Self::TransferDst,
        Self::ShaderReadOnly,
        Self::DepthStencilAttachment,
    ];

    /// Matching Vulkan layout
    pub const fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}

/// Access and stage masks of one image barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait for the transition
    pub dst_stage: vk::PipelineStageFlags,
}

const fn access(bits: &[vk::AccessFlags]) -> vk::AccessFlags {
    let mut raw = 0;
    let mut i = 0;
    while i < bits.len() {
        raw |= bits[i].as_raw();
        i += 1;
    }
    vk::AccessFlags::from_raw(raw)
}

const UNDEFINED_TO_TRANSFER_DST: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::empty(),
    dst_access: vk::AccessFlags::MEMORY_WRITE,
    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
    dst_stage: vk::PipelineStageFlags::TRANSFER,
};

const TRANSFER_DST_TO_SHADER_READ: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::MEMORY_WRITE,
    dst_access: vk::AccessFlags::SHADER_READ,
    src_stage: vk::PipelineStageFlags::TRANSFER,
    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
};

const UNDEFINED_TO_DEPTH_STENCIL: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::empty(),
    dst_access: access(&[
        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
    ]),
    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
    dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
};

/// Swapchain image made ready for color output at the start of a frame
pub const SWAPCHAIN_TO_COLOR_ATTACHMENT: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::empty(),
    dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
};

/// Swapchain image handed to the presentation engine at the end of a frame
pub const SWAPCHAIN_TO_PRESENT: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    dst_access: vk::AccessFlags::empty(),
    src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
};

/// Barrier masks for a texture layout change, if the pair is supported
pub const fn lookup_transition(
    from: TextureLayout,
    to: TextureLayout,
) -> Result<LayoutTransition, (TextureLayout, TextureLayout)> {
    use TextureLayout::{DepthStencilAttachment, ShaderReadOnly, TransferDst, Undefined};

    match (from, to) {
        (Undefined, TransferDst) => Ok(UNDEFINED_TO_TRANSFER_DST),
        (TransferDst, ShaderReadOnly) => Ok(TRANSFER_DST_TO_SHADER_READ),
        (Undefined, DepthStencilAttachment) => Ok(UNDEFINED_TO_DEPTH_STENCIL),
        (
            Undefined | TransferDst | ShaderReadOnly | DepthStencilAttachment,
            Undefined | TransferDst | ShaderReadOnly | DepthStencilAttachment,
        ) => Err((from, to)),
    }
}

/// Aspect mask covering the whole of an image of `format`
pub const fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => vk::ImageAspectFlags::from_raw(
            vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
        ),
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn image_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    transition: &LayoutTransition,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

fn record_barrier(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    barrier: vk::ImageMemoryBarrier,
    transition: &LayoutTransition,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Record a texture layout change
///
/// Returns the new layout on success. Unsupported pairs are logged and
/// nothing is recorded.
pub fn record_texture_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    from: TextureLayout,
    to: TextureLayout,
) -> DriverResult<TextureLayout> {
    let transition = lookup_transition(from, to).map_err(|(from, to)| {
        log::error!("Unsupported image layout transition {:?} -> {:?}", from, to);
        DriverError::UnsupportedTransition { from, to }
    })?;

    let barrier = image_barrier(image, aspect_mask, from.to_vk(), to.to_vk(), &transition);
    record_barrier(device, command_buffer, barrier, &transition);
    Ok(to)
}

/// Move a freshly acquired swapchain image into color-attachment layout
pub fn record_swapchain_begin(device: &Device, command_buffer: vk::CommandBuffer, image: vk::Image) {
    let barrier = image_barrier(
        image,
        vk::ImageAspectFlags::COLOR,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        &SWAPCHAIN_TO_COLOR_ATTACHMENT,
    );
    record_barrier(device, command_buffer, barrier, &SWAPCHAIN_TO_COLOR_ATTACHMENT);
}

/// Move a rendered swapchain image into present layout
pub fn record_swapchain_present(device: &Device, command_buffer: vk::CommandBuffer, image: vk::Image) {
    let barrier = image_barrier(
        image,
        vk::ImageAspectFlags::COLOR,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        &SWAPCHAIN_TO_PRESENT,
    );
    record_barrier(device, command_buffer, barrier, &SWAPCHAIN_TO_PRESENT);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Position of a stage in the order work flows through a submission
    fn stage_rank(stage: vk::PipelineStageFlags) -> u32 {
        match stage {
            vk::PipelineStageFlags::TOP_OF_PIPE => 0,
            vk::PipelineStageFlags::TRANSFER => 1,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS => 2,
            vk::PipelineStageFlags::FRAGMENT_SHADER => 3,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT => 4,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE => 5,
            other => panic!("unexpected stage {other:?}"),
        }
    }

    fn writes() -> vk::AccessFlags {
        vk::AccessFlags::MEMORY_WRITE
            | vk::AccessFlags::TRANSFER_WRITE
            | vk::AccessFlags::SHADER_WRITE
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
    }

    fn assert_write_before_read(transition: &LayoutTransition) {
        assert!(
            stage_rank(transition.dst_stage) >= stage_rank(transition.src_stage),
            "{transition:?}"
        );
        if transition.src_access.intersects(writes()) {
            assert!(!transition.dst_access.is_empty(), "{transition:?}");
            assert_ne!(transition.dst_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        }
    }

    fn supported() -> Vec<(TextureLayout, TextureLayout, LayoutTransition)> {
        let mut out = Vec::new();
        for from in TextureLayout::ALL {
            for to in TextureLayout::ALL {
                if let Ok(t) = lookup_transition(from, to) {
                    out.push((from, to, t));
                }
            }
        }
        out
    }

    #[test]
    fn test_table_has_exactly_three_pairs() {
        let pairs: Vec<_> = supported().into_iter().map(|(f, t, _)| (f, t)).collect();
        assert_eq!(
            pairs,
            vec![
                (TextureLayout::Undefined, TextureLayout::TransferDst),
                (TextureLayout::Undefined, TextureLayout::DepthStencilAttachment),
                (TextureLayout::TransferDst, TextureLayout::ShaderReadOnly),
            ]
        );
    }

    #[test]
    fn test_supported_transitions_order_writes_before_reads() {
        for (_, _, transition) in supported() {
            assert_write_before_read(&transition);
        }
        assert_write_before_read(&SWAPCHAIN_TO_COLOR_ATTACHMENT);
        assert_write_before_read(&SWAPCHAIN_TO_PRESENT);
    }

    #[test]
    fn test_undefined_sources_have_no_prior_access() {
        for (from, _, transition) in supported() {
            if from == TextureLayout::Undefined {
                assert!(transition.src_access.is_empty());
                assert_eq!(transition.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
            }
        }
    }

    #[test]
    fn test_upload_target_blocks_transfer_stage() {
        let t = lookup_transition(TextureLayout::Undefined, TextureLayout::TransferDst).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::MEMORY_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        // The staging copy runs at TRANSFER, so the layout change must finish first
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_upload_then_sample_masks() {
        let t = lookup_transition(TextureLayout::TransferDst, TextureLayout::ShaderReadOnly).unwrap();
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_depth_stencil_masks() {
        let t = lookup_transition(TextureLayout::Undefined, TextureLayout::DepthStencilAttachment)
            .unwrap();
        assert_eq!(
            t.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unsupported_pairs_are_rejected() {
        assert_eq!(
            lookup_transition(TextureLayout::ShaderReadOnly, TextureLayout::TransferDst),
            Err((TextureLayout::ShaderReadOnly, TextureLayout::TransferDst))
        );
        assert!(lookup_transition(TextureLayout::TransferDst, TextureLayout::TransferDst).is_err());
        assert!(lookup_transition(TextureLayout::Undefined, TextureLayout::ShaderReadOnly).is_err());
    }

    #[test]
    fn test_layout_mapping() {
        assert_eq!(TextureLayout::Undefined.to_vk(), vk::ImageLayout::UNDEFINED);
        assert_eq!(
            TextureLayout::DepthStencilAttachment.to_vk(),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
