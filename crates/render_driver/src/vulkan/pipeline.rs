//! Fixed-function graphics pipeline
//!
//! One hard-coded configuration: triangle lists of interleaved [`Vertex`]
//! data, no depth/stencil, one un-blended color attachment in the swapchain
//! format, dynamic viewport and scissor, and dynamic rendering in place of a
//! render pass object.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};
use std::ffi::CStr;
use std::mem::offset_of;
use std::path::Path;

use super::shader::{shader_path, ShaderModule, ShaderStage};
use crate::error::{DriverError, DriverResult};

/// Push constant bytes available to the vertex stage
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// Stages the push constant block is visible to
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

const ENTRY_POINT: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Interleaved vertex consumed by the fixed pipeline
///
/// Attribute 0 is a 2-float position at offset 0, attribute 1 a 3-float color
/// at offset 8. The trailing pad keeps the binding stride at 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in clip-space units before the MVP transform
    pub position: [f32; 2],
    /// Linear RGB color
    pub color: [f32; 3],
    _pad: f32,
}

impl Vertex {
    /// Binding stride in bytes
    pub const STRIDE: u32 = 24;

    /// Create a vertex
    pub const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position,
            color,
            _pad: 0.0,
        }
    }

    /// Vertex binding description
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Vertex attribute descriptions
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build the fixed pipeline from the shader pair `name` in `shader_dir`
    ///
    /// Shader modules are destroyed before returning. On failure nothing
    /// created along the way survives.
    pub fn from_shader_name(
        device: Device,
        shader_dir: &Path,
        name: &str,
        color_format: vk::Format,
    ) -> DriverResult<Self> {
        let vertex_shader = ShaderModule::from_file(
            device.clone(),
            &shader_path(shader_dir, name, ShaderStage::Vertex),
        )?;
        let fragment_shader = ShaderModule::from_file(
            device.clone(),
            &shader_path(shader_dir, name, ShaderStage::Fragment),
        )?;

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: PUSH_CONSTANT_STAGES,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        }];
        let layout_info =
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(DriverError::allocation("pipeline layout"))?
        };

        match Self::create_pipeline(&device, layout, &vertex_shader, &fragment_shader, color_format) {
            Ok(pipeline) => {
                log::debug!("Created pipeline '{}' for {:?}", name, color_format);
                Ok(Self {
                    device,
                    pipeline,
                    layout,
                })
            }
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }

    fn create_pipeline(
        device: &Device,
        layout: vk::PipelineLayout,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        color_format: vk::Format,
    ) -> DriverResult<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Vertex.flags())
                .module(vertex_shader.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Fragment.flags())
                .module(fragment_shader.handle())
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are dynamic state.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let color_formats = [color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::builder().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| DriverError::allocation("graphics pipeline")(err))?
        };

        pipelines.into_iter().next().ok_or(DriverError::Allocation {
            what: "graphics pipeline",
            result: vk::Result::ERROR_UNKNOWN,
        })
    }

    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Bind point of the pipeline
    pub const fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Check that a push constant write fits the pipeline's block
pub fn validate_push_constant_range(offset: u32, size: usize) -> DriverResult<()> {
    let end = u64::from(offset) + size as u64;
    if offset % 4 != 0 || size % 4 != 0 || size == 0 || end > u64::from(PUSH_CONSTANT_SIZE) {
        return Err(DriverError::InvalidOperation {
            reason: format!(
                "Push constant write of {size} bytes at offset {offset} does not fit the {PUSH_CONSTANT_SIZE}-byte block"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_vertex_layout_matches_binding() {
        assert_eq!(size_of::<Vertex>() as u32, Vertex::STRIDE);
        assert_eq!(Vertex::binding_description().stride, 24);

        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_vertices_cast_to_bytes() {
        let vertices = [
            Vertex::new([0.0, -0.5], [1.0, 0.0, 0.0]),
            Vertex::new([0.5, 0.5], [0.0, 1.0, 0.0]),
            Vertex::new([-0.5, 0.5], [0.0, 0.0, 1.0]),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 72);
        assert_eq!(&bytes[8..12], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn test_push_constant_bounds() {
        assert!(validate_push_constant_range(0, 64).is_ok());
        assert!(validate_push_constant_range(64, 64).is_ok());
        assert!(validate_push_constant_range(0, 132).is_err());
        assert!(validate_push_constant_range(2, 16).is_err());
        assert!(validate_push_constant_range(0, 0).is_err());
    }
}
