//! Fixed-function pipeline state blocks
//!
//! Plain-data descriptions of the graphics pipeline's fixed-function stages.
//! Materials keep one `PipelineState` and may override each block independently
//! until the pipeline is first built.

use ash::vk;

/// Vertex buffer layout
#[derive(Debug, Clone, Default)]
pub struct VertexInputState {
    /// Per-buffer strides and input rates
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Per-attribute formats and offsets
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputState {
    /// Interleaved position/normal/uv layout (3 + 3 + 2 floats) on binding 0
    pub fn position_normal_uv() -> Self {
        let float = std::mem::size_of::<f32>() as u32;
        Self {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 8 * float,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: vec![
                vk::VertexInputAttributeDescription { location: 0, binding: 0, format: vk::Format::R32G32B32_SFLOAT, offset: 0 },
                vk::VertexInputAttributeDescription { location: 1, binding: 0, format: vk::Format::R32G32B32_SFLOAT, offset: 3 * float },
                vk::VertexInputAttributeDescription { location: 2, binding: 0, format: vk::Format::R32G32_SFLOAT, offset: 6 * float },
            ],
        }
    }
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAssemblyState {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Whether a special index restarts strips
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

/// Constant depth bias parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    /// Constant factor added to each fragment depth
    pub constant_factor: f32,
    /// Maximum bias
    pub clamp: f32,
    /// Factor applied to the fragment slope
    pub slope_factor: f32,
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    /// Fill, line or point
    pub polygon_mode: vk::PolygonMode,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
    /// Winding that counts as front-facing
    pub front_face: vk::FrontFace,
    /// Line width for line topologies
    pub line_width: f32,
    /// Clamp depth instead of clipping
    pub depth_clamp: bool,
    /// Optional depth bias
    pub depth_bias: Option<DepthBias>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            depth_clamp: false,
            depth_bias: None,
        }
    }
}

/// Depth and stencil testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    /// Depth test enabled
    pub depth_test: bool,
    /// Depth writes enabled
    pub depth_write: bool,
    /// Depth comparison
    pub compare_op: vk::CompareOp,
    /// Stencil test enabled
    pub stencil_test: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare_op: vk::CompareOp::LESS,
            stencil_test: false,
        }
    }
}

/// Attachment blending
#[derive(Debug, Clone)]
pub struct ColorBlendState {
    /// One entry per color attachment of the subpass
    pub attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    /// Logic op replacing blending, if any
    pub logic_op: Option<vk::LogicOp>,
    /// Constant blend color
    pub blend_constants: [f32; 4],
}

impl ColorBlendState {
    /// Straight alpha blending on a single attachment
    pub fn alpha_blended() -> Self {
        Self {
            attachments: vec![vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::TRUE,
                src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
                dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::ONE,
                dst_alpha_blend_factor: vk::BlendFactor::ZERO,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::RGBA,
            }],
            ..Self::default()
        }
    }
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            attachments: vec![vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::FALSE,
                color_write_mask: vk::ColorComponentFlags::RGBA,
                ..Default::default()
            }],
            logic_op: None,
            blend_constants: [0.0; 4],
        }
    }
}

/// Complete fixed-function state of a graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// Vertex input block
    pub vertex_input: VertexInputState,
    /// Input assembly block
    pub input_assembly: InputAssemblyState,
    /// Rasterization block
    pub rasterization: RasterizationState,
    /// Depth/stencil block
    pub depth_stencil: DepthStencilState,
    /// Color blend block
    pub color_blend: ColorBlendState,
    /// Rasterization sample count
    pub samples: vk::SampleCountFlags,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            vertex_input: VertexInputState::position_normal_uv(),
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}
