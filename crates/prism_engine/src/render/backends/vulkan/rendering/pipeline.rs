//! Pipeline construction
//!
//! Turns the plain-data pipeline descriptions into Vulkan create-info chains.
//! Viewport and scissor are always dynamic state.

use std::ffi::CString;

use ash::{vk, Device};

use crate::render::api::{ComputePipelineDesc, GraphicsPipelineDesc, ShaderStageDesc};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

fn entry_points(stages: &[ShaderStageDesc]) -> VulkanResult<Vec<CString>> {
    stages
        .iter()
        .map(|stage| {
            CString::new(stage.entry_point.as_str()).map_err(|_| VulkanError::InvalidOperation {
                reason: format!("Entry point {:?} contains a NUL byte", stage.entry_point),
            })
        })
        .collect()
}

/// Create a pipeline layout
pub fn create_pipeline_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constants: &[vk::PushConstantRange],
) -> VulkanResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constants);

    unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(VulkanError::Api)
}

/// Create a graphics pipeline
pub fn create_graphics_pipeline(device: &Device, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
    let names = entry_points(desc.stages)?;
    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
        .stages
        .iter()
        .zip(&names)
        .map(|(stage, name)| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(stage.stage)
                .module(stage.module)
                .name(name)
                .build()
        })
        .collect();

    let state = desc.state;
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&state.vertex_input.bindings)
        .vertex_attribute_descriptions(&state.vertex_input.attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(state.input_assembly.topology)
        .primitive_restart_enable(state.input_assembly.primitive_restart);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
        .dynamic_states(&dynamic_states);

    let raster = &state.rasterization;
    let mut rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(raster.depth_clamp)
        .rasterizer_discard_enable(false)
        .polygon_mode(raster.polygon_mode)
        .line_width(raster.line_width)
        .cull_mode(raster.cull_mode)
        .front_face(raster.front_face)
        .depth_bias_enable(raster.depth_bias.is_some());
    if let Some(bias) = raster.depth_bias {
        rasterizer = rasterizer
            .depth_bias_constant_factor(bias.constant_factor)
            .depth_bias_clamp(bias.clamp)
            .depth_bias_slope_factor(bias.slope_factor);
    }

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(state.samples);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(state.depth_stencil.depth_test)
        .depth_write_enable(state.depth_stencil.depth_write)
        .depth_compare_op(state.depth_stencil.compare_op)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(state.depth_stencil.stencil_test);

    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(state.color_blend.logic_op.is_some())
        .logic_op(state.color_blend.logic_op.unwrap_or(vk::LogicOp::COPY))
        .attachments(&state.color_blend.attachments)
        .blend_constants(state.color_blend.blend_constants);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(desc.layout)
        .render_pass(desc.render_pass)
        .subpass(desc.subpass);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
            .map_err(|(_, err)| VulkanError::Api(err))?
    };

    pipelines.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
        reason: "Driver returned no graphics pipeline".to_string(),
    })
}

/// Create a compute pipeline
pub fn create_compute_pipeline(device: &Device, desc: &ComputePipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
    let names = entry_points(std::slice::from_ref(desc.stage))?;
    let name = names.first().ok_or_else(|| VulkanError::InvalidOperation {
        reason: "Compute stage has no entry point".to_string(),
    })?;

    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(desc.stage.module)
        .name(name);

    let pipeline_info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage.build())
        .layout(desc.layout);

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
            .map_err(|(_, err)| VulkanError::Api(err))?
    };

    pipelines.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
        reason: "Driver returned no compute pipeline".to_string(),
    })
}
