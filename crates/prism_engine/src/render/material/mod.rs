//! Materials
//!
//! A [`Material`] owns a shader program, the pipeline built from it and one
//! descriptor set per descriptor-set index the program references. Named
//! properties are resolved against the program's binding table.
//!
//! # Lifecycle
//!
//! `Uncompiled` → `Compiled` (modules built, binding table known) → `Ready`
//! (layouts, descriptor sets and pipeline created). Property writes made
//! before `Ready` are recorded and flushed once, each as a single descriptor
//! write carrying the last value. After `Ready` a write updates just its slot.

pub mod property;

pub use property::{BufferRange, MaterialProperty, PropertyValue, TextureBinding};

use std::collections::{BTreeMap, BTreeSet};

use ash::vk;
use thiserror::Error;

use crate::render::api::{
    BackendError, ColorBlendState, ComputePipelineDesc, DepthStencilState, DescriptorWrite, GpuBackend,
    GraphicsPipelineDesc, InputAssemblyState, PipelineState, RasterizationState, VertexInputState,
};
use crate::render::context::GpuContext;
use crate::render::shader::{ReflectedBinding, ShaderBindingTable, ShaderError, ShaderProgram};

/// Material failures
#[derive(Error, Debug)]
pub enum MaterialError {
    /// The name is not declared by any stage of the program
    #[error("Material '{material}': no binding named '{name}'")]
    UnresolvedBinding {
        /// Material name
        material: String,
        /// Requested binding name
        name: String,
    },

    /// The resource cannot feed the reflected descriptor type
    #[error("Material '{material}': {kind} cannot be bound to '{name}' ({expected:?})")]
    IncompatibleResource {
        /// Material name
        material: String,
        /// Binding name
        name: String,
        /// Kind of the supplied resource
        kind: &'static str,
        /// Reflected descriptor type
        expected: vk::DescriptorType,
    },

    /// The buffer range is smaller than the declared block
    #[error("Material '{material}': buffer for '{name}' has {range} bytes, block needs {required}")]
    UndersizedBuffer {
        /// Material name
        material: String,
        /// Binding name
        name: String,
        /// Supplied range
        range: vk::DeviceSize,
        /// Declared block size
        required: u32,
    },

    /// No material is registered under the id
    #[error("Unknown material")]
    UnknownMaterial,

    /// Fixed-function state cannot change after the pipeline exists
    #[error("Material '{0}': pipeline state is frozen after pipeline creation")]
    PipelineFrozen(String),

    /// Shader compilation or reflection failed
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// A device call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for material operations
pub type MaterialResult<T> = Result<T, MaterialError>;

/// Lifecycle state of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaterialState {
    /// Shader not compiled yet
    Uncompiled,
    /// Modules and binding table exist
    Compiled,
    /// Descriptor sets and pipeline exist
    Ready,
}

/// Shader program plus pipeline, descriptor sets and named properties
#[derive(Debug)]
pub struct Material {
    name: String,
    program: ShaderProgram,
    pipeline_state: PipelineState,
    state: MaterialState,
    pipeline_frozen: bool,
    properties: BTreeMap<String, MaterialProperty>,
    pending: BTreeSet<String>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_sets: BTreeMap<u32, vk::DescriptorSet>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    generation: u64,
    descriptor_writes: u64,
}

impl Material {
    /// Create an uncompiled material around `program`
    pub fn new(name: impl Into<String>, program: ShaderProgram) -> Self {
        Self {
            name: name.into(),
            program,
            pipeline_state: PipelineState::default(),
            state: MaterialState::Uncompiled,
            pipeline_frozen: false,
            properties: BTreeMap::new(),
            pending: BTreeSet::new(),
            set_layouts: Vec::new(),
            descriptor_sets: BTreeMap::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            generation: 0,
            descriptor_writes: 0,
        }
    }

    /// Material name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> MaterialState {
        self.state
    }

    /// True once descriptor sets and pipeline exist
    pub fn is_ready(&self) -> bool {
        self.state == MaterialState::Ready
    }

    /// True when the program has a compute stage
    pub fn is_compute(&self) -> bool {
        self.program.is_compute()
    }

    /// Shader program
    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Binding table of the program
    pub fn binding_table(&self) -> &ShaderBindingTable {
        self.program.binding_table()
    }

    /// Reflected compute work-group size
    pub fn work_group_size(&self) -> Option<[u32; 3]> {
        self.program.work_group_size()
    }

    /// Incremented each time the pipeline is rebuilt
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Incremented by every descriptor write, buffered or immediate
    ///
    /// A command buffer that bound this material's sets is invalid once the
    /// count moves past the value seen when it was recorded.
    pub fn descriptor_writes(&self) -> u64 {
        self.descriptor_writes
    }

    /// Pipeline handle, null until ready
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle, null until ready
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Descriptor set allocated for `set`
    pub fn descriptor_set(&self, set: u32) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(&set).copied()
    }

    /// Recorded property
    pub fn property(&self, name: &str) -> Option<&MaterialProperty> {
        self.properties.get(name)
    }

    /// Number of property writes waiting for a flush
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Pipeline bind point matching the program
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        if self.is_compute() {
            vk::PipelineBindPoint::COMPUTE
        } else {
            vk::PipelineBindPoint::GRAPHICS
        }
    }

    // Pipeline state

    /// Fixed-function state used for the graphics pipeline
    pub fn pipeline_state(&self) -> &PipelineState {
        &self.pipeline_state
    }

    fn edit_state(&mut self) -> MaterialResult<&mut PipelineState> {
        if self.pipeline_frozen {
            log::warn!("[MATERIAL] '{}': pipeline state change ignored after pipeline creation", self.name);
            return Err(MaterialError::PipelineFrozen(self.name.clone()));
        }
        Ok(&mut self.pipeline_state)
    }

    /// Override the vertex input layout
    pub fn set_vertex_input(&mut self, state: VertexInputState) -> MaterialResult<()> {
        self.edit_state()?.vertex_input = state;
        Ok(())
    }

    /// Override input assembly
    pub fn set_input_assembly(&mut self, state: InputAssemblyState) -> MaterialResult<()> {
        self.edit_state()?.input_assembly = state;
        Ok(())
    }

    /// Override rasterization
    pub fn set_rasterization(&mut self, state: RasterizationState) -> MaterialResult<()> {
        self.edit_state()?.rasterization = state;
        Ok(())
    }

    /// Override depth/stencil testing
    pub fn set_depth_stencil(&mut self, state: DepthStencilState) -> MaterialResult<()> {
        self.edit_state()?.depth_stencil = state;
        Ok(())
    }

    /// Override color blending
    pub fn set_color_blend(&mut self, state: ColorBlendState) -> MaterialResult<()> {
        self.edit_state()?.color_blend = state;
        Ok(())
    }

    // Properties

    /// Bind a buffer range to `name`
    ///
    /// With `backend` available and the material ready the slot is written
    /// immediately; otherwise the write is recorded and flushed later.
    pub fn set_buffer(
        &mut self,
        backend: Option<&mut dyn GpuBackend>,
        name: &str,
        buffer: BufferRange,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        self.set_property(backend, name, PropertyValue::Buffer(buffer), hint, silent)
    }

    /// Bind an image view, optionally with a sampler, to `name`
    pub fn set_texture(
        &mut self,
        backend: Option<&mut dyn GpuBackend>,
        name: &str,
        texture: TextureBinding,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        self.set_property(backend, name, PropertyValue::Texture(texture), hint, silent)
    }

    /// Bind a standalone sampler to `name`
    pub fn set_sampler(
        &mut self,
        backend: Option<&mut dyn GpuBackend>,
        name: &str,
        sampler: vk::Sampler,
        silent: bool,
    ) -> MaterialResult<()> {
        self.set_property(backend, name, PropertyValue::Sampler(sampler), vk::DescriptorType::SAMPLER, silent)
    }

    /// Bind a texel buffer view to `name`
    pub fn set_texel_buffer(
        &mut self,
        backend: Option<&mut dyn GpuBackend>,
        name: &str,
        view: vk::BufferView,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        self.set_property(backend, name, PropertyValue::TexelBuffer(view), hint, silent)
    }

    /// Record a property and write it if possible
    pub fn set_property(
        &mut self,
        backend: Option<&mut dyn GpuBackend>,
        name: &str,
        value: PropertyValue,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        let property = MaterialProperty { value, hint, silent };

        // Names can only be checked once the binding table exists
        if self.state != MaterialState::Uncompiled {
            match self.program.binding_table().binding(name) {
                Some(binding) => self.check_property(binding, &property)?,
                None if silent => return Ok(()),
                None => {
                    log::warn!("[MATERIAL] '{}': no binding named '{}'", self.name, name);
                    return Err(MaterialError::UnresolvedBinding { material: self.name.clone(), name: name.to_string() });
                }
            }
        }

        self.properties.insert(name.to_string(), property);
        match backend {
            Some(backend) if self.state == MaterialState::Ready => {
                self.pending.remove(name);
                self.write_slot(backend, name);
            }
            _ => {
                self.pending.insert(name.to_string());
            }
        }
        Ok(())
    }

    fn check_property(&self, binding: &ReflectedBinding, property: &MaterialProperty) -> MaterialResult<()> {
        if property.hint != binding.descriptor_type {
            log::warn!(
                "[MATERIAL] '{}': '{}' hinted as {:?} but declared {:?}; using the declared type",
                self.name,
                binding.name,
                property.hint,
                binding.descriptor_type
            );
        }

        if !property.value.accepts(binding.descriptor_type) {
            log::warn!(
                "[MATERIAL] '{}': {} cannot be bound to '{}' ({:?})",
                self.name,
                property.value.kind(),
                binding.name,
                binding.descriptor_type
            );
            return Err(MaterialError::IncompatibleResource {
                material: self.name.clone(),
                name: binding.name.clone(),
                kind: property.value.kind(),
                expected: binding.descriptor_type,
            });
        }

        if let PropertyValue::Buffer(buffer) = property.value {
            if buffer.range != vk::WHOLE_SIZE && buffer.range < vk::DeviceSize::from(binding.element_size) {
                log::warn!(
                    "[MATERIAL] '{}': buffer for '{}' has {} bytes, block needs {}",
                    self.name,
                    binding.name,
                    buffer.range,
                    binding.element_size
                );
                return Err(MaterialError::UndersizedBuffer {
                    material: self.name.clone(),
                    name: binding.name.clone(),
                    range: buffer.range,
                    required: binding.element_size,
                });
            }
        }
        Ok(())
    }

    /// Write one recorded property to its slot
    ///
    /// Returns false when the property could not be written; the reason is logged.
    fn write_slot(&mut self, backend: &mut dyn GpuBackend, name: &str) -> bool {
        let Some(property) = self.properties.get(name) else {
            return false;
        };
        let Some(binding) = self.program.binding_table().binding(name) else {
            if !property.silent {
                log::warn!("[MATERIAL] '{}': no binding named '{}', property dropped", self.name, name);
            }
            return false;
        };
        if let Err(err) = self.check_property(binding, property) {
            log::warn!("[MATERIAL] {err}");
            return false;
        }
        let (Some(set), Some(resource)) =
            (self.descriptor_sets.get(&binding.set), property.value.resource(binding.descriptor_type))
        else {
            return false;
        };

        backend.update_descriptor_set(&DescriptorWrite {
            set: *set,
            binding: binding.binding,
            descriptor_type: binding.descriptor_type,
            resource,
        });
        self.descriptor_writes += 1;
        true
    }

    /// Write every recorded-but-unwritten property once
    ///
    /// Does nothing before the material is ready. Returns the number of
    /// descriptor writes issued.
    pub fn flush(&mut self, backend: &mut dyn GpuBackend) -> usize {
        if self.state != MaterialState::Ready {
            return 0;
        }

        let pending = std::mem::take(&mut self.pending);
        let mut written = 0;
        for name in &pending {
            if self.write_slot(backend, name) {
                written += 1;
            } else if self.program.binding_table().binding(name).is_none() {
                self.properties.remove(name);
            }
        }

        if written > 0 {
            log::debug!("[MATERIAL] '{}': flushed {} property writes", self.name, written);
        }
        written
    }

    // Lifecycle

    /// Compile the program, moving `Uncompiled` to `Compiled`
    pub fn compile(&mut self, gpu: &mut GpuContext<'_>) -> MaterialResult<()> {
        if self.state != MaterialState::Uncompiled {
            return Ok(());
        }
        self.program.compile(gpu.compiler, gpu.backend)?;
        self.state = MaterialState::Compiled;
        Ok(())
    }

    /// Bring the material to `Ready`
    ///
    /// Compiles if needed, creates layouts, descriptor sets and the pipeline,
    /// then flushes every recorded property. Calling it on a ready material
    /// does nothing.
    pub fn initialize(&mut self, gpu: &mut GpuContext<'_>) -> MaterialResult<()> {
        if self.state == MaterialState::Ready {
            return Ok(());
        }
        self.compile(gpu)?;

        if let Err(err) = self.create_gpu_objects(gpu, true) {
            log::error!("[MATERIAL] '{}': initialization failed: {err}", self.name);
            self.release_gpu_objects(gpu.backend);
            return Err(err);
        }

        self.state = MaterialState::Ready;
        self.generation += 1;
        self.flush(gpu.backend);
        log::info!(
            "[MATERIAL] '{}' ready: {} descriptor sets, {} pipeline",
            self.name,
            self.descriptor_sets.len(),
            if self.is_compute() { "compute" } else { "graphics" }
        );
        Ok(())
    }

    fn create_gpu_objects(&mut self, gpu: &mut GpuContext<'_>, with_sets: bool) -> MaterialResult<()> {
        let table = self.program.binding_table();

        if with_sets {
            // Unreferenced set indices below the highest one get empty layouts
            for set in 0..table.set_count() {
                let layout = gpu.backend.create_descriptor_set_layout(&table.set_layout_bindings(set))?;
                self.set_layouts.push(layout);
            }
            for set in table.set_indices() {
                let layout = self.set_layouts[set as usize];
                let descriptor_set = gpu.backend.allocate_descriptor_set(layout)?;
                self.descriptor_sets.insert(set, descriptor_set);
            }
        }

        self.pipeline_layout = gpu
            .backend
            .create_pipeline_layout(&self.set_layouts, &table.push_constant_ranges())?;

        let stages = self.program.stage_descs()?;
        self.pipeline = if self.program.is_compute() {
            let stage = stages.first().ok_or_else(|| BackendError::InvalidOperation {
                reason: format!("material '{}' has no compute stage", self.name),
            })?;
            gpu.backend
                .create_compute_pipeline(&ComputePipelineDesc { layout: self.pipeline_layout, stage })?
        } else {
            gpu.backend.create_graphics_pipeline(&GraphicsPipelineDesc {
                layout: self.pipeline_layout,
                render_pass: gpu.render_pass,
                subpass: 0,
                stages: &stages,
                state: &self.pipeline_state,
            })?
        };
        self.pipeline_frozen = true;
        Ok(())
    }

    fn release_pipeline(&mut self, backend: &mut dyn GpuBackend) {
        if self.pipeline != vk::Pipeline::null() {
            backend.destroy_pipeline(self.pipeline);
            self.pipeline = vk::Pipeline::null();
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            backend.destroy_pipeline_layout(self.pipeline_layout);
            self.pipeline_layout = vk::PipelineLayout::null();
        }
    }

    fn release_gpu_objects(&mut self, backend: &mut dyn GpuBackend) {
        self.release_pipeline(backend);
        for (_, set) in std::mem::take(&mut self.descriptor_sets) {
            backend.free_descriptor_set(set);
        }
        for layout in self.set_layouts.drain(..) {
            backend.destroy_descriptor_set_layout(layout);
        }
    }

    /// Recompile the program if any stage changed on disk
    pub fn reload_if_changed(&mut self, gpu: &mut GpuContext<'_>) -> MaterialResult<bool> {
        if !self.program.needs_reload() {
            return Ok(false);
        }
        self.reload(gpu)?;
        Ok(true)
    }

    /// Recompile the program and rebuild the pipeline
    ///
    /// Descriptor sets survive when the binding table is unchanged; otherwise
    /// they are reallocated and every recorded property is written again. A
    /// failed compile keeps the previous pipeline.
    pub fn reload(&mut self, gpu: &mut GpuContext<'_>) -> MaterialResult<()> {
        if self.state == MaterialState::Uncompiled {
            return self.compile(gpu);
        }

        let previous = self.program.binding_table().clone();
        self.program.compile(gpu.compiler, gpu.backend)?;

        if self.state == MaterialState::Compiled {
            return Ok(());
        }

        let layout_changed = &previous != self.program.binding_table();
        if layout_changed {
            self.release_gpu_objects(gpu.backend);
            self.pending.extend(self.properties.keys().cloned());
        } else {
            self.release_pipeline(gpu.backend);
        }

        if let Err(err) = self.create_gpu_objects(gpu, layout_changed) {
            log::error!("[MATERIAL] '{}': reload failed: {err}", self.name);
            self.release_gpu_objects(gpu.backend);
            self.state = MaterialState::Compiled;
            self.pending.extend(self.properties.keys().cloned());
            return Err(err);
        }

        self.generation += 1;
        self.flush(gpu.backend);
        log::info!(
            "[MATERIAL] '{}' reloaded (generation {}, descriptor sets {})",
            self.name,
            self.generation,
            if layout_changed { "reallocated" } else { "kept" }
        );
        Ok(())
    }

    // Recording

    /// Bind the pipeline and every descriptor set into `command_buffer`
    ///
    /// Returns false when the material is not ready.
    pub fn bind(&mut self, backend: &mut dyn GpuBackend, command_buffer: vk::CommandBuffer) -> bool {
        if self.state != MaterialState::Ready {
            return false;
        }
        self.flush(backend);

        let bind_point = self.bind_point();
        backend.cmd_bind_pipeline(command_buffer, bind_point, self.pipeline);

        // One call per run of consecutive set indices
        let mut run: Vec<vk::DescriptorSet> = Vec::new();
        let mut first = 0;
        for (&set, &descriptor_set) in &self.descriptor_sets {
            if !run.is_empty() && set != first + run.len() as u32 {
                backend.cmd_bind_descriptor_sets(command_buffer, bind_point, self.pipeline_layout, first, &run);
                run.clear();
            }
            if run.is_empty() {
                first = set;
            }
            run.push(descriptor_set);
        }
        if !run.is_empty() {
            backend.cmd_bind_descriptor_sets(command_buffer, bind_point, self.pipeline_layout, first, &run);
        }
        true
    }

    /// Push the bytes of the push-constant member `name`
    ///
    /// Returns false without recording anything when the program declares no
    /// such member or the size differs.
    pub fn push_constant(
        &self,
        backend: &mut dyn GpuBackend,
        command_buffer: vk::CommandBuffer,
        name: &str,
        data: &[u8],
    ) -> bool {
        if self.state != MaterialState::Ready {
            return false;
        }
        let table = self.program.binding_table();
        let Some(member) = table.push_constant(name) else {
            return false;
        };
        if data.len() != member.size as usize {
            log::warn!(
                "[MATERIAL] '{}': push constant '{}' is {} bytes, got {}",
                self.name,
                name,
                member.size,
                data.len()
            );
            return false;
        }

        let stages = table
            .push_constant_ranges()
            .first()
            .map_or(member.stages, |range| range.stage_flags);
        backend.cmd_push_constants(command_buffer, self.pipeline_layout, stages, member.offset, data);
        true
    }

    /// Release every GPU object and return to `Uncompiled`
    ///
    /// Recorded properties are kept and will be flushed again after the next
    /// initialization.
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        self.release_gpu_objects(backend);
        self.program.destroy(backend);
        self.pending.extend(self.properties.keys().cloned());
        self.state = MaterialState::Uncompiled;
        self.pipeline_frozen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::{ShaderSource, ShaderStage};
    use crate::testing::{Call, RecordingBackend, SpirvBuilder, StaticCompiler};
    use ash::vk::Handle;

    fn lit_compiler() -> StaticCompiler {
        let mut vertex = SpirvBuilder::new(ShaderStage::Vertex);
        vertex.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
        vertex.push_block("Push", &[("model", 64)]);
        let mut fragment = SpirvBuilder::new(ShaderStage::Fragment);
        fragment.combined_image("Albedo", 1, 0);
        fragment.uniform_block("Material", "material", 2, 0, &[("tint", 16), ("roughness", 4)]);
        StaticCompiler::new().with("lit.vert", vertex.build()).with("lit.frag", fragment.build())
    }

    fn lit_material() -> Material {
        let program = ShaderProgram::from_sources(vec![
            ShaderSource::new("lit.vert", ShaderStage::Vertex, "main"),
            ShaderSource::new("lit.frag", ShaderStage::Fragment, "main"),
        ]);
        Material::new("lit", program)
    }

    fn texture(raw: u64) -> TextureBinding {
        TextureBinding::new(vk::ImageView::from_raw(raw)).with_sampler(vk::Sampler::from_raw(99))
    }

    #[test]
    fn buffered_writes_flush_once_with_last_value() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();

        for raw in [1, 2, 3] {
            material
                .set_texture(None, "Albedo", texture(raw), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
                .unwrap();
        }
        assert_eq!(backend.descriptor_writes().len(), 0);
        assert_eq!(material.pending_writes(), 1);

        let mut gpu = GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null());
        material.initialize(&mut gpu).unwrap();

        let writes = backend.descriptor_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].binding, 0);
        assert_eq!(writes[0].set, material.descriptor_set(1).unwrap());
        assert!(matches!(
            writes[0].resource,
            crate::render::api::DescriptorResource::CombinedImageSampler { view, .. } if view == vk::ImageView::from_raw(3)
        ));
    }

    #[test]
    fn ready_writes_update_single_slot() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null()))
            .unwrap();

        let allocations = backend.count(|call| matches!(call, Call::AllocateDescriptorSet(_)));
        assert_eq!(allocations, 3);
        let generation = material.generation();
        assert_eq!(material.descriptor_writes(), 0);

        for raw in [5, 6] {
            material
                .set_texture(Some(&mut gpu_backend), "Albedo", texture(raw), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
                .unwrap();
        }
        assert_eq!(backend.descriptor_writes().len(), 2);
        assert_eq!(material.descriptor_writes(), 2);
        assert_eq!(material.generation(), generation);
        assert_eq!(backend.count(|call| matches!(call, Call::AllocateDescriptorSet(_))), allocations);
        assert_eq!(material.pending_writes(), 0);
    }

    #[test]
    fn unresolved_names_report_unless_silent() {
        let mut backend = RecordingBackend::new();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material.initialize(&mut GpuContext::new(&mut backend, &compiler, vk::RenderPass::null())).unwrap();

        let err = material
            .set_texture(Some(&mut backend), "Normal", texture(1), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
            .unwrap_err();
        assert!(matches!(err, MaterialError::UnresolvedBinding { .. }));

        material
            .set_texture(Some(&mut backend), "Normal", texture(1), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, true)
            .unwrap();
        assert!(material.property("Normal").is_none());
    }

    #[test]
    fn undersized_buffers_are_rejected() {
        let mut backend = RecordingBackend::new();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material.initialize(&mut GpuContext::new(&mut backend, &compiler, vk::RenderPass::null())).unwrap();

        let small = BufferRange::new(vk::Buffer::from_raw(4), 0, 16);
        let err = material
            .set_buffer(Some(&mut backend), "Camera", small, vk::DescriptorType::UNIFORM_BUFFER, false)
            .unwrap_err();
        assert!(matches!(err, MaterialError::UndersizedBuffer { required: 64, .. }));

        let enough = BufferRange::new(vk::Buffer::from_raw(4), 0, 64);
        material
            .set_buffer(Some(&mut backend), "Camera", enough, vk::DescriptorType::STORAGE_BUFFER, false)
            .unwrap();
        assert_eq!(backend.descriptor_writes().last().unwrap().descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn unresolved_buffered_write_is_dropped_on_flush() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();

        material
            .set_texture(None, "Missing", texture(1), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, true)
            .unwrap();
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null()))
            .unwrap();

        assert!(backend.descriptor_writes().is_empty());
        assert!(material.property("Missing").is_none());
    }

    #[test]
    fn pipeline_state_freezes_after_creation() {
        let mut backend = RecordingBackend::new();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material.set_color_blend(ColorBlendState::alpha_blended()).unwrap();
        material.initialize(&mut GpuContext::new(&mut backend, &compiler, vk::RenderPass::null())).unwrap();

        let err = material.set_rasterization(RasterizationState::default()).unwrap_err();
        assert!(matches!(err, MaterialError::PipelineFrozen(_)));
        assert_eq!(material.pipeline_state().color_blend.attachments[0].blend_enable, vk::TRUE);
    }

    #[test]
    fn initialize_is_idempotent() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();
        let mut gpu = GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null());
        material.initialize(&mut gpu).unwrap();
        material.initialize(&mut gpu).unwrap();

        assert_eq!(backend.count(|call| matches!(call, Call::CreateGraphicsPipeline)), 1);
        assert_eq!(material.generation(), 1);
        assert_eq!(compiler.compile_count(), 2);
    }

    #[test]
    fn bind_groups_consecutive_sets() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null()))
            .unwrap();

        let cmd = vk::CommandBuffer::from_raw(42);
        assert!(material.bind(&mut gpu_backend, cmd));
        let binds: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::BindDescriptorSets { first_set, count, .. } => Some((first_set, count)),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![(0, 3)]);
    }

    #[test]
    fn model_push_constant_is_optional() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null()))
            .unwrap();

        let cmd = vk::CommandBuffer::from_raw(42);
        assert!(material.push_constant(&mut gpu_backend, cmd, "model", &[0; 64]));
        assert!(!material.push_constant(&mut gpu_backend, cmd, "tint", &[0; 16]));
        assert!(!material.push_constant(&mut gpu_backend, cmd, "model", &[0; 12]));
        assert_eq!(backend.count(|call| matches!(call, Call::PushConstants { .. })), 1);
    }

    #[test]
    fn reload_keeps_sets_when_layout_is_unchanged() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let compiler = lit_compiler();
        let mut material = lit_material();
        material
            .set_texture(None, "Albedo", texture(8), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
            .unwrap();
        let mut gpu = GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null());
        material.initialize(&mut gpu).unwrap();
        let set = material.descriptor_set(1);

        material.reload(&mut gpu).unwrap();
        assert_eq!(material.descriptor_set(1), set);
        assert_eq!(material.generation(), 2);
        assert_eq!(backend.count(|call| matches!(call, Call::AllocateDescriptorSet(_))), 3);
        assert_eq!(backend.count(|call| matches!(call, Call::CreateGraphicsPipeline)), 2);
        assert_eq!(backend.descriptor_writes().len(), 1);
    }

    #[test]
    fn reload_with_new_layout_rewrites_properties() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let mut material = lit_material();
        material
            .set_texture(None, "Albedo", texture(8), vk::DescriptorType::COMBINED_IMAGE_SAMPLER, false)
            .unwrap();
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &lit_compiler(), vk::RenderPass::null()))
            .unwrap();

        let mut vertex = SpirvBuilder::new(ShaderStage::Vertex);
        vertex.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
        let mut fragment = SpirvBuilder::new(ShaderStage::Fragment);
        fragment.combined_image("Albedo", 0, 1);
        let edited = StaticCompiler::new().with("lit.vert", vertex.build()).with("lit.frag", fragment.build());

        material
            .reload(&mut GpuContext::new(&mut gpu_backend, &edited, vk::RenderPass::null()))
            .unwrap();
        assert!(material.descriptor_set(1).is_none());
        let writes = backend.descriptor_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].binding, 1);
        assert_eq!(writes[1].set, material.descriptor_set(0).unwrap());
    }

    #[test]
    fn compute_material_builds_compute_pipeline() {
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        let mut comp = SpirvBuilder::new(ShaderStage::Compute);
        comp.local_size([32, 1, 1]);
        comp.storage_block("Particles", "particles", 0, 0, &[("count", 4)]);
        let compiler = StaticCompiler::new().with("sim.comp", comp.build());

        let program = ShaderProgram::from_sources(vec![ShaderSource::new("sim.comp", ShaderStage::Compute, "main")]);
        let mut material = Material::new("sim", program);
        material
            .initialize(&mut GpuContext::new(&mut gpu_backend, &compiler, vk::RenderPass::null()))
            .unwrap();

        assert!(material.is_compute());
        assert_eq!(material.bind_point(), vk::PipelineBindPoint::COMPUTE);
        assert_eq!(backend.count(|call| matches!(call, Call::CreateComputePipeline)), 1);
        assert_eq!(material.work_group_size(), Some([32, 1, 1]));
    }
}
