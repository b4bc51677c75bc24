//! Test doubles shared by unit tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use ash::vk::{self, Handle};

use crate::render::api::{
    BackendError, BackendResult, CommandBufferBegin, ComputePipelineDesc, DescriptorWrite, GpuBackend, GraphicsPipelineDesc,
    LayoutBinding,
};
use crate::render::shader::spirv::{decoration, op, storage_class, MAGIC};
use crate::render::material::Material;
use crate::render::shader::{CompileError, CompileRequest, ShaderCompiler, ShaderProgram, ShaderSource, ShaderStage};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateShaderModule(vk::ShaderModule),
    DestroyShaderModule(vk::ShaderModule),
    CreateSetLayout(Vec<LayoutBinding>),
    DestroySetLayout(vk::DescriptorSetLayout),
    AllocateDescriptorSet(vk::DescriptorSet),
    FreeDescriptorSet(vk::DescriptorSet),
    UpdateDescriptorSet(DescriptorWrite),
    CreatePipelineLayout { set_layouts: usize, push_ranges: usize },
    DestroyPipelineLayout(vk::PipelineLayout),
    CreateGraphicsPipeline,
    CreateComputePipeline,
    DestroyPipeline(vk::Pipeline),
    AllocateCommandBuffer(vk::CommandBuffer, vk::CommandBufferLevel),
    FreeCommandBuffer(vk::CommandBuffer),
    Begin(vk::CommandBuffer, CommandBufferBegin),
    End(vk::CommandBuffer),
    BindPipeline { command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint },
    BindDescriptorSets { command_buffer: vk::CommandBuffer, first_set: u32, count: usize },
    PushConstants { command_buffer: vk::CommandBuffer, offset: u32, size: usize },
    BindVertexBuffers(vk::CommandBuffer),
    BindIndexBuffer(vk::CommandBuffer),
    Draw { command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32 },
    DrawIndexed { command_buffer: vk::CommandBuffer, index_count: u32, instance_count: u32 },
    Dispatch { command_buffer: vk::CommandBuffer, groups: [u32; 3] },
    ExecuteCommands { command_buffer: vk::CommandBuffer, secondaries: Vec<vk::CommandBuffer> },
}

/// Backend that hands out fake handles and records every call
///
/// Clones share the same log, so a test can keep one clone for inspection
/// while another is moved into the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    calls: Rc<RefCell<Vec<Call>>>,
    next_handle: Rc<Cell<u64>>,
    module_budget: Rc<Cell<Option<usize>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `count` more shader modules succeed, then fail every creation
    pub fn fail_shader_modules_after(&self, count: usize) {
        self.module_budget.set(Some(count));
    }

    fn handle<H: Handle>(&self) -> H {
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        H::from_raw(raw)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(call)).count()
    }

    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::UpdateDescriptorSet(write) => Some(*write),
                _ => None,
            })
            .collect()
    }

    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Dispatch { groups, .. } => Some(*groups),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl GpuBackend for RecordingBackend {
    fn create_shader_module(&mut self, _code: &[u32]) -> BackendResult<vk::ShaderModule> {
        match self.module_budget.get() {
            Some(0) => return Err(BackendError::vulkan("vkCreateShaderModule", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
            Some(left) => self.module_budget.set(Some(left - 1)),
            None => {}
        }
        let module = self.handle();
        self.record(Call::CreateShaderModule(module));
        Ok(module)
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.record(Call::DestroyShaderModule(module));
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[LayoutBinding]) -> BackendResult<vk::DescriptorSetLayout> {
        self.record(Call::CreateSetLayout(bindings.to_vec()));
        Ok(self.handle())
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroySetLayout(layout));
    }

    fn allocate_descriptor_set(&mut self, _layout: vk::DescriptorSetLayout) -> BackendResult<vk::DescriptorSet> {
        let set = self.handle();
        self.record(Call::AllocateDescriptorSet(set));
        Ok(set)
    }

    fn free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.record(Call::FreeDescriptorSet(set));
    }

    fn update_descriptor_set(&mut self, write: &DescriptorWrite) {
        self.record(Call::UpdateDescriptorSet(*write));
    }

    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> BackendResult<vk::PipelineLayout> {
        self.record(Call::CreatePipelineLayout { set_layouts: set_layouts.len(), push_ranges: push_constants.len() });
        Ok(self.handle())
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(&mut self, _desc: &GraphicsPipelineDesc<'_>) -> BackendResult<vk::Pipeline> {
        self.record(Call::CreateGraphicsPipeline);
        Ok(self.handle())
    }

    fn create_compute_pipeline(&mut self, _desc: &ComputePipelineDesc<'_>) -> BackendResult<vk::Pipeline> {
        self.record(Call::CreateComputePipeline);
        Ok(self.handle())
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline(pipeline));
    }

    fn allocate_command_buffer(&mut self, level: vk::CommandBufferLevel) -> BackendResult<vk::CommandBuffer> {
        let command_buffer = self.handle();
        self.record(Call::AllocateCommandBuffer(command_buffer, level));
        Ok(command_buffer)
    }

    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.record(Call::FreeCommandBuffer(command_buffer));
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> BackendResult<()> {
        self.record(Call::Begin(command_buffer, *begin));
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> BackendResult<()> {
        self.record(Call::End(command_buffer));
        Ok(())
    }

    fn cmd_bind_pipeline(&mut self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, _pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline { command_buffer, bind_point });
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(Call::BindDescriptorSets { command_buffer, first_set, count: sets.len() });
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.record(Call::PushConstants { command_buffer, offset, size: data.len() });
    }

    fn cmd_bind_vertex_buffers(&mut self, command_buffer: vk::CommandBuffer, _buffers: &[vk::Buffer], _offsets: &[vk::DeviceSize]) {
        self.record(Call::BindVertexBuffers(command_buffer));
    }

    fn cmd_bind_index_buffer(&mut self, command_buffer: vk::CommandBuffer, _buffer: vk::Buffer, _offset: vk::DeviceSize, _index_type: vk::IndexType) {
        self.record(Call::BindIndexBuffer(command_buffer));
    }

    fn cmd_draw(&mut self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(Call::Draw { command_buffer, vertex_count, instance_count });
    }

    fn cmd_draw_indexed(&mut self, command_buffer: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        self.record(Call::DrawIndexed { command_buffer, index_count, instance_count });
    }

    fn cmd_dispatch(&mut self, command_buffer: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32) {
        self.record(Call::Dispatch { command_buffer, groups: [group_x, group_y, group_z] });
    }

    fn cmd_execute_commands(&mut self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        self.record(Call::ExecuteCommands { command_buffer, secondaries: secondaries.to_vec() });
    }
}

/// Compiler returning pre-built binaries keyed by file name
#[derive(Debug, Default)]
pub struct StaticCompiler {
    binaries: HashMap<String, Vec<u32>>,
    compiles: Cell<usize>,
}

impl StaticCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: &str, binary: Vec<u32>) -> Self {
        self.binaries.insert(file.to_string(), binary);
        self
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.get()
    }
}

impl ShaderCompiler for StaticCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u32>, CompileError> {
        self.compiles.set(self.compiles.get() + 1);
        let file = request.path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        self.binaries.get(file).cloned().ok_or_else(|| CompileError::Failed {
            path: request.path.to_path_buf(),
            status: Some(1),
            log: format!("ERROR: {file}: no binary registered"),
        })
    }
}

const OP_MEMORY_MODEL: u16 = 14;
const OP_CAPABILITY: u16 = 17;
const OP_TYPE_VOID: u16 = 19;
const COL_MAJOR: u32 = 5;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;
const DIM_2D: u32 = 1;

/// Emits small SPIR-V modules declaring resources for one entry point
///
/// Buffer block members are laid out with std140-like alignment and typed by
/// size: 4 float, 8 vec2, 12 vec3, 16 vec4, 64 mat4, anything else a float array.
#[derive(Debug)]
pub struct SpirvBuilder {
    stage: ShaderStage,
    next_id: u32,
    entry: u32,
    modes: Vec<u32>,
    names: Vec<u32>,
    annotations: Vec<u32>,
    types: Vec<u32>,
    cache: HashMap<&'static str, u32>,
    constants: HashMap<u32, u32>,
}

fn encode_string(text: &str) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes.chunks(4).map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])).collect()
}

fn emit(section: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
    let count = u32::try_from(operands.len() + 1).unwrap();
    section.push((count << 16) | u32::from(opcode));
    section.extend_from_slice(operands);
}

impl SpirvBuilder {
    pub fn new(stage: ShaderStage) -> Self {
        let mut builder = Self {
            stage,
            next_id: 1,
            entry: 0,
            modes: Vec::new(),
            names: Vec::new(),
            annotations: Vec::new(),
            types: Vec::new(),
            cache: HashMap::new(),
            constants: HashMap::new(),
        };
        builder.entry = builder.id();
        builder
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn name(&mut self, id: u32, name: &str) {
        let mut operands = vec![id];
        operands.extend(encode_string(name));
        emit(&mut self.names, op::NAME, &operands);
    }

    fn cached(&mut self, key: &'static str, declare: impl FnOnce(&mut Self, u32)) -> u32 {
        if let Some(id) = self.cache.get(key) {
            return *id;
        }
        let id = self.id();
        declare(self, id);
        self.cache.insert(key, id);
        id
    }

    fn float(&mut self) -> u32 {
        self.cached("float", |b, id| emit(&mut b.types, op::TYPE_FLOAT, &[id, 32]))
    }

    fn uint(&mut self) -> u32 {
        self.cached("uint", |b, id| emit(&mut b.types, op::TYPE_INT, &[id, 32, 0]))
    }

    fn vector(&mut self, count: u32) -> u32 {
        let float = self.float();
        let key = match count {
            2 => "vec2",
            3 => "vec3",
            _ => "vec4",
        };
        self.cached(key, |b, id| emit(&mut b.types, op::TYPE_VECTOR, &[id, float, count]))
    }

    fn mat4(&mut self) -> u32 {
        let column = self.vector(4);
        self.cached("mat4", |b, id| emit(&mut b.types, op::TYPE_MATRIX, &[id, column, 4]))
    }

    fn constant(&mut self, value: u32) -> u32 {
        if let Some(id) = self.constants.get(&value) {
            return *id;
        }
        let uint = self.uint();
        let id = self.id();
        emit(&mut self.types, op::CONSTANT, &[uint, id, value]);
        self.constants.insert(value, id);
        id
    }

    fn member_type(&mut self, size: u32) -> u32 {
        match size {
            4 => self.float(),
            8 => self.vector(2),
            12 => self.vector(3),
            16 => self.vector(4),
            64 => self.mat4(),
            _ => {
                let float = self.float();
                let length = self.constant(size / 4);
                let id = self.id();
                emit(&mut self.types, op::TYPE_ARRAY, &[id, float, length]);
                emit(&mut self.annotations, op::DECORATE, &[id, decoration::ARRAY_STRIDE, 4]);
                id
            }
        }
    }

    fn block(&mut self, name: &str, members: &[(&str, u32)], buffer_decoration: u32) -> u32 {
        let member_types: Vec<u32> = members.iter().map(|(_, size)| self.member_type(*size)).collect();
        let id = self.id();
        let mut operands = vec![id];
        operands.extend(&member_types);
        emit(&mut self.types, op::TYPE_STRUCT, &operands);
        emit(&mut self.annotations, op::DECORATE, &[id, buffer_decoration]);
        self.name(id, name);

        let mut offset = 0;
        for (index, (member, size)) in members.iter().enumerate() {
            let index = u32::try_from(index).unwrap();
            let align = match size {
                4 => 4,
                8 => 8,
                _ => 16,
            };
            offset = (offset + align - 1) / align * align;
            emit(&mut self.annotations, op::MEMBER_DECORATE, &[id, index, decoration::OFFSET, offset]);
            if *size == 64 {
                emit(&mut self.annotations, op::MEMBER_DECORATE, &[id, index, COL_MAJOR]);
                emit(&mut self.annotations, op::MEMBER_DECORATE, &[id, index, decoration::MATRIX_STRIDE, 16]);
            }
            let mut operands = vec![id, index];
            operands.extend(encode_string(member));
            emit(&mut self.names, op::MEMBER_NAME, &operands);
            offset += size;
        }
        id
    }

    fn variable(&mut self, pointee: u32, storage: u32, name: &str, slot: Option<(u32, u32)>) -> u32 {
        let pointer = self.id();
        emit(&mut self.types, op::TYPE_POINTER, &[pointer, storage, pointee]);
        let variable = self.id();
        emit(&mut self.types, op::VARIABLE, &[pointer, variable, storage]);
        self.name(variable, name);
        if let Some((set, binding)) = slot {
            emit(&mut self.annotations, op::DECORATE, &[variable, decoration::DESCRIPTOR_SET, set]);
            emit(&mut self.annotations, op::DECORATE, &[variable, decoration::BINDING, binding]);
        }
        variable
    }

    fn image_type(&mut self, dim: u32, sampled: u32) -> u32 {
        let float = self.float();
        let id = self.id();
        emit(&mut self.types, op::TYPE_IMAGE, &[id, float, dim, 0, 0, 0, sampled, 0]);
        id
    }

    pub fn uniform_block(&mut self, block: &str, variable: &str, set: u32, binding: u32, members: &[(&str, u32)]) {
        let id = self.block(block, members, decoration::BLOCK);
        self.variable(id, storage_class::UNIFORM, variable, Some((set, binding)));
    }

    pub fn storage_block(&mut self, block: &str, variable: &str, set: u32, binding: u32, members: &[(&str, u32)]) {
        let id = self.block(block, members, decoration::BLOCK);
        self.variable(id, storage_class::STORAGE_BUFFER, variable, Some((set, binding)));
    }

    pub fn image(&mut self, name: &str, set: u32, binding: u32, dim: u32, sampled: u32) {
        let id = self.image_type(dim, sampled);
        self.variable(id, storage_class::UNIFORM_CONSTANT, name, Some((set, binding)));
    }

    pub fn sampler(&mut self, name: &str, set: u32, binding: u32) {
        let id = self.id();
        emit(&mut self.types, op::TYPE_SAMPLER, &[id]);
        self.variable(id, storage_class::UNIFORM_CONSTANT, name, Some((set, binding)));
    }

    fn sampled_image(&mut self) -> u32 {
        let image = self.image_type(DIM_2D, 1);
        let id = self.id();
        emit(&mut self.types, op::TYPE_SAMPLED_IMAGE, &[id, image]);
        id
    }

    pub fn combined_image(&mut self, name: &str, set: u32, binding: u32) {
        let id = self.sampled_image();
        self.variable(id, storage_class::UNIFORM_CONSTANT, name, Some((set, binding)));
    }

    pub fn combined_image_array(&mut self, name: &str, set: u32, binding: u32, length: u32) {
        let element = self.sampled_image();
        let length = self.constant(length);
        let id = self.id();
        emit(&mut self.types, op::TYPE_ARRAY, &[id, element, length]);
        self.variable(id, storage_class::UNIFORM_CONSTANT, name, Some((set, binding)));
    }

    pub fn push_block(&mut self, block: &str, members: &[(&str, u32)]) {
        let id = self.block(block, members, decoration::BLOCK);
        self.variable(id, storage_class::PUSH_CONSTANT, "push", None);
    }

    pub fn local_size(&mut self, size: [u32; 3]) {
        let entry = self.entry;
        emit(&mut self.modes, op::EXECUTION_MODE, &[entry, EXECUTION_MODE_LOCAL_SIZE, size[0], size[1], size[2]]);
    }

    pub fn build(&self) -> Vec<u32> {
        let mut words = vec![MAGIC, 0x0001_0000, 0, self.next_id, 0];
        emit(&mut words, OP_CAPABILITY, &[1]);
        emit(&mut words, OP_MEMORY_MODEL, &[0, 1]);

        let mut entry = vec![self.stage.execution_model(), self.entry];
        entry.extend(encode_string("main"));
        emit(&mut words, op::ENTRY_POINT, &entry);
        words.extend(&self.modes);
        words.extend(&self.names);
        words.extend(&self.annotations);

        let void = self.next_id;
        emit(&mut words, OP_TYPE_VOID, &[void]);
        words.extend(&self.types);
        words[3] = self.next_id + 1;
        words
    }
}

/// Programs used by scene and frame tests
///
/// `lit.vert`/`lit.frag` declare `Camera` (set 0), `Albedo` (set 1), `Material`
/// (set 2) and a `model` push constant. `particles.comp` declares a
/// `Particles` storage buffer and a 32x1x1 work group.
pub fn scene_compiler() -> StaticCompiler {
    let mut vertex = SpirvBuilder::new(ShaderStage::Vertex);
    vertex.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
    vertex.push_block("Push", &[("model", 64)]);
    let mut fragment = SpirvBuilder::new(ShaderStage::Fragment);
    fragment.combined_image("Albedo", 1, 0);
    fragment.uniform_block("Material", "material", 2, 0, &[("tint", 16), ("roughness", 4)]);
    let mut compute = SpirvBuilder::new(ShaderStage::Compute);
    compute.local_size([32, 1, 1]);
    compute.storage_block("Particles", "particles", 0, 0, &[("positions", 64)]);
    StaticCompiler::new()
        .with("lit.vert", vertex.build())
        .with("lit.frag", fragment.build())
        .with("particles.comp", compute.build())
}

pub fn lit_material() -> Material {
    Material::new(
        "lit",
        ShaderProgram::from_sources(vec![
            ShaderSource::new("lit.vert", ShaderStage::Vertex, "main"),
            ShaderSource::new("lit.frag", ShaderStage::Fragment, "main"),
        ]),
    )
}

pub fn particles_material() -> Material {
    Material::new(
        "particles",
        ShaderProgram::from_sources(vec![ShaderSource::new("particles.comp", ShaderStage::Compute, "main")]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::spirv::Module;

    #[test]
    fn built_modules_parse() {
        let mut builder = SpirvBuilder::new(ShaderStage::Compute);
        builder.local_size([8, 8, 1]);
        builder.uniform_block("Params", "params", 0, 0, &[("scale", 4), ("offset", 12), ("weights", 40)]);

        let module = Module::parse(&builder.build()).unwrap();
        let entry = module.entry_point(ShaderStage::Compute.execution_model()).unwrap();
        assert_eq!(entry.name, "main");
        assert_eq!(module.local_size(entry.id).unwrap(), Some([8, 8, 1]));
    }
}
