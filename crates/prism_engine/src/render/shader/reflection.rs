//! Per-stage shader reflection
//!
//! Turns a compiled SPIR-V binary into the descriptor bindings, push-constant
//! members and compute work-group size it declares. Stage results are merged
//! into a program-wide table by [`super::ShaderBindingTable`].

use ash::vk;
use thiserror::Error;

use super::spirv::{dim, storage_class, Module, Type};
use super::stage::ShaderStage;

/// Errors raised while reflecting or merging shader interfaces
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReflectionError {
    /// The binary is not well-formed SPIR-V
    #[error("Malformed SPIR-V: {0}")]
    Malformed(String),

    /// The binary has no entry point for the expected stage
    #[error("No {0} entry point in module")]
    MissingEntryPoint(ShaderStage),

    /// A name was redeclared with a different slot or type
    #[error("Binding '{name}' redeclared: {existing} vs {incoming}")]
    ConflictingBinding {
        /// Binding name
        name: String,
        /// Previously recorded slot
        existing: String,
        /// Slot found in the new stage
        incoming: String,
    },

    /// Two names claim the same slot with different descriptor types
    #[error("Set {set} binding {binding} is claimed by '{first}' and '{second}' with different types")]
    SlotConflict {
        /// Descriptor set index
        set: u32,
        /// Binding index
        binding: u32,
        /// First name
        first: String,
        /// Second name
        second: String,
    },

    /// A push-constant member was redeclared with a different range
    #[error("Push constant '{0}' redeclared with a different offset or size")]
    ConflictingPushConstant(String),
}

/// Result type for reflection
pub type ReflectionResult<T> = Result<T, ReflectionError>;

/// One descriptor binding declared by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Block type name for buffers, variable name otherwise
    pub name: String,
    /// Descriptor set index
    pub set: u32,
    /// Binding index
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Descriptor count (array length, 1 when not arrayed)
    pub count: u32,
    /// Declared struct size for buffer blocks, 0 otherwise
    pub element_size: u32,
    /// Stages that declare the binding
    pub stages: vk::ShaderStageFlags,
}

impl ReflectedBinding {
    /// Short "set/binding type" description used in diagnostics
    pub fn slot(&self) -> String {
        format!("set {} binding {} {:?}", self.set, self.binding, self.descriptor_type)
    }
}

/// One member of a push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantEntry {
    /// Member name
    pub name: String,
    /// Byte offset inside the block
    pub offset: u32,
    /// Byte size
    pub size: u32,
    /// Stages that declare the member
    pub stages: vk::ShaderStageFlags,
}

/// Everything reflected from one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReflection {
    /// Reflected stage
    pub stage: ShaderStage,
    /// Descriptor bindings in declaration order
    pub bindings: Vec<ReflectedBinding>,
    /// Push-constant members
    pub push_constants: Vec<PushConstantEntry>,
    /// Local work-group size, compute stages only
    pub work_group_size: Option<[u32; 3]>,
}

/// Reflect a compiled binary for `stage`
pub fn reflect(words: &[u32], stage: ShaderStage) -> ReflectionResult<StageReflection> {
    let module = Module::parse(words)?;
    let entry = module
        .entry_point(stage.execution_model())
        .ok_or(ReflectionError::MissingEntryPoint(stage))?;

    let work_group_size = match stage {
        ShaderStage::Compute => module.local_size(entry.id)?,
        _ => None,
    };

    let mut reflection = StageReflection {
        stage,
        bindings: Vec::new(),
        push_constants: Vec::new(),
        work_group_size,
    };

    for variable in &module.variables {
        let pointee = match module.type_of(variable.pointer_type)? {
            Type::Pointer { pointee, .. } => *pointee,
            _ => return Err(ReflectionError::Malformed(format!("variable %{} is not a pointer", variable.id))),
        };

        match variable.storage_class {
            storage_class::PUSH_CONSTANT => {
                reflection.push_constants.extend(push_constant_members(&module, pointee, stage)?);
            }
            storage_class::UNIFORM_CONSTANT | storage_class::UNIFORM | storage_class::STORAGE_BUFFER => {
                if let Some(binding) = descriptor_binding(&module, variable.id, variable.storage_class, pointee, stage)? {
                    reflection.bindings.push(binding);
                }
            }
            _ => {}
        }
    }

    log::debug!(
        "[SHADER] Reflected {} stage: {} bindings, {} push constants, work group {:?}",
        stage,
        reflection.bindings.len(),
        reflection.push_constants.len(),
        reflection.work_group_size
    );

    Ok(reflection)
}

fn descriptor_binding(
    module: &Module,
    variable: u32,
    storage: u32,
    pointee: u32,
    stage: ShaderStage,
) -> ReflectionResult<Option<ReflectedBinding>> {
    // Peel one level of arraying; unsized arrays bind a single descriptor
    let (base, count) = match module.type_of(pointee)? {
        Type::Array { element, length } => (*element, module.constant(*length)?),
        Type::RuntimeArray { element } => (*element, 1),
        _ => (pointee, 1),
    };

    let base_decorations = module.decorations(base);
    let descriptor_type = match module.type_of(base)? {
        Type::Sampler => vk::DescriptorType::SAMPLER,
        Type::Image { dim, sampled } => image_descriptor_type(*dim, *sampled),
        Type::SampledImage { image } => match module.type_of(*image)? {
            Type::Image { dim: dim::BUFFER, .. } => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            _ => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        },
        Type::Struct { .. } if storage == storage_class::STORAGE_BUFFER || base_decorations.buffer_block => {
            vk::DescriptorType::STORAGE_BUFFER
        }
        Type::Struct { .. } if storage == storage_class::UNIFORM => vk::DescriptorType::UNIFORM_BUFFER,
        _ => return Ok(None),
    };

    let is_buffer = matches!(
        descriptor_type,
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::STORAGE_BUFFER
    );
    let name = match (is_buffer, module.name(base), module.name(variable)) {
        (true, block, _) if !block.is_empty() => block.to_string(),
        (_, _, var) if !var.is_empty() => var.to_string(),
        _ => format!("_{variable}"),
    };
    let element_size = if is_buffer { module.type_size(base)? } else { 0 };

    let decorations = module.decorations(variable);
    Ok(Some(ReflectedBinding {
        name,
        set: decorations.set.unwrap_or(0),
        binding: decorations.binding.unwrap_or(0),
        descriptor_type,
        count,
        element_size,
        stages: stage.flags(),
    }))
}

fn image_descriptor_type(image_dim: u32, sampled: u32) -> vk::DescriptorType {
    match (image_dim, sampled) {
        (dim::SUBPASS_DATA, _) => vk::DescriptorType::INPUT_ATTACHMENT,
        (dim::BUFFER, 2) => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        (dim::BUFFER, _) => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        (_, 2) => vk::DescriptorType::STORAGE_IMAGE,
        _ => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

fn push_constant_members(module: &Module, block: u32, stage: ShaderStage) -> ReflectionResult<Vec<PushConstantEntry>> {
    let Type::Struct { members } = module.type_of(block)? else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::with_capacity(members.len());
    let mut running_offset = 0;
    for index in 0..members.len() {
        let index = u32::try_from(index)
            .map_err(|_| ReflectionError::Malformed("push-constant block has too many members".to_string()))?;
        let offset = module.member_decorations(block, index).offset.unwrap_or(running_offset);
        let size = module.member_size(block, index)?;
        running_offset = offset
            .checked_add(size)
            .ok_or_else(|| ReflectionError::Malformed(format!("push-constant member {index} ends past 4 GiB")))?;

        let name = module
            .member_names
            .get(&(block, index))
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("_{index}"));
        entries.push(PushConstantEntry { name, offset, size, stages: stage.flags() });
    }
    Ok(entries)
}
