//! Minimal SPIR-V module reader
//!
//! Walks the instruction stream once and keeps only what reflection needs:
//! debug names, decorations, type declarations, constants, global variables,
//! entry points and execution modes. Function bodies are skipped.

use std::collections::HashMap;

use super::reflection::ReflectionError;

/// SPIR-V magic number in native word order
pub const MAGIC: u32 = 0x0723_0203;

const HEADER_WORDS: usize = 5;

/// Opcodes read by the parser
pub mod op {
    /// OpName
    pub const NAME: u16 = 5;
    /// OpMemberName
    pub const MEMBER_NAME: u16 = 6;
    /// OpEntryPoint
    pub const ENTRY_POINT: u16 = 15;
    /// OpExecutionMode
    pub const EXECUTION_MODE: u16 = 16;
    /// OpTypeBool
    pub const TYPE_BOOL: u16 = 20;
    /// OpTypeInt
    pub const TYPE_INT: u16 = 21;
    /// OpTypeFloat
    pub const TYPE_FLOAT: u16 = 22;
    /// OpTypeVector
    pub const TYPE_VECTOR: u16 = 23;
    /// OpTypeMatrix
    pub const TYPE_MATRIX: u16 = 24;
    /// OpTypeImage
    pub const TYPE_IMAGE: u16 = 25;
    /// OpTypeSampler
    pub const TYPE_SAMPLER: u16 = 26;
    /// OpTypeSampledImage
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    /// OpTypeArray
    pub const TYPE_ARRAY: u16 = 28;
    /// OpTypeRuntimeArray
    pub const TYPE_RUNTIME_ARRAY: u16 = 29;
    /// OpTypeStruct
    pub const TYPE_STRUCT: u16 = 30;
    /// OpTypePointer
    pub const TYPE_POINTER: u16 = 32;
    /// OpConstant
    pub const CONSTANT: u16 = 43;
    /// OpConstantComposite
    pub const CONSTANT_COMPOSITE: u16 = 44;
    /// OpSpecConstant
    pub const SPEC_CONSTANT: u16 = 50;
    /// OpSpecConstantComposite
    pub const SPEC_CONSTANT_COMPOSITE: u16 = 51;
    /// OpVariable
    pub const VARIABLE: u16 = 59;
    /// OpDecorate
    pub const DECORATE: u16 = 71;
    /// OpMemberDecorate
    pub const MEMBER_DECORATE: u16 = 72;
}

/// Decorations read by the parser
pub mod decoration {
    /// Block (uniform/push-constant/storage block)
    pub const BLOCK: u32 = 2;
    /// BufferBlock (legacy storage buffer)
    pub const BUFFER_BLOCK: u32 = 3;
    /// RowMajor
    pub const ROW_MAJOR: u32 = 4;
    /// ArrayStride
    pub const ARRAY_STRIDE: u32 = 6;
    /// MatrixStride
    pub const MATRIX_STRIDE: u32 = 7;
    /// BuiltIn
    pub const BUILT_IN: u32 = 11;
    /// Binding
    pub const BINDING: u32 = 33;
    /// DescriptorSet
    pub const DESCRIPTOR_SET: u32 = 34;
    /// Offset
    pub const OFFSET: u32 = 35;
}

/// Storage classes read by the parser
pub mod storage_class {
    /// UniformConstant (images, samplers)
    pub const UNIFORM_CONSTANT: u32 = 0;
    /// Uniform (uniform buffers, legacy storage buffers)
    pub const UNIFORM: u32 = 2;
    /// PushConstant
    pub const PUSH_CONSTANT: u32 = 9;
    /// StorageBuffer
    pub const STORAGE_BUFFER: u32 = 12;
}

/// Image dimensionalities
pub mod dim {
    /// Buffer-backed image (texel buffer)
    pub const BUFFER: u32 = 5;
    /// Subpass input
    pub const SUBPASS_DATA: u32 = 6;
}

const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;
const EXECUTION_MODE_LOCAL_SIZE_ID: u32 = 38;
const BUILT_IN_WORKGROUP_SIZE: u32 = 25;

/// Deepest type nesting [`Module::type_size`] follows
pub const MAX_TYPE_DEPTH: usize = 64;

/// Declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Boolean
    Bool,
    /// Integer of `width` bits
    Int {
        /// Bit width
        width: u32,
    },
    /// Float of `width` bits
    Float {
        /// Bit width
        width: u32,
    },
    /// Vector of `count` components
    Vector {
        /// Component type id
        component: u32,
        /// Component count
        count: u32,
    },
    /// Matrix of `columns` column vectors
    Matrix {
        /// Column type id
        column: u32,
        /// Column count
        columns: u32,
    },
    /// Image
    Image {
        /// Dimensionality (see [`dim`])
        dim: u32,
        /// 1 when used with a sampler, 2 for storage access, 0 if unknown
        sampled: u32,
    },
    /// Sampler
    Sampler,
    /// Image combined with a sampler
    SampledImage {
        /// Image type id
        image: u32,
    },
    /// Fixed-length array
    Array {
        /// Element type id
        element: u32,
        /// Id of the constant holding the length
        length: u32,
    },
    /// Unsized array
    RuntimeArray {
        /// Element type id
        element: u32,
    },
    /// Structure
    Struct {
        /// Member type ids
        members: Vec<u32>,
    },
    /// Pointer
    Pointer {
        /// Storage class of the pointee
        storage_class: u32,
        /// Pointee type id
        pointee: u32,
    },
}

/// Decorations applied to one id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decorations {
    /// DescriptorSet
    pub set: Option<u32>,
    /// Binding
    pub binding: Option<u32>,
    /// Block
    pub block: bool,
    /// BufferBlock
    pub buffer_block: bool,
    /// ArrayStride
    pub array_stride: Option<u32>,
    /// BuiltIn
    pub built_in: Option<u32>,
}

/// Decorations applied to one struct member
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDecorations {
    /// Offset
    pub offset: Option<u32>,
    /// MatrixStride
    pub matrix_stride: Option<u32>,
    /// RowMajor
    pub row_major: bool,
}

/// Module-scope variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    /// Result id
    pub id: u32,
    /// Pointer type id
    pub pointer_type: u32,
    /// Storage class
    pub storage_class: u32,
}

/// Entry point declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Execution model
    pub execution_model: u32,
    /// Function id
    pub id: u32,
    /// Entry point name
    pub name: String,
}

/// Reflection-relevant contents of a SPIR-V module
#[derive(Debug, Default)]
pub struct Module {
    /// Declared types by id
    pub types: HashMap<u32, Type>,
    /// OpName strings by id
    pub names: HashMap<u32, String>,
    /// OpMemberName strings by (struct id, member index)
    pub member_names: HashMap<(u32, u32), String>,
    /// Decorations by id
    pub decorations: HashMap<u32, Decorations>,
    /// Member decorations by (struct id, member index)
    pub member_decorations: HashMap<(u32, u32), MemberDecorations>,
    /// Scalar constant values by id
    pub constants: HashMap<u32, u32>,
    /// Composite constants by id
    pub composites: HashMap<u32, Vec<u32>>,
    /// Module-scope variables in declaration order
    pub variables: Vec<Variable>,
    /// Entry points
    pub entry_points: Vec<EntryPoint>,
    local_size: HashMap<u32, [u32; 3]>,
    local_size_ids: HashMap<u32, [u32; 3]>,
}

fn decode_string(words: &[u32]) -> (String, usize) {
    let mut bytes = Vec::new();
    for (index, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return (String::from_utf8_lossy(&bytes).into_owned(), index + 1);
            }
            bytes.push(byte);
        }
    }
    (String::from_utf8_lossy(&bytes).into_owned(), words.len())
}

fn operand(operands: &[u32], index: usize, opcode: u16) -> Result<u32, ReflectionError> {
    operands.get(index).copied().ok_or_else(|| {
        ReflectionError::Malformed(format!("opcode {opcode} is missing operand {index}"))
    })
}

impl Module {
    /// Parse a module from its words
    pub fn parse(words: &[u32]) -> Result<Self, ReflectionError> {
        if words.len() < HEADER_WORDS {
            return Err(ReflectionError::Malformed(format!("{} words is shorter than the header", words.len())));
        }
        if words[0] != MAGIC {
            return Err(ReflectionError::Malformed(format!("bad magic number {:#010x}", words[0])));
        }

        let mut module = Self::default();
        let mut cursor = HEADER_WORDS;
        while cursor < words.len() {
            let word_count = (words[cursor] >> 16) as usize;
            let opcode = (words[cursor] & 0xffff) as u16;
            if word_count == 0 || cursor + word_count > words.len() {
                return Err(ReflectionError::Malformed(format!(
                    "instruction at word {cursor} has invalid length {word_count}"
                )));
            }
            module.read_instruction(opcode, &words[cursor + 1..cursor + word_count])?;
            cursor += word_count;
        }

        Ok(module)
    }

    fn read_instruction(&mut self, opcode: u16, operands: &[u32]) -> Result<(), ReflectionError> {
        let arg = |index: usize| operand(operands, index, opcode);

        match opcode {
            op::NAME => {
                let (name, _) = decode_string(operands.get(1..).unwrap_or_default());
                self.names.insert(arg(0)?, name);
            }
            op::MEMBER_NAME => {
                let (name, _) = decode_string(operands.get(2..).unwrap_or_default());
                self.member_names.insert((arg(0)?, arg(1)?), name);
            }
            op::ENTRY_POINT => {
                let (name, _) = decode_string(operands.get(2..).unwrap_or_default());
                self.entry_points.push(EntryPoint { execution_model: arg(0)?, id: arg(1)?, name });
            }
            op::EXECUTION_MODE => match arg(1)? {
                EXECUTION_MODE_LOCAL_SIZE => {
                    self.local_size.insert(arg(0)?, [arg(2)?, arg(3)?, arg(4)?]);
                }
                EXECUTION_MODE_LOCAL_SIZE_ID => {
                    self.local_size_ids.insert(arg(0)?, [arg(2)?, arg(3)?, arg(4)?]);
                }
                _ => {}
            },
            op::TYPE_BOOL => {
                self.types.insert(arg(0)?, Type::Bool);
            }
            op::TYPE_INT => {
                self.types.insert(arg(0)?, Type::Int { width: arg(1)? });
            }
            op::TYPE_FLOAT => {
                self.types.insert(arg(0)?, Type::Float { width: arg(1)? });
            }
            op::TYPE_VECTOR => {
                self.types.insert(arg(0)?, Type::Vector { component: arg(1)?, count: arg(2)? });
            }
            op::TYPE_MATRIX => {
                self.types.insert(arg(0)?, Type::Matrix { column: arg(1)?, columns: arg(2)? });
            }
            op::TYPE_IMAGE => {
                // result, sampled type, dim, depth, arrayed, ms, sampled, format
                self.types.insert(arg(0)?, Type::Image { dim: arg(2)?, sampled: arg(6)? });
            }
            op::TYPE_SAMPLER => {
                self.types.insert(arg(0)?, Type::Sampler);
            }
            op::TYPE_SAMPLED_IMAGE => {
                self.types.insert(arg(0)?, Type::SampledImage { image: arg(1)? });
            }
            op::TYPE_ARRAY => {
                self.types.insert(arg(0)?, Type::Array { element: arg(1)?, length: arg(2)? });
            }
            op::TYPE_RUNTIME_ARRAY => {
                self.types.insert(arg(0)?, Type::RuntimeArray { element: arg(1)? });
            }
            op::TYPE_STRUCT => {
                self.types.insert(arg(0)?, Type::Struct { members: operands[1..].to_vec() });
            }
            op::TYPE_POINTER => {
                self.types.insert(arg(0)?, Type::Pointer { storage_class: arg(1)?, pointee: arg(2)? });
            }
            op::CONSTANT | op::SPEC_CONSTANT => {
                // Only the low word matters for sizes and counts
                self.constants.insert(arg(1)?, arg(2)?);
            }
            op::CONSTANT_COMPOSITE | op::SPEC_CONSTANT_COMPOSITE => {
                self.composites.insert(arg(1)?, operands[2..].to_vec());
            }
            op::VARIABLE => {
                self.variables.push(Variable { pointer_type: arg(0)?, id: arg(1)?, storage_class: arg(2)? });
            }
            op::DECORATE => {
                let target = arg(0)?;
                let entry = self.decorations.entry(target).or_default();
                match arg(1)? {
                    decoration::DESCRIPTOR_SET => entry.set = Some(arg(2)?),
                    decoration::BINDING => entry.binding = Some(arg(2)?),
                    decoration::BLOCK => entry.block = true,
                    decoration::BUFFER_BLOCK => entry.buffer_block = true,
                    decoration::ARRAY_STRIDE => entry.array_stride = Some(arg(2)?),
                    decoration::BUILT_IN => entry.built_in = Some(arg(2)?),
                    _ => {}
                }
            }
            op::MEMBER_DECORATE => {
                let key = (arg(0)?, arg(1)?);
                let entry = self.member_decorations.entry(key).or_default();
                match arg(2)? {
                    decoration::OFFSET => entry.offset = Some(arg(3)?),
                    decoration::MATRIX_STRIDE => entry.matrix_stride = Some(arg(3)?),
                    decoration::ROW_MAJOR => entry.row_major = true,
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Type declared with `id`
    pub fn type_of(&self, id: u32) -> Result<&Type, ReflectionError> {
        self.types
            .get(&id)
            .ok_or_else(|| ReflectionError::Malformed(format!("reference to undeclared type %{id}")))
    }

    /// Value of the scalar constant `id`
    pub fn constant(&self, id: u32) -> Result<u32, ReflectionError> {
        self.constants
            .get(&id)
            .copied()
            .ok_or_else(|| ReflectionError::Malformed(format!("reference to unknown constant %{id}")))
    }

    /// Debug name of `id`, empty when absent
    pub fn name(&self, id: u32) -> &str {
        self.names.get(&id).map_or("", String::as_str)
    }

    /// Decorations of `id`
    pub fn decorations(&self, id: u32) -> Decorations {
        self.decorations.get(&id).cloned().unwrap_or_default()
    }

    /// Decorations of member `index` of struct `id`
    pub fn member_decorations(&self, id: u32, index: u32) -> MemberDecorations {
        self.member_decorations.get(&(id, index)).cloned().unwrap_or_default()
    }

    /// Entry point with `execution_model`
    pub fn entry_point(&self, execution_model: u32) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|entry| entry.execution_model == execution_model)
    }

    /// Local work-group size of the entry point `entry`
    ///
    /// A constant decorated `BuiltIn WorkgroupSize` overrides the execution mode.
    pub fn local_size(&self, entry: u32) -> Result<Option<[u32; 3]>, ReflectionError> {
        let builtin = self.composites.iter().find(|(id, _)| {
            self.decorations.get(id).and_then(|d| d.built_in) == Some(BUILT_IN_WORKGROUP_SIZE)
        });
        if let Some((_, components)) = builtin {
            return self.constant_triplet(components).map(Some);
        }

        if let Some(size) = self.local_size.get(&entry) {
            return Ok(Some(*size));
        }
        match self.local_size_ids.get(&entry) {
            Some(ids) => self.constant_triplet(ids).map(Some),
            None => Ok(None),
        }
    }

    fn constant_triplet(&self, ids: &[u32]) -> Result<[u32; 3], ReflectionError> {
        match ids {
            [x, y, z] => Ok([self.constant(*x)?, self.constant(*y)?, self.constant(*z)?]),
            _ => Err(ReflectionError::Malformed(format!("work-group size has {} components", ids.len()))),
        }
    }

    /// Declared size in bytes of type `id`
    ///
    /// Structs report the offset of their last member plus that member's size;
    /// runtime arrays contribute nothing. Sizes that overflow `u32` and type
    /// chains nested deeper than [`MAX_TYPE_DEPTH`] are malformed.
    pub fn type_size(&self, id: u32) -> Result<u32, ReflectionError> {
        self.sized(id, 0)
    }

    /// Size in bytes of member `index` of struct `id`, honouring matrix strides
    pub fn member_size(&self, id: u32, index: u32) -> Result<u32, ReflectionError> {
        self.member_sized(id, index, 0)
    }

    fn sized(&self, id: u32, depth: usize) -> Result<u32, ReflectionError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(ReflectionError::Malformed(format!("type %{id} nests deeper than {MAX_TYPE_DEPTH} levels")));
        }
        let depth = depth + 1;
        Ok(match self.type_of(id)? {
            Type::Bool => 4,
            Type::Int { width } | Type::Float { width } => width / 8,
            Type::Vector { component, count } => checked_mul(id, *count, self.sized(*component, depth)?)?,
            Type::Matrix { column, columns } => checked_mul(id, *columns, self.sized(*column, depth)?)?,
            Type::Array { element, length } => {
                let stride = match self.decorations(id).array_stride {
                    Some(stride) => stride,
                    None => self.sized(*element, depth)?,
                };
                checked_mul(id, self.constant(*length)?, stride)?
            }
            Type::Struct { members } => match members.len().checked_sub(1) {
                None => 0,
                Some(last) => {
                    let last = u32::try_from(last)
                        .map_err(|_| ReflectionError::Malformed("struct has too many members".to_string()))?;
                    let offset = match self.member_decorations(id, last).offset {
                        Some(offset) => offset,
                        None => {
                            let mut offset = 0;
                            for index in 0..last {
                                offset = checked_add(id, offset, self.member_sized(id, index, depth)?)?;
                            }
                            offset
                        }
                    };
                    checked_add(id, offset, self.member_sized(id, last, depth)?)?
                }
            },
            Type::RuntimeArray { .. }
            | Type::Image { .. }
            | Type::Sampler
            | Type::SampledImage { .. }
            | Type::Pointer { .. } => 0,
        })
    }

    fn member_sized(&self, id: u32, index: u32, depth: usize) -> Result<u32, ReflectionError> {
        let Type::Struct { members } = self.type_of(id)? else {
            return Err(ReflectionError::Malformed(format!("%{id} is not a struct")));
        };
        let member = *members
            .get(index as usize)
            .ok_or_else(|| ReflectionError::Malformed(format!("struct %{id} has no member {index}")))?;

        let decorations = self.member_decorations(id, index);
        if let (Type::Matrix { column, columns }, Some(stride)) = (self.type_of(member)?, decorations.matrix_stride) {
            let vectors = if decorations.row_major {
                match self.type_of(*column)? {
                    Type::Vector { count, .. } => *count,
                    _ => *columns,
                }
            } else {
                *columns
            };
            return checked_mul(member, vectors, stride);
        }

        self.sized(member, depth)
    }
}

fn checked_mul(id: u32, a: u32, b: u32) -> Result<u32, ReflectionError> {
    a.checked_mul(b).ok_or_else(|| ReflectionError::Malformed(format!("size of %{id} overflows")))
}

fn checked_add(id: u32, a: u32, b: u32) -> Result<u32, ReflectionError> {
    a.checked_add(b).ok_or_else(|| ReflectionError::Malformed(format!("size of %{id} overflows")))
}
