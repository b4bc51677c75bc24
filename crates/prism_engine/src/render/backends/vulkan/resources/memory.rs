//! Device memory allocation
//!
//! Memory is allocated per resource and bound right after creation. A failed
//! bind frees the allocation; callers destroy the resource handle they created,
//! so a partially built resource never escapes.

use ash::{vk, Device};
use thiserror::Error;

use crate::render::backends::vulkan::VulkanError;

/// Errors raised while creating GPU resources
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Handle creation failed
    #[error("Failed to create {kind}: {result:?}")]
    Creation {
        /// Resource kind, e.g. "image"
        kind: &'static str,
        /// Driver result
        result: vk::Result,
    },

    /// Memory allocation failed
    #[error("Failed to allocate {size} bytes for {kind}: {result:?}")]
    Allocation {
        /// Resource kind
        kind: &'static str,
        /// Requested size in bytes
        size: vk::DeviceSize,
        /// Driver result
        result: vk::Result,
    },

    /// Binding memory to the resource failed
    #[error("Failed to bind memory to {kind}: {result:?}")]
    Binding {
        /// Resource kind
        kind: &'static str,
        /// Driver result
        result: vk::Result,
    },

    /// No memory type satisfies the request
    #[error("No memory type in filter {type_filter:#x} provides {properties:?}")]
    NoSuitableMemoryType {
        /// Allowed memory type bits
        type_filter: u32,
        /// Requested property flags
        properties: vk::MemoryPropertyFlags,
    },

    /// Mapping host-visible memory failed
    #[error("Failed to map {kind} memory: {result:?}")]
    Map {
        /// Resource kind
        kind: &'static str,
        /// Driver result
        result: vk::Result,
    },

    /// Upload does not fit the destination
    #[error("Upload of {size} bytes at offset {offset} exceeds {capacity} bytes")]
    OutOfBounds {
        /// Upload size
        size: vk::DeviceSize,
        /// Upload offset
        offset: vk::DeviceSize,
        /// Destination capacity
        capacity: vk::DeviceSize,
    },

    /// Source image could not be decoded
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad {
        /// Image path
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Command submission around the resource failed
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Result type for resource creation
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Pick the first memory type allowed by `type_filter` that has all `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> ResourceResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or(ResourceError::NoSuitableMemoryType { type_filter, properties })
}

/// Allocate memory for `requirements` and bind it with `bind`
///
/// On bind failure the allocation is freed before the error is returned.
pub fn allocate_and_bind(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    kind: &'static str,
    bind: impl FnOnce(vk::DeviceMemory) -> ash::prelude::VkResult<()>,
) -> ResourceResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.allocate_memory(&allocate_info, None) }
        .map_err(|result| ResourceError::Allocation { kind, size: requirements.size, result })?;

    if let Err(result) = bind(memory) {
        unsafe { device.free_memory(memory, None) };
        return Err(ResourceError::Binding { kind, result });
    }

    Ok(memory)
}

/// Expand a host write range to `non_coherent_atom_size` boundaries for flushing
///
/// Returns `(offset, size)`; the size becomes `vk::WHOLE_SIZE` when the aligned
/// end would pass the allocation.
pub fn aligned_flush_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let start = offset / atom * atom;
    let end = (offset + size).div_ceil(atom) * atom;
    if end >= allocation_size {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}
