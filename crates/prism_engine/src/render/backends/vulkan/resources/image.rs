//! Vulkan images, views and layout transitions
//!
//! An [`Image`] tracks the layout its subresources are in. Every transition is
//! explicit: it is recorded into a caller-provided command buffer, or into a
//! single-use buffer that is submitted and waited on before returning.

use std::path::Path;

use ash::{vk, Device};

use super::buffer::Buffer;
use super::memory::{allocate_and_bind, ResourceError, ResourceResult};
use crate::render::api::DescriptorResource;
use crate::render::backends::vulkan::{CommandPool, VulkanContext};

/// Number of mip levels for a full chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Access and stage masks for one side of a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutUsage {
    /// Memory accesses performed in the layout
    pub access: vk::AccessFlags,
    /// Pipeline stages performing them
    pub stage: vk::PipelineStageFlags,
}

/// How an image in `layout` is accessed
pub fn layout_usage(layout: vk::ImageLayout) -> LayoutUsage {
    let (access, stage) = match layout {
        vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        vk::ImageLayout::PREINITIALIZED => (vk::AccessFlags::HOST_WRITE, vk::PipelineStageFlags::HOST),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        vk::ImageLayout::GENERAL => (
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        _ => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    };
    LayoutUsage { access, stage }
}

/// Source and destination masks for a transition between two layouts
pub fn transition_masks(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> (LayoutUsage, LayoutUsage) {
    (layout_usage(old_layout), layout_usage(new_layout))
}

/// One step of mip-chain generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    /// Move one level between layouts
    Transition {
        /// Mip level
        level: u32,
        /// Current layout
        old_layout: vk::ImageLayout,
        /// Target layout
        new_layout: vk::ImageLayout,
    },
    /// Downsample `level - 1` into `level`
    Blit {
        /// Destination level
        level: u32,
        /// Source width and height
        src_extent: [i32; 2],
        /// Destination width and height
        dst_extent: [i32; 2],
    },
}

/// Plan mip generation for an image whose levels all start in `TRANSFER_DST_OPTIMAL`
///
/// Each source level moves to `TRANSFER_SRC_OPTIMAL`, is blitted into the next
/// level, then becomes shader-readable. The last level goes straight from
/// transfer destination to shader read.
pub fn mip_chain(width: u32, height: u32, levels: u32) -> Vec<MipStep> {
    let clamp = |value: u32| i32::try_from(value).unwrap_or(i32::MAX).max(1);
    let mut steps = Vec::new();
    let mut extent = [clamp(width), clamp(height)];

    for level in 1..levels {
        let next = [(extent[0] / 2).max(1), (extent[1] / 2).max(1)];
        steps.push(MipStep::Transition {
            level: level - 1,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        });
        steps.push(MipStep::Blit { level, src_extent: extent, dst_extent: next });
        steps.push(MipStep::Transition {
            level: level - 1,
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
        extent = next;
    }

    steps.push(MipStep::Transition {
        level: levels.saturating_sub(1),
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    });
    steps
}

/// Image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Size in texels; depth above 1 creates a 3D image
    pub extent: vk::Extent3D,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Mip level count
    pub mip_levels: u32,
    /// Array layer count
    pub array_layers: u32,
    /// Aspect of the default view
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Sampled 2D texture, optionally with a full mip chain
    pub fn texture_2d(width: u32, height: u32, format: vk::Format, mipmapped: bool) -> Self {
        let mip_levels = if mipmapped { mip_level_count(width, height) } else { 1 };
        let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        Self {
            extent: vk::Extent3D { width, height, depth: 1 },
            format,
            usage,
            mip_levels,
            array_layers: 1,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Storage image read and written by compute shaders
    pub fn storage(width: u32, height: u32, depth: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent3D { width, height, depth },
            format,
            usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            mip_levels: 1,
            array_layers: 1,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Depth attachment
    pub fn depth(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent3D { width, height, depth: 1 },
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            mip_levels: 1,
            array_layers: 1,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Use `layers` array layers
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers.max(1);
        self
    }

    /// Image dimensionality
    pub fn image_type(&self) -> vk::ImageType {
        if self.extent.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        }
    }

    /// View dimensionality of the default view
    pub fn view_type(&self) -> vk::ImageViewType {
        if self.extent.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if self.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }

    fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

/// Image with dedicated memory, a default view and a tracked layout
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
    layout: vk::ImageLayout,
}

impl Image {
    /// Create an image, bind device-local memory and create its default view
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> ResourceResult<Self> {
        let device = context.device().clone();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(desc.image_type())
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None) }
            .map_err(|result| ResourceError::Creation { kind: "image", result })?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match allocate_and_bind(
            &device,
            &context.physical_device().memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            "image",
            |memory| unsafe { device.bind_image_memory(image, memory, 0) },
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                log::error!("[RESOURCE] Image {:?} rolled back: {}", desc.extent, e);
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(desc.view_type())
            .format(desc.format)
            .subresource_range(desc.full_range());

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(result) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(ResourceError::Creation { kind: "image view", result });
            }
        };

        log::debug!(
            "[RESOURCE] Created {:?} image {}x{}x{} ({} mips, {} layers)",
            desc.format, desc.extent.width, desc.extent.height, desc.extent.depth,
            desc.mip_levels, desc.array_layers,
        );

        Ok(Self {
            device,
            image,
            memory,
            view,
            desc,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Decode an image file into an RGBA8 texture with a full mip chain
    pub fn from_file(context: &VulkanContext, pool: &CommandPool, path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|e| ResourceError::ImageLoad { path: path.display().to_string(), reason: e.to_string() })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        log::debug!("[RESOURCE] Loaded {} ({}x{})", path.display(), width, height);

        Self::from_rgba8(context, pool, width, height, decoded.as_raw(), true)
    }

    /// Create a sampled texture from tightly packed RGBA8 pixels
    pub fn from_rgba8(
        context: &VulkanContext,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        mipmapped: bool,
    ) -> ResourceResult<Self> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if pixels.len() as u64 != expected {
            return Err(ResourceError::OutOfBounds { size: pixels.len() as u64, offset: 0, capacity: expected });
        }

        let mut texture = Self::new(context, ImageDesc::texture_2d(width, height, vk::Format::R8G8B8A8_UNORM, mipmapped))?;
        texture.upload(context, pool, pixels)?;
        Ok(texture)
    }

    /// Upload texel data through a staging buffer
    ///
    /// Leaves every level in `SHADER_READ_ONLY_OPTIMAL`, generating mips from
    /// level 0 when the image has more than one level.
    pub fn upload(&mut self, context: &VulkanContext, pool: &CommandPool, texels: &[u8]) -> ResourceResult<()> {
        let staging = Buffer::with_data(context, texels, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let desc = self.desc;
        let image = self.image;
        let old_layout = self.layout;

        pool.submit_single(|device, command_buffer| {
            record_barrier(device, command_buffer, image, desc.full_range(), old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: desc.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: desc.array_layers,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(desc.extent);

            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region.build()],
                );
            }

            record_mip_chain(device, command_buffer, image, &desc);
        })?;

        self.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        Ok(())
    }

    /// Transition every subresource to `new_layout`
    ///
    /// Records into `ambient` when given; otherwise submits a single-use command
    /// buffer and blocks until the queue is idle.
    pub fn change_layout(
        &mut self,
        pool: &CommandPool,
        ambient: Option<vk::CommandBuffer>,
        new_layout: vk::ImageLayout,
    ) -> ResourceResult<()> {
        if new_layout == self.layout {
            return Ok(());
        }

        let range = self.desc.full_range();
        match ambient {
            Some(command_buffer) => {
                record_barrier(&self.device, command_buffer, self.image, range, self.layout, new_layout);
            }
            None => {
                let (image, old_layout) = (self.image, self.layout);
                pool.submit_single(|device, command_buffer| {
                    record_barrier(device, command_buffer, image, range, old_layout, new_layout);
                })?;
            }
        }

        self.layout = new_layout;
        Ok(())
    }

    /// Descriptor for sampled or storage access in the current layout
    pub fn descriptor(&self) -> DescriptorResource {
        DescriptorResource::Image { view: self.view, layout: self.layout }
    }

    /// Combined image-sampler descriptor
    pub fn sampled_with(&self, sampler: vk::Sampler) -> DescriptorResource {
        DescriptorResource::CombinedImageSampler { view: self.view, layout: self.layout, sampler }
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Default view
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Current layout
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Creation parameters
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn record_barrier(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src, dst) = transition_masks(old_layout, new_layout);
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src.access)
        .dst_access_mask(dst.access);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src.stage,
            dst.stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

fn record_mip_chain(device: &Device, command_buffer: vk::CommandBuffer, image: vk::Image, desc: &ImageDesc) {
    let level_range = |level: u32| vk::ImageSubresourceRange {
        aspect_mask: desc.aspect,
        base_mip_level: level,
        level_count: 1,
        base_array_layer: 0,
        layer_count: desc.array_layers,
    };
    let level_layers = |level: u32| vk::ImageSubresourceLayers {
        aspect_mask: desc.aspect,
        mip_level: level,
        base_array_layer: 0,
        layer_count: desc.array_layers,
    };

    for step in mip_chain(desc.extent.width, desc.extent.height, desc.mip_levels) {
        match step {
            MipStep::Transition { level, old_layout, new_layout } => {
                record_barrier(device, command_buffer, image, level_range(level), old_layout, new_layout);
            }
            MipStep::Blit { level, src_extent, dst_extent } => {
                let blit = vk::ImageBlit::builder()
                    .src_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: src_extent[0], y: src_extent[1], z: 1 },
                    ])
                    .src_subresource(level_layers(level - 1))
                    .dst_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: dst_extent[0], y: dst_extent[1], z: 1 },
                    ])
                    .dst_subresource(level_layers(level));

                unsafe {
                    device.cmd_blit_image(
                        command_buffer,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit.build()],
                        vk::Filter::LINEAR,
                    );
                }
            }
        }
    }
}
