//! Named material properties
//!
//! A property is the resource a material feeds into one named binding. The
//! value is kept after it is written so the descriptor can be rewritten when
//! the shader is reloaded.

use ash::vk;

use crate::render::api::DescriptorResource;

/// Buffer range bound to a uniform or storage buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRange {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Byte offset
    pub offset: vk::DeviceSize,
    /// Byte range, or `vk::WHOLE_SIZE`
    pub range: vk::DeviceSize,
}

impl BufferRange {
    /// Whole buffer starting at offset 0
    pub fn whole(buffer: vk::Buffer) -> Self {
        Self { buffer, offset: 0, range: vk::WHOLE_SIZE }
    }

    /// `range` bytes at `offset`
    pub fn new(buffer: vk::Buffer, offset: vk::DeviceSize, range: vk::DeviceSize) -> Self {
        Self { buffer, offset, range }
    }
}

/// Image view bound to a texture slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    /// Image view
    pub view: vk::ImageView,
    /// Layout the image is in when sampled
    pub layout: vk::ImageLayout,
    /// Sampler, required for combined image-sampler slots
    pub sampler: Option<vk::Sampler>,
}

impl TextureBinding {
    /// Shader-read-only view without a sampler
    pub fn new(view: vk::ImageView) -> Self {
        Self { view, layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, sampler: None }
    }

    /// Pair the view with a sampler
    pub fn with_sampler(mut self, sampler: vk::Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Override the access layout
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Resource stored in a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    /// Uniform or storage buffer range
    Buffer(BufferRange),
    /// Sampled, storage or combined image
    Texture(TextureBinding),
    /// Standalone sampler
    Sampler(vk::Sampler),
    /// Texel buffer view
    TexelBuffer(vk::BufferView),
}

impl PropertyValue {
    /// Short name of the resource kind for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Texture(_) => "texture",
            Self::Sampler(_) => "sampler",
            Self::TexelBuffer(_) => "texel buffer",
        }
    }

    /// True if the value can feed a slot of `descriptor_type`
    pub fn accepts(&self, descriptor_type: vk::DescriptorType) -> bool {
        match self {
            Self::Buffer(_) => matches!(
                descriptor_type,
                vk::DescriptorType::UNIFORM_BUFFER
                    | vk::DescriptorType::STORAGE_BUFFER
                    | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                    | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
            ),
            Self::Texture(texture) => match descriptor_type {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => texture.sampler.is_some(),
                vk::DescriptorType::SAMPLED_IMAGE
                | vk::DescriptorType::STORAGE_IMAGE
                | vk::DescriptorType::INPUT_ATTACHMENT => true,
                _ => false,
            },
            Self::Sampler(_) => descriptor_type == vk::DescriptorType::SAMPLER,
            Self::TexelBuffer(_) => matches!(
                descriptor_type,
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER
            ),
        }
    }

    /// Descriptor resource for a slot of `descriptor_type`
    pub fn resource(&self, descriptor_type: vk::DescriptorType) -> Option<DescriptorResource> {
        if !self.accepts(descriptor_type) {
            return None;
        }
        Some(match *self {
            Self::Buffer(range) => DescriptorResource::Buffer { buffer: range.buffer, offset: range.offset, range: range.range },
            Self::Texture(TextureBinding { view, layout, sampler: Some(sampler) })
                if descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER =>
            {
                DescriptorResource::CombinedImageSampler { view, layout, sampler }
            }
            Self::Texture(texture) => DescriptorResource::Image { view: texture.view, layout: texture.layout },
            Self::Sampler(sampler) => DescriptorResource::Sampler(sampler),
            Self::TexelBuffer(view) => DescriptorResource::TexelBuffer(view),
        })
    }
}

/// A recorded property write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialProperty {
    /// Bound resource
    pub value: PropertyValue,
    /// Descriptor type the caller expected
    pub hint: vk::DescriptorType,
    /// Suppress the unresolved-name diagnostic
    pub silent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn combined_slot_requires_sampler() {
        let view = vk::ImageView::from_raw(7);
        let bare = PropertyValue::Texture(TextureBinding::new(view));
        assert!(!bare.accepts(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
        assert!(bare.accepts(vk::DescriptorType::SAMPLED_IMAGE));

        let sampled = PropertyValue::Texture(TextureBinding::new(view).with_sampler(vk::Sampler::from_raw(3)));
        assert!(matches!(
            sampled.resource(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            Some(DescriptorResource::CombinedImageSampler { .. })
        ));
        assert!(matches!(
            sampled.resource(vk::DescriptorType::SAMPLED_IMAGE),
            Some(DescriptorResource::Image { .. })
        ));
    }

    #[test]
    fn buffers_do_not_feed_image_slots() {
        let value = PropertyValue::Buffer(BufferRange::whole(vk::Buffer::from_raw(1)));
        assert!(value.resource(vk::DescriptorType::STORAGE_IMAGE).is_none());
        assert!(value.accepts(vk::DescriptorType::STORAGE_BUFFER));
    }
}
