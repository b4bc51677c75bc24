//! Vulkan descriptor pools, layouts and writes

use ash::{vk, Device};

use crate::render::api::{DescriptorResource, DescriptorWrite, LayoutBinding};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Descriptor types the pool reserves space for
const POOLED_TYPES: [vk::DescriptorType; 8] = [
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
];

/// Pool sizes giving every pooled type `per_set` descriptors per set
pub fn pool_sizes(max_sets: u32, per_set: u32) -> Vec<vk::DescriptorPoolSize> {
    POOLED_TYPES
        .iter()
        .map(|&ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: max_sets.saturating_mul(per_set),
        })
        .collect()
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a new descriptor pool whose sets can be freed individually
    pub fn new(device: Device, max_sets: u32, descriptors_per_set: u32) -> VulkanResult<Self> {
        let sizes = pool_sizes(max_sets, descriptors_per_set);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self { pool, device })
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::Api)?;
        sets.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Descriptor pool returned no set".to_string(),
        })
    }

    /// Free one set
    pub fn free(&self, set: vk::DescriptorSet) -> VulkanResult<()> {
        unsafe { self.device.free_descriptor_sets(self.pool, &[set]) }
            .map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Create a descriptor-set layout from reflected bindings
pub fn create_set_layout(device: &Device, bindings: &[LayoutBinding]) -> VulkanResult<vk::DescriptorSetLayout> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding.binding)
                .descriptor_type(binding.descriptor_type)
                .descriptor_count(binding.count)
                .stage_flags(binding.stages)
                .build()
        })
        .collect();

    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);
    unsafe { device.create_descriptor_set_layout(&layout_info, None) }
        .map_err(VulkanError::Api)
}

/// Apply a single-slot descriptor write
pub fn write_descriptor(device: &Device, write: &DescriptorWrite) {
    let base = vk::WriteDescriptorSet::builder()
        .dst_set(write.set)
        .dst_binding(write.binding)
        .dst_array_element(0)
        .descriptor_type(write.descriptor_type);

    match write.resource {
        DescriptorResource::Buffer { buffer, offset, range } => {
            let infos = [vk::DescriptorBufferInfo { buffer, offset, range }];
            let vk_write = base.buffer_info(&infos).build();
            unsafe { device.update_descriptor_sets(&[vk_write], &[]) };
        }
        DescriptorResource::Image { view, layout } => {
            let infos = [vk::DescriptorImageInfo { sampler: vk::Sampler::null(), image_view: view, image_layout: layout }];
            let vk_write = base.image_info(&infos).build();
            unsafe { device.update_descriptor_sets(&[vk_write], &[]) };
        }
        DescriptorResource::CombinedImageSampler { view, layout, sampler } => {
            let infos = [vk::DescriptorImageInfo { sampler, image_view: view, image_layout: layout }];
            let vk_write = base.image_info(&infos).build();
            unsafe { device.update_descriptor_sets(&[vk_write], &[]) };
        }
        DescriptorResource::Sampler(sampler) => {
            let infos = [vk::DescriptorImageInfo { sampler, image_view: vk::ImageView::null(), image_layout: vk::ImageLayout::UNDEFINED }];
            let vk_write = base.image_info(&infos).build();
            unsafe { device.update_descriptor_sets(&[vk_write], &[]) };
        }
        DescriptorResource::TexelBuffer(view) => {
            let views = [view];
            let vk_write = base.texel_buffer_view(&views).build();
            unsafe { device.update_descriptor_sets(&[vk_write], &[]) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reserves_every_reflected_type() {
        let sizes = pool_sizes(16, 4);
        assert_eq!(sizes.len(), POOLED_TYPES.len());
        assert!(sizes.iter().all(|size| size.descriptor_count == 64));
        assert!(sizes.iter().any(|size| size.ty == vk::DescriptorType::STORAGE_TEXEL_BUFFER));
    }
}
