//! Sampler presets
//!
//! The engine shares a small fixed set of samplers; they are created once per
//! device and handed out by preset.

use ash::{vk, Device};

use super::memory::{ResourceError, ResourceResult};

/// Named sampler configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerPreset {
    /// Linear filtering and mips, clamp to edge
    TrilinearClamp,
    /// Linear filtering and mips, repeat
    TrilinearRepeat,
    /// Point filtering, clamp to edge
    NearestClamp,
    /// Point filtering, repeat
    NearestRepeat,
    /// Trilinear with 16x anisotropy, repeat
    Anisotropic,
    /// Depth comparison for shadow lookups
    DepthCompare,
}

impl SamplerPreset {
    /// Every preset, in creation order
    pub const ALL: [Self; 6] = [
        Self::TrilinearClamp,
        Self::TrilinearRepeat,
        Self::NearestClamp,
        Self::NearestRepeat,
        Self::Anisotropic,
        Self::DepthCompare,
    ];

    /// Create info for this preset
    ///
    /// Anisotropy is only requested when the device supports it.
    pub fn create_info(self, anisotropy_supported: bool) -> vk::SamplerCreateInfo {
        let (filter, mipmap_mode) = match self {
            Self::NearestClamp | Self::NearestRepeat => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
            _ => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        };
        let address_mode = match self {
            Self::TrilinearRepeat | Self::NearestRepeat | Self::Anisotropic => vk::SamplerAddressMode::REPEAT,
            _ => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        };
        let anisotropic = self == Self::Anisotropic && anisotropy_supported;
        let compare = self == Self::DepthCompare;

        vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropic)
            .max_anisotropy(if anisotropic { 16.0 } else { 1.0 })
            .compare_enable(compare)
            .compare_op(if compare { vk::CompareOp::LESS_OR_EQUAL } else { vk::CompareOp::ALWAYS })
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .build()
    }
}

/// Device-wide set of preset samplers
pub struct StandardSamplers {
    device: Device,
    samplers: Vec<(SamplerPreset, vk::Sampler)>,
}

impl StandardSamplers {
    /// Create every preset
    pub fn new(device: Device, anisotropy_supported: bool) -> ResourceResult<Self> {
        let mut standard = Self { device, samplers: Vec::with_capacity(SamplerPreset::ALL.len()) };

        for preset in SamplerPreset::ALL {
            let info = preset.create_info(anisotropy_supported);
            // Already-created samplers are released by Drop on early return
            let sampler = unsafe { standard.device.create_sampler(&info, None) }
                .map_err(|result| ResourceError::Creation { kind: "sampler", result })?;
            standard.samplers.push((preset, sampler));
        }

        Ok(standard)
    }

    /// Sampler handle for `preset`
    pub fn get(&self, preset: SamplerPreset) -> vk::Sampler {
        self.samplers
            .iter()
            .find(|(candidate, _)| *candidate == preset)
            .map_or_else(vk::Sampler::null, |(_, sampler)| *sampler)
    }
}

impl Drop for StandardSamplers {
    fn drop(&mut self) {
        unsafe {
            for (_, sampler) in self.samplers.drain(..) {
                self.device.destroy_sampler(sampler, None);
            }
        }
    }
}
