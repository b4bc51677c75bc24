//! Program-wide binding table
//!
//! Merges the reflection of every stage of a program into one name-keyed
//! registry. Names are the contract between shader authors and engine code:
//! a material resolves `"Albedo"` or `"Camera"` through this table to the
//! descriptor coordinates it writes.

use std::collections::{BTreeMap, BTreeSet};

use ash::vk;

use super::reflection::{PushConstantEntry, ReflectedBinding, ReflectionError, ReflectionResult, StageReflection};
use crate::render::api::LayoutBinding;

/// Name-keyed registry of descriptor bindings and push-constant members
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderBindingTable {
    bindings: BTreeMap<String, ReflectedBinding>,
    push_constants: BTreeMap<String, PushConstantEntry>,
}

impl ShaderBindingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from stage reflections in any order
    pub fn from_stages<'a>(stages: impl IntoIterator<Item = &'a StageReflection>) -> ReflectionResult<Self> {
        let mut table = Self::new();
        for stage in stages {
            table.merge(stage)?;
        }
        Ok(table)
    }

    /// Merge one stage into the table
    ///
    /// A name already present must keep its set, binding and descriptor type;
    /// stage flags are combined and the larger element size wins. On error
    /// the table is left unchanged.
    pub fn merge(&mut self, stage: &StageReflection) -> ReflectionResult<()> {
        let mut merged = self.clone();

        for binding in &stage.bindings {
            merged.merge_binding(binding)?;
        }
        for member in &stage.push_constants {
            merged.merge_push_constant(member)?;
        }

        *self = merged;
        Ok(())
    }

    fn merge_binding(&mut self, incoming: &ReflectedBinding) -> ReflectionResult<()> {
        if let Some(existing) = self.bindings.get_mut(&incoming.name) {
            if existing.set != incoming.set
                || existing.binding != incoming.binding
                || existing.descriptor_type != incoming.descriptor_type
            {
                return Err(ReflectionError::ConflictingBinding {
                    name: incoming.name.clone(),
                    existing: existing.slot(),
                    incoming: incoming.slot(),
                });
            }
            existing.stages |= incoming.stages;
            existing.element_size = existing.element_size.max(incoming.element_size);
            existing.count = existing.count.max(incoming.count);
            return Ok(());
        }

        let clash = self.bindings.values().find(|other| {
            other.set == incoming.set
                && other.binding == incoming.binding
                && other.descriptor_type != incoming.descriptor_type
        });
        if let Some(other) = clash {
            return Err(ReflectionError::SlotConflict {
                set: incoming.set,
                binding: incoming.binding,
                first: other.name.clone(),
                second: incoming.name.clone(),
            });
        }

        self.bindings.insert(incoming.name.clone(), incoming.clone());
        Ok(())
    }

    fn merge_push_constant(&mut self, incoming: &PushConstantEntry) -> ReflectionResult<()> {
        match self.push_constants.get_mut(&incoming.name) {
            Some(existing) if existing.offset != incoming.offset || existing.size != incoming.size => {
                Err(ReflectionError::ConflictingPushConstant(incoming.name.clone()))
            }
            Some(existing) => {
                existing.stages |= incoming.stages;
                Ok(())
            }
            None => {
                self.push_constants.insert(incoming.name.clone(), incoming.clone());
                Ok(())
            }
        }
    }

    /// Look up a binding by name
    pub fn binding(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.get(name)
    }

    /// Look up a push-constant member by name
    pub fn push_constant(&self, name: &str) -> Option<&PushConstantEntry> {
        self.push_constants.get(name)
    }

    /// All bindings ordered by name
    pub fn bindings(&self) -> impl Iterator<Item = &ReflectedBinding> {
        self.bindings.values()
    }

    /// All push-constant members ordered by name
    pub fn push_constants(&self) -> impl Iterator<Item = &PushConstantEntry> {
        self.push_constants.values()
    }

    /// True when nothing was reflected
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.push_constants.is_empty()
    }

    /// Distinct descriptor-set indices, ascending
    pub fn set_indices(&self) -> BTreeSet<u32> {
        self.bindings.values().map(|binding| binding.set).collect()
    }

    /// Highest referenced set index plus one, 0 without bindings
    pub fn set_count(&self) -> u32 {
        self.set_indices().last().map_or(0, |last| last + 1)
    }

    /// Layout bindings of descriptor set `set`, ordered by binding index
    ///
    /// Names sharing a slot with the same type collapse into one binding.
    pub fn set_layout_bindings(&self, set: u32) -> Vec<LayoutBinding> {
        let mut slots: BTreeMap<u32, LayoutBinding> = BTreeMap::new();
        for binding in self.bindings.values().filter(|binding| binding.set == set) {
            slots
                .entry(binding.binding)
                .and_modify(|slot| {
                    slot.stages |= binding.stages;
                    slot.count = slot.count.max(binding.count);
                })
                .or_insert(LayoutBinding {
                    binding: binding.binding,
                    descriptor_type: binding.descriptor_type,
                    count: binding.count,
                    stages: binding.stages,
                });
        }
        slots.into_values().collect()
    }

    /// Push-constant ranges for the pipeline layout
    ///
    /// All members are covered by one range visible to every declaring stage.
    pub fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        let mut members = self.push_constants.values();
        let Some(first) = members.next() else {
            return Vec::new();
        };

        let (start, end, stages) = members.fold(
            (first.offset, first.offset + first.size, first.stages),
            |(start, end, stages), member| {
                (start.min(member.offset), end.max(member.offset + member.size), stages | member.stages)
            },
        );

        vec![vk::PushConstantRange { stage_flags: stages, offset: start, size: end - start }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::stage::ShaderStage;

    fn binding(name: &str, set: u32, slot: u32, ty: vk::DescriptorType, stage: ShaderStage) -> ReflectedBinding {
        ReflectedBinding {
            name: name.to_string(),
            set,
            binding: slot,
            descriptor_type: ty,
            count: 1,
            element_size: if ty == vk::DescriptorType::UNIFORM_BUFFER { 64 } else { 0 },
            stages: stage.flags(),
        }
    }

    fn stage(stage: ShaderStage, bindings: Vec<ReflectedBinding>) -> StageReflection {
        StageReflection { stage, bindings, push_constants: Vec::new(), work_group_size: None }
    }

    fn vertex_and_fragment() -> (StageReflection, StageReflection) {
        let vertex = stage(
            ShaderStage::Vertex,
            vec![
                binding("Camera", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex),
                binding("Object", 1, 0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex),
            ],
        );
        let fragment = stage(
            ShaderStage::Fragment,
            vec![
                binding("Camera", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Fragment),
                binding("Albedo", 2, 0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, ShaderStage::Fragment),
            ],
        );
        (vertex, fragment)
    }

    #[test]
    fn merge_is_order_independent() {
        let (vertex, fragment) = vertex_and_fragment();
        let forward = ShaderBindingTable::from_stages([&vertex, &fragment]).unwrap();
        let backward = ShaderBindingTable::from_stages([&fragment, &vertex]).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(
            forward.binding("Camera").unwrap().stages,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(forward.set_indices().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn merge_is_idempotent() {
        let (vertex, fragment) = vertex_and_fragment();
        let once = ShaderBindingTable::from_stages([&vertex, &fragment]).unwrap();
        let twice = ShaderBindingTable::from_stages([&vertex, &fragment, &vertex, &fragment]).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn same_name_different_slot_fails() {
        let (vertex, _) = vertex_and_fragment();
        let moved = stage(
            ShaderStage::Fragment,
            vec![binding("Camera", 0, 3, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Fragment)],
        );

        let mut table = ShaderBindingTable::from_stages([&vertex]).unwrap();
        let before = table.clone();
        let err = table.merge(&moved).unwrap_err();
        assert!(matches!(err, ReflectionError::ConflictingBinding { ref name, .. } if name == "Camera"));
        assert_eq!(table, before);
    }

    #[test]
    fn different_names_same_slot_different_type_fails() {
        let first = stage(
            ShaderStage::Vertex,
            vec![binding("Camera", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex)],
        );
        let second = stage(
            ShaderStage::Fragment,
            vec![binding("Albedo", 0, 0, vk::DescriptorType::SAMPLED_IMAGE, ShaderStage::Fragment)],
        );
        let err = ShaderBindingTable::from_stages([&first, &second]).unwrap_err();
        assert!(matches!(err, ReflectionError::SlotConflict { set: 0, binding: 0, .. }));
    }

    #[test]
    fn layout_bindings_follow_set() {
        let (vertex, fragment) = vertex_and_fragment();
        let table = ShaderBindingTable::from_stages([&vertex, &fragment]).unwrap();

        let set0 = table.set_layout_bindings(0);
        assert_eq!(set0.len(), 1);
        assert_eq!(set0[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(set0[0].stages, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        assert!(table.set_layout_bindings(5).is_empty());
        assert_eq!(table.set_count(), 3);
    }

    #[test]
    fn push_constants_collapse_into_one_range() {
        let mut vertex = stage(ShaderStage::Vertex, Vec::new());
        vertex.push_constants.push(PushConstantEntry {
            name: "model".to_string(),
            offset: 0,
            size: 64,
            stages: vk::ShaderStageFlags::VERTEX,
        });
        let mut fragment = stage(ShaderStage::Fragment, Vec::new());
        fragment.push_constants.push(PushConstantEntry {
            name: "tint".to_string(),
            offset: 64,
            size: 16,
            stages: vk::ShaderStageFlags::FRAGMENT,
        });

        let table = ShaderBindingTable::from_stages([&vertex, &fragment]).unwrap();
        let ranges = table.push_constant_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].size, 80);
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
    }
}
