//! Hierarchical transforms
//!
//! Transforms live in an arena owned by the hierarchy and refer to each other
//! by [`TransformId`]. Each node stores only its local position, rotation and
//! scale; world-space values are recomputed from the parent chain on read, so
//! moving a parent never leaves a child with stale data.
//!
//! Conventions: right-handed, Y up, forward is -Z.

use crate::foundation::collections::{SlotMap, TransformId};
use crate::foundation::math::{compose_trs, Mat4, Point3, Quat, Vec3};

use super::{SceneError, SceneResult};

/// Local transform of one node
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position relative to the parent
    pub position: Vec3,
    /// Rotation relative to the parent
    pub rotation: Quat,
    /// Scale relative to the parent
    pub scale: Vec3,
    parent: Option<TransformId>,
    children: Vec<TransformId>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
        }
    }
}

impl Transform {
    /// Parent node, `None` at the root
    pub fn parent(&self) -> Option<TransformId> {
        self.parent
    }

    /// Children in attach order
    pub fn children(&self) -> &[TransformId] {
        &self.children
    }

    /// Local matrix (T * R * S)
    pub fn local_matrix(&self) -> Mat4 {
        compose_trs(&self.position, &self.rotation, &self.scale)
    }
}

/// Arena of transform nodes
#[derive(Debug, Default)]
pub struct Transforms {
    nodes: SlotMap<TransformId, Transform>,
}

impl Transforms {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an identity transform at the root
    pub fn create(&mut self) -> TransformId {
        self.nodes.insert(Transform::default())
    }

    /// Create a root transform with the given local values
    pub fn create_with(&mut self, position: Vec3, rotation: Quat, scale: Vec3) -> TransformId {
        self.nodes.insert(Transform { position, rotation, scale, ..Transform::default() })
    }

    /// Remove a node; its children move to the root keeping their local values
    pub fn remove(&mut self, id: TransformId) -> Option<Transform> {
        let node = self.nodes.remove(id)?;
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(*child) {
                child.parent = None;
            }
        }
        Some(node)
    }

    /// Node by id
    pub fn get(&self, id: TransformId) -> Option<&Transform> {
        self.nodes.get(id)
    }

    /// True if the id refers to a live node
    pub fn contains(&self, id: TransformId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: TransformId) -> SceneResult<&Transform> {
        self.nodes.get(id).ok_or(SceneError::UnknownTransform)
    }

    fn node_mut(&mut self, id: TransformId) -> SceneResult<&mut Transform> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownTransform)
    }

    // Local mutation

    /// Set the local position
    pub fn set_position(&mut self, id: TransformId, position: Vec3) -> SceneResult<()> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    /// Set the local rotation
    pub fn set_rotation(&mut self, id: TransformId, rotation: Quat) -> SceneResult<()> {
        self.node_mut(id)?.rotation = rotation;
        Ok(())
    }

    /// Set the local scale
    pub fn set_scale(&mut self, id: TransformId, scale: Vec3) -> SceneResult<()> {
        self.node_mut(id)?.scale = scale;
        Ok(())
    }

    /// Move by `delta` in parent space
    pub fn translate(&mut self, id: TransformId, delta: Vec3) -> SceneResult<()> {
        self.node_mut(id)?.position += delta;
        Ok(())
    }

    /// Rotate by Euler angles (radians) about the node's local axes
    pub fn rotate(&mut self, id: TransformId, euler: Vec3) -> SceneResult<()> {
        let node = self.node_mut(id)?;
        node.rotation *= Quat::from_euler_angles(euler.x, euler.y, euler.z);
        Ok(())
    }

    /// Orbit around `point` (parent space) by `angle` radians about `axis`
    pub fn rotate_around(&mut self, id: TransformId, point: Vec3, axis: Vec3, angle: f32) -> SceneResult<()> {
        let Some(axis) = nalgebra::Unit::try_new(axis, f32::EPSILON) else {
            return Ok(());
        };
        let turn = Quat::from_axis_angle(&axis, angle);
        let node = self.node_mut(id)?;
        node.position = point + turn * (node.position - point);
        node.rotation = turn * node.rotation;
        Ok(())
    }

    /// Turn so that forward points at `target` (world space)
    ///
    /// A target at the node's own position, or parallel to `up`, leaves the
    /// rotation unchanged.
    pub fn look_at(&mut self, id: TransformId, target: Vec3, up: Vec3) -> SceneResult<()> {
        let direction = target - self.world_position(id)?;
        if direction.norm_squared() <= f32::EPSILON || direction.cross(&up).norm_squared() <= f32::EPSILON {
            return Ok(());
        }

        // face_towards aligns +Z with its argument; forward is -Z
        let world = Quat::face_towards(&-direction, &up);
        let parent_rotation = match self.node(id)?.parent {
            Some(parent) => self.world_rotation(parent)?,
            None => Quat::identity(),
        };
        self.node_mut(id)?.rotation = parent_rotation.inverse() * world;
        Ok(())
    }

    // Hierarchy

    /// Attach `id` under `parent`, or move it to the root with `None`
    ///
    /// Local values are kept. Parenting a node under itself or one of its
    /// descendants fails with [`SceneError::TransformCycle`].
    pub fn set_parent(&mut self, id: TransformId, parent: Option<TransformId>) -> SceneResult<()> {
        self.node(id)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            if parent == id || self.is_child_of(parent, id) {
                return Err(SceneError::TransformCycle);
            }
        }

        if let Some(old) = self.node(id)?.parent {
            if let Some(old) = self.nodes.get_mut(old) {
                old.children.retain(|child| *child != id);
            }
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(id);
        }
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    /// Children of `id`
    pub fn children(&self, id: TransformId) -> impl Iterator<Item = TransformId> + '_ {
        self.nodes.get(id).into_iter().flat_map(|node| node.children.iter().copied())
    }

    /// Topmost ancestor of `id` (itself when at the root)
    pub fn root(&self, id: TransformId) -> SceneResult<TransformId> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// True if `ancestor` appears anywhere in the parent chain of `id`
    pub fn is_child_of(&self, id: TransformId, ancestor: TransformId) -> bool {
        let mut current = self.nodes.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(parent).and_then(|node| node.parent);
        }
        false
    }

    // World space

    /// Local-to-world matrix
    pub fn world_matrix(&self, id: TransformId) -> SceneResult<Mat4> {
        let node = self.node(id)?;
        let local = node.local_matrix();
        match node.parent {
            Some(parent) => Ok(self.world_matrix(parent)? * local),
            None => Ok(local),
        }
    }

    /// World-space position
    pub fn world_position(&self, id: TransformId) -> SceneResult<Vec3> {
        let node = self.node(id)?;
        match node.parent {
            Some(parent) => Ok(self.world_matrix(parent)?.transform_point(&Point3::from(node.position)).coords),
            None => Ok(node.position),
        }
    }

    /// World-space rotation
    pub fn world_rotation(&self, id: TransformId) -> SceneResult<Quat> {
        let node = self.node(id)?;
        match node.parent {
            Some(parent) => Ok(self.world_rotation(parent)? * node.rotation),
            None => Ok(node.rotation),
        }
    }

    /// World-space forward (-Z)
    pub fn forward(&self, id: TransformId) -> SceneResult<Vec3> {
        Ok(self.world_rotation(id)? * -Vec3::z())
    }

    /// World-space up (+Y)
    pub fn up(&self, id: TransformId) -> SceneResult<Vec3> {
        Ok(self.world_rotation(id)? * Vec3::y())
    }

    /// World-space right (+X)
    pub fn right(&self, id: TransformId) -> SceneResult<Vec3> {
        Ok(self.world_rotation(id)? * Vec3::x())
    }

    /// Map a local point to world space
    pub fn transform_point(&self, id: TransformId, point: Vec3) -> SceneResult<Vec3> {
        Ok(self.world_matrix(id)?.transform_point(&Point3::from(point)).coords)
    }

    /// Map a local direction to world space, ignoring translation and scale
    pub fn transform_direction(&self, id: TransformId, direction: Vec3) -> SceneResult<Vec3> {
        Ok(self.world_rotation(id)? * direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use approx::assert_relative_eq;

    #[test]
    fn child_world_position_follows_parent() {
        let mut transforms = Transforms::new();
        let parent = transforms.create_with(Vec3::new(10.0, 0.0, 0.0), Quat::identity(), Vec3::new(2.0, 2.0, 2.0));
        let child = transforms.create_with(Vec3::new(1.0, 0.0, 0.0), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        transforms.set_parent(child, Some(parent)).unwrap();

        assert_relative_eq!(transforms.world_position(child).unwrap(), Vec3::new(12.0, 0.0, 0.0));

        transforms.translate(parent, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert_relative_eq!(transforms.world_position(child).unwrap(), Vec3::new(12.0, 5.0, 0.0));
    }

    #[test]
    fn basis_tracks_parent_rotation() {
        let mut transforms = Transforms::new();
        let parent = transforms.create();
        let child = transforms.create();
        transforms.set_parent(child, Some(parent)).unwrap();

        assert_relative_eq!(transforms.forward(child).unwrap(), Vec3::new(0.0, 0.0, -1.0));
        transforms.rotate(parent, Vec3::new(0.0, PI / 2.0, 0.0)).unwrap();
        assert_relative_eq!(transforms.forward(child).unwrap(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(transforms.up(child).unwrap(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(transforms.right(child).unwrap(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let mut transforms = Transforms::new();
        let eye = transforms.create_with(Vec3::new(0.0, 0.0, 5.0), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        transforms.look_at(eye, Vec3::new(5.0, 0.0, 5.0), Vec3::y()).unwrap();
        assert_relative_eq!(transforms.forward(eye).unwrap(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn look_at_compensates_parent_rotation() {
        let mut transforms = Transforms::new();
        let parent = transforms.create_with(Vec3::zeros(), Quat::from_euler_angles(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let eye = transforms.create();
        transforms.set_parent(eye, Some(parent)).unwrap();

        transforms.look_at(eye, Vec3::new(0.0, 0.0, -10.0), Vec3::y()).unwrap();
        assert_relative_eq!(transforms.forward(eye).unwrap(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn rotate_around_orbits_point() {
        let mut transforms = Transforms::new();
        let node = transforms.create_with(Vec3::new(2.0, 0.0, 0.0), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        transforms.rotate_around(node, Vec3::new(1.0, 0.0, 0.0), Vec3::y(), PI).unwrap();
        assert_relative_eq!(transforms.world_position(node).unwrap(), Vec3::new(0.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn parenting_rejects_cycles() {
        let mut transforms = Transforms::new();
        let a = transforms.create();
        let b = transforms.create();
        let c = transforms.create();
        transforms.set_parent(b, Some(a)).unwrap();
        transforms.set_parent(c, Some(b)).unwrap();

        assert!(matches!(transforms.set_parent(a, Some(c)), Err(SceneError::TransformCycle)));
        assert!(matches!(transforms.set_parent(a, Some(a)), Err(SceneError::TransformCycle)));
        assert!(transforms.is_child_of(c, a));
        assert_eq!(transforms.root(c).unwrap(), a);
    }

    #[test]
    fn reparenting_moves_child_between_lists() {
        let mut transforms = Transforms::new();
        let a = transforms.create();
        let b = transforms.create();
        let child = transforms.create();
        transforms.set_parent(child, Some(a)).unwrap();
        transforms.set_parent(child, Some(b)).unwrap();

        assert_eq!(transforms.children(a).count(), 0);
        assert_eq!(transforms.children(b).collect::<Vec<_>>(), vec![child]);
    }

    #[test]
    fn removing_a_parent_releases_children() {
        let mut transforms = Transforms::new();
        let parent = transforms.create_with(Vec3::new(3.0, 0.0, 0.0), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        let child = transforms.create_with(Vec3::new(1.0, 0.0, 0.0), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        transforms.set_parent(child, Some(parent)).unwrap();

        transforms.remove(parent).unwrap();
        assert_eq!(transforms.get(child).unwrap().parent(), None);
        assert_relative_eq!(transforms.world_position(child).unwrap(), Vec3::new(1.0, 0.0, 0.0));
        assert!(!transforms.contains(parent));
    }

    #[test]
    fn transform_point_applies_full_chain() {
        let mut transforms = Transforms::new();
        let node = transforms.create_with(
            Vec3::new(0.0, 1.0, 0.0),
            Quat::from_euler_angles(0.0, 0.0, PI / 2.0),
            Vec3::new(2.0, 2.0, 2.0),
        );
        assert_relative_eq!(transforms.transform_point(node, Vec3::x()).unwrap(), Vec3::new(0.0, 3.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(transforms.transform_direction(node, Vec3::x()).unwrap(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }
}
