//! Rotator component

use crate::foundation::math::Vec3;
use crate::scene::component::{Behavior, ComponentKind, UpdateContext};

/// Spins its owner's transform at a constant angular velocity
#[derive(Debug, Clone, PartialEq)]
pub struct Rotator {
    /// Euler rates in radians per second (roll, pitch, yaw)
    pub angular_velocity: Vec3,
}

impl Rotator {
    /// Rotator with the given euler rates
    pub fn new(angular_velocity: Vec3) -> Self {
        Self { angular_velocity }
    }

    /// Spin around the Y axis
    pub fn around_y(radians_per_second: f32) -> Self {
        Self::new(Vec3::new(0.0, radians_per_second, 0.0))
    }
}

impl Behavior for Rotator {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Rotator
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let step = self.angular_velocity * ctx.delta_time;
        if let Err(err) = ctx.transforms.rotate(ctx.transform, step) {
            log::warn!("[HIERARCHY] Rotator update skipped: {err}");
        }
    }
}
