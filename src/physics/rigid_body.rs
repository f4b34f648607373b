//! 刚体
//!
//! 只保存质量；速度和角速度存放在场景节点上，
//! 这样没有刚体的节点也可以以恒定速度运动。

use glam::{Mat3, Quat, Vec3};

use super::engine::PhysicsEngine;
use crate::{PhysicsError, Result};

/// 主惯量低于此值的轴不参与旋转
pub const INERTIA_EPSILON: f32 = 1e-7;

/// 刚体质量属性
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidBody {
    mass: f32,
}

impl RigidBody {
    /// 质量必须为有限正数
    pub fn new(mass: f32) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidMass(mass));
        }
        Ok(Self { mass })
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        1.0 / self.mass
    }

    /// 恒定加速度与恒定力在 dt 内产生的速度变化
    ///
    /// Δv = Σa·dt + ΣF/m·dt
    pub fn delta_velocity(&self, engine: &PhysicsEngine, dt: f32) -> Vec3 {
        let from_accelerations: Vec3 = engine.accelerations.iter().map(|a| *a * dt).sum();
        let from_forces: Vec3 = engine.forces.iter().map(|f| *f / self.mass * dt).sum();
        from_accelerations + from_forces
    }

    /// 恒定角加速度在 dt 内产生的角速度变化
    pub fn delta_angular_velocity(&self, engine: &PhysicsEngine, dt: f32) -> Vec3 {
        engine.rotational_accelerations.iter().map(|a| *a * dt).sum()
    }

    /// 世界空间逆惯性张量
    ///
    /// 按实心长方体计算主惯量 m/3·(h₁² + h₂²)，再旋转到世界空间：
    /// I⁻¹_world = R · I⁻¹_local · Rᵀ。
    pub fn inverse_inertia(&self, rotation: Quat, half_extents: Vec3) -> Mat3 {
        let h2 = half_extents * half_extents;
        let k = self.mass / 3.0;
        let principal = Vec3::new(k * (h2.y + h2.z), k * (h2.x + h2.z), k * (h2.x + h2.y));
        let inv = Vec3::new(
            invert_axis(principal.x),
            invert_axis(principal.y),
            invert_axis(principal.z),
        );

        let r = Mat3::from_quat(rotation);
        r * Mat3::from_diagonal(inv) * r.transpose()
    }
}

#[inline]
fn invert_axis(inertia: f32) -> f32 {
    if inertia < INERTIA_EPSILON {
        0.0
    } else {
        1.0 / inertia
    }
}
