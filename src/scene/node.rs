//! 场景节点
//!
//! 物理子系统需要的最小节点：世界变换、速度、可选刚体与网格。
//! 变换只能通过 setter 修改，每次修改都会记录到 `changes`，
//! 碰撞体据此决定哪些缓存失效。

use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat3, Mat4, Quat, Vec3};

use super::NodeId;
use crate::collision::ColliderId;
use crate::mesh::Mesh;
use crate::physics::{PhysicsEngine, RigidBody};
use crate::{PhysicsError, Result};

// ============================================================================
// 变换变更标志
// ============================================================================

bitflags! {
    /// 自上次读取以来发生的变换变更
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TransformChange: u8 {
        const POSITION = 1 << 0;
        const SCALE = 1 << 1;
        const ROTATION = 1 << 2;
    }
}

// ============================================================================
// 节点
// ============================================================================

/// 场景节点
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub(crate) id: NodeId,

    position: Vec3,
    scale: Vec3,
    rotation: Quat,

    /// 线速度（没有刚体的节点也可以匀速运动）
    pub velocity: Vec3,
    /// 角速度
    pub angular_velocity: Vec3,
    /// 静态节点不参与积分，碰撞时视为无穷质量
    pub is_static: bool,

    body: Option<RigidBody>,
    mesh: Option<Arc<Mesh>>,
    pub(crate) collider: Option<ColliderId>,
    changes: TransformChange,
}

impl Node {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.changes |= TransformChange::POSITION;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.changes |= TransformChange::SCALE;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.changes |= TransformChange::ROTATION;
    }

    #[inline]
    pub fn body(&self) -> Option<&RigidBody> {
        self.body.as_ref()
    }

    #[inline]
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    #[inline]
    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    /// 未读取的变换变更
    #[inline]
    pub fn changes(&self) -> TransformChange {
        self.changes
    }

    /// 取出并清空变换变更
    pub fn take_changes(&mut self) -> TransformChange {
        std::mem::take(&mut self.changes)
    }

    /// 模型矩阵（缩放 → 旋转 → 平移）
    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// 碰撞计算用的质量倒数，静态或无刚体节点为 0（无穷质量）
    pub fn inverse_mass(&self) -> f32 {
        match self.body {
            Some(body) if !self.is_static => body.inverse_mass(),
            _ => 0.0,
        }
    }

    /// 世界空间半尺寸（网格半尺寸 × 缩放，无网格时按 2×2×2 立方体）
    pub fn half_extents(&self) -> Vec3 {
        self.mesh.as_ref().map_or(Vec3::ONE, |m| m.half_dimensions()) * self.scale
    }

    /// 世界空间逆惯性张量
    pub fn inverse_inertia(&self) -> Result<Mat3> {
        let body = self.body.ok_or(PhysicsError::MissingPhysicsBody(self.id))?;
        Ok(body.inverse_inertia(self.rotation, self.half_extents()))
    }

    // ========================================
    // 积分
    // ========================================

    /// 显式欧拉一步
    ///
    /// 先用当前速度推进位置与朝向，再累加恒定力产生的速度增量。
    pub fn integrate(&mut self, engine: &PhysicsEngine, dt: f32) {
        if self.is_static {
            return;
        }

        if self.velocity != Vec3::ZERO {
            self.set_position(self.position + self.velocity * dt);
        }
        if self.angular_velocity != Vec3::ZERO {
            let w = self.angular_velocity;
            let spin = self.rotation * Quat::from_xyzw(w.x, w.y, w.z, 0.0);
            self.set_rotation((self.rotation - spin * (dt / 2.0)).normalize());
        }

        if let Some(body) = self.body {
            self.velocity += body.delta_velocity(engine, dt);
            self.angular_velocity += body.delta_angular_velocity(engine, dt);
        }
    }

    // ========================================
    // 力与力矩
    // ========================================

    /// 在质心施加力
    pub fn apply_force(&mut self, force: Vec3, dt: f32) -> Result<()> {
        self.apply_offset_force(force, Vec3::ZERO, dt)
    }

    /// 在偏移处施加力：线速度 += F/m·dt，并施加力矩 offset × F
    pub fn apply_offset_force(&mut self, force: Vec3, offset: Vec3, dt: f32) -> Result<()> {
        let body = self.body.ok_or(PhysicsError::MissingPhysicsBody(self.id))?;
        self.velocity += force / body.mass() * dt;
        self.apply_torque(offset.cross(force), dt)
    }

    /// 施加力矩：角速度 += I⁻¹·τ·dt
    pub fn apply_torque(&mut self, torque: Vec3, dt: f32) -> Result<()> {
        let inverse_inertia = self.inverse_inertia()?;
        self.angular_velocity += inverse_inertia * torque * dt;
        Ok(())
    }
}

// ============================================================================
// 构建器
// ============================================================================

/// 节点构建器
#[derive(Clone, Debug)]
pub struct NodeBuilder {
    name: String,
    position: Vec3,
    scale: Vec3,
    rotation: Quat,
    velocity: Vec3,
    angular_velocity: Vec3,
    body: Option<RigidBody>,
    mesh: Option<Arc<Mesh>>,
    is_static: Option<bool>,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            body: None,
            mesh: None,
            is_static: None,
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn mesh(mut self, mesh: Arc<Mesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// 添加刚体，质量必须为正
    pub fn with_physics(mut self, mass: f32) -> Result<Self> {
        self.body = Some(RigidBody::new(mass)?);
        Ok(self)
    }

    /// 显式指定是否静态；默认“无刚体且无速度”即为静态
    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = Some(is_static);
        self
    }

    pub(crate) fn build(self, id: NodeId) -> Node {
        let is_static = self.is_static.unwrap_or(
            self.body.is_none()
                && self.velocity == Vec3::ZERO
                && self.angular_velocity == Vec3::ZERO,
        );

        Node {
            name: self.name,
            id,
            position: self.position,
            scale: self.scale,
            rotation: self.rotation,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
            is_static,
            body: self.body,
            mesh: self.mesh,
            collider: None,
            changes: TransformChange::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(builder: NodeBuilder) -> Node {
        builder.build(NodeId(0))
    }

    #[test]
    fn test_static_default() {
        assert!(node(NodeBuilder::new("floor")).is_static);
        assert!(!node(NodeBuilder::new("drift").velocity(Vec3::X)).is_static);
        assert!(!node(NodeBuilder::new("box").with_physics(1.0).unwrap()).is_static);
        assert!(!node(NodeBuilder::new("forced").is_static(false)).is_static);
    }

    #[test]
    fn test_with_physics_rejects_bad_mass() {
        assert!(matches!(
            NodeBuilder::new("bad").with_physics(0.0),
            Err(PhysicsError::InvalidMass(_))
        ));
    }

    #[test]
    fn test_setters_record_changes() {
        let mut n = node(NodeBuilder::new("n"));
        assert!(n.changes().is_empty());
        n.set_position(Vec3::X);
        n.set_rotation(Quat::from_rotation_y(0.5));
        assert_eq!(n.changes(), TransformChange::POSITION | TransformChange::ROTATION);
        assert_eq!(
            n.take_changes(),
            TransformChange::POSITION | TransformChange::ROTATION
        );
        assert!(n.changes().is_empty());
    }

    #[test]
    fn test_integrate_free_fall() {
        let engine = PhysicsEngine::with_gravity(Vec3::new(0.0, -10.0, 0.0));
        let mut n = node(NodeBuilder::new("ball").with_physics(1.0).unwrap());

        n.integrate(&engine, 0.1);
        // 位置先用旧速度推进
        assert_eq!(n.position(), Vec3::ZERO);
        assert!((n.velocity.y + 1.0).abs() < 1e-6);

        n.integrate(&engine, 0.1);
        assert!((n.position().y + 0.1).abs() < 1e-6);
        assert!((n.velocity.y + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_integrate_rotation_stays_normalized() {
        let engine = PhysicsEngine::empty();
        let mut n = node(NodeBuilder::new("spin").angular_velocity(Vec3::new(0.0, 3.0, 0.0)));
        for _ in 0..100 {
            n.integrate(&engine, 0.016);
        }
        assert!((n.rotation().length() - 1.0).abs() < 1e-5);
        assert!(n.rotation().angle_between(Quat::IDENTITY) > 0.1);
    }

    #[test]
    fn test_static_node_does_not_move() {
        let engine = PhysicsEngine::with_gravity(Vec3::new(0.0, -10.0, 0.0));
        let mut n = node(
            NodeBuilder::new("pinned")
                .with_physics(1.0)
                .unwrap()
                .is_static(true),
        );
        n.integrate(&engine, 0.1);
        assert_eq!(n.velocity, Vec3::ZERO);
        assert!(n.changes().is_empty());
    }

    #[test]
    fn test_forces_require_body() {
        let mut n = node(NodeBuilder::new("ghost").velocity(Vec3::X));
        assert!(matches!(
            n.apply_force(Vec3::Y, 0.1),
            Err(PhysicsError::MissingPhysicsBody(_))
        ));
        assert!(n.apply_torque(Vec3::Y, 0.1).is_err());
    }

    #[test]
    fn test_offset_force_adds_velocity_and_spin() {
        let mut n = node(NodeBuilder::new("box").with_physics(2.0).unwrap());
        n.velocity = Vec3::new(1.0, 0.0, 0.0);

        n.apply_offset_force(Vec3::new(0.0, 4.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.5)
            .unwrap();
        // 速度是累加的
        assert!((n.velocity - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
        // τ = x × 4y = 4z，I_z = 2/3·2 = 4/3
        assert!((n.angular_velocity - Vec3::new(0.0, 0.0, 1.5)).length() < 1e-5);

        n.angular_velocity = Vec3::ZERO;
        n.apply_force(Vec3::new(0.0, 4.0, 0.0), 0.5).unwrap();
        assert_eq!(n.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_inverse_mass() {
        let body = node(NodeBuilder::new("b").with_physics(4.0).unwrap());
        assert!((body.inverse_mass() - 0.25).abs() < 1e-6);
        assert_eq!(node(NodeBuilder::new("wall")).inverse_mass(), 0.0);
    }
}
