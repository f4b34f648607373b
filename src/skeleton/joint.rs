//! 关节
//!
//! 父骨骼 → 子骨骼的有向约束。所有关节共享同一个弹簧阻尼核心：
//! 父、子两个偏移点之间的临界阻尼弹簧，用 RK4 在相对坐标上积分，
//! 得到的相对速度变化以偏移力的形式施加到两个刚体上。
//!
//! - Ball：只约束位置
//! - Rotator：位置 + 把子偏移方向拉回父偏移方向的力矩
//! - Hinge：位置 + 力矩和子角速度都投影到铰链轴上
//! - Piston：固定（零柔度），直接对齐

use glam::{Quat, Vec3};

use crate::physics::{get_config, PhysicsConfig};
use crate::scene::Node;
use crate::{PhysicsError, Result};

/// 平方长度低于此值的向量不参与力矩计算
const DIRECTION_EPSILON: f32 = 1e-7;
/// 叉积平方长度低于此值视为平行
const PARALLEL_EPSILON: f32 = 1e-6;
/// 单个子步内 ω·h 的上限
const RK4_STEP_LIMIT: f32 = 0.5;
/// 每次约束最多的 RK4 子步数
pub const RK4_MAX_SUBSTEPS: usize = 64;

/// 关节类型
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JointKind {
    Ball,
    Rotator,
    Hinge {
        /// 当前（随父骨骼旋转后的）铰链轴
        axis: Vec3,
        original_axis: Vec3,
    },
    Piston,
}

/// 关节
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub kind: JointKind,
    /// 父节点上的连接点偏移（当前朝向）
    pub parent_offset: Vec3,
    pub original_parent_offset: Vec3,
    /// 子节点上的连接点偏移（当前朝向）
    pub child_offset: Vec3,
    pub original_child_offset: Vec3,
    /// 弹簧刚度
    pub spring_constant: f32,
    /// 零柔度：子节点直接对齐到父连接点
    pub fixed: bool,
}

impl Joint {
    fn with_kind(
        kind: JointKind,
        parent_offset: Vec3,
        child_offset: Vec3,
        spring_constant: f32,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            parent_offset,
            original_parent_offset: parent_offset,
            child_offset,
            original_child_offset: child_offset,
            spring_constant: check_spring_constant(spring_constant)?,
            fixed: matches!(kind, JointKind::Piston),
        })
    }

    /// 球关节
    pub fn ball(parent_offset: Vec3, child_offset: Vec3, spring_constant: f32) -> Result<Self> {
        Self::with_kind(JointKind::Ball, parent_offset, child_offset, spring_constant)
    }

    /// 旋转关节：子偏移方向被拉向父偏移方向
    pub fn rotator(parent_offset: Vec3, child_offset: Vec3, spring_constant: f32) -> Result<Self> {
        Self::with_kind(JointKind::Rotator, parent_offset, child_offset, spring_constant)
    }

    /// 铰链关节，轴长度不能为零
    pub fn hinge(
        parent_offset: Vec3,
        child_offset: Vec3,
        spring_constant: f32,
        axis: Vec3,
    ) -> Result<Self> {
        if axis.length_squared() < DIRECTION_EPSILON {
            return Err(PhysicsError::DegenerateHingeAxis);
        }
        let axis = axis.normalize();
        Self::with_kind(
            JointKind::Hinge { axis, original_axis: axis },
            parent_offset,
            child_offset,
            spring_constant,
        )
    }

    /// 活塞关节：固定的球关节
    pub fn piston(parent_offset: Vec3, child_offset: Vec3, spring_constant: f32) -> Result<Self> {
        Self::with_kind(JointKind::Piston, parent_offset, child_offset, spring_constant)
    }

    /// 按类型创建，刚度取配置中的默认值
    ///
    /// 铰链轴会被归一化，长度为零时返回错误。
    pub fn new(kind: JointKind, parent_offset: Vec3, child_offset: Vec3) -> Result<Self> {
        let spring_constant = get_config().default_spring_constant;
        match kind {
            JointKind::Hinge { original_axis, .. } => {
                Self::hinge(parent_offset, child_offset, spring_constant, original_axis)
            }
            kind => Self::with_kind(kind, parent_offset, child_offset, spring_constant),
        }
    }

    pub fn with_spring_constant(mut self, spring_constant: f32) -> Result<Self> {
        self.spring_constant = check_spring_constant(spring_constant)?;
        Ok(self)
    }

    /// 铰链轴（非铰链返回 None）
    pub fn axis(&self) -> Option<Vec3> {
        match self.kind {
            JointKind::Hinge { axis, .. } => Some(axis),
            _ => None,
        }
    }

    // ========================================
    // 偏移旋转
    // ========================================

    /// 用 q⁻¹·(0, v)·q 旋转原始父偏移（铰链轴同样处理）
    pub fn rotate_parent_offset(&mut self, rotation: Quat) {
        let inverse = rotation.inverse();
        self.parent_offset = inverse * self.original_parent_offset;
        if let JointKind::Hinge { axis, original_axis } = &mut self.kind {
            *axis = inverse * *original_axis;
        }
    }

    /// 用 q⁻¹·(0, v)·q 旋转原始子偏移
    pub fn rotate_child_offset(&mut self, rotation: Quat) {
        self.child_offset = rotation.inverse() * self.original_child_offset;
    }

    // ========================================
    // 约束
    // ========================================

    /// 约束子节点到父节点
    ///
    /// dt ≤ 0 时只做与时间无关的吸附，不施加弹簧力或力矩。
    /// 刚度可能经 pub 字段被改成非法值，这里再检查一次。
    pub fn restrict(
        &self,
        parent: &mut Node,
        child: &mut Node,
        dt: f32,
        config: &PhysicsConfig,
    ) -> Result<()> {
        check_spring_constant(self.spring_constant)?;
        match self.kind {
            JointKind::Ball | JointKind::Piston => {
                self.restrict_position(parent, child, dt, config, None)
            }
            JointKind::Hinge { axis, .. } => {
                self.restrict_position(parent, child, dt, config, Some(axis))
            }
            JointKind::Rotator => {
                self.restrict_position(parent, child, dt, config, None)?;
                self.restrict_direction(child, dt)
            }
        }
    }

    /// 位置约束（球关节核心）
    fn restrict_position(
        &self,
        parent: &mut Node,
        child: &mut Node,
        dt: f32,
        config: &PhysicsConfig,
        axis: Option<Vec3>,
    ) -> Result<()> {
        let origin = parent.position() + self.parent_offset;
        let displacement = child.position() + self.child_offset - origin;

        if self.fixed {
            child.set_position(origin - self.child_offset);
            if child.body().is_some() {
                child.velocity = parent.velocity;
            }
            return Ok(());
        }

        if displacement.length() < config.joint_min_displacement {
            return Ok(());
        }

        if child.body().is_none() {
            child.set_position(origin - self.child_offset);
            return Ok(());
        }

        // 暂停帧：弹簧力 F = μ·Δv/dt 无定义
        if dt.is_nan() || dt <= 0.0 {
            return Ok(());
        }

        if dt > config.rk4_max_dt {
            correct_position(parent, child, displacement);
            return Ok(());
        }

        spring_damper(self, parent, child, displacement, dt, axis)
    }

    /// 旋转关节的方向力矩：k·θ·(n_p × n_c)，去掉沿 n_c 的分量
    fn restrict_direction(&self, child: &mut Node, dt: f32) -> Result<()> {
        if child.body().is_none()
            || dt.is_nan()
            || dt <= 0.0
            || self.parent_offset.length_squared() < DIRECTION_EPSILON
            || self.child_offset.length_squared() < DIRECTION_EPSILON
        {
            return Ok(());
        }

        let normal_parent = self.parent_offset.normalize();
        let normal_child = self.child_offset.normalize();
        let axis = normal_parent.cross(normal_child);
        if axis.length_squared() < PARALLEL_EPSILON {
            log::trace!("旋转关节偏移方向平行，跳过力矩");
            return Ok(());
        }

        let theta = normal_child.dot(normal_parent).abs().min(1.0).acos();
        let mut torque = axis * (self.spring_constant * theta);
        torque -= normal_child * torque.dot(normal_child);
        child.apply_torque(torque, dt)
    }
}

/// 刚度必须是有限的非负数，否则阻尼 2√(kμ) 为 NaN
fn check_spring_constant(spring_constant: f32) -> Result<f32> {
    if spring_constant.is_finite() && spring_constant >= 0.0 {
        Ok(spring_constant)
    } else {
        Err(PhysicsError::InvalidSpringConstant(spring_constant))
    }
}

/// 大步长时直接修正位置，按质量倒数分配
fn correct_position(parent: &mut Node, child: &mut Node, displacement: Vec3) {
    let inv_child = child.inverse_mass();
    let inv_parent = parent.inverse_mass();
    let inv_sum = inv_child + inv_parent;
    if inv_sum <= 0.0 {
        log::trace!("关节两端均为无穷质量，跳过位置修正");
        return;
    }
    child.set_position(child.position() - displacement * (inv_child / inv_sum));
    if inv_parent > 0.0 {
        parent.set_position(parent.position() + displacement * (inv_parent / inv_sum));
    }
}

/// 弹簧阻尼核心
///
/// 约化质量 μ（父节点没有刚体时取子质量），c = 2√(kμ)。
/// RK4 得到相对速度变化 Δv，F = μ·Δv/dt 作为偏移力施加给子（+F）和父（-F）。
/// 给定 axis 时，子节点的力矩与角速度只保留沿轴分量。
fn spring_damper(
    joint: &Joint,
    parent: &mut Node,
    child: &mut Node,
    displacement: Vec3,
    dt: f32,
    axis: Option<Vec3>,
) -> Result<()> {
    let Some(child_body) = child.body().copied() else {
        return Ok(());
    };
    let parent_body = parent.body().copied().filter(|_| !parent.is_static);

    let mu = match parent_body {
        Some(p) => child_body.mass() * p.mass() / (child_body.mass() + p.mass()),
        None => child_body.mass(),
    };
    let k = joint.spring_constant;
    let damping = 2.0 * (k * mu).sqrt();

    let relative_velocity = child.velocity - parent.velocity;
    let (_, next_velocity) = spring_damper_rk4(displacement, relative_velocity, k, damping, mu, dt);
    let force = (next_velocity - relative_velocity) * (mu / dt);

    match axis {
        None => child.apply_offset_force(force, joint.child_offset, dt)?,
        Some(axis) => {
            child.velocity += force / child_body.mass() * dt;
            let torque = joint.child_offset.cross(force);
            child.apply_torque(axis * torque.dot(axis), dt)?;
            child.angular_velocity = axis * child.angular_velocity.dot(axis);
        }
    }

    if parent_body.is_some() {
        parent.apply_offset_force(-force, joint.parent_offset, dt)?;
    }
    Ok(())
}

/// 临界阻尼弹簧的 RK4 积分：a = (-k·x - c·v) / m
///
/// 自动细分子步使 ω·h ≤ 0.5（最多 RK4_MAX_SUBSTEPS 步），返回 dt 后的 (x, v)。
pub fn spring_damper_rk4(
    x: Vec3,
    v: Vec3,
    stiffness: f32,
    damping: f32,
    mass: f32,
    dt: f32,
) -> (Vec3, Vec3) {
    if !(mass > 0.0) || dt <= 0.0 {
        return (x, v);
    }

    let omega = (stiffness / mass).sqrt();
    let substeps = ((omega * dt / RK4_STEP_LIMIT).ceil() as usize).clamp(1, RK4_MAX_SUBSTEPS);
    let h = dt / substeps as f32;
    let acceleration = |x: Vec3, v: Vec3| (-stiffness * x - damping * v) / mass;

    let (mut x, mut v) = (x, v);
    for _ in 0..substeps {
        let (k1x, k1v) = (v, acceleration(x, v));
        let (k2x, k2v) = {
            let (x2, v2) = (x + k1x * (h / 2.0), v + k1v * (h / 2.0));
            (v2, acceleration(x2, v2))
        };
        let (k3x, k3v) = {
            let (x3, v3) = (x + k2x * (h / 2.0), v + k2v * (h / 2.0));
            (v3, acceleration(x3, v3))
        };
        let (k4x, k4v) = (v + k3v * h, acceleration(x + k3x * h, v + k3v * h));

        x += (k1x + 2.0 * k2x + 2.0 * k3x + k4x) * (h / 6.0);
        v += (k1v + 2.0 * k2v + 2.0 * k3v + k4v) * (h / 6.0);
    }
    (x, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsEngine;
    use crate::scene::{NodeBuilder, NodeId, NodeSet};

    fn config() -> PhysicsConfig {
        PhysicsConfig::default()
    }

    /// 静态锚点 + 带刚体的子节点
    fn anchor_and_child(child_position: Vec3) -> (NodeSet, NodeId, NodeId) {
        let mut nodes = NodeSet::new();
        let anchor = nodes.add(NodeBuilder::new("anchor"));
        let child = nodes.add(
            NodeBuilder::new("child")
                .position(child_position)
                .with_physics(1.0)
                .unwrap(),
        );
        (nodes, anchor, child)
    }

    fn restrict(nodes: &mut NodeSet, joint: &Joint, parent: NodeId, child: NodeId, dt: f32) {
        let (p, c) = nodes.pair_mut(parent, child).unwrap();
        joint.restrict(p, c, dt, &config()).unwrap();
    }

    #[test]
    fn test_rk4_decays_to_rest() {
        let (mut x, mut v) = (Vec3::new(0.1, 0.0, 0.0), Vec3::ZERO);
        for _ in 0..100 {
            (x, v) = spring_damper_rk4(x, v, 100.0, 20.0, 1.0, 0.016);
        }
        assert!(x.length() < 1e-4);
        assert!(v.length() < 1e-3);
    }

    #[test]
    fn test_rk4_substeps_keep_stiff_springs_bounded() {
        let (x, v) = spring_damper_rk4(Vec3::X, Vec3::ZERO, 1e5, 2.0 * 1e5f32.sqrt(), 1.0, 0.016);
        assert!(x.is_finite() && v.is_finite());
        assert!(x.length() < 1.0);
    }

    #[test]
    fn test_ball_joint_converges_below_dt_threshold() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.1, 0.0, 0.0));
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 100.0).unwrap();
        let engine = PhysicsEngine::empty();

        for _ in 0..300 {
            restrict(&mut nodes, &joint, anchor, child, 0.016);
            nodes.integrate(&engine, 0.016);
        }
        let node = nodes.get(child).unwrap();
        assert!(node.position().length() < 1e-4);
        assert!(node.velocity.length() < 1e-3);
    }

    #[test]
    fn test_two_body_ball_joint_conserves_momentum() {
        let mut nodes = NodeSet::new();
        let a = nodes.add(NodeBuilder::new("a").with_physics(2.0).unwrap());
        let b = nodes.add(
            NodeBuilder::new("b")
                .position(Vec3::new(0.2, 0.0, 0.0))
                .with_physics(1.0)
                .unwrap(),
        );
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 100.0).unwrap();

        restrict(&mut nodes, &joint, a, b, 0.016);
        let (va, vb) = (nodes.get(a).unwrap().velocity, nodes.get(b).unwrap().velocity);
        // 子节点被拉回，父节点被拉近
        assert!(vb.x < 0.0 && va.x > 0.0);
        assert!((2.0 * va + vb).length() < 1e-5);
    }

    #[test]
    fn test_snap_without_body() {
        let mut nodes = NodeSet::new();
        let parent = nodes.add(NodeBuilder::new("p").position(Vec3::new(1.0, 0.0, 0.0)));
        let child = nodes.add(NodeBuilder::new("c").position(Vec3::new(5.0, 5.0, 0.0)));
        let joint =
            Joint::ball(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 100.0).unwrap();

        restrict(&mut nodes, &joint, parent, child, 0.016);
        // 子连接点与父连接点重合
        assert_eq!(nodes.get(child).unwrap().position(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_piston_is_fixed() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.3, -0.2, 0.0));
        nodes.get_mut(child).unwrap().velocity = Vec3::new(4.0, 0.0, 0.0);
        let joint = Joint::piston(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 100.0).unwrap();
        assert!(joint.fixed);

        restrict(&mut nodes, &joint, anchor, child, 0.016);
        let node = nodes.get(child).unwrap();
        assert_eq!(node.position(), Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(node.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_large_dt_corrects_position_directly() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.5, 0.0, 0.0));
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 100.0).unwrap();

        restrict(&mut nodes, &joint, anchor, child, 0.05);
        let node = nodes.get(child).unwrap();
        assert!(node.position().length() < 1e-6);
        assert_eq!(node.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_small_displacement_is_ignored() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(1e-8, 0.0, 0.0));
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 100.0).unwrap();
        restrict(&mut nodes, &joint, anchor, child, 0.016);
        assert_eq!(nodes.get(child).unwrap().velocity, Vec3::ZERO);
    }

    #[test]
    fn test_rotator_torque() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.0, -1.0, 0.0));
        // 子偏移与父偏移垂直
        let joint = Joint::rotator(Vec3::new(0.0, -1.0, 0.0), Vec3::X, 10.0).unwrap();
        nodes.get_mut(child).unwrap().set_position(Vec3::new(-1.0, -1.0, 0.0));

        restrict(&mut nodes, &joint, anchor, child, 0.016);
        let w = nodes.get(child).unwrap().angular_velocity;
        // 力矩沿 n_p × n_c = -y × x = z
        assert!(w.z > 0.0);
        assert!(w.x.abs() < 1e-6 && w.y.abs() < 1e-6);
    }

    #[test]
    fn test_rotator_parallel_offsets_no_torque() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.0, -2.0, 0.0));
        let joint = Joint::rotator(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, 10.0).unwrap();
        restrict(&mut nodes, &joint, anchor, child, 0.016);
        let w = nodes.get(child).unwrap().angular_velocity;
        assert!(!w.is_nan());
        assert_eq!(w, Vec3::ZERO);
    }

    #[test]
    fn test_hinge_projects_angular_velocity() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.2, -1.0, 0.1));
        nodes.get_mut(child).unwrap().angular_velocity = Vec3::new(1.0, 2.0, 3.0);
        let joint = Joint::hinge(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 100.0, Vec3::Z).unwrap();

        restrict(&mut nodes, &joint, anchor, child, 0.016);
        let w = nodes.get(child).unwrap().angular_velocity;
        assert!(w.x.abs() < 1e-6 && w.y.abs() < 1e-6);
        assert!((w.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_new_uses_default_stiffness() {
        let joint = Joint::new(JointKind::Piston, Vec3::Y, Vec3::ZERO).unwrap();
        assert!(joint.fixed);
        assert_eq!(joint.spring_constant, PhysicsConfig::default().default_spring_constant);

        let hinge = Joint::new(
            JointKind::Hinge { axis: Vec3::ZERO, original_axis: Vec3::new(0.0, 0.0, 3.0) },
            Vec3::ZERO,
            Vec3::ZERO,
        )
        .unwrap()
        .with_spring_constant(50.0)
        .unwrap();
        assert_eq!(hinge.axis(), Some(Vec3::Z));
        assert_eq!(hinge.spring_constant, 50.0);
    }

    #[test]
    fn test_hinge_rejects_zero_axis() {
        assert!(matches!(
            Joint::hinge(Vec3::ZERO, Vec3::ZERO, 1.0, Vec3::ZERO),
            Err(PhysicsError::DegenerateHingeAxis)
        ));
    }

    #[test]
    fn test_rejects_invalid_spring_constant() {
        for k in [-5.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                Joint::ball(Vec3::ZERO, Vec3::ZERO, k),
                Err(PhysicsError::InvalidSpringConstant(_))
            ));
        }
        assert!(Joint::hinge(Vec3::ZERO, Vec3::ZERO, -1.0, Vec3::Z).is_err());
        assert!(Joint::piston(Vec3::ZERO, Vec3::ZERO, 0.0).is_ok());

        let joint = Joint::rotator(Vec3::Y, Vec3::ZERO, 10.0).unwrap();
        assert!(joint.clone().with_spring_constant(-1.0).is_err());

        // 通过字段改成负数后，约束时报错而不是写入 NaN
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.3, 0.0, 0.0));
        let mut joint = joint;
        joint.spring_constant = -1.0;
        let (p, c) = nodes.pair_mut(anchor, child).unwrap();
        assert!(matches!(
            joint.restrict(p, c, 0.016, &config()),
            Err(PhysicsError::InvalidSpringConstant(k)) if k == -1.0
        ));
        assert_eq!(nodes.get(child).unwrap().velocity, Vec3::ZERO);
    }

    #[test]
    fn test_non_positive_dt_applies_no_spring_force() {
        let (mut nodes, anchor, child) = anchor_and_child(Vec3::new(0.3, -1.0, 0.0));
        let ball = Joint::ball(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 100.0).unwrap();
        let rotator = Joint::rotator(Vec3::new(0.0, -1.0, 0.0), Vec3::X, 100.0).unwrap();

        for dt in [0.0, -0.016] {
            restrict(&mut nodes, &ball, anchor, child, dt);
            restrict(&mut nodes, &rotator, anchor, child, dt);
        }
        let node = nodes.get(child).unwrap();
        assert_eq!(node.velocity, Vec3::ZERO);
        assert_eq!(node.angular_velocity, Vec3::ZERO);
        assert_eq!(node.position(), Vec3::new(0.3, -1.0, 0.0));
    }

    #[test]
    fn test_offsets_rotate_with_inverse_sandwich() {
        let mut joint = Joint::hinge(Vec3::X, Vec3::Y, 1.0, Vec3::X).unwrap();
        let q = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);

        joint.rotate_parent_offset(q);
        joint.rotate_child_offset(q);
        // q⁻¹ 绕 z 转 -90°：x → -y，y → x
        assert!((joint.parent_offset + Vec3::Y).length() < 1e-6);
        assert!((joint.child_offset - Vec3::X).length() < 1e-6);
        assert!((joint.axis().unwrap() + Vec3::Y).length() < 1e-6);
        // 原始值不变
        assert_eq!(joint.original_parent_offset, Vec3::X);
    }
}
