//! 碰撞体
//!
//! 缓存 OBB 角点、半尺寸和 AABB，三个脏标志分别控制它们的重算：
//! - 位置变化：OBB + BVH
//! - 缩放/旋转变化：OBB + 半尺寸 + BVH

use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use super::ColliderId;
use crate::geometry::Aabb;
use crate::mesh::Mesh;
use crate::physics::get_config;
use crate::scene::{Node, NodeId, TransformChange};
use crate::{PhysicsError, Result};

/// 模型矩阵行列式绝对值低于此值时不求逆（零缩放）
const SINGULAR_DETERMINANT: f32 = 1e-12;

// ============================================================================
// 脏标志
// ============================================================================

bitflags! {
    /// 需要重算的缓存
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ColliderDirty: u8 {
        /// OBB 角点（以及由它派生的 AABB）
        const OBB = 1 << 0;
        /// 半尺寸
        const HALF_DIMENSIONS = 1 << 1;
        /// 宽阶段叶子需要删除后重新插入
        const BVH = 1 << 2;
    }
}

impl ColliderDirty {
    /// 节点变换变更对应的失效标志
    pub fn from_change(change: TransformChange) -> Self {
        let mut dirty = ColliderDirty::empty();
        if change.contains(TransformChange::POSITION) {
            dirty |= ColliderDirty::OBB | ColliderDirty::BVH;
        }
        if change.intersects(TransformChange::SCALE | TransformChange::ROTATION) {
            dirty |= ColliderDirty::all();
        }
        dirty
    }
}

// ============================================================================
// 形状与材质
// ============================================================================

/// 碰撞形状
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColliderShape {
    /// 共享的 2×2×2 立方体，随节点缩放
    #[default]
    Box,
    /// 节点自身的网格
    Mesh,
}

/// 碰撞体材质
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderMaterial {
    /// 静摩擦系数
    pub static_friction: f32,
    /// 动摩擦系数
    pub kinetic_friction: f32,
    /// 弹性系数
    pub elasticity: f32,
    /// 同组碰撞体互不检测
    pub collision_group: Option<u32>,
}

impl Default for ColliderMaterial {
    fn default() -> Self {
        let config = get_config();
        Self {
            static_friction: config.static_friction,
            kinetic_friction: config.kinetic_friction,
            elasticity: config.elasticity,
            collision_group: None,
        }
    }
}

impl ColliderMaterial {
    pub fn with_group(mut self, group: u32) -> Self {
        self.collision_group = Some(group);
        self
    }

    /// 两者是否属于同一非空分组
    #[inline]
    pub fn shares_group(&self, other: &ColliderMaterial) -> bool {
        matches!((self.collision_group, other.collision_group), (Some(a), Some(b)) if a == b)
    }
}

// ============================================================================
// 接触
// ============================================================================

/// 本帧的一次接触（从持有者的视角）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// 对方节点
    pub other: NodeId,
    /// 对方碰撞体
    pub other_collider: ColliderId,
    /// 由自身指向对方的单位法线
    pub normal: Vec3,
    /// 对方速度 - 自身速度
    pub relative_velocity: Vec3,
    /// 穿透深度
    pub depth: f32,
}

// ============================================================================
// 碰撞体
// ============================================================================

/// 碰撞体
#[derive(Clone, Debug)]
pub struct Collider {
    id: ColliderId,
    node: NodeId,
    shape: ColliderShape,
    mesh: Arc<Mesh>,
    pub material: ColliderMaterial,

    obb_points: [Vec3; 8],
    half_dimensions: Vec3,
    aabb: Aabb,
    dirty: ColliderDirty,

    /// 宽阶段叶子槽位
    pub(crate) leaf: Option<usize>,

    collisions: Vec<Contact>,
    collision_velocity: f32,
}

impl Collider {
    /// 为节点创建碰撞体，缓存立即按节点当前变换计算
    pub fn new(
        id: ColliderId,
        node: &Node,
        shape: ColliderShape,
        material: ColliderMaterial,
    ) -> Result<Self> {
        let mesh = match shape {
            ColliderShape::Box => Mesh::cube(),
            ColliderShape::Mesh => node
                .mesh()
                .cloned()
                .ok_or(PhysicsError::MissingMesh(node.id()))?,
        };

        let mut collider = Self {
            id,
            node: node.id(),
            shape,
            mesh,
            material,
            obb_points: [Vec3::ZERO; 8],
            half_dimensions: Vec3::ZERO,
            aabb: Aabb::new(Vec3::ZERO, Vec3::ZERO),
            dirty: ColliderDirty::all(),
            leaf: None,
            collisions: Vec::new(),
            collision_velocity: 0.0,
        };
        collider.refresh(node);
        Ok(collider)
    }

    #[inline]
    pub fn id(&self) -> ColliderId {
        self.id
    }

    /// 所属节点
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn shape(&self) -> ColliderShape {
        self.shape
    }

    #[inline]
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    #[inline]
    pub fn leaf(&self) -> Option<usize> {
        self.leaf
    }

    // ========================================
    // 缓存
    // ========================================

    #[inline]
    pub fn dirty(&self) -> ColliderDirty {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self, flags: ColliderDirty) {
        self.dirty |= flags;
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self, flags: ColliderDirty) {
        self.dirty.remove(flags);
    }

    /// 按脏标志重算 OBB 与半尺寸；BVH 标志由碰撞体集合在重新插入后清除
    pub fn refresh(&mut self, node: &Node) {
        if !self.dirty.intersects(ColliderDirty::OBB | ColliderDirty::HALF_DIMENSIONS) {
            return;
        }

        let model = node.model_matrix();
        self.obb_points = self.mesh.aabb_points().map(|p| model.transform_point3(p));

        if self.dirty.contains(ColliderDirty::HALF_DIMENSIONS) {
            if let Some(bounds) = Aabb::from_points(self.obb_points) {
                self.half_dimensions = bounds.half_dimensions();
            }
        }

        let center = model.transform_point3(self.mesh.geometric_center());
        self.aabb = Aabb::from_center(center, self.half_dimensions);
        self.dirty.remove(ColliderDirty::OBB | ColliderDirty::HALF_DIMENSIONS);
    }

    /// 世界空间 OBB 的 8 个角点
    #[inline]
    pub fn obb_points(&self) -> &[Vec3; 8] {
        &self.obb_points
    }

    #[inline]
    pub fn half_dimensions(&self) -> Vec3 {
        self.half_dimensions
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn top_right(&self) -> Vec3 {
        self.aabb.top_right
    }

    #[inline]
    pub fn bottom_left(&self) -> Vec3 {
        self.aabb.bottom_left
    }

    #[inline]
    pub fn surface_area(&self) -> f32 {
        self.aabb.surface_area()
    }

    /// 窄阶段点集（世界空间）
    ///
    /// 盒子使用 OBB 角点；网格只取局部 BVH 报告的、
    /// 与 region 重叠的三角形顶点。
    pub fn narrow_points(&self, model: &Mat4, region: &Aabb) -> Vec<Vec3> {
        match self.shape {
            ColliderShape::Box => self.obb_points.to_vec(),
            ColliderShape::Mesh => {
                if model.determinant().abs() < SINGULAR_DETERMINANT {
                    return self.obb_points.to_vec();
                }
                let local_region = region.transformed(&model.inverse());
                self.mesh
                    .points_near(&local_region)
                    .into_iter()
                    .map(|p| model.transform_point3(p))
                    .collect()
            }
        }
    }

    // ========================================
    // 本帧接触
    // ========================================

    #[inline]
    pub fn collisions(&self) -> &[Contact] {
        &self.collisions
    }

    #[inline]
    pub fn has_collided(&self) -> bool {
        !self.collisions.is_empty()
    }

    /// 本帧最大的相对速度
    #[inline]
    pub fn collision_velocity(&self) -> f32 {
        self.collision_velocity
    }

    pub(crate) fn record(&mut self, contact: Contact) {
        self.collision_velocity = self.collision_velocity.max(contact.relative_velocity.length());
        self.collisions.push(contact);
    }

    pub(crate) fn clear_collisions(&mut self) {
        self.collisions.clear();
        self.collision_velocity = 0.0;
    }
}
