//! 场景物理引擎
//!
//! 为 3D 场景图提供碰撞检测与骨骼约束物理：
//! - 宽阶段：动态 BVH（代价最小化插入、删除、旋转）
//! - 窄阶段：GJK + SAT，网格使用静态 BVH 缩小三角形集合
//! - 刚体积分：显式欧拉
//! - 骨骼：弹簧阻尼关节，RK4 积分，自顶向下递归求解
//!
//! 流程：PhysicsWorld::step →
//! [节点积分 → 碰撞体刷新 → 宽阶段 → 窄阶段 → 骨骼]

pub mod collision;
pub mod geometry;
pub mod mesh;
pub mod physics;
pub mod scene;
pub mod skeleton;
mod world;

pub use collision::{
    BroadBvh, Collider, ColliderId, ColliderMaterial, ColliderSet, ColliderShape, Contact,
    GjkResult, RayHit,
};
pub use geometry::Aabb;
pub use mesh::{Mesh, NarrowBvh, Primitive};
pub use physics::{get_config, reset_config, set_config, PhysicsConfig, PhysicsEngine, RigidBody};
pub use scene::{Node, NodeBuilder, NodeId, NodeSet, TransformChange};
pub use skeleton::{Bone, BoneId, Joint, JointKind, SkeletonSet};
pub use world::PhysicsWorld;

use thiserror::Error;

/// 物理引擎错误
///
/// 仅用于调用方误用（配置错误）。数值退化情况在出错的函数内部
/// 通过 epsilon 检查就地处理，不会以错误形式返回。
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("节点 {0:?} 没有物理刚体，无法施加力或力矩")]
    MissingPhysicsBody(NodeId),

    #[error("节点 {0:?} 没有网格，无法创建网格碰撞体")]
    MissingMesh(NodeId),

    #[error("节点 {0:?} 已经拥有碰撞体")]
    ColliderAlreadyAttached(NodeId),

    #[error("质量必须为正数，实际为 {0}")]
    InvalidMass(f32),

    #[error("网格没有顶点或三角形")]
    EmptyMesh,

    #[error("索引 {index} 越界（长度 {len}）")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("未知节点 {0:?}")]
    UnknownNode(NodeId),

    #[error("未知碰撞体 {0:?}")]
    UnknownCollider(ColliderId),

    #[error("未知骨骼 {0:?}")]
    UnknownBone(BoneId),

    #[error("骨骼 {0:?} 已经连接到父骨骼")]
    BoneAlreadyAttached(BoneId),

    #[error("连接 {parent:?} -> {child:?} 会在骨骼树中形成环")]
    SkeletonCycle { parent: BoneId, child: BoneId },

    #[error("铰链轴长度为零")]
    DegenerateHingeAxis,

    #[error("弹簧刚度必须是有限的非负数，实际为 {0}")]
    InvalidSpringConstant(f32),

    #[error("父骨骼与子骨骼绑定了同一个节点 {0:?}")]
    SharedBoneNode(NodeId),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PhysicsError>;
