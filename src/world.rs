//! 物理世界
//!
//! 持有场景节点、网格、碰撞体、引擎级力与骨骼。
//! 每帧流程：step →
//! [节点积分 → 碰撞体刷新 → 宽阶段 → 窄阶段/记录/响应 → 骨骼约束]

use std::sync::Arc;

use glam::Vec3;

use crate::collision::{
    Collider, ColliderId, ColliderMaterial, ColliderSet, ColliderShape, Contact, RayHit,
};
use crate::mesh::Mesh;
use crate::physics::{get_config, PhysicsEngine};
use crate::scene::{NodeBuilder, NodeId, NodeSet};
use crate::skeleton::{BoneId, Joint, SkeletonSet};
use crate::Result;

/// 物理世界
///
/// 单线程，每帧调用一次 `step`。
#[derive(Debug)]
pub struct PhysicsWorld {
    nodes: NodeSet,
    meshes: Vec<Arc<Mesh>>,
    colliders: ColliderSet,
    engine: PhysicsEngine,
    skeletons: SkeletonSet,
    /// 已执行的帧数
    frame: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// 创建物理世界，重力取自全局配置
    pub fn new() -> Self {
        Self::with_engine(PhysicsEngine::new())
    }

    pub fn with_engine(engine: PhysicsEngine) -> Self {
        let config = get_config();
        if config.debug_log {
            log::info!(
                "物理世界创建: 重力={:?}, BVH 旋转={}, 碰撞响应={}",
                engine.total_acceleration(),
                config.bvh_rotations,
                config.collision_response
            );
        }

        Self {
            nodes: NodeSet::new(),
            meshes: Vec::new(),
            colliders: ColliderSet::new(),
            engine,
            skeletons: SkeletonSet::new(),
            frame: 0,
        }
    }

    // ========================================
    // 场景
    // ========================================

    /// 注册网格，返回可共享给节点的句柄
    pub fn add_mesh(&mut self, mesh: Mesh) -> Arc<Mesh> {
        let mesh = Arc::new(mesh);
        self.meshes.push(Arc::clone(&mesh));
        mesh
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    pub fn add_node(&mut self, builder: NodeBuilder) -> NodeId {
        self.nodes.add(builder)
    }

    #[inline]
    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    /// 可修改节点变换；变更会在下一次 step 时同步到碰撞体
    #[inline]
    pub fn nodes_mut(&mut self) -> &mut NodeSet {
        &mut self.nodes
    }

    #[inline]
    pub fn engine(&self) -> &PhysicsEngine {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut PhysicsEngine {
        &mut self.engine
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // ========================================
    // 碰撞体
    // ========================================

    pub fn add_collider(
        &mut self,
        node: NodeId,
        shape: ColliderShape,
        material: ColliderMaterial,
    ) -> Result<ColliderId> {
        self.colliders.add(&mut self.nodes, node, shape, material)
    }

    pub fn remove_collider(&mut self, id: ColliderId) -> Result<Collider> {
        self.colliders.remove(&mut self.nodes, id)
    }

    #[inline]
    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    /// 碰撞体本帧的接触
    pub fn collisions(&self, id: ColliderId) -> Result<&[Contact]> {
        self.colliders.collisions(id)
    }

    pub fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        self.colliders.raycast(&self.nodes, origin, direction)
    }

    // ========================================
    // 骨骼
    // ========================================

    /// 以节点为根创建新骨架
    pub fn add_skeleton(&mut self, node: NodeId) -> Result<BoneId> {
        self.skeletons.add_root(&self.nodes, node)
    }

    /// 创建不属于任何骨架的骨骼，稍后用 `attach_bone` 连接
    pub fn create_bone(&mut self, node: NodeId) -> Result<BoneId> {
        self.skeletons.create(&self.nodes, node)
    }

    /// 创建骨骼并连接到 parent 下
    pub fn add_bone(&mut self, parent: BoneId, node: NodeId, joint: Joint) -> Result<BoneId> {
        self.skeletons.add_bone(&self.nodes, parent, node, joint)
    }

    pub fn attach_bone(&mut self, parent: BoneId, child: BoneId, joint: Joint) -> Result<()> {
        self.skeletons.attach(parent, child, joint)
    }

    #[inline]
    pub fn skeletons(&self) -> &SkeletonSet {
        &self.skeletons
    }

    #[inline]
    pub fn skeletons_mut(&mut self) -> &mut SkeletonSet {
        &mut self.skeletons
    }

    // ========================================
    // 力
    // ========================================

    pub fn apply_force(&mut self, node: NodeId, force: Vec3, dt: f32) -> Result<()> {
        self.nodes.apply_force(node, force, dt)
    }

    pub fn apply_offset_force(
        &mut self,
        node: NodeId,
        force: Vec3,
        offset: Vec3,
        dt: f32,
    ) -> Result<()> {
        self.nodes.apply_offset_force(node, force, offset, dt)
    }

    pub fn apply_torque(&mut self, node: NodeId, torque: Vec3, dt: f32) -> Result<()> {
        self.nodes.apply_torque(node, torque, dt)
    }

    // ========================================
    // 步进
    // ========================================

    /// 推进一帧，返回本帧接触对数量
    ///
    /// dt = 0 的暂停帧是合法的：节点不移动，关节不施加弹簧力。
    pub fn step(&mut self, dt: f32) -> Result<usize> {
        self.nodes.integrate(&self.engine, dt);
        let reinserted = self.colliders.sync(&mut self.nodes);
        let contacts = self.colliders.collide(&mut self.nodes);
        self.skeletons.update(&mut self.nodes, dt)?;
        self.frame += 1;

        if get_config().debug_log {
            log::debug!(
                "帧 {}: 刷新 {} 个碰撞体, {} 对接触",
                self.frame,
                reinserted,
                contacts
            );
        }
        Ok(contacts)
    }
}
