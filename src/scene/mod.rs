//! 场景节点集合
//!
//! 节点以下标寻址（NodeId），碰撞体与骨骼通过 NodeId 反向引用节点。

mod node;

pub use node::{Node, NodeBuilder, TransformChange};

use glam::{Mat4, Vec3};

use crate::physics::PhysicsEngine;
use crate::{PhysicsError, Result};

/// 节点下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// 节点竞技场
#[derive(Clone, Debug, Default)]
pub struct NodeSet {
    nodes: Vec<Node>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点
    pub fn add(&mut self, builder: NodeBuilder) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(builder.build(id));
        id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// 同 get，不存在时返回 UnknownNode
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(PhysicsError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.get_mut(id).ok_or(PhysicsError::UnknownNode(id))
    }

    /// 同时可变借用两个不同节点
    pub fn pair_mut(&mut self, a: NodeId, b: NodeId) -> Option<(&mut Node, &mut Node)> {
        if a == b || a.0 >= self.nodes.len() || b.0 >= self.nodes.len() {
            return None;
        }
        if a.0 < b.0 {
            let (lo, hi) = self.nodes.split_at_mut(b.0);
            Some((&mut lo[a.0], &mut hi[0]))
        } else {
            let (lo, hi) = self.nodes.split_at_mut(a.0);
            Some((&mut hi[0], &mut lo[b.0]))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// 取出所有节点的变换变更（变更通知）
    pub fn take_changes(&mut self) -> Vec<(NodeId, TransformChange)> {
        self.nodes
            .iter_mut()
            .filter(|n| !n.changes().is_empty())
            .map(|n| (n.id, n.take_changes()))
            .collect()
    }

    /// 所有节点积分一步
    pub fn integrate(&mut self, engine: &PhysicsEngine, dt: f32) {
        for node in &mut self.nodes {
            node.integrate(engine, dt);
        }
    }

    pub fn apply_force(&mut self, id: NodeId, force: Vec3, dt: f32) -> Result<()> {
        self.node_mut(id)?.apply_force(force, dt)
    }

    pub fn apply_offset_force(
        &mut self,
        id: NodeId,
        force: Vec3,
        offset: Vec3,
        dt: f32,
    ) -> Result<()> {
        self.node_mut(id)?.apply_offset_force(force, offset, dt)
    }

    pub fn apply_torque(&mut self, id: NodeId, torque: Vec3, dt: f32) -> Result<()> {
        self.node_mut(id)?.apply_torque(torque, dt)
    }

    pub fn model_matrix(&self, id: NodeId) -> Result<Mat4> {
        Ok(self.node(id)?.model_matrix())
    }
}
