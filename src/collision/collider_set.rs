//! 碰撞体集合
//!
//! 每帧流程：
//! 1. sync：读取节点变换变更，标脏并批量刷新宽阶段叶子
//! 2. broad_pairs：宽阶段候选对（过滤同节点、同分组、双静态）
//! 3. narrow：GJK 判定 + SAT 求法线与深度
//! 4. collide：记录接触并施加响应

use glam::Vec3;

use super::broad_bvh::BroadBvh;
use super::collider::{Collider, ColliderDirty, ColliderMaterial, ColliderShape, Contact};
use super::gjk::gjk;
use super::response::resolve_contact;
use super::ColliderId;
use crate::geometry::{sat_axes, sat_penetration, SatContact};
use crate::physics::get_config;
use crate::scene::{NodeId, NodeSet};
use crate::{PhysicsError, Result};

/// 场景射线命中
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub collider: ColliderId,
    pub node: NodeId,
    /// 世界空间交点
    pub point: Vec3,
    /// 起点到交点的世界距离
    pub distance: f32,
}

/// 碰撞体竞技场 + 宽阶段 BVH
#[derive(Clone, Debug, Default)]
pub struct ColliderSet {
    colliders: Vec<Option<Collider>>,
    free: Vec<usize>,
    bvh: BroadBvh,
}

impl ColliderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bvh(bvh: BroadBvh) -> Self {
        Self {
            colliders: Vec::new(),
            free: Vec::new(),
            bvh,
        }
    }

    #[inline]
    pub fn bvh(&self) -> &BroadBvh {
        &self.bvh
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bvh.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bvh.is_empty()
    }

    #[inline]
    pub fn get(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(id.0).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ColliderId) -> Option<&mut Collider> {
        self.colliders.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collider> {
        self.colliders.iter().flatten()
    }

    /// 某个碰撞体本帧的接触
    pub fn collisions(&self, id: ColliderId) -> Result<&[Contact]> {
        self.get(id)
            .map(Collider::collisions)
            .ok_or(PhysicsError::UnknownCollider(id))
    }

    // ========================================
    // 添加与删除
    // ========================================

    /// 为节点添加碰撞体并插入宽阶段
    pub fn add(
        &mut self,
        nodes: &mut NodeSet,
        node: NodeId,
        shape: ColliderShape,
        material: ColliderMaterial,
    ) -> Result<ColliderId> {
        let owner = nodes.node_mut(node)?;
        if owner.collider.is_some() {
            return Err(PhysicsError::ColliderAlreadyAttached(node));
        }

        let slot = self.free.last().copied().unwrap_or(self.colliders.len());
        let id = ColliderId(slot);
        let mut collider = Collider::new(id, owner, shape, material)?;

        collider.leaf = Some(self.bvh.insert(id, collider.aabb()));
        collider.clear_dirty(ColliderDirty::BVH);
        owner.collider = Some(id);

        if slot == self.colliders.len() {
            self.colliders.push(Some(collider));
        } else {
            self.free.pop();
            self.colliders[slot] = Some(collider);
        }
        Ok(id)
    }

    /// 删除碰撞体并从宽阶段移除
    pub fn remove(&mut self, nodes: &mut NodeSet, id: ColliderId) -> Result<Collider> {
        let collider = self
            .colliders
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(PhysicsError::UnknownCollider(id))?;

        if let Some(leaf) = collider.leaf {
            self.bvh.remove(leaf);
        }
        if let Some(owner) = nodes.get_mut(collider.node()) {
            owner.collider = None;
        }
        self.free.push(id.0);
        Ok(collider)
    }

    // ========================================
    // 刷新
    // ========================================

    /// 标记碰撞体缓存失效
    pub fn notify(&mut self, id: ColliderId, flags: ColliderDirty) {
        if let Some(collider) = self.get_mut(id) {
            collider.mark_dirty(flags);
        }
    }

    /// 读取节点变换变更并刷新，返回重新插入宽阶段的碰撞体数量
    pub fn sync(&mut self, nodes: &mut NodeSet) -> usize {
        for (node, change) in nodes.take_changes() {
            if let Some(collider) = nodes.get(node).and_then(|n| n.collider()) {
                self.notify(collider, ColliderDirty::from_change(change));
            }
        }
        self.flush(nodes)
    }

    /// 重算脏缓存，BVH 脏的叶子删除后重新插入
    pub fn flush(&mut self, nodes: &NodeSet) -> usize {
        let mut reinserted = 0;
        for collider in self.colliders.iter_mut().flatten() {
            if collider.dirty().is_empty() {
                continue;
            }
            let Some(node) = nodes.get(collider.node()) else {
                continue;
            };
            collider.refresh(node);

            if collider.dirty().contains(ColliderDirty::BVH) {
                let leaf = match collider.leaf {
                    Some(leaf) => self.bvh.refresh(leaf, collider.aabb()),
                    None => Some(self.bvh.insert(collider.id(), collider.aabb())),
                };
                collider.leaf = leaf;
                collider.clear_dirty(ColliderDirty::BVH);
                reinserted += 1;
            }
        }
        reinserted
    }

    // ========================================
    // 宽阶段
    // ========================================

    /// 宽阶段候选对
    pub fn broad_pairs(&self, nodes: &NodeSet) -> Vec<(ColliderId, ColliderId)> {
        self.bvh
            .pairs()
            .into_iter()
            .filter(|&(a, b)| self.should_test(nodes, a, b))
            .collect()
    }

    fn should_test(&self, nodes: &NodeSet, a: ColliderId, b: ColliderId) -> bool {
        let (Some(ca), Some(cb)) = (self.get(a), self.get(b)) else {
            return false;
        };
        if ca.node() == cb.node() || ca.material.shares_group(&cb.material) {
            return false;
        }
        match (nodes.get(ca.node()), nodes.get(cb.node())) {
            (Some(na), Some(nb)) => !(na.is_static && nb.is_static),
            _ => false,
        }
    }

    // ========================================
    // 窄阶段
    // ========================================

    /// 精确测试一对碰撞体，返回由 a 指向 b 的法线与穿透深度
    pub fn narrow(&self, nodes: &NodeSet, a: ColliderId, b: ColliderId) -> Option<SatContact> {
        let (ca, cb) = (self.get(a)?, self.get(b)?);
        let (na, nb) = (nodes.get(ca.node())?, nodes.get(cb.node())?);

        let region = ca.aabb().intersection(&cb.aabb())?;
        let points_a = ca.narrow_points(&na.model_matrix(), &region);
        let points_b = cb.narrow_points(&nb.model_matrix(), &region);
        if points_a.is_empty() || points_b.is_empty() {
            return None;
        }

        let config = get_config();
        let result = gjk(
            &points_a,
            &points_b,
            ca.aabb().center(),
            cb.aabb().center(),
            config.gjk_max_iterations,
        );
        if !result.overlapping {
            return None;
        }

        let axes = sat_axes(na.rotation(), nb.rotation());
        sat_penetration(&points_a, &points_b, &axes)
    }

    /// 完整的碰撞阶段：清空上一帧接触 → 宽阶段 → 窄阶段 → 记录与响应
    ///
    /// 返回本帧接触对数量。
    pub fn collide(&mut self, nodes: &mut NodeSet) -> usize {
        let config = get_config();
        for collider in self.colliders.iter_mut().flatten() {
            collider.clear_collisions();
        }

        let mut count = 0;
        for (a, b) in self.broad_pairs(nodes) {
            let Some(contact) = self.narrow(nodes, a, b) else {
                continue;
            };
            let (Some(ca), Some(cb)) = (self.get(a), self.get(b)) else {
                continue;
            };
            let (node_a, node_b) = (ca.node(), cb.node());
            let (material_a, material_b) = (ca.material, cb.material);

            let Some((na, nb)) = nodes.pair_mut(node_a, node_b) else {
                continue;
            };
            let relative = nb.velocity - na.velocity;

            if let Some(ca) = self.get_mut(a) {
                ca.record(Contact {
                    other: node_b,
                    other_collider: b,
                    normal: contact.normal,
                    relative_velocity: relative,
                    depth: contact.depth,
                });
            }
            if let Some(cb) = self.get_mut(b) {
                cb.record(Contact {
                    other: node_a,
                    other_collider: a,
                    normal: -contact.normal,
                    relative_velocity: -relative,
                    depth: contact.depth,
                });
            }

            if config.collision_response {
                resolve_contact(na, nb, &material_a, &material_b, contact.normal, contact.depth);
            }
            count += 1;
        }

        if config.debug_log {
            log::debug!("碰撞阶段: {} 个碰撞体, {} 对接触", self.len(), count);
        }
        count
    }

    // ========================================
    // 射线
    // ========================================

    /// 场景射线检测，返回最近命中
    pub fn raycast(&self, nodes: &NodeSet, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        let epsilon = get_config().ray_epsilon;
        let mut best: Option<(f32, RayHit)> = None;

        for id in self.bvh.query_ray(origin, direction) {
            let Some(collider) = self.get(id) else {
                continue;
            };
            let Some(node) = nodes.get(collider.node()) else {
                continue;
            };

            let model = node.model_matrix();
            if model.determinant().abs() < f32::EPSILON {
                log::trace!("节点 {:?} 的模型矩阵不可逆，射线跳过", collider.node());
                continue;
            }
            let inverse = model.inverse();
            let local_origin = inverse.transform_point3(origin);
            let local_direction = inverse.transform_vector3(direction);

            // 仿射变换保持射线参数 t 不变
            let Some(hit) = collider.mesh().raycast(local_origin, local_direction, epsilon) else {
                continue;
            };
            if best.map_or(true, |(t, _)| hit.distance < t) {
                let point = model.transform_point3(hit.point);
                best = Some((
                    hit.distance,
                    RayHit {
                        collider: id,
                        node: collider.node(),
                        point,
                        distance: (point - origin).length(),
                    },
                ));
            }
        }

        best.map(|(_, hit)| hit)
    }
}
