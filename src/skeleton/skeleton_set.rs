//! 骨骼集合
//!
//! 所有骨骼存放在一个 arena 中，关节由父骨骼持有。
//! 顶层列表只保存根骨骼，update 从每个根开始自顶向下递归约束。

use glam::Quat;

use super::{Bone, BoneId, Joint};
use crate::physics::{get_config, PhysicsConfig};
use crate::scene::{NodeId, NodeSet};
use crate::{PhysicsError, Result};

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct SkeletonSet {
    bones: Vec<Bone>,
    roots: Vec<BoneId>,
}

impl SkeletonSet {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // 构建
    // ========================================

    /// 创建骨骼但不加入顶层列表
    pub fn create(&mut self, nodes: &NodeSet, node: NodeId) -> Result<BoneId> {
        let id = BoneId(self.bones.len());
        self.bones.push(Bone::new(id, nodes.node(node)?));
        Ok(id)
    }

    /// 创建骨骼并作为新骨架的根
    pub fn add_root(&mut self, nodes: &NodeSet, node: NodeId) -> Result<BoneId> {
        let id = self.create(nodes, node)?;
        self.roots.push(id);
        Ok(id)
    }

    /// 创建骨骼并用关节连接到 parent 下
    pub fn add_bone(
        &mut self,
        nodes: &NodeSet,
        parent: BoneId,
        node: NodeId,
        joint: Joint,
    ) -> Result<BoneId> {
        let parent_node = self.bone(parent)?.node();
        if parent_node == node {
            return Err(PhysicsError::SharedBoneNode(node));
        }
        let id = self.create(nodes, node)?;
        self.attach(parent, id, joint)?;
        Ok(id)
    }

    /// 把已有骨骼连接到 parent 下
    ///
    /// 子骨骼不能已有父骨骼，不能是 parent 的祖先，
    /// 也不能与 parent 绑定同一节点。刚度必须合法。
    /// 若子骨骼原本是根，会从顶层列表移除。
    pub fn attach(&mut self, parent: BoneId, child: BoneId, joint: Joint) -> Result<()> {
        let parent_node = self.bone(parent)?.node();
        let child_bone = self.bone(child)?;
        if child_bone.parent.is_some() {
            return Err(PhysicsError::BoneAlreadyAttached(child));
        }
        if child_bone.node() == parent_node && parent != child {
            return Err(PhysicsError::SharedBoneNode(parent_node));
        }
        if !(joint.spring_constant.is_finite() && joint.spring_constant >= 0.0) {
            return Err(PhysicsError::InvalidSpringConstant(joint.spring_constant));
        }

        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(PhysicsError::SkeletonCycle { parent, child });
            }
            cursor = self.bones[current.0].parent;
        }

        self.bones[child.0].parent = Some(parent);
        self.bones[parent.0].joints.push((child, joint));
        self.roots.retain(|&root| root != child);

        log::debug!("骨骼连接: {:?} -> {:?}", parent, child);
        Ok(())
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn roots(&self) -> &[BoneId] {
        &self.roots
    }

    pub fn get(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    pub fn bone(&self, id: BoneId) -> Result<&Bone> {
        self.get(id).ok_or(PhysicsError::UnknownBone(id))
    }

    /// 可修改关节参数（弹簧系数、固定标志）
    pub fn joint_mut(&mut self, parent: BoneId, child: BoneId) -> Option<&mut Joint> {
        self.bones
            .get_mut(parent.0)?
            .joints
            .iter_mut()
            .find(|(c, _)| *c == child)
            .map(|(_, joint)| joint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bone> {
        self.bones.iter()
    }

    // ========================================
    // 更新
    // ========================================

    /// 从每个根骨骼开始约束整棵骨架
    pub fn update(&mut self, nodes: &mut NodeSet, dt: f32) -> Result<()> {
        let config = get_config();
        if dt > config.rk4_max_dt && self.bones.iter().any(|b| !b.joints.is_empty()) {
            log::warn!(
                "dt = {:.4}s 超过 RK4 上限 {:.4}s，关节改用位置修正",
                dt,
                config.rk4_max_dt
            );
        }

        for i in 0..self.roots.len() {
            let root = self.roots[i];
            Self::update_recursive(&mut self.bones, nodes, root, dt, &config)?;
        }
        Ok(())
    }

    /// 约束一根骨骼的所有关节，然后递归到子骨骼
    fn update_recursive(
        bones: &mut [Bone],
        nodes: &mut NodeSet,
        id: BoneId,
        dt: f32,
        config: &PhysicsConfig,
    ) -> Result<()> {
        let Some(bone) = bones.get(id.0) else {
            return Err(PhysicsError::UnknownBone(id));
        };
        let parent_node = bone.node();
        let parent_delta = bone.rotation_delta(nodes.node(parent_node)?);

        // 先读取所有子骨骼的旋转增量
        let children = bone
            .joints
            .iter()
            .map(|(child, _)| {
                let child_bone = bones.get(child.0).ok_or(PhysicsError::UnknownBone(*child))?;
                let node = child_bone.node();
                Ok((*child, node, child_bone.rotation_delta(nodes.node(node)?)))
            })
            .collect::<Result<Vec<(BoneId, NodeId, Quat)>>>()?;

        let joints = &mut bones[id.0].joints;
        for ((_, joint), &(_, _, child_delta)) in joints.iter_mut().zip(&children) {
            joint.rotate_parent_offset(parent_delta);
            joint.rotate_child_offset(child_delta);
        }

        for ((_, joint), &(_, child_node, _)) in joints.iter().zip(&children) {
            let (parent, child) = nodes
                .pair_mut(parent_node, child_node)
                .ok_or(PhysicsError::UnknownNode(child_node))?;
            joint.restrict(parent, child, dt, config)?;
        }

        for (child, _, _) in children {
            Self::update_recursive(bones, nodes, child, dt, config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsEngine;
    use crate::scene::NodeBuilder;
    use glam::Vec3;

    fn chain(nodes: &mut NodeSet, skeletons: &mut SkeletonSet) -> (BoneId, BoneId, BoneId) {
        let a = nodes.add(NodeBuilder::new("a"));
        let hanging = |name: &str| {
            NodeBuilder::new(name)
                .position(Vec3::new(0.0, -1.0, 0.0))
                .with_physics(1.0)
                .unwrap()
        };
        let b = nodes.add(hanging("b"));
        let c = nodes.add(hanging("c"));

        // 只有静态根带偏移，带刚体的骨骼偏移为零，不产生力矩
        let root = skeletons.add_root(nodes, a).unwrap();
        let hang = Joint::ball(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 100.0).unwrap();
        let mid = skeletons.add_bone(nodes, root, b, hang).unwrap();
        let link = Joint::ball(Vec3::ZERO, Vec3::ZERO, 100.0).unwrap();
        let tip = skeletons.add_bone(nodes, mid, c, link).unwrap();
        (root, mid, tip)
    }

    #[test]
    fn test_build_chain() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let (root, mid, tip) = chain(&mut nodes, &mut skeletons);

        assert_eq!(skeletons.len(), 3);
        assert_eq!(skeletons.roots(), &[root]);
        assert_eq!(skeletons.bone(tip).unwrap().parent(), Some(mid));
        assert_eq!(skeletons.bone(root).unwrap().children().collect::<Vec<_>>(), vec![mid]);
    }

    #[test]
    fn test_attach_rejects_double_parent_and_cycles() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let (root, _, tip) = chain(&mut nodes, &mut skeletons);
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();

        assert!(matches!(
            skeletons.attach(root, tip, joint.clone()),
            Err(PhysicsError::BoneAlreadyAttached(b)) if b == tip
        ));
        assert!(matches!(
            skeletons.attach(tip, root, joint.clone()),
            Err(PhysicsError::SkeletonCycle { .. })
        ));
        assert!(matches!(
            skeletons.attach(root, root, joint.clone()),
            Err(PhysicsError::SkeletonCycle { .. })
        ));
        assert!(matches!(
            skeletons.attach(BoneId(42), root, joint),
            Err(PhysicsError::UnknownBone(_))
        ));
    }

    #[test]
    fn test_attach_detached_and_root() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let n1 = nodes.add(NodeBuilder::new("1"));
        let n2 = nodes.add(NodeBuilder::new("2"));

        let first = skeletons.add_root(&nodes, n1).unwrap();
        let second = skeletons.add_root(&nodes, n2).unwrap();
        assert_eq!(skeletons.roots().len(), 2);

        // 根骨骼被挂到别的骨架下后不再是根
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();
        skeletons.attach(first, second, joint).unwrap();
        assert_eq!(skeletons.roots(), &[first]);

        let detached = skeletons.create(&nodes, n2).unwrap();
        assert!(!skeletons.roots().contains(&detached));
    }

    #[test]
    fn test_update_holds_chain_together() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let (_, mid, tip) = chain(&mut nodes, &mut skeletons);
        let mid_node = skeletons.bone(mid).unwrap().node();
        let tip_node = skeletons.bone(tip).unwrap().node();

        // 把链条拉开再松手
        nodes.get_mut(mid_node).unwrap().set_position(Vec3::new(0.1, -1.0, 0.0));
        nodes.get_mut(tip_node).unwrap().set_position(Vec3::new(0.2, -1.1, 0.0));

        let engine = PhysicsEngine::empty();
        for _ in 0..400 {
            nodes.integrate(&engine, 0.016);
            skeletons.update(&mut nodes, 0.016).unwrap();
        }

        let mid_pos = nodes.get(mid_node).unwrap().position();
        let tip_pos = nodes.get(tip_node).unwrap().position();
        assert!((mid_pos - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-2);
        assert!((tip_pos - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-2);
    }

    #[test]
    fn test_joint_offsets_follow_parent_rotation() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let parent = nodes.add(NodeBuilder::new("p"));
        let child = nodes.add(NodeBuilder::new("c").position(Vec3::new(0.0, -1.0, 0.0)));
        let root = skeletons.add_root(&nodes, parent).unwrap();
        let joint = Joint::ball(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 100.0).unwrap();
        let bone = skeletons.add_bone(&nodes, root, child, joint).unwrap();

        // 父节点绕 z 转 90°，偏移按 q⁻¹·v·q 旋转
        let q = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        nodes.get_mut(parent).unwrap().set_rotation(q);
        skeletons.update(&mut nodes, 0.016).unwrap();

        let offset = skeletons.joint_mut(root, bone).unwrap().parent_offset;
        let expected = q.inverse() * Vec3::new(0.0, -1.0, 0.0);
        assert!((offset - expected).length() < 1e-6);
        // 子节点没有刚体：直接吸附到父连接点
        assert!((nodes.get(child).unwrap().position() - expected).length() < 1e-6);
    }

    #[test]
    fn test_attach_rejects_shared_node() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let shared = nodes.add(NodeBuilder::new("shared"));
        let root = skeletons.add_root(&nodes, shared).unwrap();
        let joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();

        assert!(matches!(
            skeletons.add_bone(&nodes, root, shared, joint.clone()),
            Err(PhysicsError::SharedBoneNode(n)) if n == shared
        ));
        assert_eq!(skeletons.len(), 1);

        let twin = skeletons.create(&nodes, shared).unwrap();
        assert!(matches!(
            skeletons.attach(root, twin, joint),
            Err(PhysicsError::SharedBoneNode(_))
        ));
        assert!(skeletons.bone(twin).unwrap().is_root());
        assert!(skeletons.bone(root).unwrap().joints().is_empty());
        skeletons.update(&mut nodes, 0.016).unwrap();
    }

    #[test]
    fn test_attach_rejects_invalid_spring_constant() {
        let mut nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        let a = nodes.add(NodeBuilder::new("a"));
        let b = nodes.add(NodeBuilder::new("b"));
        let root = skeletons.add_root(&nodes, a).unwrap();
        let child = skeletons.create(&nodes, b).unwrap();

        let mut joint = Joint::ball(Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();
        joint.spring_constant = f32::NAN;
        assert!(matches!(
            skeletons.attach(root, child, joint),
            Err(PhysicsError::InvalidSpringConstant(_))
        ));
    }

    #[test]
    fn test_update_unknown_node_fails() {
        let nodes = NodeSet::new();
        let mut skeletons = SkeletonSet::new();
        assert!(skeletons.add_root(&nodes, NodeId(3)).is_err());
    }
}
