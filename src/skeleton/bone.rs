//! 骨骼
//!
//! Bone 绑定一个场景节点，并持有连接到子骨骼的关节。
//! 创建时记录节点朝向的逆，之后用 `当前朝向 × 初始逆朝向` 得到旋转增量。

use glam::Quat;

use super::{BoneId, Joint};
use crate::scene::{Node, NodeId};

/// 骨骼
#[derive(Clone, Debug)]
pub struct Bone {
    pub(crate) id: BoneId,
    node: NodeId,
    original_inverse_rotation: Quat,
    /// (子骨骼, 关节)
    pub(crate) joints: Vec<(BoneId, Joint)>,
    pub(crate) parent: Option<BoneId>,
}

impl Bone {
    pub(crate) fn new(id: BoneId, node: &Node) -> Self {
        Self {
            id,
            node: node.id(),
            original_inverse_rotation: node.rotation().inverse(),
            joints: Vec::new(),
            parent: None,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn id(&self) -> BoneId {
        self.id
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn joints(&self) -> &[(BoneId, Joint)] {
        &self.joints
    }

    pub fn children(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.joints.iter().map(|(child, _)| *child)
    }

    #[inline]
    pub fn original_inverse_rotation(&self) -> Quat {
        self.original_inverse_rotation
    }

    /// 相对创建时的旋转增量
    #[inline]
    pub fn rotation_delta(&self, node: &Node) -> Quat {
        node.rotation() * self.original_inverse_rotation
    }
}
