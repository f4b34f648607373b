//! 骨骼系统
//!
//! - joint: 关节与弹簧阻尼核心
//! - bone: 绑定场景节点的骨骼
//! - skeleton_set: 骨骼 arena 与自顶向下的约束求解

mod bone;
mod joint;
mod skeleton_set;

pub use bone::Bone;
pub use joint::{spring_damper_rk4, Joint, JointKind, RK4_MAX_SUBSTEPS};
pub use skeleton_set::SkeletonSet;

/// 骨骼下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub(crate) usize);

impl BoneId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}
