//! 碰撞检测
//!
//! - broad_bvh: 宽阶段动态 BVH
//! - collider: 碰撞体与缓存脏标志
//! - gjk: 窄阶段重叠测试
//! - collider_set: 碰撞体集合，串起每帧的宽/窄阶段
//! - response: 冲量与分离

mod broad_bvh;
mod collider;
mod collider_set;
pub mod gjk;
mod response;

pub use broad_bvh::{BroadBvh, BroadKind, BroadNode};
pub use collider::{Collider, ColliderDirty, ColliderMaterial, ColliderShape, Contact};
pub use collider_set::{ColliderSet, RayHit};
pub use gjk::{furthest_point, gjk, support_point, GjkResult, SupportPoint};
pub use response::resolve_contact;

/// 碰撞体下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub(crate) usize);

impl ColliderId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}
