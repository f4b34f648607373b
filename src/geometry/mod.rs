//! 几何工具
//!
//! 无依赖的基础计算：AABB 表面积与重叠、射线测试、SAT 分离轴。
//! 宽/窄阶段 BVH 与窄阶段测试都建立在这些函数之上。

mod aabb;
mod ray;
mod sat;

pub use aabb::{aabb_overlap, surface_area, Aabb, AABB_EPSILON};
pub use ray::{ray_aabb, ray_triangle, ray_triangle_distance, RAY_EPSILON};
pub use sat::{sat_axes, sat_penetration, SatContact, SAT_PARALLEL_EPSILON};
