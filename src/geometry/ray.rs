//! 射线测试
//!
//! - ray_aabb：slab 测试，只返回是否命中
//! - ray_triangle：Möller–Trumbore，返回交点

use glam::Vec3;

/// 射线-三角形测试的默认容差
pub const RAY_EPSILON: f32 = 1e-7;

/// 射线与 AABB 是否相交（slab 测试）
///
/// 方向分量恰好为 0 的轴不做除法，改为检查起点是否位于该轴的 slab 内。
pub fn ray_aabb(top_right: Vec3, bottom_left: Vec3, origin: Vec3, direction: Vec3) -> bool {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for i in 0..3 {
        if direction[i] == 0.0 {
            if origin[i] < bottom_left[i] || origin[i] > top_right[i] {
                return false;
            }
            continue;
        }

        let inv = 1.0 / direction[i];
        let t_low = (bottom_left[i] - origin[i]) * inv;
        let t_high = (top_right[i] - origin[i]) * inv;
        t_min = t_min.max(t_low.min(t_high));
        t_max = t_max.min(t_low.max(t_high));
    }

    t_min <= t_max && t_max >= 0.0
}

/// Möller–Trumbore 射线-三角形求交，返回交点
pub fn ray_triangle(
    origin: Vec3,
    direction: Vec3,
    triangle: &[Vec3; 3],
    epsilon: f32,
) -> Option<Vec3> {
    ray_triangle_distance(origin, direction, triangle, epsilon).map(|t| origin + direction * t)
}

/// 同 ray_triangle，但返回射线参数 t（交点 = origin + direction * t）
///
/// 平行于三角形平面（|det| < epsilon）的射线视为未命中。
/// u、v、u+v 的边界带 epsilon 容差，擦边命中不会被丢弃。
pub fn ray_triangle_distance(
    origin: Vec3,
    direction: Vec3,
    triangle: &[Vec3; 3],
    epsilon: f32,
) -> Option<f32> {
    let edge1 = triangle[1] - triangle[0];
    let edge2 = triangle[2] - triangle[0];
    let ray_cross = direction.cross(edge2);
    let det = edge1.dot(ray_cross);

    if det.abs() < epsilon {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - triangle[0];
    let u = s.dot(ray_cross) * inv_det;
    if u < -epsilon || u > 1.0 + epsilon {
        return None;
    }

    let s_cross = s.cross(edge1);
    let v = direction.dot(s_cross) * inv_det;
    if v < -epsilon || u + v > 1.0 + epsilon {
        return None;
    }

    let t = edge2.dot(s_cross) * inv_det;
    if t > epsilon {
        Some(t)
    } else {
        None
    }
}
