//! 分离轴（SAT）
//!
//! OBB-OBB 最多 15 个候选轴：两边各 3 个面法线 + 9 个边叉积。
//! 窄阶段中 GJK 判定重叠后，用这些轴求最小穿透方向与深度。

use glam::{Mat3, Quat, Vec3};

/// 叉积平方长度低于此值视为平行边，不产生新轴
pub const SAT_PARALLEL_EPSILON: f32 = 1e-6;

/// SAT 穿透结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SatContact {
    /// 最小穿透轴（单位向量，由第一组点指向第二组点）
    pub normal: Vec3,
    /// 沿该轴的重叠长度
    pub depth: f32,
}

/// 由两个朝向生成 SAT 候选轴
pub fn sat_axes(rotation1: Quat, rotation2: Quat) -> Vec<Vec3> {
    let m1 = Mat3::from_quat(rotation1);
    let m2 = Mat3::from_quat(rotation2);
    let faces1 = [m1.x_axis, m1.y_axis, m1.z_axis];
    let faces2 = [m2.x_axis, m2.y_axis, m2.z_axis];

    let mut axes = Vec::with_capacity(15);
    axes.extend_from_slice(&faces1);
    axes.extend_from_slice(&faces2);

    for a in &faces1 {
        for b in &faces2 {
            let cross = a.cross(*b);
            if cross.length_squared() < SAT_PARALLEL_EPSILON {
                continue;
            }
            axes.push(cross.normalize());
        }
    }

    axes
}

/// 在给定轴上做 SAT，返回最小穿透；任一轴分离则返回 None
pub fn sat_penetration(points1: &[Vec3], points2: &[Vec3], axes: &[Vec3]) -> Option<SatContact> {
    if points1.is_empty() || points2.is_empty() {
        return None;
    }

    let mut best: Option<SatContact> = None;

    for &axis in axes {
        let (min1, max1) = project(points1, axis);
        let (min2, max2) = project(points2, axis);

        // 把第二组沿 +axis 推出 / 沿 -axis 推出 所需的距离
        let forward = max1 - min2;
        let backward = max2 - min1;
        if forward < 0.0 || backward < 0.0 {
            return None;
        }

        let (depth, normal) = if forward <= backward { (forward, axis) } else { (backward, -axis) };
        if best.map_or(true, |b| depth < b.depth) {
            best = Some(SatContact { normal, depth });
        }
    }

    best
}

fn project(points: &[Vec3], axis: Vec3) -> (f32, f32) {
    points.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}
