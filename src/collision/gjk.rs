//! GJK 重叠测试
//!
//! 在两组点的 Minkowski 差上迭代构造单纯形，判断原点是否被包含。
//! 单纯形按加入顺序存储，最新的点在末尾。

use glam::Vec3;

/// 四面体阶段判断原点在面外的容差（按单位法线计算的距离）
pub const GJK_EPSILON: f32 = 1e-4;

/// 搜索方向平方长度低于此值视为零（原点位于单纯形上）
const ZERO_DIRECTION: f32 = 1e-12;

/// Minkowski 差上的支撑点，同时记录来源点
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupportPoint {
    /// a - b
    pub point: Vec3,
    /// 第一组中的最远点
    pub a: Vec3,
    /// 第二组中（反方向）的最远点
    pub b: Vec3,
}

/// GJK 结果
#[derive(Clone, Debug, PartialEq)]
pub struct GjkResult {
    pub overlapping: bool,
    /// 终止时的单纯形
    pub simplex: Vec<SupportPoint>,
}

/// direction 方向上最远的点，并列时取第一个
pub fn furthest_point(points: &[Vec3], direction: Vec3) -> Option<Vec3> {
    let mut iter = points.iter().copied();
    let first = iter.next()?;
    let (best, _) = iter.fold((first, first.dot(direction)), |(best, best_dot), p| {
        let d = p.dot(direction);
        if d > best_dot {
            (p, d)
        } else {
            (best, best_dot)
        }
    });
    Some(best)
}

/// 支撑点：furthest(points1, d) - furthest(points2, -d)
pub fn support_point(points1: &[Vec3], points2: &[Vec3], direction: Vec3) -> Option<SupportPoint> {
    let a = furthest_point(points1, direction)?;
    let b = furthest_point(points2, -direction)?;
    Some(SupportPoint { point: a - b, a, b })
}

/// 两组点的凸包是否重叠
///
/// 初始方向为 centroid1 - centroid2。超过 max_iterations 按未重叠处理。
/// 判定偏向重叠：间距小于 GJK_EPSILON 的两组点也会返回重叠，
/// 由调用方的 SAT 深度检查过滤。
pub fn gjk(
    points1: &[Vec3],
    points2: &[Vec3],
    centroid1: Vec3,
    centroid2: Vec3,
    max_iterations: usize,
) -> GjkResult {
    let mut direction = centroid1 - centroid2;
    if direction.length_squared() < ZERO_DIRECTION {
        direction = Vec3::X;
    }

    let Some(first) = support_point(points1, points2, direction) else {
        return GjkResult { overlapping: false, simplex: Vec::new() };
    };
    let mut simplex = vec![first];
    direction = -first.point;

    for _ in 0..max_iterations {
        if direction.length_squared() < ZERO_DIRECTION {
            return GjkResult { overlapping: true, simplex };
        }

        // 两组都非空，支撑点一定存在
        let Some(next) = support_point(points1, points2, direction) else {
            break;
        };
        if next.point.dot(direction) < 0.0 {
            return GjkResult { overlapping: false, simplex };
        }

        simplex.push(next);
        match evolve_simplex(&mut simplex) {
            Some(d) => direction = d,
            None => return GjkResult { overlapping: true, simplex },
        }
    }

    GjkResult { overlapping: false, simplex }
}

/// 更新单纯形并返回新的搜索方向；原点被四面体包含时返回 None
fn evolve_simplex(simplex: &mut Vec<SupportPoint>) -> Option<Vec3> {
    match simplex.len() {
        2 => Some(line_direction(simplex)),
        3 => Some(triangle_direction(simplex)),
        _ => tetrahedron_direction(simplex),
    }
}

/// 垂直于线段、指向原点：(AB × AO) × AB
fn line_direction(simplex: &[SupportPoint]) -> Vec3 {
    let a = simplex[1].point;
    let ab = simplex[0].point - a;
    let ao = -a;
    ab.cross(ao).cross(ab)
}

/// 三角形法线，朝向原点
fn triangle_direction(simplex: &mut Vec<SupportPoint>) -> Vec3 {
    let a = simplex[2].point;
    let normal = (simplex[1].point - a).cross(simplex[0].point - a);
    if normal.length_squared() < ZERO_DIRECTION {
        // 三点共线，退回线段
        simplex.remove(0);
        return line_direction(simplex);
    }
    if normal.dot(-a) < 0.0 {
        -normal
    } else {
        normal
    }
}

/// 检查包含最新点 D 的三个面，原点在某个面外则丢弃该面的对顶点
fn tetrahedron_direction(simplex: &mut Vec<SupportPoint>) -> Option<Vec3> {
    let d = simplex[3].point;
    let [a, b, c] = [simplex[0].point, simplex[1].point, simplex[2].point];

    // (面的两个旧顶点, 对顶点, 对顶点下标)
    let faces = [(a, b, c, 2), (c, a, b, 1), (b, c, a, 0)];
    for (p, q, opposite, index) in faces {
        let mut normal = (p - d).cross(q - d);
        let length = normal.length();
        if length * length < ZERO_DIRECTION {
            continue;
        }
        if normal.dot(opposite - d) > 0.0 {
            normal = -normal;
        }
        if normal.dot(-d) / length > GJK_EPSILON {
            simplex.remove(index);
            return Some(normal);
        }
    }
    None
}
