//! 碰撞响应
//!
//! 法向冲量 + 库仑摩擦 + 按质量倒数分配的位置分离。
//! 静态节点与没有刚体的节点质量视为无穷大。

use glam::Vec3;

use super::ColliderMaterial;
use crate::scene::Node;

/// 切向速度平方低于此值时不计算摩擦
const TANGENT_EPSILON: f32 = 1e-10;

/// 对一对接触施加冲量与分离
///
/// `normal` 由 a 指向 b（单位向量），`depth` 为穿透深度。
/// 返回施加的法向冲量大小（两者都是无穷质量时为 0）。
pub fn resolve_contact(
    a: &mut Node,
    b: &mut Node,
    material_a: &ColliderMaterial,
    material_b: &ColliderMaterial,
    normal: Vec3,
    depth: f32,
) -> f32 {
    let inv_a = a.inverse_mass();
    let inv_b = b.inverse_mass();
    let inv_sum = inv_a + inv_b;
    if inv_sum <= 0.0 {
        return 0.0;
    }

    let relative = b.velocity - a.velocity;
    let normal_speed = relative.dot(normal);

    let mut impulse = 0.0;
    // 只处理相互接近的情况
    if normal_speed < 0.0 {
        let elasticity = material_a.elasticity.min(material_b.elasticity);
        impulse = -(1.0 + elasticity) * normal_speed / inv_sum;
        a.velocity -= normal * (impulse * inv_a);
        b.velocity += normal * (impulse * inv_b);

        apply_friction(a, b, material_a, material_b, normal, impulse, inv_a, inv_b);
    }

    if depth > 0.0 {
        let correction = normal * (depth / inv_sum);
        if inv_a > 0.0 {
            a.set_position(a.position() - correction * inv_a);
        }
        if inv_b > 0.0 {
            b.set_position(b.position() + correction * inv_b);
        }
    }

    impulse
}

/// 库仑摩擦：能在静摩擦范围内停下切向运动就停下，否则按动摩擦滑动
#[allow(clippy::too_many_arguments)]
fn apply_friction(
    a: &mut Node,
    b: &mut Node,
    material_a: &ColliderMaterial,
    material_b: &ColliderMaterial,
    normal: Vec3,
    normal_impulse: f32,
    inv_a: f32,
    inv_b: f32,
) {
    let relative = b.velocity - a.velocity;
    let tangent = relative - normal * relative.dot(normal);
    if tangent.length_squared() < TANGENT_EPSILON {
        return;
    }
    let tangent = tangent.normalize();

    let static_friction = (material_a.static_friction * material_b.static_friction).sqrt();
    let kinetic_friction = (material_a.kinetic_friction * material_b.kinetic_friction).sqrt();

    // 完全停下切向运动所需的冲量
    let stopping = -relative.dot(tangent) / (inv_a + inv_b);
    let friction = if stopping.abs() <= static_friction * normal_impulse {
        stopping
    } else {
        -kinetic_friction * normal_impulse
    };

    a.velocity -= tangent * (friction * inv_a);
    b.velocity += tangent * (friction * inv_b);
}
