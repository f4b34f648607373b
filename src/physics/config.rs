//! 物理配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use glam::Vec3;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// 全局重力加速度，默认 (0, -9.8, 0)
    pub gravity: Vec3,

    // ========== 窄阶段 ==========
    /// GJK 最大迭代次数，默认 20
    /// 超出后按“未碰撞”处理，不是错误
    pub gjk_max_iterations: usize,
    /// 宽阶段 AABB 重叠容差，默认 1e-7
    pub aabb_epsilon: f32,
    /// 射线-三角形容差，默认 1e-7
    pub ray_epsilon: f32,

    // ========== 关节 ==========
    /// RK4 允许的最大步长（秒），默认 0.022
    /// 超过此值时关节直接做位置修正
    pub rk4_max_dt: f32,
    /// 位移低于此值时关节视为已满足，默认 1e-7
    pub joint_min_displacement: f32,
    /// 新建关节的默认弹簧刚度，默认 1e5
    pub default_spring_constant: f32,

    // ========== 碰撞体材质默认值 ==========
    /// 静摩擦系数，默认 0.7
    pub static_friction: f32,
    /// 动摩擦系数，默认 0.3
    pub kinetic_friction: f32,
    /// 弹性系数，默认 0.1
    pub elasticity: f32,

    // ========== 宽阶段 ==========
    /// 插入后是否做 BVH 旋转（仅影响查询性能），默认 false
    pub bvh_rotations: bool,

    // ========== 碰撞响应 ==========
    /// 是否对接触施加冲量与分离，默认 true
    /// 关闭后只记录接触数据（触发器、音效等）
    pub collision_response: bool,

    // ========== 调试 ==========
    /// 是否输出逐帧调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),

            gjk_max_iterations: 20,
            aabb_epsilon: 1e-7,
            ray_epsilon: 1e-7,

            // 约 45 FPS 以下的帧不再用 RK4
            rk4_max_dt: 0.022,
            joint_min_displacement: 1e-7,
            default_spring_constant: 1e5,

            static_friction: 0.7,
            kinetic_friction: 0.3,
            elasticity: 0.1,

            bvh_rotations: false,
            collision_response: true,
            debug_log: false,
        }
    }
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> = Lazy::new(|| {
    RwLock::new(PhysicsConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    PHYSICS_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: PhysicsConfig) {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = PhysicsConfig::default();
}
