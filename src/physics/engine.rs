//! 引擎级恒定力
//!
//! 每个步进内只读共享，所有刚体从同一组列表计算速度增量。

use glam::Vec3;

use super::config::get_config;

/// 恒定加速度、力与角加速度的集合
#[derive(Clone, Debug, Default)]
pub struct PhysicsEngine {
    /// 与质量无关的加速度（默认包含重力）
    pub accelerations: Vec<Vec3>,
    /// 按质量折算的恒定力
    pub forces: Vec<Vec3>,
    /// 角加速度
    pub rotational_accelerations: Vec<Vec3>,
}

impl PhysicsEngine {
    /// 使用配置中的重力创建
    pub fn new() -> Self {
        let config = get_config();
        Self::with_gravity(config.gravity)
    }

    pub fn with_gravity(gravity: Vec3) -> Self {
        let mut engine = Self::default();
        if gravity != Vec3::ZERO {
            engine.accelerations.push(gravity);
        }
        engine
    }

    /// 无任何恒定力（测试与纯约束场景）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 所有加速度之和
    #[inline]
    pub fn total_acceleration(&self) -> Vec3 {
        self.accelerations.iter().copied().sum()
    }

    /// 所有恒定力之和
    #[inline]
    pub fn total_force(&self) -> Vec3 {
        self.forces.iter().copied().sum()
    }

    #[inline]
    pub fn total_rotational_acceleration(&self) -> Vec3 {
        self.rotational_accelerations.iter().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravity_is_only_acceleration() {
        let engine = PhysicsEngine::with_gravity(Vec3::new(0.0, -9.8, 0.0));
        assert_eq!(engine.accelerations.len(), 1);
        assert!(engine.forces.is_empty());
        assert_eq!(engine.total_acceleration(), Vec3::new(0.0, -9.8, 0.0));
    }

    #[test]
    fn test_zero_gravity_adds_nothing() {
        let engine = PhysicsEngine::with_gravity(Vec3::ZERO);
        assert!(engine.accelerations.is_empty());
        assert_eq!(engine.total_acceleration(), Vec3::ZERO);
    }
}
