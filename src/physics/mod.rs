//! 刚体物理
//!
//! - config: 全局物理配置
//! - engine: 引擎级恒定力/加速度列表
//! - rigid_body: 刚体质量属性与速度增量

pub mod config;
mod engine;
mod rigid_body;

pub use config::{get_config, reset_config, set_config, PhysicsConfig};
pub use engine::PhysicsEngine;
pub use rigid_body::{RigidBody, INERTIA_EPSILON};
