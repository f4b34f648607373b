//! 网格数据
//!
//! 三角形索引缓冲 + 顶点位置，加载后不可变。
//! 构造时一次性派生局部 AABB、几何中心、半尺寸以及窄阶段 BVH。

mod narrow_bvh;

pub use narrow_bvh::{NarrowBvh, NarrowNode, Primitive};

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::Vec3;
use once_cell::sync::Lazy;

use crate::geometry::{ray_triangle_distance, Aabb};
use crate::{PhysicsError, Result};

/// 共享的 2×2×2 立方体（盒子碰撞体使用）
static CUBE: Lazy<Arc<Mesh>> = Lazy::new(|| Arc::new(Mesh::build_cube()));

/// 网格射线命中
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshHit {
    /// 三角形索引
    pub triangle: usize,
    /// 局部空间交点
    pub point: Vec3,
    /// 射线参数（交点 = origin + direction * distance）
    pub distance: f32,
}

/// 不可变三角网格
#[derive(Clone, Debug)]
pub struct Mesh {
    points: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    aabb: Aabb,
    bvh: NarrowBvh,
}

impl Mesh {
    /// 从顶点和三角形索引创建网格
    pub fn new(points: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Result<Self> {
        if points.is_empty() || triangles.is_empty() {
            return Err(PhysicsError::EmptyMesh);
        }
        for tri in &triangles {
            for &index in tri {
                if index as usize >= points.len() {
                    return Err(PhysicsError::IndexOutOfRange {
                        index: index as usize,
                        len: points.len(),
                    });
                }
            }
        }

        Ok(Self::from_parts(points, triangles))
    }

    /// 派生包围盒与 BVH（调用方保证缓冲已校验）
    fn from_parts(points: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let aabb = Aabb::from_points(points.iter().copied())
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

        let primitives = triangles
            .iter()
            .enumerate()
            .filter_map(|(index, tri)| {
                Aabb::from_points(tri.map(|i| points[i as usize]))
                    .map(|aabb| Primitive::new(index, aabb))
            })
            .collect();
        let bvh = NarrowBvh::build(primitives);

        Self { points, triangles, aabb, bvh }
    }

    /// 共享立方体网格，顶点范围 [-1, 1]
    pub fn cube() -> Arc<Mesh> {
        Arc::clone(&CUBE)
    }

    fn build_cube() -> Mesh {
        let points = Aabb::new(Vec3::ONE, -Vec3::ONE).corners().to_vec();
        // 角点顺序见 Aabb::corners
        #[rustfmt::skip]
        let triangles = vec![
            [0, 2, 1], [1, 2, 3], // -z
            [4, 5, 6], [5, 7, 6], // +z
            [0, 1, 4], [1, 5, 4], // -y
            [2, 6, 3], [3, 6, 7], // +y
            [0, 4, 2], [2, 4, 6], // -x
            [1, 3, 5], [3, 7, 5], // +x
        ];
        Mesh::from_parts(points, triangles)
    }

    #[inline]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    #[inline]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// 三角形的三个局部顶点
    #[inline]
    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        self.triangles[index].map(|i| self.points[i as usize])
    }

    /// 局部包围盒
    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn geometric_center(&self) -> Vec3 {
        self.aabb.center()
    }

    #[inline]
    pub fn half_dimensions(&self) -> Vec3 {
        self.aabb.half_dimensions()
    }

    /// 局部 AABB 的 8 个角点（OBB 的来源）
    #[inline]
    pub fn aabb_points(&self) -> [Vec3; 8] {
        self.aabb.corners()
    }

    #[inline]
    pub fn bvh(&self) -> &NarrowBvh {
        &self.bvh
    }

    /// 局部空间射线求交，返回最近命中
    pub fn raycast(&self, origin: Vec3, direction: Vec3, epsilon: f32) -> Option<MeshHit> {
        self.bvh
            .raycast(origin, direction, |index| {
                ray_triangle_distance(origin, direction, &self.triangle(index), epsilon)
            })
            .map(|(triangle, distance)| MeshHit {
                triangle,
                point: origin + direction * distance,
                distance,
            })
    }

    /// 与局部区域重叠的三角形所用到的顶点（去重，按索引排序）
    pub fn points_near(&self, region: &Aabb) -> Vec<Vec3> {
        let indices: BTreeSet<u32> = self
            .bvh
            .query(region)
            .into_iter()
            .flat_map(|tri| self.triangles[tri])
            .collect();
        indices.into_iter().map(|i| self.points[i as usize]).collect()
    }
}
