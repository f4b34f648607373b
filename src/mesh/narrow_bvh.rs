//! 窄阶段静态 BVH
//!
//! 每个网格加载时构建一次，之后不再修改（网格数据加载后不可变）。
//! 构建方式近似 SAH：每个轴按三角形质心排序、从中间计数处切分，
//! 取两侧包围盒表面积之和最小的轴；代价相同时优先轴 0 < 1 < 2。

use glam::Vec3;

use crate::geometry::{ray_aabb, Aabb};

/// BVH 叶子负载：一个三角形的索引及其预计算 AABB
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Primitive {
    /// 网格中的三角形索引
    pub index: usize,
    /// 三角形的局部空间包围盒
    pub aabb: Aabb,
}

impl Primitive {
    pub fn new(index: usize, aabb: Aabb) -> Self {
        Self { index, aabb }
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.aabb.center()
    }
}

/// BVH 节点（数组下标寻址）
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NarrowNode {
    Internal { aabb: Aabb, a: usize, b: usize },
    Leaf { aabb: Aabb, primitive: usize },
}

impl NarrowNode {
    #[inline]
    pub fn aabb(&self) -> &Aabb {
        match self {
            NarrowNode::Internal { aabb, .. } | NarrowNode::Leaf { aabb, .. } => aabb,
        }
    }
}

/// 网格三角形的静态 BVH
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NarrowBvh {
    nodes: Vec<NarrowNode>,
    primitives: Vec<Primitive>,
    root: Option<usize>,
}

impl NarrowBvh {
    /// 构建 BVH，空输入得到空树
    pub fn build(primitives: Vec<Primitive>) -> Self {
        let mut bvh = Self {
            nodes: Vec::with_capacity(primitives.len() * 2),
            primitives,
            root: None,
        };
        if !bvh.primitives.is_empty() {
            let group: Vec<usize> = (0..bvh.primitives.len()).collect();
            bvh.root = Some(bvh.build_recursive(group));
        }
        bvh
    }

    fn build_recursive(&mut self, mut group: Vec<usize>) -> usize {
        let count = group.len() / 2;
        if count == 0 {
            let primitive = group[0];
            self.nodes.push(NarrowNode::Leaf {
                aabb: self.primitives[primitive].aabb,
                primitive,
            });
            return self.nodes.len() - 1;
        }

        let (mut best_cost, mut left_box, mut right_box) = self.split_cost(&mut group, 0, count);
        let mut best_split = group.clone();
        for axis in 1..3 {
            let (cost, left, right) = self.split_cost(&mut group, axis, count);
            if cost < best_cost {
                best_cost = cost;
                left_box = left;
                right_box = right;
                best_split.copy_from_slice(&group);
            }
        }

        let right_half = best_split.split_off(count);
        let a = self.build_recursive(best_split);
        let b = self.build_recursive(right_half);
        self.nodes.push(NarrowNode::Internal {
            aabb: left_box.union(&right_box),
            a,
            b,
        });
        self.nodes.len() - 1
    }

    /// 按 axis 上的质心排序并在 count 处切分，返回 (代价, 左盒, 右盒)
    fn split_cost(&self, group: &mut [usize], axis: usize, count: usize) -> (f32, Aabb, Aabb) {
        let primitives = &self.primitives;
        group.sort_by(|&i, &j| {
            primitives[i].centroid()[axis].total_cmp(&primitives[j].centroid()[axis])
        });
        let left = self.group_aabb(&group[..count]);
        let right = self.group_aabb(&group[count..]);
        (left.surface_area() + right.surface_area(), left, right)
    }

    fn group_aabb(&self, group: &[usize]) -> Aabb {
        let first = self.primitives[group[0]].aabb;
        group[1..]
            .iter()
            .fold(first, |acc, &i| acc.union(&self.primitives[i].aabb))
    }

    #[inline]
    pub fn root(&self) -> Option<&NarrowNode> {
        self.root.map(|r| &self.nodes[r])
    }

    #[inline]
    pub fn nodes(&self) -> &[NarrowNode] {
        &self.nodes
    }

    #[inline]
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// 根包围盒
    pub fn aabb(&self) -> Option<Aabb> {
        self.root().map(|n| *n.aabb())
    }

    /// 深度（单个叶子为 1）
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[NarrowNode], idx: usize) -> usize {
            match nodes[idx] {
                NarrowNode::Leaf { .. } => 1,
                NarrowNode::Internal { a, b, .. } => 1 + walk(nodes, a).max(walk(nodes, b)),
            }
        }
        self.root.map_or(0, |r| walk(&self.nodes, r))
    }

    /// 与局部空间区域重叠的所有三角形索引
    pub fn query(&self, region: &Aabb) -> Vec<usize> {
        let mut result = Vec::new();
        let Some(root) = self.root else {
            return result;
        };

        let mut stack = Vec::with_capacity(32);
        stack.push(root);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.aabb().overlaps(region) {
                continue;
            }
            match *node {
                NarrowNode::Leaf { primitive, .. } => result.push(self.primitives[primitive].index),
                NarrowNode::Internal { a, b, .. } => {
                    stack.push(b);
                    stack.push(a);
                }
            }
        }
        result
    }

    /// 最近射线命中
    ///
    /// `hit_test` 对三角形索引做精确测试，返回射线参数 t。
    /// 返回 (三角形索引, t)。
    pub fn raycast<F>(&self, origin: Vec3, direction: Vec3, mut hit_test: F) -> Option<(usize, f32)>
    where
        F: FnMut(usize) -> Option<f32>,
    {
        let root = self.root?;
        let mut best: Option<(usize, f32)> = None;

        let mut stack = Vec::with_capacity(32);
        stack.push(root);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let aabb = node.aabb();
            if !ray_aabb(aabb.top_right, aabb.bottom_left, origin, direction) {
                continue;
            }
            match *node {
                NarrowNode::Leaf { primitive, .. } => {
                    let triangle = self.primitives[primitive].index;
                    if let Some(t) = hit_test(triangle) {
                        if best.map_or(true, |(_, bt)| t < bt) {
                            best = Some((triangle, t));
                        }
                    }
                }
                NarrowNode::Internal { a, b, .. } => {
                    stack.push(b);
                    stack.push(a);
                }
            }
        }
        best
    }
}
