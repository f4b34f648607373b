//! 宽阶段动态 BVH
//!
//! 竞技场存储的二叉树，叶子是碰撞体的 AABB。
//!
//! 插入：分支定界寻找兄弟节点
//! - 直接代价 = SA(node ∪ leaf) + 继承代价
//! - 下界 = SA(leaf) + ΔSA(node) + 继承代价，下界 ≥ 当前最优则剪枝
//! - 先访问 a 再访问 b，只有严格更低的代价才会替换（结果确定）
//!
//! 删除：用兄弟替换父节点，再向上精确重算祖先包围盒（保持紧致）。
//! 旋转：可选的局部重平衡，只影响查询性能，不改变查询结果。

use glam::Vec3;

use super::ColliderId;
use crate::geometry::{ray_aabb, Aabb};
use crate::physics::get_config;

/// 节点内容
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BroadKind {
    Internal { a: usize, b: usize },
    Leaf(ColliderId),
    /// 空闲槽（在 free 列表中）
    Free,
}

/// 树节点
#[derive(Clone, Copy, Debug)]
pub struct BroadNode {
    pub aabb: Aabb,
    pub parent: Option<usize>,
    pub kind: BroadKind,
}

/// 动态 AABB 树
#[derive(Clone, Debug)]
pub struct BroadBvh {
    nodes: Vec<BroadNode>,
    free: Vec<usize>,
    root: Option<usize>,
    leaf_count: usize,
    rotations: bool,
    epsilon: f32,
}

impl Default for BroadBvh {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadBvh {
    /// 按当前配置创建（旋转开关、重叠容差）
    pub fn new() -> Self {
        let config = get_config();
        Self::with_options(config.bvh_rotations, config.aabb_epsilon)
    }

    pub fn with_options(rotations: bool, epsilon: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaf_count: 0,
            rotations,
            epsilon,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    #[inline]
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    #[inline]
    pub fn node(&self, index: usize) -> Option<&BroadNode> {
        self.nodes.get(index).filter(|n| n.kind != BroadKind::Free)
    }

    /// 整棵树的包围盒
    pub fn aabb(&self) -> Option<Aabb> {
        self.root.map(|r| self.nodes[r].aabb)
    }

    fn alloc(&mut self, node: BroadNode) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].kind = BroadKind::Free;
        self.nodes[index].parent = None;
        self.free.push(index);
    }

    // ========================================
    // 插入
    // ========================================

    /// 插入碰撞体，返回叶子槽位（碰撞体保存它用于 O(1) 删除）
    pub fn insert(&mut self, collider: ColliderId, aabb: Aabb) -> usize {
        let leaf = self.alloc(BroadNode {
            aabb,
            parent: None,
            kind: BroadKind::Leaf(collider),
        });
        self.leaf_count += 1;

        let Some(root) = self.root else {
            self.root = Some(leaf);
            return leaf;
        };

        let (_, sibling, parent) =
            self.find_sibling(root, &aabb, 0.0, None, (f32::INFINITY, root, None));

        let internal = self.alloc(BroadNode {
            aabb: self.nodes[sibling].aabb.union(&aabb),
            parent,
            kind: BroadKind::Internal { a: sibling, b: leaf },
        });
        self.nodes[sibling].parent = Some(internal);
        self.nodes[leaf].parent = Some(internal);

        match parent {
            Some(p) => {
                self.replace_child(p, sibling, internal);
                self.refit_from(p);
            }
            None => self.root = Some(internal),
        }

        leaf
    }

    /// 分支定界搜索最优兄弟，返回 (代价, 兄弟, 兄弟的父节点)
    fn find_sibling(
        &self,
        index: usize,
        leaf: &Aabb,
        inherited: f32,
        parent: Option<usize>,
        mut best: (f32, usize, Option<usize>),
    ) -> (f32, usize, Option<usize>) {
        let node = &self.nodes[index];
        let union_area = node.aabb.union(leaf).surface_area();

        let direct = union_area + inherited;
        if direct < best.0 {
            best = (direct, index, parent);
        }

        if let BroadKind::Internal { a, b } = node.kind {
            let delta = union_area - node.aabb.surface_area();
            let lower_bound = leaf.surface_area() + delta + inherited;
            if lower_bound < best.0 {
                best = self.find_sibling(a, leaf, inherited + delta, Some(index), best);
                best = self.find_sibling(b, leaf, inherited + delta, Some(index), best);
            }
        }

        best
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let BroadKind::Internal { a, b } = &mut self.nodes[parent].kind {
            if *a == old {
                *a = new;
            } else if *b == old {
                *b = new;
            }
        }
    }

    /// 从 start 向上重算包围盒（开启旋转时顺带旋转）
    fn refit_from(&mut self, start: usize) {
        let mut current = Some(start);
        while let Some(index) = current {
            if let BroadKind::Internal { a, b } = self.nodes[index].kind {
                self.nodes[index].aabb = self.nodes[a].aabb.union(&self.nodes[b].aabb);
                if self.rotations {
                    self.rotate(index);
                }
            }
            current = self.nodes[index].parent;
        }
    }

    // ========================================
    // 删除与刷新
    // ========================================

    /// 删除叶子，返回其碰撞体；非叶子槽位返回 None
    pub fn remove(&mut self, leaf: usize) -> Option<ColliderId> {
        let node = self.nodes.get(leaf)?;
        let BroadKind::Leaf(collider) = node.kind else {
            return None;
        };

        let Some(parent) = node.parent else {
            self.root = None;
            self.leaf_count -= 1;
            self.release(leaf);
            return Some(collider);
        };

        // 叶子的父节点必然是内部节点
        let BroadKind::Internal { a, b } = self.nodes[parent].kind else {
            return None;
        };
        let sibling = if a == leaf { b } else { a };
        self.leaf_count -= 1;

        let grand = self.nodes[parent].parent;
        self.nodes[sibling].parent = grand;
        match grand {
            Some(g) => {
                self.replace_child(g, parent, sibling);
                self.refit_from(g);
            }
            None => self.root = Some(sibling),
        }

        self.release(parent);
        self.release(leaf);
        Some(collider)
    }

    /// 删除后按新包围盒重新插入，返回新的叶子槽位
    pub fn refresh(&mut self, leaf: usize, aabb: Aabb) -> Option<usize> {
        let collider = self.remove(leaf)?;
        Some(self.insert(collider, aabb))
    }

    // ========================================
    // 旋转
    // ========================================

    /// 在 index 处尝试把一个子节点与另一子节点的孩子交换，
    /// 选使被旋转子节点表面积下降最多的方案；没有收益则不动
    pub fn rotate(&mut self, index: usize) {
        let BroadKind::Internal { a, b } = self.nodes[index].kind else {
            return;
        };

        // (收益, 上移的孙节点, 下移的子节点, 孙节点原父节点)
        let mut best: Option<(f32, usize, usize, usize)> = None;
        for (child, other) in [(a, b), (b, a)] {
            let BroadKind::Internal { a: g1, b: g2 } = self.nodes[other].kind else {
                continue;
            };
            let current = self.nodes[other].aabb.surface_area();
            for (grand, keep) in [(g1, g2), (g2, g1)] {
                let rotated = self.nodes[child].aabb.union(&self.nodes[keep].aabb).surface_area();
                let gain = current - rotated;
                if gain > 0.0 && best.map_or(true, |(g, ..)| gain > g) {
                    best = Some((gain, grand, child, other));
                }
            }
        }

        let Some((_, grand, child, other)) = best else {
            return;
        };

        self.replace_child(index, child, grand);
        self.replace_child(other, grand, child);
        self.nodes[grand].parent = Some(index);
        self.nodes[child].parent = Some(other);
        if let BroadKind::Internal { a, b } = self.nodes[other].kind {
            self.nodes[other].aabb = self.nodes[a].aabb.union(&self.nodes[b].aabb);
        }
    }

    // ========================================
    // 查询
    // ========================================

    /// 与 aabb 重叠的所有碰撞体
    pub fn query(&self, aabb: &Aabb) -> Vec<ColliderId> {
        let mut result = Vec::new();
        self.walk(
            |node| node.overlaps_with_epsilon(aabb, self.epsilon),
            |collider| result.push(collider),
        );
        result
    }

    /// 包围盒被射线穿过的所有碰撞体
    pub fn query_ray(&self, origin: Vec3, direction: Vec3) -> Vec<ColliderId> {
        let mut result = Vec::new();
        self.walk(
            |node| ray_aabb(node.top_right, node.bottom_left, origin, direction),
            |collider| result.push(collider),
        );
        result
    }

    fn walk<P, F>(&self, mut predicate: P, mut visit: F)
    where
        P: FnMut(&Aabb) -> bool,
        F: FnMut(ColliderId),
    {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = Vec::with_capacity(32);
        stack.push(root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !predicate(&node.aabb) {
                continue;
            }
            match node.kind {
                BroadKind::Leaf(collider) => visit(collider),
                BroadKind::Internal { a, b } => {
                    stack.push(b);
                    stack.push(a);
                }
                BroadKind::Free => {}
            }
        }
    }

    /// 所有包围盒重叠的碰撞体对（小 id 在前，已排序去重）
    pub fn pairs(&self) -> Vec<(ColliderId, ColliderId)> {
        let mut pairs = Vec::new();
        for node in &self.nodes {
            let BroadKind::Leaf(first) = node.kind else {
                continue;
            };
            for second in self.query(&node.aabb) {
                if first < second {
                    pairs.push((first, second));
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    // ========================================
    // 统计与校验
    // ========================================

    /// 所有内部节点表面积之和
    pub fn total_cost(&self) -> f32 {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, BroadKind::Internal { .. }))
            .map(|n| n.aabb.surface_area())
            .sum()
    }

    /// 深度（单个叶子为 1）
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[BroadNode], index: usize) -> usize {
            match nodes[index].kind {
                BroadKind::Internal { a, b } => 1 + walk(nodes, a).max(walk(nodes, b)),
                _ => 1,
            }
        }
        self.root.map_or(0, |r| walk(&self.nodes, r))
    }

    /// 校验紧致性与父子链接：每个内部节点的盒子恰好等于两个孩子的并集
    pub fn validate(&self) -> bool {
        let Some(root) = self.root else {
            return self.leaf_count == 0;
        };
        if self.nodes[root].parent.is_some() {
            return false;
        }
        self.validate_node(root) == Some(self.leaf_count)
    }

    /// 返回子树叶子数，不合法时返回 None
    fn validate_node(&self, index: usize) -> Option<usize> {
        let node = &self.nodes[index];
        match node.kind {
            BroadKind::Leaf(_) => Some(1),
            BroadKind::Free => None,
            BroadKind::Internal { a, b } => {
                if self.nodes[a].parent != Some(index) || self.nodes[b].parent != Some(index) {
                    return None;
                }
                if node.aabb != self.nodes[a].aabb.union(&self.nodes[b].aabb) {
                    return None;
                }
                Some(self.validate_node(a)? + self.validate_node(b)?)
            }
        }
    }
}
