//! 轴对齐包围盒

use glam::{Mat4, Vec3};

/// AABB 重叠测试的默认容差
pub const AABB_EPSILON: f32 = 1e-7;

/// 两个 AABB 是否在三个轴上都重叠（容差 epsilon 内）
#[inline]
pub fn aabb_overlap(
    top_right1: Vec3,
    bottom_left1: Vec3,
    top_right2: Vec3,
    bottom_left2: Vec3,
    epsilon: f32,
) -> bool {
    (0..3).all(|i| {
        bottom_left1[i] <= top_right2[i] + epsilon && top_right1[i] + epsilon >= bottom_left2[i]
    })
}

/// AABB 表面积：2(dx·dy + dy·dz + dz·dx)
///
/// BVH 启发式的唯一代价度量。反向或退化的盒子按零长度处理，
/// 结果永远不会为负或 NaN。
#[inline]
pub fn surface_area(top_right: Vec3, bottom_left: Vec3) -> f32 {
    let d = (top_right - bottom_left).max(Vec3::ZERO);
    2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
}

/// 轴对齐包围盒（最正角 + 最负角）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// 最正方向的角点
    pub top_right: Vec3,
    /// 最负方向的角点
    pub bottom_left: Vec3,
}

impl Aabb {
    #[inline]
    pub const fn new(top_right: Vec3, bottom_left: Vec3) -> Self {
        Self { top_right, bottom_left }
    }

    /// 由中心和半尺寸构造
    #[inline]
    pub fn from_center(center: Vec3, half_dimensions: Vec3) -> Self {
        Self::new(center + half_dimensions, center - half_dimensions)
    }

    /// 包围一组点，空集合返回 None
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (top_right, bottom_left) =
            iter.fold((first, first), |(tr, bl), p| (tr.max(p), bl.min(p)));
        Some(Self::new(top_right, bottom_left))
    }

    /// 两个盒子的并集
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(
            self.top_right.max(other.top_right),
            self.bottom_left.min(other.bottom_left),
        )
    }

    /// 两个盒子的交集，不相交时返回 None
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        let top_right = self.top_right.min(other.top_right);
        let bottom_left = self.bottom_left.max(other.bottom_left);
        if (0..3).all(|i| bottom_left[i] <= top_right[i]) {
            Some(Aabb::new(top_right, bottom_left))
        } else {
            None
        }
    }

    #[inline]
    pub fn surface_area(&self) -> f32 {
        surface_area(self.top_right, self.bottom_left)
    }

    /// 使用默认容差的重叠测试
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.overlaps_with_epsilon(other, AABB_EPSILON)
    }

    #[inline]
    pub fn overlaps_with_epsilon(&self, other: &Aabb, epsilon: f32) -> bool {
        aabb_overlap(
            self.top_right,
            self.bottom_left,
            other.top_right,
            other.bottom_left,
            epsilon,
        )
    }

    /// other 是否完全位于 self 内
    pub fn contains(&self, other: &Aabb) -> bool {
        (0..3).all(|i| {
            self.bottom_left[i] <= other.bottom_left[i] && self.top_right[i] >= other.top_right[i]
        })
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.top_right + self.bottom_left) * 0.5
    }

    #[inline]
    pub fn half_dimensions(&self) -> Vec3 {
        (self.top_right - self.bottom_left) * 0.5
    }

    /// 8 个角点（顺序固定：x 最快变化，z 最慢）
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.bottom_left, self.top_right);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// 变换 8 个角点后重新求包围盒
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        // 8 个角点非空
        Aabb::from_points(corners).unwrap_or(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_box_at(center: Vec3) -> Aabb {
        Aabb::from_center(center, Vec3::splat(0.5))
    }

    #[test]
    fn test_surface_area_of_unit_cube() {
        let b = unit_box_at(Vec3::ZERO);
        assert!((b.surface_area() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_surface_area() {
        // 扁平盒子
        let flat = Aabb::new(Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 0.0));
        assert!((flat.surface_area() - 2.0).abs() < 1e-6);

        // 反向盒子不会产生负面积
        let inverted = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(inverted.surface_area(), 0.0);

        // NaN 输入按零长度处理
        let nan = Aabb::new(Vec3::splat(f32::NAN), Vec3::ZERO);
        assert!(!nan.surface_area().is_nan());
    }

    #[test]
    fn test_touching_boxes_overlap() {
        let a = unit_box_at(Vec3::ZERO);
        let b = unit_box_at(Vec3::new(1.0, 0.0, 0.0));
        let c = unit_box_at(Vec3::new(1.01, 0.0, 0.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_union_and_intersection() {
        let a = unit_box_at(Vec3::ZERO);
        let b = unit_box_at(Vec3::new(0.5, 0.0, 0.0));
        let u = a.union(&b);
        assert_eq!(u.top_right, Vec3::new(1.0, 0.5, 0.5));
        assert_eq!(u.bottom_left, Vec3::splat(-0.5));
        assert!(u.contains(&a) && u.contains(&b));

        let i = a.intersection(&b).unwrap();
        assert_eq!(i.bottom_left, Vec3::new(0.0, -0.5, -0.5));
        assert!(a.intersection(&unit_box_at(Vec3::splat(3.0))).is_none());
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(Vec::<Vec3>::new()).is_none());
        let b = Aabb::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 2.0, 3.0)]).unwrap();
        assert_eq!(b.top_right, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.bottom_left, Vec3::new(-1.0, -2.0, 0.0));
    }

    fn arb_vec3() -> impl Strategy<Value = Vec3> {
        prop::array::uniform3(-100.0f32..100.0).prop_map(Vec3::from_array)
    }

    fn arb_aabb() -> impl Strategy<Value = Aabb> {
        (arb_vec3(), prop::array::uniform3(0.0f32..50.0))
            .prop_map(|(bl, ext)| Aabb::new(bl + Vec3::from_array(ext), bl))
    }

    proptest! {
        #[test]
        fn prop_overlap_is_symmetric(a in arb_aabb(), b in arb_aabb()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn prop_overlap_is_reflexive(a in arb_aabb()) {
            prop_assert!(a.overlaps(&a));
        }

        #[test]
        fn prop_surface_area_translation_invariant(a in arb_aabb(), t in arb_vec3()) {
            let moved = surface_area(a.top_right + t, a.bottom_left + t);
            let original = a.surface_area();
            prop_assert!((moved - original).abs() <= 1e-3 * original.max(1.0));
        }

        #[test]
        fn prop_surface_area_scales_quadratically(a in arb_aabb(), s in 0.1f32..10.0) {
            let scaled = surface_area(a.top_right * s, a.bottom_left * s);
            let expected = s * s * a.surface_area();
            prop_assert!((scaled - expected).abs() <= 1e-3 * expected.max(1.0));
        }
    }
}
