//! Boundary-order tile planning. Each round walks the four sides of a
//! shrinking rectangle and queues one tile corner per step; the queues are
//! reversed before use so later rounds are visited first within each side.

use crate::Dims;

/// Lower-right corner of one tile. The tile occupies rows
/// `max_x - tile..max_x` and columns `max_y - tile..max_y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TileCorner {
    pub max_x: usize,
    pub max_y: usize,
}

pub(crate) struct TilePlan {
    queues: [Vec<TileCorner>; 4],
}

impl TilePlan {
    pub(crate) fn new(dims: Dims, tile: u32, step: u32) -> Self {
        debug_assert!(dims.height >= tile && dims.width >= tile);

        let height = i64::from(dims.height);
        let width = i64::from(dims.width);
        let tile = i64::from(tile);
        let step = i64::from(step);

        let mut queues: [Vec<TileCorner>; 4] = Default::default();

        let push = |q: &mut Vec<TileCorner>, x: i64, y: i64| {
            let corner = TileCorner {
                max_x: clamp_corner(x + tile, tile, height),
                max_y: clamp_corner(y + tile, tile, width),
            };
            if q.last() != Some(&corner) {
                q.push(corner);
            }
        };

        let mut a = 0_i64;
        let mut b = 0_i64;
        let mut n = height;
        let mut m = width;

        // Both cross-over checks compare against the width bound, and the
        // third walk reuses the height bound as its column. Kept exactly as
        // observed; the tests below pin the resulting order.
        while a <= m && b <= m {
            let mut k = a;
            while k < n {
                push(&mut queues[0], k, b);
                k += step;
            }

            let mut k = b + step;
            while k < m {
                push(&mut queues[1], n, k);
                k += step;
            }

            let mut k = n - step;
            while k > a {
                push(&mut queues[2], k, n);
                k -= step;
            }

            let mut k = m - step;
            while k > b + step {
                push(&mut queues[3], a, k);
                k -= step;
            }

            a += step;
            b += step;
            n -= step;
            m -= step;
        }

        Self { queues }
    }

    /// Corners in visiting order: every queue reversed, then concatenated
    /// first to fourth.
    pub(crate) fn visit_order(&self) -> Vec<TileCorner> {
        let mut order = Vec::with_capacity(self.queues.iter().map(Vec::len).sum());
        for q in &self.queues {
            order.extend(q.iter().rev().copied());
        }
        order
    }
}

/// Corners clamp to the image edge, and never fall below one tile even when
/// a shrinking bound has gone negative while the walk is still running.
fn clamp_corner(v: i64, lo: i64, hi: i64) -> usize {
    v.min(hi).max(lo) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    fn corners(pairs: &[(usize, usize)]) -> Vec<TileCorner> {
        pairs
            .iter()
            .map(|&(max_x, max_y)| TileCorner { max_x, max_y })
            .collect()
    }

    // The walk can leave gaps on strongly rectangular images; these shapes
    // are covered completely.
    #[test]
    fn covers_every_pixel() {
        for &(h, w) in &[(256, 256), (64, 64), (164, 64), (64, 164)] {
            let plan = TilePlan::new(Dims::new(w, h), 64, 50);
            let mut seen = vec![false; (h * w) as usize];

            for c in plan.visit_order() {
                for i in c.max_x - 64..c.max_x {
                    for j in c.max_y - 64..c.max_y {
                        seen[i * w as usize + j] = true;
                    }
                }
            }

            assert!(seen.iter().all(|&s| s), "hole in coverage of {}x{}", h, w);
        }
    }

    #[test]
    fn corners_stay_in_bounds() {
        for &(h, w) in &[(256, 256), (64, 64), (65, 100), (164, 64), (64, 500), (500, 64)] {
            let plan = TilePlan::new(Dims::new(w, h), 64, 50);
            for c in plan.visit_order() {
                assert!(c.max_x >= 64 && c.max_x <= h as usize, "{:?} in {}x{}", c, h, w);
                assert!(c.max_y >= 64 && c.max_y <= w as usize, "{:?} in {}x{}", c, h, w);
            }
        }
    }

    #[test]
    fn no_consecutive_duplicates_within_a_queue() {
        for &(h, w) in &[(256, 256), (164, 64), (64, 164), (512, 512)] {
            let plan = TilePlan::new(Dims::new(w, h), 64, 50);
            for q in &plan.queues {
                for pair in q.windows(2) {
                    assert_ne!(pair[0], pair[1], "duplicate in {}x{}", h, w);
                }
            }
        }
    }

    #[test]
    fn visit_order_reverses_queues_then_concatenates() {
        let plan = TilePlan::new(Dims::square(128), 64, 50);

        assert_eq!(plan.queues[0], corners(&[(64, 64), (114, 64), (128, 64), (114, 114)]));
        assert_eq!(plan.queues[1], corners(&[(128, 114), (128, 128)]));
        assert_eq!(plan.queues[2], corners(&[(128, 128), (92, 128)]));
        assert_eq!(plan.queues[3], corners(&[(64, 128)]));

        assert_eq!(
            plan.visit_order(),
            corners(&[
                (114, 114),
                (128, 64),
                (114, 64),
                (64, 64),
                (128, 128),
                (128, 114),
                (92, 128),
                (128, 128),
                (64, 128),
            ])
        );
    }

    // The rectangle stops shrinking once `a` crosses the width bound, for
    // both axes, so transposed inputs do not plan mirrored walks.
    #[test]
    fn cross_over_compares_both_bounds_against_width() {
        let tall = TilePlan::new(Dims::new(64, 164), 64, 50);
        assert_eq!(
            tall.visit_order(),
            corners(&[
                (164, 64),
                (114, 64),
                (64, 64),
                (164, 64),
                (78, 64),
                (128, 64),
                (164, 64),
            ])
        );

        let wide = TilePlan::new(Dims::new(164, 64), 64, 50);
        assert_eq!(
            wide.visit_order(),
            corners(&[
                (64, 64),
                (64, 164),
                (64, 114),
                (64, 128),
                (64, 128),
                (64, 164),
            ])
        );
    }

    #[test]
    fn single_tile_image_visits_only_that_tile() {
        let plan = TilePlan::new(Dims::square(64), 64, 50);
        let order = plan.visit_order();
        assert!(order.contains(&TileCorner { max_x: 64, max_y: 64 }));
        for c in order {
            assert_eq!(c, TileCorner { max_x: 64, max_y: 64 });
        }
    }
}
