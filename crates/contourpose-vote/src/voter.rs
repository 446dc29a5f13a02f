//! RANSAC voting for a single keypoint.

use contourpose_geometry::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::decoder::PixelVote;

/// Parameters for RANSAC keypoint voting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteParams {
    /// Number of hypotheses to evaluate.
    pub iterations: usize,
    /// Maximum perpendicular distance in pixels for a ray to support a hypothesis.
    pub inlier_tolerance: f64,
    /// Pairs with `|d1 x d2|` below this are treated as parallel and redrawn.
    pub parallel_eps: f64,
    /// Upper bound on redrawn degenerate pairs before voting stops early.
    pub max_degenerate_draws: usize,
}

impl Default for VoteParams {
    fn default() -> Self {
        Self {
            iterations: 256,
            inlier_tolerance: 3.0,
            parallel_eps: 0.02,
            max_degenerate_draws: 4096,
        }
    }
}

/// Candidate keypoint location together with its supporting votes.
#[derive(Debug, Clone, PartialEq)]
pub struct VotingHypothesis {
    /// Candidate 2D point.
    pub point: DVec2,
    /// Indices of the supporting votes, ascending.
    pub inliers: Vec<usize>,
}

impl VotingHypothesis {
    /// Number of supporting votes.
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

#[inline]
fn cross(a: DVec2, b: DVec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Intersect two rays, returning `None` when they are closer to parallel than `eps`.
///
/// The lines are treated as infinite; whether the point lies ahead of each ray
/// is left to [`supports`].
pub fn intersect_rays(a: &PixelVote, b: &PixelVote, eps: f64) -> Option<DVec2> {
    let denom = cross(a.direction, b.direction);
    if !(denom.abs() >= eps) {
        return None;
    }
    let s = cross(b.position - a.position, b.direction) / denom;
    let h = a.position + a.direction * s;
    h.is_finite().then_some(h)
}

/// Whether `vote` passes within `tolerance` of `point` and points towards it.
#[inline]
pub fn supports(vote: &PixelVote, point: DVec2, tolerance: f64) -> bool {
    let offset = point - vote.position;
    cross(vote.direction, offset).abs() <= tolerance
        && vote.direction.dot(offset) >= -tolerance
}

/// Indices of all votes supporting `point`.
pub fn collect_inliers(votes: &[PixelVote], point: DVec2, tolerance: f64) -> Vec<usize> {
    votes
        .iter()
        .enumerate()
        .filter(|(_, v)| supports(v, point, tolerance))
        .map(|(i, _)| i)
        .collect()
}

fn count_inliers(votes: &[PixelVote], point: DVec2, tolerance: f64) -> usize {
    votes.iter().filter(|v| supports(v, point, tolerance)).count()
}

/// Find the point supported by the most votes.
///
/// Returns `None` when fewer than two votes are given or every sampled pair
/// was degenerate. Ties keep the first hypothesis evaluated, so a fixed `rng`
/// seed gives bit-identical results.
pub fn vote<R: Rng + ?Sized>(
    votes: &[PixelVote],
    params: &VoteParams,
    rng: &mut R,
) -> Option<VotingHypothesis> {
    let n = votes.len();
    if n < 2 {
        return None;
    }

    let mut best: Option<(DVec2, usize)> = None;
    let mut degenerate = 0usize;
    let mut iter = 0usize;

    while iter < params.iterations {
        let i = rng.random_range(0..n);
        let mut j = rng.random_range(0..n - 1);
        if j >= i {
            j += 1;
        }

        let Some(h) = intersect_rays(&votes[i], &votes[j], params.parallel_eps) else {
            degenerate += 1;
            if degenerate >= params.max_degenerate_draws {
                log::debug!(
                    "voting stopped after {degenerate} degenerate draws ({iter} hypotheses)"
                );
                break;
            }
            continue;
        };
        iter += 1;

        let count = count_inliers(votes, h, params.inlier_tolerance);
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((h, count)),
        }
    }

    best.map(|(point, _)| VotingHypothesis {
        point,
        inliers: collect_inliers(votes, point, params.inlier_tolerance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ray_to(target: DVec2, from: DVec2) -> PixelVote {
        PixelVote {
            position: from,
            direction: (target - from).normalize(),
            weight: 1.0,
        }
    }

    #[test]
    fn test_intersect_rays() {
        let a = ray_to(DVec2::new(5.0, 5.0), DVec2::new(0.0, 5.0));
        let b = ray_to(DVec2::new(5.0, 5.0), DVec2::new(5.0, 0.0));
        let h = intersect_rays(&a, &b, 1e-3).unwrap();
        assert!((h - DVec2::new(5.0, 5.0)).length() < 1e-12);

        let c = ray_to(DVec2::new(10.0, 5.0), DVec2::new(1.0, 5.0));
        assert!(intersect_rays(&a, &c, 1e-3).is_none());
    }

    #[test]
    fn test_supports_rejects_behind() {
        let v = ray_to(DVec2::new(10.0, 0.0), DVec2::ZERO);
        assert!(supports(&v, DVec2::new(20.0, 1.0), 2.0));
        assert!(!supports(&v, DVec2::new(20.0, 3.0), 2.0));
        // on the line but behind the pixel
        assert!(!supports(&v, DVec2::new(-20.0, 0.0), 2.0));
    }

    #[test]
    fn test_vote_finds_target() {
        let target = DVec2::new(40.0, 30.0);
        let mut votes: Vec<PixelVote> = (0..30)
            .map(|i| {
                let angle = i as f64 * 0.21;
                ray_to(target, target + DVec2::new(angle.cos(), angle.sin()) * 25.0)
            })
            .collect();
        // outliers pointing away
        votes.push(ray_to(DVec2::new(-100.0, 0.0), DVec2::new(0.0, 0.0)));
        votes.push(ray_to(DVec2::new(0.0, -100.0), DVec2::new(5.0, 5.0)));

        let mut rng = StdRng::seed_from_u64(7);
        let hyp = vote(&votes, &VoteParams::default(), &mut rng).unwrap();
        assert!((hyp.point - target).length() < 1e-6);
        assert_eq!(hyp.inlier_count(), 30);
        assert_eq!(hyp.inliers, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_vote_deterministic() {
        let votes: Vec<PixelVote> = (0..20)
            .map(|i| {
                let jitter = DVec2::new((i % 3) as f64 * 0.7, (i % 5) as f64 * 0.4);
                let from = DVec2::new(i as f64 * 3.0, 100.0 - i as f64);
                ray_to(DVec2::new(50.0, 50.0) + jitter, from)
            })
            .collect();
        let params = VoteParams::default();
        let a = vote(&votes, &params, &mut StdRng::seed_from_u64(42));
        let b = vote(&votes, &params, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.point.x.to_bits(), b.point.x.to_bits());
        assert_eq!(a.point.y.to_bits(), b.point.y.to_bits());
    }

    #[test]
    fn test_vote_all_parallel() {
        let votes: Vec<PixelVote> = (0..10)
            .map(|i| PixelVote {
                position: DVec2::new(0.0, i as f64),
                direction: DVec2::X,
                weight: 1.0,
            })
            .collect();
        let params = VoteParams {
            max_degenerate_draws: 64,
            ..Default::default()
        };
        assert!(vote(&votes, &params, &mut StdRng::seed_from_u64(1)).is_none());
    }

    /// The pair `vote` draws first for `seed`, using the same sampling order.
    fn first_pair(seed: u64, n: usize) -> (usize, usize) {
        let mut rng = StdRng::seed_from_u64(seed);
        let i = rng.random_range(0..n);
        let mut j = rng.random_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        (i, j)
    }

    #[test]
    fn test_vote_tie_keeps_first() {
        // three lines forming a triangle: every hypothesis is a vertex with two supporters
        let votes = [
            PixelVote {
                position: DVec2::new(-50.0, 0.0),
                direction: DVec2::X,
                weight: 1.0,
            },
            PixelVote {
                position: DVec2::new(0.0, -50.0),
                direction: DVec2::Y,
                weight: 1.0,
            },
            ray_to(DVec2::new(0.0, 100.0), DVec2::new(150.0, -50.0)),
        ];
        let params = VoteParams {
            iterations: 16,
            inlier_tolerance: 1.0,
            ..Default::default()
        };

        for seed in 0..8 {
            let (i, j) = first_pair(seed, votes.len());
            let first = intersect_rays(&votes[i], &votes[j], params.parallel_eps).unwrap();
            let hyp = vote(&votes, &params, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(hyp.point, first, "seed {seed}");
            assert_eq!(hyp.inlier_count(), 2);
        }
    }

    #[test]
    fn test_vote_redraws_parallel_pairs() {
        let target = DVec2::new(60.0, 40.0);
        let mut votes: Vec<PixelVote> = (0..20)
            .map(|i| PixelVote {
                position: DVec2::new(0.0, 2.0 * i as f64),
                direction: DVec2::X,
                weight: 1.0,
            })
            .collect();
        votes.push(ray_to(target, DVec2::new(60.0, 100.0)));
        votes.push(ray_to(target, DVec2::new(120.0, 100.0)));
        votes.push(ray_to(target, DVec2::new(120.0, 0.0)));

        // a seed whose first draw is two parallel rays
        let seed = (0..1000)
            .find(|&seed| {
                let (i, j) = first_pair(seed, votes.len());
                i < 20 && j < 20
            })
            .unwrap();

        let params = VoteParams {
            iterations: 1,
            ..Default::default()
        };
        let hyp = vote(&votes, &params, &mut StdRng::seed_from_u64(seed));
        assert!(hyp.is_some());

        // the same draw with no redraw budget ends voting before any hypothesis
        let params = VoteParams {
            iterations: 1,
            max_degenerate_draws: 1,
            ..Default::default()
        };
        assert!(vote(&votes, &params, &mut StdRng::seed_from_u64(seed)).is_none());
    }

    #[test]
    fn test_vote_too_few() {
        let v = ray_to(DVec2::ONE, DVec2::ZERO);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(vote(&[], &VoteParams::default(), &mut rng).is_none());
        assert!(vote(&[v], &VoteParams::default(), &mut rng).is_none());
    }
}
