//! Free-path sampling along an evolution chain.
//!
//! Path lengths are drawn in optical depth `τ(s) = -ln T(s)[0,0]`, which is
//! piecewise linear between path points because every segment operator is
//! an exponential. The density of a sampled length is therefore
//! `g(s) = k_i e^{-τ(s)}` with `k_i` the (0,0) extinction of the segment,
//! the exponential free-path law generalized to an inhomogeneous path.

use rand::Rng;

use crate::evolution::EvolutionChain;

/// Outcome of a path-length draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathLengthSample {
    /// Interaction at `distance` along the path, drawn with probability density `density`.
    Interaction { distance: f64, density: f64 },
    /// The free path reaches past the cloud-box boundary, an event of probability `probability`.
    Exit { probability: f64 },
    /// The line of sight has no extinction, so no interaction can be forced.
    Transparent,
}

/// Sample an interaction on the original line of sight.
///
/// The exponential law is truncated to the path so that an interaction
/// always happens before the boundary; the transmitted boundary radiance
/// along the line of sight is accounted for separately.
pub fn sample_forced<R: Rng + ?Sized>(chain: &EvolutionChain, rng: &mut R) -> PathLengthSample {
    let tau_total = chain.optical_depth();
    if tau_total <= 0.0 {
        return PathLengthSample::Transparent;
    }
    // Probability of interacting anywhere on the path
    let p_interact = -(-tau_total).exp_m1();
    let u: f64 = rng.gen();
    let tau = -(-u * p_interact).ln_1p();
    let (distance, density) = locate(chain, tau.min(tau_total));
    PathLengthSample::Interaction {
        distance,
        density: density / p_interact,
    }
}

/// Sample a free path after a scattering event.
///
/// Paths longer than the distance to the boundary are reported as
/// [`PathLengthSample::Exit`] with the survival probability `e^{-τ(L)}`,
/// which is 1 in a medium without extinction.
pub fn sample_free<R: Rng + ?Sized>(chain: &EvolutionChain, rng: &mut R) -> PathLengthSample {
    let tau_total = chain.optical_depth();
    let u: f64 = rng.gen();
    let tau = -(-u).ln_1p();
    if tau >= tau_total {
        return PathLengthSample::Exit {
            probability: (-tau_total).exp(),
        };
    }
    let (distance, density) = locate(chain, tau);
    PathLengthSample::Interaction { distance, density }
}

/// Distance and density `k_i e^{-τ}` at optical depth `tau`, `0 <= tau < τ(L)`.
fn locate(chain: &EvolutionChain, tau: f64) -> (f64, f64) {
    let depths = chain.optical_depths();
    let distances = chain.distances();
    let last = depths.len() - 1;
    // First point deeper than tau; depths[0] = 0 <= tau so the segment index is >= 0
    let upper = depths.partition_point(|&d| d <= tau).clamp(1, last);
    let i = upper - 1;
    let dtau = depths[i + 1] - depths[i];
    let ds = distances[i + 1] - distances[i];
    if dtau <= 0.0 || ds <= 0.0 {
        return (distances[i], 0.0);
    }
    let k = dtau / ds;
    let distance = distances[i] + (tau - depths[i]) / k;
    (distance.min(distances[i + 1]), k * (-tau).exp())
}
