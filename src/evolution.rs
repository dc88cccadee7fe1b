//! Evolution operators along a propagation path.

use nalgebra::DMatrix;

use crate::error::{MonteCarloError, MonteCarloResult};
use crate::linalg::matrix_exp;
use crate::medium::{OpticalProperties, OpticalState};
use crate::path::PropagationPath;

/// Transmission matrices between consecutive path points and their
/// cumulative products from the start of the path.
///
/// The operator of segment `i` (points `i` to `i+1`, length `Δs_i`) is
/// `exp(-K̄_i Δs_i)` with `K̄_i` the mean of the two end-point extinction
/// matrices. `cumulative[0]` is the identity and
/// `cumulative[i+1] = cumulative[i] * segments[i]`.
#[derive(Debug, Clone)]
pub struct EvolutionChain {
    distances: Vec<f64>,
    states: Vec<OpticalState>,
    mean_extinction: Vec<DMatrix<f64>>,
    segments: Vec<DMatrix<f64>>,
    cumulative: Vec<DMatrix<f64>>,
    /// Optical depth -ln T[0,0] at every point
    optical_depth: Vec<f64>,
}

impl EvolutionChain {
    /// Build the chain from a path and the optical state at each of its points.
    pub fn new(path: &PropagationPath, states: Vec<OpticalState>, stokes_dim: usize) -> MonteCarloResult<Self> {
        path.validate()?;
        if states.len() != path.len() {
            return Err(MonteCarloError::inconsistency(format!(
                "{} optical states for a path with {} points",
                states.len(),
                path.len()
            )));
        }
        for state in &states {
            state.validate(stokes_dim)?;
        }

        let distances = path.distances();
        let n = distances.len();
        let mut mean_extinction = Vec::with_capacity(n.saturating_sub(1));
        let mut segments = Vec::with_capacity(n.saturating_sub(1));
        let mut cumulative = Vec::with_capacity(n);
        let mut optical_depth = Vec::with_capacity(n);
        cumulative.push(DMatrix::identity(stokes_dim, stokes_dim));
        optical_depth.push(0.0);

        // Segments are consecutive differences of the validated distances, so
        // they always add up to the path length.
        for i in 0..n - 1 {
            let ds = distances[i + 1] - distances[i];
            let k_mean = (&states[i].extinction + &states[i + 1].extinction) * 0.5;
            let op = if ds == 0.0 {
                DMatrix::identity(stokes_dim, stokes_dim)
            } else {
                matrix_exp(&(&k_mean * -ds))?
            };
            let next = &cumulative[i] * &op;
            let depth = transmission_depth(next[(0, 0)]).max(optical_depth[i]);
            optical_depth.push(depth);
            cumulative.push(next);
            segments.push(op);
            mean_extinction.push(k_mean);
        }

        Ok(Self {
            distances,
            states,
            mean_extinction,
            segments,
            cumulative,
            optical_depth,
        })
    }

    /// Query the optical properties at every point of `path` and build the chain.
    pub fn from_path<O: OpticalProperties + ?Sized>(
        path: &PropagationPath,
        optics: &O,
        frequency: f64,
        stokes_dim: usize,
    ) -> MonteCarloResult<Self> {
        let states = path
            .points
            .iter()
            .map(|p| optics.optical_state(&p.grid_position, frequency))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(path, states, stokes_dim)
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn states(&self) -> &[OpticalState] {
        &self.states
    }

    pub fn segments(&self) -> &[DMatrix<f64>] {
        &self.segments
    }

    /// Mean extinction matrix of each segment.
    pub fn mean_extinction(&self) -> &[DMatrix<f64>] {
        &self.mean_extinction
    }

    /// Cumulative transmission from the path start to each point.
    pub fn cumulative(&self) -> &[DMatrix<f64>] {
        &self.cumulative
    }

    /// Transmission from the path start to its end.
    pub fn total_transmission(&self) -> &DMatrix<f64> {
        &self.cumulative[self.cumulative.len() - 1]
    }

    pub fn total_length(&self) -> f64 {
        self.distances[self.distances.len() - 1]
    }

    /// Optical depth of the (0,0) transmission at each point.
    pub fn optical_depths(&self) -> &[f64] {
        &self.optical_depth
    }

    /// Optical depth of the whole path.
    pub fn optical_depth(&self) -> f64 {
        self.optical_depth[self.optical_depth.len() - 1]
    }
}

/// `-ln t`, kept finite for transmissions that underflowed to zero.
fn transmission_depth(t: f64) -> f64 {
    -(t.max(f64::MIN_POSITIVE)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Background, GridPosition, PathPoint};
    use crate::physics::LineOfSight;
    use nalgebra::{DVector, Vector3};

    fn straight_path(distances: &[f64]) -> PropagationPath {
        PropagationPath {
            los: LineOfSight::new(180.0, 0.0),
            points: distances
                .iter()
                .map(|&d| PathPoint::new(Vector3::new(0.0, 0.0, -d), GridPosition::new(d, 0.0, 0.0), d))
                .collect(),
            background: Background::CloudBoxBoundary,
        }
    }

    fn uniform_states(n: usize, k: f64) -> Vec<OpticalState> {
        (0..n)
            .map(|_| OpticalState::scalar(1, k, k, DVector::zeros(1), 260.0))
            .collect()
    }

    #[test]
    fn test_homogeneous_chain_is_exponential() {
        let path = straight_path(&[0.0, 0.5, 1.0, 2.0]);
        let chain = EvolutionChain::new(&path, uniform_states(4, 0.7), 1).unwrap();
        for (d, t) in chain.distances().iter().zip(chain.cumulative()) {
            assert!((t[(0, 0)] - (-0.7 * d).exp()).abs() < 1e-14);
        }
        assert!((chain.optical_depth() - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_zero_length_segment_is_identity() {
        let path = straight_path(&[0.0, 0.0, 1.0]);
        let chain = EvolutionChain::new(&path, uniform_states(3, 2.0), 1).unwrap();
        assert_eq!(chain.segments()[0][(0, 0)], 1.0);
        assert_eq!(chain.optical_depths()[1], 0.0);
    }

    #[test]
    fn test_segment_uses_mean_extinction() {
        let path = straight_path(&[0.0, 1.0]);
        let states = vec![
            OpticalState::scalar(1, 1.0, 1.0, DVector::zeros(1), 250.0),
            OpticalState::scalar(1, 3.0, 3.0, DVector::zeros(1), 250.0),
        ];
        let chain = EvolutionChain::new(&path, states, 1).unwrap();
        assert!((chain.total_transmission()[(0, 0)] - (-2.0f64).exp()).abs() < 1e-14);
    }

    #[test]
    fn test_chain_spans_the_whole_path() {
        let path = straight_path(&[0.0, 0.3, 0.3, 1.1, 2.5]);
        let chain = EvolutionChain::new(&path, uniform_states(5, 0.4), 1).unwrap();
        assert_eq!(chain.total_length(), path.total_length());
        assert_eq!(chain.distances(), path.distances().as_slice());
        assert_eq!(chain.segments().len(), 4);
    }

    #[test]
    fn test_decreasing_distance_is_inconsistent() {
        let path = straight_path(&[0.0, 1.0, 0.5]);
        let err = EvolutionChain::new(&path, uniform_states(3, 1.0), 1).unwrap_err();
        assert!(matches!(err, MonteCarloError::Inconsistency(_)));
    }

    #[test]
    fn test_state_count_mismatch_is_inconsistent() {
        let path = straight_path(&[0.0, 1.0, 2.0]);
        let err = EvolutionChain::new(&path, uniform_states(2, 1.0), 1).unwrap_err();
        assert!(matches!(err, MonteCarloError::Inconsistency(_)));
    }

    #[test]
    fn test_nan_extinction_is_inconsistent() {
        let path = straight_path(&[0.0, 1.0]);
        let mut states = uniform_states(2, 1.0);
        states[1].extinction[(0, 0)] = f64::NAN;
        assert!(EvolutionChain::new(&path, states, 1).is_err());
    }

    #[test]
    fn test_polarized_chain_products() {
        let path = straight_path(&[0.0, 1.0, 2.0]);
        let k = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 1.0]);
        let state = OpticalState {
            extinction: k.clone(),
            absorption: DVector::from_row_slice(&[1.0, 0.2]),
            pnd: DVector::zeros(0),
            temperature: 250.0,
        };
        let chain = EvolutionChain::new(&path, vec![state.clone(), state.clone(), state], 2).unwrap();
        let expected = matrix_exp(&(&k * -2.0)).unwrap();
        let diff = (chain.total_transmission() - expected).abs().max();
        assert!(diff < 1e-12);
    }
}
