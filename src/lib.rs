//! Backward Monte Carlo radiative transfer of polarized radiation through a
//! three-dimensional cloud box.
//!
//! The crate traces reversed photon histories from a sensor on the cloud-box
//! boundary. Geometry, optical properties, phase matrices and the radiation
//! entering the box are supplied through the traits in [`path`] and
//! [`medium`]; [`model::Model`] runs the photons and returns the Stokes
//! vector at the sensor with its standard error.

pub mod diagnostics;
pub mod error;
pub mod evolution;
pub mod fast_rng;
pub mod interpolate;
pub mod linalg;
pub mod medium;
pub mod model;
pub mod path;
pub mod pathlength;
pub mod photon;
pub mod physics;
pub mod scatter;
pub mod settings;
pub mod simulator;
pub mod tally;
pub mod utilities;

pub use error::{CollaboratorError, MonteCarloError, MonteCarloResult};
pub use evolution::EvolutionChain;
pub use fast_rng::FastRng;
pub use medium::{BoundaryRadiance, OpticalProperties, OpticalState, PhaseFunction, Scene};
pub use model::{LineOfSightSummary, Model, RadianceResult, RunStatistics, Sensor};
pub use path::{trace_path, Background, GridPosition, PathPoint, PathStepper, PropagationPath};
pub use physics::{planck, LineOfSight};
pub use settings::Settings;
pub use tally::{StokesEstimate, StokesTally};
