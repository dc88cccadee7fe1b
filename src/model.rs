use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::ops::Range;
use std::time::Instant;

use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{PathRecorder, PhotonLog, RecordedPath};
use crate::error::{MonteCarloError, MonteCarloResult};
use crate::evolution::EvolutionChain;
use crate::fast_rng::{resolve_seed, FastRng};
use crate::linalg::ensure_finite_vector;
use crate::medium::Scene;
use crate::path::{trace_path, GridPosition, PathPoint, PropagationPath};
use crate::photon::{PhotonOutcome, Termination};
use crate::physics::LineOfSight;
use crate::settings::Settings;
use crate::simulator::PhotonSimulator;
use crate::tally::{StokesEstimate, StokesTally};
use crate::utilities::integrate_trapezoid;

/// Viewing geometry: a point on the cloud-box boundary and the line of sight into the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub position: Vector3<f64>,
    pub grid_position: GridPosition,
    pub los: LineOfSight,
}

impl Sensor {
    pub fn new(position: Vector3<f64>, grid_position: GridPosition, los: LineOfSight) -> Self {
        Self {
            position,
            grid_position,
            los,
        }
    }

    fn path_point(&self) -> PathPoint {
        PathPoint::new(self.position, self.grid_position, 0.0)
    }
}

/// Counters describing how photon histories ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub photons: u64,
    pub emissions: u64,
    pub boundary_exits: u64,
    pub transparent: u64,
    pub max_scattering_order: u32,
    pub total_scattering_order: u64,
    /// Direction proposals drawn over all scattering events
    pub direction_attempts: u64,
}

impl RunStatistics {
    fn record(&mut self, outcome: &PhotonOutcome) {
        self.photons += 1;
        match outcome.termination {
            Termination::Emission => self.emissions += 1,
            Termination::BoundaryExit => self.boundary_exits += 1,
            Termination::Transparent => self.transparent += 1,
        }
        self.max_scattering_order = self.max_scattering_order.max(outcome.scattering_order);
        self.total_scattering_order += outcome.scattering_order as u64;
        self.direction_attempts += outcome.rejection_attempts;
    }

    fn merge(&mut self, other: &RunStatistics) {
        self.photons += other.photons;
        self.emissions += other.emissions;
        self.boundary_exits += other.boundary_exits;
        self.transparent += other.transparent;
        self.max_scattering_order = self.max_scattering_order.max(other.max_scattering_order);
        self.total_scattering_order += other.total_scattering_order;
        self.direction_attempts += other.direction_attempts;
    }

    pub fn mean_scattering_order(&self) -> f64 {
        if self.photons == 0 {
            0.0
        } else {
            self.total_scattering_order as f64 / self.photons as f64
        }
    }
}

/// Radiance at the sensor with its Monte Carlo error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadianceResult {
    /// Stokes vector reaching the sensor
    pub stokes: DVector<f64>,
    /// Standard error of `stokes`
    pub error: DVector<f64>,
    /// Boundary radiance transmitted straight along the line of sight
    pub los_contribution: DVector<f64>,
    /// Photon estimate of emission and scattering along the line of sight
    pub photon_estimate: StokesEstimate,
    /// Optical depth of the line of sight through the cloud box
    pub los_optical_depth: f64,
    pub statistics: RunStatistics,
    /// Seed the run used, after resolving clock seeds
    pub seed: u64,
}

impl fmt::Display for RadianceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Radiance over {} photons (seed {})", self.statistics.photons, self.seed)?;
        for (i, (s, e)) in self.stokes.iter().zip(self.error.iter()).enumerate() {
            writeln!(f, "  I[{}]: {:.6e} +/- {:.3e}", i, s, e)?;
        }
        writeln!(f, "  Line-of-sight optical depth: {:.4}", self.los_optical_depth)?;
        writeln!(
            f,
            "  Terminations: {} emission, {} boundary, {} transparent",
            self.statistics.emissions, self.statistics.boundary_exits, self.statistics.transparent
        )?;
        write!(
            f,
            "  Scattering order: max {}, mean {:.3}",
            self.statistics.max_scattering_order,
            self.statistics.mean_scattering_order()
        )
    }
}

/// Column amounts along the line of sight through the cloud box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOfSightSummary {
    /// Geometric length of the path (m)
    pub length: f64,
    /// ∫ K[0,0] ds, dimensionless
    pub optical_path: f64,
    /// ∫ Σ pnd_i m_i ds (kg/m²)
    pub mass_path: f64,
}

struct BatchResult {
    tally: StokesTally,
    statistics: RunStatistics,
    outcomes: Vec<PhotonOutcome>,
    paths: Vec<RecordedPath>,
}

/// Running totals of a run and its open output files.
struct RunOutput {
    tally: StokesTally,
    statistics: RunStatistics,
    photon_log: Option<PhotonLog<BufWriter<File>>>,
    recorder: Option<PathRecorder<BufWriter<File>>>,
}

impl RunOutput {
    /// Fold in the next batch and write its photons and paths.
    fn merge(&mut self, batch: BatchResult) -> MonteCarloResult<()> {
        self.tally.merge(&batch.tally)?;
        self.statistics.merge(&batch.statistics);
        if let Some(log) = self.photon_log.as_mut() {
            for outcome in &batch.outcomes {
                log.write(outcome)?;
            }
        }
        if let Some(recorder) = self.recorder.as_mut() {
            for path in &batch.paths {
                recorder.write(path)?;
            }
        }
        Ok(())
    }
}

/// A Monte Carlo radiance calculation: the medium and the run settings.
pub struct Model<'a> {
    pub scene: Scene<'a>,
    pub settings: Settings,
}

impl<'a> Model<'a> {
    pub fn new(scene: Scene<'a>, settings: Settings) -> Self {
        Self { scene, settings }
    }

    /// Estimate the Stokes vector reaching `sensor`.
    ///
    /// Photons are split into batches that run in parallel. Every photon
    /// draws from its own generator seeded by the run seed and its index, and
    /// batch tallies are merged in batch order, so a fixed seed reproduces the
    /// result exactly on any number of threads.
    ///
    /// Output files are created before any photon is traced. Photon lines and
    /// recorded paths are written as each batch is merged.
    pub fn run(&self, sensor: &Sensor) -> MonteCarloResult<RadianceResult> {
        self.settings.validate()?;
        let settings = &self.settings;
        let seed = resolve_seed(settings.seed);
        log::info!(
            "Starting Monte Carlo run: {} photons in {} batches, seed {}",
            settings.photons,
            settings.batches,
            seed
        );

        let mut output = RunOutput {
            tally: StokesTally::new(settings.stokes_dim),
            statistics: RunStatistics::default(),
            photon_log: match &settings.photon_log {
                Some(path) => Some(PhotonLog::create(path)?),
                None => None,
            },
            recorder: match &settings.record_paths {
                Some(path) => Some(PathRecorder::create(path)?),
                None => None,
            },
        };

        let los_path = trace_path(self.scene.stepper, &sensor.path_point(), &sensor.los, settings.max_path_steps)?;
        let los_chain = EvolutionChain::from_path(&los_path, self.scene.optics, settings.frequency, settings.stokes_dim)?;
        let los_contribution = self.los_contribution(&los_path, &los_chain)?;
        log::debug!(
            "line of sight: {} points, length {:.3} m, optical depth {:.4}",
            los_path.len(),
            los_chain.total_length(),
            los_chain.optical_depth()
        );

        let simulator = PhotonSimulator::new(self.scene, settings, &los_path, &los_chain);
        if simulator.uses_rejection_sampling() {
            log::info!("Sampling scattering directions by rejection against the phase function peak");
        }
        let keep_outcomes = output.photon_log.is_some();

        let ranges = settings.batch_ranges();
        let start = Instant::now();
        let first = self.run_batch(&simulator, seed, ranges[0].clone(), keep_outcomes)?;
        output.merge(first)?;
        let threads = rayon::current_num_threads().max(1);
        if ranges.len() > 1 {
            let elapsed = start.elapsed().as_secs_f64();
            let parallel = threads.min(ranges.len() - 1);
            log::info!(
                "First batch took {:.2} s, estimated remaining time {:.1} s",
                elapsed,
                elapsed * (ranges.len() - 1) as f64 / parallel as f64
            );
        }
        // Batches run one window at a time so outcomes and paths are written
        // in batch order and never held for more than a window.
        for window in ranges[1..].chunks(threads) {
            let batches = window
                .par_iter()
                .map(|range| self.run_batch(&simulator, seed, range.clone(), keep_outcomes))
                .collect::<MonteCarloResult<Vec<_>>>()?;
            for batch in batches {
                output.merge(batch)?;
            }
        }
        let RunOutput {
            tally,
            statistics,
            photon_log,
            recorder,
        } = output;
        if let Some(log) = photon_log {
            log.finish()?;
        }
        if let Some(recorder) = recorder {
            recorder.finish()?;
        }

        let photon_estimate = tally.finalize()?;
        let result = RadianceResult {
            stokes: &photon_estimate.mean + &los_contribution,
            error: photon_estimate.error.clone(),
            los_contribution,
            photon_estimate,
            los_optical_depth: los_chain.optical_depth(),
            statistics,
            seed,
        };
        log::info!("Finished in {:.2} s\n{}", start.elapsed().as_secs_f64(), result);
        Ok(result)
    }

    /// Optical and particle mass path of the line of sight.
    ///
    /// `particle_masses` holds the mass (kg) of one particle of each type,
    /// in the order of the particle number densities.
    pub fn line_of_sight_summary(&self, sensor: &Sensor, particle_masses: &[f64]) -> MonteCarloResult<LineOfSightSummary> {
        let settings = &self.settings;
        let path = trace_path(self.scene.stepper, &sensor.path_point(), &sensor.los, settings.max_path_steps)?;
        let mut extinction = Vec::with_capacity(path.len());
        let mut mass_density = Vec::with_capacity(path.len());
        for point in &path.points {
            let state = self.scene.optics.optical_state(&point.grid_position, settings.frequency)?;
            if state.pnd.len() != particle_masses.len() {
                return Err(MonteCarloError::inconsistency(format!(
                    "{} particle masses for {} particle types",
                    particle_masses.len(),
                    state.pnd.len()
                )));
            }
            extinction.push(state.extinction[(0, 0)]);
            mass_density.push(state.pnd.iter().zip(particle_masses).map(|(n, m)| n * m).sum::<f64>());
        }
        let distances = path.distances();
        Ok(LineOfSightSummary {
            length: path.total_length(),
            optical_path: integrate_trapezoid(&distances, &extinction),
            mass_path: integrate_trapezoid(&distances, &mass_density),
        })
    }

    /// Boundary radiance at the far end of the line of sight, transmitted to the sensor.
    fn los_contribution(&self, path: &PropagationPath, chain: &EvolutionChain) -> MonteCarloResult<DVector<f64>> {
        let end = path
            .last()
            .ok_or_else(|| MonteCarloError::inconsistency("line of sight has no points"))?;
        let incoming = self.scene.boundary.incoming(&end.position, &path.los)?;
        if incoming.len() != self.settings.stokes_dim {
            return Err(MonteCarloError::inconsistency(format!(
                "boundary radiance has {} Stokes elements, expected {}",
                incoming.len(),
                self.settings.stokes_dim
            )));
        }
        ensure_finite_vector(&incoming, "boundary radiance")?;
        Ok(chain.total_transmission() * incoming)
    }

    fn run_batch(
        &self,
        simulator: &PhotonSimulator,
        seed: u64,
        photons: Range<u64>,
        keep_outcomes: bool,
    ) -> MonteCarloResult<BatchResult> {
        let mut batch = BatchResult {
            tally: StokesTally::new(self.settings.stokes_dim),
            statistics: RunStatistics::default(),
            outcomes: Vec::new(),
            paths: Vec::new(),
        };
        for index in photons {
            let mut rng = FastRng::for_photon(seed, index);
            let mut outcome = simulator.simulate(index, &mut rng)?;
            batch.tally.add(&outcome.stokes)?;
            batch.statistics.record(&outcome);
            batch.paths.append(&mut outcome.paths);
            if keep_outcomes {
                batch.outcomes.push(outcome);
            }
        }
        Ok(batch)
    }
}
