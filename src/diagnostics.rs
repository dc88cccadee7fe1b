//! Optional run output: a per-photon contribution log and the propagation
//! paths traced after scattering events.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MonteCarloError, MonteCarloResult};
use crate::path::PropagationPath;
use crate::photon::PhotonOutcome;

/// A propagation path traced for `photon` after its `scattering_order`-th scattering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPath {
    pub photon: u64,
    pub scattering_order: u32,
    pub path: PropagationPath,
}

/// Line-oriented log of photon contributions.
///
/// One line per photon: index, scattering order, termination and the Stokes
/// elements of its contribution, whitespace separated.
pub struct PhotonLog<W: Write> {
    writer: W,
    lines: u64,
}

impl PhotonLog<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> MonteCarloResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> PhotonLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn write(&mut self, outcome: &PhotonOutcome) -> MonteCarloResult<()> {
        write!(
            self.writer,
            "{} {} {:?}",
            outcome.index, outcome.scattering_order, outcome.termination
        )?;
        for value in outcome.stokes.iter() {
            write!(self.writer, " {:.9e}", value)?;
        }
        writeln!(self.writer)?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> MonteCarloResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Recorded paths written as JSON Lines, one [`RecordedPath`] object per line.
pub struct PathRecorder<W: Write> {
    writer: W,
    paths: u64,
}

impl PathRecorder<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> MonteCarloResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> PathRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, paths: 0 }
    }

    pub fn write(&mut self, path: &RecordedPath) -> MonteCarloResult<()> {
        serde_json::to_writer(&mut self.writer, path)?;
        writeln!(self.writer)?;
        self.paths += 1;
        Ok(())
    }

    pub fn paths(&self) -> u64 {
        self.paths
    }

    pub fn finish(mut self) -> MonteCarloResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Read paths written by a [`PathRecorder`]. Blank lines are skipped.
pub fn read_recorded_paths<P: AsRef<Path>>(path: P) -> MonteCarloResult<Vec<RecordedPath>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<RecordedPath>(line).map_err(MonteCarloError::from))
        .collect()
}
