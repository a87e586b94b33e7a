//! Irrigation program model
//!
//! A program is a named, fixed-length list of watering slots. Each slot holds
//! a duration in seconds or is empty; the first empty slot ends the program.
//!
//! Program files are JSON arrays:
//!
//! ```json
//! [{"id": 1, "name": "lawn", "steps": [30, 60, null, null, null, null]}]
//! ```

use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Program validation and lookup errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Invalid number of steps: expected {expected}, got {actual}")]
    InvalidStepCount { expected: usize, actual: usize },

    #[error("No irrigation program with id {0}")]
    NotFound(i64),
}

/// A validated, immutable irrigation program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrrigationProgram {
    id: i64,
    name: String,
    steps: Vec<Option<u32>>,
}

impl IrrigationProgram {
    /// Build a program, requiring exactly `step_count` slots
    ///
    /// Name and id are taken verbatim; durations are not range-checked.
    pub fn new(
        id: i64,
        name: impl Into<String>,
        steps: Vec<Option<u32>>,
        step_count: usize,
    ) -> Result<Self, ProgramError> {
        let name = name.into();
        debug!(id, %name, steps = steps.len(), step_count, "IrrigationProgram::new: called");
        if steps.len() != step_count {
            return Err(ProgramError::InvalidStepCount {
                expected: step_count,
                actual: steps.len(),
            });
        }
        Ok(Self { id, name, steps })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All slots, in order
    pub fn steps(&self) -> &[Option<u32>] {
        &self.steps
    }

    /// Durations of the steps that will run: everything before the first empty slot
    pub fn active_steps(&self) -> impl Iterator<Item = u32> + '_ {
        self.steps.iter().map_while(|s| *s)
    }

    /// Total watering time of the active steps, in seconds
    pub fn total_watering_secs(&self) -> u64 {
        self.active_steps().map(u64::from).sum()
    }
}

impl std::fmt::Display for IrrigationProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps = self
            .steps
            .iter()
            .map(|s| match s {
                Some(secs) => secs.to_string(),
                None => "-".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "id: {}, name: {}, steps: [{}]", self.id, self.name, steps)
    }
}

/// A program record as read from the store, before validation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawProgram {
    pub id: i64,
    pub name: String,
    pub steps: Vec<Option<u32>>,
}

impl RawProgram {
    pub fn validate(self, step_count: usize) -> Result<IrrigationProgram, ProgramError> {
        IrrigationProgram::new(self.id, self.name, self.steps, step_count)
    }
}

/// Find a program by id
///
/// When ids are duplicated the first program in load order wins.
pub fn find(programs: &[IrrigationProgram], id: i64) -> Result<&IrrigationProgram, ProgramError> {
    programs
        .iter()
        .find(|p| p.id == id)
        .ok_or(ProgramError::NotFound(id))
}

/// A record that failed validation while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedProgram {
    /// Position in the source file (0-based)
    pub index: usize,
    pub id: i64,
    pub name: String,
    pub error: ProgramError,
}

/// Result of loading a program file
#[derive(Debug, Clone, Default)]
pub struct LoadedPrograms {
    pub programs: Vec<IrrigationProgram>,
    pub rejected: Vec<RejectedProgram>,
}

impl LoadedPrograms {
    pub fn find(&self, id: i64) -> Result<&IrrigationProgram, ProgramError> {
        find(&self.programs, id)
    }
}

/// Parse program records from JSON
///
/// Malformed JSON fails the whole load; a record with the wrong number of
/// steps is rejected on its own and the rest still load.
pub fn parse_programs(json: &str, step_count: usize) -> Result<LoadedPrograms> {
    let raw: Vec<RawProgram> = serde_json::from_str(json).context("Failed to parse program definitions")?;
    debug!(records = raw.len(), step_count, "parse_programs: parsed records");

    let mut loaded = LoadedPrograms::default();
    for (index, record) in raw.into_iter().enumerate() {
        let (id, name) = (record.id, record.name.clone());
        match record.validate(step_count) {
            Ok(program) => loaded.programs.push(program),
            Err(error) => {
                warn!(index, id, %name, %error, "parse_programs: rejected program");
                loaded.rejected.push(RejectedProgram { index, id, name, error });
            }
        }
    }
    Ok(loaded)
}

/// Load program records from a JSON file
pub fn load_programs(path: impl AsRef<Path>, step_count: usize) -> Result<LoadedPrograms> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program file {}", path.display()))?;
    parse_programs(&content, step_count).with_context(|| format!("Invalid program file {}", path.display()))
}
