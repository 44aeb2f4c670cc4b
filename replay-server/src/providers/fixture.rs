//! Fixture-backed telemetry source.
//!
//! Reads one JSON dump per session from a data directory: the raw
//! per-lap samples plus session-level info, exactly as the upstream
//! provider contract describes them. Useful for development and for
//! replaying captured sessions without any upstream connectivity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use replay_core::SessionKey;
use replay_pipeline::{
    Entrant, LapTrace, PipelineError, PipelineResult, RawSessionInfo, SessionSource,
};

use crate::session::load::SessionProvider;

/// On-disk shape of one session fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFixture {
    pub entrants: Vec<Entrant>,
    pub info: RawSessionInfo,
    /// Driver code → laps in chronological order.
    pub laps: BTreeMap<String, Vec<LapTrace>>,
}

/// One loaded fixture, served through the provider contract.
pub struct FixtureSource {
    fixture: SessionFixture,
}

impl SessionSource for FixtureSource {
    fn entrants(&self) -> PipelineResult<Vec<Entrant>> {
        Ok(self.fixture.entrants.clone())
    }

    fn laps(&self, code: &str) -> PipelineResult<Vec<LapTrace>> {
        self.fixture
            .laps
            .get(code)
            .cloned()
            .ok_or_else(|| PipelineError::Source(format!("No lap data for driver {code}")))
    }

    fn session_info(&self) -> PipelineResult<RawSessionInfo> {
        Ok(self.fixture.info.clone())
    }
}

/// Opens `{data_dir}/{key}.json` per session.
pub struct FixtureProvider {
    dir: PathBuf,
}

impl FixtureProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SessionProvider for FixtureProvider {
    fn open(&self, key: SessionKey) -> PipelineResult<Box<dyn SessionSource>> {
        let path = self.dir.join(format!("{key}.json"));
        let bytes = fs::read(&path).map_err(|error| {
            PipelineError::Source(format!(
                "No session data at {}: {error}",
                path.display()
            ))
        })?;

        let fixture: SessionFixture = serde_json::from_slice(&bytes).map_err(|error| {
            PipelineError::Source(format!(
                "Unreadable session data at {}: {error}",
                path.display()
            ))
        })?;

        info!(
            key = %key,
            path = %path.display(),
            entrants = fixture.entrants.len(),
            "Opened session fixture"
        );
        Ok(Box::new(FixtureSource { fixture }))
    }
}
