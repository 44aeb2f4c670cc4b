//! Shared fixtures for the server integration tests: a tiny synthetic
//! two-driver race behind the provider contract.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use replay_core::{SessionKey, SessionType, TrackGeometry, TyreCompound};
use replay_pipeline::{
    Entrant, LapSummary, LapTrace, PipelineError, PipelineResult, RawSessionInfo, SessionSource,
};
use replay_server::cache::FrameCache;
use replay_server::session::load::LoadOptions;
use replay_server::session::{ProgressEvent, ProgressSubscription};

pub const CIRCUIT: f64 = 1000.0;

pub fn make_lap(number: u32, start: f64, duration: f64) -> LapTrace {
    let n = (duration / 0.5) as usize + 1;
    let times: Vec<f64> = (0..n).map(|i| start + i as f64 * 0.5).collect();
    let frac = |i: usize| i as f64 / (n - 1) as f64;

    LapTrace {
        lap: number,
        tyre: TyreCompound::Soft,
        summary: LapSummary {
            lap_time: Some(duration * 1000.0),
            ..Default::default()
        },
        time: times,
        x: (0..n).map(|i| frac(i) * 100.0).collect(),
        y: vec![0.0; n],
        lap_dist: (0..n).map(|i| CIRCUIT * frac(i)).collect(),
        speed: vec![CIRCUIT / duration * 3.6; n],
        rpm: vec![10_500.0; n],
        throttle: vec![90.0; n],
        brake: vec![0.0; n],
        gear: vec![6; n],
        drs: vec![0; n],
        in_pit: None,
    }
}

pub struct InMemorySource {
    pub entrants: Vec<Entrant>,
    pub laps: BTreeMap<String, Vec<LapTrace>>,
    pub info: RawSessionInfo,
}

impl SessionSource for InMemorySource {
    fn entrants(&self) -> PipelineResult<Vec<Entrant>> {
        Ok(self.entrants.clone())
    }

    fn laps(&self, code: &str) -> PipelineResult<Vec<LapTrace>> {
        self.laps
            .get(code)
            .cloned()
            .ok_or_else(|| PipelineError::Source(format!("no laps for {code}")))
    }

    fn session_info(&self) -> PipelineResult<RawSessionInfo> {
        Ok(self.info.clone())
    }
}

/// Serves a tiny two-driver race; counts how many times it was opened.
pub struct TestProvider {
    opens: AtomicUsize,
    fail: bool,
}

impl TestProvider {
    pub fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl replay_server::session::load::SessionProvider for TestProvider {
    fn open(&self, _key: SessionKey) -> PipelineResult<Box<dyn SessionSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Source("upstream fetch exploded".to_string()));
        }

        let laps = BTreeMap::from([
            (
                "ALB".to_string(),
                vec![make_lap(1, 0.0, 5.0), make_lap(2, 5.0, 5.0)],
            ),
            ("BOT".to_string(), vec![make_lap(1, 0.0, 6.0)]),
        ]);

        Ok(Box::new(InMemorySource {
            entrants: vec![
                Entrant {
                    code: "ALB".to_string(),
                    number: 23,
                    team: "Team ALB".to_string(),
                    color: [0, 80, 160],
                },
                Entrant {
                    code: "BOT".to_string(),
                    number: 77,
                    team: "Team BOT".to_string(),
                    color: [160, 80, 0],
                },
            ],
            laps,
            info: RawSessionInfo {
                total_laps: 2,
                race_start_time: chrono::Utc::now(),
                grid_positions: None,
                classification: None,
                race_end_time: None,
                track_statuses: Vec::new(),
                lap_anchors: Vec::new(),
                weather: Vec::new(),
                track_geometry: TrackGeometry::default(),
                segments: Vec::new(),
            },
        }))
    }
}

pub fn race_key() -> SessionKey {
    SessionKey::new(2024, 6, SessionType::Race)
}

pub fn scratch_cache(tag: &str) -> Arc<FrameCache> {
    let dir: PathBuf = std::env::temp_dir().join(format!(
        "replay-test-{tag}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    Arc::new(FrameCache::new(dir))
}

pub fn options() -> LoadOptions {
    LoadOptions {
        timeout: Duration::from_secs(30),
        preencode_limit: 50_000,
    }
}

/// Drain events until a terminal state arrives.
pub async fn collect_until_terminal(
    subscription: &mut ProgressSubscription,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("subscription closed before terminal event");
        let terminal = event.state.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}
