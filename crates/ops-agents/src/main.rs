//! Exercise runner.
//!
//! Wires the simulation core and the autonomous team layer into a
//! complete timed session: seeds incident injects, runs one
//! perceive-decide-act cycle per team role per tick (teams in
//! parallel), grades reviews in the background, and prints the final
//! scoreboard.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tokio::task::JoinSet;
use tracing::{debug, info};

use ops_agents::{
    DecisionEngine, DrillConfig, GenerativeService, HttpContentService, ResilientContent,
    ReviewWorker, ReviewWorkerConfig, RoleProfile, TeamSetup,
};
use simulation::timescale::{self, ChallengeWindow};
use simulation::{
    Challenge, ChallengeTracker, Criterion, EventBus, EventLog, GameStore, IncidentSeed, Priority,
    RandomSource, SessionConfig, Severity, SharedGameStore, progress,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Timed ITSM exercise runner", long_about = None)]
struct Args {
    /// Path to a TOML config file (overrides DRILL_* environment defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session duration in minutes
    #[arg(long)]
    duration: Option<u32>,

    /// Number of scheduler ticks to run
    #[arg(long)]
    ticks: Option<u32>,

    /// Seed for the change-outcome random source
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = DrillConfig::load(args.config.as_deref())?;
    if let Some(duration) = args.duration {
        config.session_minutes = duration;
    }
    if let Some(ticks) = args.ticks {
        config.max_ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    info!(
        duration_minutes = config.session_minutes,
        teams = config.teams.len(),
        ticks = config.max_ticks,
        seed = config.seed,
        "Exercise session starting"
    );

    let bus = EventBus::new().shared();
    let history = EventLog::new().shared();
    let store = GameStore::new(
        SessionConfig::with_duration(config.session_minutes),
        bus.clone(),
        history.clone(),
    )
    .shared();

    let tracker = Arc::new(ChallengeTracker::new(bus.clone(), history.clone()));
    let ledger = Arc::new(progress::AchievementLedger::new(
        progress::default_specs(),
        bus.clone(),
        history.clone(),
    ));
    register_challenges(&tracker, &config);

    let primary: Option<Arc<dyn GenerativeService>> = match &config.content_url {
        Some(url) => {
            info!(url = %url, "Using remote content service");
            Some(Arc::new(
                HttpContentService::new(url).map_err(|e| anyhow::anyhow!(e.to_string()))?,
            ))
        }
        None => {
            info!("No content service configured; running on the deterministic fallback");
            None
        }
    };
    let content: Arc<dyn GenerativeService> = Arc::new(ResilientContent::new(primary));

    ReviewWorker::start(
        store.clone(),
        content.clone(),
        &bus,
        ReviewWorkerConfig {
            review_timeout_minutes: config.review_timeout_minutes,
            ..Default::default()
        },
    );
    spawn_progress_listener(
        &bus,
        store.clone(),
        history.clone(),
        tracker.clone(),
        ledger.clone(),
    );

    let engine = Arc::new(DecisionEngine::new(
        store.clone(),
        content,
        Box::new(RandomSource(Pcg64::seed_from_u64(config.seed))),
    ));

    run_session(&config, &store, &engine, &tracker).await;

    print_summary(&config, &store, &tracker, &ledger, &history);
    Ok(())
}

/// Tick loop: inject work, then run every team's cycles in parallel.
/// Cycles for the same team stay serialized inside the engine.
async fn run_session(
    config: &DrillConfig,
    store: &SharedGameStore,
    engine: &Arc<DecisionEngine>,
    tracker: &Arc<ChallengeTracker>,
) {
    for tick in 0..config.max_ticks {
        for team in &config.teams {
            if tick % 6 == 0 {
                inject_incident(store, team, tick);
            }
        }

        let mut cycles = JoinSet::new();
        for team in config.teams.clone() {
            let engine = engine.clone();
            cycles.spawn(async move {
                for role in &team.roles {
                    let profile = RoleProfile {
                        role: *role,
                        aggressive: team.aggressive,
                    };
                    let outcome = engine.run_cycle(&team.id, &profile).await;
                    if let Some(decision) = &outcome.decision {
                        debug!(
                            team_id = %team.id,
                            rule = decision.rule,
                            applied = outcome.applied,
                            "Cycle finished"
                        );
                    }
                }
            });
        }
        while cycles.join_next().await.is_some() {}

        tracker.expire_due(Utc::now());
        tokio::time::sleep(Duration::from_secs(config.tick_interval_secs)).await;
    }
}

/// Forward every bus event into the progress evaluators.
fn spawn_progress_listener(
    bus: &simulation::SharedEventBus,
    store: SharedGameStore,
    history: simulation::SharedEventLog,
    tracker: Arc<ChallengeTracker>,
    ledger: Arc<progress::AchievementLedger>,
) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            tracker.observe(&event, store.as_ref());
            // Achievements derive from history; skip the evaluators'
            // own scoring events to avoid re-entrant evaluation.
            if !matches!(
                event.event_type(),
                "challenge_completed" | "points_awarded" | "achievement_earned"
            ) {
                ledger.evaluate(event.team_id(), &history, store.as_ref());
            }
        }
    });
}

/// Standard challenge set, windows capped to remaining session time.
fn register_challenges(tracker: &ChallengeTracker, config: &DrillConfig) {
    let now = Utc::now();
    let duration = config.session_minutes;
    for team in &config.teams {
        let standard = timescale::cap_to_remaining(
            timescale::challenge_window_minutes(ChallengeWindow::Standard, duration),
            duration,
        );
        tracker.register(Challenge::new(
            &team.id,
            "Rapid response",
            Criterion::EventCount {
                event_type: "incident_resolved".into(),
            },
            3,
            75,
            standard,
            now,
        ));

        let marathon = timescale::cap_to_remaining(
            timescale::challenge_window_minutes(ChallengeWindow::Marathon, duration),
            duration,
        );
        tracker.register(Challenge::new(
            &team.id,
            "Clean board",
            Criterion::QueueCleared,
            0,
            100,
            marathon,
            now,
        ));
    }
}

/// Rotating inject catalog. Deterministic: the tick index picks the
/// scenario.
fn inject_incident(store: &GameStore, team: &TeamSetup, tick: u32) {
    let catalog = [
        (
            "Checkout latency spike",
            Priority::Critical,
            Severity::Sev1,
            vec!["checkout", "payments"],
            500.0,
            true,
        ),
        (
            "Search results stale",
            Priority::High,
            Severity::Sev2,
            vec!["search-index"],
            200.0,
            true,
        ),
        (
            "Batch export failing",
            Priority::Medium,
            Severity::Sev3,
            vec!["reporting"],
            80.0,
            false,
        ),
        (
            "Internal wiki slow",
            Priority::Low,
            Severity::Sev4,
            vec!["wiki"],
            10.0,
            false,
        ),
    ];
    let (title, priority, severity, services, cost, requires_pir) =
        catalog[(tick as usize / 6) % catalog.len()].clone();

    match store.create_incident(IncidentSeed {
        team_id: team.id.clone(),
        title: title.to_string(),
        priority,
        severity,
        cost_per_minute: cost,
        requires_pir,
        affected_services: services.into_iter().map(String::from).collect(),
        sla_minutes: None,
        source_change_id: None,
    }) {
        Ok(incident) => {
            info!(team_id = %team.id, incident_id = %incident.id, priority = %priority, title, "Inject")
        }
        Err(e) => debug!(team_id = %team.id, error = %e, "Inject failed"),
    }
}

fn print_summary(
    config: &DrillConfig,
    store: &GameStore,
    tracker: &ChallengeTracker,
    ledger: &progress::AchievementLedger,
    history: &EventLog,
) {
    info!("Session complete");
    for team in &config.teams {
        let resolved = history.count_for_team(&team.id, "incident_resolved");
        let open = store.open_incident_count(&team.id);
        let earned: Vec<String> = ledger
            .progress(&team.id, history)
            .into_iter()
            .filter(|p| p.earned)
            .map(|p| p.achievement_id)
            .collect();
        info!(
            team_id = %team.id,
            score = tracker.score(&team.id),
            resolved,
            still_open = open,
            achievements = ?earned,
            "Team summary"
        );
    }
    for (team, score) in tracker.scoreboard() {
        info!(team_id = %team, score, "Final standing");
    }
}
