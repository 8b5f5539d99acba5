mod db;
pub mod demo;
pub mod derived;
pub mod models;
pub mod realtime;
pub mod reconcile;
pub mod settings;
pub mod snapshot;
pub mod store;
mod utils;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::{sync::watch, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

pub use db::Database;
use demo::DemoSimulator;
use derived::SegmentState;
use settings::SettingsStore;
use store::{Credentials, SortOrder, StoreClient};
use views::{
    DashboardView, TrackerOptions, TrackerView, TransactionsOptions, TransactionsView,
    UnitDetailView, ViewState,
};

pub(crate) struct AppState {
    pub(crate) db: Arc<Database>,
    pub(crate) client: StoreClient,
    pub(crate) settings: SettingsStore,
}

impl AppState {
    async fn start() -> Result<Self> {
        let settings = SettingsStore::from_env()?;
        info!("Using settings file {}", settings.path().display());

        let store_settings = settings.store();
        let database = match &store_settings.database_path {
            Some(path) => Database::new(path.clone())?,
            None => Database::in_memory()?,
        };
        let db = Arc::new(database);
        let client = StoreClient::from_backend(db.clone());

        let session = client
            .ensure_signed_in(&settings.credentials())
            .await
            .context("failed to sign in operator")?;
        info!(
            "Operator {} signed in until {}",
            session.user.email, session.expires_at
        );

        Ok(Self {
            db,
            client,
            settings,
        })
    }
}

/// Keep the operator session fresh, signing in again if a refresh is
/// refused.
fn spawn_session_refresh(
    client: StoreClient,
    credentials: Credentials,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match client.auth().refresh_session().await {
                        Ok(session) => info!("Session refreshed until {}", session.expires_at),
                        Err(err) => {
                            warn!("Session refresh failed ({err}); signing in again");
                            if let Err(err) = client.ensure_signed_in(&credentials).await {
                                error!("Failed to restore operator session: {err}");
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Log a line for every published state of a view.
fn spawn_state_logger<T, F>(
    name: &'static str,
    mut state: watch::Receiver<ViewState<T>>,
    describe: F,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let line = match &*state.borrow_and_update() {
                        ViewState::Loading => format!("{name}: loading"),
                        ViewState::Ready(value) => format!("{name}: {}", describe(value)),
                        ViewState::Failed(message) => format!("{name}: {message}"),
                    };
                    info!("{line}");
                }
            }
        }
    })
}

/// Show the detail view of one unit once, then unmount it.
async fn log_unit_detail(client: &StoreClient, unit_code: &str) {
    let view = UnitDetailView::mount(client, unit_code);
    let mut state = view.watch_state();
    let settled = state.wait_for(|state| !state.is_loading()).await.map(|s| s.clone());

    match settled {
        Ok(ViewState::Ready(detail)) => {
            let stages: Vec<String> = detail
                .timeline
                .iter()
                .map(|stage| format!("{}={:?}", stage.name, stage.state))
                .collect();
            info!(
                "Unit {} at {} for {}: {}",
                detail.unit.code,
                detail.unit.station,
                detail.station_duration,
                stages.join(", ")
            );
        }
        Ok(ViewState::Failed(message)) => warn!("Unit {unit_code}: {message}"),
        Ok(ViewState::Loading) | Err(_) => {}
    }
    view.unmount().await;
}

async fn run_app() -> Result<()> {
    let app = AppState::start().await?;
    let realtime = app.settings.realtime();
    let demo = app.settings.demo();
    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    background.push(spawn_session_refresh(
        app.client.clone(),
        app.settings.credentials(),
        realtime.session_refresh_interval(),
        shutdown.clone(),
    ));

    if demo.enabled {
        let mut simulator = DemoSimulator::new(app.client.clone());
        simulator
            .seed_if_empty(demo.seed_units)
            .await
            .context("failed to seed demo data")?;
        background.push(simulator.spawn(demo.simulation_interval(), shutdown.clone()));
    }

    let tracker = TrackerView::mount(
        &app.client,
        TrackerOptions {
            realtime: realtime.enabled,
            auto_refresh: realtime.auto_refresh.then(|| realtime.refresh_interval()),
        },
    );
    let transactions = TransactionsView::mount(
        &app.client,
        TransactionsOptions {
            realtime: realtime.enabled,
            order: SortOrder::Descending,
        },
    );
    let dashboard = DashboardView::mount(&app.client, realtime.enabled);

    background.push(spawn_state_logger(
        "tracker",
        tracker.watch_state(),
        |rows| match rows.first() {
            Some(newest) => {
                let bar: String = newest
                    .segments()
                    .iter()
                    .map(|segment| match segment.state {
                        SegmentState::Complete => '#',
                        SegmentState::Active => '>',
                        SegmentState::Pending => '.',
                    })
                    .collect();
                format!(
                    "{} sarees on the floor, newest {} [{bar}] {} at {}",
                    rows.len(),
                    newest.unit.code,
                    newest.station_duration,
                    newest.unit.station
                )
            }
            None => "no sarees on the floor".to_string(),
        },
        shutdown.clone(),
    ));
    background.push(spawn_state_logger(
        "transactions",
        transactions.watch_state(),
        |rows| match rows.first() {
            Some(latest) => format!(
                "{} movements, latest {} {} -> {}",
                rows.len(),
                latest.unit_code,
                latest.from_station,
                latest.to_station
            ),
            None => "no movements yet".to_string(),
        },
        shutdown.clone(),
    ));
    background.push(spawn_state_logger(
        "dashboard",
        dashboard.watch_state(),
        |snapshot| {
            format!(
                "{} in production, {}/{} completed today ({}%), WIP {}",
                snapshot.summary.total_in_production,
                snapshot.summary.daily_completed,
                snapshot.summary.daily_target,
                snapshot.summary.completion_percent,
                snapshot.wip.total
            )
        },
        shutdown.clone(),
    ));

    let mut tracker_state = tracker.watch_state();
    let first_code = match tracker_state.wait_for(|state| !state.is_loading()).await {
        Ok(state) => state
            .ready()
            .and_then(|rows| rows.first())
            .map(|row| row.unit.code.clone()),
        Err(_) => None,
    };
    if let Some(code) = first_code {
        log_unit_detail(&app.client, &code).await;
    }

    info!(
        "Saree tracker running (live updates: {}); press Ctrl-C to stop",
        dashboard.live_updates_enabled()
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down...");
    shutdown.cancel();
    tracker.unmount().await;
    transactions.unmount().await;
    dashboard.unmount().await;
    for task in background {
        if let Err(err) = task.await {
            error!("Background task failed: {err}");
        }
    }

    app.client.dispose().await.context("failed to sign out")?;
    match app.db.path() {
        Some(path) => info!("Store kept at {}", path.display()),
        None => info!("In-memory store discarded"),
    }
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Saree tracker starting up...");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run_app()) {
        error!("Saree tracker stopped: {err:#}");
        std::process::exit(1);
    }
}
