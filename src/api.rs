// API module for headless mode - HTTP endpoints to interact with the
// simulation

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::config::{SimConfig, Tunables};
use crate::grid::CellKind;
use crate::simulation::Simulation;
use crate::types::{SignalState, SourceId, TendrilId, TendrilState};

// Serializable versions of simulation data for API responses
#[derive(Serialize, Clone)]
pub struct CellData {
    pub x: i32,
    pub y: i32,
    pub kind: CellKind,
    pub opacity: f32,
    pub creation_tick: u64,
    pub is_branch_point: bool,
    pub is_connection_point: bool,
}

#[derive(Serialize, Clone)]
pub struct SourceData {
    pub id: SourceId,
    pub x: i32,
    pub y: i32,
    pub energy: f32,
    pub is_active: bool,
    pub last_activity_tick: u64,
}

#[derive(Serialize, Clone)]
pub struct TendrilData {
    pub id: TendrilId,
    pub source_id: SourceId,
    pub state: TendrilState,
    pub signal_state: SignalState,
    pub signal_position: f32,
    pub opacity: f32,
    pub is_branch: bool,
    pub parent: Option<TendrilId>,
    pub path_len: usize,
    pub head: (i32, i32),
}

#[derive(Serialize, Clone)]
pub struct PelletData {
    pub id: crate::types::FoodId,
    pub origin: (i32, i32),
    pub size: usize,
    pub cells_left: usize,
    pub remaining_energy: f32,
}

#[derive(Serialize, Clone)]
pub struct StatsData {
    pub sources_active: usize,
    pub tendrils_alive: usize,
    pub tendrils_decaying: usize,
    pub pellet_count: usize,
    pub connection_count: usize,
    pub total_energy: f32,
    pub tick: u64,
}

#[derive(Serialize, Clone)]
pub struct SimulationStateResponse {
    pub grid_width: usize,
    pub grid_height: usize,
    /// Non-empty cells only; everything else is Empty.
    pub cells: Vec<CellData>,
    pub sources: Vec<SourceData>,
    pub tendrils: Vec<TendrilData>,
    pub pellets: Vec<PelletData>,
    pub stats: StatsData,
}

#[derive(Deserialize)]
pub struct StepQuery {
    pub steps: Option<usize>,
    /// Tick delta in milliseconds; defaults to one 60 FPS frame.
    pub dt_ms: Option<f32>,
}

#[derive(Deserialize)]
pub struct ResetQuery {
    pub width: Option<usize>,
    pub height: Option<usize>,
}

// Shared state for the API server
#[derive(Clone)]
pub struct ApiState {
    pub simulation: Arc<Mutex<Simulation>>,
    pub rng: Arc<Mutex<ChaCha8Rng>>,
}

impl ApiState {
    pub fn new(sim: Simulation, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            simulation: Arc::new(Mutex::new(sim)),
            rng: Arc::new(Mutex::new(rng)),
        }
    }
}

fn stats_data(sim: &Simulation) -> StatsData {
    let (sources_active, tendrils_alive, tendrils_decaying, pellet_count, total_energy, tick) =
        sim.stats();
    let connection_count = sim
        .grid
        .cells()
        .filter(|(_, c)| c.is_connection_point)
        .count();
    StatsData {
        sources_active,
        tendrils_alive,
        tendrils_decaying,
        pellet_count,
        connection_count,
        total_energy,
        tick,
    }
}

// Helper function to convert simulation state to API response
fn simulation_to_response(sim: &Simulation) -> SimulationStateResponse {
    SimulationStateResponse {
        grid_width: sim.grid.width,
        grid_height: sim.grid.height,
        cells: sim
            .grid
            .cells()
            .filter(|(_, c)| c.kind != CellKind::Empty)
            .map(|((x, y), c)| CellData {
                x,
                y,
                kind: c.kind,
                opacity: c.opacity,
                creation_tick: c.creation_tick,
                is_branch_point: c.is_branch_point,
                is_connection_point: c.is_connection_point,
            })
            .collect(),
        sources: sim
            .sources
            .sources
            .iter()
            .map(|s| SourceData {
                id: s.id,
                x: s.x,
                y: s.y,
                energy: s.energy,
                is_active: s.is_active,
                last_activity_tick: s.last_activity_tick,
            })
            .collect(),
        tendrils: sim
            .tendrils
            .values()
            .map(|t| TendrilData {
                id: t.id,
                source_id: t.source_id,
                state: t.state,
                signal_state: t.signal_state,
                signal_position: t.signal_position,
                opacity: t.opacity,
                is_branch: t.is_branch,
                parent: t.parent,
                path_len: t.path.len(),
                head: t.head(),
            })
            .collect(),
        pellets: sim
            .food
            .pellets
            .values()
            .map(|p| PelletData {
                id: p.id,
                origin: p.origin,
                size: p.size,
                cells_left: p.cells.len(),
                remaining_energy: p.remaining_energy,
            })
            .collect(),
        stats: stats_data(sim),
    }
}

// GET /state - Get current simulation state snapshot
async fn get_state(
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(simulation_to_response(&sim)))
}

// GET /stats - Get simulation statistics
async fn get_stats(State(api_state): State<ApiState>) -> Result<Json<StatsData>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(stats_data(&sim)))
}

// POST /step - Step the simulation forward
async fn step_simulation(
    Query(params): Query<StepQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut rng = api_state
        .rng
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let steps = params.steps.unwrap_or(1).min(10_000);
    let dt_ms = params.dt_ms.unwrap_or(1000.0 / 60.0);

    for _ in 0..steps {
        sim.advance(dt_ms, &mut *rng);
    }

    Ok(Json(simulation_to_response(&sim)))
}

// POST /reset - Reinitialize, optionally with new grid dimensions (the
// resize path). Also recovers from a tick that panicked and poisoned the
// state.
async fn reset_simulation(
    Query(params): Query<ResetQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut rng = api_state
        .rng
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    match (params.width, params.height) {
        (Some(w), Some(h)) => {
            sim.resize(w, h, &mut *rng)
                .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
        }
        _ => sim.reset(&mut *rng),
    }

    Ok(Json(simulation_to_response(&sim)))
}

// POST /pause - Toggle pause
async fn pause_simulation(
    State(api_state): State<ApiState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    sim.toggle_pause();
    Ok(Json(serde_json::json!({ "paused": sim.paused })))
}

// GET /config - Get simulation configuration
async fn get_config(State(api_state): State<ApiState>) -> Result<Json<SimConfig>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(sim.config.clone()))
}

// PUT /params - Update the live tunables (signal frequency, branch
// probability, pulse speed, direction weights)
async fn put_params(
    State(api_state): State<ApiState>,
    Json(tunables): Json<Tunables>,
) -> Result<Json<Tunables>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    sim.set_tunables(tunables)
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok(Json(sim.config.tunables))
}

// Create the API router
pub fn create_router(api_state: ApiState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/stats", get(get_stats))
        .route("/step", post(step_simulation))
        .route("/reset", post(reset_simulation))
        .route("/pause", post(pause_simulation))
        .route("/config", get(get_config))
        .route("/params", put(put_params))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

// Run the API server with automatic simulation stepping
pub async fn run_server(
    api_state: ApiState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(api_state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port, "rhizome headless API server running");
    tracing::info!("GET /state, GET /stats, POST /step?steps=N, POST /reset, POST /pause, GET /config, PUT /params");

    // Spawn background task to continuously step the simulation
    let simulation_task = tokio::spawn(simulation_loop(api_state.clone()));

    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        result = server_handle => {
            result??;
        }
        _ = simulation_task => {
            tracing::error!("simulation loop ended unexpectedly");
        }
    }

    Ok(())
}

// Background task that continuously steps the simulation
async fn simulation_loop(api_state: ApiState) {
    const TARGET_FPS: f32 = 60.0;
    let frame_duration = std::time::Duration::from_secs_f32(1.0 / TARGET_FPS);
    let frame_ms = 1000.0 / TARGET_FPS;

    loop {
        let start = std::time::Instant::now();

        {
            let mut sim = match api_state.simulation.lock() {
                Ok(sim) => sim,
                Err(_) => break,
            };

            if !sim.paused {
                let mut rng = match api_state.rng.lock() {
                    Ok(rng) => rng,
                    Err(_) => break,
                };

                // Handle speed multiplier with accumulator for fractional
                // speeds
                sim.speed_accumulator += sim.speed_multiplier;
                let steps = sim.speed_accumulator.floor() as usize;
                sim.speed_accumulator -= steps as f32;

                for _ in 0..steps {
                    sim.advance(frame_ms, &mut *rng);
                }
            }
        }

        let elapsed = start.elapsed();
        if elapsed < frame_duration {
            tokio::time::sleep(frame_duration - elapsed).await;
        }
    }
}
