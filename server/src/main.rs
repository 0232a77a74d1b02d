use std::{sync::Arc, time::Duration, time::Instant};

use anyhow::Result;
use axum::http::StatusCode;
use axum::{
	response::{IntoResponse, Response},
	routing::get,
	Json, Router,
};
use clap::Parser;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod engine;
mod query;
mod store;

use engine::{EngineError, Outcome};
use store::DataStore;

#[derive(Parser, Debug)]
#[command(name = "fake-json-server", version, about = "REST-shaped backend over an arbitrary JSON data file")]
struct Cli {
	/// Bind address for the HTTP server
	#[arg(long, env = "HTTP_BIND", default_value = "127.0.0.1:57602")]
	bind: String,

	/// JSON database file
	#[arg(long, env = "DATA_FILE", default_value = "./db.json")]
	file: String,

	/// PUT inserts the record when the id does not exist yet
	#[arg(long, env = "UPSERT_ON_PUT")]
	upsert_on_put: bool,

	/// Wrap listing responses in a result object with count metadata
	#[arg(long, env = "USE_RESULT_OBJECT")]
	use_result_object: bool,

	/// Page size used when the request does not name one
	#[arg(long, env = "DEFAULT_PAGE_SIZE")]
	default_page_size: Option<usize>,
}

struct AppState {
	start_time: Instant,
	store: DataStore,
	api: config::ApiSettings,
}

#[derive(Serialize)]
struct Health {
	status: &'static str,
	uptime: String,
	version: &'static str,
}

#[inline]
fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>, details: Option<serde_json::Value>) -> Response {
	let body = serde_json::json!({ "error": { "code": code, "message": message.into(), "details": details } });
	(status, Json(body)).into_response()
}

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	let env_cfg = config::Config::load().unwrap_or_else(|_| config::Config {
		bind: "127.0.0.1:57602".parse().unwrap(),
		data_file: "./db.json".to_string(),
		api: config::ApiSettings::default(),
	});
	let cli = Cli::parse();

	let data_file = if cli.file != "./db.json" { cli.file.clone() } else { env_cfg.data_file.clone() };
	let bind_addr: std::net::SocketAddr = if cli.bind != "127.0.0.1:57602" { cli.bind.parse().expect("Invalid bind") } else { env_cfg.bind };
	let api = config::ApiSettings {
		upsert_on_put: cli.upsert_on_put || env_cfg.api.upsert_on_put,
		use_result_object: cli.use_result_object || env_cfg.api.use_result_object,
		default_page_size: cli.default_page_size.unwrap_or(env_cfg.api.default_page_size),
	};

	let store = DataStore::open(&data_file)?;
	let state = Arc::new(AppState { start_time: Instant::now(), store, api });

	info!(%bind_addr, %data_file, "Starting fake JSON server");
	let app = build_router(state);
	let listener = tokio::net::TcpListener::bind(bind_addr).await?;
	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;
	Ok(())
}

fn init_tracing() {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let fmt_layer = fmt::layer().with_target(false);
	tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

fn build_router(state: Arc<AppState>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api", get(get_collections))
		.route("/api/:collection", get(get_items).post(post_item).put(put_single_item))
		.route("/api/:collection/:id", get(get_item).put(put_item))
		.route("/api/:collection/:id/*path", get(get_nested))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn shutdown_signal() {
	let _ = signal::ctrl_c().await;
}

/// Map engine outcomes to wire statuses: Ok 200, Created 201, NoContent 204,
/// BadRequest 400, NotFound 404, Conflict 409, persistence failure 500.
fn respond(result: Result<Outcome, EngineError>) -> Response {
	match result {
		Ok(Outcome::Body(value)) => Json(value).into_response(),
		Ok(Outcome::Created(value)) => (StatusCode::CREATED, Json(value)).into_response(),
		Ok(Outcome::NoContent) => StatusCode::NO_CONTENT.into_response(),
		Err(EngineError::BadRequest(msg)) => json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
		Err(EngineError::NotFound) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found", None),
		Err(EngineError::Conflict) => json_error(StatusCode::CONFLICT, "CONFLICT", "Conflict", None),
		Err(EngineError::Internal(err)) => {
			error!(%err, "persistence failure");
			json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string(), None)
		}
	}
}

async fn health(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Json<Health> {
	Json(Health {
		status: "Healthy",
		uptime: format_uptime(state.start_time.elapsed()),
		version: env!("CARGO_PKG_VERSION"),
	})
}

fn format_uptime(elapsed: Duration) -> String {
	let mins = elapsed.as_secs() / 60;
	format!("{} days, {} hours, {} minutes", mins / (60 * 24), (mins / 60) % 24, mins % 60)
}

async fn get_collections(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Response {
	respond(Ok(engine::collection_names(&state.store).await))
}

async fn get_items(
	axum::extract::Path(collection): axum::extract::Path<String>,
	axum::extract::Query(params): axum::extract::Query<std::collections::HashMap<String, String>>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Response {
	respond(engine::get_items(&state.store, &state.api, &collection, &params).await)
}

async fn post_item(
	axum::extract::Path(collection): axum::extract::Path<String>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
	Json(body): Json<JsonValue>,
) -> Response {
	respond(engine::add_new_item(&state.store, &collection, body).await)
}

async fn put_single_item(
	axum::extract::Path(collection): axum::extract::Path<String>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
	Json(body): Json<JsonValue>,
) -> Response {
	respond(engine::replace_single_item(&state.store, &state.api, &collection, body).await)
}

async fn get_item(
	axum::extract::Path((collection, id)): axum::extract::Path<(String, String)>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Response {
	respond(engine::get_item(&state.store, &collection, &id).await)
}

async fn put_item(
	axum::extract::Path((collection, id)): axum::extract::Path<(String, String)>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
	Json(body): Json<JsonValue>,
) -> Response {
	respond(engine::replace_item(&state.store, &state.api, &collection, &id, body).await)
}

async fn get_nested(
	axum::extract::Path((collection, id, path)): axum::extract::Path<(String, String, String)>,
	axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Response {
	respond(engine::get_nested(&state.store, &collection, &id, &path).await)
}
