use std::net::SocketAddr;

use crate::query;

pub struct Config {
	pub bind: SocketAddr,
	pub data_file: String,
	pub api: ApiSettings,
}

/// Behavior switches consumed by the engine.
#[derive(Clone)]
pub struct ApiSettings {
	/// PUT inserts the record when the id (or singleton) does not exist yet.
	pub upsert_on_put: bool,
	/// Wrap listings in a result object with pagination echo and count.
	pub use_result_object: bool,
	/// Page size used when the request does not name one.
	pub default_page_size: usize,
}

impl Default for ApiSettings {
	fn default() -> Self {
		Self {
			upsert_on_put: false,
			use_result_object: false,
			default_page_size: query::DEFAULT_PAGE_SIZE,
		}
	}
}

impl Config {
	pub fn load() -> anyhow::Result<Self> {
		let _ = dotenvy::dotenv();
		let port = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok());
		let bind = if let Some(p) = port {
			format!("127.0.0.1:{}", p)
		} else {
			std::env::var("HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:57602".to_string())
		};
		let bind: SocketAddr = bind.parse()?;
		let data_file = std::env::var("DATA_FILE").unwrap_or_else(|_| "./db.json".to_string());
		let api = ApiSettings {
			upsert_on_put: env_flag("UPSERT_ON_PUT", false),
			use_result_object: env_flag("USE_RESULT_OBJECT", false),
			default_page_size: std::env::var("DEFAULT_PAGE_SIZE")
				.ok()
				.and_then(|v| v.parse().ok())
				.unwrap_or(query::DEFAULT_PAGE_SIZE),
		};
		Ok(Self { bind, data_file, api })
	}
}

fn env_flag(name: &str, default: bool) -> bool {
	std::env::var(name).ok().and_then(|v| v.parse::<bool>().ok()).unwrap_or(default)
}
