use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Flat-file JSON document store. The whole database is one JSON object:
/// each top-level key is a collection, an array value is a multi-item
/// collection and an object value is a single-item collection.
///
/// The tree lives behind one read-write lock: listings take shared access,
/// mutations take exclusive access and persist before releasing it, so a
/// reader never observes a half-applied write.
pub struct DataStore {
	path: PathBuf,
	tree: RwLock<Map<String, Value>>,
}

impl DataStore {
	/// Load the database file, or start empty when it does not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let tree = if path.exists() {
			let raw = std::fs::read_to_string(&path)
				.with_context(|| format!("read {}", path.display()))?;
			match serde_json::from_str::<Value>(&raw)
				.with_context(|| format!("parse {}", path.display()))?
			{
				Value::Object(map) => map,
				_ => anyhow::bail!("{} must hold a top-level JSON object", path.display()),
			}
		} else {
			Map::new()
		};
		Ok(Self { path, tree: RwLock::new(tree) })
	}

	/// Shared snapshot for the load-filter-paginate path.
	pub async fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
		self.tree.read().await
	}

	/// Known collection names, in stored order.
	pub async fn collections(&self) -> Vec<String> {
		self.tree.read().await.keys().cloned().collect()
	}

	/// Exclusive access for the locate-decide-persist path of a mutation.
	pub async fn write(&self) -> StoreWriter<'_> {
		StoreWriter { guard: self.tree.write().await, path: &self.path }
	}
}

pub struct StoreWriter<'a> {
	guard: RwLockWriteGuard<'a, Map<String, Value>>,
	path: &'a Path,
}

impl StoreWriter<'_> {
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.guard.get(name)
	}

	/// Replace one collection and persist the whole tree before returning.
	/// The bytes go to a sibling temp file first and are renamed over the
	/// database, so a crash mid-write cannot leave a truncated file behind.
	pub fn commit(&mut self, name: &str, state: Value) -> Result<()> {
		self.guard.insert(name.to_string(), state);
		let bytes = serde_json::to_vec_pretty(&*self.guard)?;
		let tmp = self.path.with_extension("json.tmp");
		std::fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
		std::fs::rename(&tmp, self.path)
			.with_context(|| format!("rename over {}", self.path.display()))?;
		Ok(())
	}
}
