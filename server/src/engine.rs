//! The per-request state machine over the document store: listing with
//! filters and pagination, id and nested-path reads, and the
//! insert/replace/upsert mutations with their conflict and not-found policy.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::ApiSettings;
use crate::query;
use crate::store::DataStore;

/// Successful terminal outcomes; the transport maps these to 200/201/204.
pub enum Outcome {
	Body(Value),
	Created(Value),
	NoContent,
}

pub enum EngineError {
	BadRequest(&'static str),
	NotFound,
	Conflict,
	Internal(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
	fn from(err: anyhow::Error) -> Self {
		EngineError::Internal(err)
	}
}

/// Collection names in stored order.
pub async fn collection_names(store: &DataStore) -> Outcome {
	Outcome::Body(json!(store.collections().await))
}

/// List a collection. A single-item collection returns its sole object and
/// ignores filters and pagination; an unknown collection lists as empty
/// rather than erroring.
pub async fn get_items(
	store: &DataStore,
	api: &ApiSettings,
	collection: &str,
	params: &HashMap<String, String>,
) -> Result<Outcome, EngineError> {
	let tree = store.read().await;
	let items: &[Value] = match tree.get(collection) {
		Some(Value::Array(items)) => items,
		Some(single) => return Ok(Outcome::Body(single.clone())),
		None => &[],
	};
	let predicates = query::predicates(params);
	let matched = query::filter(items, &predicates);
	let spec = query::normalize(params, api.default_page_size);
	let page: Vec<Value> = matched
		.iter()
		.skip(spec.skip)
		.take(spec.take)
		.map(|item| (*item).clone())
		.collect();
	if api.use_result_object {
		Ok(Outcome::Body(query::envelope(page, matched.len(), &spec)))
	} else {
		Ok(Outcome::Body(Value::Array(page)))
	}
}

/// Fetch one record by id from a multi-item collection.
pub async fn get_item(
	store: &DataStore,
	collection: &str,
	id: &str,
) -> Result<Outcome, EngineError> {
	let tree = store.read().await;
	let items = match tree.get(collection) {
		Some(Value::Array(items)) => items,
		Some(_) => return Err(EngineError::BadRequest(SINGLE_HAS_NO_ID)),
		None => return Err(EngineError::NotFound),
	};
	items
		.iter()
		.find(|item| has_id(item, id))
		.map(|item| Outcome::Body(item.clone()))
		.ok_or(EngineError::NotFound)
}

/// Resolve a nested path inside the record addressed by id.
pub async fn get_nested(
	store: &DataStore,
	collection: &str,
	id: &str,
	path: &str,
) -> Result<Outcome, EngineError> {
	let tree = store.read().await;
	let root = match tree.get(collection) {
		Some(root @ Value::Array(_)) => root,
		Some(_) => return Err(EngineError::BadRequest(SINGLE_HAS_NO_ID)),
		None => return Err(EngineError::NotFound),
	};
	let mut segments = vec![id];
	segments.extend(query::split_path(path));
	query::resolve(root, &segments)
		.map(|value| Outcome::Body(value.clone()))
		.ok_or(EngineError::NotFound)
}

/// Insert a record. Into a multi-item collection: conflict on a duplicate
/// id, next free integer id when the body carries none. An unknown
/// collection is created on the fly; an existing singleton already holds
/// content and conflicts.
pub async fn add_new_item(
	store: &DataStore,
	collection: &str,
	item: Value,
) -> Result<Outcome, EngineError> {
	let mut item = as_object(item)?;
	let mut tx = store.write().await;
	let mut items = match tx.get(collection) {
		Some(Value::Array(items)) => items.clone(),
		Some(_) => return Err(EngineError::Conflict),
		None => Vec::new(),
	};
	let id = match item.get("id") {
		Some(id) => {
			let id = id.clone();
			let wanted = query::stringify(&id);
			if items.iter().any(|existing| has_id(existing, &wanted)) {
				return Err(EngineError::Conflict);
			}
			id
		}
		None => {
			let id = next_id(&items);
			item.insert("id".to_string(), id.clone());
			id
		}
	};
	items.push(Value::Object(item));
	tx.commit(collection, Value::Array(items))?;
	Ok(Outcome::Created(json!({ "id": id })))
}

/// Replace the record addressed by id; with upsert enabled a missing record
/// (or collection) is inserted instead of reporting not-found.
pub async fn replace_item(
	store: &DataStore,
	api: &ApiSettings,
	collection: &str,
	id: &str,
	item: Value,
) -> Result<Outcome, EngineError> {
	let mut item = as_object(item)?;
	// the id in the address wins over whatever the body carries
	item.insert("id".to_string(), id_value(id));
	let mut tx = store.write().await;
	let mut items = match tx.get(collection) {
		Some(Value::Array(items)) => items.clone(),
		Some(_) => return Err(EngineError::BadRequest(SINGLE_HAS_NO_ID)),
		None if api.upsert_on_put => Vec::new(),
		None => return Err(EngineError::NotFound),
	};
	match items.iter().position(|existing| has_id(existing, id)) {
		Some(pos) => items[pos] = Value::Object(item),
		None if api.upsert_on_put => items.push(Value::Object(item)),
		None => return Err(EngineError::NotFound),
	}
	tx.commit(collection, Value::Array(items))?;
	Ok(Outcome::NoContent)
}

/// Replace the whole object of a single-item collection; with upsert
/// enabled a missing collection is created.
pub async fn replace_single_item(
	store: &DataStore,
	api: &ApiSettings,
	collection: &str,
	item: Value,
) -> Result<Outcome, EngineError> {
	let item = as_object(item)?;
	let mut tx = store.write().await;
	match tx.get(collection) {
		Some(Value::Array(_)) => return Err(EngineError::BadRequest(NOT_A_SINGLE)),
		Some(_) => {}
		None if api.upsert_on_put => {}
		None => return Err(EngineError::NotFound),
	}
	tx.commit(collection, Value::Object(item))?;
	Ok(Outcome::NoContent)
}

const SINGLE_HAS_NO_ID: &str = "single-item collections are not addressed by id";
const NOT_A_SINGLE: &str = "collection holds an array, address records by id";

fn has_id(item: &Value, id: &str) -> bool {
	item.get("id").map_or(false, |v| query::stringify(v) == id)
}

fn as_object(item: Value) -> Result<Map<String, Value>, EngineError> {
	match item {
		Value::Object(map) => Ok(map),
		_ => Err(EngineError::BadRequest("body must be a JSON object")),
	}
}

/// Next free integer id; non-numeric ids do not take part in numbering.
fn next_id(items: &[Value]) -> Value {
	let max = items
		.iter()
		.filter_map(|item| item.get("id"))
		.filter_map(Value::as_i64)
		.max();
	json!(max.map_or(0, |m| m + 1))
}

/// An id taken from the request path keeps its numeric form when it parses
/// as an integer, otherwise it stays a string.
fn id_value(id: &str) -> Value {
	id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id))
}
