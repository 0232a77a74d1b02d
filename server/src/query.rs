//! Request-independent query logic: nested path resolution, dotted-path
//! filter predicates and pagination normalization. Everything here is pure;
//! the document tree is only ever borrowed, never mutated.

use std::collections::HashMap;

use serde_json::{Map, Value};

pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Query keys that drive pagination; every other key is a filter predicate.
const RESERVED_KEYS: [&str; 6] = ["skip", "take", "offset", "limit", "page", "per_page"];

/// Split a slash-delimited path into segments, dropping empty ones
/// (leading, trailing or doubled slashes).
pub fn split_path(path: &str) -> Vec<&str> {
	path.split('/').filter(|s| !s.is_empty()).collect()
}

/// String form used for id and predicate comparisons. Strings compare
/// without their quotes; everything else uses its JSON text.
pub fn stringify(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// Walk `root` through path segments. An array is entered by matching the
/// segment against each element's "id" field, an object by field name.
/// A segment that matches nothing, including any segment applied to a
/// scalar, resolves to `None`.
pub fn resolve<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
	let mut current = root;
	for segment in segments {
		current = match current {
			Value::Array(items) => items
				.iter()
				.find(|item| item.get("id").map_or(false, |id| stringify(id) == *segment))?,
			Value::Object(map) => map.get(*segment)?,
			_ => return None,
		};
	}
	Some(current)
}

/// A dotted field path with a literal target, e.g. `children.friends.name`
/// = `Castillo`. Matching is by stringified equality at the end of the path.
#[derive(Debug, Clone)]
pub struct Predicate {
	path: Vec<String>,
	target: String,
}

impl Predicate {
	pub fn new(key: &str, target: &str) -> Self {
		Self {
			path: key.split('.').map(str::to_string).collect(),
			target: target.to_string(),
		}
	}

	pub fn matches(&self, document: &Value) -> bool {
		matches_at(document, &self.path, &self.target)
	}
}

/// Existential descent: an array anywhere on the path matches if any of its
/// elements does, uniformly at every nesting level. That includes a path
/// that exhausts on an array: its elements are compared one by one, the
/// array is never compared by its own string form. A missing field fails
/// the predicate, it never errors.
fn matches_at(value: &Value, path: &[String], target: &str) -> bool {
	match value {
		Value::Array(items) => items.iter().any(|item| matches_at(item, path, target)),
		_ if path.is_empty() => stringify(value) == target,
		Value::Object(map) => map
			.get(&path[0])
			.map_or(false, |field| matches_at(field, &path[1..], target)),
		_ => false,
	}
}

/// Turn the non-reserved query parameters into predicates.
pub fn predicates(params: &HashMap<String, String>) -> Vec<Predicate> {
	params
		.iter()
		.filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
		.map(|(key, target)| Predicate::new(key, target))
		.collect()
}

/// Keep the documents for which every predicate holds.
pub fn filter<'a>(items: &'a [Value], predicates: &[Predicate]) -> Vec<&'a Value> {
	items
		.iter()
		.filter(|item| predicates.iter().all(|p| p.matches(item)))
		.collect()
}

/// Which pagination vocabulary the caller used; remembered only so the
/// result envelope can echo the same keys back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
	SkipTake,
	OffsetLimit,
	PagePerPage,
}

#[derive(Debug, Clone, Copy)]
pub struct PageSpec {
	pub skip: usize,
	pub take: usize,
	pub style: PageStyle,
}

/// Parse one pagination key; non-numeric and negative values count as absent.
fn page_param(params: &HashMap<String, String>, key: &str) -> Option<usize> {
	params.get(key).and_then(|v| v.parse::<usize>().ok())
}

/// Normalize the three recognized pagination vocabularies into one
/// (skip, take) pair. Precedence: skip/take, then offset/limit, then
/// page/per_page (1-based), then the defaults (0, `default_take`).
pub fn normalize(params: &HashMap<String, String>, default_take: usize) -> PageSpec {
	let skip = page_param(params, "skip");
	let take = page_param(params, "take");
	if skip.is_some() || take.is_some() {
		return PageSpec {
			skip: skip.unwrap_or(0),
			take: take.unwrap_or(default_take),
			style: PageStyle::SkipTake,
		};
	}
	let offset = page_param(params, "offset");
	let limit = page_param(params, "limit");
	if offset.is_some() || limit.is_some() {
		return PageSpec {
			skip: offset.unwrap_or(0),
			take: limit.unwrap_or(default_take),
			style: PageStyle::OffsetLimit,
		};
	}
	let page = page_param(params, "page");
	let per_page = page_param(params, "per_page");
	if page.is_some() || per_page.is_some() {
		let per_page = per_page.unwrap_or(default_take);
		let page = page.unwrap_or(1).max(1);
		// an absurd page number saturates to an empty page, it never panics
		return PageSpec {
			skip: (page - 1).saturating_mul(per_page),
			take: per_page,
			style: PageStyle::PagePerPage,
		};
	}
	PageSpec { skip: 0, take: default_take, style: PageStyle::SkipTake }
}

/// Wrap a page of results with the pre-pagination match count, echoing the
/// pagination keys the caller used with their resolved values.
pub fn envelope(results: Vec<Value>, count: usize, spec: &PageSpec) -> Value {
	let mut body = Map::new();
	match spec.style {
		PageStyle::SkipTake => {
			body.insert("skip".to_string(), spec.skip.into());
			body.insert("take".to_string(), spec.take.into());
		}
		PageStyle::OffsetLimit => {
			body.insert("offset".to_string(), spec.skip.into());
			body.insert("limit".to_string(), spec.take.into());
		}
		PageStyle::PagePerPage => {
			let page = if spec.take == 0 { 1 } else { spec.skip / spec.take + 1 };
			body.insert("page".to_string(), page.into());
			body.insert("per_page".to_string(), spec.take.into());
		}
	}
	body.insert("results".to_string(), Value::Array(results));
	body.insert("count".to_string(), count.into());
	Value::Object(body)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn split_path_drops_empty_segments() {
		assert_eq!(split_path("parents/1/work"), vec!["parents", "1", "work"]);
		assert_eq!(split_path("/parents//work/"), vec!["parents", "work"]);
		assert!(split_path("").is_empty());
	}

	#[test]
	fn stringify_strips_quotes_from_strings_only() {
		assert_eq!(stringify(&json!("acdc")), "acdc");
		assert_eq!(stringify(&json!(2)), "2");
		assert_eq!(stringify(&json!(true)), "true");
		assert_eq!(stringify(&json!(null)), "null");
	}

	#[test]
	fn resolve_descends_objects_and_arrays_by_id() {
		let root = json!({
			"parents": [
				{ "id": 0, "name": "Berta" },
				{ "id": 1, "name": "Kim", "work": { "companyName": "APEXTRI" } }
			]
		});
		let hit = resolve(&root, &["parents", "1", "work", "companyName"]).unwrap();
		assert_eq!(hit, &json!("APEXTRI"));
		assert_eq!(resolve(&root, &["parents", "1"]).unwrap()["name"], json!("Kim"));
	}

	#[test]
	fn resolve_matches_string_and_numeric_ids_alike() {
		let root = json!([{ "id": "acdc", "text": "Hello" }, { "id": 7, "text": "Bye" }]);
		assert_eq!(resolve(&root, &["acdc"]).unwrap()["text"], json!("Hello"));
		assert_eq!(resolve(&root, &["7"]).unwrap()["text"], json!("Bye"));
	}

	#[test]
	fn resolve_empty_segments_returns_root() {
		let root = json!({ "a": 1 });
		assert_eq!(resolve(&root, &[]).unwrap(), &root);
	}

	#[test]
	fn resolve_dead_ends_are_none() {
		let root = json!({ "parents": [{ "id": 0 }], "name": "x" });
		// missing object field
		assert!(resolve(&root, &["nope"]).is_none());
		// no element with that id
		assert!(resolve(&root, &["parents", "9"]).is_none());
		// non-identifier segment applied to an array
		assert!(resolve(&root, &["parents", "name"]).is_none());
		// descending through a scalar
		assert!(resolve(&root, &["name", "deeper"]).is_none());
	}

	#[test]
	fn predicate_matches_plain_and_nested_fields() {
		let doc = json!({ "name": "Kim", "work": { "companyName": "APEXTRI" }, "age": 32 });
		assert!(Predicate::new("name", "Kim").matches(&doc));
		assert!(Predicate::new("work.companyName", "APEXTRI").matches(&doc));
		assert!(Predicate::new("age", "32").matches(&doc));
		assert!(!Predicate::new("name", "Raymond").matches(&doc));
		// a missing field fails the predicate instead of erroring
		assert!(!Predicate::new("work.title", "boss").matches(&doc));
	}

	#[test]
	fn predicate_is_existential_through_arrays() {
		let doc = json!({
			"children": [
				{ "friends": [{ "name": "Porter" }, { "name": "Castillo" }] },
				{ "friends": [] }
			]
		});
		assert!(Predicate::new("children.friends.name", "Castillo").matches(&doc));
		assert!(!Predicate::new("children.friends.name", "Kim").matches(&doc));
	}

	#[test]
	fn predicate_existential_is_uniform_at_every_array_level() {
		// three array levels, then a scalar array compared by element
		let doc = json!({
			"children": [
				{ "friends": [{ "tags": ["swimmer", "runner"] }] }
			]
		});
		assert!(Predicate::new("children.friends.tags", "swimmer").matches(&doc));
		assert!(!Predicate::new("children.friends.tags", "golfer").matches(&doc));
	}

	#[test]
	fn predicates_skip_reserved_keys() {
		let preds = predicates(&params(&[("skip", "4"), ("take", "10"), ("name", "Kim")]));
		assert_eq!(preds.len(), 1);
		assert!(preds[0].matches(&json!({ "name": "Kim" })));
	}

	#[test]
	fn filter_is_conjunctive_and_idempotent() {
		let items = vec![
			json!({ "name": "Kim", "age": 32 }),
			json!({ "name": "Kim", "age": 40 }),
			json!({ "name": "Raymond", "age": 32 }),
		];
		let preds = predicates(&params(&[("name", "Kim"), ("age", "32")]));
		let matched = filter(&items, &preds);
		assert_eq!(matched.len(), 1);

		let once: Vec<Value> = matched.iter().map(|v| (*v).clone()).collect();
		let twice = filter(&once, &preds);
		assert_eq!(twice.len(), once.len());
	}

	#[test]
	fn filter_without_predicates_passes_everything() {
		let items = vec![json!({ "a": 1 }), json!({ "b": 2 })];
		assert_eq!(filter(&items, &[]).len(), 2);
	}

	#[test]
	fn normalize_defaults_when_nothing_recognized() {
		let spec = normalize(&params(&[]), DEFAULT_PAGE_SIZE);
		assert_eq!(spec.skip, 0);
		assert_eq!(spec.take, 512);
		assert_eq!(spec.style, PageStyle::SkipTake);
	}

	#[test]
	fn normalize_skip_take() {
		let spec = normalize(&params(&[("skip", "4"), ("take", "10")]), 512);
		assert_eq!((spec.skip, spec.take), (4, 10));
		assert_eq!(spec.style, PageStyle::SkipTake);
		// one of the pair is enough to pick the style
		let spec = normalize(&params(&[("take", "10")]), 512);
		assert_eq!((spec.skip, spec.take), (0, 10));
		assert_eq!(spec.style, PageStyle::SkipTake);
	}

	#[test]
	fn normalize_offset_limit() {
		let spec = normalize(&params(&[("offset", "5"), ("limit", "12")]), 512);
		assert_eq!((spec.skip, spec.take), (5, 12));
		assert_eq!(spec.style, PageStyle::OffsetLimit);
	}

	#[test]
	fn normalize_page_per_page_is_one_based() {
		let spec = normalize(&params(&[("page", "1"), ("per_page", "12")]), 512);
		assert_eq!((spec.skip, spec.take), (0, 12));
		assert_eq!(spec.style, PageStyle::PagePerPage);

		let spec = normalize(&params(&[("page", "3"), ("per_page", "10")]), 512);
		assert_eq!((spec.skip, spec.take), (20, 10));

		// page alone takes the default page size; per_page alone means page 1
		let spec = normalize(&params(&[("page", "2")]), 512);
		assert_eq!((spec.skip, spec.take), (512, 512));
		let spec = normalize(&params(&[("per_page", "7")]), 512);
		assert_eq!((spec.skip, spec.take), (0, 7));

		// page=0 is clamped to the first page rather than underflowing
		let spec = normalize(&params(&[("page", "0"), ("per_page", "5")]), 512);
		assert_eq!((spec.skip, spec.take), (0, 5));
	}

	#[test]
	fn normalize_huge_page_numbers_saturate_instead_of_overflowing() {
		// skip would exceed usize::MAX; it must clamp, never panic or wrap
		let spec = normalize(
			&params(&[("page", "4611686018427387904"), ("per_page", "8")]),
			512,
		);
		assert_eq!(spec.skip, usize::MAX);
		assert_eq!(spec.take, 8);
		assert_eq!(spec.style, PageStyle::PagePerPage);

		let max = usize::MAX.to_string();
		let spec = normalize(&params(&[("page", max.as_str())]), 512);
		assert_eq!(spec.skip, usize::MAX);
	}

	#[test]
	fn normalize_invalid_values_fall_through_silently() {
		// unparseable skip is absent, so offset/limit is the detected style
		let spec = normalize(&params(&[("skip", "abc"), ("offset", "5")]), 512);
		assert_eq!((spec.skip, spec.take), (5, 512));
		assert_eq!(spec.style, PageStyle::OffsetLimit);

		// negatives are absent too
		let spec = normalize(&params(&[("skip", "-3"), ("take", "-1")]), 512);
		assert_eq!((spec.skip, spec.take), (0, 512));
		assert_eq!(spec.style, PageStyle::SkipTake);
	}

	#[test]
	fn normalize_skip_take_wins_over_other_styles() {
		let spec = normalize(
			&params(&[("skip", "1"), ("offset", "5"), ("page", "3"), ("per_page", "4")]),
			512,
		);
		assert_eq!((spec.skip, spec.take), (1, 512));
		assert_eq!(spec.style, PageStyle::SkipTake);
	}

	#[test]
	fn envelope_echoes_the_detected_vocabulary() {
		let results = vec![json!({ "id": 0 })];

		let spec = PageSpec { skip: 4, take: 10, style: PageStyle::SkipTake };
		let body = envelope(results.clone(), 20, &spec);
		assert_eq!(body["skip"], json!(4));
		assert_eq!(body["take"], json!(10));
		assert_eq!(body["count"], json!(20));
		assert_eq!(body["results"].as_array().unwrap().len(), 1);

		let spec = PageSpec { skip: 5, take: 12, style: PageStyle::OffsetLimit };
		let body = envelope(results.clone(), 20, &spec);
		assert_eq!(body["offset"], json!(5));
		assert_eq!(body["limit"], json!(12));

		let spec = PageSpec { skip: 24, take: 12, style: PageStyle::PagePerPage };
		let body = envelope(results, 20, &spec);
		assert_eq!(body["page"], json!(3));
		assert_eq!(body["per_page"], json!(12));
	}

	#[test]
	fn envelope_page_echo_survives_zero_take() {
		let spec = PageSpec { skip: 0, take: 0, style: PageStyle::PagePerPage };
		let body = envelope(Vec::new(), 3, &spec);
		assert_eq!(body["page"], json!(1));
		assert_eq!(body["per_page"], json!(0));
	}
}
