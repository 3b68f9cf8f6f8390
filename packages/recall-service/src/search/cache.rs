use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Provenance, RankedResult, fusion::FusionWeights, text::clamp_unit};
use crate::{Error, Result};

pub const SEARCH_CACHE_SCHEMA_VERSION: u32 = 2;

const SEARCH_CACHE_KEY_PREFIX: &str = "search:";

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchCachePayload {
	pub schema_version: u32,
	pub items: Vec<RankedResult>,
}

/// Items read back from the cache. `repaired` is set when a legacy entry had to be migrated and
/// should be rewritten.
#[derive(Debug)]
pub struct CachedItems {
	pub items: Vec<RankedResult>,
	pub repaired: bool,
}

/// An item as written by older cache generations: provenance may be missing or stored under
/// `search_type`, rank may be missing, and scores may exceed 1. When both `source` and
/// `search_type` are present, `source` wins.
#[derive(Debug, Deserialize)]
struct LegacyItem {
	id: Uuid,
	content: String,
	#[serde(default)]
	summary: Option<String>,
	#[serde(default)]
	tags: Option<Vec<String>>,
	project_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	created_at: OffsetDateTime,
	#[serde(default)]
	score: Option<f32>,
	#[serde(default)]
	source: Option<Provenance>,
	#[serde(default)]
	search_type: Option<Provenance>,
}

/// Deterministic cache key over the query, project scope, tags, and candidate limit.
///
/// `tags` are sorted so their order does not matter. The similarity threshold and `top_k` are
/// not part of the key, so a repeat of a request that differs only in those within the TTL is
/// served the list cut by the earlier request.
pub fn build_search_cache_key(
	query: &str,
	project_id: Option<Uuid>,
	tags: &[String],
	limit: u32,
) -> Result<String> {
	let mut sorted_tags = tags.to_vec();

	sorted_tags.sort();

	let payload = serde_json::json!({
		"kind": "search",
		"query": query.trim(),
		"project_id": project_id,
		"tags": sorted_tags,
		"limit": limit,
	});
	let raw = serde_json::to_vec(&payload).map_err(|err| Error::Cache {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(format!("{SEARCH_CACHE_KEY_PREFIX}{}", blake3::hash(&raw).to_hex()))
}

/// Short form of a cache key for logs.
pub fn cache_key_prefix(key: &str) -> &str {
	let hash = key.strip_prefix(SEARCH_CACHE_KEY_PREFIX).unwrap_or(key);

	hash.get(..12).unwrap_or(hash)
}

pub fn encode_payload(items: &[RankedResult]) -> Result<Value> {
	serde_json::to_value(SearchCachePayload {
		schema_version: SEARCH_CACHE_SCHEMA_VERSION,
		items: items.to_vec(),
	})
	.map_err(|err| Error::Cache { message: format!("Failed to encode cache payload: {err}") })
}

/// Decodes a cached value, migrating older layouts.
///
/// Accepted layouts are the current versioned object, a version 1 object, an object without a
/// version, and a bare array of items. Anything else is an error and should be treated as a
/// miss.
pub fn decode_payload(value: Value, weights: &FusionWeights) -> Result<CachedItems> {
	let items = match value {
		Value::Array(items) => return repair_items(items, weights),
		Value::Object(mut map) => {
			let version = map.get("schema_version").and_then(Value::as_u64);
			let Some(Value::Array(items)) = map.remove("items") else {
				return Err(Error::Cache {
					message: "Cache payload has no items array.".to_string(),
				});
			};

			match version {
				Some(version) if version == u64::from(SEARCH_CACHE_SCHEMA_VERSION) => items,
				Some(version) if version > u64::from(SEARCH_CACHE_SCHEMA_VERSION) =>
					return Err(Error::Cache {
						message: format!("Unsupported cache schema version {version}."),
					}),
				_ => return repair_items(items, weights),
			}
		},
		_ => {
			return Err(Error::Cache {
				message: "Cache payload is not an object or array.".to_string(),
			});
		},
	};
	let current = serde_json::from_value::<Vec<RankedResult>>(Value::Array(items.clone()));

	match current {
		Ok(items) => Ok(CachedItems { items, repaired: false }),
		// Written by a newer schema but missing fields; repair rather than drop it.
		Err(_) => repair_items(items, weights),
	}
}

fn repair_items(items: Vec<Value>, weights: &FusionWeights) -> Result<CachedItems> {
	let mut out = Vec::with_capacity(items.len());

	for (index, item) in items.into_iter().enumerate() {
		let legacy: LegacyItem = serde_json::from_value(item).map_err(|err| Error::Cache {
			message: format!("Invalid legacy cache item at position {index}: {err}"),
		})?;
		let score = clamp_unit(legacy.score.unwrap_or(0.0));
		let source = legacy
			.source
			.or(legacy.search_type)
			.unwrap_or_else(|| infer_provenance(score, weights));

		out.push(RankedResult {
			id: legacy.id,
			content: legacy.content,
			summary: legacy.summary,
			tags: legacy.tags.unwrap_or_default(),
			project_id: legacy.project_id,
			created_at: legacy.created_at,
			score,
			rank: index as u32 + 1,
			source,
		});
	}

	Ok(CachedItems { items: out, repaired: true })
}

/// Best guess at how a score was produced. A single path can contribute at most its weight, so
/// anything above the vector weight needed both paths.
fn infer_provenance(score: f32, weights: &FusionWeights) -> Provenance {
	if score > weights.vector {
		Provenance::Hybrid
	} else if score > weights.keyword {
		Provenance::Vector
	} else {
		Provenance::Keyword
	}
}
