use std::{cmp::Ordering, future::Future, time::Duration};

use uuid::Uuid;

use super::text::{self, KeywordMatch};
use crate::{Error, RecordStore, Result};
use recall_config::SearchKeyword;
use recall_storage::{
	models::{MemoryMatch, MemoryRecord},
	queries::{AnnQuery, RecordScope, TextMatchQuery},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalSource {
	Vector,
	Keyword,
}

/// A single-path hit. The record never carries its embedding.
#[derive(Debug, Clone)]
pub struct Candidate {
	pub record: MemoryRecord,
	pub score: f32,
	pub source: RetrievalSource,
}

#[derive(Debug, Clone, Copy)]
pub struct VectorSearch<'a> {
	pub embedding: Option<&'a [f32]>,
	pub project_id: Option<Uuid>,
	pub tags: &'a [String],
	pub limit: u32,
	pub threshold: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct KeywordSearch<'a> {
	pub query: &'a str,
	pub project_id: Option<Uuid>,
	pub limit: u32,
}

/// Nearest records to the query embedding with similarity at or above the threshold.
///
/// Uses the store's ANN index when it has one and falls back to an exact scan when it does not
/// or when the ANN query fails. Errors surface only when the scan fails too.
pub async fn find_by_vector(
	store: &dyn RecordStore,
	search: VectorSearch<'_>,
	timeout: Duration,
) -> Result<Vec<Candidate>> {
	let Some(embedding) = search.embedding.filter(|embedding| !embedding.is_empty()) else {
		return Ok(Vec::new());
	};

	if search.limit == 0 {
		return Ok(Vec::new());
	}

	let scope = RecordScope { project_id: search.project_id, tags: search.tags };

	if store.supports_ann() {
		let query = AnnQuery { embedding, scope, limit: search.limit };

		match bounded("ANN query", timeout, store.ann_search(query)).await {
			Ok(matches) =>
				return Ok(collect_ann_candidates(matches, search.threshold, search.limit)),
			Err(err) => {
				tracing::warn!(error = %err, "ANN query failed. Falling back to exact scan.");
			},
		}
	}

	let records = bounded("Embedding scan", timeout, store.scan_embedded(scope)).await?;

	Ok(score_scanned(records, embedding, search.threshold, search.limit))
}

/// Records sharing query tokens, re-scored locally by token overlap.
///
/// Over-fetches `max(limit * overfetch_multiplier, overfetch_min)` rows so local scoring is not
/// limited to the store's recency order.
pub async fn find_by_keyword(
	store: &dyn RecordStore,
	search: KeywordSearch<'_>,
	cfg: &SearchKeyword,
	timeout: Duration,
) -> Result<Vec<Candidate>> {
	let tokens = text::tokenize_query(search.query);

	if tokens.is_empty() || search.limit == 0 {
		return Ok(Vec::new());
	}

	let fetch_limit = search.limit.saturating_mul(cfg.overfetch_multiplier).max(cfg.overfetch_min);
	let query =
		TextMatchQuery { project_id: search.project_id, tokens: &tokens, limit: fetch_limit };
	let records = bounded("Text match", timeout, store.text_match(query)).await?;
	let phrase = search.query.trim().to_lowercase();
	let mut out = Vec::with_capacity(records.len());

	for mut record in records {
		let KeywordMatch { matched, ratio, score } =
			text::keyword_match(&tokens, &phrase, &record, cfg.phrase_bonus);

		if matched == 0 || matched < cfg.min_matched_tokens as usize || ratio < cfg.min_ratio {
			continue;
		}

		record.embedding = None;

		out.push(Candidate { record, score, source: RetrievalSource::Keyword });
	}

	sort_candidates(&mut out);
	out.truncate(search.limit as usize);

	Ok(out)
}

pub(crate) async fn bounded<T, F>(label: &str, limit: Duration, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	match tokio::time::timeout(limit, fut).await {
		Ok(result) => result,
		Err(_) => Err(Error::Timeout {
			message: format!("{label} exceeded {} ms.", limit.as_millis()),
		}),
	}
}

fn collect_ann_candidates(
	matches: Vec<MemoryMatch>,
	threshold: f32,
	limit: u32,
) -> Vec<Candidate> {
	let mut out = Vec::with_capacity(matches.len());

	for MemoryMatch { mut record, distance } in matches {
		let score = text::distance_to_similarity(distance);

		if score < threshold {
			continue;
		}

		record.embedding = None;

		out.push(Candidate { record, score, source: RetrievalSource::Vector });
	}

	sort_candidates(&mut out);
	out.truncate(limit as usize);

	out
}

fn score_scanned(
	records: Vec<MemoryRecord>,
	embedding: &[f32],
	threshold: f32,
	limit: u32,
) -> Vec<Candidate> {
	let mut out = Vec::new();

	for mut record in records {
		let Some(stored) = record.embedding.take() else { continue };
		// Mismatched dimensionality is skipped, not reported.
		let Some(score) = text::normalized_cosine(embedding, &stored) else { continue };

		if score < threshold {
			continue;
		}

		out.push(Candidate { record, score, source: RetrievalSource::Vector });
	}

	sort_candidates(&mut out);
	out.truncate(limit as usize);

	out
}

/// Score descending, then newest first.
fn sort_candidates(candidates: &mut [Candidate]) {
	candidates.sort_by(|a, b| {
		b.score
			.partial_cmp(&a.score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| b.record.created_at.cmp(&a.record.created_at))
	});
}
