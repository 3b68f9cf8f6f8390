use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use uuid::Uuid;

use super::{
	Provenance, RankedResult,
	retrieval::{Candidate, RetrievalSource},
	text::clamp_unit,
};
use recall_config::Ranking;
use recall_storage::models::MemoryRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
	pub vector: f32,
	pub keyword: f32,
	pub hybrid_boost: f32,
	pub tag_boost: f32,
}
impl Default for FusionWeights {
	fn default() -> Self {
		Self::from(&Ranking::default())
	}
}
impl From<&Ranking> for FusionWeights {
	fn from(ranking: &Ranking) -> Self {
		Self {
			vector: ranking.vector_weight,
			keyword: ranking.keyword_weight,
			hybrid_boost: ranking.hybrid_boost,
			tag_boost: ranking.tag_boost,
		}
	}
}

struct Merged {
	record: MemoryRecord,
	vector_score: Option<f32>,
	keyword_score: Option<f32>,
}

/// Merges both candidate lists by memory id into at most `top_k` ranked results.
///
/// Ties keep retrieval order: vector candidates first, then keyword-only ones. The first
/// occurrence wins when a list repeats an id.
pub fn rank(
	vector: Vec<Candidate>,
	keyword: Vec<Candidate>,
	request_tags: &[String],
	top_k: u32,
	weights: &FusionWeights,
) -> Vec<RankedResult> {
	let mut merged: Vec<Merged> = Vec::with_capacity(vector.len() + keyword.len());
	let mut by_id: HashMap<Uuid, usize> = HashMap::new();

	for candidate in vector.into_iter().chain(keyword) {
		let Candidate { record, score, source } = candidate;
		let index = match by_id.get(&record.id).copied() {
			Some(index) => index,
			None => {
				by_id.insert(record.id, merged.len());
				merged.push(Merged { record, vector_score: None, keyword_score: None });

				merged.len() - 1
			},
		};
		let slot = &mut merged[index];
		let target = match source {
			RetrievalSource::Vector => &mut slot.vector_score,
			RetrievalSource::Keyword => &mut slot.keyword_score,
		};

		if target.is_none() {
			*target = Some(score);
		}
	}

	let wanted_tags = normalize_tags(request_tags);
	let mut scored = merged
		.into_iter()
		.map(|entry| {
			let (score, source) = combine(&entry, &wanted_tags, weights);

			(entry.record, score, source)
		})
		.collect::<Vec<_>>();

	scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
	scored.truncate(top_k as usize);

	scored
		.into_iter()
		.enumerate()
		.map(|(index, (record, score, source))| RankedResult {
			id: record.id,
			content: record.content,
			summary: record.summary,
			tags: record.tags,
			project_id: record.project_id,
			created_at: record.created_at,
			score,
			rank: index as u32 + 1,
			source,
		})
		.collect()
}

fn combine(
	entry: &Merged,
	wanted_tags: &HashSet<String>,
	weights: &FusionWeights,
) -> (f32, Provenance) {
	let (mut score, source) = match (entry.vector_score, entry.keyword_score) {
		(Some(vector), Some(keyword)) => {
			let mut score = clamp_unit(vector * weights.vector);

			score = clamp_unit(score + keyword * weights.keyword);
			score = clamp_unit(score + weights.hybrid_boost);

			(score, Provenance::Hybrid)
		},
		(Some(vector), None) => (clamp_unit(vector * weights.vector), Provenance::Vector),
		(None, Some(keyword)) => (clamp_unit(keyword * weights.keyword), Provenance::Keyword),
		(None, None) => (0.0, Provenance::Keyword),
	};

	if !wanted_tags.is_empty()
		&& entry.record.tags.iter().any(|tag| wanted_tags.contains(&tag.trim().to_lowercase()))
	{
		score = clamp_unit(score + weights.tag_boost);
	}

	(score, source)
}

fn normalize_tags(tags: &[String]) -> HashSet<String> {
	tags.iter()
		.map(|tag| tag.trim().to_lowercase())
		.filter(|tag| !tag.is_empty())
		.collect()
}
