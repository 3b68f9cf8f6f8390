use std::collections::HashSet;

use recall_storage::models::MemoryRecord;

/// Shortest token kept by [`tokenize_query`], in characters.
pub const MIN_TOKEN_CHARS: usize = 3;

const STOPWORDS: &[&str] = &[
	"about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
	"between", "both", "but", "can", "could", "did", "does", "doing", "during", "each", "few",
	"for", "from", "had", "has", "have", "her", "here", "hers", "him", "his", "how", "into",
	"its", "just", "more", "most", "nor", "not", "now", "off", "once", "only", "other", "our",
	"ours", "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the",
	"their", "theirs", "them", "then", "there", "these", "they", "this", "those", "through",
	"too", "under", "until", "very", "was", "were", "what", "when", "where", "which", "while",
	"who", "whom", "why", "will", "with", "would", "you", "your", "yours",
];
const QUESTION_WORDS: &[&str] = &["how", "what", "why", "when", "where", "which", "who"];
const CONCEPTUAL_TERMS: &[&str] =
	&["pattern", "approach", "method", "technique", "strategy", "concept"];

/// How a record's text lines up with the query tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordMatch {
	pub matched: usize,
	/// `matched / total` before any bonus.
	pub ratio: f32,
	/// Ratio plus the phrase bonus, clamped to `[0, 1]`.
	pub score: f32,
}

/// Lowercase alphanumeric runs with stopwords and short tokens removed, deduplicated in first
/// occurrence order.
pub fn tokenize_query(query: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in words(query) {
		if token.chars().count() < MIN_TOKEN_CHARS || STOPWORDS.contains(&token.as_str()) {
			continue;
		}
		if seen.insert(token.clone()) {
			out.push(token);
		}
	}

	out
}

/// Lowercased content, summary, and tags joined by spaces.
pub fn searchable_text(record: &MemoryRecord) -> String {
	let mut text = record.content.to_lowercase();

	if let Some(summary) = record.summary.as_deref() {
		text.push(' ');
		text.push_str(&summary.to_lowercase());
	}

	for tag in &record.tags {
		text.push(' ');
		text.push_str(&tag.to_lowercase());
	}

	text
}

/// Scores `record` against pre-tokenized query terms.
///
/// Tokens match as substrings of [`searchable_text`]. `phrase` is the lowercased, trimmed query;
/// finding it verbatim adds `phrase_bonus`.
pub fn keyword_match(
	tokens: &[String],
	phrase: &str,
	record: &MemoryRecord,
	phrase_bonus: f32,
) -> KeywordMatch {
	if tokens.is_empty() {
		return KeywordMatch { matched: 0, ratio: 0.0, score: 0.0 };
	}

	let text = searchable_text(record);
	let matched = tokens.iter().filter(|token| text.contains(token.as_str())).count();
	let ratio = matched as f32 / tokens.len() as f32;
	let mut score = clamp_unit(ratio);

	if !phrase.is_empty() && text.contains(phrase) {
		score = clamp_unit(score + phrase_bonus);
	}

	KeywordMatch { matched, ratio, score }
}

/// Cosine similarity mapped from `[-1, 1]` onto `[0, 1]`.
///
/// Returns `None` when the vectors differ in length or are empty. A zero-magnitude vector
/// scores `0.0`.
pub fn normalized_cosine(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return Some(0.0);
	}

	let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());

	Some(clamp_unit(((cosine + 1.0) / 2.0) as f32))
}

/// Maps a non-negative distance onto `(0, 1]`.
pub fn distance_to_similarity(distance: f64) -> f32 {
	if !distance.is_finite() {
		return 0.0;
	}

	clamp_unit((1.0 / (1.0 + distance.max(0.0))) as f32)
}

/// Whether a query looks like it benefits from semantic retrieval: questions, phrases longer
/// than three words, and conceptual wording.
pub fn needs_semantic_search(query: &str) -> bool {
	let tokens = words(query);

	if tokens.iter().any(|token| QUESTION_WORDS.contains(&token.as_str())) {
		return true;
	}
	if query.split_whitespace().count() > 3 {
		return true;
	}

	let lower = query.to_lowercase();

	CONCEPTUAL_TERMS.iter().any(|term| lower.contains(term))
}

pub fn clamp_unit(value: f32) -> f32 {
	if value.is_nan() {
		return 0.0;
	}

	value.clamp(0.0, 1.0)
}

fn words(text: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	normalized.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;
	use uuid::Uuid;

	use super::*;

	fn record(content: &str, summary: Option<&str>, tags: &[&str]) -> MemoryRecord {
		MemoryRecord {
			id: Uuid::nil(),
			project_id: Uuid::nil(),
			content: content.to_string(),
			summary: summary.map(str::to_string),
			tags: tags.iter().map(|tag| tag.to_string()).collect(),
			created_at: datetime!(2025-01-01 00:00 UTC),
			embedding: None,
		}
	}

	#[test]
	fn tokenizer_drops_stopwords_and_short_tokens() {
		assert_eq!(
			tokenize_query("how to implement JWT authentication"),
			vec!["implement", "jwt", "authentication"]
		);
	}

	#[test]
	fn tokenizer_deduplicates_and_splits_on_punctuation() {
		assert_eq!(
			tokenize_query("Redis-cache, redis CACHE; v2 eviction!"),
			vec!["redis", "cache", "eviction"]
		);
		assert!(tokenize_query("  to be or   an ").is_empty());
	}

	#[test]
	fn keyword_ratio_counts_matched_tokens() {
		let tokens = tokenize_query("how to implement JWT authentication");
		let hit = keyword_match(
			&tokens,
			"how to implement jwt authentication",
			&record("JWT authentication flow in FastAPI", None, &[]),
			0.2,
		);

		assert_eq!(hit.matched, 2);
		assert!((hit.ratio - 2.0 / 3.0).abs() < 1e-6);
		assert!((hit.score - 2.0 / 3.0).abs() < 1e-6);
	}

	#[test]
	fn keyword_match_reads_summary_and_tags() {
		let tokens = vec!["rotation".to_string(), "security".to_string()];
		let hit = keyword_match(
			&tokens,
			"rotation security",
			&record("Keys live in vault.", Some("Monthly rotation."), &["Security"]),
			0.2,
		);

		assert_eq!(hit.matched, 2);
		assert_eq!(hit.score, 1.0);
	}

	#[test]
	fn phrase_bonus_applies_and_clamps() {
		let tokens = tokenize_query("token refresh");
		let partial = keyword_match(
			&tokens,
			"token refresh",
			&record("Token refresh happens hourly.", None, &[]),
			0.2,
		);

		assert_eq!(partial.score, 1.0);

		let tokens = tokenize_query("refresh interval tuning");
		let bonus_only = keyword_match(
			&tokens,
			"refresh",
			&record("We refresh caches nightly.", None, &[]),
			0.2,
		);

		assert!((bonus_only.score - (1.0 / 3.0 + 0.2)).abs() < 1e-6);
	}

	#[test]
	fn cosine_is_normalized_to_unit_range() {
		assert_eq!(normalized_cosine(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
		assert_eq!(normalized_cosine(&[1.0, 0.0], &[-1.0, 0.0]), Some(0.0));
		assert_eq!(normalized_cosine(&[1.0, 0.0], &[0.0, 1.0]), Some(0.5));
	}

	#[test]
	fn cosine_handles_degenerate_vectors() {
		assert_eq!(normalized_cosine(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
		assert_eq!(normalized_cosine(&[], &[]), None);
		assert_eq!(normalized_cosine(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
	}

	#[test]
	fn distance_maps_into_unit_interval() {
		assert_eq!(distance_to_similarity(0.0), 1.0);
		assert_eq!(distance_to_similarity(1.0), 0.5);
		assert_eq!(distance_to_similarity(-0.5), 1.0);
		assert_eq!(distance_to_similarity(f64::NAN), 0.0);
	}

	#[test]
	fn semantic_heuristic_matches_questions_and_concepts() {
		assert!(needs_semantic_search("how does login work"));
		assert!(needs_semantic_search("caching strategy"));
		assert!(needs_semantic_search("retry budget for flaky jobs"));
		assert!(!needs_semantic_search("jwt expiry"));
		assert!(!needs_semantic_search("showcase"));
	}
}
