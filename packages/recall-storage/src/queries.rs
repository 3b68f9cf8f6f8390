use uuid::Uuid;

use crate::{
	Error, Result,
	db::{self, Db},
	models::{MemoryMatch, MemoryRecord},
};

/// Project and tag restriction shared by the vector queries.
///
/// Tags are matched case-insensitively as substrings of the comma-joined tag list of a record,
/// so `"sec"` matches a record tagged `"security"`.
#[derive(Debug, Clone, Copy)]
pub struct RecordScope<'a> {
	pub project_id: Option<Uuid>,
	pub tags: &'a [String],
}

#[derive(Debug, Clone, Copy)]
pub struct AnnQuery<'a> {
	pub embedding: &'a [f32],
	pub scope: RecordScope<'a>,
	pub limit: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TextMatchQuery<'a> {
	pub project_id: Option<Uuid>,
	/// Lowercase alphanumeric tokens. A record matches when any token occurs in its content,
	/// summary, or tags.
	pub tokens: &'a [String],
	pub limit: u32,
}

/// Nearest neighbours by pgvector cosine distance, closest first.
pub async fn ann_search(db: &Db, query: AnnQuery<'_>, timeout_ms: u64) -> Result<Vec<MemoryMatch>> {
	let dim = query.embedding.len();

	if dim == 0 {
		return Err(Error::InvalidArgument("ANN query embedding is empty.".to_string()));
	}

	// The dimension is interpolated so the expression matches the partial HNSW index.
	let sql = format!(
		"\
SELECT
	id,
	project_id,
	content,
	summary,
	tags,
	created_at,
	NULL::real[] AS embedding,
	(embedding::vector({dim}) <=> $1::text::vector({dim}))::float8 AS distance
FROM memories
WHERE embedding IS NOT NULL
	AND cardinality(embedding) = {dim}
	AND ($2::uuid IS NULL OR project_id = $2)
	AND (cardinality($3::text[]) = 0 OR lower(array_to_string(tags, ',')) LIKE ANY($3))
ORDER BY embedding::vector({dim}) <=> $1::text::vector({dim})
LIMIT $4"
	);
	let vec_text = vector_to_pg(query.embedding);
	let tag_patterns = like_patterns(query.scope.tags);
	let mut tx = db.begin_bounded(timeout_ms).await?;
	let result = sqlx::query_as::<_, MemoryMatch>(&sql)
		.bind(vec_text)
		.bind(query.scope.project_id)
		.bind(tag_patterns)
		.bind(i64::from(query.limit))
		.fetch_all(&mut *tx)
		.await
		.map_err(Error::from);

	db::finish(tx, result).await
}

/// Every in-scope record that carries an embedding, newest first.
pub async fn scan_embedded(
	db: &Db,
	scope: RecordScope<'_>,
	timeout_ms: u64,
) -> Result<Vec<MemoryRecord>> {
	let tag_patterns = like_patterns(scope.tags);
	let mut tx = db.begin_bounded(timeout_ms).await?;
	let result = sqlx::query_as::<_, MemoryRecord>(
		"\
SELECT id, project_id, content, summary, tags, created_at, embedding
FROM memories
WHERE embedding IS NOT NULL
	AND ($1::uuid IS NULL OR project_id = $1)
	AND (cardinality($2::text[]) = 0 OR lower(array_to_string(tags, ',')) LIKE ANY($2))
ORDER BY created_at DESC, id",
	)
	.bind(scope.project_id)
	.bind(tag_patterns)
	.fetch_all(&mut *tx)
	.await
	.map_err(Error::from);

	db::finish(tx, result).await
}

/// Records whose content, summary, or tags contain any of the tokens, newest first.
pub async fn text_match(
	db: &Db,
	query: TextMatchQuery<'_>,
	timeout_ms: u64,
) -> Result<Vec<MemoryRecord>> {
	let patterns = like_patterns(query.tokens);

	if patterns.is_empty() {
		return Ok(Vec::new());
	}

	let mut tx = db.begin_bounded(timeout_ms).await?;
	let result = sqlx::query_as::<_, MemoryRecord>(
		"\
SELECT id, project_id, content, summary, tags, created_at, NULL::real[] AS embedding
FROM memories
WHERE ($1::uuid IS NULL OR project_id = $1)
	AND (
		lower(content) LIKE ANY($2)
		OR lower(coalesce(summary, '')) LIKE ANY($2)
		OR lower(array_to_string(tags, ' ')) LIKE ANY($2)
	)
ORDER BY created_at DESC, id
LIMIT $3",
	)
	.bind(query.project_id)
	.bind(patterns)
	.bind(i64::from(query.limit))
	.fetch_all(&mut *tx)
	.await
	.map_err(Error::from);

	db::finish(tx, result).await
}

pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Lowercased `%term%` patterns with LIKE metacharacters escaped. Blank terms are dropped.
pub fn like_patterns(terms: &[String]) -> Vec<String> {
	let mut out = Vec::with_capacity(terms.len());

	for term in terms {
		let trimmed = term.trim();

		if trimmed.is_empty() {
			continue;
		}

		let mut pattern = String::with_capacity(trimmed.len() + 2);

		pattern.push('%');

		for ch in trimmed.to_lowercase().chars() {
			if matches!(ch, '%' | '_' | '\\') {
				pattern.push('\\');
			}

			pattern.push(ch);
		}

		pattern.push('%');
		out.push(pattern);
	}

	out
}
