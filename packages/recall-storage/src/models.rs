use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MemoryRecord {
	pub id: Uuid,
	pub project_id: Uuid,
	pub content: String,
	pub summary: Option<String>,
	pub tags: Vec<String>,
	pub created_at: OffsetDateTime,
	/// Absent for records that were never embedded, and on rows read by queries that do not need
	/// the vector.
	pub embedding: Option<Vec<f32>>,
}

/// A record returned by the ANN index together with its cosine distance to the query vector.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemoryMatch {
	#[sqlx(flatten)]
	pub record: MemoryRecord,
	pub distance: f64,
}
