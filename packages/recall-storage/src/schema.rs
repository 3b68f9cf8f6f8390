pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

/// Renders the pgvector extension and the partial HNSW index over embeddings of `vector_dim`
/// dimensions.
pub fn render_ann_schema(vector_dim: u32) -> String {
	let expanded = expand_includes(include_str!("../../../sql/ann.sql"));

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_memories.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_memories.sql")),
				"tables/002_search_cache.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_search_cache.sql")),
				"tables/003_memories_ann_index.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_memories_ann_index.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
