use std::path::PathBuf;

use clap::Parser;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use recall_config::Config;
use recall_service::{RecallService, SearchRequest};
use recall_storage::{cache, db::Db};

#[derive(Debug, Parser)]
#[command(
	version = recall_cli::VERSION,
	rename_all = "kebab",
	styles = recall_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Free-text query.
	#[arg(value_name = "QUERY")]
	pub query: String,
	#[arg(long, short = 'p', value_name = "UUID")]
	pub project: Option<Uuid>,
	/// Restricts vector retrieval to matching tags and boosts exact tag matches. Repeatable.
	#[arg(long = "tag", short = 't', value_name = "TAG")]
	pub tags: Vec<String>,
	#[arg(long, short = 'l', value_name = "N")]
	pub limit: Option<u32>,
	#[arg(long, value_name = "SCORE")]
	pub threshold: Option<f32>,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	/// Deletes expired rows from the Postgres search cache before searching.
	#[arg(long)]
	pub purge_expired_cache: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = recall_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let ann_enabled = db.resolve_ann(&config.storage.vector).await?;

	tracing::info!(ann_enabled, cache_backend = %config.cache.backend, "Search backends resolved.");

	if args.purge_expired_cache {
		if config.cache.backend == "postgres" {
			let purged = cache::purge_expired(&db, OffsetDateTime::now_utc()).await?;

			tracing::info!(purged, "Purged expired cache entries.");
		} else {
			tracing::warn!(
				cache_backend = %config.cache.backend,
				"Cache purge only applies to the postgres backend."
			);
		}
	}

	let service = RecallService::connect(config, db, ann_enabled);
	let request = SearchRequest {
		query: args.query,
		project_id: args.project,
		tags: if args.tags.is_empty() { None } else { Some(args.tags) },
		limit: args.limit,
		similarity_threshold: args.threshold,
		top_k: args.top_k,
	};
	let response = service.search(request).await?;
	let json = serde_json::to_string_pretty(&response)?;

	println!("{json}");

	Ok(())
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_repeated_tags_and_bounds() {
		let args = Args::try_parse_from([
			"recall-search",
			"--config",
			"recall.toml",
			"--tag",
			"security",
			"-t",
			"auth",
			"--limit",
			"5",
			"--top-k",
			"3",
			"--threshold",
			"0.4",
			"jwt rotation",
		])
		.expect("Failed to parse arguments.");

		assert_eq!(args.query, "jwt rotation");
		assert_eq!(args.tags, vec!["security".to_string(), "auth".to_string()]);
		assert_eq!(args.limit, Some(5));
		assert_eq!(args.top_k, Some(3));
		assert_eq!(args.threshold, Some(0.4));
		assert!(args.project.is_none());
		assert!(!args.purge_expired_cache);
	}

	#[test]
	fn rejects_malformed_project_ids() {
		let result = Args::try_parse_from([
			"recall-search",
			"--config",
			"recall.toml",
			"--project",
			"not-a-uuid",
			"jwt",
		]);

		assert!(result.is_err());
	}
}
