use clap::Parser;

use recall_search::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	recall_search::run(args).await
}
