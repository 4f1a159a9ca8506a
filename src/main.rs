mod config;
mod destination;
mod folders;
mod pipeline;
mod protocol;
mod scripts;
mod server;
mod structure;
mod tier;
mod tools;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
	let config = config::load_config()?;
	server::init_tracing(&config);
	let mut handle = server::start(
		config,
		Arc::new(pipeline::OfflineConverter),
		tokio::io::stdin(),
		tokio::io::stdout()
	);
	let interrupted = tokio::select! {
		result = handle.wait() => {
			result?;
			false
		}
		_ = tokio::signal::ctrl_c() => true,
	};
	if interrupted {
		info!("interrupted, shutting down");
		handle.stop().await?;
		opentelemetry::global::shutdown_tracer_provider();
		// a pending stdin read would otherwise hold the runtime open
		std::process::exit(0);
	}
	opentelemetry::global::shutdown_tracer_provider();
	Ok(())
}
