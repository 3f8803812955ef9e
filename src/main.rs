//! Process entry point: loads configuration, starts the Tool Server
//! Manager, watches the on-disk registry for changes, and serves the
//! Gateway Facade until shutdown (§6: exit codes; §10.3: hot reload).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use notify::Watcher;
use reqwest::Client;

use mcprelay::config::{Cli, Settings};
use mcprelay::engine::Engine;
use mcprelay::gateway::{self, AppState};
use mcprelay::mcp::manager::ToolServerManager;
use mcprelay::registry::RegistryStore;
use mcprelay::telemetry;
use mcprelay::upstream::gemini::GeminiDialect;
use mcprelay::upstream::openai::OpenAiDialect;
use mcprelay::upstream::{RetryPolicy, UpstreamClient};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	telemetry::init(&cli.log_level);

	let settings = match Settings::load_or_default(cli.config.as_deref()) {
		Ok(settings) => settings,
		Err(err) => {
			tracing::error!(target: "mcprelay::main", %err, "failed to load configuration");
			std::process::exit(1);
		}
	};

	if let Err(err) = run(cli, settings).await {
		tracing::error!(target: "mcprelay::main", %err, "fatal startup error");
		std::process::exit(1);
	}
}

async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
	let settings = Arc::new(settings);

	let registry = Arc::new(RegistryStore::new(cli.registry_dir.as_path())?);
	let manager = Arc::new(ToolServerManager::new(registry.clone()));
	if settings.auto_start_servers {
		manager.start_all_enabled().await;
	}

	let _watcher = watch_registry(&cli.registry_dir, manager.clone())?;

	let http_client = Client::new();
	let retry_policy = RetryPolicy {
		attempts: settings.retry_count,
		delay: settings.retry_delay,
	};

	let openai = settings.openai.as_ref().map(|upstream_settings| {
		let dialect = OpenAiDialect::new(http_client.clone(), upstream_settings.base_url.clone());
		let client = UpstreamClient::new(dialect, retry_policy, settings.upstream_timeout);
		Arc::new(Engine::new(manager.clone(), Arc::new(client), settings.max_iterations, settings.system_prompt.clone()))
	});

	let gemini = settings.gemini.as_ref().map(|upstream_settings| {
		let dialect = GeminiDialect::new(http_client.clone(), upstream_settings.base_url.clone());
		let client = UpstreamClient::new(dialect, retry_policy, settings.upstream_timeout);
		Arc::new(Engine::new(manager.clone(), Arc::new(client), settings.max_iterations, settings.system_prompt.clone()))
	});

	let state = AppState {
		manager: manager.clone(),
		registry,
		settings,
		openai,
		gemini,
	};
	let app = gateway::router(state);

	let listener = tokio::net::TcpListener::bind(cli.bind).await?;
	tracing::info!(target: "mcprelay::main", addr = %cli.bind, "gateway listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	manager.shutdown().await;
	tracing::info!(target: "mcprelay::main", "shutdown complete");
	Ok(())
}

/// Watches the registry directory for changes and triggers a full
/// `ToolServerManager::reload` on any event, debounced by a short delay so a
/// burst of filesystem events collapses into a single reload.
fn watch_registry(root: &Path, manager: Arc<ToolServerManager>) -> anyhow::Result<notify::RecommendedWatcher> {
	let (tx, mut rx) = tokio::sync::mpsc::channel(16);
	let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
		if event.is_ok() {
			let _ = tx.try_send(());
		}
	})?;
	watcher.watch(root, notify::RecursiveMode::Recursive)?;

	tokio::spawn(async move {
		while rx.recv().await.is_some() {
			tokio::time::sleep(Duration::from_millis(300)).await;
			while rx.try_recv().is_ok() {}
			if let Err(err) = manager.reload().await {
				tracing::warn!(target: "mcprelay::main", %err, "registry reload failed");
			}
		}
	});

	Ok(watcher)
}

async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
		signal.recv().await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
