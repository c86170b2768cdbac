use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use leaf_doctor::config::{Cli, Command};
use leaf_doctor::{
    logging, web, AppState, ImageFile, Predictor, Session, SessionSettings, SessionStore, View,
};
use tracing::info;

async fn serve(
    bind: SocketAddr,
    session_idle: Duration,
    predictor: Arc<dyn Predictor>,
    settings: SessionSettings,
) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionStore::new(predictor, settings));
    let _sweeper = sessions.spawn_sweeper(session_idle);
    let app = web::router(sessions);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    info!("🚀 Server running on http://{}", listener.local_addr()?);
    info!("🌿 Open in your browser to diagnose a leaf");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn diagnose(
    path: &Path,
    json: bool,
    predictor: Arc<dyn Predictor>,
    settings: SessionSettings,
) -> anyhow::Result<ExitCode> {
    let session = Arc::new(Session::new(predictor, settings));

    let file = ImageFile::from_path(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    session.select_file(file).await?;

    let cycle = session
        .analyze()
        .await
        .context("no image selected for analysis")?;
    let state = cycle.await?;

    let view = session.view().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        match &view {
            View::Results(result) => println!("{result}"),
            View::Uncertain(uncertain) => println!("{uncertain}"),
            View::Idle(_) | View::Analyzing(_) => {}
        }
    }

    Ok(if state == AppState::Results {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    logging::init()?;

    let cli = Cli::parse();
    let settings = cli.settings.session_settings();
    let predictor: Arc<dyn Predictor> = Arc::new(cli.settings.predictor()?);
    info!(api_url = %cli.settings.api_url, advice = ?settings.advice_variant, "configured prediction service");

    match cli.command {
        Command::Serve {
            bind,
            session_idle_secs,
        } => {
            let session_idle = Duration::from_secs(session_idle_secs.max(1));
            serve(bind, session_idle, predictor, settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diagnose { path, json } => diagnose(&path, json, predictor, settings).await,
    }
}
