use modmatch::{app, config::Settings, db, logging, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let settings = Settings::from_env()?;
    let db_pool = db::connect(&settings.database_url, settings.db_max_connections).await?;

    let bind_addr = settings.bind_addr.clone();
    let app = app(AppState::new(db_pool, settings));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
