use dynaquery::persist::Persistor;
use dynaquery::server::{router, AppState};
use dynaquery::settings::Settings;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;

    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let persistor = Persistor::new(settings.persistence_mode())?;
    if settings.seed {
        persistor.seed()?;
    }
    let app = router(AppState::new(&persistor, &settings));

    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    info!(bind = %settings.bind, database = %settings.database, "dynaquery listening");
    axum::serve(listener, app).await?;
    Ok(())
}
