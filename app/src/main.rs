use marquee::core::app::App;
use marquee::core::catalog::CatalogProvider;
use marquee::core::config::Config;
use marquee::core::session::SessionOptions;
use marquee::infra::session_file::FileSessionStorage;
use marquee::infra::supabase::SupabaseClient;
use marquee::infra::tmdb::TmdbClient;
use marquee::infra::web;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    // Load .env (silently ignore if missing, production uses real env vars)
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Missing Supabase configuration: {e}");
            std::process::exit(1);
        }
    };
    config.log_summary();

    let storage = match FileSessionStorage::new(&config.session_file) {
        Ok(storage) => storage,
        Err(e) => {
            error!(path = %config.session_file.display(), "Failed to open session file: {e}");
            std::process::exit(1);
        }
    };

    let backend = Arc::new(SupabaseClient::new(
        &config.supabase_url,
        &config.supabase_key,
        Arc::new(storage),
    ));
    let catalog = config
        .tmdb
        .as_ref()
        .map(|tmdb| Arc::new(TmdbClient::from_config(tmdb)) as Arc<dyn CatalogProvider>);

    let options = SessionOptions {
        email_redirect_to: Some(config.email_redirect_to()),
    };
    let app = App::start(backend, catalog, options).await;
    info!(
        authenticated = app.session.is_authenticated(),
        "session resolved"
    );

    if let Err(e) = web::start_server(app, config.port).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
