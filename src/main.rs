use std::sync::Arc;

use clap::{
    Parser,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tunetrim::{
    Res,
    api::AppState,
    config::{self, CacheSettings, Config},
    management::{BackupStore, CacheStore, FileCache, NoopBackup, SqliteBackup},
    server,
    spotify::WebApiConnector,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Address to listen on (overrides SERVER_ADDRESS)
    #[clap(long, env = "SERVER_ADDRESS")]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[clap(long, action = clap::ArgAction::SetTrue)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_cache(settings: &CacheSettings) -> Res<CacheStore> {
    let cache = match settings {
        CacheSettings::Disabled => {
            warn!("no cache backend configured; sessions stay in memory and every read goes upstream");
            CacheStore::disabled()
        }
        CacheSettings::Memory => {
            info!("using in-memory cache");
            CacheStore::memory()
        }
        CacheSettings::File(dir) => {
            info!(dir = %dir.display(), "using file cache");
            CacheStore::new(Arc::new(FileCache::open(dir).await?))
        }
    };
    Ok(cache)
}

async fn build_backup(url: Option<&str>) -> Res<Arc<dyn BackupStore>> {
    match url {
        Some(url) => Ok(Arc::new(SqliteBackup::connect(url).await?)),
        None => {
            warn!("no backup database configured; removed tracks will not be backed up");
            Ok(Arc::new(NoopBackup))
        }
    }
}

#[tokio::main]
async fn main() -> Res<()> {
    // Load .env before clap so `env = ...` args see its values.
    let loaded = config::load_env().await;

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match loaded {
        Ok(paths) => {
            for path in paths {
                info!(path = %path.display(), "loaded environment file");
            }
        }
        Err(e) => warn!(error = %e, "failed to load environment files"),
    }

    let mut config = Config::from_env()?;
    if let Some(addr) = cli.addr {
        config.server_addr = addr;
    }

    let cache = build_cache(&config.cache).await?;
    let backup = build_backup(config.backup_database_url.as_deref()).await?;

    let connector = WebApiConnector::new(reqwest::Client::new(), Arc::new(config.spotify.clone()));
    let addr = config.server_addr.clone();
    let state = AppState::new(config, Arc::new(connector), cache, backup);

    server::run(&addr, state).await
}
