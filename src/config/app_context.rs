use crate::clock::{Clock, SystemClock};
use crate::config::settings::Settings;
use crate::storage;
use crate::storage::persistent::DbPool;
use crate::ticker::{BinanceTicker, PriceSource};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// Shared collaborators the engines are wired with; no ambient singletons.
#[derive(Clone)]
pub struct AppContext {
    pub(crate) settings: Arc<RwLock<Settings>>,
    pub db_pool: DbPool,
    pub ticker: Arc<dyn PriceSource>,
    pub clock: Arc<dyn Clock>,
}

impl Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish()
    }
}

impl AppContext {
    pub async fn new(config_filename: &str) -> Self {
        // loading settings
        let settings = Settings::new(config_filename).expect("Failed to load settings");

        // setting up logging
        let logger_level = &settings.logger.level;
        let filter = tracing_subscriber::EnvFilter::new(logger_level)
            .add_directive("hyper::client=info".parse().unwrap())
            .add_directive("tokio_postgres=info".parse().unwrap())
            .add_directive("reqwest=info".parse().unwrap())
            .add_directive("h2::codec=info".parse().unwrap());
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .init();

        let db_pool = storage::persistent::connect(&settings.storage.database_uri);
        let ticker: Arc<dyn PriceSource> = Arc::new(BinanceTicker::new(&settings.ticker.base_uri));

        Self {
            settings: Arc::new(RwLock::new(settings)),
            db_pool,
            ticker,
            clock: Arc::new(SystemClock),
        }
    }

    pub async fn get_settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().await
    }
}
