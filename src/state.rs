//! Application state shared across every handler: database and Redis services, the wizard
//! orchestrator wired to its Postgres/Redis-backed collaborators, and the resolved config.

use std::sync::Arc;

use shared::{config::Config, DatabaseService, RedisService};

use crate::config::WizardConfig;
use crate::domains::wizard::clock::SystemClock;
use crate::domains::wizard::repository::{PgCommitRepository, PgFlyerOfferRepository, PgShoppingListRepository};
use crate::domains::wizard::search_client::HttpFuzzySearchClient;
use crate::domains::wizard::session_store::RedisSessionStore;
use crate::domains::wizard::WizardOrchestrator;

pub struct AppState {
    pub db: DatabaseService,
    pub redis: RedisService,
    pub wizard: Arc<WizardOrchestrator>,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        let db = DatabaseService::new(&config.database).await?;
        let redis = RedisService::new(&config.redis).await?;

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(800))
            .build()?;
        let search_base_url =
            std::env::var("SEARCH_SERVICE_URL").unwrap_or_else(|_| "http://search-service:8080".to_string());

        let lists = Arc::new(PgShoppingListRepository::new(db.pool().clone()));
        let offers = Arc::new(PgFlyerOfferRepository::new(db.pool().clone()));
        let commits = Arc::new(PgCommitRepository::new(db.pool().clone()));
        let search = Arc::new(HttpFuzzySearchClient::new(http_client, search_base_url));
        let sessions = Arc::new(RedisSessionStore::new(redis.clone()));
        let clock = Arc::new(SystemClock);
        let wizard_config = WizardConfig::from_env();

        let wizard = Arc::new(WizardOrchestrator::new(lists, offers, commits, search, sessions, clock, wizard_config));

        Ok(Self { db, redis, wizard })
    }
}
