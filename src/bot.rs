use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::router::Router;
use crate::store::{JsonFileStore, MemoryStore, UserStore};
use crate::telegram::{TelegramClient, Transport};

pub struct Bot {
    config: Arc<Config>,
    client: Arc<TelegramClient>,
    router: Router,
}

impl Bot {
    /// Build the bot: open the store and the Telegram client
    pub fn new(config: Config, token: &str) -> Result<Self, Box<dyn std::error::Error>> {
        config.ladder.validate()?;
        let config = Arc::new(config);

        let store: Arc<dyn UserStore> = match &config.store.path {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => {
                warn!("no store path configured, users are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let client = Arc::new(TelegramClient::new(&config.telegram, token)?);
        let transport: Arc<dyn Transport> = client.clone();
        let router = Router::new(config.clone(), store, transport);

        Ok(Self {
            config,
            client,
            router,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Log metrics
    pub fn heartbeat(&self) {
        let metrics = self.router.metrics();
        metrics.increment_uptime(self.config.heartbeat_secs);
        let snap = metrics.snapshot();
        info!(
            uptime_sec = snap.uptime_sec,
            events = snap.events_total,
            failed = snap.events_failed,
            predictions = snap.predictions,
            results = snap.results,
            forwards_sent = snap.forwards_sent,
            forwards_failed = snap.forwards_failed,
            failure_rate = metrics.failure_rate(),
            "heartbeat"
        );
    }

    /// Heartbeat timer whose first tick lands one period after start
    fn heartbeat_interval(&self) -> Interval {
        let period = Duration::from_secs(self.config.heartbeat_secs.max(1));
        interval_at(Instant::now() + period, period)
    }

    /// Main event loop: long-poll updates until Ctrl-C
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("bot ready, entering main loop");

        let mut offset: i64 = 0;
        let mut heartbeat_interval = self.heartbeat_interval();

        loop {
            tokio::select! {
                polled = self.client.get_updates(offset) => {
                    match polled {
                        Ok(updates) => {
                            // in order: a user's period and result may share a batch.
                            // broadcasts fan out on their own task and do not hold this loop
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                if let Some(inbound) = update.into_inbound() {
                                    self.router.handle(inbound).await;
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "polling failed, retrying...");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
                _ = heartbeat_interval.tick() => {
                    self.heartbeat();
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("shutdown signal received");
                    self.router.finish_broadcasts().await;
                    return Ok(());
                }
            }
        }
    }
}
