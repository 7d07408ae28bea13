//! Shared engine construction for CLI commands.

use std::sync::Arc;

use lunara_core::{
    Clock, Config, Db, DeliverySender, MessageTransport, NotificationScheduler, SendOutcome,
    SystemClock, TelegramTransport,
};

pub struct Engine {
    pub db: Arc<Db>,
    pub scheduler: Arc<NotificationScheduler>,
    pub transport: Arc<dyn MessageTransport>,
    pub config: Config,
}

/// Transport used when no token is configured; every send fails loudly.
struct UnconfiguredTransport;

#[async_trait::async_trait]
impl MessageTransport for UnconfiguredTransport {
    async fn send(&self, _chat_id: i64, _text: &str) -> SendOutcome {
        SendOutcome::Other("telegram_token is not configured".to_string())
    }
}

pub fn build_engine() -> Result<Engine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Db::open_default()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let transport: Arc<dyn MessageTransport> = match &config.telegram_token {
        Some(token) => Arc::new(TelegramTransport::new(token.clone())),
        None => Arc::new(UnconfiguredTransport),
    };

    let sender = Arc::new(
        DeliverySender::new(db.clone(), transport.clone(), clock.clone())
            .with_max_attempts(config.scheduler.max_retries),
    );
    let scheduler = Arc::new(NotificationScheduler::new(
        db.clone(),
        sender,
        clock,
        config.scheduler.clone(),
    ));

    Ok(Engine {
        db,
        scheduler,
        transport,
        config,
    })
}
