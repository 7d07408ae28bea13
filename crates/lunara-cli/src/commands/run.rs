use tracing::info;

use crate::common::build_engine;

/// Restore persisted jobs, then poll until interrupted.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine()?;
    if engine.config.telegram_token.is_none() {
        eprintln!("warning: telegram_token is not configured, deliveries will fail");
    }

    let restored = engine.scheduler.restore_all()?;
    info!(restored, "scheduler restored");

    engine.scheduler.clone().run().await;
    Ok(())
}
