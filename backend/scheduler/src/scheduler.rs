use std::time::Duration;

use chrono::Utc;
use lisa_core::{Outcome, Utterance};
use lisa_dialog::{DialogEngine, Turn};
use lisa_plugins::{CronRecord, HandlerRegistry};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::table::CronTable;

/// Fires scheduled handler entry points with a session-less context.
pub struct CronScheduler {
    registry: HandlerRegistry,
    engine: DialogEngine,
    tick: Duration,
}

impl CronScheduler {
    pub fn new(registry: HandlerRegistry, engine: DialogEngine) -> Self {
        Self {
            registry,
            engine,
            tick: Duration::from_secs(1),
        }
    }

    /// Run until `shutdown` is cancelled. Records are re-read every tick,
    /// so reloads and enable/disable take effect without a restart.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut table = CronTable::new();
        let mut ticker = time::interval(self.tick);
        info!("Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    table.sync(self.registry.crons().await, now);
                    for job in table.due(now) {
                        let engine = self.engine.clone();
                        tokio::spawn(async move { fire(&engine, job).await });
                    }
                }
            }
        }
    }
}

/// Invoke one scheduled entry point. The utterance carries the cron name
/// as its intent with full confidence.
pub async fn fire(engine: &DialogEngine, job: CronRecord) -> Option<Turn> {
    info!(cron = %job.name, handler = %job.handler, entry_point = %job.entry_point, "Trigger fired");
    let utterance = Utterance {
        outcome: Outcome::new(job.name.clone(), 1.0),
        from: "Server".to_string(),
        ..Utterance::default()
    };
    match engine
        .system_context()
        .invoke_handler(utterance, &job.handler, &job.entry_point)
        .await
    {
        Ok(turn) => {
            match &turn {
                Turn::Completed { reply: Some(text), .. } => {
                    warn!(cron = %job.name, reply = %text, "Scheduled task returned text with no destination");
                }
                Turn::Refused(kind) => warn!(cron = %job.name, kind = %kind, "Scheduled task refused"),
                _ => debug!(cron = %job.name, "Scheduled task completed"),
            }
            Some(turn)
        }
        Err(e) => {
            error!(cron = %job.name, error = %e, "Scheduled task failed");
            None
        }
    }
}
