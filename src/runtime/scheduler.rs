/// Background tick scheduler service
///
/// Drives `Engine::tick` at a fixed cadence on a tokio interval. The cadence is
/// a scheduler setting only; nodes keep their own notion of time (a delay
/// buffer with a 1 s interval works the same whether it is ticked every 10 ms
/// or every 100 ms, only with coarser resolution).

use crate::runtime::engine::Engine;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle on the spawned tick loop
struct RunningLoop {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

/// Periodic driver for the engine's tick pass
pub struct TickSchedulerService {
    engine: Arc<Engine>,
    period: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl TickSchedulerService {
    /// Create a scheduler ticking `engine` every `period`
    pub fn new(engine: Arc<Engine>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(anyhow::anyhow!("Tick period must be greater than zero"));
        }

        Ok(Self {
            engine,
            period,
            running: Mutex::new(None),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the tick loop; a second call while running is a no-op
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("⚠️ Tick scheduler already running");
            return Ok(());
        }

        tracing::info!("⏰ Starting tick scheduler (period: {:?})", self.period);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let period = self.period;
        let handle = tokio::spawn(async move { run_tick_loop(engine, period, shutdown_rx).await });

        *running = Some(RunningLoop {
            shutdown: shutdown_tx,
            handle,
        });

        tracing::info!("✅ Tick scheduler started");
        Ok(())
    }

    /// Stop the tick loop and wait for the current pass to finish
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            tracing::debug!("Tick scheduler not running, nothing to stop");
            return Ok(());
        };

        tracing::info!("⏹️ Stopping tick scheduler");
        let _ = running.shutdown.send(());
        let ticks = running
            .handle
            .await
            .map_err(|e| anyhow::anyhow!("Tick loop task failed: {}", e))?;

        tracing::info!("✅ Tick scheduler stopped after {} ticks", ticks);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

/// Tick until told to stop; returns the number of passes run
async fn run_tick_loop(
    engine: Arc<Engine>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> u64 {
    let mut ticker = tokio::time::interval(period);
    // A slow pass delays the next one instead of triggering a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let report = engine.tick();
                ticks += 1;

                if report.tick_failures > 0 || report.propagation.failures > 0 {
                    tracing::warn!(
                        "⚠️ Tick {}: {} tick failure(s), {} input hook failure(s)",
                        ticks,
                        report.tick_failures,
                        report.propagation.failures
                    );
                }
                tracing::trace!("Tick {} done: {:?}", ticks, report);
            }
        }
    }

    ticks
}
