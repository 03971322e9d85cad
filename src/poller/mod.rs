//! Status poller
//!
//! On every tick, spawns one `Shelly.GetStatus` task per device. Tasks are
//! independent: a slow or failing device never holds up the others, and a new
//! cycle starts on schedule even if the previous one is still in flight.
//! Results land in the state store and are pushed through the hub.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;
use crate::hub::BroadcastHub;
use crate::models::{Device, HubEvent, SwitchMetrics};
use crate::shelly::status::read_switch;
use crate::shelly::{RpcTransport, METHOD_GET_STATUS, SWITCH_CHANNEL};
use crate::state::{ApplyOutcome, StateStore};

/// What one device poll did to the store
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Updated(SwitchMetrics),
    Failed(String),
    /// Finished after a newer poll of the same device had been applied
    Stale,
    UnknownDevice,
}

pub struct Poller {
    store: StateStore,
    hub: BroadcastHub,
    rpc: Arc<dyn RpcTransport>,
    interval: Duration,
    call_timeout: Duration,
}

impl Poller {
    pub fn new(
        store: StateStore,
        hub: BroadcastHub,
        rpc: Arc<dyn RpcTransport>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            rpc,
            interval,
            call_timeout,
        }
    }

    /// Run the poll loop until `shutdown` fires. The first cycle starts immediately.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            "[Poller] Starting: {} devices every {:?} (call timeout {:?})",
            self.store.len(),
            self.interval,
            self.call_timeout
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let poller = Arc::clone(&self);
                    cycles.spawn(async move {
                        poller.poll_all().await;
                    });
                }
                Some(res) = cycles.join_next() => {
                    if let Err(e) = res {
                        tracing::error!("[Poller] Cycle task failed: {}", e);
                    }
                }
            }
        }

        let in_flight = cycles.len();
        cycles.shutdown().await;
        tracing::info!("[Poller] Stopped ({} cycles aborted)", in_flight);
    }

    /// Poll every device concurrently and wait for all of them.
    pub async fn poll_all(self: &Arc<Self>) -> Vec<(String, PollOutcome)> {
        let mut tasks = JoinSet::new();
        for device in self.store.devices() {
            let poller = Arc::clone(self);
            let device = device.clone();
            tasks.spawn(async move {
                let outcome = poller.poll_device(&device).await;
                (device.id, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("[Poller] Device poll task failed: {}", e),
            }
        }
        outcomes
    }

    /// Poll a single device out of cycle.
    pub async fn refresh(&self, id: &str) -> PollOutcome {
        match self.store.device(id) {
            Some(device) => self.poll_device(device).await,
            None => PollOutcome::UnknownDevice,
        }
    }

    async fn poll_device(&self, device: &Device) -> PollOutcome {
        let Some(attempt) = self.store.begin_attempt(&device.id) else {
            return PollOutcome::UnknownDevice;
        };

        let started = Instant::now();
        match self.get_status(device).await {
            Ok(status) => {
                let reading = read_switch(&status, SWITCH_CHANNEL);
                match self.store.apply_success(&device.id, attempt, reading).await {
                    ApplyOutcome::Applied(t) => {
                        if !t.was_connected {
                            if t.previous_failures > 0 {
                                tracing::info!(
                                    "[Poller] {} ({}) recovered after {} failed polls",
                                    device.id,
                                    device.name,
                                    t.previous_failures
                                );
                            } else {
                                tracing::info!("[Poller] {} ({}) connected", device.id, device.name);
                            }
                        }
                        let metrics = t.state.metrics;
                        tracing::debug!(
                            "[Poller] Polled {} ({}) in {}ms: apower={:?}W temp={:?}C output={:?}",
                            device.id,
                            device.name,
                            started.elapsed().as_millis(),
                            metrics.apower,
                            metrics.temperature_c,
                            metrics.output
                        );
                        self.hub.broadcast(&HubEvent::update(device, metrics.clone()));
                        PollOutcome::Updated(metrics)
                    }
                    other => self.not_applied(device, attempt, other),
                }
            }
            Err(e) => {
                let message = e.to_string();
                match self.store.apply_failure(&device.id, attempt, &message).await {
                    ApplyOutcome::Applied(t) => {
                        if t.consecutive_failures == 1 {
                            tracing::warn!(
                                "[Poller] Poll failed for {} ({}): {}",
                                device.id,
                                device.name,
                                message
                            );
                        } else {
                            tracing::debug!(
                                "[Poller] Poll failed for {} ({}): {} (consecutive failures = {})",
                                device.id,
                                device.name,
                                message,
                                t.consecutive_failures
                            );
                        }
                        self.hub.broadcast(&HubEvent::error(device, message.clone()));
                        PollOutcome::Failed(message)
                    }
                    other => self.not_applied(device, attempt, other),
                }
            }
        }
    }

    async fn get_status(&self, device: &Device) -> Result<serde_json::Value, RpcError> {
        let call = self.rpc.call(&device.base_url, METHOD_GET_STATUS, json!({}));
        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Transport {
                method: METHOD_GET_STATUS.to_string(),
                message: format!("timed out after {}ms", self.call_timeout.as_millis()),
            }),
        }
    }

    fn not_applied(&self, device: &Device, attempt: u64, outcome: ApplyOutcome) -> PollOutcome {
        match outcome {
            ApplyOutcome::Stale => {
                tracing::debug!(
                    "[Poller] Discarded stale result for {} (attempt {})",
                    device.id,
                    attempt
                );
                PollOutcome::Stale
            }
            _ => PollOutcome::UnknownDevice,
        }
    }
}
