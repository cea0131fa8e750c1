//! Async driver around [`SimWorld`]
//!
//! The world sits behind a single `tokio::sync::Mutex`. The clock task and
//! every command take that lock for the whole of their mutation, so a command
//! lands either before or after a tick and never inside one. After each tick
//! or command a fresh snapshot is published on a watch channel; readers that
//! prefer polling call [`SimulationEngine::state`].
//!
//! Tick hooks run off the clock task on the blocking pool. A hook still busy
//! with an earlier tick is skipped for the current one and gets the held-back
//! events with its next call. A hook that overruns its timeout is reported
//! but never awaited by the clock. Events appended while the world is stopped
//! are still flushed to the hooks on the clock cadence, and shutdown delivers
//! whatever is left before the clock task exits.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::error::EngineError;
use crate::simulation::{
    SimWorld, SimulationEvent, SimulationStats, StateSnapshot, VehicleId, VehicleSeed,
};

/// Payload handed to tick hooks after every tick
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    /// Simulated seconds after the tick
    pub time: f32,
    pub events: Vec<SimulationEvent>,
    pub exited: Vec<VehicleId>,
}

impl TickOutcome {
    /// Fold a later outcome into this one
    fn absorb(&mut self, later: TickOutcome) {
        self.tick = later.tick;
        self.time = later.time;
        self.events.extend(later.events);
        self.exited.extend(later.exited);
    }
}

/// Side effect run after each tick, such as persisting events
///
/// Implementations may block; they run on the blocking pool.
pub trait TickHook: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn on_tick(&self, outcome: &TickOutcome) -> Result<()>;
}

struct HookSlot {
    hook: Arc<dyn TickHook>,
    busy: Arc<AtomicBool>,
    /// Outcomes that arrived while the hook was busy
    backlog: Option<TickOutcome>,
}

/// Clears the busy flag when the hook call returns or unwinds
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SimulationEngine {
    world: Arc<Mutex<SimWorld>>,
    snapshots: watch::Sender<Arc<StateSnapshot>>,
    shutdown: watch::Sender<bool>,
    clock: JoinHandle<()>,
}

impl SimulationEngine {
    /// Spawn the clock task for `world`. Must be called inside a tokio runtime.
    pub fn launch(world: SimWorld) -> Self {
        Self::launch_with_hooks(world, Vec::new())
    }

    pub fn launch_with_hooks(world: SimWorld, hooks: Vec<Arc<dyn TickHook>>) -> Self {
        let interval = world.config().clock.tick_interval();
        let delta_secs = world.config().clock.delta_secs;
        let hook_timeout = world.config().engine.hook_timeout();
        let backlog_limit = world.config().events.capacity;

        let (snapshots, _) = watch::channel(Arc::new(world.snapshot()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let world = Arc::new(Mutex::new(world));

        let slots: Vec<HookSlot> = hooks
            .into_iter()
            .map(|hook| HookSlot {
                hook,
                busy: Arc::new(AtomicBool::new(false)),
                backlog: None,
            })
            .collect();

        let clock = Clock {
            world: Arc::clone(&world),
            snapshots: snapshots.clone(),
            hooks: slots,
            in_flight: Vec::new(),
            backlog_limit,
            interval,
            delta_secs,
            hook_timeout,
        };
        let clock = tokio::spawn(clock.run(shutdown_rx));
        info!("Simulation clock launched: {interval:?} per tick, {delta_secs}s simulated");

        Self {
            world,
            snapshots,
            shutdown,
            clock,
        }
    }

    /// Run `f` against the world under the command lock, then publish
    pub async fn with_world<T>(&self, f: impl FnOnce(&mut SimWorld) -> T) -> T {
        let mut world = self.world.lock().await;
        let result = f(&mut world);
        self.snapshots.send_replace(Arc::new(world.snapshot()));
        result
    }

    pub async fn start(&self) {
        self.with_world(SimWorld::start).await
    }

    pub async fn stop(&self) {
        self.with_world(SimWorld::stop).await
    }

    pub async fn clear_all(&self) {
        self.with_world(SimWorld::clear_all).await
    }

    pub async fn add_vehicles(
        &self,
        direction: &str,
        count: usize,
    ) -> Result<Vec<VehicleId>, EngineError> {
        self.with_world(|world| world.add_vehicles(direction, count))
            .await
    }

    pub async fn add_ambulance(&self, direction: &str) -> Result<VehicleId, EngineError> {
        self.with_world(|world| world.add_ambulance(direction)).await
    }

    pub async fn vehicle_seed(&self, count: usize) -> Vec<VehicleSeed> {
        self.world.lock().await.vehicle_seed(count)
    }

    pub async fn populate(&self, seeds: Vec<VehicleSeed>) -> Vec<VehicleId> {
        self.with_world(|world| world.populate(seeds)).await
    }

    pub async fn update_settings(
        &self,
        vehicles_per_road: Option<usize>,
        emergency_priority: Option<bool>,
    ) {
        self.with_world(|world| world.update_settings(vehicles_per_road, emergency_priority))
            .await
    }

    /// Consistent snapshot taken under the command lock
    pub async fn state(&self) -> StateSnapshot {
        self.world.lock().await.snapshot()
    }

    pub async fn stats(&self) -> SimulationStats {
        self.world.lock().await.stats()
    }

    /// Most recently published snapshot, without touching the lock
    pub fn latest(&self) -> Arc<StateSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Stop the clock task and wait for it to exit. Pending events are
    /// handed to the hooks first.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send_replace(true);
        self.clock.await.context("Simulation clock task failed")?;
        info!("Simulation clock stopped");
        Ok(())
    }
}

struct Clock {
    world: Arc<Mutex<SimWorld>>,
    snapshots: watch::Sender<Arc<StateSnapshot>>,
    hooks: Vec<HookSlot>,
    /// Hook calls that have not returned or timed out yet
    in_flight: Vec<JoinHandle<()>>,
    /// Events held per busy hook before the oldest are dropped
    backlog_limit: usize,
    interval: Duration,
    delta_secs: f32,
    hook_timeout: Duration,
}

impl Clock {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.interval);
        // A late tick is dropped rather than replayed in a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let outcome = {
                let mut world = self.world.lock().await;
                if world.is_running() {
                    let report = world.tick(self.delta_secs);
                    self.snapshots.send_replace(Arc::new(world.snapshot()));
                    TickOutcome {
                        tick: world.ticks(),
                        time: world.time,
                        events: report.events,
                        exited: report.exited,
                    }
                } else {
                    // No tick, but commands issued while stopped still report
                    let events = world.flush_events();
                    if events.is_empty() {
                        continue;
                    }
                    TickOutcome {
                        tick: world.ticks(),
                        time: world.time,
                        events,
                        exited: Vec::new(),
                    }
                }
            };

            self.dispatch(outcome);
        }

        self.drain().await;
        debug!("Clock loop exited");
    }

    /// Deliver the final flush and every held-back outcome before exiting
    async fn drain(&mut self) {
        let outcome = {
            let mut world = self.world.lock().await;
            TickOutcome {
                tick: world.ticks(),
                time: world.time,
                events: world.flush_events(),
                exited: Vec::new(),
            }
        };
        let (tick, time) = (outcome.tick, outcome.time);
        self.dispatch(outcome);
        self.await_in_flight().await;

        // Hooks that were busy a moment ago get their backlog now
        if self.hooks.iter().any(|slot| slot.backlog.is_some()) {
            self.dispatch(TickOutcome {
                tick,
                time,
                events: Vec::new(),
                exited: Vec::new(),
            });
            self.await_in_flight().await;
        }

        for slot in &mut self.hooks {
            if let Some(backlog) = slot.backlog.take() {
                warn!(
                    "Tick hook {} still busy at shutdown; {} events undelivered",
                    slot.hook.name(),
                    backlog.events.len()
                );
            }
        }
    }

    async fn await_in_flight(&mut self) {
        for call in self.in_flight.drain(..) {
            if let Err(e) = call.await {
                warn!("Tick hook task failed: {e}");
            }
        }
    }

    fn dispatch(&mut self, outcome: TickOutcome) {
        self.in_flight.retain(|call| !call.is_finished());

        for slot in &mut self.hooks {
            let mut outcome = match slot.backlog.take() {
                Some(mut backlog) => {
                    backlog.absorb(outcome.clone());
                    backlog
                }
                None => outcome.clone(),
            };

            if slot.busy.swap(true, Ordering::AcqRel) {
                let excess = outcome.events.len().saturating_sub(self.backlog_limit);
                if excess > 0 {
                    outcome.events.drain(..excess);
                    warn!(
                        "Tick hook {} fell {excess} events behind; oldest dropped",
                        slot.hook.name()
                    );
                }
                debug!(
                    "Tick hook {} still busy; holding {} events past tick {}",
                    slot.hook.name(),
                    outcome.events.len(),
                    outcome.tick
                );
                slot.backlog = Some(outcome);
                continue;
            }

            let hook = Arc::clone(&slot.hook);
            let guard = BusyGuard(Arc::clone(&slot.busy));
            let timeout = self.hook_timeout;

            self.in_flight.push(tokio::spawn(async move {
                let name = hook.name().to_string();
                let call = task::spawn_blocking(move || {
                    let _guard = guard;
                    hook.on_tick(&outcome)
                });
                match time::timeout(timeout, call).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => warn!("Tick hook {name} failed: {e:#}"),
                    Ok(Err(e)) => warn!("Tick hook {name} panicked: {e}"),
                    Err(_) => warn!("Tick hook {name} exceeded {timeout:?}; left running"),
                }
            }));
        }
    }
}
