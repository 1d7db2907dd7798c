use crate::camera::StillCamera;
use crate::config::{FallbackConfig, SpotcamConfig, VerificationTriggerConfig};
use crate::dispatch::Dispatch;
use crate::error::{Result, SpotcamError};
use crate::events::{EventBus, SpotcamEvent};
use crate::presence::{PresenceDetector, PresenceEdge, PresenceState};
use crate::sensor::{RangeSensor, SensorHandle};
use crate::smoothing::{DistanceSmoother, Sample};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long shutdown waits for loops and in-flight bursts before abandoning
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// One time-bounded capture burst: a deadline, a tick interval, and an
/// optional presence gate checked at every tick
struct BurstPlan {
    label: &'static str,
    burst_id: String,
    duration: Duration,
    interval: Duration,
    /// When set, the burst ends early once presence leaves Present
    presence_gate: Option<watch::Receiver<PresenceState>>,
}

impl BurstPlan {
    fn new(label: &'static str, duration: Duration, interval: Duration) -> Self {
        Self {
            label,
            burst_id: Uuid::new_v4().to_string(),
            duration,
            interval,
            presence_gate: None,
        }
    }

    fn gated(mut self, presence: watch::Receiver<PresenceState>) -> Self {
        self.presence_gate = Some(presence);
        self
    }
}

/// Coordinates the sampling loop and the capture trigger behaviors
///
/// Owns the live presence state (published over a watch channel; the
/// detector inside the sampling loop is the only writer) and the set of
/// in-flight capture tasks, which are cancelled and drained on shutdown
/// rather than abandoned.
pub struct TriggerOrchestrator {
    config: SpotcamConfig,
    dispatcher: Arc<dyn Dispatch>,
    camera: Arc<dyn StillCamera>,
    event_bus: EventBus,

    sensor: Option<SensorHandle>,
    sensor_active: bool,

    presence_tx: watch::Sender<PresenceState>,
    presence_rx: watch::Receiver<PresenceState>,

    shutdown_token: CancellationToken,
    loop_tasks: Vec<JoinHandle<()>>,
    burst_tasks: Arc<Mutex<JoinSet<()>>>,
    entry_burst_active: Arc<AtomicBool>,

    shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
}

impl TriggerOrchestrator {
    /// Create a new orchestrator with the given configuration and collaborators
    pub fn new(
        config: SpotcamConfig,
        dispatcher: Arc<dyn Dispatch>,
        camera: Arc<dyn StillCamera>,
        event_bus: EventBus,
    ) -> Self {
        let (presence_tx, presence_rx) = watch::channel(PresenceState::Absent);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            dispatcher,
            camera,
            event_bus,
            sensor: None,
            sensor_active: false,
            presence_tx,
            presence_rx,
            shutdown_token: CancellationToken::new(),
            loop_tasks: Vec::new(),
            burst_tasks: Arc::new(Mutex::new(JoinSet::new())),
            entry_burst_active: Arc::new(AtomicBool::new(false)),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
        }
    }

    /// Select and initialize the range sensor from configuration
    pub async fn initialize(&mut self) -> Result<()> {
        let handle = SensorHandle::from_config(&self.config.sensor).await;
        self.sensor_active = handle.is_active();
        self.sensor = Some(handle);

        if !self.sensor_active {
            info!("Presence sensing unavailable, event triggers are inert");
        }
        Ok(())
    }

    /// Attach an already-initialized sensor driver instead of the configured one
    pub fn attach_sensor(&mut self, sensor: Box<dyn RangeSensor>) {
        self.sensor = Some(SensorHandle::Active(sensor));
        self.sensor_active = true;
    }

    /// Current presence state as last published by the detector
    pub fn presence(&self) -> PresenceState {
        *self.presence_rx.borrow()
    }

    /// Spawn the sampling, verification, and fallback loops
    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting trigger orchestrator (station {}, spot {})",
            self.config.device.station_id, self.config.device.spot_number
        );

        if self.sensor_active {
            let sensor = self
                .sensor
                .take()
                .ok_or_else(|| SpotcamError::system("Orchestrator started before initialize"))?;
            let task = tokio::spawn(sampling_loop(
                sensor,
                self.config.clone(),
                Arc::clone(&self.dispatcher),
                self.event_bus.clone(),
                self.presence_tx.clone(),
                self.shutdown_token.clone(),
                Arc::clone(&self.burst_tasks),
                Arc::clone(&self.entry_burst_active),
            ));
            self.loop_tasks.push(task);
        }

        if self.config.triggers.verification.enabled {
            let task = tokio::spawn(verification_loop(
                self.config.triggers.verification.clone(),
                Arc::clone(&self.dispatcher),
                self.event_bus.clone(),
                self.presence_rx.clone(),
                self.shutdown_token.clone(),
            ));
            self.loop_tasks.push(task);
        } else {
            info!("Periodic verification disabled");
        }

        // No presence signal exists without a sensor; a fixed-interval
        // capture loop stands in for the event triggers.
        if !self.sensor_active && self.config.fallback.enabled {
            let task = tokio::spawn(fallback_loop(
                self.config.fallback.clone(),
                Arc::clone(&self.dispatcher),
                self.shutdown_token.clone(),
            ));
            self.loop_tasks.push(task);
        }

        info!("All trigger loops started");
        Ok(())
    }

    /// Run until a shutdown signal arrives, then stop everything
    pub async fn run(&mut self) -> Result<i32> {
        info!("Spotcam system is running");

        let shutdown_sender = self.shutdown_sender.take().ok_or_else(|| {
            SpotcamError::system("Shutdown sender already taken")
        })?;
        let shutdown_receiver = self.shutdown_receiver.take().ok_or_else(|| {
            SpotcamError::system("Shutdown receiver already taken")
        })?;

        setup_signal_handlers(shutdown_sender).await;

        let shutdown_reason = shutdown_receiver.await.map_err(|_| {
            SpotcamError::system("Shutdown channel closed unexpectedly")
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);
        self.shutdown().await?;

        Ok(0)
    }

    /// Cancel all loops, drain in-flight captures, close hardware handles
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Beginning graceful shutdown");
        let _ = self.event_bus.publish(SpotcamEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "orchestrator stop".to_string(),
        });

        self.shutdown_token.cancel();

        for task in self.loop_tasks.drain(..) {
            let abort = task.abort_handle();
            if timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Trigger loop did not stop within grace period, aborting");
                abort.abort();
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let mut bursts = self.burst_tasks.lock().await;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, bursts.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} capture task(s) did not finish within grace period, aborting",
                        bursts.len()
                    );
                    bursts.abort_all();
                    while bursts.join_next().await.is_some() {}
                    break;
                }
            }
        }
        drop(bursts);

        // The sampling loop closes the sensor on its way out; a sensor that
        // never started (disabled or start() not reached) is closed here.
        if let Some(mut sensor) = self.sensor.take() {
            sensor.close().await;
        }
        self.camera.close().await;

        info!("Graceful shutdown completed");
        Ok(())
    }
}

/// Set up signal handlers for graceful shutdown
async fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
                Err(e) => error!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}

/// Read samples at the configured frequency and turn presence edges into
/// capture triggers
///
/// The loop never waits on the bursts it spawns; a failed read skips the
/// cycle and sampling continues at the next tick.
#[allow(clippy::too_many_arguments)]
async fn sampling_loop(
    mut sensor: SensorHandle,
    config: SpotcamConfig,
    dispatcher: Arc<dyn Dispatch>,
    event_bus: EventBus,
    presence_tx: watch::Sender<PresenceState>,
    shutdown: CancellationToken,
    burst_tasks: Arc<Mutex<JoinSet<()>>>,
    entry_burst_active: Arc<AtomicBool>,
) {
    let period = Duration::from_secs_f64(1.0 / config.sensor.frequency_hz);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut smoother = DistanceSmoother::new(config.sensor.smoothing_window);
    let mut detector =
        PresenceDetector::new(config.sensor.present_mm, config.sensor.absent_mm);

    info!(
        "Sampling loop started at {:.1}Hz (window {}, thresholds {}/{}mm)",
        config.sensor.frequency_hz,
        config.sensor.smoothing_window,
        config.sensor.present_mm,
        config.sensor.absent_mm
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(distance) = sensor.read_distance().await else {
            debug!("Sensor read failed, skipping sample");
            continue;
        };

        let smoothed = smoother.push(Sample::new(distance));
        let Some(smoothed_mm) = smoothed else { continue };

        match detector.observe(smoothed) {
            Some(PresenceEdge::Entry) => {
                let _ = presence_tx.send(PresenceState::Present);
                let _ = event_bus.publish(SpotcamEvent::VehicleEntered {
                    distance_mm: smoothed_mm,
                    timestamp: SystemTime::now(),
                });

                if config.triggers.entry.enabled {
                    spawn_entry_burst(
                        &config,
                        &dispatcher,
                        &event_bus,
                        &shutdown,
                        &burst_tasks,
                        &entry_burst_active,
                    )
                    .await;
                }
            }
            Some(PresenceEdge::Exit) => {
                let _ = presence_tx.send(PresenceState::Absent);
                let _ = event_bus.publish(SpotcamEvent::VehicleExited {
                    distance_mm: smoothed_mm,
                    timestamp: SystemTime::now(),
                });

                if config.triggers.exit.enabled && config.triggers.exit.send_immediate {
                    let dispatcher = Arc::clone(&dispatcher);
                    burst_tasks.lock().await.spawn(async move {
                        dispatcher.capture_and_send("exit").await;
                    });
                }
            }
            None => {}
        }
    }

    sensor.close().await;
    info!("Sampling loop stopped");
}

/// Start an entry burst unless one is already in flight
async fn spawn_entry_burst(
    config: &SpotcamConfig,
    dispatcher: &Arc<dyn Dispatch>,
    event_bus: &EventBus,
    shutdown: &CancellationToken,
    burst_tasks: &Arc<Mutex<JoinSet<()>>>,
    entry_burst_active: &Arc<AtomicBool>,
) {
    if entry_burst_active.swap(true, Ordering::SeqCst) {
        debug!("Entry burst already active, ignoring re-trigger");
        return;
    }

    let plan = BurstPlan::new(
        "entry",
        Duration::from_secs(config.triggers.entry.duration_seconds),
        Duration::from_secs_f64(config.triggers.entry.interval_seconds),
    );
    let dispatcher = Arc::clone(dispatcher);
    let event_bus = event_bus.clone();
    let cancel = shutdown.child_token();
    let active_flag = Arc::clone(entry_burst_active);

    burst_tasks.lock().await.spawn(async move {
        run_burst(plan, dispatcher, event_bus, cancel).await;
        active_flag.store(false, Ordering::SeqCst);
    });
}

/// Execute one capture burst to completion, early stop, or cancellation
///
/// Captures at `t = 0, interval, 2*interval, ...` until the deadline; the
/// presence gate (when present) and the cancellation token are both checked
/// at every tick.
async fn run_burst(
    plan: BurstPlan,
    dispatcher: Arc<dyn Dispatch>,
    event_bus: EventBus,
    cancel: CancellationToken,
) -> u32 {
    info!(
        "Starting {} burst {} ({}s @ {:.1}s intervals)",
        plan.label,
        plan.burst_id,
        plan.duration.as_secs(),
        plan.interval.as_secs_f64()
    );
    let _ = event_bus.publish(SpotcamEvent::BurstStarted {
        label: plan.label.to_string(),
        burst_id: plan.burst_id.clone(),
    });

    let deadline = Instant::now() + plan.duration;
    let mut attempts = 0u32;

    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            debug!("{} burst {} cancelled", plan.label, plan.burst_id);
            break;
        }

        if let Some(gate) = &plan.presence_gate {
            if *gate.borrow() != PresenceState::Present {
                debug!(
                    "Presence lost, ending {} burst {} early",
                    plan.label, plan.burst_id
                );
                break;
            }
        }

        dispatcher.capture_and_send(plan.label).await;
        attempts += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(plan.interval) => {}
        }
    }

    info!(
        "{} burst {} complete after {} attempt(s)",
        plan.label, plan.burst_id, attempts
    );
    let _ = event_bus.publish(SpotcamEvent::BurstCompleted {
        label: plan.label.to_string(),
        burst_id: plan.burst_id,
        attempts,
    });

    attempts
}

/// Periodically re-verify an occupied spot
///
/// Sleeps the check interval, skips the cycle while the spot is vacant, and
/// otherwise runs one presence-gated verification burst to completion
/// before sleeping again.
async fn verification_loop(
    config: VerificationTriggerConfig,
    dispatcher: Arc<dyn Dispatch>,
    event_bus: EventBus,
    presence_rx: watch::Receiver<PresenceState>,
    shutdown: CancellationToken,
) {
    info!(
        "Verification loop started (check every {}s)",
        config.interval_seconds
    );
    let check_interval = Duration::from_secs(config.interval_seconds);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(check_interval) => {}
        }

        if *presence_rx.borrow() != PresenceState::Present {
            debug!("Spot vacant, skipping verification cycle");
            continue;
        }

        info!("Starting periodic verification check");
        let plan = BurstPlan::new(
            "verification",
            Duration::from_secs(config.duration_seconds),
            Duration::from_secs_f64(config.send_interval_seconds),
        )
        .gated(presence_rx.clone());

        run_burst(
            plan,
            Arc::clone(&dispatcher),
            event_bus.clone(),
            shutdown.child_token(),
        )
        .await;
    }

    info!("Verification loop stopped");
}

/// Fixed-interval capture when no presence sensor is available
async fn fallback_loop(
    config: FallbackConfig,
    dispatcher: Arc<dyn Dispatch>,
    shutdown: CancellationToken,
) {
    info!(
        "Fallback periodic capture enabled: every {}s",
        config.interval_seconds
    );
    let capture_interval = Duration::from_secs(config.interval_seconds);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(capture_interval) => {}
        }
        dispatcher.capture_and_send("fallback").await;
    }

    info!("Fallback loop stopped");
}
