// 50 Hz module loop with command watchdog, plus the odometry sampler thread
// Note: if the command source dies mid-motion the watchdog stops the wheel
// instead of letting it run on the last target

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, ModuleConfig, ODOMETRY_HZ, TOPIC_CMD_MODULE, TOPIC_HEALTH,
    TOPIC_TELEMETRY,
};
use crate::messages::{ModuleCommand, RuntimeHealth, TelemetryEntry};
use crate::motor::{ActuatorPort, ModuleIo, OdometrySource};
use crate::swerve::{ModuleController, OdometryReconciler};
use crate::telemetry::ChannelSink;

pub struct Runtime<P: ActuatorPort = ModuleIo> {
    controller: ModuleController<P>,
    cmd_received_at: Option<Instant>,
    // True once the wheel has been stopped for lack of motion commands
    idle: bool,
    health: RuntimeHealth,
}

impl<P: ActuatorPort> Runtime<P> {
    pub fn new(controller: ModuleController<P>) -> Self {
        Self {
            controller,
            cmd_received_at: None,
            idle: true,
            health: RuntimeHealth::CmdStale, // Start stale until first motion cmd
        }
    }

    pub fn controller(&self) -> &ModuleController<P> {
        &self.controller
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ModuleCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        if let Err(e) = self.controller.apply(cmd) {
            warn!("Rejected command {:?}: {}", cmd, e);
            return;
        }
        // Only motion commands feed the watchdog
        if cmd.is_motion() {
            self.cmd_received_at = Some(now);
            self.idle = false;
        } else if cmd == ModuleCommand::Stop {
            self.idle = true;
        }
    }

    /// One control period: update the module, then apply the watchdog
    pub fn tick(&mut self, now: Instant) -> RuntimeHealth {
        self.controller.update();

        let stale = match self.cmd_received_at {
            Some(at) => now.saturating_duration_since(at) > CMD_TIMEOUT,
            None => true,
        };

        if stale && !self.idle {
            // Watchdog triggered - stop the wheel
            warn!(
                "Module {}: commands stale, stopping",
                self.controller.name()
            );
            self.controller.stop();
            self.idle = true;
        }

        self.health = if !self.controller.measurement().all_components_connected {
            RuntimeHealth::Degraded
        } else if stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };
        self.health
    }
}

/// Record samples from `source` at ODOMETRY_HZ until `running` is cleared
pub fn spawn_odometry_sampler(
    mut source: Box<dyn OdometrySource>,
    reconciler: OdometryReconciler,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let period = Duration::from_micros(1_000_000 / ODOMETRY_HZ);
    thread::Builder::new()
        .name("odometry".to_string())
        .spawn(move || {
            let mut next = Instant::now();
            while running.load(Ordering::Acquire) {
                if let Some(sample) = source.sample() {
                    reconciler.record_sample(sample);
                }
                next += period;
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // Fell behind; resynchronise rather than burst
                    next = now;
                }
            }
            debug!("Odometry sampler stopped");
        })
}

pub async fn run(config: ModuleConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let io = ModuleIo::from_config(&config)?;
    let (sink, mut telemetry_rx) = ChannelSink::new();
    let controller = ModuleController::new(&config, io, Arc::new(sink));

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MODULE).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // Sampler starts last so a failed session setup leaves no thread behind
    let running = Arc::new(AtomicBool::new(true));
    let sampler = match controller.odometry_source() {
        Some(source) => Some(spawn_odometry_sampler(
            source,
            controller.odometry_reconciler(),
            Arc::clone(&running),
        )?),
        None => {
            info!("No odometry source, sampler not started");
            None
        }
    };

    let mut runtime = Runtime::new(controller);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started for module {}: {}Hz loop, {}Hz odometry, {}ms watchdog timeout",
        config.name,
        LOOP_HZ,
        ODOMETRY_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MODULE);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    let mut telemetry: Vec<TelemetryEntry> = Vec::new();
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), apply in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ModuleCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, Instant::now()),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Update the module (includes watchdog logic)
        let health = runtime.tick(Instant::now());

        // 3. Publish this tick's telemetry as one batch
        telemetry.clear();
        while let Ok(entry) = telemetry_rx.try_recv() {
            telemetry.push(entry);
        }
        pub_telemetry.put(serde_json::to_string(&telemetry)?).await?;

        // 4. Publish health
        pub_health.put(serde_json::to_string(&health)?).await?;
    }

    running.store(false, Ordering::Release);
    if let Some(handle) = sampler {
        if handle.join().is_err() {
            warn!("Odometry sampler panicked");
        }
    }
    runtime.controller.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{DriveCommand, ReplayModuleIo};
    use crate::swerve::{ModuleMeasurement, OdometrySample};
    use crate::telemetry::NullSink;
    use std::sync::atomic::AtomicUsize;

    fn runtime() -> Runtime<ReplayModuleIo> {
        let config = ModuleConfig {
            name: "test".to_string(),
            ..Default::default()
        };
        Runtime::new(ModuleController::new(
            &config,
            ReplayModuleIo::new(),
            Arc::new(NullSink),
        ))
    }

    #[test]
    fn test_stale_until_first_command() {
        let mut rt = runtime();
        assert_eq!(rt.tick(Instant::now()), RuntimeHealth::CmdStale);
        // Nothing was moving, so no stop issued
        assert_eq!(rt.controller().port().stops(), 0);
    }

    #[test]
    fn test_watchdog_stops_once() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.on_command(
            ModuleCommand::TargetState {
                speed: 1.0,
                heading: 0.0,
            },
            t0,
        );
        assert_eq!(rt.tick(t0 + Duration::from_millis(20)), RuntimeHealth::Ok);
        assert_eq!(
            rt.controller().port().drive_command(),
            Some(DriveCommand::Velocity(1.0))
        );

        let late = t0 + CMD_TIMEOUT + Duration::from_millis(10);
        assert_eq!(rt.tick(late), RuntimeHealth::CmdStale);
        assert_eq!(rt.controller().port().stops(), 1);
        assert!(rt.controller().port().drive_command().is_none());

        rt.tick(late + Duration::from_millis(20));
        assert_eq!(rt.controller().port().stops(), 1);
    }

    #[test]
    fn test_non_motion_commands_do_not_feed_watchdog() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.on_command(
            ModuleCommand::TargetState {
                speed: 1.0,
                heading: 0.0,
            },
            t0,
        );

        // Brake toggles every 100 ms for a second, no new motion command
        for step in 1..=10 {
            let now = t0 + Duration::from_millis(100 * step);
            rt.on_command(ModuleCommand::SetBrake { brake: true }, now);
            rt.tick(now);
        }

        assert_eq!(rt.controller().port().stops(), 1);
        assert!(rt.controller().port().drive_command().is_none());
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_rejected_command_does_not_feed_watchdog() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.on_command(
            ModuleCommand::TargetState {
                speed: f64::NAN,
                heading: 0.0,
            },
            t0,
        );
        assert_eq!(rt.tick(t0), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_degraded_when_disconnected() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.controller.port_mut().inject_measurement(ModuleMeasurement {
            all_components_connected: false,
            ..Default::default()
        });
        rt.on_command(ModuleCommand::SetBrake { brake: true }, t0);
        assert_eq!(rt.tick(t0), RuntimeHealth::Degraded);
    }

    struct CountingSource {
        count: Arc<AtomicUsize>,
    }

    impl OdometrySource for CountingSource {
        fn sample(&mut self) -> Option<OdometrySample> {
            let n = self.count.fetch_add(1, Ordering::SeqCst);
            Some(OdometrySample {
                drive_rotations: n as f64,
                steer_heading: 0.0,
            })
        }
    }

    #[test]
    fn test_sampler_records_in_order() {
        let reconciler = OdometryReconciler::with_capacity(1000);
        let count = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_odometry_sampler(
            Box::new(CountingSource {
                count: Arc::clone(&count),
            }),
            reconciler.clone(),
            Arc::clone(&running),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(60));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        let samples = reconciler.drain_samples();
        assert!(!samples.is_empty());
        assert_eq!(samples.len(), count.load(Ordering::SeqCst));
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.drive_rotations, i as f64);
        }
    }
}
