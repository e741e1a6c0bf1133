// Keyboard teleop for one module: WASD heading, R/F speed, B brake,
// C closed loop, Space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_module_runtime::config::TOPIC_CMD_MODULE;
use swerve_module_runtime::messages::ModuleCommand;

const SPEEDS: [f64; 3] = [0.2, 0.8, 2.0]; // m/s
const INPUT_TIMEOUT_MS: u64 = 100; // Drop speed to zero after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MODULE).await?;

    info!("Controls: WASD=heading, R/F=speed, B=brake, C=closed loop, Space=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn publish(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &ModuleCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut brake = true;
    let mut closed_loop = true;

    // Heading persists after release so the wheel holds its direction
    let mut heading: f64 = 0.0;
    let mut speed = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Heading - update speed and refresh timestamp
                    KeyCode::Char(key @ ('w' | 'a' | 's' | 'd')) if pressed => {
                        heading = key_heading_deg(key).to_radians();
                        speed = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('b') if pressed => {
                        brake = !brake;
                        info!("Brake: {}", brake);
                        publish(publisher, &ModuleCommand::SetBrake { brake }).await?;
                    }
                    KeyCode::Char('c') if pressed => {
                        closed_loop = !closed_loop;
                        info!("Closed loop: {}", closed_loop);
                        publish(publisher, &ModuleCommand::SetClosedLoop { closed_loop }).await?;
                    }
                    KeyCode::Char(' ') if pressed => {
                        speed = 0.0;
                        publish(publisher, &ModuleCommand::Stop).await?;
                        continue;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Zero speed if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        publish(publisher, &ModuleCommand::TargetState { speed, heading }).await?;
    }

    publish(publisher, &ModuleCommand::Stop).await?;
    Ok(())
}

fn key_heading_deg(key: char) -> f64 {
    match key {
        'a' => 90.0,
        's' => 180.0,
        'd' => -90.0,
        _ => 0.0,
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
