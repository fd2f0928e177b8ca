mod gamepad;

use crate::gamepad::{standard_button_map, GamepadDriver};
use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use padmap::config::Settings;
use padmap::controller::{InputRouter, RumbleGenerator, RumblePattern};
use padmap::mapping::{
    Action, ActionDispatcher, ActionTable, ButtonSequence, InputCode, Keymap, KeymapAction,
    KeymapHandler, KeymapSource, Modifiers, WindowResolver, GLOBAL_WINDOW,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Keymap used when no keymap file is configured.
const DEFAULT_KEYMAP: &str = r#"
[[window]]
id = -1

[[window.joystick]]
key = "a"
action = "select"

[[window.joystick]]
key = "a"
action = "contextmenu"
holdtime = 500

[[window.joystick]]
key = "b"
action = "back"

[[window.joystick]]
key = "x"
action = "stop"

[[window.joystick]]
key = "y"
action = "info"

[[window.joystick]]
key = "start"
action = "playpause"

[[window.joystick]]
key = "back"
action = "osd"

[[window.joystick]]
key = "guide"
action = "fullscreen"

[[window.joystick]]
key = "leftbumper"
action = "skipprevious"

[[window.joystick]]
key = "rightbumper"
action = "skipnext"

[[window.joystick]]
key = "rightbumper"
action = "screenshot"
hotkeys = "leftbumper"

[[window.joystick]]
key = "up"
action = "up"

[[window.joystick]]
key = "down"
action = "down"

[[window.joystick]]
key = "left"
action = "left"

[[window.joystick]]
key = "right"
action = "right"

[[window.joystick]]
key = "leftstick"
direction = "up"
action = "up"

[[window.joystick]]
key = "leftstick"
direction = "down"
action = "down"

[[window.joystick]]
key = "leftstick"
direction = "left"
action = "left"

[[window.joystick]]
key = "leftstick"
direction = "right"
action = "right"

[[window.joystick]]
key = "rightstick"
direction = "up"
action = "analogmoveyup"

[[window.joystick]]
key = "rightstick"
direction = "down"
action = "analogmoveydown"

[[window.joystick]]
key = "lefttrigger"
action = "analogrewind"

[[window.joystick]]
key = "righttrigger"
action = "analogfastforward"

[[window.keyboard]]
key = "enter"
action = "select"

[[window.keyboard]]
key = "enter"
modifiers = ["long"]
action = "contextmenu"

[[window.keyboard]]
key = "escape"
action = "back"

[[window.mouse]]
button = "right"
action = "back"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = Settings::load_or_default();
    debug!("Using settings: {:?}", settings);

    let table = ActionTable::standard();
    let (keymap, resolver) = load_keymap(&settings, &table)?;
    log_discrete_bindings(&resolver);

    let handler = KeymapHandler::new(
        Arc::new(keymap),
        LoggingDispatcher::new(table),
        settings.timing.clone(),
    )
    .with_button_sequence(
        ButtonSequence::konami().with_action(KeymapAction::new(18, "fullscreen")),
    );
    let mut router = InputRouter::new(
        handler,
        standard_button_map(),
        settings.calibration.clone(),
    );

    let mut driver = GamepadDriver::create(settings.driver.clone())
        .and_then(|driver| driver.initialize())
        .map_err(|e| eyre!("Failed to start gamepad driver: {}", e))?;

    let mut rumble: Option<RumbleGenerator> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(settings.driver.poll_interval_ms));
    // Hold timing runs on the monotonic clock, wall time is only logged
    let start = Instant::now();

    info!(
        "Session started at {}, polling gamepad every {} ms",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        settings.driver.poll_interval_ms
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                driver.poll(&mut router, now_ms);
                router.process_holds(now_ms);

                if driver.take_connected() {
                    if let Some(id) = driver.active_gamepad() {
                        info!("Gamepad {} is feeding the keymap", id);
                    }
                    if !settings.driver.rumble_test_on_connect {
                        continue;
                    }
                    if let Some(device) = driver.rumble_device() {
                        rumble = Some(RumbleGenerator::spawn(
                            Arc::new(device),
                            RumblePattern::Test,
                            settings.rumble.clone(),
                        ));
                    }
                }
            }
        }
    }

    if let Some(generator) = rumble {
        generator.stop();
        generator.join().await?;
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn load_keymap(settings: &Settings, table: &ActionTable) -> Result<(Keymap, WindowResolver)> {
    let source = match &settings.driver.keymap_path {
        Some(path) => {
            info!("Loading keymap from {}", path.display());
            KeymapSource::from_path(path)?
        }
        None => {
            info!("No keymap configured, using built-in defaults");
            KeymapSource::from_toml_str(DEFAULT_KEYMAP)?
        }
    };
    Ok(source.build(table)?)
}

// Gamepads cannot produce keyboard input; show what the resolver would do
fn log_discrete_bindings(resolver: &WindowResolver) {
    info!("Keyboard, mouse and remote bindings in {} windows", resolver.window_count());
    let enter = InputCode::Keyboard {
        key: 0x0d,
        modifiers: Modifiers::NONE,
    };
    match resolver.get_action(GLOBAL_WINDOW, &enter, true) {
        Some(bound) => debug!("{} resolves to '{}'", enter, bound.action_string),
        None => debug!("{} is unbound", enter),
    }
}

/// Logs every dispatched action.
struct LoggingDispatcher {
    table: ActionTable,
    dispatched: u64,
}

impl LoggingDispatcher {
    fn new(table: ActionTable) -> Self {
        Self {
            table,
            dispatched: 0,
        }
    }
}

impl ActionDispatcher for LoggingDispatcher {
    fn is_analog(&self, action_id: u32) -> bool {
        self.table.is_analog(action_id)
    }

    fn dispatch(&mut self, action: Action) {
        self.dispatched += 1;
        if self.table.is_analog(action.id) {
            debug!(
                "Analog action {} ({}) amount {:.3} from {}",
                action.name, action.id, action.amount, action.key
            );
        } else {
            info!(
                "Action #{}: {} ({}) from {} in window {}, held {} ms",
                self.dispatched, action.name, action.id, action.key, action.window, action.hold_time_ms
            );
        }
    }
}
