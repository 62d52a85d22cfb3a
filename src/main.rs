use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use dofus_cycler::config::{Settings, parse_level};
use dofus_cycler::constants::config;
use dofus_cycler::hotkey::{CaptureCancel, HotkeyCombo, HotkeyState};
use dofus_cycler::persistence::{BackupStatus, ProfileStore};
use dofus_cycler::platform;
use dofus_cycler::types::WindowId;
use dofus_cycler::{CycleEvent, Cycler};

#[derive(Parser, Debug)]
#[command(name = "dofus-cycler", version, about = "Cycle focus between Dofus and Wakfu clients with one hotkey")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cycle through the selected windows until interrupted
    Run {
        /// Profile to load; defaults to the last one used
        #[arg(short, long)]
        profile: Option<String>,
        /// Hotkey to arm instead of a profile, e.g. ctrl+mouse5
        #[arg(short = 'k', long, conflicts_with = "profile")]
        hotkey: Option<String>,
        /// Character to cycle, in order; every detected client when omitted
        #[arg(short, long = "window", requires = "hotkey")]
        windows: Vec<String>,
    },
    /// List detected game windows
    Windows,
    /// Bring one character's window to the foreground
    Focus {
        character: String,
    },
    /// Wait for a key or mouse button and print its combo
    Capture {
        /// Seconds to wait; the settings value when omitted
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Manage saved profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    List,
    Show {
        name: String,
    },
    /// Save the live windows of the given characters with a hotkey
    Save {
        name: String,
        #[arg(short = 'k', long)]
        hotkey: String,
        #[arg(short, long = "window")]
        windows: Vec<String>,
    },
    Rename {
        from: String,
        to: String,
    },
    Duplicate {
        from: String,
        to: String,
    },
    Delete {
        name: String,
    },
    Import {
        path: PathBuf,
        /// Replace a profile with the same name instead of renaming
        #[arg(long)]
        overwrite: bool,
    },
    Export {
        name: String,
        path: PathBuf,
    },
    /// List backups of a profile, oldest first
    Backups {
        name: String,
    },
    /// Restore the most recent backup of a profile
    Restore {
        name: String,
    },
}

/// Installed before the settings load so its clamping warnings are visible
fn init_logging() -> Result<()> {
    let level = std::env::var(config::LOG_LEVEL_ENV)
        .ok()
        .or_else(|| Settings::logged_level(&Settings::path()))
        .unwrap_or_else(|| "info".to_string());
    let subscriber = FmtSubscriber::builder().with_max_level(parse_level(&level)).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Flag raised by SIGINT or SIGTERM
#[cfg(unix)]
fn stop_flag() -> Result<Arc<AtomicBool>> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, stop.clone()).context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, stop.clone()).context("Failed to register SIGTERM handler")?;
    Ok(stop)
}

#[cfg(not(unix))]
fn stop_flag() -> Result<Arc<AtomicBool>> {
    Ok(Arc::new(AtomicBool::new(false)))
}

fn log_event(event: &CycleEvent) {
    match event {
        CycleEvent::Activated { window, step } => {
            info!(character = %window.character_name, variant = %window.variant, step = %step, "Activated window")
        }
        CycleEvent::ActivationFailed { window, reason } => {
            warn!(window = %window, reason = %reason, "Activation failed")
        }
        CycleEvent::NothingToCycle => info!("Nothing to cycle: no selected window is alive"),
        CycleEvent::AllActivationsFailed => error!("No selected window could be activated"),
        CycleEvent::HotkeyArmed { combo, strategy } => info!(combo = %combo, strategy = %strategy, "Hotkey armed"),
        CycleEvent::HotkeyUnavailable { combo, reason } => {
            error!(combo = %combo, reason = %reason, "Hotkey unavailable")
        }
        CycleEvent::HotkeyDisarmed => info!("Hotkey released"),
        CycleEvent::WindowsChanged { added, removed, changed } => {
            info!(added = added, removed = removed, changed = changed, "Game windows changed")
        }
        CycleEvent::EnumerationFailed { reason } => warn!(reason = %reason, "Window enumeration failed"),
    }
}

fn spawn_event_logger(events: Receiver<CycleEvent>) -> Result<()> {
    thread::Builder::new()
        .name("event-log".to_string())
        .spawn(move || {
            for event in events {
                log_event(&event);
            }
        })
        .context("Failed to spawn event logger")?;
    Ok(())
}

fn open_cycler(settings: &Settings) -> Result<Cycler> {
    let store = ProfileStore::from_settings(settings).context("Failed to open profile store")?;
    let native = platform::native().context("No usable window system")?;
    let mut cycler = Cycler::with_platform(native, settings, store);
    cycler.refresh();
    Ok(cycler)
}

/// Live windows for the named characters, in the order given.
/// Every valid window when `names` is empty.
fn pick_windows(cycler: &Cycler, settings: &Settings, names: &[String]) -> Vec<WindowId> {
    let snapshot = cycler.registry().snapshot();
    let live: Vec<_> = snapshot.windows().iter().filter(|w| w.valid).collect();
    if names.is_empty() {
        return live.iter().map(|w| w.id).collect();
    }

    let mut picked = Vec::new();
    for name in names {
        let found = live
            .iter()
            .find(|w| !picked.contains(&w.id) && settings.name_matching.same_character(&w.character_name, name));
        match found {
            Some(window) => picked.push(window.id),
            None => warn!(character = %name, "No live window for character"),
        }
    }
    picked
}

fn remember_profile(settings: &mut Settings, name: &str) {
    if settings.last_profile.as_deref() == Some(name) {
        return;
    }
    settings.last_profile = Some(name.to_string());
    let _ = settings
        .save()
        .inspect_err(|err| warn!(error = %err, "Failed to remember last profile"));
}

fn run(settings: &mut Settings, profile: Option<String>, hotkey: Option<String>, windows: Vec<String>) -> Result<()> {
    let mut cycler = open_cycler(settings)?;
    spawn_event_logger(cycler.subscribe())?;
    let _ = cycler
        .store()
        .purge_expired_backups()
        .inspect_err(|err| warn!(error = %err, "Failed to purge expired backups"));

    match (hotkey, profile.or_else(|| settings.last_profile.clone())) {
        (Some(hotkey), _) => {
            let combo: HotkeyCombo = hotkey.parse()?;
            let selection = pick_windows(&cycler, settings, &windows);
            info!(windows = selection.len(), "Cycling without a profile");
            cycler.set_selection(selection);
            cycler.arm(combo)?;
        }
        (None, Some(name)) => {
            let loaded = cycler
                .load_profile(&name)
                .with_context(|| format!("Failed to load profile '{name}'"))?;
            if cycler.hotkey_state() != HotkeyState::Armed {
                bail!("hotkey {} of profile '{name}' could not be armed", loaded.hotkey);
            }
            remember_profile(settings, &name);
        }
        (None, None) => bail!("no profile saved yet; pass --profile or --hotkey"),
    }

    let stop = stop_flag()?;
    cycler.run(&stop, settings.refresh_interval())?;

    let stats = cycler.stats();
    info!(
        triggers = stats.triggers,
        activations = stats.activations,
        failures = stats.failures,
        "Session finished"
    );
    Ok(())
}

fn list_windows(settings: &Settings) -> Result<()> {
    let cycler = open_cycler(settings)?;
    let snapshot = cycler.registry().snapshot();
    if snapshot.is_empty() {
        println!("No game windows detected");
        return Ok(());
    }
    for window in snapshot.windows() {
        println!(
            "{:>4}  {:<25} {:<12} {:<16} {}{}",
            window.id.0,
            window.character_name,
            window.variant.wire_name(),
            window.process.name,
            window.title,
            if window.minimized { "  (minimized)" } else { "" }
        );
    }
    Ok(())
}

fn focus(settings: &Settings, character: &str) -> Result<()> {
    let mut cycler = open_cycler(settings)?;
    cycler.set_selection(pick_windows(&cycler, settings, &[]));
    match cycler.focus_character(character) {
        Some(result) => {
            let step = result.with_context(|| format!("Failed to focus '{character}'"))?;
            info!(character = %character, step = %step, "Focused window");
            Ok(())
        }
        None => bail!("no live window for character '{character}'"),
    }
}

fn capture(settings: &Settings, timeout: Option<u64>) -> Result<()> {
    let mut cycler = open_cycler(settings)?;
    let timeout = timeout.map(Duration::from_secs).unwrap_or_else(|| settings.capture_timeout());
    let cancel = CaptureCancel::from_flag(stop_flag()?);
    println!("Press the key or mouse button to use ({}s)...", timeout.as_secs());
    match cycler.start_capture(timeout, &cancel)? {
        Some(combo) => println!("{combo}  ({})", combo.label()),
        None => bail!("no input captured"),
    }
    Ok(())
}

fn profile_command(settings: &mut Settings, command: ProfileCommand) -> Result<()> {
    let store = ProfileStore::from_settings(settings).context("Failed to open profile store")?;
    match command {
        ProfileCommand::List => {
            for name in store.list()? {
                let marker = if settings.last_profile.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        ProfileCommand::Show { name } => {
            let profile = store.read(&name)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        ProfileCommand::Save { name, hotkey, windows } => {
            let combo: HotkeyCombo = hotkey.parse()?;
            let mut cycler = open_cycler(settings)?;
            cycler.set_selection(pick_windows(&cycler, settings, &windows));
            let selected = cycler.selected_windows();
            if selected.is_empty() {
                bail!("no live game window to save");
            }
            let outcome = store.save(&name, &selected, combo)?;
            if let BackupStatus::Failed(reason) = &outcome.backup {
                warn!(profile = %name, reason = %reason, "Saved without a backup");
            }
            println!("Saved '{name}' with {} window(s) to {}", selected.len(), outcome.path.display());
            remember_profile(settings, &name);
        }
        ProfileCommand::Rename { from, to } => {
            store.rename(&from, &to)?;
            if settings.last_profile.as_deref() == Some(from.as_str()) {
                remember_profile(settings, &to);
            }
        }
        ProfileCommand::Duplicate { from, to } => store.duplicate(&from, &to)?,
        ProfileCommand::Delete { name } => {
            if let BackupStatus::Written(path) = store.delete(&name)? {
                println!("Deleted '{name}', backup kept at {}", path.display());
            }
            if settings.last_profile.as_deref() == Some(name.as_str()) {
                settings.last_profile = None;
                settings.save()?;
            }
        }
        ProfileCommand::Import { path, overwrite } => {
            let name = store.import(&path, overwrite)?;
            println!("Imported as '{name}'");
        }
        ProfileCommand::Export { name, path } => store.export(&name, &path)?,
        ProfileCommand::Backups { name } => {
            for backup in store.backups(&name)? {
                println!("{}  {}", backup.taken_at.to_rfc3339(), backup.path.display());
            }
        }
        ProfileCommand::Restore { name } => {
            let outcome = store.restore_latest_backup(&name)?;
            println!("Restored '{name}' to {}", outcome.path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    let mut settings = Settings::load().context("Failed to load settings")?;

    match cli.command {
        Command::Run { profile, hotkey, windows } => run(&mut settings, profile, hotkey, windows),
        Command::Windows => list_windows(&settings),
        Command::Focus { character } => focus(&settings, &character),
        Command::Capture { timeout } => capture(&settings, timeout),
        Command::Profile { command } => profile_command(&mut settings, command),
    }
}
