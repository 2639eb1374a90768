//! wflua - run Wayfire Lua scripts against a headless compositor.
//!
//! Usage:
//!   wflua run SCRIPT         Run a script, then map and close some views
//!   wflua check SCRIPT       Compile a script without running it
//!   wflua --help             Show help

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;

use wflua::{BridgeStats, HeadlessCompositor, LuaRuntime, RuntimeConfig};
use wflua_core::{Config, Dimensions, SignalData};

#[derive(Parser)]
#[command(
    name = "wflua",
    version,
    about = "Run Wayfire Lua scripts without a compositor",
    long_about = "wflua loads a script the way the Wayfire plugin does, against an \
                  in-memory compositor.\n\n\
                  `wflua run` maps one view per --view, emits `view-mapped` \
                  for it on every output, destroys the views and reports what \
                  the script left behind."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script
    Run {
        /// Script to use as the entrypoint
        script: PathBuf,

        /// Number of outputs to create
        #[arg(short, long, default_value = "1")]
        outputs: usize,

        /// Map a view with this app id (repeatable)
        #[arg(long = "view", value_name = "APP_ID")]
        views: Vec<String>,

        /// Compositor option file (TOML, one table per section)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compile a script without running it
    Check {
        /// Script to check
        script: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct EmissionRow {
    object: String,
    signal: String,
    listeners: usize,
}

#[derive(Serialize)]
struct CommandRow {
    pid: i32,
    command: String,
}

#[derive(Serialize)]
struct Residue {
    emitters: usize,
    connections: usize,
    trackers: usize,
    lifetime_subscriptions: usize,
}

impl From<BridgeStats> for Residue {
    fn from(stats: BridgeStats) -> Self {
        Self {
            emitters: stats.emitters,
            connections: stats.connections,
            trackers: stats.trackers,
            lifetime_subscriptions: stats.lifetime_subscriptions,
        }
    }
}

#[derive(Serialize)]
struct RunReport {
    script: PathBuf,
    script_error: Option<String>,
    emissions: Vec<EmissionRow>,
    commands: Vec<CommandRow>,
    residue: Residue,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    wflua::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            script,
            outputs,
            views,
            config,
            format,
        } => {
            run_script(&script, outputs, &views, config.as_deref(), format)?;
        }
        Command::Check { script } => {
            check_script(&script)?;
        }
    }

    Ok(())
}

/// Build the headless compositor, run `script` as the entrypoint, then drive
/// the requested views through their lifetime.
fn run_script(
    script: &Path,
    outputs: usize,
    views: &[String],
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let script = script.canonicalize().context("Invalid script path")?;
    let (Some(dir), Some(name)) = (script.parent(), script.file_name()) else {
        bail!("{} is not a file", script.display());
    };

    let mut options = Config::wayfire_defaults();
    if let Some(path) = config {
        let overlay = Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        options.merge(overlay);
    }

    let host = Rc::new(HeadlessCompositor::with_config(options));
    let outputs: Vec<_> = (1..=outputs.max(1))
        .map(|i| host.add_output(&format!("HEADLESS-{i}"), Dimensions::new(1920, 1080)))
        .collect();

    let runtime = RuntimeConfig {
        entrypoints: vec![name.to_string_lossy().into_owned()],
        working_dir: Some(dir.to_path_buf()),
        ..RuntimeConfig::default()
    };

    let plugin = wflua::init(Rc::clone(&host), runtime);
    let script_error = plugin.script_error();
    drop(plugin);

    for (i, app_id) in views.iter().enumerate() {
        let view = host.add_view(app_id, app_id, Some(outputs[i % outputs.len()]));
        for &output in &outputs {
            host.emit_data(output, "view-mapped", &SignalData::view(view).with_output(output));
        }
    }
    for view in host.views() {
        host.destroy(view);
    }

    let residue = wflua::fini().unwrap_or_default();

    let report = RunReport {
        script: script.clone(),
        script_error,
        emissions: host
            .emissions()
            .into_iter()
            .map(|e| EmissionRow {
                object: e.object.to_string(),
                signal: e.signal,
                listeners: e.listeners,
            })
            .collect(),
        commands: host
            .commands()
            .into_iter()
            .map(|c| CommandRow {
                pid: c.pid,
                command: c.command,
            })
            .collect(),
        residue: residue.into(),
    };

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(err) = report.script_error {
        bail!("Script failed: {err}");
    }
    if !residue.is_empty() {
        bail!("Bridge state left at teardown: {residue:?}");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", report.script.display());
    println!("{}", "─".repeat(60));
    println!();

    println!(" Emissions:");
    if report.emissions.is_empty() {
        println!("   (none)");
    }
    for emission in &report.emissions {
        println!(
            "   {:<20} on {:<10} {} listener(s)",
            emission.signal, emission.object, emission.listeners
        );
    }
    println!();

    if !report.commands.is_empty() {
        println!(" Commands:");
        for command in &report.commands {
            println!("   [{}] {}", command.pid, command.command);
        }
        println!();
    }

    let residue = &report.residue;
    println!(
        " Residue: {} emitters, {} connections, {} trackers, {} lifetime subscriptions",
        residue.emitters, residue.connections, residue.trackers, residue.lifetime_subscriptions
    );
    if let Some(err) = &report.script_error {
        println!(" Script error: {err}");
    }
    println!();
}

/// Compile a script and report syntax errors.
fn check_script(script: &Path) -> Result<()> {
    let code = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    // mlua errors are not Send + Sync, so they are carried over as text.
    LuaRuntime::check(&code, &script.display().to_string()).map_err(|e| eyre!("{e}"))?;
    println!("{}: OK", script.display());
    Ok(())
}
