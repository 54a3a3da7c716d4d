//! attune command line
//!
//! Runs a guided session from a script on a simulated clock, optionally
//! rendering the drone to WAV, and inspects tones and configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use attune::script::{self, Step};
use attune::tone::OfflineRenderer;
use attune::{
    GuidedSession, ModuleDefinition, ModuleKind, Outcome, PermissionState, ToneBinding, TracingSink,
};
use attuneconf::AttuneConfig;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attune", version, about = "Guided sensory sessions")]
struct Cli {
    /// Config file used instead of ./attune.toml
    #[arg(short, long, global = true, env = "ATTUNE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a session through a scripted list of events
    Run {
        /// unhooking, earth, liberation, collective or breath_of_source
        module: ModuleKind,

        /// Steps, e.g. "grant start clear_fragment*8 next wait:2"
        #[arg(short, long)]
        script: String,

        /// Write the session audio to this WAV file (bare names land in paths.render_dir)
        #[arg(short, long)]
        render: Option<PathBuf>,

        /// Print the final snapshot and transition log as JSON
        #[arg(long)]
        json: bool,

        /// Simulate a device that refuses audio
        #[arg(long)]
        deny_audio: bool,
    },

    /// List the tone table
    Tones {
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where it came from
    Config,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, sources) = AttuneConfig::load_with_sources_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    init_tracing(&config.telemetry.log_level);
    debug!("config files: {:?}", sources.files);

    match cli.command {
        Commands::Run {
            module,
            script,
            render,
            json,
            deny_audio,
        } => run(&config, module, &script, render.as_deref(), json, deny_audio),
        Commands::Tones { json } => tones(&config, json),
        Commands::Config => {
            for file in &sources.files {
                println!("# loaded {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# override {}", var);
            }
            print!("{}", config.to_toml());
            Ok(())
        }
    }
}

fn run(
    config: &AttuneConfig,
    module: ModuleKind,
    script: &str,
    render: Option<&Path>,
    json: bool,
    deny_audio: bool,
) -> Result<()> {
    let steps = script::parse(script).context("invalid script")?;

    let sample_rate = config.audio.sample_rate;
    let backend = if deny_audio || !config.audio.grant_permission {
        OfflineRenderer::denying(sample_rate)
    } else {
        OfflineRenderer::new(sample_rate)
    };

    let mut session = GuidedSession::from_config(module, config, backend, Arc::new(TracingSink));

    info!("running {} ({} steps)", module, steps.len());

    let origin = Instant::now();
    let mut now = origin;

    for step in steps {
        match step {
            Step::Grant => {
                let state = session.grant_audio_at(now);
                if !json {
                    let label = match state {
                        PermissionState::Granted => "granted".green().to_string(),
                        _ => "denied".yellow().to_string(),
                    };
                    println!("{} audio {}", stamp(now - origin), label);
                }
            }
            Step::Wait(duration) => {
                let until = now + duration;
                while let Some(deadline) = session.sequencer().next_deadline().filter(|d| *d <= until) {
                    advance(&mut session, &mut now, deadline);
                    if let Some(outcome) = session.poll_at(now) {
                        report(&session, now - origin, "auto NEXT", outcome, json);
                    }
                }
                advance(&mut session, &mut now, until);
            }
            Step::Event(event) => {
                let outcome = session.dispatch_at(event, now);
                report(&session, now - origin, event.kind().as_str(), outcome, json);
            }
        }
    }

    if let Some(path) = render {
        // let the last fade finish
        let tail = session.tone().settings().ramp * 2.0;
        let at = now + Duration::from_secs_f64(tail);
        advance(&mut session, &mut now, at);

        let path = render_path(config, path)?;
        let frames = session
            .tone()
            .backend()
            .write_wav(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("rendered {} frames to {}", frames, path.display());
        if !json {
            println!("rendered {:.2}s to {}", frames as f64 / sample_rate as f64, path.display());
        }
    }

    if json {
        let summary = serde_json::json!({
            "snapshot": session.sequencer().snapshot(),
            "permission": session.tone().permission(),
            "transitions": session.sequencer().transitions(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("final stage: {}", session.current_stage().bold());
    }

    Ok(())
}

/// Move both the session clock and the audio clock forward to `to`.
fn advance(session: &mut GuidedSession<OfflineRenderer>, now: &mut Instant, to: Instant) {
    if to <= *now {
        return;
    }
    let delta = to - *now;
    session.tone_mut().backend_mut().advance(delta.as_secs_f64());
    *now = to;
}

fn report(
    session: &GuidedSession<OfflineRenderer>,
    elapsed: Duration,
    label: &str,
    outcome: Outcome,
    json: bool,
) {
    if json {
        return;
    }
    let at = stamp(elapsed);
    match outcome {
        Outcome::Transitioned { from, to } => {
            println!("{} {:<16} {} -> {}", at, label.cyan(), from, to.green());
        }
        Outcome::Updated => {
            let context = serde_json::to_string(&session.context().progress).unwrap_or_default();
            println!("{} {:<16} {}", at, label.cyan(), context.dimmed());
        }
        Outcome::Blocked(guard) => {
            println!("{} {:<16} blocked by {:?}", at, label.yellow(), guard);
        }
        Outcome::Ignored => {
            println!("{} {:<16} ignored in {}", at, label.dimmed(), session.current_stage());
        }
    }
}

fn stamp(elapsed: Duration) -> String {
    format!("[{:>8.3}s]", elapsed.as_secs_f64())
}

fn render_path(config: &AttuneConfig, path: &Path) -> Result<PathBuf> {
    let path = if path.components().count() == 1 && path.is_relative() {
        config.paths.render_dir.join(path)
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(path)
}

fn tones(config: &AttuneConfig, json: bool) -> Result<()> {
    let binding = ToneBinding::with_overrides(&config.tones);
    if json {
        println!("{}", serde_json::to_string_pretty(&binding)?);
        return Ok(());
    }

    for kind in ModuleKind::ALL {
        let definition = ModuleDefinition::for_kind(kind, &config.sessions);
        let stages: Vec<String> = std::iter::once(definition.initial)
            .chain(definition.stages.iter().copied())
            .filter_map(|stage| definition.tone_mode(stage).map(|mode| format!("{stage}={mode}")))
            .collect();
        println!("{:<11} {}", kind.bold(), stages.join(" "));
    }
    println!();
    for (name, spec) in binding.iter() {
        println!("{:<11} {:>7.2} Hz  level {:.3}", name, spec.frequency, spec.level);
    }
    Ok(())
}
