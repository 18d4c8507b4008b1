use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

use nuget_sweep::cleaner::{Cleaner, DeletionMode, LocalFs, StagingArea};
use nuget_sweep::cli::args::{Cli, Commands, ConfigAction, OutputFormat};
use nuget_sweep::cli::output::{self, CleanProgress, EventLog};
use nuget_sweep::common::config::{retention_days, Config};
use nuget_sweep::common::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let _log_guard = logging::init(cli.verbose, cli.log_file)?;

    match cli.command {
        Commands::Clean {
            ref root,
            days,
            recoverable,
            permanent,
            ref extension,
        } => cmd_clean(
            &cli,
            root.clone(),
            days,
            recoverable,
            permanent,
            extension.clone(),
        ),

        Commands::Sessions => cmd_sessions(&cli),

        Commands::Restore { last, ref session } => cmd_restore(&cli, last, session.clone()),

        Commands::Purge { yes } => cmd_purge(&cli, yes),

        Commands::Config { ref action } => cmd_config(action),

        Commands::Completions { ref shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                nuget_sweep::cli::args::CompletionShell::Bash => clap_complete::Shell::Bash,
                nuget_sweep::cli::args::CompletionShell::Zsh => clap_complete::Shell::Zsh,
                nuget_sweep::cli::args::CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "nuget-sweep", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ─── Clean ────────────────────────────────────────────────────────────────────

fn cmd_clean(
    cli: &Cli,
    root: Option<PathBuf>,
    days: Option<u32>,
    recoverable: bool,
    permanent: bool,
    extension: Option<String>,
) -> Result<()> {
    let config = Config::load()?;

    let root = root
        .or_else(|| config.cache_root.clone())
        .or_else(|| Config::default_cache_root().filter(|p| p.is_dir()));
    let max_age = days.map(retention_days).unwrap_or_else(|| config.max_age());
    let mode = if recoverable {
        DeletionMode::Recoverable
    } else if permanent {
        DeletionMode::Permanent
    } else {
        config.deletion_mode()
    };
    let extension = extension.unwrap_or_else(|| config.artifact_extension.clone());

    let fs = match (mode, &root) {
        (DeletionMode::Recoverable, Some(root)) => {
            LocalFs::with_staging(StagingArea::new(Config::staging_dir()).begin_session(root))
        }
        _ => LocalFs::new(),
    };

    let mut cleaner = Cleaner::with_fs(fs, max_age)
        .mode(mode)
        .artifact_extension(extension);
    if let Some(ref root) = root {
        cleaner.set_root(root);
    }

    let show_progress = matches!(cli.format, OutputFormat::Human);
    let progress = CleanProgress::new(show_progress);
    let mut log = EventLog::default();
    let started = Instant::now();

    let summary = cleaner
        .run(
            |fraction| progress.set(fraction),
            |event| {
                if let nuget_sweep::CleanEvent::PackageCleaned {
                    ref package,
                    ref version,
                } = event
                {
                    if show_progress {
                        progress.cleaned(package, version);
                    }
                }
                log.record(event);
            },
        )
        .context("Set a cache root with --root or `nuget-sweep config set cache_root <PATH>`")?;
    progress.finish();

    let root = cleaner.root_path().map(PathBuf::from).unwrap_or_default();
    let session_id = cleaner
        .fs()
        .staging()
        .filter(|s| s.dir().exists())
        .map(|s| s.id().to_string());

    match cli.format {
        OutputFormat::Human => output::print_clean_report(
            &root,
            mode,
            &summary,
            &log,
            session_id.as_deref(),
            started.elapsed().as_secs_f64(),
        ),
        OutputFormat::Json => {
            let json = output::clean_json(&root, mode, &summary, &log, session_id.as_deref());
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Quiet => output::print_clean_quiet(&log),
    }

    Ok(())
}

// ─── Staging ──────────────────────────────────────────────────────────────────

fn cmd_sessions(cli: &Cli) -> Result<()> {
    let sessions = StagingArea::new(Config::staging_dir()).list_sessions()?;
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Quiet => {
            for session in &sessions {
                println!("{}", session.info.session_id);
            }
        }
        OutputFormat::Human => output::print_sessions(&sessions),
    }
    Ok(())
}

fn cmd_restore(cli: &Cli, last: bool, session: Option<String>) -> Result<()> {
    let area = StagingArea::new(Config::staging_dir());

    let session_id = match (last, session) {
        (_, Some(id)) => id,
        (true, None) => area
            .most_recent_session()?
            .context("No staged sessions to restore")?,
        (false, None) => anyhow::bail!("Pass --last or --session <ID>"),
    };

    let report = area.restore(&session_id)?;
    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "session_id": report.session_id,
                "restored": report.restored.iter().map(|(package, version)| {
                    serde_json::json!({ "package": package, "version": version })
                }).collect::<Vec<_>>(),
                "errors": report.errors,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Quiet => println!("{}", report.restored.len()),
        OutputFormat::Human => output::print_restore_report(&report),
    }
    Ok(())
}

fn cmd_purge(cli: &Cli, yes: bool) -> Result<()> {
    let area = StagingArea::new(Config::staging_dir());

    if !yes {
        let sessions = area.list_sessions()?;
        if sessions.is_empty() {
            println!("  {} Staging area is empty.", "✓".green());
            return Ok(());
        }
        print!(
            "\n  {} Permanently delete {} staged sessions? [y/N] ",
            "❓",
            sessions.len()
        );
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("  {} Cancelled", "✗".red());
            return Ok(());
        }
    }

    let report = area.purge_all()?;
    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "purged_sessions": report.purged_sessions,
                "bytes_freed": report.bytes_freed,
                "errors": report.errors,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Quiet => println!("{}", report.purged_sessions.len()),
        OutputFormat::Human => output::print_purge_report(&report),
    }
    Ok(())
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            Config::init_dirs()?;
            let config = Config::default();
            config.save()?;
            println!("  {} nuget-sweep initialized at ~/.nuget-sweep", "✓".green());
            println!("  Created: config.toml, staging/, logs/");
            Ok(())
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(key, value)?;
            config.save()?;
            println!("  {} Set {} = {}", "✓".green(), key, value);
            Ok(())
        }
    }
}
