//! SkillHub - skill sync and registry CLI
//!
//! Usage:
//!   skillhub              # Sync the current directory (when logged in)
//!   skillhub sync ...     # Reconcile local skills against the registry
//!   skillhub install ...  # Install a published skill
//!   skillhub login        # Store an API token

mod interactive;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillhub_core::prelude::{
    ActionTaken, BumpPolicy, Decision, GlobalConfig, HttpRegistry, InstallOutcome,
    InstallPipeline, LockfileService, PublishOptions, PublishPipeline, Registry, SyncContext,
    SyncMode, SyncOptions, SyncOrchestrator, SyncSummary, VersionSelector, fingerprint_folder,
};

#[derive(Parser)]
#[command(name = "skillhub")]
#[command(about = "Sync local skills with a skill registry", long_about = None)]
struct Cli {
    /// Registry base URL (overrides config)
    #[arg(long, global = true)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile local skill folders against the registry
    Sync {
        /// Directory containing skill folders (repeatable)
        #[arg(long)]
        root: Vec<PathBuf>,

        /// Classify and report only; change nothing
        #[arg(long)]
        dry_run: bool,

        /// Apply every action without prompting
        #[arg(short = 'y', long, alias = "all")]
        yes: bool,

        /// Version bump for update publishes (patch, minor, major)
        #[arg(long, default_value = "patch")]
        bump: String,

        /// Changelog text attached to publishes
        #[arg(long)]
        changelog: Option<String>,

        /// Tags pointed at published versions
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Publish one skill folder
    Publish {
        /// Path to the skill folder
        path: PathBuf,

        /// Version to publish (defaults to a bump of the locked version)
        #[arg(long)]
        version: Option<String>,

        /// Display name shown on the registry
        #[arg(long)]
        name: Option<String>,

        /// Changelog text for this version
        #[arg(long, default_value = "")]
        changelog: String,

        /// Tags to point at this version
        #[arg(long, value_delimiter = ',', default_value = "latest")]
        tags: Vec<String>,
    },

    /// Install a published skill
    Install {
        /// Skill slug
        slug: String,

        /// Exact version to install
        #[arg(long, conflicts_with = "tag")]
        version: Option<String>,

        /// Tag to resolve (defaults to latest)
        #[arg(long)]
        tag: Option<String>,

        /// Overwrite local files that don't match any known version
        #[arg(short, long)]
        force: bool,
    },

    /// Update installed skills to their latest versions
    Update {
        /// Skill slug (omit with --all)
        slug: Option<String>,

        /// Update every skill in the lockfile
        #[arg(long, conflicts_with = "version")]
        all: bool,

        /// Update to a specific version (single slug only)
        #[arg(long)]
        version: Option<String>,

        /// Overwrite local edits
        #[arg(short, long)]
        force: bool,
    },

    /// List locked skills
    List,

    /// Search published skills
    Search {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Store an API token
    Login {
        /// Token value (prompted when omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove the stored API token
    Logout,

    /// Show the account behind the stored token
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillhub=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = GlobalConfig::default_path()?;
    let config = GlobalConfig::load(&config_path)?;

    match cli.command {
        Some(command) => run_command(command, cli.registry, config, config_path).await,
        None => {
            // Bare invocation syncs the current directory when a token is
            // stored, and points at login otherwise.
            if config.token.is_some() {
                let command = Commands::Sync {
                    root: Vec::new(),
                    dry_run: false,
                    yes: false,
                    bump: "patch".to_string(),
                    changelog: None,
                    tags: None,
                };
                run_command(command, cli.registry, config, config_path).await
            } else {
                println!("Not logged in. Run {} first.", style("skillhub login").cyan());
                Ok(())
            }
        }
    }
}

async fn run_command(
    command: Commands,
    registry_override: Option<String>,
    mut config: GlobalConfig,
    config_path: PathBuf,
) -> Result<()> {
    let workdir = std::env::current_dir().context("cannot determine working directory")?;
    let mut ctx = SyncContext::new(workdir, &config);
    if let Some(registry) = registry_override {
        ctx = ctx.with_registry(registry);
    }

    match command {
        Commands::Sync {
            root,
            dry_run,
            yes,
            bump,
            changelog,
            tags,
        } => {
            let bump: BumpPolicy = bump.parse()?;
            ctx = ctx.with_bump(bump);
            let registry = connect(&ctx)?;
            let lockfile = LockfileService::new(ctx.lockfile_path());

            let roots = if root.is_empty() {
                vec![ctx.skills_dir.clone()]
            } else {
                root
            };
            let mode = if dry_run {
                SyncMode::DryRun
            } else if yes || !console::user_attended() {
                SyncMode::Batch
            } else {
                SyncMode::Interactive
            };
            let options = SyncOptions {
                changelog,
                tags,
                explicit_version: None,
            };

            let orchestrator = SyncOrchestrator::new(registry, lockfile, ctx);
            let summary = orchestrator
                .sync(&roots, mode, &options, interactive::confirm_action)
                .await?;
            print_summary(&summary, mode);
            if !summary.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Publish {
            path,
            version,
            name,
            changelog,
            tags,
        } => {
            let registry = connect(&ctx)?;
            let lockfile = LockfileService::new(ctx.lockfile_path());
            let snapshot = fingerprint_folder(&path)?;

            let version = match version {
                Some(version) => version,
                None => match lockfile.get(&snapshot.slug)? {
                    Some(entry) => {
                        let current = semver::Version::parse(&entry.version)
                            .with_context(|| format!("locked version '{}'", entry.version))?;
                        ctx.bump.bump(&current).to_string()
                    }
                    None => skillhub_core::reconcile::INITIAL_VERSION.to_string(),
                },
            };

            let pipeline = PublishPipeline::new(registry, lockfile, ctx.upload_concurrency);
            let options = PublishOptions {
                display_name: name,
                changelog,
                tags,
            };
            let outcome = pipeline.publish(&snapshot, &version, &options).await?;
            println!(
                "{} {}@{} ({} uploaded, {} reused)",
                style("Published").green().bold(),
                outcome.slug,
                outcome.version,
                outcome.uploaded,
                outcome.deduped
            );
        }

        Commands::Install {
            slug,
            version,
            tag,
            force,
        } => {
            let registry = connect(&ctx)?;
            let lockfile = LockfileService::new(ctx.lockfile_path());
            let selector = selector_for(version, tag);
            let dest = ctx.skills_dir.join(&slug);

            let pipeline = InstallPipeline::new(registry, lockfile);
            match pipeline.install(&slug, &selector, &dest, force).await? {
                InstallOutcome::Installed { version, files } => {
                    println!(
                        "{} {slug}@{version} ({files} files) to {}",
                        style("Installed").green().bold(),
                        dest.display()
                    );
                }
                InstallOutcome::UpToDate { version } => {
                    println!("{slug}@{version} is up to date");
                }
            }
        }

        Commands::Update {
            slug,
            all,
            version,
            force,
        } => {
            let registry = connect(&ctx)?;
            let lockfile = LockfileService::new(ctx.lockfile_path());
            let selector = match version {
                Some(version) => VersionSelector::Exact(version),
                None => VersionSelector::Latest,
            };

            let slugs: Vec<String> = if all {
                let mut slugs: Vec<String> =
                    lockfile.load()?.skills.keys().cloned().collect();
                slugs.sort();
                slugs
            } else {
                match slug {
                    Some(slug) => vec![slug],
                    None => bail!("pass a skill slug or --all"),
                }
            };

            let pipeline = InstallPipeline::new(registry, lockfile);
            let mut failures = 0;
            for slug in slugs {
                let dest = ctx.skills_dir.join(&slug);
                match pipeline.update(&slug, &selector, &dest, force).await {
                    Ok(InstallOutcome::Installed { version, .. }) => {
                        println!("{} {slug}@{version}", style("Updated").green().bold());
                    }
                    Ok(InstallOutcome::UpToDate { version }) => {
                        println!("{slug}@{version} is up to date");
                    }
                    Err(err) => {
                        failures += 1;
                        eprintln!("{} {slug}: {err}", style("Failed").red().bold());
                    }
                }
            }
            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::List => {
            let lockfile = LockfileService::new(ctx.lockfile_path()).load()?;
            if lockfile.skills.is_empty() {
                println!("No skills locked in {}", ctx.lockfile_path().display());
                return Ok(());
            }
            let mut entries: Vec<_> = lockfile.skills.values().collect();
            entries.sort_by(|a, b| a.slug.cmp(&b.slug));
            for entry in entries {
                let tag = entry
                    .tag
                    .as_deref()
                    .map(|t| format!(" ({t})"))
                    .unwrap_or_default();
                println!(
                    "{} {}{} {}",
                    style(&entry.slug).cyan(),
                    entry.version,
                    style(tag).dim(),
                    style(entry.updated_at.format("%Y-%m-%d %H:%M")).dim()
                );
            }
        }

        Commands::Search { query, limit } => {
            let registry = connect(&ctx)?;
            let hits = registry.search(&query, limit).await?;
            if hits.is_empty() {
                println!("No skills matching '{query}'");
                return Ok(());
            }
            for hit in hits {
                let name = hit.display_name.unwrap_or_else(|| hit.slug.clone());
                let summary = hit.summary.unwrap_or_default();
                println!("{} {} {}", style(&hit.slug).cyan(), name, style(summary).dim());
            }
        }

        Commands::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => interactive::prompt_token()?,
            };
            // Validate before persisting so a typo'd token never sticks.
            let probe = HttpRegistry::new(&ctx.registry, Some(token.clone()))?;
            let handle = probe.whoami().await?;
            config.token = Some(token);
            config.save(&config_path)?;
            println!("Logged in as {}", style(handle).green().bold());
        }

        Commands::Logout => {
            config.token = None;
            config.save(&config_path)?;
            println!("Logged out");
        }

        Commands::Whoami => {
            let registry = connect(&ctx)?;
            let handle = registry.whoami().await?;
            println!("{handle}");
        }
    }

    Ok(())
}

/// Build the HTTP registry client from the resolved context.
fn connect(ctx: &SyncContext) -> Result<Arc<HttpRegistry>> {
    let registry = HttpRegistry::new(&ctx.registry, ctx.token.clone())?;
    Ok(Arc::new(registry))
}

fn selector_for(version: Option<String>, tag: Option<String>) -> VersionSelector {
    match (version, tag) {
        (Some(version), _) => VersionSelector::Exact(version),
        (None, Some(tag)) => VersionSelector::Tag(tag),
        (None, None) => VersionSelector::Latest,
    }
}

fn print_summary(summary: &SyncSummary, mode: SyncMode) {
    for report in &summary.reports {
        let line = match (&report.decision, &report.action) {
            (Decision::Skip, ActionTaken::None) => continue,
            (Decision::Unchanged, _) => format!("{}", style("unchanged").dim()),
            (decision, ActionTaken::Planned) => {
                format!("would {}", interactive::describe(decision))
            }
            (_, ActionTaken::Published { version }) => {
                format!("{} {version}", style("published").green())
            }
            (_, ActionTaken::Installed { version }) => {
                format!("{} {version}", style("installed").green())
            }
            (_, ActionTaken::Declined) => format!("{}", style("skipped").yellow()),
            (_, ActionTaken::Failed { error }) => {
                format!("{} {error}", style("failed").red())
            }
            (Decision::Conflict { reason }, _) => {
                format!("{} {reason}", style("conflict").red().bold())
            }
            (decision, ActionTaken::None) => interactive::describe(decision),
        };
        println!("  {} {}", style(&report.slug).cyan(), line);
    }

    let verb = if mode == SyncMode::DryRun { "planned" } else { "done" };
    println!(
        "{verb}: {} published, {} installed, {} conflicts, {} failed",
        summary.published(),
        summary.installed(),
        summary.conflicts(),
        summary.failed()
    );
}
