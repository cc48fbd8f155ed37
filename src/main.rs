use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use gardengate_patcher::config::{LauncherConfig, Resources};
use gardengate_patcher::delta::{DeltaEngine, Xdelta3, XdeltaCommand};
use gardengate_patcher::orchestrator;
use gardengate_patcher::side_file::InstallOutcome;
use gardengate_patcher::{PatchOrchestrator, Title};

#[derive(Parser)]
#[command(name = "gg-patcher", about = "Patch and restore Garden Gate game installs")]
struct Cli {
    /// Configuration file [default: <base dir>/config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding dinput8.dll and patches/ [default: directory of this executable]
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a game is patched
    Status {
        #[arg(long, value_enum)]
        title: Title,
        /// Game executable [default: from config]
        #[arg(long)]
        game: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply the patch set to a game
    Patch {
        #[arg(long, value_enum)]
        title: Title,
        /// Game executable [default: from config]
        #[arg(long)]
        game: Option<PathBuf>,
        /// Delta file (GW2) or patches directory (BFN) [default: <base dir>/patches/<title>]
        #[arg(long)]
        delta: Option<PathBuf>,
        /// Side file to install [default: <base dir>/dinput8.dll]
        #[arg(long)]
        side_file: Option<PathBuf>,
    },
    /// Restore a patched game to its original files
    Restore {
        #[arg(long, value_enum)]
        title: Title,
        /// Game executable [default: from config]
        #[arg(long)]
        game: Option<PathBuf>,
    },
    /// Manage the side file next to the game executable
    SideFile {
        #[arg(long, value_enum)]
        title: Title,
        /// Game executable [default: from config]
        #[arg(long)]
        game: Option<PathBuf>,
        /// Side file to install [default: <base dir>/dinput8.dll]
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(value_enum)]
        action: SideFileAction,
    },
    /// Apply a single delta file
    ApplyRaw {
        /// Original file
        reference: PathBuf,
        /// xdelta3 patch
        delta: PathBuf,
        /// Output path
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideFileAction {
    Install,
    Enable,
    Disable,
    Remove,
}

fn init_logging(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn default_base_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default())
}

fn engine_for(cfg: &LauncherConfig) -> Box<dyn DeltaEngine> {
    match &cfg.xdelta_program {
        Some(program) => Box::new(XdeltaCommand::new(program)),
        None => Box::new(Xdelta3),
    }
}

/// Launcher config plus whether it may be written back.
struct ConfigFile {
    path: PathBuf,
    cfg: LauncherConfig,
    /// False when the file exists but could not be read; saving would clobber it.
    writable: bool,
}

impl ConfigFile {
    fn load(path: PathBuf) -> Self {
        match LauncherConfig::load(&path) {
            Ok(cfg) => Self {
                path,
                cfg,
                writable: true,
            },
            Err(e) => {
                warn!("{e}; using defaults and leaving the file untouched");
                Self {
                    path,
                    cfg: LauncherConfig::default(),
                    writable: false,
                }
            }
        }
    }

    /// Resolve the game executable from the argument or the config, remembering an explicit one.
    fn resolve_game(&mut self, title: Title, game: Option<PathBuf>) -> Result<PathBuf> {
        match game {
            Some(game) => {
                let entry = self.cfg.game_mut(title);
                let as_string = game.to_string_lossy().into_owned();
                if entry.game_path != as_string {
                    entry.game_path = as_string;
                    self.cfg.game_selected = title;
                    if self.writable {
                        if let Err(e) = self.cfg.save(&self.path) {
                            warn!("{e}");
                        }
                    }
                }
                Ok(game)
            }
            None => match self.cfg.game(title).game_path() {
                Some(path) => Ok(path),
                None => bail!(
                    "No {title} game path given and none saved in {}",
                    self.path.display()
                ),
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => default_base_dir()?,
    };
    let resources = Resources::new(base_dir);
    let mut config = ConfigFile::load(cli.config.unwrap_or_else(|| resources.config_file()));

    match cli.command {
        Commands::Status { title, game, json } => {
            let game = config.resolve_game(title, game)?;
            let orch = PatchOrchestrator::with_engine(title, engine_for(&config.cfg));
            let status = orch.status(&game);

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("{title}: {}", game.display());
            println!("  Patched: {}", if status.patched { "yes" } else { "no" });
            println!("  Side file: {:?}", status.side_file);
            if let Some(digest) = &status.executable_blake3 {
                println!("  Executable BLAKE3: {digest}");
            }
            if let Some(digest) = &status.backup_blake3 {
                println!("  Backup BLAKE3: {digest}");
            }
            for path in &status.auxiliary_backups {
                println!("  Backed up: {}", path.display());
            }
            for path in &status.disabled_files {
                println!("  Disabled: {}", path.display());
            }
            for path in &status.interfering_files {
                println!("  Active: {}", path.display());
            }
        }
        Commands::Patch {
            title,
            game,
            delta,
            side_file,
        } => {
            let game = config.resolve_game(title, game)?;
            let delta = match delta.or_else(|| resources.delta_location(title)) {
                Some(delta) => delta,
                None => bail!("{title} has no executable patch; use `side-file` instead"),
            };
            let side_file = side_file.unwrap_or_else(|| resources.side_file_source());
            let orch = PatchOrchestrator::with_engine(title, engine_for(&config.cfg));

            if orch.is_patched(&game) {
                info!("{title} already looks patched; the existing backup will be replaced");
            }

            let start = Instant::now();
            let summary = orch
                .apply(&game, &delta, &side_file)
                .with_context(|| format!("Failed to patch {}", game.display()))?;

            println!("\n{title} patched successfully!");
            println!(
                "  Side file: {}",
                if summary.side_file_installed { "installed" } else { "already in place" }
            );
            println!("  Auxiliary files patched: {}", summary.auxiliary_patched);
            println!("  Auxiliary files skipped: {}", summary.auxiliary_skipped);
            println!("  Files disabled: {}", summary.interfering_disabled);
            println!("  Time elapsed: {:.3}s", start.elapsed().as_secs_f64());
        }
        Commands::Restore { title, game } => {
            let game = config.resolve_game(title, game)?;
            let orch = PatchOrchestrator::with_engine(title, engine_for(&config.cfg));

            let summary = orch
                .restore(&game)
                .with_context(|| format!("Failed to restore {}", game.display()))?;

            println!("\n{title} restored to original");
            println!("  Auxiliary files restored: {}", summary.auxiliary_restored);
            println!("  Files re-enabled: {}", summary.interfering_enabled);
        }
        Commands::SideFile {
            title,
            game,
            source,
            action,
        } => {
            let game = config.resolve_game(title, game)?;
            let orch = PatchOrchestrator::with_engine(title, engine_for(&config.cfg));

            match action {
                SideFileAction::Install => {
                    let source = source.unwrap_or_else(|| resources.side_file_source());
                    match orch.install_side_file(&game, &source)? {
                        InstallOutcome::AlreadyInPlace => println!("Side file already in place"),
                        InstallOutcome::Copied | InstallOutcome::Displaced => {
                            println!("Side file installed for {title}")
                        }
                    }
                }
                SideFileAction::Enable => {
                    orch.set_side_file_enabled(&game, true)?;
                    println!("Side file enabled for {title}");
                }
                SideFileAction::Disable => {
                    orch.set_side_file_enabled(&game, false)?;
                    println!("Side file disabled for {title}");
                }
                SideFileAction::Remove => {
                    orch.remove_side_file(&game);
                    println!("Side file removed for {title}");
                }
            }
        }
        Commands::ApplyRaw {
            reference,
            delta,
            output,
        } => {
            let engine = engine_for(&config.cfg);
            orchestrator::apply_raw(&*engine, &reference, &delta, &output)
                .with_context(|| format!("Failed to apply {}", delta.display()))?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}
