//! CLI driver (`SPEC_FULL.md` §6): loads an archive's level list, runs
//! the three builders over each level per the resolved `BuildConfig`,
//! and writes the updated archive back out. Everything here is
//! collaborator glue — the builders themselves live in the library.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use wad::Wad;
use zennode_rs::config::{BlockmapConfig, BuildConfig, NodeConfig, RejectConfig, Strategy};
use zennode_rs::level::Level;
use zennode_rs::reject::RejectOutcome;
use zennode_rs::rules::RuleSet;
use zennode_rs::{blockmap, bsp, reject};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    MinSplits,
    MinDepth,
    MinTime,
}

impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Strategy {
        match s {
            StrategyArg::MinSplits => Strategy::MinSplits,
            StrategyArg::MinDepth => Strategy::MinDepth,
            StrategyArg::MinTime => Strategy::MinTime,
        }
    }
}

/// Regenerate a level's BSP tree, blockmap and reject table.
#[derive(Parser, Debug)]
#[command(name = "zennode", version, about)]
struct Cli {
    /// Input archive (IWAD/PWAD).
    wad: PathBuf,

    /// Output path; defaults to overwriting the input in place.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-level `.zen` rules file; a missing file is an empty rule set.
    #[arg(long)]
    rules: Option<PathBuf>,

    #[arg(long)]
    no_blockmap: bool,
    #[arg(long)]
    no_nodes: bool,
    #[arg(long)]
    no_reject: bool,

    #[arg(long, value_enum, default_value_t = StrategyArg::MinSplits)]
    strategy: StrategyArg,

    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    compress_blockmap: bool,

    #[arg(long)]
    empty_reject: bool,
    #[arg(long)]
    force_reject: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Suppress all but warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(cli: &Cli, level: &Level, rule_set: &RuleSet) -> BuildConfig {
    let mut nodes = NodeConfig {
        rebuild: !cli.no_nodes,
        strategy: cli.strategy.into(),
        ..NodeConfig::default()
    };
    rule_set.resolve(level).apply_to(&mut nodes);

    BuildConfig {
        blockmap: BlockmapConfig {
            rebuild: !cli.no_blockmap,
            compress: cli.compress_blockmap,
        },
        nodes,
        reject: RejectConfig {
            rebuild: !cli.no_reject,
            empty: cli.empty_reject,
            force: cli.force_reject,
            ..RejectConfig::default()
        },
    }
}

/// Run every requested builder over one level, mutating it in place.
fn process_level(level: &mut Level, cfg: &BuildConfig) -> Result<()> {
    if !level.is_valid() {
        warn!("level fails index-range validation, skipping builders");
        return Ok(());
    }

    if cfg.nodes.rebuild {
        match bsp::build_nodes(level, &cfg.nodes) {
            Ok((vertices, segs, subsectors, nodes)) => {
                level.set_vertices(vertices);
                level.set_segs(segs);
                level.set_subsectors(subsectors);
                level.set_nodes(nodes);
                info!(subsectors = level.subsectors.len(), nodes = level.nodes.len(), "nodes rebuilt");
            }
            Err(e) => {
                error!(error = %e, "BSP builder overflow");
                anyhow::bail!(e);
            }
        }
    }

    let bm = if cfg.blockmap.rebuild || cfg.reject.rebuild {
        let built = blockmap::build_blockmap(level, cfg.blockmap.compress);
        if cfg.blockmap.rebuild {
            level.set_blockmap(blockmap::encode(&built, cfg.blockmap.compress));
            info!(cells = built.cells.len(), "blockmap rebuilt");
        }
        Some(built)
    } else {
        blockmap::decode(&level.blockmap)
    };

    if cfg.reject.rebuild {
        let Some(bm) = bm.as_ref() else {
            warn!("reject rebuild requested but blockmap is missing/undecodable, skipping");
            return Ok(());
        };
        match reject::build_reject(level, bm, &cfg.reject)? {
            RejectOutcome::Built(bytes) => {
                level.set_reject(bytes, true);
                info!(sectors = level.sectors.len(), "reject rebuilt");
            }
            RejectOutcome::SkippedSpecialEffects => {
                warn!("existing reject matrix looks hand-edited, skipping (pass --force-reject to override)");
            }
        }
    }

    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let rule_set = match &cli.rules {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => RuleSet::parse(&text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rules file unreadable, using empty rule set");
                RuleSet::empty()
            }
        },
        None => RuleSet::empty(),
    };

    let mut wad = Wad::from_file(&cli.wad)
        .with_context(|| format!("opening archive {}", cli.wad.display()))?;

    let markers = wad.level_indices();
    info!(levels = markers.len(), "loaded archive");

    for marker in markers {
        let group = wad.level_group(marker).context("resolving level lump group")?;
        let name = wad.lump_name(marker)?.to_owned();
        let _span = info_span!("level", name = %name).entered();

        let mut level = match Level::load(&wad, &group) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "level failed to load, skipping");
                continue;
            }
        };

        if let Some(title) = level.lookup_title(&wad) {
            info!(title = %title, "processing level");
        } else {
            info!("processing level");
        }

        let cfg = build_config(cli, &level, &rule_set);
        process_level(&mut level, &cfg)?;
        level.save(&mut wad, &group).context("saving level lumps")?;
    }

    let out_path = cli.output.clone().unwrap_or_else(|| cli.wad.clone());
    wad.save_to_file(&out_path)
        .with_context(|| format!("writing archive {}", out_path.display()))?;
    info!(path = %out_path.display(), "archive written");

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    run(&cli)
}
