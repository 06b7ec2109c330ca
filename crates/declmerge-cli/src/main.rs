use clap::{Parser, Subcommand, ValueEnum};
use declmerge_core::config::Settings;
use declmerge_core::input::load_tree;
use declmerge_core::logging::init_logging;
use declmerge_core::report::{save_reports, ConflictReport};
use merge_engine::{merge_all, normalize, write_to, DeclTree, Keep, PrinterConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "declmerge",
    about = "Merge, normalize and print generated declaration trees"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file
    #[arg(long, global = true, default_value = "declmerge.json")]
    config: PathBuf,

    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge declaration trees, in order, into one
    Merge {
        /// JSON declaration trees; the first one is the initial left side
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Label for declarations already merged
        #[arg(long)]
        left_label: Option<String>,
        /// Label for incoming declarations
        #[arg(long)]
        right_label: Option<String>,
        /// How to settle incompatible declarations
        #[arg(long, value_enum)]
        keep: Option<KeepArg>,
        /// Print the merged tree as-is
        #[arg(long)]
        no_normalize: bool,
        /// Write conflict reports as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Exit with an error when any conflict was found
        #[arg(long)]
        fail_on_conflict: bool,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Normalize a single declaration tree and print it
    Normalize {
        file: PathBuf,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a declaration tree without changing it
    Print {
        file: PathBuf,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeepArg {
    None,
    Left,
    Right,
}

impl From<KeepArg> for Keep {
    fn from(keep: KeepArg) -> Self {
        match keep {
            KeepArg::None => Keep::None,
            KeepArg::Left => Keep::Left,
            KeepArg::Right => Keep::Right,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_or_default(&cli.config)?;
    let log_dir = cli.log_dir.clone().or_else(|| settings.logging.dir.clone());
    let _guard = init_logging(log_dir.as_deref())?;

    match &cli.command {
        Commands::Merge {
            files,
            left_label,
            right_label,
            keep,
            no_normalize,
            report,
            fail_on_conflict,
            output,
        } => {
            let mut options = settings.merge_options();
            if let Some(label) = left_label {
                options.left_label = label.clone();
            }
            if let Some(label) = right_label {
                options.right_label = label.clone();
            }
            if let Some(keep) = keep {
                options.keep = (*keep).into();
            }

            let trees = files
                .iter()
                .map(|path| load_tree(path))
                .collect::<Result<Vec<DeclTree>, _>>()?;
            tracing::info!(files = trees.len(), "merging declaration trees");

            let mut merged = merge_all(&trees, &options);
            let config = settings.printer_config();

            // Reports render conflict sides before normalization moves them around.
            let reports = ConflictReport::collect(&merged, &config);
            if let Some(path) = report {
                save_reports(path, &reports)?;
                tracing::info!(path = %path.display(), "wrote conflict report");
            }

            if settings.normalize.enabled && !no_normalize {
                normalize(&mut merged.tree);
            }
            emit(&merged.tree, &config, output.as_deref())?;

            if *fail_on_conflict && merged.has_conflicts() {
                anyhow::bail!("{} conflict(s) found", merged.conflicts.len());
            }
            Ok(())
        }
        Commands::Normalize { file, output } => {
            let mut tree = load_tree(file)?;
            normalize(&mut tree);
            emit(&tree, &settings.printer_config(), output.as_deref())
        }
        Commands::Print { file, output } => {
            let tree = load_tree(file)?;
            emit(&tree, &settings.printer_config(), output.as_deref())
        }
    }
}

fn emit(tree: &DeclTree, config: &PrinterConfig, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            write_to(tree, config, std::io::BufWriter::new(file))?;
            tracing::info!(path = %path.display(), "wrote declarations");
        }
        None => write_to(tree, config, std::io::stdout().lock())?,
    }
    Ok(())
}
