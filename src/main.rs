use catalog_mirror::catalog::{self, JsonCatalog, ListMode, ListedItem, ROOT_COLLECTION};
use catalog_mirror::config::{self, CONFIG_FILENAME, MirrorConfig};
use catalog_mirror::extract::ExtractorRegistry;
use catalog_mirror::output;
use catalog_mirror::publish;
use catalog_mirror::sync::{SyncOptions, Synchronizer};
use catalog_mirror::types::{FailurePolicy, LinkMode};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog-mirror")]
#[command(about = "Mirror instrument data directories into a data catalog")]
#[command(long_about = "\
Mirror instrument data directories into a data catalog

Directories above the dataset level become collections, every entry at the
dataset level becomes one record. Re-running is safe: entries whose title
already exists in their collection are skipped.

Directory structure (max_depth = 1):

  instrument/
  ├── 2024-05-01/              # Collection \"2024-05-01\"
  │   ├── metadata.json        # Web metadata for every record in this directory
  │   ├── frame001.tif         # Record \"frame001\" (image metadata + thumbnail)
  │   ├── spectrum.csv         # Record \"spectrum\"
  │   └── raw/                 # Record \"raw\" (archived in copy mode)
  └── notes.txt                # Ignored: above the dataset level

Link modes:
  reference   Record points at endpoint + absolute path (default)
  copy        Bytes are pushed into the catalog; directories as .tar.gz

Run 'catalog-mirror gen-config' to generate a documented catalog-mirror.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Log debug narration to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override the `[sync]` section of the config file.
#[derive(clap::Args, Clone)]
struct SyncArgs {
    /// Directory levels between DIR and the dataset directories
    #[arg(long)]
    max_depth: Option<u32>,

    #[command(flatten)]
    attach: IngestArgs,

    /// What to do when an item fails: abort or skip
    #[arg(long)]
    on_error: Option<FailurePolicy>,
}

impl SyncArgs {
    fn apply(&self, config: &mut MirrorConfig) {
        if let Some(depth) = self.max_depth {
            config.sync.max_depth = depth;
        }
        if let Some(policy) = self.on_error {
            config.sync.on_error = policy;
        }
        self.attach.apply(config);
    }
}

/// Flags that override how a single item is attached.
#[derive(clap::Args, Clone)]
struct IngestArgs {
    /// How raw data reaches the catalog: reference or copy
    #[arg(long)]
    link_mode: Option<LinkMode>,

    /// Writable staging area for archives and thumbnails
    #[arg(long)]
    scratch: Option<PathBuf>,
}

impl IngestArgs {
    fn apply(&self, config: &mut MirrorConfig) {
        if let Some(mode) = self.link_mode {
            config.sync.link_mode = mode;
        }
        if let Some(scratch) = &self.scratch {
            config.sync.scratch = Some(scratch.clone());
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Mirror a directory tree into a collection
    Sync {
        /// Local directory to mirror
        dir: PathBuf,
        /// Target collection
        #[arg(long, default_value = ROOT_COLLECTION)]
        collection: String,
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Ingest a single file or directory as one record
    Ingest {
        path: PathBuf,
        /// Target collection
        #[arg(long, default_value = ROOT_COLLECTION)]
        collection: String,
        #[command(flatten)]
        args: IngestArgs,
    },
    /// List the children of a collection
    Ls {
        #[arg(default_value = ROOT_COLLECTION)]
        collection: String,
    },
    /// Print a stock catalog-mirror.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Sync {
            dir,
            collection,
            args,
        } => {
            let (mirror_config, catalog) = open(&cli.config, |c| args.apply(c))?;
            let registry = ExtractorRegistry::from_config(&mirror_config)?;
            let uploader = publish::uploader_from_config(mirror_config.publish.as_ref())?;
            let options = SyncOptions::from_config(&mirror_config.sync);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_sync_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let mut sync = Synchronizer::new(&catalog, &registry, uploader.as_deref(), &options)
                .with_events(tx);
            sync.exclude(catalog.dir());
            let result = sync.sync(&dir, &collection, mirror_config.sync.max_depth);
            // Dropping the synchronizer closes the channel and ends the printer.
            drop(sync);
            printer.join().map_err(|_| "progress printer panicked")?;

            let report = result?;
            output::print_sync_report(&report);
            if !report.is_clean() {
                return Err(format!("{} items failed", report.failures.len()).into());
            }
        }
        Command::Ingest {
            path,
            collection,
            args,
        } => {
            let (mirror_config, catalog) = open(&cli.config, |c| args.apply(c))?;
            let registry = ExtractorRegistry::from_config(&mirror_config)?;
            let uploader = publish::uploader_from_config(mirror_config.publish.as_ref())?;
            let options = SyncOptions::from_config(&mirror_config.sync);
            let sync = Synchronizer::new(&catalog, &registry, uploader.as_deref(), &options);
            let id = sync.ingest_one(&path, &collection)?;
            println!("{} → {}", path.display(), id);
        }
        Command::Ls { collection } => {
            let (_, catalog) = open(&cli.config, |_| {})?;
            let items: Vec<ListedItem> =
                catalog::list_all_items(&catalog, &collection, ListMode::All)?
                    .into_iter()
                    .map(|(title, id)| ListedItem::new(id, title))
                    .collect();
            output::print_listing(&collection, &items);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config, apply CLI overrides, and open the catalog store.
fn open(
    path: &Path,
    overrides: impl FnOnce(&mut MirrorConfig),
) -> Result<(MirrorConfig, JsonCatalog), Box<dyn std::error::Error>> {
    let mut mirror_config = config::load_config(path)?;
    overrides(&mut mirror_config);
    let catalog = JsonCatalog::from_config(&mirror_config.catalog)?;
    Ok((mirror_config, catalog))
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "catalog_mirror=debug"
    } else {
        "catalog_mirror=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
