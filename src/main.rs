use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aipbag::bag::Bag;
use aipbag::config::BagOptions;
use aipbag::packer::{Packer, PackerFactory, SizeMethod, METADATA_FILE, METADATA_STANZA, OBJFILE};
use aipbag::store::DirStore;
use aipbag::Handle;

#[derive(Parser)]
#[command(name = "aipbag", about = "Pack repository content into archival bags")]
struct Cli {
    /// JSON file with bag options (format, codec, level, chunk_size)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one node of a directory store into an archive
    Pack {
        store:  PathBuf,
        handle: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Archive format: zbag (default) or tar.zst
        #[arg(short, long)]
        format: Option<String>,
        /// Block codec for zbag: zstd (default), lz4, brotli, lzma, none
        #[arg(short, long)]
        codec: Option<String>,
        #[arg(short, long)]
        level: Option<i32>,
        /// Comma-separated bundles to include (items only)
        #[arg(long)]
        content_filter: Option<String>,
    },
    /// Replay an archive onto an existing node of a directory store
    Unpack {
        store:   PathBuf,
        handle:  String,
        archive: PathBuf,
        #[arg(long)]
        content_filter: Option<String>,
    },
    /// Total payload bytes of a node and its descendants
    Size {
        store:  PathBuf,
        handle: String,
        /// "norecurse" counts the node's own payloads only
        #[arg(short, long, default_value = "recursive")]
        method: String,
    },
    /// List the files inside an archive
    List {
        archive: PathBuf,
    },
    /// Check every file of an archive against its manifest
    Verify {
        archive: PathBuf,
    },
    /// Print the identity properties and metadata of an archive
    Show {
        archive: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aipbag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut options = BagOptions::load(cli.config.as_deref())?;

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { store, handle, output, format, codec, level, content_filter } => {
            if let Some(f) = format { options.set_format(&f)?; }
            if let Some(c) = codec  { options.set_codec(&c)?; }
            if let Some(l) = level  { options.level = l; }

            let store = DirStore::open(&store)?;
            let mut packer = PackerFactory::instance(&store, &Handle::from(handle), &options)?;
            if let Some(filter) = content_filter {
                packer.set_content_filter(&filter)?;
            }
            let archive = packer.pack(&store, &output)?;
            println!("Created: {}", archive.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { store, handle, archive, content_filter } => {
            let mut store = DirStore::open(&store)?;
            let handle = Handle::from(handle);
            let mut packer = PackerFactory::instance(&store, &handle, &options)?;
            if let Some(filter) = content_filter {
                packer.set_content_filter(&filter)?;
            }
            packer.unpack(&mut store, Some(&archive))?;
            println!("Unpacked {} into {}", archive.display(), handle);
        }

        // ── Size ─────────────────────────────────────────────────────────────
        Commands::Size { store, handle, method } => {
            let store = DirStore::open(&store)?;
            let packer = PackerFactory::instance(&store, &Handle::from(handle), &options)?;
            println!("{}", packer.size(&store, SizeMethod::from(method.as_str()))?);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive } => {
            let mut bag = Bag::open(&archive)?;
            println!("Archive: {}", archive.display());
            println!("{:<40} {:>12}", "Path", "Size");
            for (path, size) in bag.sections()? {
                println!("{:<40} {:>12}", path, size);
            }
            bag.empty()?;
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { archive } => {
            // Opening verifies the manifest; the second pass reports the count.
            let mut bag = Bag::open(&archive)?;
            let checked = bag.verify()?;
            bag.empty()?;
            println!("OK: {} file(s) match the manifest", checked);
        }

        // ── Show ─────────────────────────────────────────────────────────────
        Commands::Show { archive } => {
            let mut bag = Bag::open(&archive)?;
            println!("── Bag {} ──────────────────────────────", bag.name());
            for (key, value) in bag.info()? {
                println!("  {:<16} {}", key, value);
            }
            if let Some(props) = bag.flat_reader(OBJFILE)? {
                println!("Properties:");
                for (key, value) in props.iter() {
                    println!("  {:<16} {}", key, value);
                }
            }
            if let Some(mut reader) = bag.xml_reader(METADATA_FILE)? {
                if reader.find_stanza(METADATA_STANZA)? {
                    println!("Metadata:");
                    while let Some(value) = reader.next_value()? {
                        println!("  {:<24} {}", value.name, value.val);
                    }
                }
            }
            let payloads = bag.payload_names()?;
            if !payloads.is_empty() {
                println!("Payloads:");
                for name in payloads {
                    println!("  {}", name);
                }
            }
            bag.empty()?;
        }
    }

    Ok(())
}
