//! Lists the records of a pak archive and optionally extracts one.
//!
//! ```text
//! cargo run -p pak-format --example pak_list -- --archive 000-Game_P.pak --headers
//! cargo run -p pak-format --example pak_list -- --archive 000-Game_P.pak --extract metadata.json --output out.json
//! ```
//!
//! Set `RUST_LOG=pak_format=debug` to see footer, index and block activity.
use clap::Parser;
use pak_format::{PakArchive, PakConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pak_list")]
struct Cli {
    /// Archive to read.
    #[clap(long, env = "PAK_SAMPLE_FILE")]
    pub archive: PathBuf,

    /// Print each record's decoded header.
    #[clap(long)]
    pub headers: bool,

    /// Verify content hashes while extracting.
    #[clap(long)]
    pub verify: bool,

    /// Record to extract.
    #[clap(long)]
    pub extract: Option<String>,

    /// File to write the extracted record to; without it only the size is printed.
    #[clap(long)]
    pub output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Cli::parse();

    let config = PakConfig::default()
        .with_header_cache(true)
        .with_hash_verification(args.verify);
    let mut archive = PakArchive::open_with_config(&args.archive, config)?;
    archive.load_records()?;

    println!(
        "{}: version {}, {} records, mount point {:?}",
        args.archive.display(),
        archive.version().unwrap_or_default(),
        archive.len(),
        archive.mount_point()
    );

    for record in archive.records() {
        if args.headers {
            let header = archive.read_header(&record.name)?;
            println!(
                "{:>10} {:>10} {:<10} {:>4} blocks{} {}",
                header.compressed_size,
                header.decompressed_size,
                header.compression_method.to_string(),
                header.compression_blocks.len(),
                if header.is_encrypted { " enc" } else { "    " },
                record.name
            );
        } else {
            println!("{}", record.name);
        }
    }

    if let Some(name) = args.extract {
        let data = archive.read_data(&name)?;
        if data.is_encrypted() {
            info!("{name} is encrypted, writing raw bytes");
        }
        match args.output {
            Some(path) => {
                std::fs::write(&path, data.as_bytes())?;
                info!("Wrote {} bytes to {}", data.len(), path.display());
            }
            None => println!("{name}: {} bytes", data.len()),
        }
    }

    Ok(())
}
