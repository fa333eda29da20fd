use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use termpod::archive::EntryMetadata;
use termpod::codec::CompressionPolicy;
use termpod::format::FormatTag;
use termpod::report::format_timestamp;
use termpod::volume::{VolumeWriter, VOLUME_LIMIT};
use termpod::PodFile;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "termpod", about = "Terminal Reality POD/EPD archive tool")]
struct Cli {
    /// Log per-entry activity
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive entries
    List {
        input: PathBuf,
        /// Only entries whose name contains this text
        #[arg(short, long)]
        pattern: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Extract entries, following multi-volume chains
    Extract {
        input: PathBuf,
        #[arg(short, long)]
        pattern: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Pack a directory tree into an archive
    Create {
        /// Archive to write; further volumes are written beside it
        output: PathBuf,
        /// Directory whose files are packed
        source: PathBuf,
        /// pod1..pod6 or epd
        #[arg(short, long, default_value = "pod3")]
        format: String,
        /// stored, auto, or a DEFLATE level 1-9 (POD4-POD6 only)
        #[arg(short, long, default_value = "auto")]
        compression: String,
        #[arg(long)]
        comment: Option<String>,
        /// Roll over to a new volume before reaching this size (POD5/POD6)
        #[arg(long, default_value_t = VOLUME_LIMIT)]
        volume_limit: u64,
    },
    /// Append the entries of one archive to another
    Merge {
        dest: PathBuf,
        src: PathBuf,
        /// Write the result here instead of over DEST
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove an entry by name
    Remove {
        input: PathBuf,
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the full diagnostic report
    Info {
        input: PathBuf,
        #[arg(short, long)]
        pattern: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, pattern, json } => {
            let pod = PodFile::open(&input)?;
            let pattern = pattern.as_deref();
            let entries: Vec<_> = pod
                .archive()
                .list()
                .into_iter()
                .filter(|e| pattern.map_or(true, |p| e.name.contains(p)))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Archive: {} ({})", input.display(), pod.format());
                println!("{:>5} {:>10} {:>10} {:>19}  Name", "#", "Size", "Unpacked", "Timestamp");
                for e in &entries {
                    println!("{:>5} {:>10} {:>10} {:>19}  {}",
                        e.index, e.size, e.uncompressed, format_timestamp(e.timestamp), e.name);
                }
                println!("{} of {} entries", entries.len(), pod.count(None));
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, pattern, output_dir } => {
            let pod = PodFile::open(&input)?;
            let n = pod.extract(pattern.as_deref(), &output_dir)?;
            println!("Extracted {} entries to {}", n, output_dir.display());
        }

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { output, source, format, compression, comment, volume_limit } => {
            let tag = FormatTag::from_name(&format)?;
            let policy = parse_policy(&compression);
            let mut writer = VolumeWriter::new(&output, tag).with_limit(volume_limit);
            if let Some(comment) = comment {
                writer.current_mut().header_mut().set_comment(comment.as_bytes());
            }
            for (path, name) in collect_files(&source)? {
                let data = std::fs::read(&path)?;
                let modified: DateTime<Utc> = std::fs::metadata(&path)?.modified()?.into();
                let meta = EntryMetadata::default()
                    .with_timestamp(u32::try_from(modified.timestamp()).unwrap_or(0))
                    .with_compression(policy);
                writer.add(name.as_bytes(), &data, &meta)?;
                println!("  packed  {}", name);
            }
            for volume in writer.finish()? {
                println!("Created: {}", volume.display());
            }
        }

        // ── Merge ────────────────────────────────────────────────────────────
        Commands::Merge { dest, src, output } => {
            let mut into = PodFile::open(&dest)?;
            let from = PodFile::open(&src)?;
            let n = into.merge(&from)?;
            into.write(output.as_deref())?;
            println!("Merged {} entries from {}", n, src.display());
        }

        // ── Remove ───────────────────────────────────────────────────────────
        Commands::Remove { input, name, output } => {
            let mut pod = PodFile::open(&input)?;
            let removed = pod.delete_entry(name.as_str())?;
            pod.write(output.as_deref())?;
            println!("Removed {}", removed.display_name());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, pattern } => {
            let pod = PodFile::open(&input)?;
            println!("Archive: {}", input.display());
            pod.print(pattern.as_deref(), std::io::stdout().lock())?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Files below `root` in a stable order, named relative to it with `\`.
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("\\");
        files.push((entry.into_path(), name));
    }
    Ok(files)
}

fn parse_policy(s: &str) -> CompressionPolicy {
    CompressionPolicy::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown compression '{}', defaulting to auto", s);
        CompressionPolicy::Auto
    })
}
