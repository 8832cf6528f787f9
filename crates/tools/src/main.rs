//! Offline snapshot tool
//!
//! Reads a captured page (JSON `CapturedPage`), runs the snapshot pipeline
//! against the live network and writes the result to a directory:
//!
//! ```text
//! <out>/index.html            rewritten markup
//! <out>/resources/ab/<sha>.x  one file per stored resource
//! <out>/snapshot.json         metadata, text and upload batches
//! ```

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use snapshot::{
    CapturedPage, ProgressCounters, ResourceMeta, Snapshot, SnapshotConfig, SnapshotResource, Snapshotter,
    batch_resources,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "Usage: snapshot-page <captured.json> [--out <dir>] [--config <file>] [--link-prefix <prefix>]";

#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    link_prefix: Option<String>,
}

/// `snapshot.json` contents
#[derive(Serialize)]
struct Manifest<'a> {
    id: String,
    url: &'a str,
    title: &'a str,
    favicon: Option<&'a str>,
    text: &'a str,
    multimedia_count: usize,
    resources: &'a [SnapshotResource],
    batches: Vec<Vec<ResourceMeta>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SnapshotConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SnapshotConfig::default(),
    };
    if let Some(prefix) = args.link_prefix {
        config.resource_link_prefix = prefix;
    }
    let batch_limit = config.upload_batch_limit;

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let captured = CapturedPage::from_json(&raw).context("Invalid captured page")?;

    let progress = Arc::new(ProgressCounters::new());
    let snapshotter = Snapshotter::new(config)?.with_progress(progress.clone());

    println!("📸 Snapshotting {}", captured.page.url);
    let snapshot = snapshotter.snapshot_captured(&captured).await?;

    write_snapshot(&args.out_dir, &snapshot, batch_limit)?;

    let progress = progress.progress();
    println!("✅ Snapshot {} written to {}", snapshot.id, args.out_dir.display());
    println!("   Title:      {}", snapshot.title);
    println!("   Resources:  {} ({} bytes)", snapshot.resources.len(), snapshot.total_resource_size());
    println!(
        "   Downloads:  {} started, {} done, {} failed",
        progress.download_count, progress.downloaded_count, progress.failed_count
    );
    println!("   Multimedia: {}", snapshot.multimedia_count);
    Ok(())
}

fn write_snapshot(out_dir: &Path, snapshot: &Snapshot, batch_limit: usize) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    std::fs::write(out_dir.join("index.html"), &snapshot.dom)?;

    for resource in &snapshot.resources {
        let path = out_dir.join(&resource.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &resource.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let manifest = Manifest {
        id: snapshot.id.to_string(),
        url: &snapshot.url,
        title: &snapshot.title,
        favicon: snapshot.favicon.as_deref(),
        text: &snapshot.text,
        multimedia_count: snapshot.multimedia_count,
        resources: &snapshot.resources,
        batches: batch_resources(&snapshot.resources, batch_limit)
            .iter()
            .map(|batch| batch.meta())
            .collect(),
    };
    std::fs::write(out_dir.join("snapshot.json"), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(())
}

fn parse_args(args: &[OsString]) -> Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut link_prefix: Option<String> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(s) = arg.to_str() else {
            bail!("Argument is not valid UTF-8");
        };

        let mut value = |flag: &str| -> Result<String> {
            iter.next()
                .and_then(|v| v.to_str())
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("Missing value for {flag}"))
        };

        match s {
            "--out" => out_dir = Some(PathBuf::from(value(s)?)),
            "--config" => config = Some(PathBuf::from(value(s)?)),
            "--link-prefix" => link_prefix = Some(value(s)?),
            _ if s.starts_with("--") => bail!("Unknown flag {s}"),
            _ => {
                if input.is_some() {
                    bail!("Unexpected argument {s}");
                }
                input = Some(PathBuf::from(s));
            }
        }
    }

    Ok(Args {
        input: input.ok_or_else(|| anyhow!("Missing captured page path"))?,
        out_dir: out_dir.unwrap_or_else(|| PathBuf::from("snapshot")),
        config,
        link_prefix,
    })
}
