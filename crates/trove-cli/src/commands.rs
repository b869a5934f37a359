use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use trove_bundle::{BundleArchive, BundleSummary, BundleWriter};
use trove_crypto::ContentHasher;
use trove_sdk::{
    BundleUpload, CancellationToken, ContentGuid, EntryKind, Platform, ResolveReport, Trove,
    TroveConfig,
};
use trove_server::{ServerConfig, TroveServer};
use trove_verify::{HashVerifier, VerifyOutcome};
use walkdir::WalkDir;

use crate::cli::*;

const DEFAULT_CONFIG: &str = "trove.toml";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let json = matches!(cli.format, OutputFormat::Json);
    let remote = Remote {
        config: cli.config,
        base_url: cli.base_url,
        platform: cli.platform,
    };
    match cli.command {
        Command::Prepare(args) => {
            let (trove, cancel) = remote.connect()?;
            cmd_prepare(&trove, args, &cancel, json).await
        }
        Command::Fetch(args) => {
            let (trove, cancel) = remote.connect()?;
            cmd_fetch(&trove, args, &cancel).await
        }
        Command::List(args) => {
            let (trove, cancel) = remote.connect()?;
            cmd_list(&trove, args, &cancel, json).await
        }
        Command::Load(args) => {
            let (trove, cancel) = remote.connect()?;
            cmd_load(&trove, args, &cancel, json).await
        }
        Command::Publish(args) => {
            let (trove, cancel) = remote.connect()?;
            cmd_publish(&trove, args, &cancel, json).await
        }
        Command::Hash(args) => cmd_hash(args, json),
        Command::Verify(args) => cmd_verify(args, json).await,
        Command::Bundle(args) => cmd_bundle(args, json),
        Command::Serve(args) => cmd_serve(args).await,
    }
}

/// Global options that shape the client for commands talking to an origin.
struct Remote {
    config: Option<PathBuf>,
    base_url: Option<String>,
    platform: Option<String>,
}

impl Remote {
    fn connect(self) -> anyhow::Result<(Trove, CancellationToken)> {
        let config = load_config(self.config.as_deref(), self.base_url, self.platform)?;
        Ok((Trove::new(config)?, cancel_on_ctrl_c()))
    }
}

fn load_config(
    path: Option<&Path>,
    base_url: Option<String>,
    platform: Option<String>,
) -> anyhow::Result<TroveConfig> {
    let mut config = match path {
        Some(path) => TroveConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => TroveConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => TroveConfig::default(),
    };
    if let Some(url) = base_url {
        config.base_url = url;
    }
    if let Some(platform) = platform {
        config.platform = platform.parse()?;
    }
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn cmd_prepare(
    trove: &Trove,
    args: PrepareArgs,
    cancel: &CancellationToken,
    json: bool,
) -> anyhow::Result<()> {
    let report = trove
        .prepare(&ContentGuid::new(args.environment), cancel)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if !report.failed.is_empty() {
        bail!("{} bundle(s) failed to download", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &ResolveReport) {
    let mark = if report.is_complete() { "✓".green().bold() } else { "!".yellow().bold() };
    println!("{} Environment {}", mark, report.environment.to_string().bold());
    println!("  Dependencies: {}", report.dependencies.len());
    println!("  Verified:     {}", report.verified.len().to_string().green());
    println!("  Downloaded:   {}", report.downloaded.len().to_string().cyan());
    println!("  Streamed:     {}", report.streamed.len());
    for failed in &report.failed {
        println!("  {} {} ({})", "failed:".red(), failed.payload, failed.reason.dimmed());
    }
    for missing in &report.missing {
        println!("  {} {} ({})", "missing:".yellow(), missing.guid, missing.reason.dimmed());
    }
    for cycle in &report.cycles {
        println!("  {} {} → {}", "cycle:".yellow(), cycle.template, cycle.dependency);
    }
}

async fn cmd_fetch(trove: &Trove, args: FetchArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let entry = trove.fetch(&ContentGuid::new(args.guid), cancel).await?;
    println!("{}", serde_json::to_string_pretty(entry.as_ref())?);
    Ok(())
}

async fn cmd_list(
    trove: &Trove,
    args: ListArgs,
    cancel: &CancellationToken,
    json: bool,
) -> anyhow::Result<()> {
    let kinds = args
        .types
        .iter()
        .map(|t| t.parse::<EntryKind>())
        .collect::<Result<Vec<_>, _>>()?;
    let entries = trove.list(&kinds, cancel).await?;
    if json {
        let values: Vec<_> = entries.iter().map(|e| e.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{:<12} {}  {}",
            entry.kind().to_string().cyan(),
            entry.guid().to_string().yellow(),
            entry.meta().name
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

async fn cmd_load(
    trove: &Trove,
    args: LoadArgs,
    cancel: &CancellationToken,
    json: bool,
) -> anyhow::Result<()> {
    let asset = trove
        .load(&ContentGuid::new(args.guid), args.asset.as_deref(), cancel)
        .await?;
    if let Some(output) = &args.output {
        std::fs::write(output, &asset.data)
            .with_context(|| format!("writing {}", output.display()))?;
    }
    if json {
        println!(
            "{}",
            json!({"payload": asset.guid, "name": asset.name, "bytes": asset.data.len()})
        );
    } else {
        println!(
            "{} Loaded {} from {} ({} bytes)",
            "✓".green().bold(),
            asset.name.bold(),
            asset.guid.to_string().yellow(),
            asset.data.len()
        );
    }
    Ok(())
}

fn cmd_hash(args: HashArgs, json: bool) -> anyhow::Result<()> {
    let hash = ContentHasher::hash_file(&args.file)?;
    if json {
        println!("{}", json!({"file": args.file, "hash": hash}));
    } else {
        println!("{}  {}", hash, args.file.display());
    }
    Ok(())
}

async fn cmd_verify(args: VerifyArgs, json: bool) -> anyhow::Result<()> {
    let verifier = HashVerifier::new();
    let outcome = verifier
        .verify(&args.file, &args.hash, &CancellationToken::new())
        .await?;
    if json {
        println!("{}", json!({"file": args.file, "match": outcome.is_match()}));
    }
    match outcome {
        VerifyOutcome::Match => {
            if !json {
                println!("{} {}", "✓".green().bold(), args.file.display());
            }
            Ok(())
        }
        VerifyOutcome::Mismatch { actual } => bail!("hash mismatch: expected {}, got {actual}", args.hash),
        VerifyOutcome::Missing => bail!("{} does not exist", args.file.display()),
        VerifyOutcome::Unreadable(reason) => bail!("cannot read {}: {reason}", args.file.display()),
    }
}

fn cmd_bundle(args: BundleArgs, json: bool) -> anyhow::Result<()> {
    match args.action {
        BundleAction::Pack { dir, output, store } => {
            let summary = pack_dir(&dir, &output, !store)?;
            println!(
                "{} Packed {} entries into {} ({} bytes)",
                "✓".green().bold(),
                summary.entries,
                summary.path.display().to_string().bold(),
                summary.bytes
            );
            Ok(())
        }
        BundleAction::List { file } => {
            let archive = BundleArchive::open(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(archive.entries())?);
                return Ok(());
            }
            for entry in archive.entries() {
                let mode = if entry.compressed { "zstd" } else { "stored" };
                println!("{:>10} {:>10} {:<6} {}", entry.raw_len, entry.len, mode.dimmed(), entry.name);
            }
            Ok(())
        }
    }
}

/// Pack every regular file under `dir` into a bundle at `output`. Entry
/// names are `/`-separated paths relative to `dir`, in sorted order.
pub fn pack_dir(dir: &Path, output: &Path, compress: bool) -> anyhow::Result<BundleSummary> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((name, entry.path().to_path_buf()));
    }
    if files.is_empty() {
        bail!("no files under {}", dir.display());
    }

    let mut writer = BundleWriter::new();
    for (name, path) in files {
        let data = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        if compress {
            writer.add(name, data);
        } else {
            writer.add_stored(name, data);
        }
    }
    Ok(writer.write_to(output)?)
}

async fn cmd_publish(
    trove: &Trove,
    args: PublishArgs,
    cancel: &CancellationToken,
    json: bool,
) -> anyhow::Result<()> {
    let platform: Platform = args.platform.parse()?;
    BundleArchive::open(&args.file)
        .with_context(|| format!("{} is not a valid bundle", args.file.display()))?;
    let published = trove
        .publish_bundle(BundleUpload::new(ContentGuid::new(args.guid), platform, &args.file), cancel)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&published)?);
    } else {
        println!(
            "{} Published {} for {} ({} bytes)",
            "✓".green().bold(),
            published.guid.to_string().yellow(),
            published.platform.to_string().cyan(),
            published.bytes
        );
        println!("  Hash: {}", published.hash.dimmed());
        if !published.missing_platforms.is_empty() {
            let missing: Vec<&str> = published.missing_platforms.iter().map(|p| p.as_str()).collect();
            println!("  {} no bundle yet for {}", "!".yellow().bold(), missing.join(", "));
        }
    }
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.server_config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.parse().with_context(|| format!("invalid bind address {bind}"))?;
    }
    if let Some(root) = args.root {
        config.data_root = root;
    }
    config.auth_tokens.extend(args.tokens);

    println!(
        "Trove server on {} (root: {})",
        config.bind_addr.to_string().bold(),
        config.data_root.display()
    );
    TroveServer::new(config)?.serve().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_dir_uses_relative_sorted_names() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("textures")).unwrap();
        std::fs::write(src.path().join("mesh.bin"), b"mesh").unwrap();
        std::fs::write(src.path().join("textures/wood.png"), b"wood").unwrap();
        let out = tempfile::tempdir().unwrap();
        let bundle = out.path().join("chair.bundle");

        let summary = pack_dir(src.path(), &bundle, true).unwrap();
        assert_eq!(summary.entries, 2);

        let archive = BundleArchive::open(&bundle).unwrap();
        assert_eq!(archive.names(), vec!["mesh.bin", "textures/wood.png"]);
        let (name, data) = archive.extract(Some("textures/wood.png")).unwrap();
        assert_eq!(name, "textures/wood.png");
        assert_eq!(data, b"wood");
    }

    #[test]
    fn pack_empty_dir_fails() {
        let src = tempfile::tempdir().unwrap();
        let out = src.path().join("x.bundle");
        assert!(pack_dir(src.path(), &out, false).is_err());
    }

    #[test]
    fn config_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trove.toml");
        std::fs::write(&path, "base_url = \"http://a\"\nplatform = \"ios\"\n").unwrap();

        let config = load_config(Some(&path), Some("http://b".into()), Some("android".into())).unwrap();
        assert_eq!(config.base_url, "http://b");
        assert_eq!(config.platform, Platform::Android);

        assert!(load_config(Some(&path), None, Some("amiga".into())).is_err());
    }

    #[tokio::test]
    async fn verify_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"bytes").unwrap();
        let good = ContentHasher::hash_bytes(b"bytes");

        cmd_verify(VerifyArgs { file: file.clone(), hash: good }, false).await.unwrap();
        let err = cmd_verify(VerifyArgs { file, hash: "00".into() }, false).await.unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }
}
