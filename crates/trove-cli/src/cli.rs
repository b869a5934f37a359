use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "trove",
    about = "Trove: content dependency resolution and asset streaming",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Client configuration file (defaults to ./trove.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the origin base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Override the target platform
    #[arg(long, global = true)]
    pub platform: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve an environment and download its bundles
    Prepare(PrepareArgs),
    /// Fetch and print a content entry
    Fetch(FetchArgs),
    /// List content entries, optionally filtered by kind
    List(ListArgs),
    /// Load an asset from a cached bundle
    Load(LoadArgs),
    /// Print the content hash of a file
    Hash(HashArgs),
    /// Check a file against an expected hash
    Verify(VerifyArgs),
    /// Build or inspect bundle files
    Bundle(BundleArgs),
    /// Upload a platform bundle for a media entry
    Publish(PublishArgs),
    /// Start the development origin server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct PrepareArgs {
    pub environment: String,
}

#[derive(Args)]
pub struct FetchArgs {
    pub guid: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Comma-separated kinds: media, template, sceneGraph, location, environment
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,
}

#[derive(Args)]
pub struct LoadArgs {
    pub guid: String,
    /// Asset name inside the bundle (first entry when omitted)
    #[arg(long)]
    pub asset: Option<String>,
    /// Write the asset bytes to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct HashArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub file: PathBuf,
    pub hash: String,
}

#[derive(Args)]
pub struct BundleArgs {
    #[command(subcommand)]
    pub action: BundleAction,
}

#[derive(Subcommand)]
pub enum BundleAction {
    /// Pack every file under a directory into a bundle
    Pack {
        dir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Store entries without compression
        #[arg(long)]
        store: bool,
    },
    /// List the entries of a bundle
    List { file: PathBuf },
}

#[derive(Args)]
pub struct PublishArgs {
    pub guid: String,
    pub platform: String,
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server configuration file
    #[arg(long)]
    pub server_config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Bearer token accepted for writes (repeatable)
    #[arg(long = "token")]
    pub tokens: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prepare() {
        let cli = Cli::try_parse_from(["trove", "prepare", "env-1"]).unwrap();
        if let Command::Prepare(args) = cli.command {
            assert_eq!(args.environment, "env-1");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_load_with_asset() {
        let cli = Cli::try_parse_from(["trove", "load", "chair", "--asset", "mesh", "-o", "out.bin"]).unwrap();
        if let Command::Load(args) = cli.command {
            assert_eq!(args.asset.as_deref(), Some("mesh"));
            assert_eq!(args.output, Some(PathBuf::from("out.bin")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_list_types() {
        let cli = Cli::try_parse_from(["trove", "list", "--types", "media,template"]).unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.types, vec!["media", "template"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_bundle_pack() {
        let cli = Cli::try_parse_from(["trove", "bundle", "pack", "assets", "-o", "a.bundle", "--store"]).unwrap();
        if let Command::Bundle(BundleArgs { action: BundleAction::Pack { dir, output, store } }) = cli.command {
            assert_eq!(dir, PathBuf::from("assets"));
            assert_eq!(output, PathBuf::from("a.bundle"));
            assert!(store);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_publish() {
        let cli = Cli::try_parse_from(["trove", "publish", "chair", "ios", "chair.bundle"]).unwrap();
        if let Command::Publish(args) = cli.command {
            assert_eq!(args.platform, "ios");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["trove", "serve", "--bind", "0.0.0.0:8080", "--token", "a", "--token", "b"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
            assert_eq!(args.tokens, vec!["a", "b"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from(["trove", "--verbose", "--config", "c.toml", "--format", "json", "hash", "f"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
