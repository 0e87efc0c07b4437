use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use readshelf_core::config::{config_path, load_config, AppConfig};
use readshelf_core::document::{ChapterList, MetadataSummary};
use readshelf_core::error::EpubError;
use readshelf_core::fetch::Fetcher;
use readshelf_core::janitor;
use readshelf_core::validate::validate_url;
use readshelf_core::EpubService;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "readshelf")]
#[command(about = "Inspect EPUBs by URL or local path: metadata, chapters, images, files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata and table of contents
    Metadata {
        /// EPUB URL or local path
        source: String,
    },

    /// List chapters in reading order
    Chapters {
        /// EPUB URL or local path
        source: String,
    },

    /// Print a chapter as sanitized HTML
    Chapter {
        /// EPUB URL or local path
        source: String,
        /// Chapter id (manifest id, ToC id, or archive path)
        id: String,
    },

    /// Print a chapter's original XHTML
    Raw {
        /// EPUB URL or local path
        source: String,
        /// Chapter id (manifest id, ToC id, or archive path)
        id: String,
    },

    /// Extract an image
    Image {
        /// EPUB URL or local path
        source: String,
        /// Image manifest id or archive path
        id: String,
        /// Write the image bytes here
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Extract any manifest entry
    File {
        /// EPUB URL or local path
        source: String,
        /// Manifest id or archive path
        id: String,
        /// Write the file bytes here
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List images in the manifest
    Images {
        /// EPUB URL or local path
        source: String,
    },

    /// Check whether a URL looks like a downloadable EPUB
    Validate {
        url: String,

        /// Skip the HEAD request
        #[arg(long)]
        offline: bool,
    },

    /// Remove stale downloads from the scratch directory
    Sweep {
        /// Directory to sweep (default: configured scratch directory)
        #[arg(long)]
        dir: Option<String>,

        /// Age in seconds after which a file is stale
        #[arg(long)]
        max_age_secs: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

/// Where a book comes from. URLs go through the download path; anything
/// else is opened in place.
enum Source<'a> {
    Remote(&'a str),
    Local(&'a Path),
}

impl<'a> Source<'a> {
    fn parse(source: &'a str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(Source::Remote(source));
        }
        let path = Path::new(source);
        if !path.is_file() {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
        Ok(Source::Local(path))
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result: CliResult = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt.block_on(run(&cli)),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> CliResult {
    let json = cli.json;
    match &cli.command {
        Commands::Config { action } => run_config(action, json),
        Commands::Validate { url, offline } => run_validate(url, *offline, json).await,
        Commands::Sweep { dir, max_age_secs } => {
            run_sweep(dir.as_deref(), *max_age_secs, json).await
        }
        command => {
            let service = EpubService::new(load_config())?;
            run_book(&service, command, json).await
        }
    }
}

async fn run_book(service: &EpubService, command: &Commands, json: bool) -> CliResult {
    match command {
        Commands::Metadata { source } => {
            let summary: MetadataSummary = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.metadata(url)).await?,
                Source::Local(path) => {
                    let doc = service.parse_local(path).await?;
                    MetadataSummary {
                        metadata: doc.metadata,
                        total_chapters: doc.total_chapters,
                        toc: doc.toc,
                    }
                }
            };
            if json {
                return print_json(&summary);
            }
            let m = &summary.metadata;
            println!("Title: {}", m.title);
            if !m.creator.is_empty() {
                println!("Author: {}", m.creator);
            }
            if !m.publisher.is_empty() {
                println!("Publisher: {}", m.publisher);
            }
            println!("Language: {}", m.language);
            println!("Chapters: {}", summary.total_chapters);
            for entry in &summary.toc {
                let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
                println!("{}- {}", indent, entry.title().unwrap_or(&entry.id));
            }
        }
        Commands::Chapters { source } => {
            let list: ChapterList = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.chapters(url)).await?,
                Source::Local(path) => {
                    let doc = service.parse_local(path).await?;
                    ChapterList {
                        chapters: doc.chapters,
                        total_chapters: doc.total_chapters,
                    }
                }
            };
            if json {
                return print_json(&list);
            }
            for (i, ch) in list.chapters.iter().enumerate() {
                println!("{:>3}. {} ({})", i + 1, ch.title().unwrap_or("-"), ch.id);
            }
        }
        Commands::Chapter { source, id } => {
            let chapter = match Source::parse(source)? {
                Source::Remote(url) => {
                    fetching(url, json, service.chapter_content(url, id)).await?
                }
                Source::Local(path) => {
                    let (id, opts) = (id.clone(), service.render_options().clone());
                    service
                        .query_local(path, move |epub| epub.chapter_content(&id, &opts))
                        .await?
                }
            };
            if json {
                return print_json(&chapter);
            }
            println!("# {}\n", chapter.title);
            println!("{}", chapter.content);
        }
        Commands::Raw { source, id } => {
            let raw = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.chapter_raw(url, id)).await?,
                Source::Local(path) => {
                    let id = id.clone();
                    service.query_local(path, move |epub| epub.chapter_raw(&id)).await?
                }
            };
            if json {
                return print_json(&raw);
            }
            println!("{}", raw.raw_content);
        }
        Commands::Image { source, id, output } => {
            let image = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.image(url, id)).await?,
                Source::Local(path) => {
                    let id = id.clone();
                    service.query_local(path, move |epub| epub.image(&id)).await?
                }
            };
            if let Some(out) = output {
                std::fs::write(out, &image.data)?;
                if !json {
                    println!("Wrote {} ({} bytes, {})", out, image.size, image.mime_type);
                    return Ok(());
                }
            }
            if json {
                return print_json(&image);
            }
            println!("{} {} bytes", image.mime_type, image.size);
        }
        Commands::File { source, id, output } => {
            let file = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.file(url, id)).await?,
                Source::Local(path) => {
                    let id = id.clone();
                    service.query_local(path, move |epub| epub.file(&id)).await?
                }
            };
            if let Some(out) = output {
                std::fs::write(out, &file.content)?;
                if !json {
                    println!("Wrote {} ({} bytes, {})", out, file.size, file.mime_type);
                    return Ok(());
                }
            }
            if json {
                return print_json(&file);
            }
            println!("{} {} bytes", file.mime_type, file.size);
        }
        Commands::Images { source } => {
            let list = match Source::parse(source)? {
                Source::Remote(url) => fetching(url, json, service.images(url)).await?,
                Source::Local(path) => {
                    service
                        .query_local(path, |epub| Ok(epub.image_list()))
                        .await?
                }
            };
            if json {
                return print_json(&list);
            }
            for img in &list.images {
                println!("{}\t{}\t{}", img.id, img.media_type, img.href);
            }
            println!("{} image(s)", list.total_images);
        }
        Commands::Validate { .. } | Commands::Sweep { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

/// Await a remote operation behind a spinner (hidden with `--json`).
async fn fetching<T>(
    url: &str,
    json: bool,
    op: impl Future<Output = Result<T, EpubError>>,
) -> Result<T, EpubError> {
    let pb = spinner(url, json);
    let result = op.await;
    pb.finish_and_clear();
    result
}

fn spinner(url: &str, json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Fetching {}", url));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_validate(url: &str, offline: bool, json: bool) -> CliResult {
    let cfg = load_config();
    let fetcher = Fetcher::new(&cfg.fetch)?;
    let verdict = validate_url(&fetcher, url, !offline).await;
    if json {
        print_json(&verdict)?;
    } else if verdict.valid {
        println!("{}", verdict.reason);
    }
    if !verdict.valid {
        return Err(verdict.reason.into());
    }
    Ok(())
}

async fn run_sweep(dir: Option<&str>, max_age_secs: Option<u64>, json: bool) -> CliResult {
    let cfg = load_config();
    let dir = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.scratch.dir());
    let max_age = max_age_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| cfg.scratch.max_age());

    let report = tokio::task::spawn_blocking({
        let dir = dir.clone();
        move || janitor::sweep(&dir, max_age)
    })
    .await?;

    if json {
        return print_json(&report);
    }
    println!(
        "Swept {}: {} scanned, {} removed, {} failed",
        dir.display(),
        report.scanned,
        report.removed,
        report.failed
    );
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                print_json(&cfg)?;
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg = load_config();
            set_config_key(&mut cfg, key, value)?;

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, toml::to_string_pretty(&cfg)?)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    fn num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
        value
            .parse()
            .map_err(|_| format!("Invalid number for {}: {}", key, value))
    }

    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["scratch", "dir"] => cfg.scratch.dir = Some(value.to_string()),
        ["scratch", "max_age_secs"] => cfg.scratch.max_age_secs = num(key, value)?,
        ["fetch", "timeout_secs"] => cfg.fetch.timeout_secs = num(key, value)?,
        ["fetch", "head_timeout_secs"] => cfg.fetch.head_timeout_secs = num(key, value)?,
        ["fetch", "max_redirects"] => cfg.fetch.max_redirects = num(key, value)?,
        ["fetch", "user_agent"] => cfg.fetch.user_agent = value.to_string(),
        ["render", "image_root"] => cfg.render.image_root = value.to_string(),
        ["render", "link_root"] => cfg.render.link_root = value.to_string(),
        ["security", "max_file_count"] => cfg.security.max_file_count = Some(num(key, value)?),
        ["security", "max_resource_size_mb"] => {
            cfg.security.max_resource_size_mb = Some(num(key, value)?)
        }
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}
