//! Photoflow - fetch and decode images from the command line
#![allow(clippy::uninlined_format_args)]

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use photoflow::{
    Config, ImageSource, Manager, PipelineError, PixelBuffer, RequestIdentity, Requester,
    ResourceManager, Status,
};

/// How long to wait for an event before re-checking for cancelled work
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match parse_args()? {
        Command::Fetch { sources, options } => fetch_cli(&sources, options).await,
        Command::Key { source } => {
            print_key(&source);
            Ok(())
        }
        Command::Config => show_config(),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Fetch {
        sources: Vec<String>,
        options: FetchOptions,
    },
    Key {
        source: String,
    },
    Config,
    Help,
    Version,
}

#[derive(Clone, Copy)]
struct FetchOptions {
    cache: bool,
    width: u32,
    height: u32,
    rotation: i32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache: true,
            width: 0,
            height: 0,
            rotation: 0,
        }
    }
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),
        "config" => Ok(Command::Config),

        "key" => {
            let source = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing image source"))?
                .clone();
            Ok(Command::Key { source })
        }

        "fetch" | "get" => {
            let mut sources = Vec::new();
            let mut options = FetchOptions::default();
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--no-cache" => {
                        options.cache = false;
                        i += 1;
                    }
                    "--size" | "-s" => {
                        let value = args
                            .get(i + 1)
                            .ok_or_else(|| anyhow::anyhow!("--size needs a value like 640x480"))?;
                        (options.width, options.height) = parse_size(value)?;
                        i += 2;
                    }
                    "--rotate" | "-r" => {
                        options.rotation = args
                            .get(i + 1)
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| anyhow::anyhow!("--rotate needs a number of degrees"))?;
                        i += 2;
                    }
                    other => {
                        sources.push(other.to_string());
                        i += 1;
                    }
                }
            }

            if sources.is_empty() {
                return Err(anyhow::anyhow!("Missing image source"));
            }
            Ok(Command::Fetch { sources, options })
        }

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'photoflow --help' for usage"
        )),
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Invalid size: {value} (expected WIDTHxHEIGHT)"))?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}

fn print_help() {
    let config_path = Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"
Photoflow - asynchronous image acquisition

USAGE:
    photoflow [COMMAND]

COMMANDS:
    fetch <source>... [OPTIONS]        Download and decode images
      Options:
        --no-cache                     Skip the memory and disk caches
        -s, --size <WxH>               Fit into this box
        -r, --rotate <degrees>         Rotate by quarter turns
      Sources:
        https://example.com/a.png      Network URL (cached on disk)
        ./photos/b.jpg                 Local file
        asset://icons/c.png            Bundled asset
      Examples:
        photoflow fetch https://example.com/a.png
        photoflow fetch a.png b.png --size 256x256 --rotate 90

    key <source>                       Print the cache key and disk path
    config                             Print the active configuration

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

CONFIG:
    {}
"#,
        config_path
    );
}

fn print_version() {
    println!("photoflow {}", photoflow::VERSION);
}

fn print_key(source: &str) {
    let source = ImageSource::parse(source);
    println!("origin:  {}", source.origin.name());
    println!("key:     {}", source.cache_key());

    let config = Config::load().unwrap_or_default();
    match config.resolved_disk_cache_dir() {
        Ok(dir) => println!("cache:   {}", photoflow::key::cache_path(&dir, &source.location).display()),
        Err(e) => println!("cache:   unavailable ({e})"),
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let path = Config::default_path()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn fetch_cli(sources: &[String], options: FetchOptions) -> Result<()> {
    let config = Config::load()?;
    let mut manager = Manager::new(&config)?;
    let mut store = TextureStore::default();

    let canceller = manager.canceller();
    ctrlc::set_handler(move || {
        let count = canceller.cancel_all();
        eprintln!("\nCancelled {count} request(s)");
    })?;

    let started = Instant::now();
    let views: Vec<_> = sources
        .iter()
        .map(|s| Rc::new(ConsoleView::new(ImageSource::parse(s.as_str()))))
        .collect();

    for view in &views {
        manager.request(
            &mut store,
            view,
            options.cache,
            options.width,
            options.height,
            options.rotation,
        );
    }

    while manager.pending_requests() > 0 {
        match tokio::time::timeout(POLL_INTERVAL, manager.dispatch_next(&mut store)).await {
            Ok(true) | Err(_) => {}
            Ok(false) => break,
        }
    }

    let failed = views.iter().filter(|v| v.failed.get()).count();
    let stats = manager.cache_stats();
    println!(
        "\n{} of {} image(s) ready in {:.2?} ({} cached, {} KiB in memory)",
        views.len() - failed,
        views.len(),
        started.elapsed(),
        stats.hits,
        stats.size_bytes / 1024
    );

    if failed > 0 {
        return Err(anyhow::anyhow!("{failed} image(s) failed"));
    }
    Ok(())
}

/// Decoded image kept by the CLI in place of a GPU texture
#[derive(Clone)]
struct Texture {
    width: u32,
    height: u32,
    bytes: usize,
}

#[derive(Default)]
struct TextureStore {
    textures: HashMap<(String, u32, u32, i32), Texture>,
}

impl TextureStore {
    fn key(identity: &RequestIdentity) -> (String, u32, u32, i32) {
        let target = identity.target;
        (
            identity.source.location.clone(),
            target.width,
            target.height,
            target.rotation,
        )
    }
}

impl ResourceManager for TextureStore {
    type Resource = Texture;

    fn lookup_existing(&self, identity: &RequestIdentity) -> Option<Texture> {
        self.textures.get(&Self::key(identity)).cloned()
    }

    fn create(&mut self, pixels: PixelBuffer, identity: &RequestIdentity) -> Result<Texture> {
        let texture = Texture {
            width: pixels.width,
            height: pixels.height,
            bytes: pixels.byte_len(),
        };
        self.textures.insert(Self::key(identity), texture.clone());
        Ok(texture)
    }
}

/// Prints every status change for one source
struct ConsoleView {
    source: ImageSource,
    failed: Cell<bool>,
}

impl ConsoleView {
    const fn new(source: ImageSource) -> Self {
        Self {
            source,
            failed: Cell::new(false),
        }
    }
}

impl Requester<Texture> for ConsoleView {
    fn desired(&self) -> Option<ImageSource> {
        Some(self.source.clone())
    }

    fn on_status(&self, status: Status) {
        if status == Status::DownloadFailed {
            self.failed.set(true);
        }
        println!("{:<18} {}", status.name(), self.source.location);
    }

    fn on_resource_ready(&self, texture: Texture) {
        println!(
            "{:<18} {} ({}x{}, {} bytes)",
            "READY",
            self.source.location,
            texture.width,
            texture.height,
            texture.bytes
        );
    }

    fn on_failure(&self, error: &PipelineError) {
        let stage = if error.is_decode() { "decode" } else { "load" };
        eprintln!("  {stage} error: {error}");
    }
}
