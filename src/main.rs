//! Perch TV - continuous short-video feed player for Bluesky
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, bail};
use tokio::runtime::Runtime;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use perch_tv::api::ContentSource;
use perch_tv::api::bluesky::BlueskyClient;
use perch_tv::app;
use perch_tv::demo::DemoSource;
use perch_tv::seen::{SeenConfig, SeenStore};
use perch_tv::storage::MemoryStore;
use perch_tv::tv::aggregator::fetch_more;
use perch_tv::tv::queue::Queue;
use perch_tv::tv::slots::{Playability, classify};
use perch_tv::{Config, Database};

/// Environment variable holding the app password
const PASSWORD_ENV: &str = "PERCH_TV_APP_PASSWORD";

fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = parse_args()?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match command {
        Command::Watch { topic } => watch(&rt, topic),
        Command::Demo { topic } => demo(&rt, topic),
        Command::Queue { topic, limit } => rt.block_on(queue_cli(topic.as_deref(), limit)),
        Command::Timeline { limit } => rt.block_on(timeline_cli(limit)),
        Command::SeenStats => seen_stats(),
        Command::SeenClear { feed } => seen_clear(feed),
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
    Watch { topic: Option<String> },
    Demo { topic: Option<String> },
    Queue { topic: Option<String>, limit: usize },
    Timeline { limit: usize },
    SeenStats,
    SeenClear { feed: bool },
    Help,
    Version,
}

/// Positional words after the command, joined; flags and their values are
/// skipped
fn topic_arg(args: &[String]) -> Option<String> {
    let mut words = Vec::new();
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--limit" || args[i] == "-l" {
            i += 2;
            continue;
        }
        if !args[i].starts_with('-') {
            words.push(args[i].as_str());
        }
        i += 1;
    }
    let topic = words.join(" ");
    if topic.trim().is_empty() {
        None
    } else {
        Some(topic)
    }
}

fn limit_arg(args: &[String]) -> usize {
    args.iter()
        .position(|a| a == "--limit" || a == "-l")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(20)
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Watch { topic: None });
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),
        "watch" | "tv" => Ok(Command::Watch {
            topic: topic_arg(&args),
        }),
        "--demo" | "demo" => Ok(Command::Demo {
            topic: topic_arg(&args),
        }),
        "queue" => Ok(Command::Queue {
            topic: topic_arg(&args),
            limit: limit_arg(&args),
        }),
        "timeline" | "tl" => Ok(Command::Timeline {
            limit: limit_arg(&args),
        }),
        "seen" => match args.get(2).map(String::as_str) {
            None | Some("stats") => Ok(Command::SeenStats),
            Some("clear") => Ok(Command::SeenClear {
                feed: args.iter().any(|a| a == "--feed"),
            }),
            Some(other) => bail!("Unknown seen command: {other}\nUse 'stats' or 'clear'"),
        },
        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'perch-tv --help' for usage"
        )),
    }
}

fn print_help() {
    let config_path = perch_tv::Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r##"{}
📺 Perch TV - Bluesky videos, one after another

USAGE:
    perch-tv                           Watch your video feed
    perch-tv [COMMAND]

COMMANDS:
    watch [topic]                      Watch videos (about a topic, if given)
      Examples:
        perch-tv watch
        perch-tv watch cats
        perch-tv watch "#rustlang"

    demo [topic]                       Watch synthetic videos offline

    queue [topic] [OPTIONS]            Show what would be queued (dry run)
      Options:
        -l, --limit <n>                Number of items (default: 20)

    timeline [OPTIONS]                 List new posts from your timeline
      Options:
        -l, --limit <n>                Number of posts (default: 20)

    seen stats                         Show seen-set sizes
    seen clear [--feed]                Forget watched videos (or feed posts)

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

KEYBINDINGS (TV):
    j/↓           Next video
    k/↑           Previous video
    space         Pause / resume
    f             Fast-forward (hold, or toggle)
    l             Like / unlike
    b             Repost / undo repost
    p             Open author profile
    t             Open thread
    q             Quit

AUTHENTICATION:
    Set `handle` in the config file and your app password in
    {}, or enter them when asked.

CONFIG:
    {}

HOMEPAGE:
    {}
"##,
        perch_tv::LOGO,
        PASSWORD_ENV,
        config_path,
        perch_tv::REPO_URL
    );
}

fn print_version() {
    println!("perch-tv {}", perch_tv::VERSION);
}

fn prompt(message: &str) -> Result<String> {
    println!("{message}");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}

/// Log in with the configured handle, asking for anything missing
async fn login(config: &mut Config) -> Result<BlueskyClient> {
    if config.handle.is_empty() {
        config.handle = prompt("Enter your handle (e.g., you.bsky.social):")?;
        config.save()?;
    }

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.trim().is_empty() => password.trim().to_string(),
        _ => prompt(
            "Enter your app password:\n(Create one at https://bsky.app/settings/app-passwords)",
        )?,
    };

    println!("🦋 Logging in as @{}...", config.handle);
    let client = BlueskyClient::login_with_pds(&config.handle, &password, &config.pds_url).await?;
    tracing::info!("Logged in as {} ({})", client.handle(), client.did());
    Ok(client)
}

fn watch(rt: &Runtime, topic: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    let client = rt.block_on(login(&mut config))?;
    let db = Database::open()?;
    let seen = SeenStore::open(db, SeenConfig::tv(config.seen_capacity));
    app::run_tv(rt, client, seen, config.tv_settings(), topic)
}

fn demo(rt: &Runtime, topic: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let seen = SeenStore::open(MemoryStore::new(), SeenConfig::tv(config.seen_capacity));
    app::run_tv(rt, DemoSource::new(), seen, config.tv_settings(), topic)
}

async fn queue_cli(topic: Option<&str>, limit: usize) -> Result<()> {
    let mut config = Config::load()?;
    let client = login(&mut config).await?;
    let db = Database::open()?;
    let seen = SeenStore::open(db, SeenConfig::tv(config.seen_capacity));
    let settings = config.tv_settings();

    let mut queue = Queue::new();
    for _ in 0..5 {
        let report = fetch_more(&client, &mut queue, &seen, topic, &settings).await;
        if report.all_failed() && queue.is_empty() {
            bail!(
                "All sources failed: {}",
                report.first_error.unwrap_or_default()
            );
        }
        if queue.len() >= limit || report.appended == 0 {
            break;
        }
    }

    println!(
        "\n📺 Queue for {} ({} items)",
        topic.map_or_else(|| "your feed".to_string(), |t| format!("#{}", t.trim_start_matches('#'))),
        queue.len()
    );
    println!("{}", "─".repeat(60));

    for (i, item) in queue.iter().take(limit).enumerate() {
        let duration = item
            .media
            .duration_hint
            .map_or_else(|| "?".to_string(), |d| format!("{d:.0}s"));
        let note = match classify(&item.media, settings.min_duration_secs) {
            Playability::Playable => String::new(),
            other => format!("  (skipped: {other:?})"),
        };
        println!(
            "\n{:>3}. @{} · {} · {}{}",
            i + 1,
            item.author_handle,
            item.relative_time(),
            duration,
            note
        );
        if let Some(line) = item.text.lines().next().filter(|l| !l.is_empty()) {
            println!("     {}", app::fit(line, 70));
        }
    }

    Ok(())
}

async fn timeline_cli(limit: usize) -> Result<()> {
    let mut config = Config::load()?;
    let client = login(&mut config).await?;
    let db = Database::open()?;
    let mut seen = SeenStore::open(db, SeenConfig::feed(config.feed_seen_capacity));

    let page = client.timeline(limit, None).await?;

    println!("\n🦋 Timeline (@{})", client.handle());
    println!("{}", "─".repeat(60));

    let mut skipped = 0;
    for item in page.items {
        let engagement = item.engagement();
        let resurfaced = seen.has(&item.id);
        if seen.is_seen(&item.id, engagement) {
            skipped += 1;
            continue;
        }

        let marker = if resurfaced { "  🔥 trending since you saw it" } else { "" };
        println!("\n@{} · {}{}", item.author_handle, item.relative_time(), marker);
        println!("{}", item.text);
        println!("♥ {}  🔁 {}", item.like_count, item.repost_count);

        seen.mark_seen(&item.id, Some(engagement));
    }

    if skipped > 0 {
        println!("\n({} already seen)", skipped);
    }
    Ok(())
}

fn seen_stats() -> Result<()> {
    let config = Config::load()?;
    let db = Database::open()?;

    for seen_config in [
        SeenConfig::tv(config.seen_capacity),
        SeenConfig::feed(config.feed_seen_capacity),
    ] {
        let capacity = seen_config.capacity;
        let key = seen_config.key.clone();
        let seen = SeenStore::open(&db, seen_config);
        let oldest = seen
            .oldest()
            .map_or_else(|| "-".to_string(), |e| e.seen_at.format("%Y-%m-%d %H:%M").to_string());
        println!("{key:<10} {:>5} / {capacity:<5} oldest: {oldest}", seen.len());
    }

    Ok(())
}

fn seen_clear(feed: bool) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open()?;
    let seen_config = if feed {
        SeenConfig::feed(config.feed_seen_capacity)
    } else {
        SeenConfig::tv(config.seen_capacity)
    };
    let key = seen_config.key.clone();

    let mut seen = SeenStore::open(&db, seen_config);
    if seen.is_empty() {
        println!("{key} is already empty");
        return Ok(());
    }
    let count = seen.len();
    seen.clear();
    seen.persist()?;
    println!("✓ Cleared {count} entries from {key}");
    Ok(())
}
