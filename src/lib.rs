pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod models;
pub mod pager;
pub mod runner;
pub mod services;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;

use clients::discord::DiscordWebhookClient;
use clients::nyaa::{NyaaCategory, NyaaClient, NyaaFilter, SearchRequest};
pub use config::Config;
use db::Store;
use domain::events::WatchEvent;
use domain::{OwnerId, WatchId};
use models::watch::{Watch, WatchParams};
use runner::Runner;
use services::{
    DiscordNotifier, EventBusNotifier, FanoutNotifier, OwnerDirectory, SweepConfig, WatchNotifier,
    WatchStore, WatchSweeper,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config);

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "daemon" | "-d" | "--daemon" => run_daemon(config).await,

        "check" | "-c" | "--check" => run_single_sweep(config).await,

        "watch" | "w" => {
            if args.len() < 3 {
                println!("Usage: miharr watch <subcommand>");
                println!("Subcommands: add, list, remove");
                return Ok(());
            }
            match args[2].as_str() {
                "add" | "a" => cmd_watch_add(&config, &args).await,
                "list" | "ls" | "l" => {
                    cmd_watch_list(&config, args.get(3).map(String::as_str)).await
                }
                "remove" | "rm" | "r" => {
                    if args.len() < 5 {
                        println!("Usage: miharr watch remove <owner> <watch_id>");
                        println!("Use 'miharr watch list' to see watch IDs");
                        return Ok(());
                    }
                    cmd_watch_remove(&config, &args[3], &args[4]).await
                }
                _ => {
                    println!("Unknown watch subcommand: {}", args[2]);
                    println!("Use: add, list, remove");
                    Ok(())
                }
            }
        }

        "search" | "s" => {
            if args.len() < 3 {
                println!("Usage: miharr search <query> [--page N]");
                return Ok(());
            }
            cmd_search(&config, &args).await
        }

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let mut log_level = config.general.log_level.clone();
    if config.general.suppress_connection_errors {
        log_level.push_str(",hyper_util=off,reqwest=warn");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_help() {
    println!("Miharr - Saved-search watcher for Nyaa");
    println!("Re-checks saved searches and reports newly appeared torrents");
    println!();
    println!("USAGE:");
    println!("  miharr <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  watch add <owner> <query> [--filter F] [--category C] [--uploader U]");
    println!("                    Save an ongoing search for an owner");
    println!("  watch list [owner]");
    println!("                    List saved watches, optionally for one owner");
    println!("  watch remove <owner> <watch_id>");
    println!("                    Delete a saved watch");
    println!("  search <query> [--page N]");
    println!("                    Browse one page of feed results");
    println!("  check             Run a single sweep over all watches");
    println!("  daemon            Run the recurring sweep in the foreground");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("FILTERS:   no-filter (0), no-remakes (1), trusted-only (2)");
    println!("CATEGORY:  Nyaa category code, e.g. 1_2 for Anime - English Translated");
    println!();
    println!("EXAMPLES:");
    println!("  miharr watch add alice \"one punch man 1080p\" --filter no-remakes");
    println!("  miharr watch add alice \"frieren\" --category 1_2 --uploader subsplease");
    println!("  miharr watch list alice           # Alice's watches");
    println!("  miharr search \"frieren\" --page 1  # Second page of results");
    println!("  miharr check                      # Sweep once and exit");
    println!("  miharr daemon                     # Keep sweeping on the configured interval");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the feed, interval, and notifications.");
}

/// Builds the store, feed client, and sweep engine shared by `daemon` and
/// `check`.
async fn build_sweeper(
    config: &Config,
    event_bus: broadcast::Sender<WatchEvent>,
) -> anyhow::Result<(Store, Arc<WatchSweeper>)> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let nyaa = Arc::new(NyaaClient::from_config(&config.nyaa)?);

    let mut notifiers: Vec<Arc<dyn WatchNotifier>> =
        vec![Arc::new(EventBusNotifier::new(event_bus))];
    if let Some(url) = &config.notifications.discord_webhook_url {
        notifiers.push(Arc::new(DiscordNotifier::new(DiscordWebhookClient::new(
            url,
        )?)));
        info!("Discord webhook notifications enabled");
    }

    let shared = Arc::new(store.clone());
    let sweeper = WatchSweeper::new(
        nyaa,
        Arc::clone(&shared) as Arc<dyn WatchStore>,
        shared as Arc<dyn OwnerDirectory>,
        Arc::new(FanoutNotifier::new(notifiers)),
        SweepConfig {
            watch_page_size: config.watcher.watch_page_size,
            feed_page_size: config.watcher.feed_page_size,
        },
    );

    Ok((store, Arc::new(sweeper)))
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "Miharr v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size);
    let (store, sweeper) = build_sweeper(&config, event_bus.clone()).await?;
    store.ping().await?;

    let mut events = event_bus.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        debug!(event = %json, "Watch event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let interval = Duration::from_secs(u64::from(config.watcher.check_interval_minutes) * 60);
    let sweep_target = Arc::clone(&sweeper);
    let sweep_bus = event_bus.clone();
    let mut runner = Runner::new(
        move || {
            let sweeper = Arc::clone(&sweep_target);
            let bus = sweep_bus.clone();
            async move {
                let _ = bus.send(WatchEvent::SweepStarted);
                match sweeper.sweep().await {
                    Ok(stats) => {
                        let _ = bus.send(WatchEvent::SweepFinished {
                            owners: stats.owners,
                            watches_checked: stats.watches_checked,
                            new_items: stats.new_items,
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Sweep failed");
                        let _ = bus.send(WatchEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
        },
        interval,
    );

    if config.watcher.enabled {
        info!(
            "Sweeping every {} minutes",
            config.watcher.check_interval_minutes
        );
        runner.start();
    } else {
        info!("Watcher is disabled in config");
    }

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    runner.stop().await;
    events_handle.abort();
    info!("Daemon stopped");

    Ok(())
}

async fn run_single_sweep(config: Config) -> anyhow::Result<()> {
    info!("Running single sweep...");

    let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size);
    let (_store, sweeper) = build_sweeper(&config, event_bus).await?;

    let stats = sweeper.sweep().await?;

    println!(
        "Sweep complete. {} owners, {} watches checked, {} new items across {} watches.",
        stats.owners, stats.watches_checked, stats.new_items, stats.watches_changed
    );
    if stats.failed_watches > 0 {
        println!(
            "{} watches failed to fetch and will be retried next sweep.",
            stats.failed_watches
        );
    }

    Ok(())
}

fn parse_flag<'a>(args: &'a [String], name: &str) -> Option<&'a String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
}

async fn cmd_watch_add(config: &Config, args: &[String]) -> anyhow::Result<()> {
    // args: miharr watch add <owner> <query words...> [--flags]
    if args.len() < 5 {
        println!("Usage: miharr watch add <owner> <query> [--filter F] [--category C] [--uploader U]");
        println!("Example: miharr watch add alice \"one punch man 1080p\" --filter no-remakes");
        return Ok(());
    }

    let owner = OwnerId::new(args[3].clone());
    let query = args[4..]
        .iter()
        .take_while(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    if query.is_empty() {
        println!("A search query is required.");
        return Ok(());
    }

    let filter = match parse_flag(args, "--filter") {
        Some(raw) => match raw.parse::<NyaaFilter>() {
            Ok(filter) => Some(filter),
            Err(e) => {
                println!("{e}");
                println!("Valid filters: no-filter, no-remakes, trusted-only");
                return Ok(());
            }
        },
        None => None,
    };

    let category = match parse_flag(args, "--category") {
        Some(raw) => match raw.parse::<NyaaCategory>() {
            Ok(category) => Some(category),
            Err(e) => {
                println!("{e}");
                println!("Categories are Nyaa codes like 1_2 (Anime - English Translated)");
                return Ok(());
            }
        },
        None => None,
    };

    let uploader = parse_flag(args, "--uploader").cloned();

    let store = Store::new(&config.general.database_path).await?;
    store.add_or_update_user(&owner, None).await?;

    let watch = Watch::new(
        owner,
        WatchParams {
            query,
            filter,
            category,
            uploader,
        },
    );
    let saved = store.add_or_update_watch(&watch).await?;

    println!("✓ Watching \"{}\" for {}", saved.query, saved.owner_id);
    println!("  ID: {}", saved.id);
    if let Some(filter) = saved.filter {
        println!("  Filter: {filter}");
    }
    if let Some(category) = saved.category {
        println!("  Category: {category}");
    }
    if let Some(uploader) = &saved.uploader {
        println!("  Uploader: {uploader}");
    }
    println!();
    println!("The daemon will report new results; run 'miharr check' to sweep now.");

    Ok(())
}

async fn cmd_watch_list(config: &Config, owner: Option<&str>) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let owner = owner.map(OwnerId::new);

    let mut page_number = 0;
    loop {
        let page = store.list_watches(owner.as_ref(), page_number, 20).await?;

        if page_number == 0 {
            if page.total == 0 {
                println!("No watches saved.");
                println!();
                println!("Add one with: miharr watch add <owner> \"<query>\"");
                return Ok(());
            }
            println!("Watches ({} total)", page.total);
            println!("{:-<70}", "");
        }

        for watch in &page.items {
            println!("• {} [{}]", watch.query, watch.owner_id);
            println!(
                "  ID: {} | Seen: {} | Updated: {}",
                watch.id,
                watch.seen_hashes.len(),
                watch.updated_at
            );

            let mut details = Vec::new();
            if let Some(filter) = watch.filter {
                details.push(format!("Filter: {filter}"));
            }
            if let Some(category) = watch.category {
                details.push(format!("Category: {category}"));
            }
            if let Some(uploader) = &watch.uploader {
                details.push(format!("Uploader: {uploader}"));
            }
            if !details.is_empty() {
                println!("  {}", details.join(" | "));
            }
        }

        if !page.has_next {
            break;
        }
        page_number += 1;
    }

    Ok(())
}

async fn cmd_watch_remove(config: &Config, owner: &str, id: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let owner = OwnerId::new(owner);
    let id = WatchId::new(id);

    match store.remove_watch(&owner, &id).await? {
        Some(watch) => println!("✓ Removed watch \"{}\" ({})", watch.query, watch.id),
        None => {
            println!("Watch {id} not found for {owner}.");
            println!("Use 'miharr watch list {owner}' to see watch IDs.");
        }
    }

    Ok(())
}

async fn cmd_search(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let query = args[2..]
        .iter()
        .take_while(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    if query.is_empty() {
        println!("Usage: miharr search <query> [--page N]");
        return Ok(());
    }

    let page_number = parse_flag(args, "--page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    let nyaa = NyaaClient::from_config(&config.nyaa)?;
    let request = SearchRequest::new(query.clone(), page_number, 10);
    let page = nyaa.search(&request).await?;

    if page.items.is_empty() {
        if page.total == 0 {
            println!("No results for \"{query}\".");
        } else {
            println!(
                "Page {} is past the end ({} results, {} pages).",
                page_number, page.total, page.page_count
            );
        }
        return Ok(());
    }

    println!(
        "Results for \"{}\" (page {}/{}, {} total)",
        query,
        page.page_number + 1,
        page.page_count,
        page.total
    );
    println!("{:-<70}", "");

    for torrent in &page.items {
        let trusted = if torrent.trusted { "[T] " } else { "" };
        println!("• {}{}", trusted, torrent.title);
        println!(
            "  {} | {} seeds | {}",
            torrent.size, torrent.seeders, torrent.pub_date
        );
    }

    if page.has_next {
        println!();
        println!(
            "More: miharr search \"{}\" --page {}",
            query,
            page.page_number + 1
        );
    }

    Ok(())
}
