use anyhow::Result;
use callscreen::call::{CallEvent, Direction};
use callscreen::call_log_sink::CallLogSink;
use callscreen::config::{self, Config, ContactsConfig};
use callscreen::contacts::{ContactDirectory, NoContacts, StaticContactDirectory};
use callscreen::screening::{ScreeningAdapter, ScreeningOutcome};
use callscreen::storage::{CallLogStore, RuleStore, SqliteRuleStore};
use chrono::{Local, TimeZone, Utc};
use clap::{Arg, ArgMatches, Command};
use log::LevelFilter;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG_PATH: &str = "/etc/callscreen.toml";

/// How long exit waits for collaborator lookups abandoned at their deadline.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type ToggleSetter = fn(&SqliteRuleStore, bool) -> Result<()>;

fn build_cli() -> Command {
    Command::new("callscreen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Incoming call screening with prefix, unknown-caller and international blocking")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("screen")
                .long("screen")
                .value_name("NUMBER")
                .help("Screen a single call from NUMBER (plain or tel: URI)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("outgoing")
                .long("outgoing")
                .help("Treat the --screen call as outgoing")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("serve")
                .long("serve")
                .help("Screen calls read from stdin, one per line: [in|out] NUMBER, or 'withheld'")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print screening results and log entries as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("add-prefix")
                .long("add-prefix")
                .value_name("PREFIX")
                .help("Block numbers starting with PREFIX")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .value_name("TEXT")
                .help("Description for --add-prefix")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("remove-prefix")
                .long("remove-prefix")
                .value_name("PREFIX")
                .help("Remove PREFIX from the blocklist")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("remove-prefix-id")
                .long("remove-prefix-id")
                .value_name("ID")
                .help("Remove the blocked prefix with ID, as shown by --list-prefixes")
                .value_parser(clap::value_parser!(i64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("list-prefixes")
                .long("list-prefixes")
                .help("List blocked prefixes in evaluation order")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(toggle_arg("block-all", "Block every incoming call"))
        .arg(toggle_arg("block-unknown", "Block callers that are not contacts"))
        .arg(toggle_arg(
            "block-international",
            "Block + numbers outside the home country code",
        ))
        .arg(
            Arg::new("country-code")
                .long("country-code")
                .value_name("CODE")
                .help("Set the home country code, e.g. +1")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("show-rules")
                .long("show-rules")
                .help("Show the current blocking rules")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .help("Show recently blocked calls")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-delete")
                .long("log-delete")
                .value_name("ID")
                .help("Delete one blocked call record")
                .value_parser(clap::value_parser!(i64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("log-clear")
                .long("log-clear")
                .help("Delete all blocked call records")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-prune-days")
                .long("log-prune-days")
                .value_name("DAYS")
                .help("Delete blocked call records older than DAYS days")
                .value_parser(clap::value_parser!(u32))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Show blocked call counts")
                .action(clap::ArgAction::SetTrue),
        )
}

fn toggle_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("on|off")
        .help(help)
        .value_parser(["on", "off"])
        .action(clap::ArgAction::Set)
}

fn main() {
    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Failed to start async runtime: {e}");
            process::exit(1);
        }
    };

    let code = runtime.block_on(cli_main());
    // A hung contact or rule lookup keeps its blocking thread; don't wait on it
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    process::exit(code);
}

fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

async fn cli_main() -> i32 {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let configured_level = config::load_config(config_path)
        .ok()
        .and_then(|c| c.logging)
        .map(|l| l.level);
    init_logging(matches.get_flag("verbose"), configured_level.as_deref());

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match config::save_config(&Config::default(), generate_path) {
            Ok(()) => {
                println!("✅ Default configuration written to {generate_path}");
                return 0;
            }
            Err(e) => {
                eprintln!("❌ {e:#}");
                return 1;
            }
        }
    }

    if matches.get_flag("test-config") {
        test_config(config_path);
        return 0;
    }

    let config = config::load_config_or_default(config_path);

    match run(&config, &matches).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("❌ {e:#}");
            1
        }
    }
}

fn init_logging(verbose: bool, configured: Option<&str>) {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        configured
            .and_then(|level| level.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
}

fn test_config(config_path: &str) {
    println!("🔍 Testing configuration...");
    println!();

    let config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    };

    println!("Database: {}", config.storage.database_path);
    println!(
        "Screening budget: {}ms (platform ceiling {}ms, contact lookup {}ms)",
        config.screening.budget().as_millis(),
        config.screening.platform_ceiling_ms,
        config.screening.contact_lookup_timeout().as_millis()
    );
    for problem in config.validate() {
        println!("⚠️  {problem}");
    }

    if let Some(path) = &config.contacts.directory_path {
        match StaticContactDirectory::from_file(path, config.contacts.permission_granted) {
            Ok(directory) => println!("Contacts: {} entries from {path}", directory.len()),
            Err(e) => {
                println!("❌ Contacts file invalid: {e:#}");
                process::exit(1);
            }
        }
    } else {
        println!("Contacts: none configured, every caller is unknown");
    }

    match SqliteRuleStore::open(&config.storage.database_path).and_then(|s| s.snapshot()) {
        Ok(rules) => println!("Rules: {} blocked prefixes", rules.blocked_prefixes.len()),
        Err(e) => {
            println!("❌ Rule store unavailable: {e:#}");
            process::exit(1);
        }
    }

    println!("✅ Configuration validated");
}

async fn run(config: &Config, matches: &ArgMatches) -> Result<()> {
    let db_path = &config.storage.database_path;
    let rules = Arc::new(SqliteRuleStore::open(db_path)?);
    let call_log = CallLogStore::open(db_path)?;

    if edit_rules(&rules, matches)? {
        return Ok(());
    }
    if browse_log(&call_log, config, matches)? {
        return Ok(());
    }

    let screen_number = matches.get_one::<String>("screen");
    let serving = matches.get_flag("serve");
    if screen_number.is_none() && !serving {
        println!("Nothing to do. Try --screen NUMBER, --serve or --help.");
        return Ok(());
    }

    if serving {
        if let Some(days) = config.call_log.retention_days {
            let pruned = call_log.prune_older_than_days(days)?;
            log::info!("Pruned {pruned} blocked call records older than {days} days");
        }
    }

    let contacts = load_contacts(&config.contacts);
    let sink = Arc::new(CallLogSink::spawn(call_log));
    let adapter = ScreeningAdapter::new(rules, contacts, sink.clone(), &config.screening);
    let json = matches.get_flag("json");

    let result = match screen_number {
        Some(number) => {
            let event = if matches.get_flag("outgoing") {
                CallEvent::outgoing(number.as_str())
            } else {
                CallEvent::incoming(number.as_str())
            };
            let outcome = adapter.screen(&event).await;
            print_outcome(&outcome, json)
        }
        None => serve(&adapter, json).await,
    };

    sink.shutdown().await;
    result
}

fn load_contacts(contacts: &ContactsConfig) -> Arc<dyn ContactDirectory> {
    let loaded = match &contacts.directory_path {
        Some(path) => StaticContactDirectory::from_file(path, contacts.permission_granted),
        None => StaticContactDirectory::empty(contacts.permission_granted),
    };

    match loaded {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            log::warn!("Contacts unavailable ({e:#}), every caller is unknown");
            Arc::new(NoContacts)
        }
    }
}

async fn serve(adapter: &ScreeningAdapter, json: bool) -> Result<()> {
    log::info!("Reading calls from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(event) = parse_event_line(&line) {
                    let outcome = adapter.screen(&event).await;
                    print_outcome(&outcome, json)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// `[in|out] NUMBER`, or `withheld` / `-` for a caller without a number.
fn parse_event_line(line: &str) -> Option<CallEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let (direction, number) = match first.to_ascii_lowercase().as_str() {
        "in" => (Direction::Incoming, parts.next()),
        "out" => (Direction::Outgoing, parts.next()),
        _ => (Direction::Incoming, Some(first)),
    };

    match number {
        None | Some("withheld") | Some("-") => Some(CallEvent {
            handle: None,
            direction,
        }),
        Some(number) => Some(CallEvent {
            handle: Some(number.to_string()),
            direction,
        }),
    }
}

fn print_outcome(outcome: &ScreeningOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }

    let icon = if outcome.decision.is_blocked() { "🚫" } else { "✅" };
    let number = if outcome.caller_number.is_empty() {
        "(withheld)"
    } else {
        outcome.caller_number.as_str()
    };
    println!(
        "{icon} {:?} {number}: {} [{}ms]",
        outcome.direction, outcome.decision, outcome.elapsed_ms
    );
    Ok(())
}

fn edit_rules(store: &SqliteRuleStore, matches: &ArgMatches) -> Result<bool> {
    let mut handled = false;

    if let Some(prefix) = matches.get_one::<String>("add-prefix") {
        let description = matches.get_one::<String>("description").map(String::as_str);
        let added = store.add_prefix(prefix, description)?;
        println!("✅ Blocking numbers starting with {}", added.prefix);
        handled = true;
    }

    if let Some(prefix) = matches.get_one::<String>("remove-prefix") {
        if store.remove_prefix(prefix)? {
            println!("✅ Removed prefix {}", prefix.trim());
        } else {
            println!("⚠️  Prefix {} is not in the blocklist", prefix.trim());
        }
        handled = true;
    }

    if let Some(id) = matches.get_one::<i64>("remove-prefix-id") {
        if store.delete_prefix(*id)? {
            println!("✅ Removed prefix #{id}");
        } else {
            println!("⚠️  No blocked prefix #{id}");
        }
        handled = true;
    }

    let toggles: [(&str, ToggleSetter); 3] = [
        ("block-all", SqliteRuleStore::set_block_all),
        ("block-unknown", SqliteRuleStore::set_block_unknown),
        ("block-international", SqliteRuleStore::set_block_international),
    ];
    for (id, set) in toggles {
        if let Some(value) = matches.get_one::<String>(id) {
            let enabled = value == "on";
            set(store, enabled)?;
            println!("✅ {id}: {}", if enabled { "enabled" } else { "disabled" });
            handled = true;
        }
    }

    if let Some(code) = matches.get_one::<String>("country-code") {
        let code = store.set_home_country_code(code)?;
        println!("✅ Home country code: {code}");
        handled = true;
    }

    if matches.get_flag("list-prefixes") {
        let prefixes = store.prefixes()?;
        if prefixes.is_empty() {
            println!("📭 No blocked prefixes");
        } else {
            println!("📋 Blocked prefixes (evaluation order):");
            for prefix in prefixes {
                let description = prefix.description.as_deref().unwrap_or("");
                println!("  #{:<5} {:<12} {description}", prefix.id, prefix.prefix);
            }
        }
        handled = true;
    }

    if matches.get_flag("show-rules") {
        let rules = store.snapshot()?;
        println!("📋 Blocking rules");
        println!("═══════════════════════════════════════");
        println!("  Block all calls:      {}", on_off(rules.block_all));
        println!("  Block unknown:        {}", on_off(rules.block_unknown));
        println!("  Block international:  {}", on_off(rules.block_international));
        println!("  Home country code:    {}", rules.home_country_code());
        println!("  Blocked prefixes:     {}", rules.blocked_prefixes.join(", "));
        handled = true;
    }

    Ok(handled)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn browse_log(store: &CallLogStore, config: &Config, matches: &ArgMatches) -> Result<bool> {
    let mut handled = false;

    if let Some(id) = matches.get_one::<i64>("log-delete") {
        if store.delete(*id)? {
            println!("✅ Deleted blocked call #{id}");
        } else {
            println!("⚠️  No blocked call #{id}");
        }
        handled = true;
    }

    if matches.get_flag("log-clear") {
        let removed = store.clear_all()?;
        println!("✅ Cleared {removed} blocked call records");
        handled = true;
    }

    if let Some(days) = matches.get_one::<u32>("log-prune-days") {
        let removed = store.prune_older_than_days(*days)?;
        println!("✅ Removed {removed} records older than {days} days");
        handled = true;
    }

    if matches.get_flag("log") {
        let records = store.recent(config.call_log.recent_limit)?;
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else if records.is_empty() {
            println!("📭 No blocked calls recorded yet");
        } else {
            println!("🚫 Recently blocked calls:");
            for record in records {
                let when = Utc
                    .timestamp_millis_opt(record.timestamp_millis)
                    .single()
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| record.timestamp_millis.to_string());
                let who = record.contact_name.as_deref().unwrap_or("");
                println!(
                    "  #{:<5} {when}  {:<16} {:<20} {who}",
                    record.id, record.phone_number, record.matched_reason
                );
            }
        }
        handled = true;
    }

    if matches.get_flag("stats") {
        println!("📊 Blocked calls");
        println!("  Total: {}", store.count()?);
        println!("  Today: {}", store.count_today()?);
        handled = true;
    }

    Ok(handled)
}
