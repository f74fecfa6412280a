use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use rimorder_core::{
    check_order, resolve_load_order, Issue, ModSet, RuleStore, Severity, DEFAULT_RULES_URL,
};
use rimorder_preset::Preset;

#[derive(Debug, Parser)]
#[command(name = "rimorder", version, about = "Deterministic load-order tooling for mod sets")]
struct Cli {
    /// Data root (default: $RIMORDER_ROOT or ~/.rimorder).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Community rules database source.
    #[arg(long, global = true, default_value = DEFAULT_RULES_URL)]
    rules_url: String,

    /// Machine-readable output on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress messages.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a deterministic load order for a mod set.
    Sort(SortArgs),
    /// Audit a mod set's listed order against the community rules.
    Check(CheckArgs),
    /// Manage the community rules database.
    Rules(RulesArgs),
    /// Encode and decode shareable mod-list codes.
    Preset(PresetArgs),
}

#[derive(Debug, Args)]
struct SortArgs {
    /// Mod-set document (rimorder.modset@0.1.0).
    #[arg(long)]
    mods: PathBuf,

    /// Use only the cached rules database, never the network.
    #[arg(long)]
    offline: bool,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long)]
    mods: PathBuf,

    #[arg(long)]
    offline: bool,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct RulesArgs {
    #[command(subcommand)]
    cmd: RulesCmd,
}

#[derive(Debug, Subcommand)]
enum RulesCmd {
    /// Force a fresh download of the rules database.
    Update {
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Show cached database statistics.
    Show,
}

#[derive(Debug, Args)]
struct PresetArgs {
    #[command(subcommand)]
    cmd: PresetCmd,
}

#[derive(Debug, Subcommand)]
enum PresetCmd {
    /// Build a shareable code from a mod-set document.
    Encode {
        #[arg(long)]
        mods: PathBuf,

        #[arg(long, default_value = "My Modlist")]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        author: String,

        #[arg(long, default_value = "")]
        game_version: String,
    },
    /// Decode a shareable code back into a mod list.
    Decode { code: String },
    /// Summarize a shareable code without printing the mod list.
    Show { code: String },
}

#[derive(Debug)]
struct Reporter {
    json: bool,
    quiet: bool,
}

impl Reporter {
    fn progress(&self, msg: &str) {
        if self.json || self.quiet {
            return;
        }
        eprintln!("{msg}");
    }
}

#[derive(Debug, Serialize)]
struct SortReport {
    schema_version: &'static str,
    ok: bool,
    mod_count: usize,
    order: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<Issue>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    schema_version: &'static str,
    ok: bool,
    mod_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<Issue>,
}

#[derive(Debug, Serialize)]
struct RulesUpdateReport {
    schema_version: &'static str,
    ok: bool,
    rule_count: usize,
    source_url: String,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let root = effective_root(cli.root.clone())?;
    let reporter = Reporter {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.cmd {
        Command::Sort(args) => cmd_sort(&root, &cli.rules_url, args, &reporter),
        Command::Check(args) => cmd_check(&root, &cli.rules_url, args, &reporter),
        Command::Rules(args) => match args.cmd {
            RulesCmd::Update { timeout_secs } => {
                cmd_rules_update(&root, &cli.rules_url, timeout_secs, &reporter)
            }
            RulesCmd::Show => cmd_rules_show(&root, &cli.rules_url, &reporter),
        },
        Command::Preset(args) => cmd_preset(args.cmd, &reporter),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("RIMORDER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn effective_root(root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root);
    }
    if let Some(v) = std::env::var_os("RIMORDER_ROOT") {
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    Ok(home_dir()?.join(".rimorder"))
}

fn home_dir() -> Result<PathBuf> {
    if let Some(v) = std::env::var_os("HOME") {
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    if let Some(v) = std::env::var_os("USERPROFILE") {
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    if let (Some(drive), Some(path)) = (std::env::var_os("HOMEDRIVE"), std::env::var_os("HOMEPATH"))
    {
        let mut s = OsString::new();
        s.push(drive);
        s.push(path);
        return Ok(PathBuf::from(s));
    }
    bail!("cannot determine home directory; pass --root or set RIMORDER_ROOT")
}

fn cache_dir(root: &Path) -> PathBuf {
    root.join("cache")
}

fn open_store(
    root: &Path,
    rules_url: &str,
    offline: bool,
    timeout_secs: u64,
    reporter: &Reporter,
) -> RuleStore {
    let mut store = RuleStore::with_source(cache_dir(root), rules_url);
    if offline {
        match store.load_from_cache() {
            Ok(true) => {}
            Ok(false) => reporter.progress("no cached rules database; sorting without rules"),
            Err(err) => reporter.progress(&format!("ignoring unreadable rules cache: {err:#}")),
        }
    } else {
        store.ensure_loaded(Duration::from_secs(timeout_secs));
    }
    store
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn print_issues(issues: &[Issue]) {
    for issue in issues {
        eprintln!("{}: {}", severity_label(issue.severity), issue.message);
    }
}

fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

fn cmd_sort(
    root: &Path,
    rules_url: &str,
    args: SortArgs,
    reporter: &Reporter,
) -> Result<std::process::ExitCode> {
    let modset = ModSet::load(&args.mods)?;
    let store = open_store(root, rules_url, args.offline, args.timeout_secs, reporter);
    let db = store.snapshot();

    let order = resolve_load_order(&modset.mods, db.as_deref());
    let issues = check_order(&order, db.as_deref());

    if reporter.json {
        let report = SortReport {
            schema_version: "rimorder.sort-report@0.1.0",
            ok: true,
            mod_count: order.len(),
            order,
            issues,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for id in &order {
            println!("{id}");
        }
        print_issues(&issues);
    }
    Ok(std::process::ExitCode::SUCCESS)
}

fn cmd_check(
    root: &Path,
    rules_url: &str,
    args: CheckArgs,
    reporter: &Reporter,
) -> Result<std::process::ExitCode> {
    let modset = ModSet::load(&args.mods)?;
    let store = open_store(root, rules_url, args.offline, args.timeout_secs, reporter);
    let db = store.snapshot();

    let order = modset.package_ids();
    let issues = check_order(&order, db.as_deref());
    let failed = has_errors(&issues);

    if reporter.json {
        let report = CheckReport {
            schema_version: "rimorder.check-report@0.1.0",
            ok: issues.is_empty(),
            mod_count: order.len(),
            issues,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if issues.is_empty() {
        reporter.progress(&format!("no issues across {} mods", order.len()));
    } else {
        print_issues(&issues);
    }

    if failed {
        return Ok(std::process::ExitCode::from(1));
    }
    Ok(std::process::ExitCode::SUCCESS)
}

fn cmd_rules_update(
    root: &Path,
    rules_url: &str,
    timeout_secs: u64,
    reporter: &Reporter,
) -> Result<std::process::ExitCode> {
    let mut store = RuleStore::with_source(cache_dir(root), rules_url);
    // The user asked for a refresh; unlike resolution, failure is an error.
    let rule_count = store.download(Duration::from_secs(timeout_secs))?;

    if reporter.json {
        let report = RulesUpdateReport {
            schema_version: "rimorder.rules-update@0.1.0",
            ok: true,
            rule_count,
            source_url: rules_url.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        reporter.progress(&format!("downloaded {rule_count} rules from {rules_url}"));
    }
    Ok(std::process::ExitCode::SUCCESS)
}

fn cmd_rules_show(
    root: &Path,
    rules_url: &str,
    reporter: &Reporter,
) -> Result<std::process::ExitCode> {
    let mut store = RuleStore::with_source(cache_dir(root), rules_url);
    if let Err(err) = store.load_from_cache() {
        reporter.progress(&format!("ignoring unreadable rules cache: {err:#}"));
    }
    let stats = store.stats();

    if reporter.json {
        #[derive(Debug, Serialize)]
        struct StatsReport {
            schema_version: &'static str,
            loaded: bool,
            rule_count: usize,
            timestamp: u64,
            last_updated: u64,
            source_url: String,
        }
        let report = StatsReport {
            schema_version: "rimorder.rules-stats@0.1.0",
            loaded: stats.loaded,
            rule_count: stats.rule_count,
            timestamp: stats.timestamp,
            last_updated: stats.last_updated,
            source_url: stats.source_url.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("loaded: {}", stats.loaded);
        println!("rules: {}", stats.rule_count);
        println!("document timestamp: {}", stats.timestamp);
        println!("last refreshed: {}", stats.last_updated);
        println!("source: {}", stats.source_url);
    }
    Ok(std::process::ExitCode::SUCCESS)
}

fn cmd_preset(cmd: PresetCmd, reporter: &Reporter) -> Result<std::process::ExitCode> {
    match cmd {
        PresetCmd::Encode {
            mods,
            name,
            description,
            author,
            game_version,
        } => {
            let modset = ModSet::load(&mods)?;
            let preset = Preset {
                name,
                package_ids: modset.package_ids(),
                workshop_ids: Vec::new(),
                created_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
                description,
                author,
                game_version,
            };
            let code = rimorder_preset::encode(&preset)?;
            reporter.progress(&format!(
                "encoded {} mods ({} chars)",
                preset.package_ids.len(),
                code.len()
            ));
            println!("{code}");
            Ok(std::process::ExitCode::SUCCESS)
        }
        PresetCmd::Decode { code } => {
            let preset = rimorder_preset::decode(&code)?;
            if reporter.json {
                #[derive(Debug, Serialize)]
                struct DecodeReport {
                    schema_version: &'static str,
                    name: String,
                    package_ids: Vec<String>,
                    #[serde(skip_serializing_if = "Vec::is_empty")]
                    workshop_ids: Vec<String>,
                    #[serde(skip_serializing_if = "String::is_empty")]
                    created_at: String,
                    #[serde(skip_serializing_if = "String::is_empty")]
                    description: String,
                    #[serde(skip_serializing_if = "String::is_empty")]
                    author: String,
                    #[serde(skip_serializing_if = "String::is_empty")]
                    game_version: String,
                }
                let report = DecodeReport {
                    schema_version: "rimorder.preset-decode@0.1.0",
                    name: preset.name,
                    package_ids: preset.package_ids,
                    workshop_ids: preset.workshop_ids,
                    created_at: preset.created_at,
                    description: preset.description,
                    author: preset.author,
                    game_version: preset.game_version,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                reporter.progress(&format!(
                    "preset '{}' with {} mods",
                    preset.name,
                    preset.package_ids.len()
                ));
                for id in &preset.package_ids {
                    println!("{id}");
                }
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
        PresetCmd::Show { code } => {
            let (valid, message) = rimorder_preset::validate(&code);
            if !valid {
                bail!("invalid preset code: {message}");
            }
            let stats = rimorder_preset::stats(&code)?;
            if reporter.json {
                #[derive(Debug, Serialize)]
                struct PresetInfoReport {
                    schema_version: &'static str,
                    name: String,
                    mod_count: usize,
                    workshop_count: usize,
                    created_at: String,
                    author: String,
                    code_length: usize,
                }
                let report = PresetInfoReport {
                    schema_version: "rimorder.preset-info@0.1.0",
                    name: stats.name,
                    mod_count: stats.mod_count,
                    workshop_count: stats.workshop_count,
                    created_at: stats.created_at,
                    author: stats.author,
                    code_length: stats.code_length,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("name: {}", stats.name);
                println!("mods: {}", stats.mod_count);
                println!("workshop items: {}", stats.workshop_count);
                println!("created: {}", stats.created_at);
                println!("author: {}", stats.author);
                println!("code length: {}", stats.code_length);
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
    }
}
