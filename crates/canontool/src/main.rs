use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use canontool_core::config::{
    DOMAIN_ENV_VAR, Policy, RunConfig, SiteConfig, SiteSection, load_config, normalize_domain,
    store_config,
};
use canontool_core::filesystem::scan_stats;
use canontool_core::rewrite::{FileAction, RewriteOptions, RewriteReport, rewrite_tree};
use canontool_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, inspect_runtime, normalize_path,
    resolve_paths,
};
use canontool_core::undo::{UndoOptions, UndoReport, undo_inserted_tags};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "canontool",
    version,
    about = "Insert, replace, or remove canonical link tags across an HTML tree"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Site root to scan")]
    root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            root: cli.root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Apply the configured policy to every HTML file")]
    Apply(ApplyArgs),
    #[command(about = "Strip the tags a run with these settings inserted")]
    Undo(UndoArgs),
    #[command(about = "Scan statistics for the site root")]
    Status(StatusArgs),
    #[command(about = "Write .canontool/config.toml for this site")]
    Init(InitArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Skip,
    Replace,
    Remove,
}

impl From<PolicyArg> for Policy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Skip => Policy::SkipExisting,
            PolicyArg::Replace => Policy::ReplaceExisting,
            PolicyArg::Remove => Policy::RemoveOnly,
        }
    }
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[arg(long, value_name = "DOMAIN", help = "Target domain, e.g. example.com")]
    domain: Option<String>,
    #[arg(long, value_enum, help = "Treatment of pre-existing canonical tags")]
    policy: Option<PolicyArg>,
    #[arg(
        long,
        help = "Prefix generated URLs with the site root folder name",
        conflicts_with = "no_base_path"
    )]
    base_path: bool,
    #[arg(long, help = "Never prefix the site root folder name")]
    no_base_path: bool,
    #[arg(long, help = "Report changes without writing files")]
    dry_run: bool,
    #[arg(long, help = "Emit the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct UndoArgs {
    #[arg(long, value_name = "DOMAIN")]
    domain: Option<String>,
    #[arg(long, conflicts_with = "no_base_path")]
    base_path: bool,
    #[arg(long)]
    no_base_path: bool,
    #[arg(long, help = "Report without writing files")]
    dry_run: bool,
    #[arg(long, help = "Emit the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[arg(long, help = "Emit the statistics as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, value_name = "DOMAIN")]
    domain: String,
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    #[arg(long, help = "Prefix generated URLs with the site root folder name")]
    base_path: bool,
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Apply(args)) => run_apply(&runtime, args),
        Some(Commands::Undo(args)) => run_undo(&runtime, args),
        Some(Commands::Status(args)) => run_status(&runtime, args),
        Some(Commands::Init(args)) => run_init(&runtime, args),
        None => run_interactive(&runtime),
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        site_root: runtime.root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let site_env = initial.site_root.join(".env");
    if site_env.exists() {
        let _ = dotenvy::from_path_override(&site_env);
    }

    let paths = resolve_paths(&context, &overrides)?;
    if !paths.site_root.is_dir() {
        bail!("site root is not a directory: {}", normalize_path(&paths.site_root));
    }
    if runtime.diagnostics {
        println!("[diagnostics]\n{}\n", paths.diagnostics());
    }
    Ok(paths)
}

fn run_apply(runtime: &RuntimeOptions, args: ApplyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let file_config = load_config(&paths.config_path)?;

    let Some(domain_input) = args
        .domain
        .clone()
        .or_else(|| file_config.domain_owned())
    else {
        bail!(
            "no domain provided (use --domain, {DOMAIN_ENV_VAR}, or {})",
            normalize_path(&paths.config_path)
        );
    };
    let Some(policy) = args.policy.map(Policy::from).or(file_config.site.policy) else {
        bail!(
            "no policy provided (use --policy skip|replace|remove or set site.policy in {})",
            normalize_path(&paths.config_path)
        );
    };
    let include_base_path = resolve_base_flag(
        args.base_path,
        args.no_base_path,
        file_config.site.include_base_path,
    );
    let config = RunConfig::new(&domain_input, policy, include_base_path)?;

    let report = rewrite_tree(&paths, &config, &RewriteOptions { dry_run: args.dry_run })?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_rewrite_report(&report);
    }
    Ok(())
}

fn run_undo(runtime: &RuntimeOptions, args: UndoArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let file_config = load_config(&paths.config_path)?;

    let Some(domain_input) = args
        .domain
        .clone()
        .or_else(|| file_config.domain_owned())
    else {
        bail!(
            "no domain provided (use --domain, {DOMAIN_ENV_VAR}, or {})",
            normalize_path(&paths.config_path)
        );
    };
    let include_base_path = resolve_base_flag(
        args.base_path,
        args.no_base_path,
        file_config.site.include_base_path,
    );
    // Undo never inserts, so the policy is irrelevant to it.
    let policy = file_config.site.policy.unwrap_or(Policy::SkipExisting);
    let config = RunConfig::new(&domain_input, policy, include_base_path)?;

    let report = undo_inserted_tags(&paths, &config, &UndoOptions { dry_run: args.dry_run })?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_undo_report(&report);
    }
    Ok(())
}

fn run_status(runtime: &RuntimeOptions, args: StatusArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let stats = scan_stats(&paths)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    let status = inspect_runtime(&paths);
    println!("site root: {}", normalize_path(&paths.site_root));
    println!(
        "config: {}",
        if status.config_exists { "present" } else { "absent" }
    );
    println!("html files: {}", stats.total_files);
    println!("with canonical: {}", stats.with_canonical);
    println!("without canonical: {}", stats.without_canonical);
    if !stats.by_directory.is_empty() {
        println!("by directory:");
        for (directory, count) in &stats.by_directory {
            println!("  {directory}: {count}");
        }
    }
    Ok(())
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let domain = normalize_domain(&args.domain)?;
    if paths.config_path.exists() && !args.force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            normalize_path(&paths.config_path)
        );
    }
    let config = SiteConfig {
        site: SiteSection {
            domain: Some(domain),
            include_base_path: Some(args.base_path),
            policy: args.policy.map(Policy::from),
        },
    };
    store_config(&paths.config_path, &config)?;
    println!("wrote {}", normalize_path(&paths.config_path));
    Ok(())
}

fn run_interactive(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("site root: {}", normalize_path(&paths.site_root));

    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        let file_config = load_config(&paths.config_path)?;
        let domain = prompt_domain(&mut input, file_config.domain_owned().as_deref())?;
        let include_base_path = prompt_yes_no(
            &mut input,
            &base_path_question(&paths),
            file_config.site.include_base_path.unwrap_or(false),
        )?;
        let policy = prompt_policy(&mut input, file_config.site.policy)?;
        let config = RunConfig {
            domain,
            policy,
            include_base_path,
        };

        let report = rewrite_tree(&paths, &config, &RewriteOptions::default())?;
        print_rewrite_report(&report);

        if !prompt_yes_no(
            &mut input,
            "Undo this run and start over with fresh settings?",
            false,
        )? {
            return Ok(());
        }
        let undo_report = undo_inserted_tags(&paths, &config, &UndoOptions::default())?;
        print_undo_report(&undo_report);
        println!();
    }
}

fn base_path_question(paths: &ResolvedPaths) -> String {
    match paths.site_root_name() {
        Some(name) => format!("Prefix URLs with the root folder name ({name})?"),
        None => "Prefix URLs with the root folder name?".to_string(),
    }
}

fn resolve_base_flag(base_path: bool, no_base_path: bool, configured: Option<bool>) -> bool {
    if base_path {
        true
    } else if no_base_path {
        false
    } else {
        configured.unwrap_or(false)
    }
}

fn prompt_line(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    if input
        .read_line(&mut line)
        .context("failed to read from stdin")?
        == 0
    {
        bail!("standard input closed");
    }
    Ok(line.trim().to_string())
}

fn prompt_domain(input: &mut impl BufRead, default: Option<&str>) -> Result<String> {
    let label = match default {
        Some(default) => format!("Domain [{default}]"),
        None => "Domain (e.g. example.com)".to_string(),
    };
    loop {
        let line = prompt_line(input, &label)?;
        let candidate = if line.is_empty() {
            default.unwrap_or("")
        } else {
            line.as_str()
        };
        match normalize_domain(candidate) {
            Ok(domain) => return Ok(domain),
            Err(error) => println!("  {error:#}"),
        }
    }
}

fn prompt_policy(input: &mut impl BufRead, default: Option<Policy>) -> Result<Policy> {
    let label = match default {
        Some(default) => format!("Existing tags: skip, replace, or remove [{}]", default.as_str()),
        None => "Existing tags: skip, replace, or remove".to_string(),
    };
    loop {
        let line = prompt_line(input, &label)?;
        if line.is_empty()
            && let Some(default) = default
        {
            return Ok(default);
        }
        match Policy::parse(&line) {
            Ok(policy) => return Ok(policy),
            Err(error) => println!("  {error:#}"),
        }
    }
}

fn prompt_yes_no(input: &mut impl BufRead, question: &str, default: bool) -> Result<bool> {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let line = prompt_line(input, &format!("{question} {suffix}"))?;
        match line.to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            other => println!("  expected y or n, got {other}"),
        }
    }
}

fn print_rewrite_report(report: &RewriteReport) {
    if report.files_found == 0 {
        println!("no HTML files found");
    }
    for result in &report.results {
        match result.action {
            FileAction::Inserted | FileAction::Replaced => println!(
                "{:<9} {} -> {}",
                result.action.as_str(),
                result.relative_path,
                result.canonical_url.as_deref().unwrap_or("")
            ),
            FileAction::Error => println!(
                "{:<9} {} ({})",
                result.action.as_str(),
                result.relative_path,
                result.detail.as_deref().unwrap_or("unknown failure")
            ),
            _ => println!("{:<9} {}", result.action.as_str(), result.relative_path),
        }
        if let Some(diff) = &result.diff {
            println!("{diff}");
        }
    }
    println!();
    if report.dry_run {
        println!("dry run: no files were written");
    }
    println!("files found: {}", report.files_found);
    println!("processed: {}", report.processed);
    println!("skipped: {}", report.skipped);
    println!("errored: {}", report.errored);
    println!("base path: {}", format_flag(report.include_base_path));
    println!("policy: {}", report.policy.describe());
}

fn print_undo_report(report: &UndoReport) {
    for result in &report.results {
        match &result.detail {
            Some(detail) => println!(
                "{:<9} {} ({detail})",
                result.action.as_str(),
                result.relative_path
            ),
            None => println!("{:<9} {}", result.action.as_str(), result.relative_path),
        }
    }
    println!();
    if report.dry_run {
        println!("dry run: no files were written");
    }
    println!("files found: {}", report.files_found);
    println!("stripped: {}", report.stripped);
    println!("untouched: {}", report.untouched);
    println!("errored: {}", report.errored);
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
