//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use outreach_context::{FileContextStore, FileTemplateSource};
use outreach_core::{
    Assembler, AuditFanout, AuditSink, CancellationToken, DraftRequest, Orchestrator,
    ProperNouns, RubricValidator, StageCache, StageSet, Toolkit,
};
use outreach_providers::{BraveSearchClient, OpenRouterProvider, SiteFetcher};
use outreach_shared::{
    AppConfig, ClientId, CompletionProvider, Contact, EffortTier, RunRecord, SearchProvider,
    expand_home, init_config, load_config, load_config_from, validate_api_key,
};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

use crate::sinks::{JsonlAudit, SpinnerAudit};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Outreach: researched, personalized B2B email drafts.
#[derive(Parser)]
#[command(
    name = "outreach",
    version,
    about = "Draft personalized B2B outreach emails from a client context and a prospect.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.outreach/outreach.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Effort tier accepted on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum TierArg {
    Standard,
    Enhanced,
    Maximum,
}

impl From<TierArg> for EffortTier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Standard => EffortTier::Standard,
            TierArg::Enhanced => EffortTier::Enhanced,
            TierArg::Maximum => EffortTier::Maximum,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Draft one email for one prospect.
    Draft(DraftArgs),

    /// Draft emails for every contact in a file (JSON Lines or TOML).
    Batch(BatchArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Settings shared by `draft` and `batch`.
#[derive(Args, Debug)]
pub(crate) struct EngineArgs {
    /// Client whose context and voice to use.
    #[arg(long)]
    pub client: String,

    /// Directory holding `clients/` and `templates/`.
    #[arg(long)]
    pub context_dir: Option<PathBuf>,

    /// Template name (defaults to the client's default template).
    #[arg(short, long)]
    pub template: Option<String>,

    /// Skip web search and site fetches; derive values from the context only.
    #[arg(long)]
    pub no_live_lookup: bool,

    /// Effort tier of the first attempt.
    #[arg(long)]
    pub tier: Option<TierArg>,

    /// Maximum number of attempts.
    #[arg(long)]
    pub budget: Option<u32>,

    /// Minimum score (0-100) a draft needs to pass.
    #[arg(long)]
    pub gate: Option<u8>,

    /// Append audit events as JSON Lines to this file.
    #[arg(long)]
    pub audit: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct DraftArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Prospect company name.
    #[arg(long)]
    pub company: String,

    /// Prospect website.
    #[arg(long)]
    pub website: Option<String>,

    /// Prospect industry.
    #[arg(long, default_value = "")]
    pub industry: String,

    /// Recipient's first name.
    #[arg(long)]
    pub recipient: Option<String>,

    /// Write the draft to this file instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the full run record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Contacts file: `.jsonl` (one contact per line) or `.toml` (`[[contacts]]`).
    #[arg(long)]
    pub contacts: PathBuf,

    /// Directory receiving one draft per contact and `runs.jsonl`.
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Contacts drafted in parallel.
    #[arg(long, default_value = "2")]
    pub concurrency: usize,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "outreach=info",
        1 => "outreach=debug",
        _ => "outreach=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Draft(args) => cmd_draft(config_path.as_deref(), args).await,
        Command::Batch(args) => cmd_batch(config_path.as_deref(), args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>, engine: &EngineArgs) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(tier) = engine.tier {
        config.generation.initial_tier = tier.into();
    }
    if let Some(budget) = engine.budget {
        config.generation.retry_budget = budget;
    }
    if let Some(gate) = engine.gate {
        config.generation.quality_gate = gate;
    }
    if engine.no_live_lookup {
        config.generation.live_lookup = false;
    }
    config.check()?;
    Ok(config)
}

/// Wire providers, stages and validator into an orchestrator.
fn build_engine(
    config: &AppConfig,
    engine: &EngineArgs,
    spinner: Arc<SpinnerAudit>,
) -> Result<Orchestrator> {
    validate_api_key(config)?;

    let completion: Arc<dyn CompletionProvider> =
        Arc::new(OpenRouterProvider::from_env(&config.openrouter)?);
    let search = BraveSearchClient::from_env(&config.search)?;
    if search.is_none() && config.generation.live_lookup {
        warn!(
            var = %config.search.api_key_env,
            "search API key not set; stages will start at the company website"
        );
    }
    let toolkit = Toolkit {
        completion: completion.clone(),
        search: search.map(|s| Arc::new(s) as Arc<dyn SearchProvider>),
        fetcher: Some(Arc::new(SiteFetcher::new(&config.fetch)?)),
    };

    let mut validator = RubricValidator::new(config.validation.clone());
    if config.validation.llm_judge {
        validator = validator.with_judge(completion);
    }

    let context_dir = engine
        .context_dir
        .clone()
        .unwrap_or_else(|| expand_home(&config.defaults.context_dir));
    info!(context_dir = %context_dir.display(), "using context directory");

    let mut sinks: Vec<Arc<dyn AuditSink>> = vec![spinner as Arc<dyn AuditSink>];
    if let Some(path) = &engine.audit {
        sinks.push(Arc::new(JsonlAudit::open(path)?));
    }

    let mut orchestrator = Orchestrator::new(
        Arc::new(FileContextStore::new(&context_dir)),
        Arc::new(FileTemplateSource::new(&context_dir)),
        StageSet::standard(&toolkit),
        Arc::new(validator),
    )
    .with_assembler(Assembler::new(ProperNouns::new(
        config.validation.proper_nouns.clone(),
    )))
    .with_generation(config.effort_tiers.clone(), &config.generation)
    .with_audit(Arc::new(AuditFanout::new(sinks)));
    if config.cache.enabled {
        orchestrator =
            orchestrator.with_cache(Arc::new(StageCache::new(config.cache.max_companies)));
    }
    Ok(orchestrator)
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    token
}

fn parse_website(raw: Option<&str>) -> Result<Option<Url>> {
    raw.map(|w| {
        let with_scheme = if w.contains("://") {
            w.to_string()
        } else {
            format!("https://{w}")
        };
        Url::parse(&with_scheme).map_err(|e| eyre!("invalid website '{w}': {e}"))
    })
    .transpose()
}

fn print_summary(record: &RunRecord) {
    let score = record
        .final_report()
        .map(|r| r.score.to_string())
        .unwrap_or_else(|| "-".into());
    eprintln!();
    eprintln!("  Company:  {}", record.contact.company);
    eprintln!("  State:    {:?}", record.state);
    eprintln!("  Score:    {score} ({})", if record.passed { "passed" } else { "below gate" });
    eprintln!("  Attempts: {}", record.attempts.len());
    eprintln!("  Cost:     ${:.4}", record.usage.cost_usd);
    eprintln!("  Time:     {:.1}s", record.elapsed_ms as f64 / 1000.0);
    if let Some(report) = record.final_report().filter(|_| !record.passed) {
        for hint in report.correction_hints() {
            eprintln!("  - {hint}");
        }
    }
    eprintln!();
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_draft(config_path: Option<&Path>, args: DraftArgs) -> Result<()> {
    let config = resolve_config(config_path, &args.engine)?;
    let spinner = Arc::new(SpinnerAudit::new());
    let orchestrator = build_engine(&config, &args.engine, spinner.clone())?;

    let request = DraftRequest {
        client_id: ClientId::new(&args.engine.client),
        contact: Contact {
            company: args.company.clone(),
            website: parse_website(args.website.as_deref())?,
            industry: args.industry.clone(),
            recipient_name: args.recipient.clone(),
        },
        template: args.engine.template.clone().or(config.defaults.template.clone()),
    };

    info!(client = %request.client_id, company = %request.contact.company, "drafting");
    let cancel = cancel_on_ctrl_c();
    let result = orchestrator.run(&request, &cancel).await;
    spinner.finish();
    let record = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let draft = record
        .final_draft()
        .ok_or_else(|| eyre!("run ended ({:?}) before a draft was produced", record.state))?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &draft.text)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            eprintln!("Draft written to {}", path.display());
        }
        None => println!("{}", draft.text),
    }
    print_summary(&record);
    Ok(())
}

#[derive(Deserialize)]
struct ContactsFile {
    contacts: Vec<Contact>,
}

/// Read contacts from JSON Lines, or TOML with a `[[contacts]]` array.
fn read_contacts(path: &Path) -> Result<Vec<Contact>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read contacts file {}", path.display()))?;

    if path.extension().is_some_and(|e| e == "toml") {
        let file: ContactsFile = toml::from_str(&content)
            .wrap_err_with(|| format!("invalid contacts file {}", path.display()))?;
        return Ok(file.contacts);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(i, line)| {
            serde_json::from_str(line)
                .wrap_err_with(|| format!("{}:{}: invalid contact", path.display(), i + 1))
        })
        .collect()
}

/// File-name-safe form of a company name.
fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

async fn cmd_batch(config_path: Option<&Path>, args: BatchArgs) -> Result<()> {
    let config = resolve_config(config_path, &args.engine)?;
    let contacts = read_contacts(&args.contacts)?;
    if contacts.is_empty() {
        return Err(eyre!("no contacts in {}", args.contacts.display()));
    }
    std::fs::create_dir_all(&args.out_dir)
        .wrap_err_with(|| format!("cannot create {}", args.out_dir.display()))?;

    let spinner = Arc::new(SpinnerAudit::new());
    let orchestrator = Arc::new(build_engine(&config, &args.engine, spinner.clone())?);
    let semaphore = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let cancel = cancel_on_ctrl_c();
    let client_id = ClientId::new(&args.engine.client);
    let template = args.engine.template.clone().or(config.defaults.template.clone());

    info!(contacts = contacts.len(), concurrency = args.concurrency, "starting batch");

    let mut tasks = JoinSet::new();
    for (index, contact) in contacts.into_iter().enumerate() {
        let orchestrator = orchestrator.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let request = DraftRequest {
            client_id: client_id.clone(),
            contact,
            template: template.clone(),
        };
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = orchestrator.run(&request, &cancel).await;
            (index, request.contact.company, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.wrap_err("batch task panicked")?);
    }
    spinner.finish();
    results.sort_by_key(|(index, _, _)| *index);

    let mut runs = String::new();
    let (mut passed, mut failed) = (0usize, 0usize);
    for (index, company, result) in results {
        match result {
            Ok(record) => {
                if let Some(draft) = record.final_draft() {
                    let name = format!("{:03}-{}.txt", index + 1, slug(&company));
                    let path = args.out_dir.join(name);
                    std::fs::write(&path, &draft.text)
                        .wrap_err_with(|| format!("cannot write {}", path.display()))?;
                }
                if record.passed {
                    passed += 1;
                }
                runs.push_str(&serde_json::to_string(&record)?);
                runs.push('\n');
                print_summary(&record);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {company}: {e}");
            }
        }
    }
    let runs_path = args.out_dir.join("runs.jsonl");
    std::fs::write(&runs_path, runs)
        .wrap_err_with(|| format!("cannot write {}", runs_path.display()))?;

    eprintln!("  Passed: {passed}  Failed: {failed}  Output: {}", args.out_dir.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
