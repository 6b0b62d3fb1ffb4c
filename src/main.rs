use aa_probe::predict::{compare_factories, AddressPredictor};
use aa_probe::proxy::ProxyReader;
use aa_probe::reader::{ChainReader, EthersReader};
use aa_probe::registry::{parse_addr, FactoryConfig, Registry, RegistryError};
use aa_probe::report;
use aa_probe::salt::{normalize_salt, Salt};
use aa_probe::validate::{FactoryValidator, ValidationSettings};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::providers::{Http, Middleware, Provider};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// In --json mode stdout carries exactly one JSON document; human-readable lines go to stderr.
macro_rules! outln {
    ($machine_mode:expr, $($arg:tt)*) => {{
        if $machine_mode {
            eprintln!($($arg)*);
        } else {
            println!($($arg)*);
        }
    }};
}

#[derive(Parser, Debug)]
#[command(name = "aa-probe", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict the counterfactual smart account address for an owner and salt.
    Predict(PredictArgs),

    /// Check that factories are deployed and return distinct per-salt addresses.
    Validate(ValidateArgs),

    /// Predict the same (owner, salt) against every factory of the network.
    Compare(CompareArgs),

    /// Print the network/factory registry (offline).
    Networks(NetworksArgs),

    /// Normalize a salt, or generate a random one (offline).
    Salt(SaltArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// JSON-RPC endpoint. Takes precedence over --backend-url.
    #[arg(long, env = "AA_PROBE_RPC_URL")]
    rpc: Option<String>,

    /// Base URL of a backend exposing POST /api/network/provider.
    #[arg(long, env = "AA_PROBE_BACKEND_URL")]
    backend_url: Option<String>,

    #[arg(long, default_value_t = 11_155_111, env = "AA_PROBE_CHAIN_ID")]
    chain_id: u64,

    /// Registry JSON (defaults to the builtin table).
    #[arg(long, env = "AA_PROBE_REGISTRY")]
    registry: Option<PathBuf>,

    /// Overall deadline for the command. 0 disables it.
    #[arg(long, default_value_t = 60)]
    timeout_seconds: u64,

    /// Print a single JSON object to stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long)]
    owner: String,

    /// Decimal or 0x-hex. Empty or omitted means zero.
    #[arg(long, conflicts_with = "random_salt")]
    salt: Option<String>,

    #[arg(long, default_value_t = false)]
    random_salt: bool,

    /// Registry factory key (defaults to the registry's default factory).
    #[arg(long, conflicts_with = "factory_address")]
    factory: Option<String>,

    /// Probe an unregistered factory by address.
    #[arg(long)]
    factory_address: Option<String>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Factory keys to validate (repeatable). Defaults to every factory of the network.
    #[arg(long)]
    factory: Vec<String>,

    /// Stop at the first valid factory and print only that one.
    #[arg(long, default_value_t = false, conflicts_with = "factory")]
    first_working: bool,

    #[arg(long, default_value = "0x1234567890123456789012345678901234567890")]
    test_owner: String,

    #[arg(long, default_value = "12345")]
    salt_a: String,

    #[arg(long, default_value = "67890")]
    salt_b: String,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long)]
    owner: String,

    #[arg(long)]
    salt: Option<String>,

    /// Maximum factories probed at once.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

#[derive(Args, Debug)]
struct NetworksArgs {
    #[arg(long, env = "AA_PROBE_REGISTRY")]
    registry: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct SaltArgs {
    /// Decimal or 0x-hex salt to normalize.
    value: Option<String>,

    #[arg(long, default_value_t = false, conflicts_with = "value")]
    random: bool,

    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Predict(args) => cmd_predict(args).await,
        Command::Validate(args) => cmd_validate(args).await,
        Command::Compare(args) => cmd_compare(args).await,
        Command::Networks(args) => cmd_networks(args),
        Command::Salt(args) => cmd_salt(args),
    }
}

async fn cmd_predict(args: PredictArgs) -> Result<()> {
    let common = &args.common;
    let machine_mode = common.json;
    let registry = load_registry(common.registry.as_ref())?;

    let owner = parse_addr(&args.owner).context("invalid --owner address")?;
    let salt = if args.random_salt {
        Salt::random()
    } else {
        args.salt.as_deref().unwrap_or_default().parse::<Salt>()?
    };

    let (network, factory) = match &args.factory_address {
        Some(addr) => (
            registry.supported_network(common.chain_id)?,
            FactoryConfig::adhoc(parse_addr(addr).context("invalid --factory-address")?),
        ),
        None => {
            let (network, factory) =
                registry.validate_network_config(common.chain_id, args.factory.as_deref())?;
            (network, factory.clone())
        }
    };

    let reader = connect(common).await?;
    let predictor = AddressPredictor::new(reader, &factory).with_entry_point(network.entry_point);
    let info = with_deadline(common.timeout_seconds, predictor.account_info(owner, &salt)).await??;

    let explorer = info
        .outcome
        .address()
        .and_then(|a| registry.explorer_url(common.chain_id, a));

    if machine_mode {
        let mut out = report::account_info_to_json(&info, explorer.as_deref());
        out["chainId"] = serde_json::json!(common.chain_id);
        out["factoryKey"] = serde_json::json!(factory.key);
        println!("{}", out);
    }

    outln!(machine_mode, "chainId:          {}", common.chain_id);
    outln!(machine_mode, "factoryKey:       {}", factory.key);
    for line in report::account_info_lines(&info, explorer.as_deref()) {
        outln!(machine_mode, "{}", line);
    }

    Ok(())
}

async fn cmd_validate(args: ValidateArgs) -> Result<()> {
    let common = &args.common;
    let machine_mode = common.json;
    let registry = load_registry(common.registry.as_ref())?;
    let network = registry.supported_network(common.chain_id)?;

    let test_owner = parse_addr(&args.test_owner).context("invalid --test-owner address")?;
    let settings = ValidationSettings::new(test_owner, args.salt_a.parse()?, args.salt_b.parse()?)?;

    let selected = args
        .factory
        .iter()
        .map(|key| {
            network
                .factory(key)
                .ok_or_else(|| RegistryError::FactoryNotAvailable {
                    key: key.clone(),
                    network: network.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let reader = connect(common).await?;
    let validator = FactoryValidator::new(reader, settings);

    if args.first_working {
        let found = with_deadline(common.timeout_seconds, validator.find_working(network)).await??;
        if machine_mode {
            let out = serde_json::json!({
                "chainId": common.chain_id,
                "working": found.as_ref().map(report::verdict_to_json),
            });
            println!("{}", out);
        }
        match found {
            Some(v) => {
                outln!(machine_mode, "{}", report::verdict_line(&v));
                if v.key != registry.default_factory_key() {
                    outln!(
                        machine_mode,
                        "default factory '{}' is not the first working one; consider updating the registry",
                        registry.default_factory_key()
                    );
                }
            }
            None => outln!(machine_mode, "no working factory found on {}", network.name),
        }
        return Ok(());
    }

    let verdicts = if selected.is_empty() {
        with_deadline(common.timeout_seconds, validator.validate_all(network)).await??
    } else {
        with_deadline(common.timeout_seconds, validator.validate_each(selected)).await??
    };

    if machine_mode {
        let items: Vec<_> = verdicts.iter().map(report::verdict_to_json).collect();
        let out = serde_json::json!({
            "chainId": common.chain_id,
            "network": network.name,
            "factories": items,
        });
        println!("{}", out);
    }

    for v in &verdicts {
        outln!(machine_mode, "{}", report::verdict_line(v));
    }
    let valid = verdicts.iter().filter(|v| v.verdict.is_valid()).count();
    outln!(machine_mode, "{}/{} factories valid", valid, verdicts.len());

    Ok(())
}

async fn cmd_compare(args: CompareArgs) -> Result<()> {
    let common = &args.common;
    let machine_mode = common.json;
    let registry = load_registry(common.registry.as_ref())?;
    let network = registry.supported_network(common.chain_id)?;

    let owner = parse_addr(&args.owner).context("invalid --owner address")?;
    let salt: Salt = args.salt.as_deref().unwrap_or_default().parse()?;

    let reader = connect(common).await?;
    let results = with_deadline(
        common.timeout_seconds,
        compare_factories(reader, network, owner, &salt, args.concurrency),
    )
    .await?;

    if machine_mode {
        let mut out = report::comparison_to_json(owner, &salt, &results);
        out["chainId"] = serde_json::json!(common.chain_id);
        println!("{}", out);
    }

    outln!(machine_mode, "owner: {}  salt: {}", owner, salt);
    for line in report::comparison_lines(&results) {
        outln!(machine_mode, "{}", line);
    }

    Ok(())
}

fn cmd_networks(args: NetworksArgs) -> Result<()> {
    let registry = load_registry(args.registry.as_ref())?;
    let default_key = registry.default_factory_key();

    if args.json {
        let items: Vec<_> = registry
            .networks()
            .map(|n| report::network_to_json(n, default_key))
            .collect();
        println!("{}", serde_json::json!({ "defaultFactory": default_key, "networks": items }));
        return Ok(());
    }

    for n in registry.networks() {
        let status = if registry.is_network_supported(n.chain_id) {
            "supported"
        } else {
            "not supported"
        };
        println!("{} ({}) chainId={} [{}]", n.name, n.short_name, n.chain_id, status);
        println!("  entryPoint: {:?}", n.entry_point);
        for f in &n.factories {
            let marker = if f.key == default_key { "*" } else { " " };
            println!("  {} {:<14} {:?}  {}", marker, f.key, f.address, f.name);
        }
    }
    Ok(())
}

fn cmd_salt(args: SaltArgs) -> Result<()> {
    let raw = args.value.as_deref().unwrap_or_default();

    if !args.json {
        let canonical = if args.random {
            Salt::random().to_string()
        } else {
            normalize_salt(raw)?
        };
        println!("{}", canonical);
        return Ok(());
    }

    let salt = if args.random {
        Salt::random()
    } else {
        raw.parse::<Salt>()?
    };
    let out = serde_json::json!({
        "salt": salt.as_str(),
        "value": salt.value().to_string(),
    });
    println!("{}", out);
    Ok(())
}

fn load_registry(path: Option<&PathBuf>) -> Result<Registry> {
    match path {
        Some(p) => Registry::load(p),
        None => Registry::builtin(),
    }
}

async fn connect(common: &CommonArgs) -> Result<Arc<dyn ChainReader>> {
    if let Some(rpc) = &common.rpc {
        let provider = Provider::<Http>::try_from(rpc.as_str())
            .with_context(|| format!("invalid --rpc url {rpc}"))?
            .interval(Duration::from_millis(350));

        let chain_id = provider
            .get_chainid()
            .await
            .context("eth_chainId failed")?
            .as_u64();
        if chain_id != common.chain_id {
            bail!(
                "chainId mismatch: expected {}, RPC returned {}",
                common.chain_id,
                chain_id
            );
        }

        let reader: Arc<dyn ChainReader> = Arc::new(EthersReader::new(Arc::new(provider)));
        return Ok(reader);
    }

    match &common.backend_url {
        Some(url) => {
            tracing::debug!(backend = %url, chain_id = common.chain_id, "using backend provider proxy");
            let reader: Arc<dyn ChainReader> = Arc::new(ProxyReader::new(url, common.chain_id));
            Ok(reader)
        }
        None => bail!("either --rpc (AA_PROBE_RPC_URL) or --backend-url (AA_PROBE_BACKEND_URL) is required"),
    }
}

async fn with_deadline<T>(seconds: u64, fut: impl Future<Output = T>) -> Result<T> {
    if seconds == 0 {
        return Ok(fut.await);
    }
    tokio::time::timeout(Duration::from_secs(seconds), fut)
        .await
        .map_err(|_| anyhow!("timed out after {seconds}s"))
}
