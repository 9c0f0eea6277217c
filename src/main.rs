use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gdeploy::config::Config;
use gdeploy::engine::{expand, flatten, ExpandMode, Object, Value};
use gdeploy::gcp::auth;
use gdeploy::gcp::client::GcpClient;
use gdeploy::gcp::http::{format_gcp_error, Transport};
use gdeploy::resource::{extract_json_value, get_all_resource_keys, get_registry};
use gdeploy::{Action, ApplyOptions, Reconciler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Declarative reconcile for Cloud Deploy pipelines and targets
#[derive(Parser, Debug)]
#[command(name = "gdeploy", version, about, long_about = None)]
struct Args {
    /// GCP project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Cloud Deploy location (region)
    #[arg(short, long, global = true)]
    location: Option<String>,

    /// Override the API base path, e.g. https://clouddeploy.googleapis.com/v1/
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Use this access token instead of Application Default Credentials
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// Resource kind
    #[arg(short, long, default_value = "clouddeploy.DeliveryPipeline", global = true)]
    kind: String,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what apply would change
    Plan {
        /// Desired state (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Converge the live resource to the desired state
    Apply {
        #[arg(short, long)]
        file: PathBuf,
        /// Fail instead of deleting and recreating the resource
        #[arg(long)]
        no_recreate: bool,
    },
    /// Print the live resource
    Get {
        #[arg(short, long, conflicts_with = "file")]
        name: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Delete the resource; succeeds if it does not exist
    Delete {
        #[arg(short, long, conflicts_with = "file")]
        name: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// List resources under the project and location
    List {
        /// Print full resources as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete every listed resource whose labels match
    DeleteAll {
        /// Label filter as key=value, repeatable
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Actually delete; without it matches are only printed
        #[arg(long)]
        yes: bool,
    },
    /// List the resource kinds this build knows
    Schemas,
    /// Save --project, --location and --endpoint as defaults
    Configure,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Env var with `EnvFilter` directives, e.g. `gdeploy=debug,reqwest=warn`
const LOG_ENV: &str = "GDEPLOY_LOG";

/// `GDEPLOY_LOG` wins over `--log-level`; logging is off when neither asks for it
fn log_filter(level: LogLevel, directives: Option<&str>) -> Option<EnvFilter> {
    if let Some(filter) = directives.and_then(|d| EnvFilter::try_new(d).ok()) {
        return Some(filter);
    }
    let level = level.to_tracing_level()?;
    Some(EnvFilter::default().add_directive(LevelFilter::from_level(level).into()))
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = log_filter(level, std::env::var(LOG_ENV).ok().as_deref())?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gdeploy started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gdeploy").join("gdeploy.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gdeploy").join("gdeploy.log");
    }
    PathBuf::from("gdeploy.log")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        let message = match err.downcast_ref::<gdeploy::Error>() {
            Some(e) => format_gcp_error(e),
            None => format!("{err:#}"),
        };
        tracing::error!("{err:#}");
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

/// Project, location and a reconciler, resolved from flags and config
struct Session {
    project: String,
    location: String,
    reconciler: Reconciler<'static>,
}

async fn connect(args: &Args, config: &Config) -> Result<Session> {
    let Some(project) = config.effective_project(args.project.as_deref()) else {
        bail!("No project set. Pass --project or run 'gcloud config set project <id>'.");
    };
    if !auth::validate_project_id(&project) {
        bail!("Invalid project ID: {project}");
    }
    let location = config.effective_location(args.location.as_deref());

    let client = match &args.access_token {
        Some(token) => GcpClient::with_access_token(token, config.retry)?,
        None => GcpClient::new(config.retry).await?,
    };
    let transport: Arc<dyn Transport> = Arc::new(client);

    let mut reconciler = Reconciler::new(transport, &args.kind)?.with_settings(config.settings());
    if let Some(endpoint) = args.endpoint.as_ref().or(config.endpoint.as_ref()) {
        reconciler = reconciler.with_endpoint(endpoint.clone());
    }

    tracing::info!(project = %project, location = %location, kind = %args.kind, "connected");
    Ok(Session {
        project,
        location,
        reconciler,
    })
}

async fn run(args: Args) -> Result<()> {
    if let Command::Schemas = args.command {
        for key in get_all_resource_keys() {
            let name = get_registry().resource(key).map(|r| r.display_name.as_str()).unwrap_or("");
            println!("{key:<32} {name}");
        }
        return Ok(());
    }

    let mut config = Config::load();
    if let Command::Configure = args.command {
        if let Some(project) = &args.project {
            if !auth::validate_project_id(project) {
                bail!("Invalid project ID: {project}");
            }
            config.project = Some(project.clone());
        }
        if let Some(location) = &args.location {
            config.location = Some(location.clone());
        }
        if let Some(endpoint) = &args.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        config.save()?;
        if let Some(path) = Config::config_path() {
            println!("Saved {}", path.display());
        }
        return Ok(());
    }

    let ctx = connect(&args, &config).await?;
    let reconciler = &ctx.reconciler;

    match &args.command {
        Command::Plan { file } => {
            let desired = load_desired(&ctx, file)?;
            let plan = reconciler.plan(&desired).await?;
            println!("{}", plan.action());
            for group in &plan.groups {
                println!("  {} ({})", group.operation, group.update_mask().join(","));
                for d in &group.diffs {
                    println!("    {d}");
                }
            }
        }
        Command::Apply { file, no_recreate } => {
            let desired = load_desired(&ctx, file)?;
            let options = ApplyOptions {
                allow_recreate: !no_recreate,
            };
            let outcome = reconciler.apply(&desired, &options).await?;
            match outcome.action {
                Action::NoChange => println!("No changes."),
                action => println!("Applied: {action}"),
            }
            if !outcome.is_converged() {
                eprintln!("Warning: resource still differs from the desired state:");
                for d in &outcome.residual {
                    eprintln!("  {d}");
                }
            }
        }
        Command::Get { name, file } => {
            let target = identify(&ctx, name.as_deref(), file.as_deref())?;
            match reconciler.get(&target).await? {
                Some(resource) => print_json(&expand(&reconciler.schema(), &resource, ExpandMode::Full)?)?,
                None => bail!("{} not found", target.str_field("name").unwrap_or("")),
            }
        }
        Command::Delete { name, file } => {
            let target = identify(&ctx, name.as_deref(), file.as_deref())?;
            reconciler.delete(&target).await?;
            println!("Deleted {}", target.str_field("name").unwrap_or(""));
        }
        Command::List { json } => {
            let resources = reconciler.list(&ctx.project, &ctx.location).await?;
            let items = resources
                .iter()
                .map(|r| expand(&reconciler.schema(), r, ExpandMode::Full))
                .collect::<gdeploy::Result<Vec<_>>>()?;
            if *json {
                print_json(&serde_json::Value::Array(items))?;
            } else {
                print_table(&items);
            }
        }
        Command::DeleteAll { labels, yes } => {
            let filters = parse_labels(labels)?;
            let matches = |obj: &Object| labels_match(obj, &filters);
            if !yes {
                let resources = reconciler.list(&ctx.project, &ctx.location).await?;
                for r in resources.iter().filter(|r| matches(r)) {
                    println!("{}", r.str_field("name").unwrap_or(""));
                }
                println!("Re-run with --yes to delete the resources above.");
                return Ok(());
            }
            let deleted = reconciler.delete_all(&ctx.project, &ctx.location, matches).await?;
            println!("Deleted {deleted} resource(s)");
        }
        Command::Schemas | Command::Configure => {}
    }
    Ok(())
}

/// Read a desired-state file. Project and location default to the resolved
/// ones when the file leaves them out.
fn load_desired(ctx: &Session, path: &Path) -> Result<Object> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut json: serde_json::Value =
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let Some(map) = json.as_object_mut() else {
        bail!("{}: expected a mapping at the top level", path.display());
    };
    map.entry("project")
        .or_insert_with(|| serde_json::Value::String(ctx.project.clone()));
    map.entry("location")
        .or_insert_with(|| serde_json::Value::String(ctx.location.clone()));

    Ok(flatten(&ctx.reconciler.schema(), &json)?)
}

fn identify(ctx: &Session, name: Option<&str>, file: Option<&Path>) -> Result<Object> {
    match (name, file) {
        (Some(name), _) => Ok(Object::new()
            .with("project", ctx.project.as_str())
            .with("location", ctx.location.as_str())
            .with("name", name)),
        (None, Some(path)) => load_desired(ctx, path),
        (None, None) => bail!("pass --name or --file"),
    }
}

fn parse_labels(labels: &[String]) -> Result<Vec<(String, String)>> {
    labels
        .iter()
        .map(|l| match l.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => bail!("invalid label filter '{l}', expected key=value"),
        })
        .collect()
}

fn labels_match(obj: &Object, filters: &[(String, String)]) -> bool {
    let labels = match obj.get("labels").value() {
        Some(Value::Map(m)) => Some(m),
        _ => None,
    };
    filters
        .iter()
        .all(|(k, v)| labels.and_then(|m| m.get(k)).map(|actual| actual == v).unwrap_or(false))
}

/// Columns shown by `list`, as dot paths into the wire JSON
const LIST_COLUMNS: &[(&str, &str)] = &[("NAME", "name"), ("UID", "uid"), ("UPDATED", "updateTime")];

fn print_table(items: &[serde_json::Value]) {
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| LIST_COLUMNS.iter().map(|(_, path)| extract_json_value(item, path)).collect())
        .collect();
    let widths: Vec<usize> = LIST_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, (header, _))| rows.iter().map(|r| r[i].len()).chain([header.len()]).max().unwrap_or(0))
        .collect();

    let header: Vec<String> = LIST_COLUMNS
        .iter()
        .zip(&widths)
        .map(|((h, _), w)| format!("{h:<w$}"))
        .collect();
    println!("{}", header.join("  ").trim_end());
    for row in rows {
        let cells: Vec<String> = row.iter().zip(&widths).map(|(c, w)| format!("{c:<w$}")).collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_log_filter_precedence() {
        assert!(log_filter(LogLevel::Off, None).is_none());
        let filter = log_filter(LogLevel::Debug, None).unwrap();
        assert_eq!(filter.to_string().to_lowercase(), "debug");
        let filter = log_filter(LogLevel::Warn, Some("gdeploy=trace")).unwrap();
        assert_eq!(filter.to_string().to_lowercase(), "gdeploy=trace");
    }

    #[test]
    fn test_access_token_falls_back_to_env() {
        let args = Args::try_parse_from(["gdeploy", "schemas"]).unwrap();
        assert_eq!(args.access_token, std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok());
        let args = Args::try_parse_from(["gdeploy", "--access-token", "tok", "schemas"]).unwrap();
        assert_eq!(args.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_parse_labels() {
        let parsed = parse_labels(&["team=web".to_string(), "env=".to_string()]).unwrap();
        assert_eq!(parsed, vec![("team".into(), "web".into()), ("env".into(), "".into())]);
        assert!(parse_labels(&["nokey".to_string()]).is_err());
        assert!(parse_labels(&["=v".to_string()]).is_err());
    }

    #[test]
    fn test_labels_match_requires_all_filters() {
        let labels: BTreeMap<String, String> = [("team", "web"), ("env", "dev")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let obj = Object::new().with("labels", labels);
        assert!(labels_match(&obj, &[("team".into(), "web".into())]));
        assert!(!labels_match(&obj, &[("team".into(), "web".into()), ("env".into(), "prod".into())]));
        assert!(!labels_match(&Object::new(), &[("team".into(), "web".into())]));
        assert!(labels_match(&Object::new(), &[]));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["gdeploy", "apply", "-f", "pipeline.yaml", "--no-recreate", "-p", "my-project"]);
        assert_eq!(args.project.as_deref(), Some("my-project"));
        assert_eq!(args.kind, "clouddeploy.DeliveryPipeline");
        assert!(matches!(args.command, Command::Apply { no_recreate: true, .. }));
    }
}
