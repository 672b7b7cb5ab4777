//! Subcommand implementations

use crate::output;
use anyhow::{bail, Context, Result};
use clap::Args;
use cld_datacenter::DatacenterConfig;
use cld_engine::{
    CancelToken, EventSender, ExecuteOptions, Executor, Plan, Planner, PluginRegistry,
};
use cld_graph::{Graph, GraphBuilder};
use cld_schema::{ComponentSpec, InputMap, Value};
use cld_state::{EnvironmentState, LocalBackend, StateCoordinator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Arguments shared by plan and deploy
#[derive(Args)]
pub struct PlanArgs {
    /// Component specs as NAME=PATH, repeatable
    #[arg(long = "component", value_name = "NAME=PATH", required = true)]
    pub components: Vec<String>,

    /// Datacenter config file
    #[arg(long, value_name = "PATH")]
    pub datacenter: PathBuf,

    /// Datacenter name (defaults to the config file stem)
    #[arg(long, value_name = "NAME")]
    pub datacenter_name: Option<String>,

    /// Target environment
    #[arg(short, long)]
    pub environment: String,

    /// Variables as KEY=VALUE, repeatable
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

/// Arguments for deploy
#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Maximum resources applied concurrently
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Preview plugin operations without mutating state
    #[arg(long)]
    pub dry_run: bool,

    /// Keep executing unrelated resources after a failure
    #[arg(long)]
    pub no_stop_on_error: bool,
}

/// Arguments for destroy
#[derive(Args)]
pub struct DestroyArgs {
    /// Target environment
    #[arg(short, long)]
    pub environment: String,

    /// Datacenter name the environment was deployed into
    #[arg(long, value_name = "NAME")]
    pub datacenter_name: String,

    /// Datacenter config file, used only when stored rows predate
    /// per-module state capture
    #[arg(long, value_name = "PATH")]
    pub datacenter: Option<PathBuf>,

    /// Destroy a single component instead of the whole environment
    #[arg(long, value_name = "NAME")]
    pub component: Option<String>,

    /// Destroy even when other components depend on the target
    #[arg(long)]
    pub force: bool,

    /// Maximum resources destroyed concurrently
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Preview without mutating state
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for state inspection
#[derive(Args)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommand,
}

/// State inspection subcommands
#[derive(clap::Subcommand)]
pub enum StateCommand {
    /// List environments of a datacenter
    Environments {
        /// Datacenter name
        #[arg(long)]
        datacenter: String,
    },
    /// List components of an environment
    Components {
        /// Datacenter name
        #[arg(long)]
        datacenter: String,
        /// Environment name
        #[arg(short, long)]
        environment: String,
    },
    /// Show resource rows of an environment
    Resources {
        /// Datacenter name
        #[arg(long)]
        datacenter: String,
        /// Environment name
        #[arg(short, long)]
        environment: String,
        /// Restrict to one component
        #[arg(long)]
        component: Option<String>,
    },
}

/// Arguments for graph printing
#[derive(Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub plan: PlanArgs,
}

fn parse_pairs(raw: &[String], what: &str) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("invalid {what} '{entry}', expected KEY=VALUE"))
        })
        .collect()
}

fn parse_variables(raw: &[String]) -> Result<InputMap> {
    Ok(parse_pairs(raw, "variable")?
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect())
}

fn datacenter_name(args: &PlanArgs) -> String {
    args.datacenter_name.clone().unwrap_or_else(|| {
        args.datacenter
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string())
    })
}

fn build_graph(args: &PlanArgs) -> Result<(Graph, DatacenterConfig, InputMap)> {
    let config = DatacenterConfig::parse_file(&args.datacenter)
        .with_context(|| format!("failed to load datacenter {:?}", args.datacenter))?;
    let variables = parse_variables(&args.vars)?;

    let mut builder = GraphBuilder::new(&args.environment, datacenter_name(args));
    for (name, path) in parse_pairs(&args.components, "component")? {
        let spec = ComponentSpec::parse_file(&path)
            .with_context(|| format!("failed to load component '{name}' from {path}"))?;
        builder.add_component(name, spec);
    }
    let graph = builder.build()?;
    info!(nodes = graph.len(), "graph built");

    Ok((graph, config, variables))
}

fn coordinator(state_dir: &Path) -> StateCoordinator {
    StateCoordinator::new(Arc::new(LocalBackend::new(state_dir)))
}

async fn current_state(
    coordinator: &StateCoordinator,
    dc: &str,
    env: &str,
) -> Result<Option<EnvironmentState>> {
    match coordinator.environment_state(dc, env).await {
        Ok(state) => Ok(Some(state)),
        Err(cld_state::Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn run_plan(
    graph: &mut Graph,
    plan: &Plan,
    config: &DatacenterConfig,
    variables: &InputMap,
    coordinator: StateCoordinator,
    options: ExecuteOptions,
) -> Result<()> {
    let (events, rx) = EventSender::channel();
    let printer = output::spawn_printer(rx);

    let executor = Executor::new(coordinator, Arc::new(PluginRegistry::new()), events);
    let summary = executor
        .execute(graph, plan, config, variables, &options, &CancelToken::new())
        .await?;
    // The printer drains until every sender is gone
    drop(executor);
    printer.await;

    println!(
        "Done: {} completed, {} failed, {} skipped",
        summary.completed, summary.failed, summary.skipped
    );
    if !summary.success {
        bail!("execution finished with failures");
    }
    Ok(())
}

/// `cldctl plan`
pub async fn plan(args: PlanArgs, state_dir: &Path) -> Result<()> {
    let (graph, config, variables) = build_graph(&args)?;
    let coordinator = coordinator(state_dir);
    let state = current_state(&coordinator, &graph.datacenter, &graph.environment).await?;

    let planner = Planner::new(&config);
    let plan = planner.plan(&graph, state.as_ref(), &variables)?;
    print!("{}", plan.render());
    Ok(())
}

/// `cldctl deploy`
pub async fn deploy(args: DeployArgs, state_dir: &Path) -> Result<()> {
    let (mut graph, config, variables) = build_graph(&args.plan)?;
    let coordinator = coordinator(state_dir);
    let state = current_state(&coordinator, &graph.datacenter, &graph.environment).await?;

    let planner = Planner::new(&config);
    let plan = planner.plan(&graph, state.as_ref(), &variables)?;
    print!("{}", plan.render());
    if plan.is_empty() {
        println!("No changes.");
        return Ok(());
    }

    run_plan(
        &mut graph,
        &plan,
        &config,
        &variables,
        coordinator,
        ExecuteOptions {
            parallelism: args.parallelism,
            dry_run: args.dry_run,
            stop_on_error: !args.no_stop_on_error,
            ..Default::default()
        },
    )
    .await
}

/// `cldctl destroy`
pub async fn destroy(args: DestroyArgs, state_dir: &Path) -> Result<()> {
    let coordinator = coordinator(state_dir);
    let state = current_state(&coordinator, &args.datacenter_name, &args.environment)
        .await?
        .with_context(|| {
            format!(
                "environment '{}' has no state in datacenter '{}'",
                args.environment, args.datacenter_name
            )
        })?;

    let config = match &args.datacenter {
        Some(path) => DatacenterConfig::parse_file(path)?,
        None => DatacenterConfig::default(),
    };

    let planner = Planner::new(&config);
    let plan = match &args.component {
        Some(component) => planner.plan_destroy_component(&state, component, args.force)?,
        None => planner.plan_destroy(&state)?,
    };
    print!("{}", plan.render());

    let mut graph = Planner::destroy_graph(&state, args.component.as_deref())?;
    run_plan(
        &mut graph,
        &plan,
        &config,
        &InputMap::new(),
        coordinator,
        ExecuteOptions {
            parallelism: args.parallelism,
            dry_run: args.dry_run,
            stop_on_error: true,
            ..Default::default()
        },
    )
    .await
}

/// `cldctl state …`
pub async fn state(args: StateArgs, state_dir: &Path) -> Result<()> {
    let coordinator = coordinator(state_dir);
    match args.command {
        StateCommand::Environments { datacenter } => {
            for record in coordinator.list_environments(&datacenter).await? {
                println!("{}\t{:?}\t{}", record.name, record.status, record.updated_at);
            }
        }
        StateCommand::Components {
            datacenter,
            environment,
        } => {
            for record in coordinator.list_components(&datacenter, &environment).await? {
                let deps = if record.dependencies.is_empty() {
                    "-".to_string()
                } else {
                    record.dependencies.join(",")
                };
                println!("{}\tdeps={}\t{}", record.name, deps, record.updated_at);
            }
        }
        StateCommand::Resources {
            datacenter,
            environment,
            component,
        } => {
            let state = coordinator
                .environment_state(&datacenter, &environment)
                .await?;
            for row in state.all_resources() {
                if component
                    .as_deref()
                    .is_some_and(|c| c != row.component)
                {
                    continue;
                }
                println!(
                    "{}\t{:?}\t{}",
                    row.node_id(),
                    row.status,
                    serde_json::to_string(&row.outputs)?
                );
            }
        }
    }
    Ok(())
}

/// `cldctl graph`
pub async fn graph(args: GraphArgs) -> Result<()> {
    let (graph, _, _) = build_graph(&args.plan)?;
    for id in graph.topological_sort()? {
        let node = graph.get(&id).expect("sorted ids come from the graph");
        if node.depends_on.is_empty() {
            println!("{id}");
        } else {
            let deps: Vec<String> = node.depends_on.iter().map(|d| d.to_string()).collect();
            println!("{id} <- {}", deps.join(", "));
        }
    }
    Ok(())
}
