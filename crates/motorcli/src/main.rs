// crates/motorcli/src/main.rs

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use motorcore::{
    FlowDefinition, FlowRecord, LogStatus, Map, MemoryStore, NodeSpec, ServerConfig, TableRecord,
    TracingAuditSink, Value,
};
use motorruntime::{BackendRegistry, FlowGraph, FunctionRegistry, MotorRuntime, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motor")]
#[command(about = "Integration flow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a stored flow
    Run {
        /// Flow JSON file, or a directory of them
        #[arg(short, long)]
        flows: PathBuf,

        /// Process id to run; defaults to the only loaded flow
        #[arg(short, long)]
        process: Option<String>,

        /// Input data as JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Lookup tables: JSON array of {nombre, campos, datos}
        #[arg(long)]
        tables: Option<PathBuf>,

        /// Servers: JSON array of {id, tipo, host, extras, ...}
        #[arg(long)]
        servers: Option<PathBuf>,

        /// Runtime configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "cli")]
        channel: String,

        #[arg(long, default_value = "manual")]
        trigger: String,

        /// Also write audit records to the log
        #[arg(long)]
        log_audit: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available system functions
    Functions,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flujo.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            flows,
            process,
            input,
            tables,
            servers,
            config,
            channel,
            trigger,
            log_audit,
            verbose,
        } => {
            init_logging(verbose);
            let options = RunOptions {
                flows,
                process,
                input,
                tables,
                servers,
                config,
                channel,
                trigger,
                log_audit,
            };
            run_flow(options).await?;
        }

        Commands::Validate { file } => {
            validate_flow(&file)?;
        }

        Commands::Functions => {
            list_functions();
        }

        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct RunOptions {
    flows: PathBuf,
    process: Option<String>,
    input: Option<String>,
    tables: Option<PathBuf>,
    servers: Option<PathBuf>,
    config: Option<PathBuf>,
    channel: String,
    trigger: String,
    log_audit: bool,
}

async fn run_flow(options: RunOptions) -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    println!("🚀 Loading flows from: {}", options.flows.display());
    let loaded = load_flows(&store, &options.flows)?;
    for record in &loaded {
        println!("   • {} ({})", record.id, record.name);
    }
    tracing::debug!("loaded {} flow(s)", loaded.len());

    if let Some(path) = &options.servers {
        let servers: Vec<ServerConfig> = read_json(path)?;
        println!("   Servers: {}", servers.len());
        for server in servers {
            store.insert_server(server);
        }
    }
    if let Some(path) = &options.tables {
        let tables: Vec<TableRecord> = read_json(path)?;
        println!("   Tables: {}", tables.len());
        for table in tables {
            store.insert_table(table);
        }
    }
    let config: RuntimeConfig = match &options.config {
        Some(path) => read_json(path)?,
        None => RuntimeConfig::default(),
    };

    let process_id = match options.process {
        Some(id) => id,
        None if loaded.len() == 1 => loaded[0].id.clone(),
        None => bail!("several flows loaded; choose one with --process"),
    };

    let input: Map = match options.input {
        Some(text) => match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => map,
            _ => bail!("Input must be a JSON object"),
        },
        None => Map::new(),
    };

    let mut backends = BackendRegistry::new();
    motorbackends::register_all(&mut backends);

    let mut builder = MotorRuntime::builder()
        .with_store(store)
        .with_backends(backends)
        .with_config(config);
    if options.log_audit {
        builder = builder.with_audit_sink(Arc::new(TracingAuditSink));
    }
    let runtime = builder.build();
    let mut audit = runtime.subscribe_audit();

    println!();
    println!("▶️  Running {} (channel {}, trigger {})", process_id, options.channel, options.trigger);
    let result = runtime
        .execute_flow(&process_id, input, &options.channel, &options.trigger)
        .await?;

    println!();
    println!("📋 Audit:");
    while let Ok(entry) = audit.try_recv() {
        let marker = match entry.status {
            LogStatus::Ok => "✅",
            LogStatus::Incomplete => "⚠️ ",
            LogStatus::Error => "❌",
        };
        print!(
            "  {} {} {} ({}ms)",
            marker, entry.object_type, entry.object_name, entry.duration_ms
        );
        match &entry.error_detail {
            Some(detail) => println!(": {}", detail),
            None => println!(),
        }
    }

    println!();
    println!("📤 Result:");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Load one flow file or every `.json` file of a directory into the store
fn load_flows(store: &MemoryStore, path: &Path) -> Result<Vec<FlowRecord>> {
    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut loaded = Vec::new();
    for file in files {
        let record = read_flow(&file)?;
        store.insert_flow(record.clone());
        loaded.push(record);
    }
    if loaded.is_empty() {
        bail!("no flow files found in {}", path.display());
    }
    Ok(loaded)
}

/// A flow file holds either a stored record (`{id, nombre, flujo}`) or a
/// bare flow definition; bare definitions without an id take the file stem.
fn read_flow(path: &Path) -> Result<FlowRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let json: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    if json.get("flujo").is_some() {
        return Ok(serde_json::from_value(json)?);
    }

    let mut definition = FlowDefinition::parse(&text)?;
    if definition.id.is_empty() {
        definition.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("flujo")
            .to_string();
    }
    Ok(FlowRecord::from_definition(&definition)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let record = read_flow(file)?;
    let graph = FlowGraph::build(FlowDefinition::parse(&record.flow)?);

    println!("   Id: {}", record.id);
    println!("   Nodes: {}", graph.node_count());
    println!("   Edges: {}", graph.edge_count());

    if graph.issues().is_empty() {
        println!("✅ Flow is valid");
        return Ok(());
    }

    for issue in graph.issues() {
        println!("   ⚠️  {}", issue);
    }
    if graph.entry().is_none() {
        bail!("flow {} cannot run: no entry node", record.id);
    }
    println!("✅ Flow can run, with {} warning(s)", graph.issues().len());
    Ok(())
}

fn list_functions() {
    println!("📦 System functions:");
    println!();

    for function in FunctionRegistry::standard().iter() {
        println!("  • {} / {} argument(s)", function.name, function.arity);
        println!("    {}", function.description);
    }
}

fn create_example_flow(output: &Path) -> Result<()> {
    let mut flow = FlowDefinition::new("consulta_cliente", "Consulta de cliente");

    flow.add_node(
        NodeSpec::new("entrada", "entrada")
            .with_data(
                "campos",
                serde_json::json!([
                    {"nombre": "id", "tipo": "string", "orden": 1,
                     "asignacion": {"tipo": "campo", "valor": "cliente_id"}}
                ]),
            )
            .with_position(100.0, 100.0),
    );
    flow.add_node(
        NodeSpec::new("consulta", "proceso")
            .with_data("label", "Consultar cliente")
            .with_data("servidorId", "api")
            .with_data("objeto", "clientes")
            .with_data("metodoHttp", "GET")
            .with_data("parametrosSalida", serde_json::json!([{"nombre": "nombre", "tipo": "string"}]))
            .with_position(300.0, 100.0),
    );
    flow.add_node(
        NodeSpec::new("salida", "salida")
            .with_data(
                "asignaciones",
                serde_json::json!({"salida": [
                    {"tipo": "campo", "valor": "nombre", "destino": "cliente"}
                ]}),
            )
            .with_position(500.0, 100.0),
    );
    flow.add_node(
        NodeSpec::new("error", "salidaError")
            .with_data(
                "parametrosEntrada",
                serde_json::json!([
                    {"nombre": "codigoError"},
                    {"nombre": "mensajeError"},
                    {"nombre": "detalleError"}
                ]),
            )
            .with_position(500.0, 250.0),
    );

    flow.connect("entrada", "consulta");
    flow.connect("consulta", "salida");
    flow.connect_on_error("consulta", "error");

    std::fs::write(output, serde_json::to_string_pretty(&flow)?)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with a servers file declaring server \"api\":");
    println!(
        "  motor run --flows {} --servers servidores.json --input '{{\"cliente_id\": \"42\"}}'",
        output.display()
    );

    Ok(())
}
