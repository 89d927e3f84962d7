use jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use actix_web::{
    get, post,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use HerbNet::analysis::{
    gsea::*,
    layout::network_layout,
    multiple_testing_correction::AdjustmentMethod,
    network::{DisplayConfig, HerbNetwork, NetworkBuild, NetworkBuilder},
    network_plot::{build_network_plot, network_title},
    row_filter::HerbTargetFilter,
    subgraph::{select, SelectionState},
};
use HerbNet::parsers::node_info::node_id_from_click;
use HerbNet::utils::{
    config::*,
    control_panel::{render_page, ControlPanel},
    download::{DownloadManager, ExportFormat, ExportTable},
    fetch::RemoteTableFetcher,
    gene_mapping::MyGeneClient,
    sessions::{SessionStore, DEFAULT_SESSION_CAPACITY},
};

const DEFAULT_SESSION: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "herbnet-interactive", about, version, author)]
struct CliArgs {
    #[arg(
        long = "port",
        value_name = "PORT",
        help = "Port the interactive server listens on.",
        default_value_t = 8080
    )]
    port: u16,

    #[arg(
        long = "base-url",
        value_name = "URL",
        help = "Base location the herb, pathway and lookup tables are fetched from.",
        default_value = DEFAULT_BASE_URL
    )]
    base_url: String,

    #[arg(
        long = "timeout-secs",
        value_name = "SECONDS",
        help = "Network timeout for every remote request.",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    timeout_secs: u64,

    #[arg(
        long = "catalogue",
        value_name = "FILE",
        help = "JSON prescription catalogue. Defaults to the user config catalogue when present."
    )]
    catalogue: Option<PathBuf>,

    #[arg(
        long = "fdr",
        value_enum,
        help = "Adjust herb target p-values before filtering.",
        default_value_t = AdjustmentMethod::None
    )]
    fdr_method: AdjustmentMethod,

    #[arg(
        short = 'd',
        long = "dir",
        value_name = "DIRECTORY",
        help = "Directory enrichment runs are written to.",
        default_value = "herbnet_results"
    )]
    output_dir: PathBuf,

    #[arg(
        long = "max-sessions",
        value_name = "NUMBER",
        help = "Browser sessions kept in memory. The least recently used one is dropped beyond this.",
        default_value_t = DEFAULT_SESSION_CAPACITY
    )]
    max_sessions: usize,

    #[arg(
        long = "cores",
        value_name = "NUMBER",
        help = "Number of cores used to fetch herb tables. Uses all available by default.",
        default_value_t = num_cpus::get()
    )]
    num_cores: usize,

    #[arg(
        long = "open",
        help = "Open the interactive page in the default browser.",
        default_value_t = false
    )]
    open: bool,
}

/// Everything one browser session has chosen so far.
#[derive(Debug, Clone, Serialize)]
struct Session {
    prescription: String,
    doses: Vec<(String, f64)>,
    selection: SelectionState,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            prescription: DEFAULT_PRESCRIPTION.to_string(),
            doses: Vec::new(),
            selection: SelectionState::new(),
        }
    }
}

struct AppState {
    source: RemoteTableFetcher,
    mapper: MyGeneClient,
    catalogue: Catalogue,
    filter: HerbTargetFilter,
    output_dir: PathBuf,
    sessions: SessionStore<Session>,
}

impl AppState {
    fn session(&self, id: &str) -> Session {
        self.sessions.get(id)
    }

    fn update_session<F: FnOnce(&mut Session)>(&self, id: &str, update: F) -> Session {
        self.sessions.update(id, update)
    }

    fn prescription(&self, session: &Session) -> Result<Prescription, String> {
        self.catalogue
            .get(&session.prescription)
            .map(|prescription| prescription.with_doses(&session.doses))
            .ok_or_else(|| format!("Unknown prescription '{}'", session.prescription))
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session: Option<String>,
}

impl SessionQuery {
    fn id(&self) -> &str {
        self.session.as_deref().unwrap_or(DEFAULT_SESSION)
    }
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    session: Option<String>,
    format: Option<ExportFormat>,
}

/// Any subset of the controls; fields left out keep their current value.
#[derive(Debug, Deserialize)]
struct SelectRequest {
    prescription: Option<String>,
    doses: Option<Vec<String>>,
    pathway: Option<String>,
    node_info: Option<String>,
}

/// A fresh build for this request, plus the session's current selection of it.
struct SessionView {
    session: Session,
    prescription: Prescription,
    build: NetworkBuild,
    shown: HerbNetwork,
}

fn error_response(status: actix_web::http::StatusCode, message: impl ToString) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": message.to_string() }))
}

async fn build_view(state: &web::Data<AppState>, session_id: &str) -> Result<SessionView, HttpResponse> {
    let session = state.session(session_id);
    let prescription = state
        .prescription(&session)
        .map_err(|e| error_response(actix_web::http::StatusCode::NOT_FOUND, e))?;

    let worker_state = state.clone();
    let worker_prescription = prescription.clone();
    let build = web::block(move || {
        NetworkBuilder::new(&worker_state.source, worker_state.filter, DisplayConfig::default())
            .build(&worker_prescription)
    })
    .await
    .map_err(|e| error_response(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let shown = select(&build.network, &session.selection.selection());
    Ok(SessionView { session, prescription, build, shown })
}

#[get("/")]
async fn index(state: web::Data<AppState>, query: web::Query<SessionQuery>) -> impl Responder {
    let view = match build_view(&state, query.id()).await {
        Ok(view) => view,
        Err(response) => return response,
    };

    let warnings = view.build.warnings();
    for warning in &warnings {
        warn!("{}", warning);
    }

    let positions = network_layout(&view.shown);
    let plot = build_network_plot(&view.shown, &positions, &network_title(&view.prescription.name));
    let prescription_names = state.catalogue.names();
    let panel = ControlPanel {
        prescriptions: &prescription_names,
        prescription: &view.prescription,
        pathways: &view.build.pathway_options,
        pathway_filter: view.session.selection.pathway_filter.as_deref(),
        selected_node: view.session.selection.selected_node.as_deref(),
        warnings: &warnings,
    };
    let page = render_page(&plot.to_html(), &panel);

    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(page)
}

#[get("/api/prescriptions")]
async fn prescriptions(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "prescriptions": state.catalogue.names() }))
}

#[get("/api/pathways")]
async fn pathways(state: web::Data<AppState>, query: web::Query<SessionQuery>) -> impl Responder {
    match build_view(&state, query.id()).await {
        Ok(view) => HttpResponse::Ok().json(json!({
            "pathways": view.build.pathway_options,
            "warnings": view.build.warnings(),
        })),
        Err(response) => response,
    }
}

#[get("/api/network")]
async fn network(state: web::Data<AppState>, query: web::Query<SessionQuery>) -> impl Responder {
    let view = match build_view(&state, query.id()).await {
        Ok(view) => view,
        Err(response) => return response,
    };

    let positions = network_layout(&view.shown);
    let nodes: Vec<_> = view
        .shown
        .nodes()
        .map(|node| {
            let (x, y) = positions.get(&node.id).copied().unwrap_or_default();
            json!({
                "id": node.id,
                "group": node.category,
                "layer": node.layer(),
                "size": node.size,
                "color": node.color,
                "x": x,
                "y": y,
            })
        })
        .collect();
    let edges: Vec<_> = view
        .shown
        .edges()
        .map(|(source, target, weight)| json!({ "source": source, "target": target, "weight": weight }))
        .collect();

    HttpResponse::Ok().json(json!({
        "prescription": view.prescription.name,
        "session": view.session,
        "nodes": nodes,
        "edges": edges,
        "warnings": view.build.warnings(),
    }))
}

#[post("/api/select")]
async fn select_controls(
    state: web::Data<AppState>,
    query: web::Query<SessionQuery>,
    request: web::Json<SelectRequest>,
) -> impl Responder {
    let request = request.into_inner();

    if let Some(name) = &request.prescription {
        if state.catalogue.get(name).is_none() {
            return error_response(
                actix_web::http::StatusCode::NOT_FOUND,
                format!("Unknown prescription '{}'", name),
            );
        }
    }

    let doses = match &request.doses {
        Some(inputs) => {
            let worker_state = state.clone();
            let inputs = inputs.clone();
            match web::block(move || resolve_doses(&inputs, &worker_state.source).map_err(|e| format!("{:#}", e))).await {
                Ok(Ok(doses)) => Some(doses),
                Ok(Err(e)) => return error_response(actix_web::http::StatusCode::BAD_REQUEST, e),
                Err(e) => return error_response(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, e),
            }
        }
        None => None,
    };

    let clicked = match &request.node_info {
        Some(blob) => match node_id_from_click(blob) {
            Ok(id) => Some(id),
            Err(e) => return error_response(actix_web::http::StatusCode::BAD_REQUEST, e),
        },
        None => None,
    };

    let session = state.update_session(query.id(), |session| {
        if let Some(name) = request.prescription {
            if name != session.prescription {
                session.prescription = name;
                session.doses.clear();
                session.selection.reset();
            }
        }
        if let Some(doses) = doses {
            session.doses = doses;
        }
        if let Some(pathway) = &request.pathway {
            session.selection.set_pathway_filter(pathway);
        }
        if let Some(id) = &clicked {
            session.selection.select_node(id);
        }
    });

    info!("Session {} selection: {:?}", query.id(), session.selection.selection());
    HttpResponse::Ok().json(session)
}

#[post("/api/reset")]
async fn reset(state: web::Data<AppState>, query: web::Query<SessionQuery>) -> impl Responder {
    let session = state.update_session(query.id(), |session| session.selection.reset());
    HttpResponse::Ok().json(session)
}

#[get("/api/download/{table}")]
async fn download(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> impl Responder {
    let table = match path.as_str() {
        "nodes" => ExportTable::Nodes,
        "edges" => ExportTable::Edges,
        other => {
            return error_response(
                actix_web::http::StatusCode::NOT_FOUND,
                format!("Unknown table '{}'. Expected nodes or edges", other),
            )
        }
    };
    let format = query.format.unwrap_or(ExportFormat::Csv);
    let session_id = query.session.as_deref().unwrap_or(DEFAULT_SESSION);

    let view = match build_view(&state, session_id).await {
        Ok(view) => view,
        Err(response) => return response,
    };

    let downloads = DownloadManager::new(&view.prescription.name, &view.shown);
    match downloads.generate_file_content(table, format) {
        Ok((file_name, content)) => HttpResponse::Ok()
            .content_type(format.mime_type())
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(file_name)],
            })
            .body(content),
        Err(e) => error_response(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[post("/api/gsea")]
async fn gsea(state: web::Data<AppState>, query: web::Query<SessionQuery>) -> impl Responder {
    let session = state.session(query.id());
    let prescription = match state.prescription(&session) {
        Ok(prescription) => prescription,
        Err(e) => return error_response(actix_web::http::StatusCode::NOT_FOUND, e),
    };

    let worker_state = state.clone();
    let outcome = web::block(move || {
        let (gene_scores, skipped) = collect_gene_scores(&worker_state.source, &prescription);
        let run_dir = run_directory(&worker_state.output_dir);
        run_enrichment(&gene_scores, &worker_state.mapper, &GseapyRunner::default(), &run_dir)
            .map(|report| (report, skipped, run_dir))
    })
    .await;

    match outcome {
        Ok(Ok((report, skipped, run_dir))) => {
            let failures: Vec<String> = report
                .failures
                .iter()
                .map(|(category, e)| format!("{}: {}", category.library(), e))
                .collect();
            let skipped: Vec<String> = skipped
                .iter()
                .map(|(herb, e)| format!("{}: {}", herb, e))
                .collect();
            HttpResponse::Ok().json(json!({
                "output_dir": run_dir,
                "ranked_genes": report.ranked_genes,
                "unresolved": report.unresolved.iter().take(20).collect::<Vec<_>>(),
                "artifacts": report.artifacts,
                "failures": failures,
                "skipped_herbs": skipped,
            }))
        }
        Ok(Err(e)) => error_response(actix_web::http::StatusCode::UNPROCESSABLE_ENTITY, e),
        Err(e) => error_response(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn serve(state: web::Data<AppState>, port: u16) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(index)
            .service(prescriptions)
            .service(pathways)
            .service(network)
            .service(select_controls)
            .service(reset)
            .service(download)
            .service(gsea)
    })
    .bind(("127.0.0.1", port))?
    .run()
    .await
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli_args: CliArgs = CliArgs::parse();

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(cli_args.num_cores)
        .build_global() {
        eprintln!("Failed to initialize Rayon global thread pool: {:?}", e);
    };

    let catalogue = match Catalogue::load(cli_args.catalogue.as_deref()) {
        Ok(catalogue) => catalogue,
        Err(e) => {
            eprintln!("\nError reading prescription catalogue: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Blocking HTTP clients have to be created and dropped outside the async runtime.
    let timeout = Duration::from_secs(cli_args.timeout_secs);
    let clients = RemoteTableFetcher::new(&cli_args.base_url, timeout)
        .and_then(|source| MyGeneClient::new(timeout).map(|mapper| (source, mapper)));
    let (source, mapper) = match clients {
        Ok(clients) => clients,
        Err(e) => {
            eprintln!("\nError creating HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = HerbTargetFilter {
        fdr_method: cli_args.fdr_method,
        ..HerbTargetFilter::default()
    };

    let state = web::Data::new(AppState {
        source,
        mapper,
        catalogue,
        filter,
        output_dir: cli_args.output_dir,
        sessions: SessionStore::new(cli_args.max_sessions),
    });

    let address = format!("http://127.0.0.1:{}/", cli_args.port);
    println!("\nServing {} prescription(s) at {}", state.catalogue.names().len(), address);
    println!("Reading tables from: {}\n", state.source.base_url());

    if cli_args.open {
        if let Err(e) = webbrowser::open(&address) {
            eprintln!("Warning: could not open a browser: {}", e);
        }
    }

    let result = actix_web::rt::System::new().block_on(serve(state.clone(), cli_args.port));
    drop(state);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nServer error: {}", e);
            ExitCode::FAILURE
        }
    }
}
