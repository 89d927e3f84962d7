use jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use HerbNet::analysis::{
    gsea::*,
    multiple_testing_correction::AdjustmentMethod,
    network::{DisplayConfig, NetworkBuilder},
    network_plot::write_network_plot,
    row_filter::{HerbTargetFilter, DEFAULT_P_VALUE_THRESHOLD, DEFAULT_VALUE_THRESHOLD},
    subgraph::{select, Selection},
};
use HerbNet::parsers::lookup_parser::*;
use HerbNet::utils::{
    config::*,
    download::{DownloadManager, ExportFormat, ExportTable},
    fetch::{RemoteTableFetcher, TableSource},
    gene_mapping::{GeneMapper, IdentityMapper, MyGeneClient},
};

#[derive(Parser, Debug)]
#[command(name = "herbnet", about, version, author)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long = "cores",
        value_name = "NUMBER",
        help = "Number of cores used to fetch herb tables. Uses all available by default.",
        default_value_t = num_cpus::get(),
        global = true
    )]
    num_cores: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the prescription → herb → gene → pathway network and render it.
    Network(NetworkArgs),
    /// Rank every herb target gene and run preranked enrichment (GO BP, KEGG).
    Gsea(GseaArgs),
    /// Resolve herb names and filter molecules by oral bioavailability.
    Lookup(LookupArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
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
}

#[derive(Args, Debug)]
struct PrescriptionArgs {
    #[arg(
        short = 'p',
        long = "prescription",
        value_name = "NAME",
        help = "Prescription to analyse.",
        default_value = DEFAULT_PRESCRIPTION
    )]
    prescription: String,

    #[arg(
        long = "catalogue",
        value_name = "FILE",
        help = "JSON prescription catalogue. Defaults to the user config catalogue when present."
    )]
    catalogue: Option<PathBuf>,

    #[arg(
        long = "dose",
        value_name = "HERB=WEIGHT",
        help = "Dose weight override. Herbs may be given by SMHB code or Korean name. Repeatable."
    )]
    doses: Vec<String>,
}

#[derive(Args, Debug)]
struct NetworkArgs {
    #[command(flatten)]
    prescription: PrescriptionArgs,

    #[command(flatten)]
    source: SourceArgs,

    #[arg(
        long = "pathway",
        value_name = "PATHWAY",
        help = "Only show herbs and the nodes linked to this pathway.",
        default_value = "All"
    )]
    pathway: String,

    #[arg(
        long = "node",
        value_name = "NODE_ID",
        help = "Only show this node and its neighbourhood. Overrides --pathway."
    )]
    node: Option<String>,

    #[arg(
        long = "depth",
        value_name = "HOPS",
        help = "Neighbourhood radius used with --node.",
        default_value_t = 2
    )]
    depth: usize,

    #[arg(
        long = "p-value",
        value_name = "THRESHOLD",
        help = "Keep herb targets with P_value strictly below this threshold.",
        default_value_t = DEFAULT_P_VALUE_THRESHOLD
    )]
    p_value_threshold: f64,

    #[arg(
        long = "min-value",
        value_name = "THRESHOLD",
        help = "Keep herb targets with Value strictly above this threshold.",
        default_value_t = DEFAULT_VALUE_THRESHOLD
    )]
    value_threshold: f64,

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
        help = "Directory to write the network plot and node/edge tables.",
        required = true
    )]
    output_dir: PathBuf,

    #[arg(
        long = "format",
        value_enum,
        help = "Format of the node and edge tables.",
        default_value_t = ExportFormat::Csv
    )]
    format: ExportFormat,

    #[arg(
        long = "open",
        help = "Open the network plot in the default browser.",
        default_value_t = false
    )]
    open: bool,
}

#[derive(Args, Debug)]
struct GseaArgs {
    #[command(flatten)]
    prescription: PrescriptionArgs,

    #[command(flatten)]
    source: SourceArgs,

    #[arg(
        short = 'd',
        long = "dir",
        value_name = "DIRECTORY",
        help = "Directory under which a timestamped results folder is created.",
        required = true
    )]
    output_dir: PathBuf,

    #[arg(
        long = "gseapy",
        value_name = "PROGRAM",
        help = "gseapy executable used for preranked enrichment.",
        default_value = "gseapy"
    )]
    program: String,

    #[arg(
        long = "permutations",
        value_name = "COUNT",
        help = "Number of permutations.",
        default_value_t = 500
    )]
    permutations: usize,

    #[arg(
        long = "seed",
        value_name = "SEED",
        help = "Random seed passed to the enrichment run.",
        default_value_t = 123
    )]
    seed: u64,

    #[arg(
        long = "min-size",
        value_name = "COUNT",
        help = "Smallest gene set tested.",
        default_value_t = 5
    )]
    min_size: usize,

    #[arg(
        long = "max-size",
        value_name = "COUNT",
        help = "Largest gene set tested.",
        default_value_t = 2000
    )]
    max_size: usize,

    #[arg(
        long = "offline",
        help = "Skip the gene mapping service and rank input symbols as given.",
        default_value_t = false
    )]
    offline: bool,
}

#[derive(Args, Debug)]
struct LookupArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(
        long = "names",
        value_name = "NAME",
        help = "Korean herb names to resolve to SMHB codes.",
        num_args = 1..
    )]
    names: Vec<String>,

    #[arg(
        long = "min-ob",
        value_name = "SCORE",
        help = "List molecules with OB_score at or above this threshold.",
    )]
    min_ob_score: Option<f64>,
}

fn build_fetcher(args: &SourceArgs) -> Option<RemoteTableFetcher> {
    match RemoteTableFetcher::new(&args.base_url, Duration::from_secs(args.timeout_secs)) {
        Ok(fetcher) => Some(fetcher),
        Err(e) => {
            eprintln!("\nError creating HTTP client: {}", e);
            None
        }
    }
}

fn load_prescription<S: TableSource + ?Sized>(
    args: &PrescriptionArgs,
    source: &S,
) -> anyhow::Result<Prescription> {
    let catalogue = Catalogue::load(args.catalogue.as_deref())?;
    let prescription = catalogue.get(&args.prescription).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown prescription '{}'. Available: {}",
            args.prescription,
            catalogue.names().join(", ")
        )
    })?;
    let doses = resolve_doses(&args.doses, source)?;
    Ok(prescription.with_doses(&doses))
}

fn run_network(args: NetworkArgs) -> ExitCode {
    let Some(fetcher) = build_fetcher(&args.source) else {
        return ExitCode::FAILURE;
    };

    let prescription = match load_prescription(&args.prescription, &fetcher) {
        Ok(prescription) => prescription,
        Err(e) => {
            eprintln!("\nError loading prescription '{}':", args.prescription.prescription);
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "\nReading herb targets for {} ({} herbs) from: {}\n",
        prescription.name,
        prescription.herbs.len(),
        fetcher.base_url()
    );

    let filter = HerbTargetFilter {
        p_value_threshold: args.p_value_threshold,
        value_threshold: args.value_threshold,
        fdr_method: args.fdr_method,
    };
    let builder = NetworkBuilder::new(&fetcher, filter, DisplayConfig::default());
    let build = builder.build(&prescription);

    for warning in build.warnings() {
        eprintln!("Warning: {}", warning);
    }
    println!(
        "Built network with {} nodes and {} edges\n",
        build.network.node_count(),
        build.network.edge_count()
    );

    let selection = match &args.node {
        Some(id) => Selection::Node { id: id.clone(), depth: args.depth },
        None => Selection::pathway(&args.pathway),
    };
    if let Selection::Pathway(pathway) = &selection {
        if !build.pathway_options.contains(pathway) {
            eprintln!(
                "Warning: pathway '{}' is not among the {} known pathways",
                pathway,
                build.pathway_options.len().saturating_sub(1)
            );
        }
    }
    let shown = select(&build.network, &selection);
    if shown.node_count() == 0 {
        eprintln!("Warning: the selection {:?} matched no nodes", selection);
    }

    println!("Writing network to: {}\n", args.output_dir.display());

    let plot_path = match write_network_plot(&shown, &prescription.name, &args.output_dir) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: Failed to write network plot to directory '{}': {}", args.output_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let downloads = DownloadManager::new(&prescription.name, &shown);
    for table in [ExportTable::Nodes, ExportTable::Edges] {
        match downloads.write_to(&args.output_dir, table, args.format) {
            Ok(path) => println!("Saved {}", path.display()),
            Err(e) => {
                eprintln!("Error: Failed to export {:?} table: {}", table, e);
                return ExitCode::FAILURE;
            }
        }
    }
    println!("Saved {}", plot_path.display());

    if args.open {
        if let Err(e) = webbrowser::open(&plot_path.to_string_lossy()) {
            eprintln!("Warning: could not open a browser: {}", e);
        }
    }

    ExitCode::SUCCESS
}

fn run_gsea(args: GseaArgs) -> ExitCode {
    let Some(fetcher) = build_fetcher(&args.source) else {
        return ExitCode::FAILURE;
    };

    let prescription = match load_prescription(&args.prescription, &fetcher) {
        Ok(prescription) => prescription,
        Err(e) => {
            eprintln!("\nError loading prescription '{}':", args.prescription.prescription);
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("\nCollecting gene scores for {} from: {}\n", prescription.name, fetcher.base_url());
    let (gene_scores, skipped) = collect_gene_scores(&fetcher, &prescription);
    for (herb, e) in &skipped {
        eprintln!("Warning: skipped herb {}: {}", herb, e);
    }
    println!("Collected scores for {} genes\n", gene_scores.len());

    let mapper: Box<dyn GeneMapper> = if args.offline {
        Box::new(IdentityMapper)
    } else {
        match MyGeneClient::new(Duration::from_secs(args.source.timeout_secs)) {
            Ok(client) => Box::new(client),
            Err(e) => {
                eprintln!("\nError creating gene mapping client: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let runner = GseapyRunner {
        program: args.program,
        params: PrerankParams {
            permutations: args.permutations,
            seed: args.seed,
            min_size: args.min_size,
            max_size: args.max_size,
            ..PrerankParams::default()
        },
    };

    let run_dir = run_directory(&args.output_dir);
    println!("Writing enrichment results to: {}\n", run_dir.display());

    let report = match run_enrichment(&gene_scores, mapper.as_ref(), &runner, &run_dir) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("\nError running enrichment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Ranked {} genes ({} without a canonical symbol)\n",
        report.ranked_genes,
        report.unresolved.len()
    );
    for (category, e) in &report.failures {
        eprintln!("Warning: {} enrichment failed: {}", category.library(), e);
    }
    for path in &report.artifacts {
        println!("Saved {}", path.display());
    }

    if report.results.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_lookup(args: LookupArgs) -> ExitCode {
    let Some(fetcher) = build_fetcher(&args.source) else {
        return ExitCode::FAILURE;
    };

    if !args.names.is_empty() {
        println!("\nReading herb names from: {}\n", fetcher.resolve(HERB_NAME_RESOURCE));
        let lookup = match fetcher
            .fetch_table(HERB_NAME_RESOURCE)
            .map_err(anyhow::Error::from)
            .and_then(|table| Ok(HerbNameLookup::from_table(&table)?))
        {
            Ok(lookup) => lookup,
            Err(e) => {
                eprintln!("Error reading herb name table: {:#}", e);
                return ExitCode::FAILURE;
            }
        };

        for name in &args.names {
            match lookup.resolve(name) {
                Some(code) => println!("{}\t{}", name, code),
                None => println!("{}\tnot found", name),
            }
        }
    }

    if let Some(min_ob_score) = args.min_ob_score {
        println!("\nReading molecules from: {}\n", fetcher.resolve(MOLECULE_RESOURCE));
        let admitted = match fetcher
            .fetch_table(MOLECULE_RESOURCE)
            .map_err(anyhow::Error::from)
            .and_then(|table| Ok(admit_by_ob_score(&table, min_ob_score)?))
        {
            Ok(admitted) => admitted,
            Err(e) => {
                eprintln!("Error reading molecule table: {:#}", e);
                return ExitCode::FAILURE;
            }
        };

        println!("{} molecules with OB_score >= {}\n", admitted.len(), min_ob_score);
        for molecule in &admitted {
            println!("{}\t{}", molecule.molecule, molecule.ob_score);
        }
    }

    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli_args: CliArgs = CliArgs::parse();

    println!("\nAnalysis will be performed with {} core(s)", &cli_args.num_cores);

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(cli_args.num_cores)
        .build_global() {
        eprintln!("Failed to initialize Rayon global thread pool: {:?}", e);
    };

    match cli_args.command {
        Command::Network(args) => run_network(args),
        Command::Gsea(args) => run_gsea(args),
        Command::Lookup(args) => run_lookup(args),
    }
}
