use std::cmp::Ordering::Equal;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use csv::ReaderBuilder;
use indexmap::IndexMap;
use log::{info, warn};
use rustc_hash::FxHashMap;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use time::{format_description, OffsetDateTime};
use crate::analysis::enrichment_plots::{gsea_plot_file_name, write_dot_plot};
use crate::analysis::row_filter::drop_non_numeric;
use crate::analysis::score_aggregation::ScoreTable;
use crate::analysis::write_results::{sort_terms, write_enrichment_results};
use crate::errors::{EnrichmentError, LoadError};
use crate::parsers::herb_parser::{parse_herb_targets, P_VALUE_COLUMN, VALUE_COLUMN};
use crate::utils::config::Prescription;
use crate::utils::fetch::TableSource;
use crate::utils::gene_mapping::{map_with_fallback, GeneMapper, MappingOutcome};
use crate::analysis::network::herb_resource;

const RANK_JITTER: f64 = 1e-9;
const RUN_DIR_FORMAT: &str = "[year][month][day]_[hour][minute][second]";
const TERM_PLOT_FORMAT: &str = "png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum GeneSetCategory {
    GeneOntology,
    Pathway,
}

impl GeneSetCategory {
    pub fn library(&self) -> &'static str {
        match self {
            GeneSetCategory::GeneOntology => "GO_Biological_Process_2021",
            GeneSetCategory::Pathway => "KEGG_2019_Human",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            GeneSetCategory::GeneOntology => "go",
            GeneSetCategory::Pathway => "kegg",
        }
    }

    pub fn plot_title(&self) -> &'static str {
        match self {
            GeneSetCategory::GeneOntology => "GO (BP) top terms",
            GeneSetCategory::Pathway => "KEGG top terms",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedGene {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentTerm {
    pub term: String,
    pub es: f64,
    pub nes: f64,
    pub nominal_p: f64,
    pub fdr: f64,
    pub gene_set_size: usize,
    pub lead_genes: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PrerankParams {
    pub permutations: usize,
    pub seed: u64,
    pub min_size: usize,
    pub max_size: usize,
    pub threads: usize,
}

impl Default for PrerankParams {
    fn default() -> Self {
        Self {
            permutations: 500,
            seed: 123,
            min_size: 5,
            max_size: 2000,
            threads: 4,
        }
    }
}

/// Runs a preranked enrichment for one gene-set category.
pub trait EnrichmentRunner {
    fn prerank(
        &self,
        ranked: &[RankedGene],
        category: GeneSetCategory,
        workdir: &Path,
    ) -> Result<Vec<EnrichmentTerm>, EnrichmentError>;

    /// Enrichment plot a previous `prerank` in `workdir` drew for `term`.
    fn term_plot(&self, _term: &str, _category: GeneSetCategory, _workdir: &Path) -> Option<PathBuf> {
        None
    }
}

/// Every herb's numeric target rows, weighted and summed per gene symbol.
/// Unlike the network, no significance threshold is applied here.
pub fn collect_gene_scores<S: TableSource + ?Sized>(
    source: &S,
    prescription: &Prescription,
) -> (IndexMap<String, f64>, Vec<(String, LoadError)>) {
    let mut scores = ScoreTable::new();
    let mut skipped = Vec::new();

    for herb in &prescription.herbs {
        let targets = source
            .fetch_table(&herb_resource(herb))
            .map_err(LoadError::from)
            .and_then(|table| Ok(drop_non_numeric(&table, &[P_VALUE_COLUMN, VALUE_COLUMN])?))
            .and_then(|table| Ok(parse_herb_targets(&table)?));

        match targets {
            Ok(targets) => scores.add_targets(herb, &targets, &prescription.weights),
            Err(e) => {
                warn!("Skipping herb {} for enrichment: {}", herb, e);
                skipped.push((herb.clone(), e));
            }
        }
    }

    (aggregate_by_symbol(&scores), skipped)
}

/// Trims symbols and sums duplicates.
pub fn aggregate_by_symbol(scores: &ScoreTable) -> IndexMap<String, f64> {
    let mut totals: IndexMap<String, f64> = IndexMap::new();
    for (gene, total) in scores.by_gene() {
        let symbol = gene.trim();
        if symbol.is_empty() {
            continue;
        }
        *totals.entry(symbol.to_string()).or_insert(0.0) += total;
    }
    totals
}

/// Sums per canonical id, sorts descending (stable, so ties keep input
/// order) and nudges each entry down by its rank so no two scores are equal.
/// Non-finite scores are dropped.
pub fn rank_genes(gene_scores: &IndexMap<String, f64>, mapping: &MappingOutcome) -> Vec<RankedGene> {
    let canonical: FxHashMap<&str, &str> = mapping
        .canonical
        .iter()
        .map(|(symbol, id)| (symbol.as_str(), id.as_str()))
        .collect();

    let mut by_id: IndexMap<String, f64> = IndexMap::new();
    for (symbol, score) in gene_scores {
        if !score.is_finite() {
            warn!("Dropping {} from the ranking: score {}", symbol, score);
            continue;
        }
        let id = canonical
            .get(symbol.as_str())
            .map(|id| id.to_string())
            .unwrap_or_else(|| symbol.to_uppercase());
        *by_id.entry(id).or_insert(0.0) += score;
    }

    let mut ranked: Vec<RankedGene> = by_id
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .map(|(id, score)| RankedGene { id, score })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Equal));

    // The step has to stay above the float spacing of the largest score.
    let max_abs = ranked.iter().map(|gene| gene.score.abs()).fold(0.0, f64::max);
    let step = RANK_JITTER.max(max_abs * 1e-12);
    for (rank, gene) in ranked.iter_mut().enumerate() {
        gene.score -= rank as f64 * step;
    }
    ranked
}

pub fn write_rank_file(ranked: &[RankedGene], path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for gene in ranked {
        writeln!(writer, "{}\t{}", gene.id, gene.score)?;
    }
    writer.flush()
}

/// `gseapy prerank` run as a child process.
pub struct GseapyRunner {
    pub program: String,
    pub params: PrerankParams,
}

impl Default for GseapyRunner {
    fn default() -> Self {
        Self { program: "gseapy".to_string(), params: PrerankParams::default() }
    }
}

impl EnrichmentRunner for GseapyRunner {
    fn prerank(
        &self,
        ranked: &[RankedGene],
        category: GeneSetCategory,
        workdir: &Path,
    ) -> Result<Vec<EnrichmentTerm>, EnrichmentError> {
        let rank_file = workdir.join("ranked_genes.rnk");
        write_rank_file(ranked, &rank_file)?;
        let outdir = workdir.join(category.slug());
        fs::create_dir_all(&outdir)?;

        info!("Running {} prerank against {}", self.program, category.library());
        let output = Command::new(&self.program)
            .arg("prerank")
            .arg("--rnk").arg(&rank_file)
            .arg("--gmt").arg(category.library())
            .arg("--outdir").arg(&outdir)
            .arg("--permu-num").arg(self.params.permutations.to_string())
            .arg("--min-size").arg(self.params.min_size.to_string())
            .arg("--max-size").arg(self.params.max_size.to_string())
            .arg("--seed").arg(self.params.seed.to_string())
            .arg("--threads").arg(self.params.threads.to_string())
            .arg("--format").arg(TERM_PLOT_FORMAT)
            .output()
            .map_err(|source| EnrichmentError::Launch { program: self.program.clone(), source })?;

        if !output.status.success() {
            return Err(EnrichmentError::Failed {
                category: category.library().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let report = find_report(&outdir)?
            .ok_or_else(|| EnrichmentError::MissingReport(category.library().to_string()))?;
        read_prerank_report(&report)
    }

    fn term_plot(&self, term: &str, category: GeneSetCategory, workdir: &Path) -> Option<PathBuf> {
        let path = workdir
            .join(category.slug())
            .join(format!("{}.prerank.{}", plot_file_stem(term), TERM_PLOT_FORMAT));
        path.is_file().then_some(path)
    }
}

/// gseapy names per-term plots after the term with path separators replaced.
fn plot_file_stem(term: &str) -> String {
    term.replace(['/', ':'], "_")
}

fn find_report(outdir: &Path) -> std::io::Result<Option<PathBuf>> {
    for entry in fs::read_dir(outdir)? {
        let path = entry?.path();
        let is_report = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with("prerank.report.csv"));
        if is_report {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Parses the prerank report (`Term`, `ES`, `NES`, `NOM p-val`, `FDR q-val`,
/// `Tag %`, `Lead_genes`). Gene-set size is the denominator of `Tag %`.
pub fn read_prerank_report(path: &Path) -> Result<Vec<EnrichmentTerm>, EnrichmentError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|header| header.trim() == name);

    let term = column("Term").ok_or_else(|| EnrichmentError::MissingReport(path.display().to_string()))?;
    let es = column("ES");
    let nes = column("NES");
    let nominal_p = column("NOM p-val");
    let fdr = column("FDR q-val");
    let tag = column("Tag %");
    let lead_genes = column("Lead_genes");

    let number = |record: &csv::StringRecord, index: Option<usize>| -> f64 {
        index
            .and_then(|i| record.get(i))
            .and_then(|value| value.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN)
    };

    let mut terms = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let gene_set_size = tag
            .and_then(|i| record.get(i))
            .and_then(|value| value.split('/').nth(1))
            .and_then(|size| size.trim().parse::<usize>().ok())
            .unwrap_or(0);

        terms.push(EnrichmentTerm {
            term: record.get(term).unwrap_or_default().to_string(),
            es: number(&record, es),
            nes: number(&record, nes),
            nominal_p: number(&record, nominal_p),
            fdr: number(&record, fdr),
            gene_set_size,
            lead_genes: lead_genes
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(terms)
}

/// `<root>/gsea_<YYYYMMDD_HHMMSS>` (UTC).
pub fn run_directory(root: &Path) -> PathBuf {
    let stamp = format_description::parse(RUN_DIR_FORMAT)
        .ok()
        .and_then(|format| OffsetDateTime::now_utc().format(&format).ok())
        .unwrap_or_else(|| {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default();
            secs.to_string()
        });
    root.join(format!("gsea_{}", stamp))
}

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub ranked_genes: usize,
    pub unresolved: Vec<String>,
    pub results: FxHashMap<GeneSetCategory, Vec<EnrichmentTerm>>,
    pub artifacts: Vec<PathBuf>,
    pub failures: Vec<(GeneSetCategory, EnrichmentError)>,
}

/// Aggregate → map → rank → enrich each category → persist plots and tables
/// into `output_dir`. A failing category does not stop the others.
pub fn run_enrichment<R, M>(
    gene_scores: &IndexMap<String, f64>,
    mapper: &M,
    runner: &R,
    output_dir: &Path,
) -> Result<EnrichmentReport, EnrichmentError>
where
    R: EnrichmentRunner + ?Sized,
    M: GeneMapper + ?Sized,
{
    if gene_scores.is_empty() {
        return Err(EnrichmentError::EmptyInput);
    }

    let symbols: Vec<String> = gene_scores.keys().cloned().collect();
    let mapping = map_with_fallback(mapper, &symbols);
    let ranked = rank_genes(gene_scores, &mapping);

    fs::create_dir_all(output_dir)?;
    let workdir = tempfile::Builder::new().prefix("gsea_out_").tempdir()?;

    let mut report = EnrichmentReport {
        ranked_genes: ranked.len(),
        unresolved: mapping.unresolved,
        ..EnrichmentReport::default()
    };

    for category in GeneSetCategory::iter() {
        let outcome = runner
            .prerank(&ranked, category, workdir.path())
            .and_then(|terms| persist_category(&terms, category, output_dir).map(|paths| (terms, paths)));

        match outcome {
            Ok((terms, paths)) => {
                info!("{}: {} enriched terms", category.library(), terms.len());
                report.artifacts.extend(paths);
                if let Some(plot) = keep_top_term_plot(runner, &terms, category, workdir.path(), output_dir) {
                    report.artifacts.push(plot);
                }
                report.results.insert(category, terms);
            }
            Err(e) => {
                warn!("Enrichment against {} failed: {}", category.library(), e);
                report.failures.push((category, e));
            }
        }
    }

    Ok(report)
}

fn persist_category(
    terms: &[EnrichmentTerm],
    category: GeneSetCategory,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, EnrichmentError> {
    let mut paths = vec![write_enrichment_results(terms, category, output_dir)?];
    if let Some(plot) = write_dot_plot(terms, category, output_dir)? {
        paths.push(plot);
    }
    Ok(paths)
}

/// Copies the runner's plot of the most significant term into `output_dir`.
/// A missing plot is logged and skipped.
fn keep_top_term_plot<R: EnrichmentRunner + ?Sized>(
    runner: &R,
    terms: &[EnrichmentTerm],
    category: GeneSetCategory,
    workdir: &Path,
    output_dir: &Path,
) -> Option<PathBuf> {
    let mut ranked = terms.to_vec();
    sort_terms(&mut ranked);
    let top = ranked.first()?;

    let Some(source) = runner.term_plot(&top.term, category, workdir) else {
        warn!("No enrichment plot for the top {} term '{}'", category.library(), top.term);
        return None;
    };

    let target = output_dir.join(gsea_plot_file_name(category));
    match fs::copy(&source, &target) {
        Ok(_) => Some(target),
        Err(e) => {
            warn!("Could not copy {}: {}", source.display(), e);
            None
        }
    }
}
