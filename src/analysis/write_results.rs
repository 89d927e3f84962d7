use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::fmt::Write as FmtWrite;
use crate::analysis::gsea::{EnrichmentTerm, GeneSetCategory};

const BUFFER_SIZE: usize = 8192 * 32;

pub fn results_file_name(category: GeneSetCategory) -> String {
    format!("gsea_{}_results.tsv", category.slug())
}

/// Orders terms by FDR, then by |NES|. NaN values sort last.
pub fn sort_terms(terms: &mut [EnrichmentTerm]) {
    terms.sort_by(|a, b| {
        a.fdr
            .total_cmp(&b.fdr)
            .then_with(|| b.nes.abs().total_cmp(&a.nes.abs()))
    });
}

pub fn write_enrichment_results(
    terms: &[EnrichmentTerm],
    category: GeneSetCategory,
    output_dir: &Path,
) -> io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let filename = output_dir.join(results_file_name(category));
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, File::create(&filename)?);

    writer.write_all(b"Term\tLibrary\tES\tNES\tNOM p-val\tFDR q-val\tGene set size\tLead genes\n")?;

    let mut sorted = terms.to_vec();
    sort_terms(&mut sorted);

    let mut line_buffer = String::with_capacity(256);
    for term in &sorted {
        line_buffer.clear();
        writeln!(
            &mut line_buffer,
            "{}\t{}\t{:.3}\t{:.3}\t{:.5e}\t{:.5e}\t{}\t{}",
            term.term,
            category.library(),
            term.es,
            term.nes,
            term.nominal_p,
            term.fdr,
            term.gene_set_size,
            term.lead_genes
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.write_all(line_buffer.as_bytes())?;
    }

    writer.flush()?;
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(name: &str, nes: f64, fdr: f64) -> EnrichmentTerm {
        EnrichmentTerm {
            term: name.to_string(),
            es: nes / 3.0,
            nes,
            nominal_p: fdr / 2.0,
            fdr,
            gene_set_size: 20,
            lead_genes: "TP53;AKT1".to_string(),
        }
    }

    #[test]
    fn results_are_sorted_by_fdr() {
        let dir = tempfile::tempdir().unwrap();
        let terms = vec![
            term("late", 1.1, 0.2),
            term("early", -2.0, 0.001),
            term("unknown", 0.5, f64::NAN),
        ];
        let path = write_enrichment_results(&terms, GeneSetCategory::Pathway, dir.path()).unwrap();

        assert!(path.ends_with("gsea_kegg_results.tsv"));
        let content = fs::read_to_string(path).unwrap();
        let names: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|line| line.split('\t').next().unwrap())
            .collect();
        assert_eq!(names, vec!["early", "late", "unknown"]);
        assert!(content.lines().nth(1).unwrap().contains("KEGG_2019_Human"));
    }
}
