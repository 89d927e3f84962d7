use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use crate::parsers::herb_parser::{GeneSymbol, HerbID, HerbTarget};

pub const DEFAULT_WEIGHT: f64 = 1.0;

#[inline]
pub fn score(value: f64, weight: f64) -> f64 {
    value * weight
}

/// Dose-derived multiplier per herb. Herbs without an entry weigh 1.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HerbWeights(FxHashMap<HerbID, f64>);

impl HerbWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, herb: &str) -> f64 {
        self.0.get(herb).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn set(&mut self, herb: impl Into<HerbID>, weight: f64) {
        self.0.insert(herb.into(), weight);
    }

    pub fn extend<I: IntoIterator<Item = (HerbID, f64)>>(&mut self, weights: I) {
        self.0.extend(weights);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HerbID, &f64)> {
        self.0.iter()
    }
}

impl FromIterator<(HerbID, f64)> for HerbWeights {
    fn from_iter<I: IntoIterator<Item = (HerbID, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Weighted scores per (herb, gene). Repeated pairs are summed, so the
/// result does not depend on the order rows arrive in.
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    scores: IndexMap<(HerbID, GeneSymbol), f64>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, herb: &str, gene: &GeneSymbol, value: f64, weight: f64) {
        *self
            .scores
            .entry((herb.to_string(), gene.clone()))
            .or_insert(0.0) += score(value, weight);
    }

    pub fn add_targets(&mut self, herb: &str, targets: &[HerbTarget], weights: &HerbWeights) {
        let weight = weights.get(herb);
        for target in targets {
            self.add(herb, &target.gene_symbol, target.value, weight);
        }
    }

    pub fn get(&self, herb: &str, gene: &str) -> Option<f64> {
        self.scores
            .get(&(herb.to_string(), GeneSymbol::new(gene)))
            .copied()
    }

    /// (herb, gene, score) in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeneSymbol, f64)> {
        self.scores
            .iter()
            .map(|((herb, gene), &total)| (herb.as_str(), gene, total))
    }

    /// Collapses herbs: one summed score per gene, first-seen order.
    pub fn by_gene(&self) -> IndexMap<GeneSymbol, f64> {
        let mut totals: IndexMap<GeneSymbol, f64> = IndexMap::new();
        for ((_, gene), &total) in &self.scores {
            *totals.entry(gene.clone()).or_insert(0.0) += total;
        }
        totals
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// `display_size = clamp(score * scale, min_size, max_size)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeScale {
    pub scale: f64,
    pub min_size: f64,
    pub max_size: f64,
}

impl Default for SizeScale {
    fn default() -> Self {
        Self { scale: 0.5, min_size: 3.0, max_size: 15.0 }
    }
}

impl SizeScale {
    pub fn display_size(&self, score: f64) -> f64 {
        let (low, high) = if self.min_size <= self.max_size {
            (self.min_size, self.max_size)
        } else {
            (self.max_size, self.min_size)
        };
        if score.is_nan() {
            return low;
        }
        (score * self.scale).clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(gene: &str, value: f64) -> HerbTarget {
        HerbTarget {
            gene_symbol: GeneSymbol::new(gene),
            p_value: 0.001,
            value,
            target_id: None,
        }
    }

    #[test]
    fn score_is_value_times_weight() {
        assert_eq!(score(2.0, 3.75), 7.5);
    }

    #[test]
    fn missing_weight_defaults_to_one() {
        let mut weights = HerbWeights::new();
        weights.set("SMHB00336", 3.75);
        assert_eq!(weights.get("SMHB00336"), 3.75);
        assert_eq!(weights.get("SMHB00041"), 1.0);
    }

    #[test]
    fn duplicates_sum_in_any_order() {
        let weights: HerbWeights = vec![("H1".to_string(), 2.0)].into_iter().collect();
        let rows = vec![target("G1", 1.5), target("G2", 4.0), target("G1", 2.5)];

        let mut forward = ScoreTable::new();
        forward.add_targets("H1", &rows, &weights);

        let mut reversed_rows = rows.clone();
        reversed_rows.reverse();
        let mut backward = ScoreTable::new();
        backward.add_targets("H1", &reversed_rows, &weights);

        assert_eq!(forward.get("H1", "G1"), Some(8.0));
        assert_eq!(forward.get("H1", "G1"), backward.get("H1", "G1"));
        assert_eq!(forward.len(), 2);
    }

    #[test]
    fn by_gene_sums_across_herbs() {
        let weights = HerbWeights::new();
        let mut table = ScoreTable::new();
        table.add_targets("H1", &[target("G1", 2.0)], &weights);
        table.add_targets("H2", &[target("G1", 3.0), target("G2", 1.0)], &weights);

        let totals = table.by_gene();
        assert_eq!(totals.get("G1"), Some(&5.0));
        assert_eq!(totals.keys().map(|g| g.as_str()).collect::<Vec<_>>(), vec!["G1", "G2"]);
    }

    #[test]
    fn display_size_is_clamped() {
        let sizes = SizeScale::default();
        assert_eq!(sizes.display_size(1.0), 3.0);
        assert_eq!(sizes.display_size(20.0), 10.0);
        assert_eq!(sizes.display_size(1000.0), 15.0);
    }

    #[test]
    fn display_size_tolerates_swapped_bounds() {
        let swapped = SizeScale { scale: 0.5, min_size: 15.0, max_size: 3.0 };
        assert_eq!(swapped.display_size(20.0), 10.0);
    }
}
