use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use plotly::{
    Plot, Layout, Scatter,
    common::{
        Title, Font,
        ColorScale, ColorScalePalette,
        Marker, ColorBar, Anchor, Side,
        ThicknessMode, Mode, Position
    },
    layout::{
        Axis, Margin,
        DragMode
    },
    color::{
        NamedColor
    }
};
use textwrap::wrap;
use crate::analysis::gsea::{EnrichmentTerm, GeneSetCategory};
use crate::analysis::write_results::sort_terms;

pub const TOP_TERMS: usize = 15;
const LABEL_WIDTH: usize = 40;
const MIN_MARKER: f64 = 6.0;
const MAX_MARKER: f64 = 24.0;

#[derive(Debug, Clone, Default)]
pub struct DotPlotData {
    pub term_names: Vec<String>,
    pub nes: Vec<f64>,
    pub stat_sig: Vec<f64>,
    pub marker_sizes: Vec<usize>,
}

fn wrap_text(
    text: &str,
    width: usize
) -> String {
    wrap(text, width).join("<br>")
}

/// FDR of exactly zero is clamped to the smallest positive double before
/// taking the log.
pub fn neg_log10(value: f64) -> f64 {
    -value.max(f64::from_bits(1)).log10()
}

/// Top terms by FDR.
pub fn prepare_dot_plot(terms: &[EnrichmentTerm], top: usize) -> DotPlotData {
    let mut ranked: Vec<EnrichmentTerm> = terms
        .iter()
        .filter(|term| term.nes.is_finite() && !term.fdr.is_nan())
        .cloned()
        .collect();
    sort_terms(&mut ranked);
    ranked.truncate(top);

    let largest = ranked.iter().map(|term| term.gene_set_size).max().unwrap_or(0).max(1) as f64;

    let mut data = DotPlotData::default();
    for term in &ranked {
        data.term_names.push(wrap_text(&term.term, LABEL_WIDTH));
        data.nes.push(term.nes);
        data.stat_sig.push(neg_log10(term.fdr));
        let size = MIN_MARKER + (MAX_MARKER - MIN_MARKER) * term.gene_set_size as f64 / largest;
        data.marker_sizes.push(size.round() as usize);
    }
    data
}

pub fn dot_plot(data: DotPlotData, title: &str) -> Plot {
    let color_bar = ColorBar::new()
        .title(
            Title::from("-log10(FDR)")
                .side(Side::Right)
                .font(Font::new().size(12)),
        )
        .tick_font(Font::new().size(10))
        .len_mode(ThicknessMode::Pixels)
        .len(200)
        .thickness(15)
        .x(1.0)
        .y(0.9)
        .y_anchor(Anchor::Middle);

    let marker = Marker::new()
        .size_array(data.marker_sizes)
        .color_array(data.stat_sig.clone())
        .color_scale(ColorScale::Palette(ColorScalePalette::Viridis))
        .color_bar(color_bar)
        .show_scale(true);

    let scatter_trace = Scatter::new(data.nes, data.stat_sig)
        .mode(Mode::MarkersText)
        .text_array(data.term_names)
        .text_position(Position::TopCenter)
        .text_font(Font::new().size(9))
        .marker(marker)
        .show_legend(false);

    let mut plot = Plot::new();
    plot.add_trace(scatter_trace);

    let layout = Layout::new()
        .title(Title::with_text(title))
        .width(900)
        .height(720)
        .margin(Margin::new()
            .left(60)
            .right(0)
            .top(50)
            .bottom(40))
        .x_axis(
            Axis::new()
                .title(Title::with_text("NES").font(Font::new().size(12)))
                .tick_font(Font::new().size(10))
                .show_line(true)
                .line_color(NamedColor::Black)
                .show_grid(true)
                .grid_color("rgba(0,0,0,0.05)")
                .show_tick_labels(true)
                .auto_margin(true),
        )
        .y_axis(
            Axis::new()
                .title(Title::with_text("-log10(FDR)").font(Font::new().size(12)))
                .tick_font(Font::new().size(10))
                .show_line(true)
                .line_color(NamedColor::Black)
                .show_grid(true)
                .grid_color("rgba(0,0,0,0.05)")
                .show_tick_labels(true)
                .auto_margin(true),
        )
        .drag_mode(DragMode::False);
    plot.set_layout(layout);
    plot
}

pub fn dot_plot_file_name(category: GeneSetCategory) -> String {
    format!("plot_{}_dotplot.html", category.slug())
}

/// Enrichment score plot of the category's top term, as drawn by the runner.
pub fn gsea_plot_file_name(category: GeneSetCategory) -> String {
    format!("plot_{}_gseaplot.png", category.slug())
}

/// Writes `plot_<category>_dotplot.html`. Nothing is written when no
/// term has a usable score.
pub fn write_dot_plot(
    terms: &[EnrichmentTerm],
    category: GeneSetCategory,
    plots_dir: &Path,
) -> io::Result<Option<PathBuf>> {
    let data = prepare_dot_plot(terms, TOP_TERMS);
    if data.term_names.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(plots_dir)?;
    let plot = dot_plot(data, category.plot_title());
    let plot_name_path = plots_dir.join(dot_plot_file_name(category));
    plot.write_html(&plot_name_path);
    Ok(Some(plot_name_path))
}
