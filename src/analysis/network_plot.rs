use std::fs;
use std::io::Result;
use std::path::{Path, PathBuf};
use indexmap::IndexMap;
use plotly::{
    Plot, Layout, Scatter,
    common::{
        Title, Marker, Mode, Line, HoverInfo, Position as TextPosition
    },
    layout::Axis,
    color::NamedColor
};
use strum::IntoEnumIterator;
use crate::analysis::layout::{network_layout, Position};
use crate::analysis::network::{HerbNetwork, NodeCategory};
use crate::parsers::node_info::NodeInfo;

pub const PLOT_WIDTH: usize = 1200;
pub const PLOT_HEIGHT: usize = 1000;

fn category_color(category: NodeCategory) -> NamedColor {
    match category {
        NodeCategory::Prescription => NamedColor::Red,
        NodeCategory::Herb => NamedColor::Orange,
        NodeCategory::Gene => NamedColor::Green,
        NodeCategory::Pathway => NamedColor::Purple,
    }
}

fn hidden_axis() -> Axis {
    Axis::new()
        .show_grid(false)
        .zero_line(false)
        .visible(false)
}

pub fn network_title(prescription_name: &str) -> String {
    format!("{} Network Graph", prescription_name)
}

/// Edge segments as one line trace (gaps between segments), then one
/// marker trace per category so the legend reads by category.
pub fn build_network_plot(
    network: &HerbNetwork,
    positions: &IndexMap<String, Position>,
    title: &str,
) -> Plot {
    let mut plot = Plot::new();

    let mut edge_x: Vec<Option<f64>> = Vec::with_capacity(network.edge_count() * 3);
    let mut edge_y: Vec<Option<f64>> = Vec::with_capacity(network.edge_count() * 3);
    for (a, b, _) in network.edges() {
        if let (Some(&(x0, y0)), Some(&(x1, y1))) = (positions.get(a), positions.get(b)) {
            edge_x.extend([Some(x0), Some(x1), None]);
            edge_y.extend([Some(y0), Some(y1), None]);
        }
    }

    let edge_trace = Scatter::new(edge_x, edge_y)
        .mode(Mode::Lines)
        .line(Line::new().width(1.0).color(NamedColor::Gray))
        .hover_info(HoverInfo::None)
        .name("Edges");
    plot.add_trace(edge_trace);

    for category in NodeCategory::iter() {
        let nodes: Vec<_> = network
            .nodes()
            .filter(|node| node.category == category)
            .filter(|node| positions.contains_key(&node.id))
            .collect();
        if nodes.is_empty() {
            continue;
        }

        let xs: Vec<f64> = nodes.iter().map(|node| positions[&node.id].0).collect();
        let ys: Vec<f64> = nodes.iter().map(|node| positions[&node.id].1).collect();
        let labels: Vec<String> = nodes.iter().map(|node| node.id.clone()).collect();
        let sizes: Vec<usize> = nodes.iter().map(|node| node.size.round().max(1.0) as usize).collect();
        let info: Vec<String> = nodes
            .iter()
            .map(|node| {
                NodeInfo {
                    id: node.id.clone(),
                    label: node.id.clone(),
                    group: node.category,
                }
                .to_blob()
            })
            .collect();

        let node_trace = Scatter::new(xs, ys)
            .mode(Mode::MarkersText)
            .text_array(labels)
            .text_position(TextPosition::TopCenter)
            .hover_text_array(info)
            .hover_info(HoverInfo::Text)
            .marker(
                Marker::new()
                    .size_array(sizes)
                    .color(category_color(category))
                    .opacity(0.8),
            )
            .name(&category.to_string());
        plot.add_trace(node_trace);
    }

    let layout = Layout::new()
        .width(PLOT_WIDTH)
        .height(PLOT_HEIGHT)
        .show_legend(true)
        .title(Title::with_text(title))
        .x_axis(hidden_axis())
        .y_axis(hidden_axis());
    plot.set_layout(layout);

    plot
}

/// Lays out, renders and writes `<prescription>_network_graph.html` into `plots_dir`.
pub fn write_network_plot(
    network: &HerbNetwork,
    prescription_name: &str,
    plots_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(plots_dir)?;

    let positions = network_layout(network);
    let plot = build_network_plot(network, &positions, &network_title(prescription_name));

    let plot_path = plots_dir.join(format!("{}_network_graph.html", prescription_name));
    plot.write_html(&plot_path);
    Ok(plot_path)
}
