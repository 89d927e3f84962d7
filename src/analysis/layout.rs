//! Category shell layout, the same placement as networkx `shell_layout`
//! with its defaults: shell `i` of `n` has radius `scale * (i + 1) / n`
//! (radius 0 when the first shell holds one node), nodes are evenly spaced
//! starting at angle `(i + 1) * PI / n`, and the layout is centred on the origin.

use std::f64::consts::PI;
use indexmap::IndexMap;
use strum::IntoEnumIterator;
use crate::analysis::network::{HerbNetwork, NodeCategory};

pub type Position = (f64, f64);

/// Node ids grouped by category, prescription shell first, empty shells dropped.
pub fn category_shells(network: &HerbNetwork) -> Vec<Vec<&str>> {
    NodeCategory::iter()
        .map(|category| {
            network
                .nodes()
                .filter(|node| node.category == category)
                .map(|node| node.id.as_str())
                .collect::<Vec<&str>>()
        })
        .filter(|shell| !shell.is_empty())
        .collect()
}

/// Concentric shells of radius `scale * (i + 1) / shells`, each rotated a
/// little further than the previous one. A lone node in the first shell
/// sits at the centre.
pub fn shell_layout(shells: &[Vec<&str>], scale: f64) -> IndexMap<String, Position> {
    let mut positions = IndexMap::new();
    if shells.is_empty() {
        return positions;
    }

    let radius_bump = scale / shells.len() as f64;
    let mut radius = if shells[0].len() == 1 { 0.0 } else { radius_bump };
    let rotate = PI / shells.len() as f64;
    let mut first_theta = rotate;

    for shell in shells {
        let count = shell.len() as f64;
        for (i, &id) in shell.iter().enumerate() {
            let theta = 2.0 * PI * i as f64 / count + first_theta;
            positions.insert(id.to_string(), (radius * theta.cos(), radius * theta.sin()));
        }
        radius += radius_bump;
        first_theta += rotate;
    }
    positions
}

pub fn network_layout(network: &HerbNetwork) -> IndexMap<String, Position> {
    shell_layout(&category_shells(network), 1.0)
}
