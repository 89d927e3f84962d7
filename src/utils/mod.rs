pub mod config;
pub mod fetch;
pub mod download;
pub mod gene_mapping;
pub mod control_panel;
pub mod sessions;
