pub mod table;
pub mod herb_parser;
pub mod pathway_parser;
pub mod lookup_parser;
pub mod node_info;
