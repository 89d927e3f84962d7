pub mod errors;
pub mod parsers;
pub mod analysis;
pub mod utils;
