pub mod analytics;
pub mod field_classifier;
pub mod identity_cluster;
pub mod json_flattener;
pub mod record_merger;
pub mod rule_normalizer;
pub mod timestamp_parser;

pub use analytics::*;
pub use field_classifier::*;
pub use identity_cluster::*;
pub use json_flattener::*;
pub use record_merger::*;
pub use rule_normalizer::*;
pub use timestamp_parser::*;
