pub mod data_models;
pub mod frame_export;

pub use data_models::*;
