pub mod asset_store;
pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod material_info;
pub mod particles;
pub mod pipeline;
