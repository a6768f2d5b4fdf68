pub mod analysis;
pub mod graph_utils;
pub mod gui;
pub mod model_client;
pub mod persistence;
pub mod session;
