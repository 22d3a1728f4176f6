pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod gross;
pub mod model;
pub mod predictor;
pub mod productivity;
pub mod record;
pub mod revenue;
pub mod segment;
pub mod sensitivity;
pub mod store;
pub mod triage;
pub mod types;
