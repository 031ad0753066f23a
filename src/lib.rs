pub mod artifact;
pub mod config;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod normalize;
pub mod orchestrator;
pub mod source;
pub mod ui;
pub mod validate;
