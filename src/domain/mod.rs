// Domain layer - Core business models
pub mod chart;
pub mod events;
pub mod location;
pub mod sample;
