// Application layer - Use cases and ports
pub mod chart_registry;
pub mod dashboard_service;
pub mod history_repository;
pub mod live_updates;
pub mod range_sync;
pub mod reconciler;
