// =============================================================================
// HTTP / WebSocket surface for the dashboard
// =============================================================================

pub mod rest;
pub mod ws;

pub use rest::router;
