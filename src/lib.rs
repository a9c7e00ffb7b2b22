// Shared components
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod postgres;

// Chat core
pub mod chat;
pub mod gateway;
pub mod messaging;
pub mod presence;
pub mod room;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
pub mod telemetry;
