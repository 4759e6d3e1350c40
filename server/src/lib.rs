//! HTTP surface for the IdeaBlock auto-distillation service.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;

pub use app::{create_router, AppState};
