//! API module - REST handlers and HTML pages

pub mod rest;
pub mod dto;
pub mod html;

pub use rest::{create_rest_router, AppState};
