//! AIOS Gateway - REST surface over the line-fixing coordinator

pub mod server;

pub use server::{router, serve, AppState, ProcessRequest};
