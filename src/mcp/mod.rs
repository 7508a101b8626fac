//! MCP (Model Context Protocol) surface.
//!
//! Thin collaborator over the analysis core: [`tools`] defines the tool
//! parameter schemas and [`server`] routes each call to the pipeline under
//! the telemetry middleware.

pub mod server;
pub mod tools;

pub use server::SwiftLens;
