//! # protolift-core
//!
//! A library for reconstructing Protocol Buffer definitions from the Lua code
//! that protobuf runtimes generate to build their descriptor pools.
//!
//! This crate provides the core functionality for:
//! - Parsing generated `*_pb.lua` modules
//! - Reconstructing messages, enums, fields and cross-module imports
//! - Emitting human-readable `.proto` source files or descriptor sets
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`syntax`]: Lua front-end and module loading
//! - [`reconstruct`]: The reconstruction engine
//! - [`schema`]: The reconstructed schema model
//! - [`proto`]: `.proto` emission and descriptor export
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protolift_core::{proto, LuaSourceLoader, ProtoReconstructor};
//!
//! // Parse every Lua module in a directory
//! let loader = LuaSourceLoader::load("./lua/protos")?;
//!
//! // Reconstruct one module and everything it imports
//! let mut session = ProtoReconstructor::new(&loader);
//! session.reconstruct("person_pb")?;
//!
//! for file in session.files() {
//!     println!("{}", proto::render(file));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`ProtoWriter`]: Customize how schema elements are written
//! - [`SyntaxSource`]: Supply syntax trees from somewhere other than disk
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod proto;
pub mod reconstruct;
pub mod schema;
pub mod syntax;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use proto::{ProtoWriter, StatsWriter, WriterConfig};
pub use reconstruct::{Diagnostic, ProtoReconstructor, ReconstructorConfig};
pub use schema::{ProtoSyntax, SchemaFile};
pub use syntax::{LuaSourceLoader, SyntaxSource, SyntaxTree};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
