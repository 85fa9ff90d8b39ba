//! Per-project, per-environment secret sharing for `.env` based projects.
//!
//! Secrets live in a relational store, scoped to a project and one of its
//! three environments (development, staging, production). This library keeps
//! that store and the local `.env` files in step, and derives committed
//! `.env.example` templates from the `.env` files.
//!
//! # Features
//!
//! - **Lenient parsing**: malformed lines are skipped, inline comments are kept apart
//! - **Share**: pushes every `.env` below a root and prunes keys no file defines
//! - **Grab**: writes stored secrets back into the `.env` of their location
//! - **Templates**: regenerates sorted `.env.example` files with blanked values
//! - **Optional tracing**: Detailed logging when the `tracing` feature is enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use secretbase::model::EnvironmentType;
//! use secretbase::session::{Session, SessionConfig};
//! use secretbase::sync::SecretSync;
//! use std::path::PathBuf;
//!
//! let session = Session::open(SessionConfig {
//!     database: Some(PathBuf::from("secrets.db")),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let sync = SecretSync::new(session.store(), "my-app", EnvironmentType::Staging).unwrap();
//! sync.grab(session.root()).unwrap();
//! ```

pub mod model;
pub mod parse;
pub mod render;
pub mod session;
pub mod store;
pub mod sync;
pub mod template;
pub mod walk;
