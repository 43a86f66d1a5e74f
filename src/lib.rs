//! Databricks SQL assistant: shared library for the stdio server and the CLI.
//!
//! A question in plain English flows through [`keywords`] extraction,
//! [`discovery`] of the relevant Unity Catalog tables, [`sql`] resolution
//! through a generative model, and [`execution`] on a SQL warehouse.
//! [`assistant::Assistant`] ties these together behind the operations that
//! [`rpc`] and [`server`] expose.

pub mod assistant;
pub mod catalog;
pub mod client;
pub mod config;
pub mod databricks;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod format;
pub mod keywords;
pub mod llm;
pub mod params;
pub mod rpc;
pub mod server;
pub mod sql;
pub mod warehouse;
