//! # sqlscribe — schema-aware SQL authoring
//!
//! > **Stop guessing column names. Ask the model.**
//!
//! sqlscribe opens an SSH tunnel to a production MySQL database,
//! introspects a fixed allow-list of tables, and asks a chat-completions
//! model to translate the built-in receiving-report question into SQL.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqlscribe::prelude::*;
//!
//! let config = Config::load(None, overrides)?;
//! let client = OpenAiClient::new(config.model.clone())?;
//!
//! // Tunnel in, read the schema, generate the query.
//! let output = sqlscribe::report::run(&config, &client, false).await?;
//! println!("{}", output.sql);
//! ```
//!
//! The generated SQL is printed, not executed, unless the caller opts in
//! with the execute flag.

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod report;
pub mod tunnel;

pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, ModelConfig, Overrides, TunnelConfig};
    pub use crate::db::{mysql_url, Record, SchemaDb};
    pub use crate::error::{ScribeError, ScribeResult};
    pub use crate::llm::{OpenAiClient, SqlGenerator};
    pub use crate::prompt::{PromptTemplate, BUSINESS_QUESTION, REPORT_TABLES, STOP_SEQUENCE};
    pub use crate::report::ReportOutput;
    pub use crate::tunnel::SshTunnel;
}
