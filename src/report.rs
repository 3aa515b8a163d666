//! The receiving-report pipeline.
//!
//! One run: open the tunnel, connect through it, introspect the
//! allow-listed tables, render the prompt, ask the model for SQL, and
//! optionally execute the result. Resources are torn down explicitly at
//! the end of the happy path; error paths fall back to the tunnel's
//! `Drop` cleanup.

use tracing::{info, warn};

use crate::config::Config;
use crate::db::{mysql_url, Record, SchemaDb};
use crate::error::ScribeResult;
use crate::llm::SqlGenerator;
use crate::prompt::{PromptTemplate, BUSINESS_QUESTION};
use crate::tunnel::SshTunnel;

/// Result of a pipeline run.
#[derive(Debug)]
pub struct ReportOutput {
    /// The generated SQL text, cleaned.
    pub sql: String,
    /// Result rows when the caller asked for execution.
    pub rows: Option<Vec<Record>>,
}

/// A tunnel plus a database connection riding it.
struct DbSession {
    tunnel: SshTunnel,
    db: SchemaDb,
}

impl DbSession {
    async fn open(config: &Config) -> ScribeResult<Self> {
        let tunnel = SshTunnel::open(
            &config.tunnel,
            (config.database.host.as_str(), config.database.port),
        )?;
        let url = mysql_url(&config.database, tunnel.local_port())?;
        let db = SchemaDb::connect(&url).await?;
        info!("connected to database through tunnel");
        Ok(Self { tunnel, db })
    }

    /// Explicit teardown. Close failures are logged, not propagated: a run
    /// that already produced output should not fail on cleanup.
    async fn close(self) {
        self.db.close().await;
        if let Err(e) = self.tunnel.close() {
            warn!(error = %e, "failed to close ssh tunnel");
        }
    }
}

/// Render the built-in prompt for `schema` and ask the generator for SQL.
pub async fn generate_sql(schema: &str, generator: &dyn SqlGenerator) -> ScribeResult<String> {
    let prompt = PromptTemplate::sql_generation().render(schema, BUSINESS_QUESTION);
    generator.generate(&prompt).await
}

/// Run the full pipeline.
pub async fn run(
    config: &Config,
    generator: &dyn SqlGenerator,
    execute: bool,
) -> ScribeResult<ReportOutput> {
    let session = DbSession::open(config).await?;

    let result = async {
        let schema = session.db.table_info(&config.tables).await?;
        let sql = generate_sql(&schema, generator).await?;
        let rows = if execute {
            Some(session.db.run_query(&sql).await?)
        } else {
            None
        };
        Ok(ReportOutput { sql, rows })
    }
    .await;

    session.close().await;
    result
}

/// Introspect the allow-listed tables and return the schema text.
pub async fn introspect(config: &Config) -> ScribeResult<String> {
    let session = DbSession::open(config).await?;
    let result = session.db.table_info(&config.tables).await;
    session.close().await;
    result
}

/// Introspect and return the fully rendered prompt without calling the
/// model.
pub async fn rendered_prompt(config: &Config) -> ScribeResult<String> {
    let schema = introspect(config).await?;
    Ok(PromptTemplate::sql_generation().render(&schema, BUSINESS_QUESTION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScribeError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned response and records every prompt it sees.
    struct MockGenerator {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl MockGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SqlGenerator for MockGenerator {
        async fn generate(&self, prompt: &str) -> ScribeResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl SqlGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> ScribeResult<String> {
            Err(ScribeError::Model("rate limited".to_string()))
        }
    }

    #[tokio::test]
    async fn test_generate_sql_returns_mock_response_unchanged() {
        let mock = MockGenerator::new("SELECT po.name FROM `tabPurchase Order` po");
        let sql = generate_sql("CREATE TABLE `tabPurchase Order` (...)", &mock)
            .await
            .unwrap();
        assert_eq!(sql, "SELECT po.name FROM `tabPurchase Order` po");
    }

    #[tokio::test]
    async fn test_generate_sql_renders_prompt_once_with_both_parts() {
        let mock = MockGenerator::new("SELECT 1");
        let schema = "CREATE TABLE `tabBatch` (`name` varchar(140))";
        generate_sql(schema, &mock).await.unwrap();

        let prompts = mock.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(schema));
        assert!(prompts[0].contains(BUSINESS_QUESTION));
        assert!(prompts[0].ends_with("SQL Query:"));
    }

    #[tokio::test]
    async fn test_generate_sql_propagates_model_errors() {
        let err = generate_sql("schema", &FailingGenerator).await.unwrap_err();
        assert!(matches!(err, ScribeError::Model(_)));
    }
}
