//! Lists the tables and image columns of every configured base.

use crate::config::Config;
use crate::format::{BaseTables, Formatter};
use crate::http::RetryPolicy;
use crate::table::{TableApi, TableClient};
use anyhow::{Context, Result};
use tracing::info;

/// Executes the `tables` workflow.
pub struct TablesCommand {
    config: Config,
}

impl TablesCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<String> {
        let retry = RetryPolicy::new(self.config.table.max_retries, self.config.table.backoff_factor_ms);
        let mut clients = Vec::new();

        for base in &self.config.table.bases {
            let client = TableClient::connect(&self.config.table.server_url, &base.token, retry.clone())
                .await
                .with_context(|| format!("Failed to connect to base {}", base.name.as_deref().unwrap_or("(unnamed)")))?;
            clients.push(client.with_name(base.name.clone()));
        }

        let apis: Vec<&dyn TableApi> = clients.iter().map(|c| c as &dyn TableApi).collect();
        let bases = self.execute_with_clients(&apis).await?;
        Ok(Formatter::new(self.config.format).format_tables(&bases))
    }

    /// Reads metadata through the given clients (for testing).
    pub async fn execute_with_clients(&self, apis: &[&dyn TableApi]) -> Result<Vec<BaseTables>> {
        let mut bases = Vec::with_capacity(apis.len());
        for api in apis {
            let metadata = api.metadata().await?;
            info!("Base {}: {} tables", api.base_name(), metadata.tables.len());
            bases.push(BaseTables { base: api.base_name().to_string(), tables: metadata.tables });
        }
        Ok(bases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::table::{Metadata, Row};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    struct MockBase {
        metadata: Value,
    }

    #[async_trait]
    impl TableApi for MockBase {
        fn base_name(&self) -> &str {
            "Catalog"
        }

        async fn metadata(&self) -> Result<Metadata> {
            Ok(serde_json::from_value(self.metadata.clone())?)
        }

        async fn list_rows(&self, _table: &str, _start: usize, _limit: usize) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn get_row(&self, _table: &str, _row_id: &str) -> Result<Row> {
            anyhow::bail!("unused")
        }

        async fn update_row(&self, _table: &str, _row_id: &str, _values: Map<String, Value>) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn upload_asset(&self, _bytes: Vec<u8>, _file_name: &str) -> Result<String> {
            anyhow::bail!("unused")
        }
    }

    #[tokio::test]
    async fn test_tables_lists_image_columns() {
        let base = MockBase {
            metadata: json!({"tables": [{
                "_id": "0000",
                "name": "Products",
                "columns": [
                    {"key": "0000", "name": "Name", "type": "text"},
                    {"key": "1111", "name": "产品图片", "type": "image"},
                    {"key": "2222", "name": "Notes", "type": "long-text"},
                    {"key": "3333", "name": "Price", "type": "number"}
                ]
            }]}),
        };

        let cmd = TablesCommand::new(Config::default());
        let bases = cmd.execute_with_clients(&[&base]).await.unwrap();
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].base, "Catalog");

        let table = &bases[0].tables[0];
        let images: Vec<_> = table.image_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(images, vec!["产品图片"]);

        let output = Formatter::new(OutputFormat::Table).format_tables(&bases);
        assert!(output.contains("Products (4 columns)"));
        assert!(output.contains("产品图片"));
    }

    #[tokio::test]
    async fn test_tables_without_bases() {
        let cmd = TablesCommand::new(Config::default());
        let bases = cmd.execute_with_clients(&[]).await.unwrap();
        assert_eq!(Formatter::new(OutputFormat::Json).format_tables(&bases), "[]");
    }
}
