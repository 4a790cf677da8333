use super::GraphDb;
use crate::error::{ AppError, Result };
use log::{ error, info, warn };
use std::path::Path;

/// A graph with no more than this many nodes is considered empty.
const EMPTY_GRAPH_THRESHOLD: u64 = 2;

/// Splits a Cypher script on `;`, dropping blank statements and `//` comment lines.
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("//"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Runs every statement of the script, returning how many succeeded.
pub async fn import_graph_data(db: &GraphDb, path: &Path) -> Result<usize> {
    let script = tokio::fs
        ::read_to_string(path).await
        .map_err(|e| AppError::Config(format!("Seed file '{}' could not be read: {}", path.display(), e)))?;
    let mut success_count = 0;
    for statement in split_statements(&script) {
        match db.execute(&statement, serde_json::json!({})).await {
            Ok(_) => {
                success_count += 1;
            }
            Err(e) => error!("Error executing seed statement: {}", e),
        }
    }
    info!("Successfully executed {} seed statements", success_count);
    Ok(success_count)
}

/// Loads the seed script when the graph is (nearly) empty. Returns whether seeding ran.
pub async fn ensure_seeded(db: &GraphDb, path: &Path) -> Result<bool> {
    let count = db.count_nodes().await?;
    if count > EMPTY_GRAPH_THRESHOLD {
        info!("Knowledge graph already contains {} nodes. Skipping initialization.", count);
        return Ok(false);
    }
    if !path.exists() {
        warn!("Seed file not found at {}", path.display());
        return Ok(false);
    }
    info!("Knowledge graph is empty. Loading sample data from {}", path.display());
    let executed = import_graph_data(db, path).await?;
    if executed == 0 {
        error!("Failed to initialize knowledge graph with sample data.");
    }
    Ok(executed > 0)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{ db_for, empty_tx };
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    const SCRIPT: &str =
        "// proteins\nCREATE (:Protein {id: 'P04637', name: 'TP53'});\n\n  ;\nCREATE (:Protein {id: 'Q00987', name: 'MDM2'});\n";

    #[test]
    fn splits_and_drops_blank_statements() {
        let statements = split_statements(SCRIPT);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE (:Protein {id: 'P04637'"));
    }

    #[tokio::test]
    async fn seeds_empty_graph() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit").body_contains("count(n)");
            then.status(200).json_body(
                json!({"results": [{"columns": ["count"], "data": [{"row": [0]}]}], "errors": []})
            );
        }).await;
        let creates = server.mock_async(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit").body_contains("CREATE");
            then.status(200).json_body(empty_tx());
        }).await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let seeded = ensure_seeded(&db_for(&server), file.path()).await.unwrap();
        assert!(seeded);
        creates.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn skips_populated_graph() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit");
            then.status(200).json_body(
                json!({"results": [{"columns": ["count"], "data": [{"row": [42]}]}], "errors": []})
            );
        }).await;
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!ensure_seeded(&db_for(&server), file.path()).await.unwrap());
    }
}
