use crate::app::ports::{SearchDocument, SearchPort};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: usize,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Elasticsearch over its REST API.
pub struct ElasticsearchSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl ElasticsearchSearch {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }
}

/// Newline-delimited index actions for the bulk endpoint.
pub(crate) fn bulk_body(index: &str, documents: &[SearchDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.body)?);
        body.push('\n');
    }
    Ok(body)
}

async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Err(PipelineError::Backend(format!("{} returned {}: {}", what, status, text)))
}

#[async_trait]
impl SearchPort for ElasticsearchSearch {
    fn service_name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn create_index(&self, name: &str, shards: Option<u32>, replicas: Option<u32>) -> Result<()> {
        let exists = self.client.head(self.url(name)).send().await?;
        if exists.status() == StatusCode::OK {
            return Ok(());
        }
        let mut settings = serde_json::Map::new();
        if let Some(shards) = shards {
            settings.insert("number_of_shards".into(), json!(shards));
        }
        if let Some(replicas) = replicas {
            settings.insert("number_of_replicas".into(), json!(replicas));
        }
        let resp = self
            .client
            .put(self.url(name))
            .json(&json!({ "settings": settings }))
            .send()
            .await?;
        // Lost a creation race with another indexer.
        if resp.status() == StatusCode::BAD_REQUEST {
            warn!("Index '{}' creation rejected, assuming it already exists", name);
            return Ok(());
        }
        check(resp, "index creation").await?;
        info!("Created search index '{}'", name);
        Ok(())
    }

    async fn delete_all_documents(&self, name: &str) -> Result<usize> {
        let resp = self
            .client
            .post(self.url(&format!("{}/_delete_by_query?refresh=true", name)))
            .json(&json!({ "query": { "match_all": {} } }))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let deleted: DeleteByQueryResponse = check(resp, "delete by query").await?.json().await?;
        Ok(deleted.deleted)
    }

    async fn index_documents(&self, name: &str, documents: Vec<SearchDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let body = bulk_body(name, &documents)?;
        debug!("Bulk indexing {} documents into '{}'", documents.len(), name);
        let resp = self
            .client
            .post(self.url("_bulk?refresh=true"))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let bulk: BulkResponse = check(resp, "bulk index").await?.json().await?;
        if bulk.errors {
            return Err(PipelineError::Backend(format!(
                "bulk index into '{}' reported item errors ({} items)",
                name,
                bulk.items.len()
            )));
        }
        Ok(documents.len())
    }

    async fn count_documents(&self, name: &str) -> Result<usize> {
        let resp = self.client.get(self.url(&format!("{}/_count", name))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let count: CountResponse = check(resp, "count").await?.json().await?;
        Ok(count.count)
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn bulk_body_is_action_then_source() {
        let mut body = Map::new();
        body.insert("iri".into(), json!("http://ex.org/A"));
        let docs = vec![SearchDocument { id: "v1".into(), body }];
        let ndjson = bulk_body("ontopop-1", &docs).unwrap();
        let lines: Vec<&str> = ndjson.lines().collect();
        assert_eq!(lines.len(), 2);
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "ontopop-1");
        assert_eq!(action["index"]["_id"], "v1");
        assert!(ndjson.ends_with('\n'));
    }
}
