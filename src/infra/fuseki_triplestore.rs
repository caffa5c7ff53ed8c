use crate::app::ports::TriplestorePort;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const RDF_XML: &str = "application/rdf+xml";

/// Apache Jena Fuseki over its admin and graph store HTTP protocols. Each
/// ontology gets a TDB2 dataset named after its id.
pub struct FusekiTriplestore {
    client: reqwest::Client,
    endpoint: String,
}

impl FusekiTriplestore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_dataset(&self, ontology_id: i64) -> Result<()> {
        if self.has_ontology(ontology_id).await? {
            return Ok(());
        }
        let url = format!("{}/$/datasets", self.endpoint);
        let db_name = ontology_id.to_string();
        let resp = self
            .client
            .post(&url)
            .form(&[("dbName", db_name.as_str()), ("dbType", "tdb2")])
            .send()
            .await?;
        // 409 means another loader created it first.
        if !resp.status().is_success() && resp.status() != StatusCode::CONFLICT {
            return Err(PipelineError::Backend(format!(
                "Fuseki dataset creation for {} returned {}",
                ontology_id,
                resp.status()
            )));
        }
        info!("Created Fuseki dataset {}", ontology_id);
        Ok(())
    }
}

#[async_trait]
impl TriplestorePort for FusekiTriplestore {
    fn service_name(&self) -> &'static str {
        "fuseki"
    }

    async fn load_ontology_owl_rdf_xml(&self, ontology_id: i64, owl_path: &Path) -> Result<()> {
        self.ensure_dataset(ontology_id).await?;
        let body = tokio::fs::read(owl_path).await?;
        let url = format!("{}/{}/data", self.endpoint, ontology_id);
        debug!("PUT {} ({} bytes)", url, body.len());
        let resp = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, RDF_XML)
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Backend(format!(
                "Fuseki load of ontology {} returned {}",
                ontology_id,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn has_ontology(&self, ontology_id: i64) -> Result<bool> {
        let url = format!("{}/$/datasets/{}", self.endpoint, ontology_id);
        let resp = self.client.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(PipelineError::Backend(format!(
                "Fuseki dataset lookup for {} returned {}",
                ontology_id, status
            ))),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_normalised() {
        let store = FusekiTriplestore::new("http://localhost:3030/", Duration::from_secs(5)).unwrap();
        assert_eq!(store.endpoint, "http://localhost:3030");
        assert_eq!(store.service_name(), "fuseki");
    }
}
