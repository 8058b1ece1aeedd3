//! HTTP client for a remote graph analytics service
//!
//! The service receives the undirected projection, runs Leiden, Louvain and
//! label propagation in that order on its side and answers with the first
//! partition it could compute:
//!
//! ```text
//! POST {base_url}/communities
//! {"orientation": "UNDIRECTED", "algorithms": [...], "seed": 42,
//!  "nodes": [{"nodeId": 0, "entityId": "..."}],
//!  "relationships": [{"source": 0, "target": 1, "weight": 1.0}]}
//!
//! 200 {"algorithm": "leiden",
//!      "communities": [{"nodeId": 17, "communityId": 3}],
//!      "nodeProperties": [{"nodeId": 17, "entityId": "..."}]}
//! ```
//!
//! Node ids in the answer are the service's own; they are mapped back to
//! entities through `nodeProperties`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::community::{CommunityAlgorithm, Detection, GraphProjection, LocalAlgorithm};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionRequest<'a> {
    orientation: &'static str,
    algorithms: Vec<&'static str>,
    seed: u64,
    nodes: Vec<RequestNode<'a>>,
    relationships: Vec<RequestRelationship>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestNode<'a> {
    node_id: usize,
    entity_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestRelationship {
    source: usize,
    target: usize,
    weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommunityResponse {
    algorithm: String,
    communities: Vec<NodeCommunity>,
    #[serde(default)]
    node_properties: Vec<NodeProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeCommunity {
    node_id: i64,
    community_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeProperty {
    node_id: i64,
    entity_id: String,
}

/// Remote analytics tier
pub struct RemoteAnalytics {
    http_client: HttpClient,
    base_url: String,
    seed: u64,
}

impl RemoteAnalytics {
    pub fn new(base_url: impl Into<String>, timeout: Duration, seed: u64) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            seed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request<'a>(&self, projection: &'a GraphProjection) -> ProjectionRequest<'a> {
        ProjectionRequest {
            orientation: "UNDIRECTED",
            algorithms: LocalAlgorithm::ALL.iter().map(|a| a.as_str()).collect(),
            seed: self.seed,
            nodes: projection
                .nodes()
                .iter()
                .enumerate()
                .map(|(node_id, entity_id)| RequestNode { node_id, entity_id })
                .collect(),
            relationships: projection
                .edges()
                .into_iter()
                .map(|(source, target, weight)| RequestRelationship {
                    source,
                    target,
                    weight,
                })
                .collect(),
        }
    }
}

/// Map the service's answer back onto entity ids
///
/// Assignments whose node id has no property, or whose entity is not part
/// of the projection, are skipped.
fn map_response(projection: &GraphProjection, response: CommunityResponse) -> Result<Detection> {
    let entity_of: HashMap<i64, String> = response
        .node_properties
        .into_iter()
        .map(|p| (p.node_id, p.entity_id))
        .collect();

    let mut members: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut unmapped = 0usize;
    for assignment in response.communities {
        match entity_of.get(&assignment.node_id) {
            Some(entity_id) if projection.node_index(entity_id).is_some() => {
                members
                    .entry(assignment.community_id)
                    .or_default()
                    .push(entity_id.clone());
            }
            _ => unmapped += 1,
        }
    }

    if unmapped > 0 {
        debug!(unmapped, "Skipped community assignments without a known entity");
    }
    if members.is_empty() && !projection.is_empty() {
        return Err(Error::CommunityDetectionFailed(format!(
            "{} returned no usable assignments",
            response.algorithm
        )));
    }

    Ok(Detection {
        algorithm: format!("remote:{}", response.algorithm),
        groups: members.into_values().collect(),
    })
}

#[async_trait]
impl CommunityAlgorithm for RemoteAnalytics {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect(&self, projection: &GraphProjection) -> Result<Detection> {
        let url = format!("{}/communities", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&self.request(projection))
            .send()
            .await
            .map_err(|e| Error::AnalyticsUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AnalyticsUnavailable(format!(
                "analytics service returned {}",
                status
            )));
        }

        let body: CommunityResponse = response
            .json()
            .await
            .map_err(|e| Error::CommunityDetectionFailed(format!("invalid response: {}", e)))?;

        let detection = map_response(projection, body)?;
        info!(
            algorithm = %detection.algorithm,
            groups = detection.groups.len(),
            "Remote community detection finished"
        );
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn triangle() -> GraphProjection {
        let mut projection = GraphProjection::new();
        for id in ["a", "b", "c", "d"] {
            projection.add_node(id);
        }
        projection.add_edge("a", "b");
        projection.add_edge("b", "c");
        projection.add_edge("c", "a");
        projection
    }

    /// Serve one HTTP response after reading the full request
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_request_shape() {
        let projection = triangle();
        let client = RemoteAnalytics::new("http://analytics:8080/", Duration::from_secs(1), 7).unwrap();
        assert_eq!(client.base_url(), "http://analytics:8080");

        let json = serde_json::to_value(client.request(&projection)).unwrap();
        assert_eq!(json["orientation"], "UNDIRECTED");
        assert_eq!(json["algorithms"][0], "leiden");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["nodes"][3]["entityId"], "d");
        assert_eq!(json["relationships"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_map_response_uses_node_properties() {
        let projection = triangle();
        let response: CommunityResponse = serde_json::from_str(
            r#"{
                "algorithm": "louvain",
                "communities": [
                    {"nodeId": 10, "communityId": 1},
                    {"nodeId": 11, "communityId": 1},
                    {"nodeId": 12, "communityId": 1},
                    {"nodeId": 13, "communityId": 2},
                    {"nodeId": 99, "communityId": 2}
                ],
                "nodeProperties": [
                    {"nodeId": 10, "entityId": "a"},
                    {"nodeId": 11, "entityId": "b"},
                    {"nodeId": 12, "entityId": "c"},
                    {"nodeId": 13, "entityId": "d"}
                ]
            }"#,
        )
        .unwrap();

        let detection = map_response(&projection, response).unwrap();
        assert_eq!(detection.algorithm, "remote:louvain");
        assert_eq!(detection.groups, vec![vec!["a", "b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_map_response_without_properties_fails() {
        let projection = triangle();
        let response: CommunityResponse = serde_json::from_str(
            r#"{"algorithm": "leiden", "communities": [{"nodeId": 0, "communityId": 1}]}"#,
        )
        .unwrap();
        assert!(matches!(
            map_response(&projection, response),
            Err(Error::CommunityDetectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_detect_against_service() {
        let base_url = serve_once(
            r#"{"algorithm":"leiden","communities":[{"nodeId":0,"communityId":4},{"nodeId":1,"communityId":4}],"nodeProperties":[{"nodeId":0,"entityId":"a"},{"nodeId":1,"entityId":"b"}]}"#,
        )
        .await;
        let client = RemoteAnalytics::new(base_url, Duration::from_secs(5), 42).unwrap();

        let detection = client.detect(&triangle()).await.unwrap();
        assert_eq!(detection.algorithm, "remote:leiden");
        assert_eq!(detection.groups, vec![vec!["a", "b"]]);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = RemoteAnalytics::new("http://127.0.0.1:1", Duration::from_secs(2), 42).unwrap();
        let err = client.detect(&triangle()).await.unwrap_err();
        assert!(matches!(err, Error::AnalyticsUnavailable(_)));
    }
}
