//! External text-generation (LLM) collaborator.
//!
//! The engine only depends on the [`EnrichmentClient`] trait: one prompt in,
//! free-text (hopefully JSON-shaped) text out. The live Gemini-style client is
//! behind the `live-providers` feature; everything that consumes enrichment
//! has a deterministic local fallback and must keep working when no client is
//! configured.

use crate::error::EnrichmentError;
use crate::geo::cluster_spread;
use crate::model::HelpRequest;

/// Timeout for a single enrichment call.
pub const ENRICHMENT_TIMEOUT_SECS: u64 = 20;

/// Trait for enrichment backends. `Send + Sync` so a client can be shared
/// across engine operations.
pub trait EnrichmentClient: Send + Sync {
    /// Run one prompt and return the raw response text.
    fn generate(&self, prompt: &str) -> Result<String, EnrichmentError>;
}

/// Extract the first-`{`-to-last-`}` JSON blob from a free-text response.
///
/// Enrichment models wrap JSON in prose or code fences more often than not;
/// this mirrors the lenient extraction the aggregation contract expects.
pub fn extract_json_blob(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// ---------------------------------------------------------------------------
// Prompt builders
// ---------------------------------------------------------------------------

/// Prompt asking the model to aggregate and prioritize open requests.
///
/// Requests are referenced by zero-based index; the response contract asks for
/// index lists so the caller can map them back to request ids.
pub fn aggregation_prompt(requests: &[HelpRequest]) -> String {
    let mut prompt = String::from(
        "You are an emergency coordination AI. Analyze these disaster help \
         requests and prioritize them.\n\n",
    );

    for (idx, req) in requests.iter().enumerate() {
        prompt.push_str(&format!(
            "Request {idx}:\n- Location: ({:.5}, {:.5})\n- Type: {:?}\n- Description: {}\n\
             - People affected: {}\n- Injuries: {:?}\n- Accessibility: {:?}\n- Reported at: {}\n\n",
            req.location.lat(),
            req.location.lng(),
            req.hazard,
            if req.description.is_empty() {
                "no description"
            } else {
                &req.description
            },
            req.people_affected,
            req.injury_level,
            req.accessibility,
            req.created_at.to_rfc3339(),
        ));
    }

    prompt.push_str(
        "For each group of requests that can be served together:\n\
         1. Assign an urgency score (1-10, 10 most urgent)\n\
         2. Classify as CRITICAL, HIGH, MEDIUM, or LOW\n\
         3. Suggest required resources\n\
         4. Group nearby requests\n\n\
         Respond in JSON:\n\
         {\"aggregated\": [{\"requestIds\": [indices], \"priority\": \"CRITICAL|HIGH|MEDIUM|LOW\", \
         \"urgencyScore\": number, \"combinedDescription\": \"string\", \
         \"centroidLocation\": {\"lat\": number, \"lng\": number}, \
         \"requiredResources\": [\"string\"], \"estimatedVictimsCount\": number, \
         \"recommendedAction\": \"string\"}], \"summary\": \"string\"}",
    );

    prompt
}

/// Prompt asking for response suggestions for one request in context.
pub fn context_prompt(request: &HelpRequest, nearby: &[HelpRequest]) -> String {
    let mut prompt = format!(
        "Analyze this disaster help request and nearby requests, then suggest \
         the optimal response.\n\nMain request:\n- Type: {:?}\n- Description: {}\n\
         - Location: ({:.5}, {:.5})\n- People affected: {}\n- Injury level: {:?}\n\n\
         Nearby requests ({}):\n",
        request.hazard,
        request.description,
        request.location.lat(),
        request.location.lng(),
        request.people_affected,
        request.injury_level,
        nearby.len(),
    );

    for (i, r) in nearby.iter().enumerate() {
        prompt.push_str(&format!("{}. {:?}: {}\n", i + 1, r.hazard, r.description));
    }

    prompt.push_str(
        "\nSuggest: immediate actions (first 5 minutes), team composition, \
         equipment, rescue sequence, and safety considerations. Respond in JSON.",
    );

    prompt
}

/// Inputs for a strategy-generation call, summarizing one request cluster.
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub total_people: u32,
    pub geographic_spread_km: f64,
    pub request_count: usize,
    pub hazards: Vec<String>,
    pub available_resources: Vec<String>,
}

impl ClusterSummary {
    /// Summarize a set of requests, measuring spread with the max pairwise
    /// distance of their locations.
    pub fn from_requests(requests: &[HelpRequest], available_resources: Vec<String>) -> Self {
        let locations: Vec<_> = requests.iter().map(|r| r.location).collect();
        Self {
            total_people: requests.iter().map(|r| r.people_affected).sum(),
            geographic_spread_km: cluster_spread(&locations),
            request_count: requests.len(),
            hazards: requests.iter().map(|r| format!("{:?}", r.hazard)).collect(),
            available_resources,
        }
    }
}

/// Prompt asking for a rescue strategy over a cluster summary.
pub fn strategy_prompt(cluster: &ClusterSummary) -> String {
    format!(
        "You are a disaster management expert. Create an optimal rescue \
         strategy for this cluster.\n\nCluster details:\n\
         - Total affected people: {}\n- Geographic spread: {:.2} km\n\
         - Number of requests: {}\n- Hazards: {}\n- Available resources: {}\n\n\
         Include resource allocation, sequence of operations, timeline \
         estimates, team assignments, risk assessment, and a communication \
         plan. Respond in JSON with clear, actionable steps.",
        cluster.total_people,
        cluster.geographic_spread_km,
        cluster.request_count,
        cluster.hazards.join(", "),
        cluster.available_resources.join(", "),
    )
}

// ---------------------------------------------------------------------------
// Live client (behind `live-providers` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "live-providers")]
pub mod gemini {
    use super::*;
    use reqwest::blocking::Client;
    use serde_json::json;
    use std::time::Duration;

    /// Client for a Gemini-style `generateContent` endpoint.
    pub struct GeminiClient {
        client: Client,
        endpoint: String,
        api_key: String,
    }

    impl GeminiClient {
        pub fn new(endpoint: &str, api_key: &str) -> Result<Self, reqwest::Error> {
            let client = Client::builder()
                .timeout(Duration::from_secs(ENRICHMENT_TIMEOUT_SECS))
                .build()?;
            Ok(Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
            })
        }
    }

    impl EnrichmentClient for GeminiClient {
        fn generate(&self, prompt: &str) -> Result<String, EnrichmentError> {
            let url = format!("{}?key={}", self.endpoint, self.api_key);
            let body = json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            });

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| {
                    if e.is_timeout() {
                        EnrichmentError::Timeout
                    } else {
                        EnrichmentError::Transport(e.to_string())
                    }
                })?;

            let value: serde_json::Value = response
                .json()
                .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

            // Response shapes vary across API versions; hand the whole body
            // to the lenient JSON extraction downstream.
            let text = value.to_string();
            if text.is_empty() || text == "null" {
                return Err(EnrichmentError::EmptyResponse);
            }
            Ok(text)
        }
    }
}
