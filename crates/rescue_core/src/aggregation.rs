//! Request aggregation: priority clusters with required-resource inference.
//!
//! Enrichment-first, deterministic-fallback-always. When an
//! [`EnrichmentClient`] is configured its well-formed responses are used
//! as-is; on any failure (no client, transport error, timeout) each open
//! request becomes its own singleton cluster scored by the local urgency
//! model. The two paths are distinguishable through the result's `source` tag
//! and the summary marker strings, so tests never need to mock network
//! failure precisely.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::enrichment::{
    aggregation_prompt, context_prompt, extract_json_blob, strategy_prompt, ClusterSummary,
    EnrichmentClient,
};
use crate::error::EnrichmentError;
use crate::geo::Coordinate;
use crate::model::HelpRequest;
use crate::urgency::{priority_for, suggest_resources, urgency_score, Priority};

/// Summary for an empty aggregation input.
pub const EMPTY_SUMMARY: &str = "No open requests";

/// Summary marker for the deterministic fallback path.
pub const FALLBACK_SUMMARY: &str = "Using fallback prioritization";

/// Recommended action attached to fallback clusters.
pub const FALLBACK_ACTION: &str = "Send rescue team";

/// Which path produced an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationSource {
    Enriched,
    Fallback,
}

/// A prioritized group of requests that can be served together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityCluster {
    pub request_ids: Vec<String>,
    pub priority: Priority,
    /// Urgency in [1, 10].
    pub urgency_score: u8,
    pub combined_description: String,
    pub centroid: Coordinate,
    pub required_resources: Vec<String>,
    pub estimated_victims: u32,
    pub recommended_action: String,
}

/// Result of one aggregation call. Transient; recomputed every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub clusters: Vec<PriorityCluster>,
    pub summary: String,
    pub source: AggregationSource,
}

/// Aggregation engine over an optional enrichment collaborator.
#[derive(Default, Clone)]
pub struct AggregationEngine {
    enrichment: Option<Arc<dyn EnrichmentClient>>,
}

impl AggregationEngine {
    /// Fallback-only engine.
    pub fn new() -> Self {
        Self { enrichment: None }
    }

    pub fn with_enrichment(mut self, client: Arc<dyn EnrichmentClient>) -> Self {
        self.enrichment = Some(client);
        self
    }

    /// Group open requests into priority clusters.
    pub fn aggregate(&self, requests: &[HelpRequest]) -> Aggregation {
        if requests.is_empty() {
            return Aggregation {
                clusters: Vec::new(),
                summary: EMPTY_SUMMARY.to_string(),
                source: AggregationSource::Fallback,
            };
        }

        let Some(client) = &self.enrichment else {
            return fallback_aggregation(requests);
        };

        match client.generate(&aggregation_prompt(requests)) {
            Ok(text) => match parse_enriched(&text, requests) {
                Some(aggregation) => aggregation,
                // Successful call, non-conforming shape: soft fallback that
                // echoes the text so nothing the model said is lost.
                None => Aggregation {
                    clusters: Vec::new(),
                    summary: text.trim().to_string(),
                    source: AggregationSource::Enriched,
                },
            },
            Err(err) => {
                warn!(error = %err, "enrichment failed, using deterministic fallback");
                fallback_aggregation(requests)
            }
        }
    }

    /// Analyze one request with its nearby context. Thin passthrough: no
    /// fallback algorithm, errors report enrichment unavailability.
    pub fn analyze_context(
        &self,
        request: &HelpRequest,
        nearby: &[HelpRequest],
    ) -> Result<serde_json::Value, EnrichmentError> {
        let client = self.enrichment.as_ref().ok_or(EnrichmentError::Unconfigured)?;
        let text = client.generate(&context_prompt(request, nearby))?;
        Ok(parse_or_wrap(&text, "suggestions"))
    }

    /// Generate a rescue strategy for a cluster summary. Thin passthrough.
    pub fn generate_strategy(
        &self,
        cluster: &ClusterSummary,
    ) -> Result<serde_json::Value, EnrichmentError> {
        let client = self.enrichment.as_ref().ok_or(EnrichmentError::Unconfigured)?;
        let text = client.generate(&strategy_prompt(cluster))?;
        Ok(parse_or_wrap(&text, "strategy"))
    }
}

/// Parse a JSON blob out of free text, or wrap the raw text under `key`.
fn parse_or_wrap(text: &str, key: &str) -> serde_json::Value {
    extract_json_blob(text)
        .and_then(|blob| serde_json::from_str(blob).ok())
        .unwrap_or_else(|| json!({ key: text.trim() }))
}

/// Deterministic fallback: one singleton cluster per request, scored locally.
pub fn fallback_aggregation(requests: &[HelpRequest]) -> Aggregation {
    let clusters = requests
        .iter()
        .map(|req| {
            let score = urgency_score(req);
            PriorityCluster {
                request_ids: vec![req.id.clone()],
                priority: priority_for(score),
                urgency_score: score,
                combined_description: req.description.clone(),
                centroid: req.location,
                required_resources: suggest_resources(req),
                estimated_victims: req.people_affected,
                recommended_action: FALLBACK_ACTION.to_string(),
            }
        })
        .collect();

    Aggregation {
        clusters,
        summary: FALLBACK_SUMMARY.to_string(),
        source: AggregationSource::Fallback,
    }
}

// ---------------------------------------------------------------------------
// Enriched-response parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmAggregation {
    #[serde(default)]
    aggregated: Vec<LlmCluster>,
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmCluster {
    /// Zero-based indices into the prompt's request list.
    request_ids: Vec<usize>,
    priority: String,
    urgency_score: f64,
    #[serde(default)]
    combined_description: String,
    centroid_location: LlmLatLng,
    #[serde(default)]
    required_resources: Vec<String>,
    #[serde(default)]
    estimated_victims_count: Option<u32>,
    #[serde(default)]
    recommended_action: String,
}

#[derive(Deserialize)]
struct LlmLatLng {
    lat: f64,
    lng: f64,
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s.to_ascii_uppercase().as_str() {
        "CRITICAL" => Some(Priority::Critical),
        "HIGH" => Some(Priority::High),
        "MEDIUM" => Some(Priority::Medium),
        "LOW" => Some(Priority::Low),
        _ => None,
    }
}

/// Validate and convert an enrichment response. `None` means the response was
/// not a conforming aggregation (the caller treats that as a soft fallback).
fn parse_enriched(text: &str, requests: &[HelpRequest]) -> Option<Aggregation> {
    let blob = extract_json_blob(text)?;
    let parsed: LlmAggregation = serde_json::from_str(blob).ok()?;
    if parsed.aggregated.is_empty() {
        return None;
    }

    let mut clusters = Vec::with_capacity(parsed.aggregated.len());
    for llm in parsed.aggregated {
        let mut request_ids = Vec::with_capacity(llm.request_ids.len());
        for idx in llm.request_ids {
            request_ids.push(requests.get(idx)?.id.clone());
        }
        if request_ids.is_empty() {
            return None;
        }

        let priority = parse_priority(&llm.priority)?;
        let urgency = llm.urgency_score.round().clamp(1.0, 10.0) as u8;
        let centroid = Coordinate::new(llm.centroid_location.lat, llm.centroid_location.lng).ok()?;

        clusters.push(PriorityCluster {
            request_ids,
            priority,
            urgency_score: urgency,
            combined_description: llm.combined_description,
            centroid,
            required_resources: llm.required_resources,
            estimated_victims: llm.estimated_victims_count.unwrap_or(1),
            recommended_action: llm.recommended_action,
        });
    }

    Some(Aggregation {
        clusters,
        summary: parsed.summary,
        source: AggregationSource::Enriched,
    })
}
