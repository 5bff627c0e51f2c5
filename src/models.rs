//! Core data models used throughout the portal.
//!
//! [`SiteRecord`]s live in SQLite and are the source of truth. The search
//! index only ever holds their [`IndexedDocument`] projection. Search
//! requests and responses mirror the index service's wire shape
//! (camelCase JSON) so they can be passed straight through to callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of resource a site represents. Used as the single facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    #[default]
    Website,
    Document,
    System,
    Database,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Website => "website",
            SiteType::Document => "document",
            SiteType::System => "system",
            SiteType::Database => "database",
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(SiteType::Website),
            "document" => Ok(SiteType::Document),
            "system" => Ok(SiteType::System),
            "database" => Ok(SiteType::Database),
            other => Err(format!(
                "Unknown site type '{}'. Must be website, document, system, or database.",
                other
            )),
        }
    }
}

/// A site as stored in the relational database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub site_type: SiteType,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SiteRecord {
    /// The projection that is written into the search index.
    pub fn to_document(&self) -> IndexedDocument {
        IndexedDocument {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            description: self.description.clone(),
            site_type: self.site_type,
        }
    }
}

/// One document inside the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub site_type: SiteType,
}

/// A fully-resolved search request as sent to the index.
///
/// Built by the query executor from caller parameters with defaults
/// applied; `limit` and `offset` are unsigned so the non-negative
/// invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(rename = "q")]
    pub text: String,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<String>>,
    pub attributes_to_highlight: Vec<String>,
    pub attributes_to_retrieve: Vec<String>,
}

impl SearchQuery {
    /// A bare query with no highlighting and every attribute retrieved.
    pub fn text(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            offset: 0,
            filter: None,
            sort: None,
            facets: None,
            attributes_to_highlight: Vec::new(),
            attributes_to_retrieve: vec!["*".to_string()],
        }
    }
}

/// Per-attribute value counts, e.g. `{"type": {"system": 3}}`.
pub type FacetDistribution = BTreeMap<String, BTreeMap<String, u64>>;

/// Normalized search response.
///
/// Hits are kept as raw JSON objects because `attributesToRetrieve` decides
/// their shape and the index adds `_formatted` highlight copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<serde_json::Value>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub estimated_total_hits: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits_per_page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_distribution: Option<FacetDistribution>,
}

/// One recorded search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsEvent {
    pub id: String,
    pub query: String,
    pub results_count: u64,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_type_parse() {
        assert_eq!("system".parse::<SiteType>().unwrap(), SiteType::System);
        assert!("intranet".parse::<SiteType>().is_err());
        assert_eq!(SiteType::default(), SiteType::Website);
    }

    #[test]
    fn test_document_wire_shape() {
        let doc = IndexedDocument {
            id: "crm-001".into(),
            name: "CRM".into(),
            url: "https://crm.example.com".into(),
            description: None,
            site_type: SiteType::Database,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "database");
        assert!(json["description"].is_null());
    }

    #[test]
    fn test_search_query_wire_shape() {
        let mut q = SearchQuery::text("portal", 8);
        q.filter = Some("type = system".into());
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["q"], "portal");
        assert_eq!(json["attributesToRetrieve"][0], "*");
        assert_eq!(json["filter"], "type = system");
        assert!(json.get("sort").is_none());
    }

    #[test]
    fn test_search_response_tolerates_missing_pagination() {
        let raw = serde_json::json!({
            "hits": [],
            "processingTimeMs": 1,
            "limit": 10,
            "offset": 0,
            "estimatedTotalHits": 0
        });
        let resp: SearchResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.total_pages.is_none());
        let back = serde_json::to_value(&resp).unwrap();
        assert!(back.get("facetDistribution").is_none());
    }
}
