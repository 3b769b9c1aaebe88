//! JSON:API envelopes shared by every Planning Center product API.

use serde::{Deserialize, Serialize};

/// A single-resource (or arbitrary) JSON:API document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document<T> {
    pub data: T,
    #[serde(default)]
    pub included: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: serde_json::Value,
    #[serde(default)]
    pub links: Links,
}

/// One page of a collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub included: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub links: Links,
}

impl<T> Page<T> {
    /// The `next` link, if another page follows.
    pub fn next_link(&self) -> Option<&str> {
        self.links.next.as_deref()
    }
}

/// `links` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Links {
    #[serde(rename = "self", default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
}

/// `meta` object of a collection response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PageMeta {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    /// Everything else (`can_include`, `can_order_by`, `parent`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A JSON:API resource object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Resource<A = serde_json::Value> {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: A,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<serde_json::Value>,
}
