//! Request descriptors.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl RequestMethod {
    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical API call.
///
/// `endpoint` is either a path relative to the client's base URL or an
/// absolute URL (as found in pagination links). The request id is generated
/// once per descriptor and shared by all retries of it.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub(crate) method: RequestMethod,
    pub(crate) endpoint: String,
    pub(crate) query_params: Vec<(String, String)>,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) request_id: Uuid,
}

impl RequestDescriptor {
    /// Create a new request descriptor.
    pub fn new(method: RequestMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query_params: Vec::new(),
            headers: HashMap::new(),
            body: None,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(RequestMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(RequestMethod::Post, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(RequestMethod::Patch, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(RequestMethod::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(RequestMethod::Delete, endpoint)
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Set a query parameter, replacing any existing values for `name`.
    pub fn set_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.query_params.retain(|(k, _)| *k != name);
        self.query_params.push((name, value.into()));
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set raw JSON body.
    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Descriptor for the page a `next` link points at.
    ///
    /// Method, headers and body are kept. The endpoint becomes the link's
    /// location and the link's query parameters replace any template
    /// parameters of the same name. A fresh request id is generated.
    pub fn follow_link(&self, link: &str) -> Result<Self> {
        let parsed = url::Url::parse(link)?;

        let link_params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut query_params: Vec<(String, String)> = self
            .query_params
            .iter()
            .filter(|(k, _)| !link_params.iter().any(|(lk, _)| lk == k))
            .cloned()
            .collect();
        query_params.extend(link_params);

        let mut endpoint = parsed;
        endpoint.set_query(None);
        endpoint.set_fragment(None);

        Ok(Self {
            method: self.method,
            endpoint: endpoint.to_string(),
            query_params,
            headers: self.headers.clone(),
            body: self.body.clone(),
            request_id: Uuid::new_v4(),
        })
    }
}
