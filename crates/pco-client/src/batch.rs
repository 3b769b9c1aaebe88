//! Batches of independent operations with per-operation outcomes.
//!
//! Every operation is attempted, each with the dispatcher's full retry
//! policy. A failing operation never aborts its siblings. Results come back
//! in the order the operations were given, whatever order they finished in.

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::PcoHttpClient;
use crate::error::Error;
use crate::request::RequestDescriptor;

/// Operations in flight at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Resource collections a batch operation can target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    People,
    Emails { person_id: String },
    PhoneNumbers { person_id: String },
    Addresses { person_id: String },
    FieldData { person_id: String },
    Notes { person_id: String },
    Households,
    Lists,
    Campuses,
    Workflows,
    WorkflowCards { workflow_id: String },
}

impl ResourceKind {
    /// JSON:API `type` of the resource.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::People => "Person",
            ResourceKind::Emails { .. } => "Email",
            ResourceKind::PhoneNumbers { .. } => "PhoneNumber",
            ResourceKind::Addresses { .. } => "Address",
            ResourceKind::FieldData { .. } => "FieldDatum",
            ResourceKind::Notes { .. } => "Note",
            ResourceKind::Households => "Household",
            ResourceKind::Lists => "List",
            ResourceKind::Campuses => "Campus",
            ResourceKind::Workflows => "Workflow",
            ResourceKind::WorkflowCards { .. } => "WorkflowCard",
        }
    }

    pub fn collection_path(&self) -> String {
        const PEOPLE: &str = "/people/v2";
        match self {
            ResourceKind::People => format!("{PEOPLE}/people"),
            ResourceKind::Emails { person_id } => {
                format!("{PEOPLE}/people/{}/emails", encode(person_id))
            }
            ResourceKind::PhoneNumbers { person_id } => {
                format!("{PEOPLE}/people/{}/phone_numbers", encode(person_id))
            }
            ResourceKind::Addresses { person_id } => {
                format!("{PEOPLE}/people/{}/addresses", encode(person_id))
            }
            ResourceKind::FieldData { person_id } => {
                format!("{PEOPLE}/people/{}/field_data", encode(person_id))
            }
            ResourceKind::Notes { person_id } => {
                format!("{PEOPLE}/people/{}/notes", encode(person_id))
            }
            ResourceKind::Households => format!("{PEOPLE}/households"),
            ResourceKind::Lists => format!("{PEOPLE}/lists"),
            ResourceKind::Campuses => format!("{PEOPLE}/campuses"),
            ResourceKind::Workflows => format!("{PEOPLE}/workflows"),
            ResourceKind::WorkflowCards { workflow_id } => {
                format!("{PEOPLE}/workflows/{}/cards", encode(workflow_id))
            }
        }
    }

    pub fn member_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection_path(), encode(id))
    }
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

/// One unit of batch work.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Create {
        resource: ResourceKind,
        attributes: Value,
    },
    Update {
        resource: ResourceKind,
        id: String,
        attributes: Value,
    },
    Delete {
        resource: ResourceKind,
        id: String,
    },
    Get {
        resource: ResourceKind,
        id: String,
    },
    /// Anything the typed variants do not cover.
    Raw(RequestDescriptor),
}

impl BatchOperation {
    pub fn create(resource: ResourceKind, attributes: Value) -> Self {
        BatchOperation::Create {
            resource,
            attributes,
        }
    }

    pub fn update(resource: ResourceKind, id: impl Into<String>, attributes: Value) -> Self {
        BatchOperation::Update {
            resource,
            id: id.into(),
            attributes,
        }
    }

    pub fn delete(resource: ResourceKind, id: impl Into<String>) -> Self {
        BatchOperation::Delete {
            resource,
            id: id.into(),
        }
    }

    pub fn get(resource: ResourceKind, id: impl Into<String>) -> Self {
        BatchOperation::Get {
            resource,
            id: id.into(),
        }
    }

    /// `"create"`, `"update"`, `"delete"`, `"get"` or `"raw"`.
    pub fn action(&self) -> &'static str {
        match self {
            BatchOperation::Create { .. } => "create",
            BatchOperation::Update { .. } => "update",
            BatchOperation::Delete { .. } => "delete",
            BatchOperation::Get { .. } => "get",
            BatchOperation::Raw(_) => "raw",
        }
    }

    pub fn resource(&self) -> Option<&ResourceKind> {
        match self {
            BatchOperation::Create { resource, .. }
            | BatchOperation::Update { resource, .. }
            | BatchOperation::Delete { resource, .. }
            | BatchOperation::Get { resource, .. } => Some(resource),
            BatchOperation::Raw(_) => None,
        }
    }

    /// The request this operation sends.
    pub fn to_request(&self) -> RequestDescriptor {
        match self {
            BatchOperation::Create {
                resource,
                attributes,
            } => RequestDescriptor::post(resource.collection_path()).json_value(json!({
                "data": {
                    "type": resource.resource_type(),
                    "attributes": attributes,
                }
            })),
            BatchOperation::Update {
                resource,
                id,
                attributes,
            } => RequestDescriptor::patch(resource.member_path(id)).json_value(json!({
                "data": {
                    "type": resource.resource_type(),
                    "id": id,
                    "attributes": attributes,
                }
            })),
            BatchOperation::Delete { resource, id } => {
                RequestDescriptor::delete(resource.member_path(id))
            }
            BatchOperation::Get { resource, id } => {
                RequestDescriptor::get(resource.member_path(id))
            }
            BatchOperation::Raw(request) => request.clone(),
        }
    }
}

/// Options for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum operations in flight; 1 runs them strictly in order.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn sequential() -> Self {
        Self { concurrency: 1 }
    }
}

/// Outcome of one operation.
#[derive(Debug)]
pub struct BatchResult {
    /// Position of the operation in the input.
    pub index: usize,
    pub operation: BatchOperation,
    pub success: bool,
    /// Response body, absent for empty bodies.
    pub data: Option<Value>,
    pub error: Option<Error>,
}

/// Aggregate outcome of a batch.
#[derive(Debug)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total`; 1.0 for an empty batch.
    pub success_rate: f64,
    /// From first dispatch to last settlement.
    pub duration: Duration,
    /// One result per operation, ordered by index.
    pub results: Vec<BatchResult>,
}

impl BatchReport {
    fn from_results(mut results: Vec<BatchResult>, duration: Duration) -> Self {
        results.sort_by_key(|r| r.index);

        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = total - successful;
        let success_rate = if total == 0 {
            1.0
        } else {
            successful as f64 / total as f64
        };

        Self {
            total,
            successful,
            failed,
            success_rate,
            duration,
            results,
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Runs batches through a client.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    client: PcoHttpClient,
    options: BatchOptions,
}

impl BatchExecutor {
    pub fn new(client: PcoHttpClient, options: BatchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run every operation and report per-operation outcomes.
    pub async fn execute(&self, operations: Vec<BatchOperation>) -> BatchReport {
        let started = Instant::now();
        let concurrency = self.options.concurrency.max(1);
        debug!(operations = operations.len(), concurrency, "Starting batch");

        let results: Vec<BatchResult> = stream::iter(operations.into_iter().enumerate())
            .map(|(index, operation)| self.run_one(index, operation))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let report = BatchReport::from_results(results, started.elapsed());
        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "Batch finished"
        );
        report
    }

    async fn run_one(&self, index: usize, operation: BatchOperation) -> BatchResult {
        let request = operation.to_request();
        let outcome = match self.client.execute(&request).await {
            Ok(response) => response.json_value(),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(data) => BatchResult {
                index,
                operation,
                success: true,
                data: (!data.is_null()).then_some(data),
                error: None,
            },
            Err(err) => {
                debug!(index, action = operation.action(), error = %err, "Batch operation failed");
                BatchResult {
                    index,
                    operation,
                    success: false,
                    data: None,
                    error: Some(err),
                }
            }
        }
    }
}
