use crate::{FieldValue, Lead, LeadPatch, LeadStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {message}")]
    Transport { message: String },
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request rejected: {message}")]
    Rejected { message: String },
}

/// The one window of leads a view is showing: active filters plus page position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            filters: BTreeMap::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageQuery {
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn on_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPage {
    #[serde(default, alias = "records")]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

/// Field changes applied to many leads at once from the bulk-edit sidebar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_data: Vec<FieldValue>,
}

impl LeadUpdates {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assigned_to.is_none() && self.field_data.is_empty()
    }

    pub fn to_patch(&self, lead_id: &str) -> LeadPatch {
        LeadPatch {
            status: self.status.clone(),
            assigned_to: self.assigned_to.clone(),
            field_data: self.field_data.clone(),
            ..LeadPatch::new(lead_id)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAck {
    #[serde(default)]
    pub assigned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateResult {
    pub success: bool,
    #[serde(default)]
    pub count: u64,
}

/// REST surface the console core consumes. Every call is an opaque async
/// request that either succeeds or fails.
#[async_trait]
pub trait LeadApi: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<LeadPage, ApiError>;

    async fn assign(&self, lead_ids: &[String], agent_id: &str) -> Result<AssignAck, ApiError>;

    async fn bulk_update(
        &self,
        lead_ids: &[String],
        updates: &LeadUpdates,
    ) -> Result<BulkUpdateResult, ApiError>;
}

#[async_trait]
impl<T: LeadApi + ?Sized> LeadApi for Arc<T> {
    async fn fetch_page(&self, query: &PageQuery) -> Result<LeadPage, ApiError> {
        (**self).fetch_page(query).await
    }

    async fn assign(&self, lead_ids: &[String], agent_id: &str) -> Result<AssignAck, ApiError> {
        (**self).assign(lead_ids, agent_id).await
    }

    async fn bulk_update(
        &self,
        lead_ids: &[String],
        updates: &LeadUpdates,
    ) -> Result<BulkUpdateResult, ApiError> {
        (**self).bulk_update(lead_ids, updates).await
    }
}
