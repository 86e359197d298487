//! Guepard platform API
//!
//! The subscription engine only needs one thing from the platform: the
//! ability to fetch the current state of a resource. That seam is the
//! `ResourceApi` trait; `GuepardClient` implements it over HTTP and also
//! carries the generic JSON calls the deployment tools use.

pub mod client;
pub mod error;

pub use client::GuepardClient;
pub use error::ApiError;

use crate::models::{ResourceKind, ResourceState};
use async_trait::async_trait;

/// Source of resource state for the monitor and the status-reporting tools.
///
/// Implementations must report failure through `Err` rather than through a
/// sentinel state, so a failed fetch is never mistaken for a transition.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<ResourceState, ApiError>;
}
