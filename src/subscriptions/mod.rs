//! Subscription & Monitoring Engine
//!
//! Decides which deployments are watched, polls them in the background,
//! detects status transitions and pushes notifications to the attached MCP
//! session.
//!
//! ```text
//! tool call ──> AutoSubscriptionPolicy ──> SubscriptionRegistry
//!                                              │ list / replace_state
//!                  MonitoringLoop ─────────────┘
//!                      │ fetch            │ detect
//!                      v                  v
//!                 ResourceApi        ChangeDetector ──> NotificationDispatcher ──> session
//! ```
//!
//! All state lives in process memory and is lost on restart.

pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod service;

pub use detector::detect;
pub use dispatcher::{Notification, NotificationDispatcher, NotificationSink, Severity};
pub use error::SubscriptionError;
pub use monitor::{MonitoringLoop, ScanSummary};
pub use policy::{AutoSubscriptionPolicy, PolicyState, DEFAULT_AUTO_SUBSCRIBE_TOOLS};
pub use registry::{SubscribeOutcome, SubscriptionRegistry};
pub use service::{AutoSubscription, ServiceSettings, SubscriptionService};
