mod event;
mod resource;
mod subscription;

pub use event::{ChangeEvent, ChangeKind};
pub use resource::{ResourceKind, ResourceState, COMPUTE_STATUS_FIELD, STATUS_FIELD};
pub use subscription::SubscriptionEntry;
