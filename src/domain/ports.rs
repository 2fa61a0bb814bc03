use crate::domain::model::{NodeId, TailoringRule, TreatmentKind};
use crate::utils::error::Result;
use crate::utils::subscription::Subscription;
use async_trait::async_trait;
use std::sync::Arc;

/// Payload-free change signal; receivers re-read whatever they care about.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Flat, asynchronously accessed record of JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>>> + Send;

    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Invoked after every successful write, including writes made through
    /// another handle to the same backing record.
    fn subscribe(&self, callback: ChangeCallback) -> Subscription;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Current rules in priority order.
    async fn get_rules(&self) -> Result<Vec<TailoringRule>>;

    fn on_change(&self, callback: ChangeCallback) -> Subscription;
}

/// A rendered page the tailoring engine reads from and marks.
///
/// Queries take an optional scope node; `None` means the whole document.
/// The only writes allowed are the three treatment markers.
pub trait Page: Send + Sync {
    fn url(&self) -> String;

    /// Marks the page as owned by a session. Returns `false` if it already was.
    fn claim(&self) -> bool;

    fn query_selector(&self, scope: Option<NodeId>, selector: &str) -> Option<NodeId>;

    fn query_selector_all(&self, scope: Option<NodeId>, selector: &str) -> Vec<NodeId>;

    /// String form of a link node: its `href` when present, else its text.
    /// `None` when the node no longer exists.
    fn link_text(&self, node: NodeId) -> Option<String>;

    fn has_marker(&self, node: NodeId, treatment: TreatmentKind) -> bool;

    fn add_marker(&self, node: NodeId, treatment: TreatmentKind);

    fn remove_marker(&self, node: NodeId, treatment: TreatmentKind);

    /// Calls `callback` once per batch of child additions or removals directly
    /// under `target`. Marker changes never trigger it.
    fn observe_child_list(&self, target: NodeId, callback: ChangeCallback) -> Subscription;
}
