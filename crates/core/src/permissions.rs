//! Caller identity and capability checks.
//!
//! Authorization is an injected predicate mapping `(caller, action)` to
//! allow/deny. It is evaluated before every core operation. The default
//! predicate, [`scope_policy`], grants actions based on token scopes;
//! ownership of a channel or subscription is checked separately with
//! [`ensure_owner`].

use std::sync::Arc;

use crate::error::CoreError;

/// Scope held by clients that create channels and publish notifications.
pub const SCOPE_PUBLISH: &str = "notifications.publish";

/// Scope held by clients that subscribe to channels.
pub const SCOPE_CONSUME: &str = "notifications.consume";

/// Every operation exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ChannelList,
    ChannelRead,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    SubscriptionList,
    SubscriptionRead,
    SubscriptionCreate,
    SubscriptionUpdate,
    SubscriptionDelete,
    NotificationPublish,
    NotificationRead,
    DeliveryReplay,
}

/// The authenticated client behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl Caller {
    pub fn new(client_id: impl Into<String>, scopes: &[&str]) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Injected authorization predicate.
pub type CapabilityCheck = Arc<dyn Fn(&Caller, Action) -> bool + Send + Sync>;

/// Scopes that grant an action. Holding any one of them is enough.
pub fn required_scopes(action: Action) -> &'static [&'static str] {
    match action {
        Action::ChannelList
        | Action::ChannelRead
        | Action::SubscriptionList
        | Action::SubscriptionRead
        | Action::NotificationRead => &[SCOPE_PUBLISH, SCOPE_CONSUME],
        Action::ChannelCreate
        | Action::ChannelUpdate
        | Action::ChannelDelete
        | Action::NotificationPublish => &[SCOPE_PUBLISH],
        Action::SubscriptionCreate
        | Action::SubscriptionUpdate
        | Action::SubscriptionDelete
        | Action::DeliveryReplay => &[SCOPE_CONSUME],
    }
}

/// The default scope-based capability predicate.
pub fn scope_policy() -> CapabilityCheck {
    Arc::new(|caller: &Caller, action: Action| {
        required_scopes(action)
            .iter()
            .any(|scope| caller.has_scope(scope))
    })
}

/// Run the capability predicate and turn a denial into `Forbidden`.
pub fn ensure_allowed(
    check: &CapabilityCheck,
    caller: &Caller,
    action: Action,
) -> Result<(), CoreError> {
    if check(caller, action) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "Client '{}' may not perform {action:?}",
            caller.client_id
        )))
    }
}

/// Only the owning client may mutate a channel or subscription.
pub fn ensure_owner(caller: &Caller, owner: &str, entity: &str) -> Result<(), CoreError> {
    if caller.client_id == owner {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "{entity} is owned by another client"
        )))
    }
}
