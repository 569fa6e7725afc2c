//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Default page size for list endpoints.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for list endpoints.
pub const MAX_LIMIT: i64 = 100;

/// Generic pagination parameters (`?limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// Requested page size, clamped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Requested offset, never negative.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Query parameters for `GET /channels`.
#[derive(Debug, Deserialize)]
pub struct ChannelListParams {
    /// Exact channel name to look for.
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for `GET /subscriptions`.
#[derive(Debug, Deserialize)]
pub struct SubscriptionListParams {
    /// Only subscriptions on this channel.
    pub channel: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// `#[serde(flatten)]` breaks numeric parsing of query strings, so the
// filtered params repeat the pagination fields instead.
impl ChannelListParams {
    pub fn page(&self) -> PaginationParams {
        PaginationParams {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl SubscriptionListParams {
    pub fn page(&self) -> PaginationParams {
        PaginationParams {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let params = PaginationParams {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(params.limit(), MAX_LIMIT);
        assert_eq!(params.offset(), 0);

        let defaults = PaginationParams::default();
        assert_eq!(defaults.limit(), DEFAULT_LIMIT);
        assert_eq!(defaults.offset(), 0);
    }
}
