//! Category and crawl-status DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::CrawlStatus;
use crate::service::CategoryListing;

/// One category in `GET /categories`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CategoryDto {
    /// Category identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Parent category, absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Category page on the source site.
    pub url: String,
}

impl From<CategoryListing> for CategoryDto {
    fn from(listing: CategoryListing) -> Self {
        Self {
            id: listing.id.get(),
            name: listing.name,
            parent_id: listing.parent_id.map(i64::from),
            url: listing.url,
        }
    }
}

/// Response body for `GET /categories`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CategoryListResponse {
    /// All known categories.
    pub categories: Vec<CategoryDto>,
}

/// Response body for `GET /categories/{id}/crawl-status`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CrawlStatusDto {
    /// Leaf category.
    pub category_id: i64,
    /// `pending`, `in_progress`, `completed` or `failed`.
    pub status: String,
    /// Start of the most recent attempt.
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl From<CrawlStatus> for CrawlStatusDto {
    fn from(status: CrawlStatus) -> Self {
        Self {
            category_id: status.category_id.get(),
            status: status.state.as_str().to_string(),
            last_crawled_at: status.last_crawled_at,
        }
    }
}
