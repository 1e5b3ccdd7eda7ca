//! Catalog queries: categories, products and crawl status.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{CategoryId, CategoryNode, CrawlStatus, Product, ProductId, ProductPage};
use crate::error::PipelineError;
use crate::persistence::{CatalogStore, CategoryStore};

/// Products per page when the caller does not say.
pub const DEFAULT_PER_PAGE: u32 = 20;
/// Upper bound on products per page.
pub const MAX_PER_PAGE: u32 = 100;

/// A category as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryListing {
    /// Category identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Parent category, `None` for roots.
    pub parent_id: Option<CategoryId>,
    /// Category page on the source site.
    pub url: String,
}

/// Read-side queries over the catalog.
#[derive(Debug, Clone)]
pub struct CatalogService {
    categories: Arc<dyn CategoryStore>,
    catalog: Arc<dyn CatalogStore>,
    base_url: String,
}

impl CatalogService {
    /// Creates a catalog service. Category urls are built on `base_url`.
    #[must_use]
    pub fn new(
        categories: Arc<dyn CategoryStore>,
        catalog: Arc<dyn CatalogStore>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            categories,
            catalog,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Every known category with its source-site url.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    pub async fn list_categories(&self) -> Result<Vec<CategoryListing>, PipelineError> {
        let nodes = self.categories.list_categories().await?;
        Ok(nodes.into_iter().map(|node| self.listing(node)).collect())
    }

    fn listing(&self, node: CategoryNode) -> CategoryListing {
        CategoryListing {
            url: format!("{}/categories/{}", self.base_url, node.slug),
            id: node.id,
            name: node.name,
            parent_id: node.parent_id,
        }
    }

    /// One page of a category's products. `page` is 1-indexed and raised
    /// to 1; `per_page` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id,
    /// [`PipelineError::NotFound`] for an unknown category and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn list_products(
        &self,
        category_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ProductPage, PipelineError> {
        let category_id: CategoryId = category_id.parse()?;
        if self.categories.get_category(category_id).await?.is_none() {
            return Err(PipelineError::not_found("category", category_id));
        }
        self.catalog
            .list_products(category_id, page.max(1), per_page.clamp(1, MAX_PER_PAGE))
            .await
    }

    /// One product with its variants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id,
    /// [`PipelineError::NotFound`] for an unknown product and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn get_product(&self, product_id: &str) -> Result<Product, PipelineError> {
        let product_id: ProductId = product_id.parse()?;
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("product", product_id))
    }

    /// Crawl status of one category.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id,
    /// [`PipelineError::NotFound`] if the category was never crawled and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn crawl_status(&self, category_id: &str) -> Result<CrawlStatus, PipelineError> {
        let category_id: CategoryId = category_id.parse()?;
        self.categories
            .crawl_status(category_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("crawl status", category_id))
    }
}
