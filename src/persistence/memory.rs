//! In-memory backend implementing every store trait.
//!
//! Backs the test suites and `PERSISTENCE_ENABLED=false`. All tables live
//! behind one `RwLock`, so every call is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    AnalyticsStore, CatalogStore, CategoryStore, HistoryStore, NotificationStore, PreferenceStore,
};
use crate::domain::{
    CategoryId, CategoryNode, CrawlStatus, NewCategory, NewNotification, NewPreference,
    Notification, NotificationId, NotificationPreference, PreferenceId, PriceHistoryEntry, Product,
    ProductAnalytics, ProductId, ProductPage, ProductVariant, StockHistoryEntry, UpdatePriority,
    ValidatedSnapshot, VariantId, VariantState, category,
};
use crate::error::PipelineError;

#[derive(Debug, Default)]
struct Tables {
    categories: BTreeMap<CategoryId, CategoryNode>,
    crawl_status: HashMap<CategoryId, CrawlStatus>,
    products: BTreeMap<ProductId, Product>,
    price_history: Vec<PriceHistoryEntry>,
    stock_history: Vec<StockHistoryEntry>,
    analytics: HashMap<ProductId, ProductAnalytics>,
    priority: HashMap<ProductId, UpdatePriority>,
    preferences: BTreeMap<PreferenceId, NotificationPreference>,
    notifications: BTreeMap<NotificationId, Notification>,
    dedup_keys: HashSet<String>,
    next_category: i64,
    next_preference: i64,
    next_notification: i64,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`PipelineError::TransientIo`]
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of price history rows, across all variants.
    pub async fn price_history_len(&self) -> usize {
        self.tables.read().await.price_history.len()
    }

    /// Number of stock history rows, across all variants.
    pub async fn stock_history_len(&self) -> usize {
        self.tables.read().await.stock_history.len()
    }

    /// Price rows of one variant, oldest first.
    pub async fn price_history_of(&self, variant_id: VariantId) -> Vec<PriceHistoryEntry> {
        self.tables
            .read()
            .await
            .price_history
            .iter()
            .filter(|e| e.variant_id == variant_id)
            .cloned()
            .collect()
    }

    /// Stock rows of one variant, oldest first.
    pub async fn stock_history_of(&self, variant_id: VariantId) -> Vec<StockHistoryEntry> {
        self.tables
            .read()
            .await
            .stock_history
            .iter()
            .filter(|e| e.variant_id == variant_id)
            .cloned()
            .collect()
    }

    fn check_online(&self) -> Result<(), PipelineError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::TransientIo("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for InMemoryStore {
    async fn list_categories(&self) -> Result<Vec<CategoryNode>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.categories.values().cloned().collect())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<CategoryNode>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn leaf_categories(&self) -> Result<Vec<CategoryNode>, PipelineError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let nodes: Vec<CategoryNode> = tables.categories.values().cloned().collect();
        Ok(category::leaves(&nodes))
    }

    async fn upsert_category(&self, new: NewCategory) -> Result<CategoryNode, PipelineError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .categories
            .values_mut()
            .find(|c| c.external_id == new.external_id)
        {
            existing.name = new.name;
            existing.slug = new.slug;
            return Ok(existing.clone());
        }
        if let Some(parent) = new.parent_id
            && !tables.categories.contains_key(&parent)
        {
            return Err(PipelineError::not_found("category", parent));
        }
        tables.next_category += 1;
        let node = CategoryNode {
            id: CategoryId::new(tables.next_category),
            name: new.name,
            parent_id: new.parent_id,
            external_id: new.external_id,
            slug: new.slug,
        };
        tables.categories.insert(node.id, node.clone());
        Ok(node)
    }

    async fn crawl_status(&self, id: CategoryId) -> Result<Option<CrawlStatus>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.crawl_status.get(&id).cloned())
    }

    async fn save_crawl_status(&self, status: &CrawlStatus) -> Result<(), PipelineError> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .crawl_status
            .insert(status.category_id, status.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn upsert_product(
        &self,
        category_id: CategoryId,
        snapshot: &ValidatedSnapshot,
        crawled_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.check_online()?;
        let mut variants: Vec<ProductVariant> = snapshot
            .variants
            .iter()
            .map(|v| ProductVariant {
                id: v.id,
                price: v.price,
                stock_quantity: v.stock_quantity,
            })
            .collect();
        variants.sort_by_key(|v| v.id);

        self.tables.write().await.products.insert(
            snapshot.product_id,
            Product {
                id: snapshot.product_id,
                category_id: Some(category_id),
                name: snapshot.name.clone(),
                description: snapshot.description.clone(),
                variants,
                last_crawled_at: Some(crawled_at),
            },
        );
        Ok(())
    }

    async fn list_products(
        &self,
        category_id: CategoryId,
        page: u32,
        per_page: u32,
    ) -> Result<ProductPage, PipelineError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let in_category = |p: &&Product| p.category_id == Some(category_id);
        let total = tables.products.values().filter(in_category).count() as u64;
        let per_page = per_page.max(1) as usize;
        let offset = (page.max(1) as usize - 1).saturating_mul(per_page);
        let products = tables
            .products
            .values()
            .filter(in_category)
            .skip(offset)
            .take(per_page)
            .cloned()
            .collect();
        Ok(ProductPage { products, total })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.products.get(&id).cloned())
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn variant_state(&self, variant_id: VariantId) -> Result<VariantState, PipelineError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let price = tables
            .price_history
            .iter()
            .rev()
            .find(|e| e.variant_id == variant_id)
            .map(|e| e.new_price);
        let stock_quantity = tables
            .stock_history
            .iter()
            .rev()
            .find(|e| e.variant_id == variant_id)
            .map(|e| e.new_quantity);
        Ok(VariantState {
            price,
            stock_quantity,
        })
    }

    async fn append_price(&self, entry: &PriceHistoryEntry) -> Result<(), PipelineError> {
        self.check_online()?;
        self.tables.write().await.price_history.push(entry.clone());
        Ok(())
    }

    async fn append_stock(&self, entry: &StockHistoryEntry) -> Result<(), PipelineError> {
        self.check_online()?;
        self.tables.write().await.stock_history.push(entry.clone());
        Ok(())
    }

    async fn recent_price_history(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>, PipelineError> {
        self.check_online()?;
        Ok(self
            .tables
            .read()
            .await
            .price_history
            .iter()
            .rev()
            .filter(|e| e.product_id == product_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryStore {
    async fn save_analytics(&self, analytics: &ProductAnalytics) -> Result<(), PipelineError> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .analytics
            .insert(analytics.product_id, analytics.clone());
        Ok(())
    }

    async fn get_analytics(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductAnalytics>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.analytics.get(&product_id).cloned())
    }

    async fn save_priority(&self, priority: &UpdatePriority) -> Result<(), PipelineError> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .priority
            .insert(priority.product_id, priority.clone());
        Ok(())
    }

    async fn get_priority(
        &self,
        product_id: ProductId,
    ) -> Result<Option<UpdatePriority>, PipelineError> {
        self.check_online()?;
        Ok(self.tables.read().await.priority.get(&product_id).cloned())
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn preferences_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError> {
        self.check_online()?;
        Ok(self
            .tables
            .read()
            .await
            .preferences
            .values()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn stock_watchers(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError> {
        self.check_online()?;
        Ok(self
            .tables
            .read()
            .await
            .preferences
            .values()
            .filter(|p| p.product_id == product_id && p.notify_stock)
            .cloned()
            .collect())
    }

    async fn create_preference(
        &self,
        new: NewPreference,
    ) -> Result<NotificationPreference, PipelineError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        tables.next_preference += 1;
        let preference = NotificationPreference {
            id: PreferenceId::new(tables.next_preference),
            user_id: new.user_id,
            product_id: new.product_id,
            min_price: new.min_price,
            max_price: new.max_price,
            notify_stock: new.notify_stock,
        };
        tables.preferences.insert(preference.id, preference.clone());
        Ok(preference)
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_once(&self, new: &NewNotification) -> Result<bool, PipelineError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if !tables.dedup_keys.insert(new.dedup_key.clone()) {
            return Ok(false);
        }
        tables.next_notification += 1;
        let id = NotificationId::new(tables.next_notification);
        tables.notifications.insert(
            id,
            Notification {
                id,
                user_id: new.user_id.clone(),
                product_id: new.product_id,
                kind: new.kind,
                message: new.message.clone(),
                is_read: false,
                created_at: new.created_at,
            },
        );
        Ok(true)
    }

    async fn notifications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, PipelineError> {
        self.check_online()?;
        let mut found: Vec<Notification> = self
            .tables
            .read()
            .await
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<bool, PipelineError> {
        self.check_online()?;
        Ok(self
            .tables
            .write()
            .await
            .notifications
            .get_mut(&id)
            .map(|n| n.is_read = true)
            .is_some())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{NotificationKind, ProductCounters, ValidatedVariant};
    use crate::persistence::seed_categories;

    fn validated(product: i64, variants: &[i64]) -> ValidatedSnapshot {
        ValidatedSnapshot {
            product_id: ProductId::new(product),
            name: format!("Product {product}"),
            description: String::new(),
            counters: ProductCounters::default(),
            variants: variants
                .iter()
                .map(|&id| ValidatedVariant {
                    id: VariantId::new(id),
                    price: 10.0,
                    stock_quantity: 1,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn seed_tree_yields_five_leaves() {
        let store = InMemoryStore::new();
        let Ok(written) = seed_categories(&store).await else {
            panic!("seeding should succeed");
        };
        assert_eq!(written, 7);
        let Ok(leaves) = store.leaf_categories().await else {
            panic!("leaves should load");
        };
        let names: Vec<&str> = leaves.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Smartphones",
                "Laptops",
                "Men's Clothing",
                "Women's Clothing",
                "Home & Garden"
            ]
        );

        // A second seed is a no-op.
        assert_eq!(seed_categories(&store).await.ok(), Some(0));
    }

    #[tokio::test]
    async fn upsert_category_keeps_identity_and_parent() {
        let store = InMemoryStore::new();
        let Ok(root) = store
            .upsert_category(NewCategory {
                name: "Root".to_string(),
                parent_id: None,
                external_id: "r".to_string(),
                slug: "root".to_string(),
            })
            .await
        else {
            panic!("insert should succeed");
        };
        let Ok(renamed) = store
            .upsert_category(NewCategory {
                name: "Renamed".to_string(),
                parent_id: Some(CategoryId::new(99)),
                external_id: "r".to_string(),
                slug: "renamed".to_string(),
            })
            .await
        else {
            panic!("update should succeed");
        };
        assert_eq!(renamed.id, root.id);
        assert_eq!(renamed.parent_id, None);
        assert_eq!(renamed.name, "Renamed");
    }

    #[tokio::test]
    async fn products_page_by_category() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for n in 1..=5 {
            let _ = store
                .upsert_product(CategoryId::new(1), &validated(n, &[n * 10]), now)
                .await;
        }
        let _ = store
            .upsert_product(CategoryId::new(2), &validated(6, &[60]), now)
            .await;

        let Ok(page) = store.list_products(CategoryId::new(1), 2, 2).await else {
            panic!("page should load");
        };
        assert_eq!(page.total, 5);
        let ids: Vec<i64> = page.products.iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![3, 4]);

        let Ok(past_end) = store.list_products(CategoryId::new(1), 9, 2).await else {
            panic!("page should load");
        };
        assert!(past_end.products.is_empty());
        assert_eq!(past_end.total, 5);
    }

    #[tokio::test]
    async fn variant_state_follows_latest_rows() {
        let store = InMemoryStore::new();
        let variant = VariantId::new(7);
        let Ok(empty) = store.variant_state(variant).await else {
            panic!("state should load");
        };
        assert_eq!(empty, VariantState::default());

        for (old, new) in [(10.0, 10.0), (10.0, 8.0)] {
            let _ = store
                .append_price(&PriceHistoryEntry {
                    variant_id: variant,
                    product_id: ProductId::new(1),
                    old_price: old,
                    new_price: new,
                    changed_at: Utc::now(),
                })
                .await;
        }
        let Ok(state) = store.variant_state(variant).await else {
            panic!("state should load");
        };
        assert_eq!(state.price, Some(8.0));
        assert_eq!(state.stock_quantity, None);
    }

    #[tokio::test]
    async fn insert_once_ignores_duplicate_keys() {
        let store = InMemoryStore::new();
        let new = NewNotification {
            dedup_key: "e:1".to_string(),
            user_id: "u".to_string(),
            product_id: ProductId::new(1),
            kind: NotificationKind::StockChange,
            message: "Product is now out of stock".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(store.insert_once(&new).await.ok(), Some(true));
        assert_eq!(store.insert_once(&new).await.ok(), Some(false));
        let Ok(inbox) = store.notifications_for_user("u").await else {
            panic!("inbox should load");
        };
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn inbox_is_newest_first_and_mark_read_flags() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        for (key, offset) in [("a", 0), ("b", 60), ("c", 30)] {
            let _ = store
                .insert_once(&NewNotification {
                    dedup_key: key.to_string(),
                    user_id: "u".to_string(),
                    product_id: ProductId::new(1),
                    kind: NotificationKind::PriceDrop,
                    message: key.to_string(),
                    created_at: base + chrono::Duration::seconds(offset),
                })
                .await;
        }
        let Ok(inbox) = store.notifications_for_user("u").await else {
            panic!("inbox should load");
        };
        let messages: Vec<&str> = inbox.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "c", "a"]);

        let Some(first) = inbox.first() else {
            panic!("inbox is not empty");
        };
        assert_eq!(store.mark_read(first.id).await.ok(), Some(true));
        assert_eq!(store.mark_read(NotificationId::new(999)).await.ok(), Some(false));
    }

    #[tokio::test]
    async fn offline_store_reports_transient_io() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.list_categories().await,
            Err(PipelineError::TransientIo(_))
        ));
        store.set_offline(false);
        assert!(store.list_categories().await.is_ok());
    }
}
