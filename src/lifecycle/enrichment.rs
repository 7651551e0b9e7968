//! Product name enrichment of fetched pages

use crate::lifecycle::error::LifecycleResult;
use crate::models::{EntityRecord, TenantId};
use crate::search::IndexDocument;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Batch lookup of product display names by product id
#[async_trait]
pub trait ProductNameLookup: Send + Sync {
    /// Names for the given ids; unknown ids are simply absent from the map
    async fn get_names(&self, tenant: &TenantId, product_ids: &[String]) -> LifecycleResult<HashMap<String, String>>;
}

/// Turn one page of records into index documents with one product lookup
pub async fn enrich_page(
    lookup: &dyn ProductNameLookup,
    tenant: &TenantId,
    records: Vec<EntityRecord>,
) -> LifecycleResult<Vec<IndexDocument>> {
    let product_ids: Vec<String> = records
        .iter()
        .filter_map(|r| r.product_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let names = if product_ids.is_empty() {
        HashMap::new()
    } else {
        lookup.get_names(tenant, &product_ids).await?
    };

    Ok(records
        .into_iter()
        .map(|record| {
            let product_name = record.product_id.as_ref().and_then(|id| names.get(id).cloned());
            IndexDocument::from_record(record, product_name)
        })
        .collect())
}

/// In-memory product catalogue
#[derive(Clone, Default)]
pub struct InMemoryProductLookup {
    names: Arc<DashMap<(TenantId, String), String>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryProductLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: &TenantId, product_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert((tenant.clone(), product_id.into()), name.into());
    }

    /// Number of batch lookups served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductNameLookup for InMemoryProductLookup {
    async fn get_names(&self, tenant: &TenantId, product_ids: &[String]) -> LifecycleResult<HashMap<String, String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(product_ids
            .iter()
            .filter_map(|id| {
                self.names
                    .get(&(tenant.clone(), id.clone()))
                    .map(|name| (id.clone(), name.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, Environment};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_one_lookup_per_page() {
        let tenant = TenantId::new("acme").unwrap();
        let lookup = InMemoryProductLookup::new();
        lookup.insert(&tenant, "home", "Home Insurance");

        let records: Vec<EntityRecord> = (0..5)
            .map(|i| {
                EntityRecord::new(
                    Uuid::new_v4(),
                    tenant.clone(),
                    Environment::Production,
                    EntityKind::Policy,
                    format!("P-{}", i),
                    i,
                    i,
                )
                .with_product(if i % 2 == 0 { "home" } else { "motor" })
            })
            .collect();

        let documents = enrich_page(&lookup, &tenant, records).await.unwrap();
        assert_eq!(lookup.lookups(), 1);
        assert_eq!(documents[0].product_name.as_deref(), Some("Home Insurance"));
        assert_eq!(documents[1].product_name, None);
    }

    #[tokio::test]
    async fn test_no_lookup_without_products() {
        let tenant = TenantId::new("acme").unwrap();
        let lookup = InMemoryProductLookup::new();
        let record = EntityRecord::new(
            Uuid::new_v4(),
            tenant.clone(),
            Environment::Production,
            EntityKind::Quote,
            "Q-1",
            1,
            1,
        );

        enrich_page(&lookup, &tenant, vec![record]).await.unwrap();
        assert_eq!(lookup.lookups(), 0);
    }
}
