//! Typed repository over the provider row surface.

#![cfg(feature = "memory")]

mod common;

use serde::{Deserialize, Serialize};

use backhouse_provider::core::{Entity, Repository};

use common::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Delivery {
    id: String,
    client_id: String,
    vendor: String,
    total: f64,
    #[serde(default)]
    invoice: Option<String>,
}

impl Entity for Delivery {
    const TABLE: &'static str = "deliveries";

    fn id(&self) -> &str {
        &self.id
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn delivery(id: &str, client_id: &str, vendor: &str, total: f64) -> Delivery {
    Delivery {
        id: id.to_string(),
        client_id: client_id.to_string(),
        vendor: vendor.to_string(),
        total,
        invoice: None,
    }
}

#[tokio::test]
async fn round_trip_through_any_provider() {
    let (_, provider) = seeded_provider().await;
    let repo: Repository<Delivery> = Repository::new(provider);

    let stored = repo
        .insert(&delivery("d-1", CLIENT_BISTRO, "Acme Produce", 125.0))
        .await
        .unwrap();
    assert_eq!(stored.vendor, "Acme Produce");

    let fetched = repo.find_by_id(CLIENT_BISTRO, "d-1").await.unwrap().unwrap();
    assert_eq!(fetched, stored);

    let mut updated = fetched.clone();
    updated.total = 250.0;
    updated.invoice = Some("INV-7".to_string());
    let saved = repo.update(&updated).await.unwrap();
    assert_eq!(saved.total, 250.0);
    assert_eq!(saved.invoice.as_deref(), Some("INV-7"));

    repo.delete(CLIENT_BISTRO, "d-1").await.unwrap();
    assert!(repo.find_by_id(CLIENT_BISTRO, "d-1").await.unwrap().is_none());
}

#[tokio::test]
async fn listing_is_tenant_scoped() {
    let (_, provider) = seeded_provider().await;
    let repo: Repository<Delivery> = Repository::new(provider);

    repo.insert(&delivery("d-1", CLIENT_BISTRO, "Acme", 10.0))
        .await
        .unwrap();
    repo.insert(&delivery("d-2", CLIENT_BISTRO, "Acme", 20.0))
        .await
        .unwrap();
    repo.insert(&delivery("d-3", CLIENT_TRATTORIA, "Olio", 30.0))
        .await
        .unwrap();

    let bistro = repo.list_for_client(CLIENT_BISTRO).await.unwrap();
    assert_eq!(bistro.len(), 2);
    assert!(bistro.iter().all(|d| d.client_id == CLIENT_BISTRO));

    // A row fetched through the wrong tenant is simply absent.
    assert!(repo.find_by_id(CLIENT_BISTRO, "d-3").await.unwrap().is_none());
}

#[tokio::test]
async fn insert_into_unknown_client_is_rejected() {
    let (_, provider) = seeded_provider().await;
    let repo: Repository<Delivery> = Repository::new(provider);

    let err = repo
        .insert(&delivery("d-9", "client-ghost", "Acme", 10.0))
        .await
        .unwrap_err();
    assert!(err.is_integrity());
}
