//! Product listing documents and their queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::UserProfile;
use crate::storage::{ChatThreadStore, Result, SledStore, StoreError};

/// Listing document as stored in the `products` collection. Seller identity
/// is denormalized at creation time so feed rows render without a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price_cents: u64,
    pub category: String,
    pub images: Vec<String>,
    pub seller_id: String,
    pub seller_name: String,
    pub seller_avatar: String,
    pub created_at_ms: i64,
}

/// Input for a new listing; the catalog assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price_cents: u64,
    pub category: String,
    pub images: Vec<String>,
}

#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// Persist a new listing. At least one image URL is required.
    async fn create_listing(
        &self,
        listing: NewListing,
        seller: &UserProfile,
    ) -> Result<ListingRecord>;

    async fn get_listing(&self, id: &str) -> Result<Option<ListingRecord>>;

    /// Home feed: every listing, newest first.
    async fn listings_newest_first(&self) -> Result<Vec<ListingRecord>>;

    /// One seller's listings, newest first.
    async fn listings_by_seller(&self, uid: &str) -> Result<Vec<ListingRecord>>;

    async fn delete_listing(&self, id: &str) -> Result<()>;
}

impl SledStore {
    fn load_listings(&self) -> Result<Vec<ListingRecord>> {
        let tree = self.products_tree()?;
        let mut listings: Vec<ListingRecord> = Vec::new();
        for entry in tree.iter() {
            let (_key, value) = entry?;
            listings.push(bincode::deserialize(&value)?);
        }
        listings.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(listings)
    }
}

#[async_trait]
impl ListingCatalog for SledStore {
    async fn create_listing(
        &self,
        listing: NewListing,
        seller: &UserProfile,
    ) -> Result<ListingRecord> {
        if listing.images.is_empty() {
            return Err(StoreError::InvalidListing);
        }

        let record = ListingRecord {
            id: Uuid::new_v4().to_string(),
            title: listing.title,
            description: listing.description,
            price_cents: listing.price_cents,
            category: listing.category,
            images: listing.images,
            seller_id: seller.uid.clone(),
            seller_name: seller.name.clone(),
            seller_avatar: seller.avatar_url.clone(),
            created_at_ms: self.server_time_ms(),
        };

        let tree = self.products_tree()?;
        tree.insert(record.id.as_bytes(), bincode::serialize(&record)?)?;
        tree.flush()?;
        Ok(record)
    }

    async fn get_listing(&self, id: &str) -> Result<Option<ListingRecord>> {
        let tree = self.products_tree()?;
        match tree.get(id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    async fn listings_newest_first(&self) -> Result<Vec<ListingRecord>> {
        self.load_listings()
    }

    async fn listings_by_seller(&self, uid: &str) -> Result<Vec<ListingRecord>> {
        Ok(self
            .load_listings()?
            .into_iter()
            .filter(|listing| listing.seller_id == uid)
            .collect())
    }

    async fn delete_listing(&self, id: &str) -> Result<()> {
        let tree = self.products_tree()?;
        tree.remove(id.as_bytes())?;
        tree.flush()?;
        Ok(())
    }
}
