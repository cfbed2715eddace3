//! Business lookup with a short TTL cache
//!
//! Every webhook resolves the called Twilio number to a business before it
//! can do anything else. The table is tiny but the lookup is hot, so results
//! are cached for a short TTL. Misses are cached too, which keeps junk
//! traffic to unprovisioned numbers away from the database. Admin mutations
//! invalidate the affected number so operators see their edits immediately.

use std::time::Duration;

use mini_moka::sync::Cache;

use crate::Result;
use crate::db::{Business, BusinessRepo, Faq, normalize_phone};

/// How long resolved lookups stay cached
const CACHE_TTL_SECS: u64 = 60;

/// Far above any realistic provisioned-number count
const CACHE_CAPACITY: u64 = 1024;

/// Phone-number-to-business resolver backed by a TTL cache.
#[derive(Clone)]
pub struct BusinessDirectory {
    repo: BusinessRepo,
    cache: Cache<String, Option<Business>>,
}

impl BusinessDirectory {
    #[must_use]
    pub fn new(repo: BusinessRepo) -> Self {
        Self {
            repo,
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
                .build(),
        }
    }

    /// Resolve the business that owns the given Twilio number.
    ///
    /// The number is normalized before lookup, so any input format works.
    ///
    /// # Errors
    ///
    /// Returns error if the database lookup fails.
    pub fn resolve(&self, phone: &str) -> Result<Option<Business>> {
        let key = normalize_phone(phone);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let found = self.repo.find_by_phone(&key)?;
        self.cache.insert(key, found.clone());
        Ok(found)
    }

    /// FAQs for a business, in configured display order.
    ///
    /// # Errors
    ///
    /// Returns error if the database lookup fails.
    pub fn faqs_for(&self, business_id: &str) -> Result<Vec<Faq>> {
        self.repo.faqs_for(business_id)
    }

    /// Drop one cached number after an admin mutation.
    pub fn invalidate(&self, phone: &str) {
        self.cache.invalidate(&normalize_phone(phone));
    }

    /// Drop every cached lookup.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, NewBusiness};

    fn directory() -> BusinessDirectory {
        let pool = db::init_memory().unwrap();
        BusinessDirectory::new(BusinessRepo::new(pool))
    }

    fn seed(dir: &BusinessDirectory, name: &str) -> Business {
        dir.repo
            .upsert(&NewBusiness {
                name: name.to_string(),
                phone_number: "+15550001111".to_string(),
                owner_phone: "+15550002222".to_string(),
                ..NewBusiness::default()
            })
            .unwrap()
    }

    #[test]
    fn resolves_known_number_in_any_format() {
        let dir = directory();
        seed(&dir, "Juniper Plumbing");

        let hit = dir.resolve("(555) 000-1111").unwrap();
        assert!(hit.is_none());

        let hit = dir.resolve("+1 (555) 000-1111").unwrap().unwrap();
        assert_eq!(hit.name, "Juniper Plumbing");
    }

    #[test]
    fn serves_stale_hit_until_invalidated() {
        let dir = directory();
        seed(&dir, "Juniper Plumbing");

        assert_eq!(
            dir.resolve("+15550001111").unwrap().unwrap().name,
            "Juniper Plumbing"
        );

        // Rename behind the cache's back.
        seed(&dir, "Juniper Plumbing & Heating");
        assert_eq!(
            dir.resolve("+15550001111").unwrap().unwrap().name,
            "Juniper Plumbing"
        );

        dir.invalidate("+1 555-000-1111");
        assert_eq!(
            dir.resolve("+15550001111").unwrap().unwrap().name,
            "Juniper Plumbing & Heating"
        );
    }

    #[test]
    fn caches_misses() {
        let dir = directory();
        assert!(dir.resolve("+19990000000").unwrap().is_none());

        seed_with_number(&dir, "+19990000000");
        // Still a miss until the entry is invalidated.
        assert!(dir.resolve("+19990000000").unwrap().is_none());
        dir.invalidate_all();
        assert!(dir.resolve("+19990000000").unwrap().is_some());
    }

    fn seed_with_number(dir: &BusinessDirectory, phone: &str) {
        dir.repo
            .upsert(&NewBusiness {
                name: "Second Shop".to_string(),
                phone_number: phone.to_string(),
                owner_phone: "+15550002222".to_string(),
                ..NewBusiness::default()
            })
            .unwrap();
    }
}
