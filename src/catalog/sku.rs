//! Collision-free SKU generation.
//!
//! Candidates combine a 3-character brand prefix, a base36 timestamp and a
//! base36 random component, then probe the store for an existing product
//! with the same SKU. The composite key space makes collisions statistically
//! negligible, but retries are still capped.

use crate::{
    entities::product::{Column as ProductColumn, Entity as Product},
    errors::ServiceError,
};
use chrono::Utc;
use rand::Rng;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, instrument, warn};

/// Maximum store probes before giving up.
pub const MAX_SKU_ATTEMPTS: u32 = 5;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 6;

#[derive(Clone)]
pub struct SkuGenerator;

impl SkuGenerator {
    /// Generates a SKU guaranteed not to collide with any stored product at
    /// the time of the check. One read query per attempt; fails with
    /// `SkuGenerationExhausted` after `MAX_SKU_ATTEMPTS` collisions.
    #[instrument(skip(db))]
    pub async fn generate<C: ConnectionTrait>(db: &C, brand: &str) -> Result<String, ServiceError> {
        Self::generate_with(db, || Self::candidate(brand)).await
    }

    /// Like [`generate`](Self::generate) but with a caller-supplied candidate
    /// source, so the collision and exhaustion paths can be exercised
    /// deterministically.
    pub async fn generate_with<C, F>(db: &C, mut next_candidate: F) -> Result<String, ServiceError>
    where
        C: ConnectionTrait,
        F: FnMut() -> String,
    {
        for attempt in 1..=MAX_SKU_ATTEMPTS {
            let candidate = next_candidate();

            let existing = Product::find()
                .filter(ProductColumn::Sku.eq(&candidate))
                .one(db)
                .await?;

            if existing.is_none() {
                debug!(sku = %candidate, attempt, "generated SKU");
                return Ok(candidate);
            }

            warn!(sku = %candidate, attempt, "SKU collision, regenerating");
        }

        Err(ServiceError::SkuGenerationExhausted(MAX_SKU_ATTEMPTS))
    }

    /// Builds one candidate: `PREFIX-TIMESTAMP36-RANDOM36`, all uppercase.
    /// The prefix is the brand truncated to 3 characters, padded with `X`.
    pub fn candidate(brand: &str) -> String {
        let mut prefix: String = brand.chars().take(3).collect();
        while prefix.len() < 3 {
            prefix.push('X');
        }

        let timestamp = to_base36(Utc::now().timestamp_millis() as u64);

        let mut rng = rand::thread_rng();
        let random: String = (0..RANDOM_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();

        format!("{}-{}-{}", prefix, timestamp, random).to_uppercase()
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 digits are ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_has_three_dash_separated_parts() {
        let sku = SkuGenerator::candidate("Acme Corp");
        let parts: Vec<&str> = sku.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ACM");
        assert_eq!(parts[2].len(), RANDOM_LEN);
        assert_eq!(sku, sku.to_uppercase());
    }

    #[test]
    fn short_brands_are_padded() {
        let sku = SkuGenerator::candidate("io");
        assert!(sku.starts_with("IOX-"));

        let sku = SkuGenerator::candidate("");
        assert!(sku.starts_with("XXX-"));
    }

    #[test]
    fn candidates_differ_across_calls() {
        let a = SkuGenerator::candidate("Brand");
        let b = SkuGenerator::candidate("Brand");
        assert_ne!(a, b);
    }

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36 + 1), "101");
    }
}
