//! Market-data access.
//!
//! The [`MarketDataSource`] trait is what the prediction service depends on;
//! [`BirdeyeClient`] is the production implementation.

pub mod birdeye;
pub mod history;

pub use birdeye::{BirdeyeClient, BirdeyeConfig};
pub use history::summarize_history;

use async_trait::async_trait;

use crate::error::{PredictError, Result};
use crate::models::{HistoryWindow, PricePoint, TokenListing, TokenSnapshot};

/// Breaker/endpoint key shared by every market-data call.
pub const MARKET_ENDPOINT: &str = "market-data";

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current price, volume, liquidity and holder data for a token.
    async fn fetch_token_market_data(&self, address: &str) -> Result<TokenSnapshot>;

    /// Close prices over `window`, oldest first.
    async fn fetch_historical_prices(
        &self,
        address: &str,
        window: HistoryWindow,
    ) -> Result<Vec<PricePoint>>;

    async fn search_tokens(&self, query: &str, limit: usize) -> Result<Vec<TokenListing>>;

    async fn trending_tokens(&self, limit: usize) -> Result<Vec<TokenListing>>;
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Check that `address` looks like a base58 on-chain address.
///
/// Returns the trimmed address.
pub fn validate_address(address: &str) -> Result<&str> {
    let address = address.trim();

    if address.is_empty() {
        return Err(PredictError::InvalidRequest(
            "token address is required".to_string(),
        ));
    }

    if !(32..=44).contains(&address.len()) {
        return Err(PredictError::InvalidRequest(format!(
            "token address must be 32-44 characters, got {}",
            address.len()
        )));
    }

    if let Some(bad) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(PredictError::InvalidRequest(format!(
            "token address contains invalid character '{}'",
            bad
        )));
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn test_valid_address() {
        assert_eq!(validate_address(SOL_MINT).unwrap(), SOL_MINT);
        assert_eq!(
            validate_address(&format!("  {}  ", SOL_MINT)).unwrap(),
            SOL_MINT
        );
    }

    #[test]
    fn test_empty_address_rejected() {
        let err = validate_address("   ").unwrap_err();
        assert!(matches!(err, PredictError::InvalidRequest(_)));
    }

    #[test]
    fn test_bad_length_rejected() {
        assert!(validate_address("abc").is_err());
        assert!(validate_address(&"1".repeat(45)).is_err());
    }

    #[test]
    fn test_non_base58_rejected() {
        // '0', 'O', 'I' and 'l' are excluded from base58.
        let bad = format!("0{}", &SOL_MINT[1..]);
        assert!(validate_address(&bad).is_err());
        assert!(validate_address("0x1f9840a85d5af5bf1d1762f925bdaddc4201f984").is_err());
    }
}
