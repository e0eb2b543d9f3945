//! Price Oracle (derived): expresses a token's price in the reference
//! (wrapped-native) unit via whitelisted pools, pinning stablecoins to the
//! configured stablecoin/native pool.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::models::Token;
use crate::db::postgres::PostgresClient;

pub struct PriceOracle {
    postgres: Arc<PostgresClient>,
    wrapped_native_address: String,
    zero_address: String,
    stablecoin_wrapped_native_pool_id: String,
    stablecoin_is_token0: bool,
    stablecoin_addresses: Vec<String>,
    minimum_native_locked: BigDecimal,
}

impl PriceOracle {
    pub fn new(
        postgres: Arc<PostgresClient>,
        wrapped_native_address: String,
        stablecoin_wrapped_native_pool_id: String,
        stablecoin_is_token0: bool,
        stablecoin_addresses: Vec<String>,
        minimum_native_locked: &str,
    ) -> Self {
        Self {
            postgres,
            wrapped_native_address: wrapped_native_address.to_lowercase(),
            zero_address: "0x0000000000000000000000000000000000000000".to_string(),
            stablecoin_wrapped_native_pool_id,
            stablecoin_is_token0,
            stablecoin_addresses: stablecoin_addresses
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
            minimum_native_locked: BigDecimal::from_str(minimum_native_locked)
                .unwrap_or_else(|_| BigDecimal::from(10)),
        }
    }

    /// USD price of one unit of the reference (wrapped-native) token, read
    /// from the configured stablecoin/wrapped-native pool. Returns 0 if
    /// that pool is unconfigured or missing.
    pub async fn native_price_usd(&self) -> anyhow::Result<BigDecimal> {
        let pool = self
            .postgres
            .get_pool(&self.stablecoin_wrapped_native_pool_id)
            .await?;

        Ok(match pool {
            Some(pool) if self.stablecoin_is_token0 => pool.token0_price,
            Some(pool) => pool.token1_price,
            None => BigDecimal::from(0),
        })
    }

    /// `derivedNativePerToken`: the token's price expressed in the
    /// reference unit.
    pub async fn derived_native_per_token(&self, token: &Token) -> anyhow::Result<BigDecimal> {
        let address = token.address.to_lowercase();

        if address == self.wrapped_native_address || address == self.zero_address {
            return Ok(BigDecimal::from(1));
        }

        if self.stablecoin_addresses.contains(&address) {
            let native_usd = self.native_price_usd().await?;
            if native_usd == BigDecimal::from(0) {
                return Ok(BigDecimal::from(1));
            }
            return Ok(BigDecimal::from(1) / native_usd);
        }

        let mut best_native_locked = BigDecimal::from(0);
        let mut price_so_far = BigDecimal::from(0);

        for pool_id in &token.whitelist_pools {
            let pool = match self.postgres.get_pool(pool_id).await? {
                Some(pool) => pool,
                None => continue,
            };

            let other_address = match pool.other_currency(&address) {
                Some(other) => other.to_string(),
                None => continue,
            };

            let other = match self.postgres.get_token(&other_address).await? {
                Some(other) => other,
                None => continue,
            };

            let tvl_other = match pool.tvl_of_other(&address) {
                Some(tvl) => tvl,
                None => continue,
            };

            let native_locked = to_human(tvl_other, other.decimals) * &other.derived_native;

            if native_locked > best_native_locked && native_locked > self.minimum_native_locked {
                let other_price = match pool.price_of_other(&address) {
                    Some(price) => price,
                    None => continue,
                };
                best_native_locked = native_locked;
                price_so_far = other_price * &other.derived_native;
            }
        }

        Ok(price_so_far)
    }
}

fn to_human(raw: &BigDecimal, decimals: i16) -> BigDecimal {
    if decimals <= 0 {
        return raw.clone();
    }
    raw / BigDecimal::from(BigInt::from(10).pow(decimals as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::pool::compute_v4_pool_id;
    use alloy::primitives::Address;
    use chrono::Utc;

    fn token(address: &str, derived_native: &str) -> Token {
        Token {
            address: address.to_string(),
            decimals: 18,
            symbol: "TOK".to_string(),
            name: "Token".to_string(),
            volume: BigDecimal::from(0),
            volume_usd: BigDecimal::from(0),
            untracked_volume_usd: BigDecimal::from(0),
            fees_usd: BigDecimal::from(0),
            total_value_locked: BigDecimal::from(0),
            total_value_locked_usd: BigDecimal::from(0),
            derived_native: BigDecimal::from_str(derived_native).unwrap(),
            tx_count: 0,
            whitelist_pools: vec![],
            metadata_is_default: false,
        }
    }

    #[test]
    fn to_human_divides_by_decimals() {
        let raw = BigDecimal::from(100_000_000_000_000_000_000u128);
        assert_eq!(to_human(&raw, 18), BigDecimal::from(100));
    }

    #[test]
    fn s6_derived_price_via_whitelist_matches_scenario() {
        // token A appears only in A/WETH, TVL_WETH=100, WETH.derivedNative="1",
        // A/WETH.token1Price="0.001" => derivedNativePerToken(A) = 0.001 * 1.
        use crate::db::models::Pool;

        let weth = Address::from_slice(&[1u8; 20]);
        let a = Address::from_slice(&[2u8; 20]);
        let pool_id = compute_v4_pool_id(a, weth, 3000, 60, Address::ZERO);

        let pool = Pool {
            pool_id,
            currency0: format!("{a:#x}"),
            currency1: format!("{weth:#x}"),
            fee: 3000,
            tick_spacing: 60,
            hooks: format!("{:#x}", Address::ZERO),
            sqrt_price_x96: BigDecimal::from(0),
            tick: 0,
            liquidity: BigDecimal::from(0),
            total_value_locked_token0: BigDecimal::from(0),
            total_value_locked_token1: BigDecimal::from(100),
            token0_price: BigDecimal::from_str("1000").unwrap(),
            token1_price: BigDecimal::from_str("0.001").unwrap(),
            token0_decimals: 18,
            token1_decimals: 18,
            created_block: 1,
            created_timestamp: Utc::now(),
            created_tx_hash: "0x0".to_string(),
        };

        let weth_token = token(&format!("{weth:#x}"), "1");
        let other_price = pool.price_of_other(&format!("{a:#x}")).unwrap().clone();
        let derived = &other_price * &weth_token.derived_native;
        assert_eq!(derived.round(6), BigDecimal::from_str("0.001").unwrap());
    }
}
