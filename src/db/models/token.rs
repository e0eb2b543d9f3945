//! The `Token` entity (§3).

use bigdecimal::BigDecimal;

/// Placeholder metadata substituted when an ERC-20's `name`/`symbol`/`decimals`
/// calls revert or time out (§4.1 failure semantics). Used both to seed a new
/// row and to detect a row that still needs a lazy metadata patch.
pub const DEFAULT_DECIMALS: i16 = 18;
pub const DEFAULT_SYMBOL: &str = "UNKNOWN";
pub const DEFAULT_NAME: &str = "Unknown Token";

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub address: String,
    pub decimals: i16,
    pub symbol: String,
    pub name: String,
    pub volume: BigDecimal,
    pub volume_usd: BigDecimal,
    pub untracked_volume_usd: BigDecimal,
    pub fees_usd: BigDecimal,
    pub total_value_locked: BigDecimal,
    pub total_value_locked_usd: BigDecimal,
    pub derived_native: BigDecimal,
    pub tx_count: i64,
    pub whitelist_pools: Vec<String>,
    /// True until a successful metadata fetch patches `decimals`/`symbol`/`name`.
    pub metadata_is_default: bool,
}

impl Token {
    /// A new token row with default (unfetched) metadata.
    pub fn new_default(address: String) -> Self {
        Self {
            address,
            decimals: DEFAULT_DECIMALS,
            symbol: DEFAULT_SYMBOL.to_string(),
            name: DEFAULT_NAME.to_string(),
            volume: BigDecimal::from(0),
            volume_usd: BigDecimal::from(0),
            untracked_volume_usd: BigDecimal::from(0),
            fees_usd: BigDecimal::from(0),
            total_value_locked: BigDecimal::from(0),
            total_value_locked_usd: BigDecimal::from(0),
            derived_native: BigDecimal::from(0),
            tx_count: 0,
            whitelist_pools: Vec::new(),
            metadata_is_default: true,
        }
    }
}
