//! ERC-20 metadata fetch via multicall, with safe-default substitution on
//! failure (never skips a token — §4.1 failure semantics).
//!
//! Adapted from the prior `TokenFetcher`: same multicall-batching,
//! retry-with-backoff, and invalid-token cache shape, but a revert now
//! yields `Token::new_default` instead of dropping the token.

use alloy::primitives::Address;
use alloy::providers::{DynProvider, MULTICALL3_ADDRESS};
use alloy::sol_types::SolCall;
use log::warn;
use moka::future::Cache;
use std::str::FromStr;
use std::time::Duration;

use crate::abis::erc20::IERC20;
use crate::abis::multicall::{Call3, IMulticall3};
use crate::db::models::token::{DEFAULT_DECIMALS, DEFAULT_NAME, DEFAULT_SYMBOL};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const MULTICALL_BATCH_SIZE: usize = 20;
/// Decimals above this are treated as a decode failure — no legitimate
/// ERC-20 uses a scale this large.
const MAX_PLAUSIBLE_DECIMALS: u8 = 24;

#[derive(Debug, Clone)]
pub struct FetchedMetadata {
    pub decimals: i16,
    pub symbol: String,
    pub name: String,
    /// False only when all three fields came back from a live chain call.
    pub is_default: bool,
}

impl FetchedMetadata {
    fn default_metadata() -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
            symbol: DEFAULT_SYMBOL.to_string(),
            name: DEFAULT_NAME.to_string(),
            is_default: true,
        }
    }
}

/// Batched ERC-20 metadata fetcher. A per-address cache of known-unfetchable
/// tokens avoids repeatedly retrying contracts that will never answer.
pub struct MetadataFetcher {
    provider: DynProvider,
    unfetchable: Cache<String, ()>,
}

impl MetadataFetcher {
    pub fn new(provider: DynProvider) -> Self {
        let unfetchable = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            provider,
            unfetchable,
        }
    }

    /// Fetch metadata for a batch of addresses, returning one entry per
    /// input address in order. Never fails the caller — a token whose
    /// metadata cannot be fetched gets `FetchedMetadata::default_metadata()`.
    pub async fn fetch_batch(&self, addresses: &[String]) -> Vec<FetchedMetadata> {
        let mut results = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(MULTICALL_BATCH_SIZE) {
            results.extend(self.fetch_chunk_with_retry(chunk).await);
        }
        results
    }

    async fn fetch_chunk_with_retry(&self, addresses: &[String]) -> Vec<FetchedMetadata> {
        for attempt in 0..MAX_RETRIES {
            match self.fetch_chunk(addresses).await {
                Ok(metadata) => return metadata,
                Err(e) => {
                    warn!("multicall metadata fetch failed (attempt {attempt}): {e:#}");
                    if attempt < MAX_RETRIES - 1 {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt));
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        addresses
            .iter()
            .map(|_| FetchedMetadata::default_metadata())
            .collect()
    }

    async fn fetch_chunk(&self, addresses: &[String]) -> anyhow::Result<Vec<FetchedMetadata>> {
        let multicall = IMulticall3::new(MULTICALL3_ADDRESS, &self.provider);
        let mut calls = Vec::with_capacity(addresses.len() * 3);
        let mut parsed = Vec::with_capacity(addresses.len());

        for addr in addresses {
            let address = Address::from_str(addr)?;
            parsed.push(address);
            let token = IERC20::new(address, &self.provider);

            calls.push(Call3 {
                target: address,
                allowFailure: true,
                callData: token.name().calldata().to_vec().into(),
            });
            calls.push(Call3 {
                target: address,
                allowFailure: true,
                callData: token.symbol().calldata().to_vec().into(),
            });
            calls.push(Call3 {
                target: address,
                allowFailure: true,
                callData: token.decimals().calldata().to_vec().into(),
            });
        }

        let results = tokio::time::timeout(RPC_CALL_TIMEOUT, multicall.aggregate3(calls).call())
            .await??;

        let mut out = Vec::with_capacity(addresses.len());
        for (i, addr) in addresses.iter().enumerate() {
            let base = i * 3;
            if base + 2 >= results.len() {
                out.push(FetchedMetadata::default_metadata());
                continue;
            }

            let name_res = &results[base];
            let symbol_res = &results[base + 1];
            let decimals_res = &results[base + 2];

            let decimals = if decimals_res.success {
                IERC20::decimalsCall::abi_decode_returns(&decimals_res.returnData).ok()
            } else {
                None
            };

            let decimals = match decimals {
                Some(d) if d <= MAX_PLAUSIBLE_DECIMALS => d,
                _ => {
                    self.unfetchable.insert(addr.clone(), ()).await;
                    out.push(FetchedMetadata::default_metadata());
                    continue;
                },
            };

            let name = if name_res.success {
                IERC20::nameCall::abi_decode_returns(&name_res.returnData)
                    .unwrap_or_else(|_| DEFAULT_NAME.to_string())
            } else {
                DEFAULT_NAME.to_string()
            };

            let symbol = if symbol_res.success {
                IERC20::symbolCall::abi_decode_returns(&symbol_res.returnData)
                    .unwrap_or_else(|_| DEFAULT_SYMBOL.to_string())
            } else {
                DEFAULT_SYMBOL.to_string()
            };

            out.push(FetchedMetadata {
                decimals: decimals as i16,
                symbol,
                name,
                is_default: false,
            });
        }

        Ok(out)
    }

    pub fn is_known_unfetchable(&self, address: &str) -> bool {
        self.unfetchable.contains_key(address)
    }
}
