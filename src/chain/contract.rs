//! ethers-rs binding for the prediction market contract

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use std::sync::Arc;
use std::time::Duration;

use super::{units, MarketGateway, TxStatus};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::types::{Market, MarketStatus};

abigen!(
    PredictionMarketContract,
    r#"[
        function getMarketInfo() external view returns (string question, string collectionSlug, uint256 targetPrice, uint256 resolutionTimestamp, uint8 status, bool winningOutcome, uint256 yesSharesTotal, uint256 noSharesTotal, uint256 spotPriceYes, uint256 spotPriceNo)
        function resolver() external view returns (address)
        function resolveMarket(uint256 _finalPrice) external
    ]"#
);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Market gateway over a JSON-RPC HTTP provider
pub struct EthersMarketGateway {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerClient>>,
    gas_limit: U256,
}

impl EthersMarketGateway {
    /// Connect to the RPC node; without a key the gateway is read-only
    pub fn connect(config: &ChainConfig, private_key: Option<&str>) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("Invalid chain.rpc_url '{}'", config.rpc_url))?;

        let signer = match private_key {
            Some(pk) => {
                let wallet: LocalWallet = pk.parse().context("Invalid resolver private key")?;
                let wallet = wallet.with_chain_id(config.chain_id);
                tracing::info!(address = %format!("{:#x}", wallet.address()), "Resolver wallet loaded");
                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => {
                tracing::warn!("No resolver private key - resolution disabled");
                None
            }
        };

        Ok(Self {
            provider: Arc::new(provider),
            signer,
            gas_limit: U256::from(config.gas_limit),
        })
    }

    fn classify(receipt: &TransactionReceipt) -> TxStatus {
        if receipt.status == Some(U64::one()) {
            TxStatus::Success
        } else {
            TxStatus::Reverted
        }
    }
}

fn rpc<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::Rpc(e.to_string())
}

#[async_trait]
impl MarketGateway for EthersMarketGateway {
    fn identity(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    async fn read_market(&self, market_id: Address) -> Result<Market, ChainError> {
        let contract = PredictionMarketContract::new(market_id, self.provider.clone());

        let (_question, collection_slug, target_price, resolution_timestamp, status, ..) =
            contract.get_market_info().call().await.map_err(rpc)?;
        let resolver = contract.resolver().call().await.map_err(rpc)?;

        Ok(Market {
            market_id,
            asset_id: collection_slug,
            target_price: units::wei_to_decimal(target_price)?,
            resolution_deadline: units::timestamp(resolution_timestamp)?,
            status: MarketStatus::from_code(status)?,
            resolver_identity: resolver,
        })
    }

    async fn send_resolution(
        &self,
        market_id: Address,
        final_price_wei: U256,
    ) -> Result<H256, ChainError> {
        let client = self.signer.clone().ok_or(ChainError::SignerMissing)?;
        let contract = PredictionMarketContract::new(market_id, client);

        let call = contract.resolve_market(final_price_wei).gas(self.gas_limit);
        let pending = call.send().await.map_err(rpc)?;
        let tx_hash = pending.tx_hash();

        tracing::info!(
            market_id = %format!("{:#x}", market_id),
            tx_hash = %format!("{:#x}", tx_hash),
            final_price_wei = %final_price_wei,
            "Submitted resolveMarket transaction"
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, transaction_id: H256) -> Result<TxStatus, ChainError> {
        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(transaction_id)
                .await
                .map_err(rpc)?
            {
                return Ok(Self::classify(&receipt));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn receipt_status(&self, transaction_id: H256) -> Result<Option<TxStatus>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(transaction_id)
            .await
            .map_err(rpc)?;
        Ok(receipt.as_ref().map(Self::classify))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChainConfig {
        ChainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 84532,
            receipt_timeout_secs: 120,
            gas_limit: 200_000,
        }
    }

    #[test]
    fn test_read_only_gateway_has_no_identity() {
        let gateway = EthersMarketGateway::connect(&test_config(), None).unwrap();
        assert!(gateway.identity().is_none());
    }

    #[test]
    fn test_signer_identity_matches_key() {
        // well-known hardhat account #0
        let pk = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let gateway = EthersMarketGateway::connect(&test_config(), Some(pk)).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(gateway.identity(), Some(expected));
    }

    #[test]
    fn test_receipt_classification() {
        let mut receipt = TransactionReceipt::default();
        receipt.status = Some(U64::one());
        assert_eq!(EthersMarketGateway::classify(&receipt), TxStatus::Success);
        receipt.status = Some(U64::zero());
        assert_eq!(EthersMarketGateway::classify(&receipt), TxStatus::Reverted);
    }

    #[test]
    fn test_bad_rpc_url() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        assert!(EthersMarketGateway::connect(&config, None).is_err());
    }
}
