//! Polygon JSON-RPC client for the treasury pipelines.
//!
//! Reads go through a plain HTTP provider; sends construct a wallet-backed provider per call
//! with the relevant signer. Every remote call carries a client-side timeout, and a timeout is
//! reported as [`ChainClientError::Timeout`] so callers treat it as "unknown, retry next run".

use std::{collections::HashMap, future::Future, str::FromStr, sync::Arc, time::Duration};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol,
    transports::http::{Client, Http},
};
use log::*;
use tokio::time::timeout;
use trs_common::{MicroUsdc, Secret};

use crate::{
    db_types::{TxHash, WalletAddress},
    traits::{ChainClient, ChainClientError, FeeEstimate, TreasuryWallet, TxReceipt},
};

sol! {
    #[sol(rpc)]
    interface IErc20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 value) external returns (bool);
    }
}

/// Supplies signing keys for custodial deposit addresses by derivation index. Production wires
/// this to the key-management service; tooling and tests use [`StaticKeyProvider`].
pub trait CustodialKeyProvider: Send + Sync {
    fn key_hex(&self, derivation_index: i64) -> Option<Secret<String>>;
}

/// A fixed in-memory key map.
#[derive(Default)]
pub struct StaticKeyProvider {
    keys: HashMap<i64, Secret<String>>,
}

impl StaticKeyProvider {
    pub fn new(keys: HashMap<i64, Secret<String>>) -> Self {
        Self { keys }
    }
}

impl CustodialKeyProvider for StaticKeyProvider {
    fn key_hex(&self, derivation_index: i64) -> Option<Secret<String>> {
        self.keys.get(&derivation_index).cloned()
    }
}

#[derive(Clone)]
pub struct PolygonConfig {
    pub rpc_url: String,
    pub usdc_address: String,
    pub gas_wallet_key: Secret<String>,
    pub payout_wallet_key: Secret<String>,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct PolygonClient {
    rpc_url: String,
    provider: RootProvider<Http<Client>>,
    usdc: Address,
    gas_signer: PrivateKeySigner,
    payout_signer: PrivateKeySigner,
    gas_address: WalletAddress,
    payout_address: WalletAddress,
    custodial_keys: Arc<dyn CustodialKeyProvider>,
    request_timeout: Duration,
}

impl std::fmt::Debug for PolygonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PolygonClient({})", self.rpc_url)
    }
}

impl PolygonClient {
    pub fn new(
        config: PolygonConfig,
        custodial_keys: Arc<dyn CustodialKeyProvider>,
    ) -> Result<Self, ChainClientError> {
        let url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainClientError::Configuration(format!("Invalid RPC URL: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        let usdc = Address::from_str(&config.usdc_address)
            .map_err(|e| ChainClientError::Configuration(format!("Invalid USDC contract address: {e}")))?;
        let gas_signer = parse_signer(&config.gas_wallet_key, "gas wallet")?;
        let payout_signer = parse_signer(&config.payout_wallet_key, "payout wallet")?;
        let gas_address = address_of(&gas_signer)?;
        let payout_address = address_of(&payout_signer)?;
        info!("⛓️ Polygon client ready. Gas wallet {gas_address}, payout wallet {payout_address}");
        Ok(Self {
            rpc_url: config.rpc_url,
            provider,
            usdc,
            gas_signer,
            payout_signer,
            gas_address,
            payout_address,
            custodial_keys,
            request_timeout: config.request_timeout,
        })
    }

    fn signer(&self, wallet: TreasuryWallet) -> &PrivateKeySigner {
        match wallet {
            TreasuryWallet::Gas => &self.gas_signer,
            TreasuryWallet::Payout => &self.payout_signer,
        }
    }

    /// A wallet-backed provider for a send. Constructed per call so the read path stays a plain
    /// provider and signers never outlive the broadcast that needs them.
    fn signing_provider(&self, signer: PrivateKeySigner) -> Result<impl Provider<Http<Client>>, ChainClientError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| ChainClientError::Configuration(format!("Invalid RPC URL: {e}")))?;
        let provider =
            ProviderBuilder::new().with_recommended_fillers().wallet(EthereumWallet::from(signer)).on_http(url);
        Ok(provider)
    }

    async fn with_timeout<T, E, F>(&self, fut: F) -> Result<T, ChainClientError>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        match timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainClientError::Transport(e.to_string())),
            Err(_) => Err(ChainClientError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }
}

fn parse_signer(key: &Secret<String>, label: &str) -> Result<PrivateKeySigner, ChainClientError> {
    if key.reveal().is_empty() {
        warn!(
            "🚨️🚨️🚨️ The {label} private key has not been set. I'm using a random key for this session. DO NOT \
             operate on production like this: broadcasts from this wallet will fail. 🚨️🚨️🚨️"
        );
        return Ok(PrivateKeySigner::random());
    }
    key.reveal()
        .parse::<PrivateKeySigner>()
        .map_err(|e| ChainClientError::Configuration(format!("Invalid {label} private key: {e}")))
}

fn address_of(signer: &PrivateKeySigner) -> Result<WalletAddress, ChainClientError> {
    WalletAddress::new(format!("{:#x}", signer.address()))
        .map_err(|e| ChainClientError::Configuration(e.to_string()))
}

fn parse_address(address: &WalletAddress) -> Result<Address, ChainClientError> {
    Address::from_str(address.as_str())
        .map_err(|e| ChainClientError::MalformedResponse(format!("Invalid address {address}: {e}")))
}

fn parse_hash(hash: &TxHash) -> Result<B256, ChainClientError> {
    B256::from_str(hash.as_str())
        .map_err(|e| ChainClientError::MalformedResponse(format!("Invalid tx hash {hash}: {e}")))
}

fn micro_usdc_to_u256(amount: MicroUsdc) -> Result<U256, ChainClientError> {
    let value = u128::try_from(amount.value())
        .map_err(|_| ChainClientError::Configuration(format!("Cannot transfer a negative amount: {amount}")))?;
    Ok(U256::from(value))
}

impl ChainClient for PolygonClient {
    async fn usdc_balance(&self, address: &WalletAddress) -> Result<MicroUsdc, ChainClientError> {
        let owner = parse_address(address)?;
        let erc20 = IErc20::new(self.usdc, &self.provider);
        let balance = self.with_timeout(async { erc20.balanceOf(owner).call().await }).await?;
        let raw = u128::try_from(balance._0)
            .map_err(|_| ChainClientError::MalformedResponse(format!("USDC balance of {address} overflows u128")))?;
        MicroUsdc::try_from(raw).map_err(|e| ChainClientError::MalformedResponse(e.to_string()))
    }

    async fn native_balance(&self, address: &WalletAddress) -> Result<u128, ChainClientError> {
        let addr = parse_address(address)?;
        let balance = self.with_timeout(async { self.provider.get_balance(addr).await }).await?;
        u128::try_from(balance)
            .map_err(|_| ChainClientError::MalformedResponse(format!("Native balance of {address} overflows u128")))
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainClientError> {
        let hash = parse_hash(tx_hash)?;
        let receipt = self.with_timeout(async { self.provider.get_transaction_receipt(hash).await }).await?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash: tx_hash.clone(),
            success: r.status(),
            block_number: r.block_number,
        }))
    }

    async fn send_native(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount_wei: u128,
        nonce: Option<u64>,
    ) -> Result<TxHash, ChainClientError> {
        let to_addr = parse_address(to)?;
        let provider = self.signing_provider(self.signer(from).clone())?;
        let mut request = TransactionRequest::default().with_to(to_addr).with_value(U256::from(amount_wei));
        if let Some(nonce) = nonce {
            request = request.with_nonce(nonce);
        }
        // Broadcast only; confirmation is someone else's job.
        let pending = self.with_timeout(async { provider.send_transaction(request).await }).await?;
        let hash = TxHash::from(format!("{:#x}", pending.tx_hash()));
        debug!("⛓️ Native transfer of {amount_wei} wei to {to} broadcast as {hash}");
        Ok(hash)
    }

    async fn send_usdc(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError> {
        let to_addr = parse_address(to)?;
        let value = micro_usdc_to_u256(amount)?;
        let provider = self.signing_provider(self.signer(from).clone())?;
        let erc20 = IErc20::new(self.usdc, &provider);
        let pending = self.with_timeout(async { erc20.transfer(to_addr, value).send().await }).await?;
        let hash = TxHash::from(format!("{:#x}", pending.tx_hash()));
        debug!("⛓️ USDC transfer of {amount} to {to} broadcast as {hash}");
        Ok(hash)
    }

    async fn sweep_usdc(
        &self,
        derivation_index: i64,
        from: &WalletAddress,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError> {
        let key = self
            .custodial_keys
            .key_hex(derivation_index)
            .ok_or(ChainClientError::MissingKey(derivation_index))?;
        let signer = parse_signer(&key, "custodial")?;
        let signer_address = address_of(&signer)?;
        if &signer_address != from {
            return Err(ChainClientError::Configuration(format!(
                "Key at index {derivation_index} signs for {signer_address}, not deposit address {from}"
            )));
        }
        let to_addr = parse_address(to)?;
        let value = micro_usdc_to_u256(amount)?;
        let provider = self.signing_provider(signer)?;
        let erc20 = IErc20::new(self.usdc, &provider);
        let pending = self.with_timeout(async { erc20.transfer(to_addr, value).send().await }).await?;
        let hash = TxHash::from(format!("{:#x}", pending.tx_hash()));
        debug!("⛓️ Sweep of {amount} from {from} broadcast as {hash}");
        Ok(hash)
    }

    async fn pending_nonce(&self, wallet: TreasuryWallet) -> Result<u64, ChainClientError> {
        let address = parse_address(self.wallet_address(wallet))?;
        self.with_timeout(async { self.provider.get_transaction_count(address).pending().await }).await
    }

    fn wallet_address(&self, wallet: TreasuryWallet) -> &WalletAddress {
        match wallet {
            TreasuryWallet::Gas => &self.gas_address,
            TreasuryWallet::Payout => &self.payout_address,
        }
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainClientError> {
        let estimate = self.with_timeout(async { self.provider.estimate_eip1559_fees(None).await }).await?;
        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }
}
