//! In-memory stand-ins for the three external collaborators, with just enough scripting to
//! drive the pipelines through their interesting paths.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use trs_common::MicroUsdc;

use crate::{
    db_types::{TxHash, WalletAddress},
    traits::{
        ChainClient,
        ChainClientError,
        ConnectAccount,
        FeeEstimate,
        FiatRail,
        FiatRailError,
        FiatTransfer,
        Notification,
        NotificationSender,
        NotifyError,
        TreasuryWallet,
        TxReceipt,
    },
};

//--------------------------------------     MockChain       ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentTransfer {
    pub from: String,
    pub to: String,
    pub usdc: Option<MicroUsdc>,
    pub wei: Option<u128>,
    pub nonce: Option<u64>,
    pub hash: TxHash,
}

#[derive(Default)]
struct MockChainState {
    usdc_balances: HashMap<String, MicroUsdc>,
    native_balances: HashMap<String, u128>,
    receipts: HashMap<String, TxReceipt>,
    sent: Vec<SentTransfer>,
    next_nonce: u64,
    seq: u64,
    fail_sends: bool,
}

/// A scripted chain. Balances and receipts are whatever the test sets; sends append to a log
/// and mint deterministic hashes.
#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
    gas_address: WalletAddress,
    payout_address: WalletAddress,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockChainState::default())),
            gas_address: WalletAddress::new("0x00000000000000000000000000000000000000a1").unwrap(),
            payout_address: WalletAddress::new("0x00000000000000000000000000000000000000a2").unwrap(),
        }
    }
}

impl MockChain {
    pub fn set_usdc_balance(&self, address: &WalletAddress, amount: MicroUsdc) {
        self.state.lock().unwrap().usdc_balances.insert(address.to_string(), amount);
    }

    pub fn set_native_balance(&self, address: &WalletAddress, wei: u128) {
        self.state.lock().unwrap().native_balances.insert(address.to_string(), wei);
    }

    pub fn set_receipt(&self, hash: &TxHash, success: bool) {
        let receipt = TxReceipt { tx_hash: hash.clone(), success, block_number: Some(1) };
        self.state.lock().unwrap().receipts.insert(hash.to_string(), receipt);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.state.lock().unwrap().sent.clone()
    }

    fn record_send(
        &self,
        from: String,
        to: String,
        usdc: Option<MicroUsdc>,
        wei: Option<u128>,
        nonce: Option<u64>,
    ) -> Result<TxHash, ChainClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(ChainClientError::Transport("scripted send failure".to_string()));
        }
        state.seq += 1;
        let hash = TxHash::from(format!("0x{:064x}", state.seq));
        state.sent.push(SentTransfer { from, to, usdc, wei, nonce, hash: hash.clone() });
        Ok(hash)
    }
}

impl ChainClient for MockChain {
    async fn usdc_balance(&self, address: &WalletAddress) -> Result<MicroUsdc, ChainClientError> {
        Ok(self.state.lock().unwrap().usdc_balances.get(&address.to_string()).copied().unwrap_or_default())
    }

    async fn native_balance(&self, address: &WalletAddress) -> Result<u128, ChainClientError> {
        Ok(self.state.lock().unwrap().native_balances.get(&address.to_string()).copied().unwrap_or_default())
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainClientError> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash.to_string()).cloned())
    }

    async fn send_native(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount_wei: u128,
        nonce: Option<u64>,
    ) -> Result<TxHash, ChainClientError> {
        self.record_send(self.wallet_address(from).to_string(), to.to_string(), None, Some(amount_wei), nonce)
    }

    async fn send_usdc(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError> {
        self.record_send(self.wallet_address(from).to_string(), to.to_string(), Some(amount), None, None)
    }

    async fn sweep_usdc(
        &self,
        _derivation_index: i64,
        from: &WalletAddress,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError> {
        self.record_send(from.to_string(), to.to_string(), Some(amount), None, None)
    }

    async fn pending_nonce(&self, _wallet: TreasuryWallet) -> Result<u64, ChainClientError> {
        Ok(self.state.lock().unwrap().next_nonce)
    }

    fn wallet_address(&self, wallet: TreasuryWallet) -> &WalletAddress {
        match wallet {
            TreasuryWallet::Gas => &self.gas_address,
            TreasuryWallet::Payout => &self.payout_address,
        }
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainClientError> {
        Ok(FeeEstimate { max_fee_per_gas: 50_000_000_000, max_priority_fee_per_gas: 2_000_000_000 })
    }
}

//--------------------------------------      MockRail       ---------------------------------------------------------

#[derive(Default)]
struct MockRailState {
    payouts_enabled: HashMap<String, bool>,
    transfers: Vec<FiatTransfer>,
    seq: u64,
}

#[derive(Clone, Default)]
pub struct MockRail {
    state: Arc<Mutex<MockRailState>>,
}

impl MockRail {
    pub fn set_payouts_enabled(&self, account_id: &str, enabled: bool) {
        self.state.lock().unwrap().payouts_enabled.insert(account_id.to_string(), enabled);
    }

    pub fn transfers(&self) -> Vec<FiatTransfer> {
        self.state.lock().unwrap().transfers.clone()
    }
}

impl FiatRail for MockRail {
    async fn transfer(&self, transfer: FiatTransfer) -> Result<String, FiatRailError> {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        state.transfers.push(transfer);
        Ok(format!("tr_{:08}", state.seq))
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectAccount, FiatRailError> {
        let enabled = self.state.lock().unwrap().payouts_enabled.get(account_id).copied().unwrap_or(true);
        Ok(ConnectAccount { id: account_id.to_string(), payouts_enabled: enabled })
    }
}

//--------------------------------------    MockNotifier     ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeliveredNotification {
    pub member_id: i64,
    pub kind: String,
    pub correlation_id: String,
}

#[derive(Default)]
struct MockNotifierState {
    delivered: Vec<DeliveredNotification>,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    state: Arc<Mutex<MockNotifierState>>,
}

impl MockNotifier {
    pub fn fail_deliveries(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn delivered(&self) -> Vec<DeliveredNotification> {
        self.state.lock().unwrap().delivered.clone()
    }
}

impl NotificationSender for MockNotifier {
    async fn notify(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(NotifyError("scripted delivery failure".to_string()));
        }
        state.delivered.push(DeliveredNotification {
            member_id,
            kind: notification.kind().to_string(),
            correlation_id: correlation_id.to_string(),
        });
        Ok(())
    }
}
