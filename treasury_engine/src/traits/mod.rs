//! Trait seams between the pipelines and their collaborators.
//!
//! The ledger traits describe everything the pipelines need from the relational store. Concrete
//! backends (currently SQLite) implement them; the pipeline APIs are generic over them so tests
//! can run against a throwaway database. The chain client, fiat rail and notification sender are
//! the three external collaborators the pipelines talk to.

mod audit_ledger;
mod chain_client;
mod commission_ledger;
pub mod data_objects;
mod fiat_rail;
mod member_ledger;
mod notifier;
mod payment_ledger;

pub use audit_ledger::AuditLedger;
pub use chain_client::{ChainClient, ChainClientError, FeeEstimate, TreasuryWallet, TxReceipt};
pub use commission_ledger::CommissionLedger;
pub use fiat_rail::{ConnectAccount, FiatRail, FiatRailError, FiatTransfer};
pub use member_ledger::MemberLedger;
pub use notifier::{Notification, NotificationSender, NotifyError};
pub use payment_ledger::{LedgerError, PaymentLedger};

/// The full contract a storage backend must satisfy to drive the treasury pipelines.
pub trait LedgerStore: Clone + MemberLedger + PaymentLedger + CommissionLedger + AuditLedger {}

impl<T> LedgerStore for T where T: Clone + MemberLedger + PaymentLedger + CommissionLedger + AuditLedger {}
