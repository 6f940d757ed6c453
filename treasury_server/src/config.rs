use std::{env, time::Duration};

use log::*;
use treasury_engine::{
    chain::PolygonConfig,
    db_types::WalletAddress,
    fiat::StripeConfig,
    PricingSettings,
    SweepSettings,
    TreasurySettings,
};
use trs_common::{parse_boolean_flag, MicroUsdc, Secret};

const DEFAULT_TRS_HOST: &str = "127.0.0.1";
const DEFAULT_TRS_PORT: u16 = 8460;
/// Native USDC on Polygon PoS.
const DEFAULT_USDC_ADDRESS: &str = "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359";
const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
const DEFAULT_CHAIN_TIMEOUT_MS: u64 = 15_000;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DispatchMode {
    #[default]
    Direct,
    Queued,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Shared secret the scheduler presents as a bearer token on every cron call.
    pub cron_secret: Secret<String>,
    pub rpc_url: String,
    pub usdc_address: String,
    pub gas_wallet_key: Secret<String>,
    pub payout_wallet_key: Secret<String>,
    pub chain_timeout: Duration,
    /// Optional JSON file mapping derivation indexes to custodial signing keys.
    pub custodial_keys_file: Option<String>,
    pub stripe_secret_key: Secret<String>,
    /// Notification service ingest endpoint. Unset logs notifications instead of sending.
    pub notify_webhook_url: Option<String>,
    pub dispatch_mode: DispatchMode,
    pub pricing: PricingSettings,
    pub sweep: SweepSettings,
    pub treasury: TreasurySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TRS_HOST.to_string(),
            port: DEFAULT_TRS_PORT,
            database_url: String::default(),
            cron_secret: Secret::default(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            usdc_address: DEFAULT_USDC_ADDRESS.to_string(),
            gas_wallet_key: Secret::default(),
            payout_wallet_key: Secret::default(),
            chain_timeout: Duration::from_millis(DEFAULT_CHAIN_TIMEOUT_MS),
            custodial_keys_file: None,
            stripe_secret_key: Secret::default(),
            notify_webhook_url: None,
            dispatch_mode: DispatchMode::default(),
            pricing: PricingSettings::default(),
            sweep: SweepSettings::default(),
            treasury: TreasurySettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("TRS_HOST").ok().unwrap_or_else(|| DEFAULT_TRS_HOST.into());
        let port = env::var("TRS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for TRS_PORT. {e} Using the default, {DEFAULT_TRS_PORT}, instead."
                    );
                    DEFAULT_TRS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_TRS_PORT);
        let database_url = env::var("TRS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ TRS_DATABASE_URL is not set. Please set it to the URL for the treasury database.");
            String::default()
        });
        let cron_secret = env::var("TRS_CRON_SECRET").map(Secret::new).unwrap_or_else(|_| {
            error!("🪛️ TRS_CRON_SECRET is not set. All cron endpoints will reject requests until it is.");
            Secret::default()
        });
        let rpc_url = env::var("TRS_RPC_URL").ok().unwrap_or_else(|| {
            info!("🪛️ TRS_RPC_URL is not set. Using the public default, {DEFAULT_RPC_URL}.");
            DEFAULT_RPC_URL.to_string()
        });
        let usdc_address = env::var("TRS_USDC_ADDRESS").ok().unwrap_or_else(|| DEFAULT_USDC_ADDRESS.to_string());
        let gas_wallet_key = env::var("TRS_GAS_WALLET_KEY").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ TRS_GAS_WALLET_KEY is not set. Sweep funding will not be able to sign transactions.");
            Secret::default()
        });
        let payout_wallet_key = env::var("TRS_PAYOUT_WALLET_KEY").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ TRS_PAYOUT_WALLET_KEY is not set. Crypto payouts will not be able to sign transactions.");
            Secret::default()
        });
        let chain_timeout = env::var("TRS_CHAIN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_CHAIN_TIMEOUT_MS));
        let custodial_keys_file = env::var("TRS_CUSTODIAL_KEYS_FILE").ok();
        let stripe_secret_key = env::var("TRS_STRIPE_SECRET_KEY").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ TRS_STRIPE_SECRET_KEY is not set. Fiat payouts will fail until it is configured.");
            Secret::default()
        });
        let notify_webhook_url = env::var("TRS_NOTIFY_WEBHOOK_URL").ok();
        if notify_webhook_url.is_none() {
            info!("🪛️ TRS_NOTIFY_WEBHOOK_URL is not set. Notifications will be logged, not delivered.");
        }
        let dispatch_mode = match env::var("TRS_DISPATCH_MODE").map(|s| s.to_lowercase()) {
            Ok(s) if s == "queued" => DispatchMode::Queued,
            Ok(s) if s == "direct" => DispatchMode::Direct,
            Ok(s) => {
                warn!("🪛️ Unknown TRS_DISPATCH_MODE '{s}'. Using 'direct'.");
                DispatchMode::Direct
            },
            Err(_) => DispatchMode::Direct,
        };
        let pricing = pricing_from_env();
        let sweep = sweep_from_env();
        let treasury = TreasurySettings::default();
        Self {
            host,
            port,
            database_url,
            cron_secret,
            rpc_url,
            usdc_address,
            gas_wallet_key,
            payout_wallet_key,
            chain_timeout,
            custodial_keys_file,
            stripe_secret_key,
            notify_webhook_url,
            dispatch_mode,
            pricing,
            sweep,
            treasury,
        }
    }

    pub fn polygon_config(&self) -> PolygonConfig {
        PolygonConfig {
            rpc_url: self.rpc_url.clone(),
            usdc_address: self.usdc_address.clone(),
            gas_wallet_key: self.gas_wallet_key.clone(),
            payout_wallet_key: self.payout_wallet_key.clone(),
            request_timeout: self.chain_timeout,
        }
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig { secret_key: self.stripe_secret_key.clone(), api_base: None }
    }
}

fn price_from_env(var: &str, default: MicroUsdc) -> MicroUsdc {
    match env::var(var) {
        Ok(s) => s.parse::<MicroUsdc>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid dollar amount in {var}: {e}. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    }
}

fn pricing_from_env() -> PricingSettings {
    let defaults = PricingSettings::default();
    let monitor_batch_size = env::var("TRS_MONITOR_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(defaults.monitor_batch_size);
    PricingSettings {
        initial_unlock: price_from_env("TRS_PRICE_INITIAL", defaults.initial_unlock),
        monthly: price_from_env("TRS_PRICE_MONTHLY", defaults.monthly),
        weekly: price_from_env("TRS_PRICE_WEEKLY", defaults.weekly),
        monitor_batch_size,
        ..defaults
    }
}

fn sweep_from_env() -> SweepSettings {
    let defaults = SweepSettings::default();
    let treasury_address = env::var("TRS_TREASURY_ADDRESS")
        .ok()
        .and_then(|s| match WalletAddress::new(s) {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("🪛️ Invalid TRS_TREASURY_ADDRESS: {e}. Sweeps will target the placeholder address.");
                None
            },
        })
        .unwrap_or(defaults.treasury_address.clone());
    let max_verify_attempts = env::var("TRS_SWEEP_MAX_VERIFY_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(defaults.max_verify_attempts);
    let disable_ceiling = parse_boolean_flag(env::var("TRS_SWEEP_POLL_FOREVER").ok(), false);
    SweepSettings {
        treasury_address,
        max_verify_attempts: if disable_ceiling { 0 } else { max_verify_attempts },
        ..defaults
    }
}
