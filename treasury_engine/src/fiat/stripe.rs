//! Minimal Stripe client covering the two calls the payout executor needs: creating a transfer
//! to a connected account and checking that the account can receive payouts.

use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use trs_common::Secret;

use crate::traits::{ConnectAccount, FiatRail, FiatRailError, FiatTransfer};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    /// Overrides the API base URL; tests point this at a local stub.
    pub api_base: Option<String>,
}

#[derive(Clone)]
pub struct StripeRail {
    client: Arc<Client>,
    api_base: String,
}

impl std::fmt::Debug for StripeRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StripeRail({})", self.api_base)
    }
}

impl StripeRail {
    pub fn new(config: StripeConfig) -> Result<Self, FiatRailError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut value =
            HeaderValue::from_str(&bearer).map_err(|e| FiatRailError::Request(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FiatRailError::Request(e.to_string()))?;
        let api_base = config.api_base.unwrap_or_else(|| STRIPE_API_BASE.to_string());
        Ok(Self { client: Arc::new(client), api_base })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T, FiatRailError> {
        let url = format!("{}{path}", self.api_base);
        trace!("Sending Stripe request: {url}");
        let mut req = self.client.request(method, url);
        if let Some(form) = form {
            req = req.form(form);
        }
        let response = req.send().await.map_err(|e| FiatRailError::Request(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| FiatRailError::Malformed(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| FiatRailError::Request(e.to_string()))?;
            Err(FiatRailError::Api { status, message })
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    payouts_enabled: bool,
}

impl FiatRail for StripeRail {
    async fn transfer(&self, transfer: FiatTransfer) -> Result<String, FiatRailError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), transfer.amount.as_cents().to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("destination".to_string(), transfer.destination_account.clone()),
        ];
        for (key, value) in &transfer.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        let response: TransferResponse = self.request(Method::POST, "/transfers", Some(&form)).await?;
        debug!("Stripe transfer {} created for {}", response.id, transfer.destination_account);
        Ok(response.id)
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectAccount, FiatRailError> {
        let path = format!("/accounts/{account_id}");
        let response: AccountResponse = self.request(Method::GET, &path, None).await?;
        Ok(ConnectAccount { id: response.id, payouts_enabled: response.payouts_enabled })
    }
}
