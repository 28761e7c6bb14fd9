//! HTTP client for the payment gateway API.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::error::GatewayError;
use super::types::{CheckoutSession, CreateCheckoutRequest, MerchantAccountStatus};
use super::PaymentGateway;

/// Gateway credentials and endpoints, loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let secret_key = std::env::var("GATEWAY_SECRET_KEY")
            .map_err(|_| GatewayError::Config("Missing GATEWAY_SECRET_KEY".into()))?;
        let webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET")
            .map_err(|_| GatewayError::Config("Missing GATEWAY_WEBHOOK_SECRET".into()))?;

        let sandbox = std::env::var("GATEWAY_SANDBOX")
            .map(|v| v == "true")
            .unwrap_or(false);

        let base_url = std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| {
            if sandbox {
                "https://sandbox-api.paygateway.example".to_string()
            } else {
                "https://api.paygateway.example".to_string()
            }
        });

        Ok(GatewayConfig {
            secret_key,
            webhook_secret,
            base_url,
        })
    }
}

/// Production [`PaymentGateway`] implementation over reqwest.
#[derive(Clone)]
pub struct HttpGateway {
    config: Arc<GatewayConfig>,
    http_client: Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(HttpGateway {
            config: Arc::new(config),
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Parse(e.to_string()))
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());

            Err(GatewayError::Api {
                status_code: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_checkout(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.post("/v1/checkouts", &request).await
    }

    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.get(&format!("/v1/checkouts/{checkout_id}")).await
    }

    async fn merchant_status(
        &self,
        merchant_code: &str,
    ) -> Result<MerchantAccountStatus, GatewayError> {
        self.get(&format!("/v1/merchants/{merchant_code}/status"))
            .await
    }
}
