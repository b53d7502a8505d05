//! Stripe payment intents client.
//!
//! Uses the form-encoded REST API directly: `POST /payment_intents` to open
//! an intent and `GET /payment_intents/{id}` to read it back.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use url::Url;

use greenhouse_core::OrderId;

use super::{CreateIntent, GatewayError, IntentSnapshot, IntentStatus, PaymentGateway, PaymentIntent};
use crate::config::PaymentGatewayConfig;

/// Metadata key carrying the order id on every intent we create.
const ORDER_ID_METADATA: &str = "orderId";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: IntentStatus,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| GatewayError::Parse(format!("Invalid API key format: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Parse("gateway base URL cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_intent(response: reqwest::Response) -> Result<StripeIntent, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

/// Form fields for a create-intent request.
fn create_form(request: &CreateIntent) -> Vec<(&'static str, String)> {
    vec![
        ("amount", request.amount_minor.to_string()),
        ("currency", request.currency.gateway_code().to_owned()),
        ("metadata[orderId]", request.order_id.to_string()),
        ("automatic_payment_methods[enabled]", "true".to_owned()),
    ]
}

/// Human-readable message from a Stripe error body, falling back to the raw
/// body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.to_owned())
}

impl From<StripeIntent> for IntentSnapshot {
    fn from(intent: StripeIntent) -> Self {
        let order_id = intent
            .metadata
            .get(ORDER_ID_METADATA)
            .and_then(|raw| raw.parse::<OrderId>().ok());
        Self {
            id: intent.id,
            status: intent.status,
            order_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, GatewayError> {
        let url = self.endpoint(&["payment_intents"])?;
        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&create_form(request))
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| GatewayError::Parse("payment intent has no client_secret".to_owned()))?;

        tracing::info!(intent_id = %intent.id, "Created payment intent");
        Ok(PaymentIntent {
            id: intent.id,
            client_secret,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get_intent(&self, intent_id: &str) -> Result<IntentSnapshot, GatewayError> {
        let url = self.endpoint(&["payment_intents", intent_id])?;
        let response = self.client.get(url).send().await?;
        Self::read_intent(response).await.map(IntentSnapshot::from)
    }
}
