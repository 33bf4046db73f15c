use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::application::ports::payment_processor::{
    CheckoutRequest, LookupError, LookupResult, PaymentProcessor,
};
use crate::domain::entities::stripe_objects::{
    Metadata, StripeBillingPortalSession, StripeCheckoutSession, StripeCustomer, StripeInvoice,
    StripeList, StripePrice, StripeSubscription,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

const SUBSCRIPTION_EXPAND: &[&str] = &["latest_invoice.payment_intent"];
const INVOICE_EXPAND: &[&str] = &["payment_intent"];
const CHECKOUT_SESSION_EXPAND: &[&str] = &[
    "subscription.latest_invoice.payment_intent",
    "invoice.payment_intent",
    "payment_intent",
];

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self::with_api_base(secret_key, STRIPE_API_BASE)
    }

    pub fn with_api_base(secret_key: SecretString, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        object: &str,
        query: &[(String, String)],
    ) -> LookupResult<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        self.handle_response(response, object).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        object: &str,
        params: &[(String, String)],
    ) -> LookupResult<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        self.handle_response(response, object).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        object: &str,
    ) -> LookupResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Transport(format!("Failed to read response: {}", e)))?;

        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(object.to_string()));
        }

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|e| e.error.message.unwrap_or(e.error.error_type))
                .unwrap_or_else(|_| body.clone());

            return Err(LookupError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, object, "Failed to parse Stripe response");
            LookupError::Decode(e.to_string())
        })
    }
}

fn expand_params(fields: &[&str]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|f| ("expand[]".to_string(), f.to_string()))
        .collect()
}

fn metadata_params(prefix: &str, metadata: &Metadata) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = metadata
        .iter()
        .map(|(k, v)| (format!("{}[{}]", prefix, k), v.clone()))
        .collect();
    params.sort();
    params
}

fn billing_portal_params(customer_id: &str, return_url: &str) -> Vec<(String, String)> {
    vec![
        ("customer".to_string(), customer_id.to_string()),
        ("return_url".to_string(), return_url.to_string()),
    ]
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn retrieve_subscription(&self, subscription_id: &str) -> LookupResult<StripeSubscription> {
        self.get(
            &format!("subscriptions/{}", subscription_id),
            "subscription",
            &expand_params(SUBSCRIPTION_EXPAND),
        )
        .await
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> LookupResult<StripeInvoice> {
        self.get(
            &format!("invoices/{}", invoice_id),
            "invoice",
            &expand_params(INVOICE_EXPAND),
        )
        .await
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> LookupResult<StripeCheckoutSession> {
        self.get(
            &format!("checkout/sessions/{}", session_id),
            "checkout session",
            &expand_params(CHECKOUT_SESSION_EXPAND),
        )
        .await
    }

    async fn find_price_by_lookup_key(&self, lookup_key: &str) -> LookupResult<Option<StripePrice>> {
        let query = vec![
            ("lookup_keys[]".to_string(), lookup_key.to_string()),
            ("active".to_string(), "true".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        let list: StripeList<StripePrice> = self.get("prices", "price", &query).await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_customer(&self, email: &str, metadata: &Metadata) -> LookupResult<StripeCustomer> {
        let mut params = vec![("email".to_string(), email.to_string())];
        params.extend(metadata_params("metadata", metadata));

        self.post("customers", "customer", &params).await
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> LookupResult<StripeCheckoutSession> {
        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), request.customer_id.clone()),
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), request.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                request.client_reference_id.clone(),
            ),
            ("allow_promotion_codes".to_string(), "true".to_string()),
        ];
        params.extend(metadata_params(
            "subscription_data[metadata]",
            &request.subscription_metadata,
        ));

        self.post("checkout/sessions", "checkout session", &params).await
    }

    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> LookupResult<StripeBillingPortalSession> {
        self.post(
            "billing_portal/sessions",
            "billing portal session",
            &billing_portal_params(customer_id, return_url),
        )
        .await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}
