use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CheckoutParams, CheckoutSession, Customer, PaymentProvider, ProviderSubscription};

/// Client for the Stripe REST API.
pub struct StripeClient {
    http_client: Client,
    api_base: String,
    secret_key: String,
    max_attempts: u32,
    retry_base: Duration,
}

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Doubling delay before retry `attempt + 1`, capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Stripe returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StripeError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StripeError::Timeout
        } else {
            StripeError::RequestFailed(e.to_string())
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            StripeError::RequestFailed(_) | StripeError::Timeout => true,
            StripeError::Api { status, .. } => *status == 429 || *status >= 500,
            StripeError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: String,
    #[serde(default)]
    current_period_end: Option<i64>,
    items: StripeItems,
}

#[derive(Debug, Deserialize)]
struct StripeItems {
    data: Vec<StripeItem>,
}

#[derive(Debug, Deserialize)]
struct StripeItem {
    price: StripePrice,
    /// Newer API versions report the period per item.
    #[serde(default)]
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

impl From<StripeSubscription> for ProviderSubscription {
    fn from(sub: StripeSubscription) -> Self {
        let item = sub.items.data.into_iter().next();
        let period_end = sub
            .current_period_end
            .or_else(|| item.as_ref().and_then(|i| i.current_period_end));

        ProviderSubscription {
            id: sub.id,
            customer_id: sub.customer,
            price_id: item.map(|i| i.price.id),
            current_period_end: period_end.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

impl StripeClient {
    pub fn new(
        api_base: &str,
        secret_key: &str,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Self, StripeError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StripeError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            max_attempts: max_attempts.max(1),
            retry_base: Duration::from_millis(200),
        })
    }

    /// Override the first backoff delay (doubles on each retry).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// GET with bounded exponential backoff on transport errors, 429 and 5xx.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StripeError> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.get_once(&url, query).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = backoff_delay(self.retry_base, attempt);
                    tracing::warn!(
                        "Stripe GET {} attempt {} failed ({}), retrying after {}ms",
                        path,
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StripeError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(StripeError::from_reqwest)?;

        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StripeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        return Err(StripeError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| StripeError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn find_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, StripeError> {
        let list: StripeList<StripeCustomer> = self
            .get_with_retry("/v1/customers", &[("email", email), ("limit", "10")])
            .await?;

        if list.has_more {
            tracing::warn!("More than 10 Stripe customers share one email");
        }

        Ok(list
            .data
            .into_iter()
            .filter(|c| !c.deleted)
            .map(|c| Customer {
                id: c.id,
                email: c.email,
            })
            .collect())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError> {
        let path = format!("/v1/customers/{}", customer_id);
        match self.get_with_retry::<StripeCustomer>(&path, &[]).await {
            Ok(c) if c.deleted => Ok(None),
            Ok(c) => Ok(Some(Customer {
                id: c.id,
                email: c.email,
            })),
            Err(StripeError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ProviderSubscription>, StripeError> {
        let list: StripeList<StripeSubscription> = self
            .get_with_retry(
                "/v1/subscriptions",
                &[("customer", customer_id), ("status", "active"), ("limit", "10")],
            )
            .await?;

        Ok(list.data.into_iter().map(ProviderSubscription::from).collect())
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", params.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url.as_str()),
            ("cancel_url", params.cancel_url.as_str()),
            ("client_reference_id", params.user_id.as_str()),
            ("metadata[user_id]", params.user_id.as_str()),
            ("subscription_data[metadata][user_id]", params.user_id.as_str()),
        ];
        match &params.customer_id {
            Some(customer_id) => form.push(("customer", customer_id.as_str())),
            None => form.push(("customer_email", params.customer_email.as_str())),
        }

        let url = format!("{}/v1/checkout/sessions", self.api_base);
        tracing::debug!("Creating Stripe checkout session for price {}", params.price_id);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(StripeError::from_reqwest)?;

        let session: StripeCheckoutSession = parse_response(response).await?;
        let url = session
            .url
            .ok_or_else(|| StripeError::InvalidResponse("checkout session has no url".to_string()))?;

        Ok(CheckoutSession { id: session.id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::mock_stripe::{checkout_session_json, customer_list_json, subscription_list_json};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new(&server.uri(), "sk_test_123", Duration::from_secs(2), 3)
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    fn checkout_params(customer_id: Option<&str>) -> CheckoutParams {
        CheckoutParams {
            price_id: "price_premium".to_string(),
            customer_id: customer_id.map(String::from),
            customer_email: "ana@escola.com".to_string(),
            user_id: "u1".to_string(),
            success_url: "http://app/dashboard".to_string(),
            cancel_url: "http://app/planos".to_string(),
        }
    }

    #[test]
    fn test_backoff_delay_doubles_then_caps() {
        let base = Duration::from_millis(200);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_find_customers_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .and(query_param("email", "ana@escola.com"))
            .and(header("authorization", "Bearer sk_test_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_list_json(&[
                ("cus_new", "ana@escola.com"),
                ("cus_old", "ana@escola.com"),
            ])))
            .mount(&server)
            .await;

        let customers = client(&server).find_customers_by_email("ana@escola.com").await.unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].id, "cus_new");
    }

    #[tokio::test]
    async fn test_list_active_subscriptions_reads_price_and_period() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/subscriptions"))
            .and(query_param("customer", "cus_1"))
            .and(query_param("status", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(subscription_list_json(&[(
                "sub_1",
                "cus_1",
                "price_premium",
                1_900_000_000,
            )])))
            .mount(&server)
            .await;

        let subs = client(&server).list_active_subscriptions("cus_1").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].price_id.as_deref(), Some("price_premium"));
        assert_eq!(subs[0].current_period_end.unwrap().timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn test_period_end_falls_back_to_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "has_more": false,
                "data": [{
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "active",
                    "items": {"data": [{"price": {"id": "price_basic"}, "current_period_end": 1_800_000_000}]}
                }]
            })))
            .mount(&server)
            .await;

        let subs = client(&server).list_active_subscriptions("cus_1").await.unwrap();
        assert_eq!(subs[0].current_period_end.unwrap().timestamp(), 1_800_000_000);
    }

    #[tokio::test]
    async fn test_read_retries_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_list_json(&[(
                "cus_1",
                "ana@escola.com",
            )])))
            .mount(&server)
            .await;

        let customers = client(&server).find_customers_by_email("ana@escola.com").await.unwrap();
        assert_eq!(customers.len(), 1);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).find_customers_by_email("ana@escola.com").await.unwrap_err();
        assert!(matches!(err, StripeError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid API Key provided", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).find_customers_by_email("ana@escola.com").await.unwrap_err();
        match err {
            StripeError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API Key provided");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_customer_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers/cus_gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).get_customer("cus_gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = StripeClient::new(&server.uri(), "sk_test_123", Duration::from_millis(50), 1).unwrap();
        let err = client.find_customers_by_email("ana@escola.com").await.unwrap_err();
        assert!(matches!(err, StripeError::Timeout));
    }

    #[tokio::test]
    async fn test_checkout_uses_existing_customer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("customer=cus_1"))
            .and(body_string_contains("metadata%5Buser_id%5D=u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(checkout_session_json("cs_1")))
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server)
            .create_checkout_session(&checkout_params(Some("cus_1")))
            .await
            .unwrap();
        assert_eq!(session.id, "cs_1");
        assert!(session.url.contains("cs_1"));
    }

    #[tokio::test]
    async fn test_checkout_falls_back_to_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("customer_email=ana%40escola.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(checkout_session_json("cs_2")))
            .mount(&server)
            .await;

        let session = client(&server).create_checkout_session(&checkout_params(None)).await.unwrap();
        assert_eq!(session.id, "cs_2");
    }

    #[tokio::test]
    async fn test_checkout_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .create_checkout_session(&checkout_params(None))
            .await
            .unwrap_err();
        assert!(matches!(err, StripeError::Api { status: 503, .. }));
    }
}
