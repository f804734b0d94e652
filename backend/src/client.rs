//! Typed HTTP client for the Edufin API.
//!
//! The client owns an explicit [`Session`]; every authenticated call reads the
//! bearer token from it, and any `401` answer drops it back to anonymous.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use edufin_common::{
    CheckoutRequest, CheckoutResponse, ErrorBody, LogoutRequest, RefreshRequest, Session,
    SessionResponse, SigninRequest, SigninResponse, SignupRequest, SignupResponse,
    SubscriptionStatus, UserProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("{message} ({status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Not signed in")]
    NotAuthenticated,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub struct ApiClient {
    http_client: Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Session::Anonymous,
        })
    }

    /// Resume a session persisted by the caller.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn register(&self, request: &SignupRequest) -> Result<SignupResponse, ClientError> {
        let builder = self.http_client.post(self.url("/signup")).json(request);
        parse(send(builder).await?).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let request = SigninRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        };
        let builder = self.http_client.post(self.url("/signin")).json(&request);
        let response: SigninResponse = parse(send(builder).await?).await?;

        let user = response.user.clone();
        self.session.establish(response);
        Ok(user)
    }

    /// Sign out on the server, best effort. The local session is always cleared.
    pub async fn logout(&mut self) {
        if let Some(token) = self.session.bearer() {
            let body = LogoutRequest {
                refresh_token: self.session.refresh_token().map(String::from),
            };
            let builder = self
                .http_client
                .post(self.url("/logout"))
                .bearer_auth(token)
                .json(&body);

            if let Err(e) = send(builder).await {
                tracing::warn!("Server logout failed, clearing local session anyway: {}", e);
            }
        }
        self.session.clear();
    }

    /// Ask the server whether the held token is still good.
    ///
    /// Never fails: errors read as anonymous. A negative answer also clears
    /// the local session; a transport failure leaves it in place.
    pub async fn get_session(&mut self) -> SessionResponse {
        let Some(token) = self.session.bearer() else {
            return SessionResponse::anonymous();
        };

        let builder = self.http_client.get(self.url("/session")).bearer_auth(token);
        let response = match send(builder).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Session check failed: {}", e);
                return SessionResponse::anonymous();
            }
        };

        match parse::<SessionResponse>(response).await {
            Ok(session) if session.is_authenticated => session,
            Ok(session) => {
                self.session.clear();
                session
            }
            Err(e) => {
                tracing::warn!("Session check failed: {}", e);
                SessionResponse::anonymous()
            }
        }
    }

    /// Trade the refresh token for a new pair.
    pub async fn refresh(&mut self) -> Result<UserProfile, ClientError> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(ClientError::NotAuthenticated)?
            .to_string();

        let builder = self.http_client.post(self.url("/token/refresh")).json(&RefreshRequest {
            refresh_token: Some(refresh_token),
        });
        let response: SigninResponse = self.parse_authenticated(builder).await?;

        let user = response.user.clone();
        self.session.establish(response);
        Ok(user)
    }

    pub async fn check_subscription(&mut self) -> Result<SubscriptionStatus, ClientError> {
        let token = self.session.bearer().ok_or(ClientError::NotAuthenticated)?;
        let builder = self
            .http_client
            .post(self.url("/check-subscription"))
            .bearer_auth(token);
        self.parse_authenticated(builder).await
    }

    /// Start a hosted checkout and return the URL to send the user to.
    pub async fn create_checkout(
        &mut self,
        price_id: &str,
        success_path: Option<&str>,
    ) -> Result<String, ClientError> {
        let token = self.session.bearer().ok_or(ClientError::NotAuthenticated)?;
        let builder = self
            .http_client
            .post(self.url("/create-checkout-session"))
            .bearer_auth(token)
            .json(&CheckoutRequest {
                price_id: Some(price_id.to_string()),
                success_path: success_path.map(String::from),
            });

        let response: CheckoutResponse = self.parse_authenticated(builder).await?;
        Ok(response.url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Parse a response to a call that needed credentials; 401 ends the session.
    async fn parse_authenticated<T: DeserializeOwned>(
        &mut self,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let result = parse(send(builder).await?).await;
        if let Err(ClientError::Api { status: 401, .. }) = &result {
            self.session.clear();
        }
        result
    }
}

async fn send(builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
    builder
        .send()
        .await
        .map_err(|e| ClientError::RequestFailed(e.to_string()))
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.error),
        Err(_) => (
            String::new(),
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        ),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signin_body(token: &str, refresh: &str) -> serde_json::Value {
        json!({
            "success": true,
            "token": token,
            "refreshToken": refresh,
            "user": {"id": "u1", "email": "ana@escola.com", "firstName": "Ana", "lastName": "Souza"}
        })
    }

    async fn signed_in_client(server: &MockServer) -> ApiClient {
        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(signin_body("tok_1", "ref_1")))
            .mount(server)
            .await;

        let mut client = ApiClient::new(&server.uri()).unwrap();
        client.login("ana@escola.com", "senha-forte").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let server = MockServer::start().await;
        let client = signed_in_client(&server).await;

        assert!(client.session().is_authenticated());
        assert_eq!(client.session().bearer(), Some("tok_1"));
        assert_eq!(client.session().user().unwrap().first_name, "Ana");
    }

    #[tokio::test]
    async fn test_login_failure_keeps_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "Invalid email or password",
                "code": "invalid_credentials"
            })))
            .mount(&server)
            .await;

        let mut client = ApiClient::new(&server.uri()).unwrap();
        let err = client.login("ana@escola.com", "errada").await.unwrap_err();

        match err {
            ClientError::Api { status, code, message } => {
                assert_eq!(status, 401);
                assert_eq!(code, "invalid_credentials");
                assert_eq!(message, "Invalid email or password");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_register() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/signup"))
            .and(body_json(json!({
                "email": "ana@escola.com",
                "password": "senha-forte",
                "firstName": "Ana",
                "lastName": "Souza"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": true, "id": "u1"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let response = client
            .register(&SignupRequest {
                email: Some("ana@escola.com".to_string()),
                password: Some("senha-forte".to_string()),
                first_name: Some("Ana".to_string()),
                last_name: Some("Souza".to_string()),
            })
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.id, "u1");
    }

    #[tokio::test]
    async fn test_get_session_anonymous_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = ApiClient::new(&server.uri()).unwrap();
        assert!(!client.get_session().await.is_authenticated);
    }

    #[tokio::test]
    async fn test_get_session_negative_answer_clears() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .and(header("authorization", "Bearer tok_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isAuthenticated": false})))
            .mount(&server)
            .await;

        let response = client.get_session().await;
        assert!(!response.is_authenticated);
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_get_session_fails_open() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let response = client.get_session().await;
        assert!(!response.is_authenticated);
        assert!(response.user.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .and(body_json(json!({"refreshToken": "ref_1"})))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        client.logout().await;
        assert_eq!(client.session(), &Session::Anonymous);
    }

    #[tokio::test]
    async fn test_refresh_rotates_session() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/token/refresh"))
            .and(body_json(json!({"refreshToken": "ref_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(signin_body("tok_2", "ref_2")))
            .mount(&server)
            .await;

        client.refresh().await.unwrap();
        assert_eq!(client.session().bearer(), Some("tok_2"));
        assert_eq!(client.session().refresh_token(), Some("ref_2"));
    }

    #[tokio::test]
    async fn test_unauthorized_drops_session() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/check-subscription"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "Unauthorized: Token expired",
                "code": "unauthorized"
            })))
            .mount(&server)
            .await;

        let err = client.check_subscription().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_check_subscription() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/check-subscription"))
            .and(header("authorization", "Bearer tok_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscribed": true,
                "subscriptionTier": "Escola Premium",
                "subscriptionEnd": "2030-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let status = client.check_subscription().await.unwrap();
        assert!(status.subscribed);
        assert_eq!(status.subscription_tier, Some(edufin_common::PlanTier::EscolaPremium));
    }

    #[tokio::test]
    async fn test_resumed_session_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check-subscription"))
            .and(header("authorization", "Bearer tok_saved"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscribed": false})))
            .expect(1)
            .mount(&server)
            .await;

        let saved = Session::Authenticated {
            token: "tok_saved".to_string(),
            refresh_token: "ref_saved".to_string(),
            user: UserProfile {
                id: "u1".to_string(),
                email: "ana@escola.com".to_string(),
                first_name: "Ana".to_string(),
                last_name: "Souza".to_string(),
            },
        };
        let mut client = ApiClient::new(&server.uri()).unwrap().with_session(saved.clone());
        assert_eq!(client.session(), &saved);

        let status = client.check_subscription().await.unwrap();
        assert!(!status.subscribed);
    }

    #[tokio::test]
    async fn test_create_checkout_requires_session() {
        let mut client = ApiClient::new("http://127.0.0.1:1").unwrap();
        let err = client.create_checkout("price_p", None).await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_create_checkout_returns_url() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/create-checkout-session"))
            .and(body_json(json!({"priceId": "price_p", "successPath": "/obrigado"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "https://checkout.stripe.test/cs_1"
            })))
            .mount(&server)
            .await;

        let url = client.create_checkout("price_p", Some("/obrigado")).await.unwrap();
        assert_eq!(url, "https://checkout.stripe.test/cs_1");
    }
}
