use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use reqwest::{Client, Url};
use tracing::{info, instrument, warn};

use crate::{
    config::SpotifySettings,
    spotify::{
        Result, SCOPES, SpotifyApi, SpotifyConnector, SpotifyError, WebApiClient,
        types::TokenResponse,
    },
    types::Token,
};

/// OAuth 2.0 authorization-code (PKCE) flow against the Spotify accounts service.
///
/// The connector owns the shared `reqwest::Client` and the application
/// credentials. Token exchanges authenticate the application with HTTP Basic
/// credentials and prove possession of the login's PKCE verifier.
///
/// # Example
///
/// ```ignore
/// let connector = WebApiConnector::new(Client::new(), Arc::new(settings));
/// let url = connector.authorize_url(&state, &utils::generate_code_challenge(&verifier));
/// // ... browser returns to /auth/callback?code=...
/// let token = connector.exchange_code(&code, &verifier).await?;
/// let mut api = connector.handle();
/// api.set_token(token);
/// ```
#[derive(Clone)]
pub struct WebApiConnector {
    http: Client,
    settings: Arc<SpotifySettings>,
}

impl WebApiConnector {
    pub fn new(http: Client, settings: Arc<SpotifySettings>) -> Self {
        Self { http, settings }
    }

    fn basic_auth(&self) -> String {
        let credentials = format!(
            "{}:{}",
            self.settings.client_id, self.settings.client_secret
        );
        format!("Basic {}", STANDARD.encode(credentials))
    }

    /// Posts a token request and turns the response into a [`Token`].
    ///
    /// `previous_refresh` is kept when the provider does not rotate the refresh
    /// credential.
    async fn request_token(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<&str>,
    ) -> Result<Token> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .header(reqwest::header::AUTHORIZATION, self.basic_auth())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "token endpoint rejected request");
            return Err(SpotifyError::OAuth(format!("token endpoint returned {}", status)));
        }

        let json = response.json::<TokenResponse>().await?;
        let refresh_token = json
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();

        Ok(Token {
            access_token: json.access_token,
            refresh_token,
            scope: json.scope.unwrap_or_default(),
            expires_in: json.expires_in,
            obtained_at: Utc::now().timestamp() as u64,
        })
    }
}

#[async_trait]
impl SpotifyConnector for WebApiConnector {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let scope = SCOPES.join(" ");
        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
            ("state", state),
            ("scope", scope.as_str()),
        ];

        match Url::parse_with_params(&self.settings.auth_url, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(error = %e, url = %self.settings.auth_url, "invalid authorize url");
                self.settings.auth_url.clone()
            }
        }
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Token> {
        let token = self
            .request_token(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.settings.redirect_uri.as_str()),
                    ("code_verifier", code_verifier),
                ],
                None,
            )
            .await?;
        info!(scope = %token.scope, "authorization code exchanged");
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn refresh_token(&self, token: &Token) -> Result<Token> {
        if token.refresh_token.is_empty() {
            return Err(SpotifyError::OAuth("no refresh token".to_string()));
        }

        self.request_token(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
            ],
            Some(token.refresh_token.as_str()),
        )
        .await
    }

    fn handle(&self) -> Box<dyn SpotifyApi> {
        Box::new(WebApiClient::new(
            self.http.clone(),
            self.settings.api_url.clone(),
        ))
    }
}
