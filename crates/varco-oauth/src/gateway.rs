//! WSO2 gateway wiring the endpoint clients behind `IdpGateway`

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use varco_core::{
    AuthorizeUrlListener, AuthorizeUrlRequest, ClaimSet, ClaimsListener, IdpGateway, IdpSettings,
    Result, TokenBundle, VarcoError,
};

use crate::authorize::AuthorizationUrlBuilder;
use crate::client::HttpClient;
use crate::jwks::IdTokenValidator;
use crate::token::TokenExchangeClient;
use crate::userinfo::UserInfoClient;

/// The gateway to the WSO2 Identity Server. Owns the authorization-URL
/// builder, token and userinfo clients, the ID-token validator and the
/// registered extension listeners.
pub struct Wso2Gateway {
    settings: Arc<IdpSettings>,
    url_builder: AuthorizationUrlBuilder,
    token_client: TokenExchangeClient,
    userinfo_client: UserInfoClient,
    id_token_validator: IdTokenValidator,
    claims_listeners: Vec<Arc<dyn ClaimsListener>>,
}

impl Wso2Gateway {
    pub fn new(settings: Arc<IdpSettings>) -> Result<Self> {
        let http = HttpClient::new(settings.accept_invalid_certs())?;

        Ok(Self {
            url_builder: AuthorizationUrlBuilder::new(settings.clone()),
            token_client: TokenExchangeClient::new(settings.clone(), http.clone()),
            userinfo_client: UserInfoClient::new(settings.clone(), http.clone()),
            id_token_validator: IdTokenValidator::new(settings.clone(), http),
            claims_listeners: vec![],
            settings,
        })
    }

    pub fn with_url_listener(mut self, listener: Arc<dyn AuthorizeUrlListener>) -> Self {
        self.url_builder = self.url_builder.with_listener(listener);
        self
    }

    pub fn with_claims_listener(mut self, listener: Arc<dyn ClaimsListener>) -> Self {
        self.claims_listeners.push(listener);
        self
    }
}

#[async_trait]
impl IdpGateway for Wso2Gateway {
    fn authorization_url(&self, request: &AuthorizeUrlRequest) -> Result<String> {
        self.url_builder.build(request)
    }

    fn logout_url(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> String {
        let mut url = format!(
            "{}?post_logout_redirect_uri={}",
            self.settings.logout_endpoint(),
            urlencoding::encode(post_logout_redirect),
        );
        if let Some(hint) = id_token_hint {
            url.push_str(&format!("&id_token_hint={}", urlencoding::encode(hint)));
        }
        url
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenBundle> {
        let bundle = self.token_client.exchange(code).await?;

        if let Some(id_token) = &bundle.id_token {
            self.id_token_validator.validate(id_token).await.map_err(|e| {
                warn!("ID token validation failed");
                e
            })?;
        }

        info!("Authorization code exchanged");
        Ok(bundle)
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle> {
        self.token_client.refresh(refresh_token).await
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_userinfo(&self, access_token: &str) -> Result<ClaimSet> {
        let mut claims = self.userinfo_client.fetch(access_token).await?;

        for listener in &self.claims_listeners {
            listener.post_fetch(&mut claims);
        }

        if claims.is_empty() {
            return Err(VarcoError::malformed("idp-userinfo", "empty claim set"));
        }

        Ok(claims)
    }
}
