use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use oauth2::TokenResponse;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret as OAuthClientSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server, StatusCode};
use url::Url;

use crate::auth::client_secret::ClientSecret;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens returned by the oauth flow (in-memory)
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

fn basic_client(secret: &ClientSecret) -> Result<BasicClient> {
    let client_id = ClientId::new(secret.client_id.clone());
    let client_secret = secret.client_secret.clone().map(OAuthClientSecret::new);
    let auth_url = AuthUrl::new(secret.auth_uri.clone())?;
    let token_url = TokenUrl::new(secret.token_uri.clone())?;
    Ok(BasicClient::new(
        client_id,
        client_secret,
        auth_url,
        Some(token_url),
    ))
}

fn into_tokens(token: &BasicTokenResponse) -> Tokens {
    Tokens {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
        expires_in: token.expires_in().map(|d| d.as_secs()),
    }
}

/// Exchange a refresh token for a new access token using the oauth2 crate
pub fn refresh_access_token(secret: &ClientSecret, refresh_token: &str) -> Result<Tokens> {
    let oauth_client = basic_client(secret)?;
    let rt = RefreshToken::new(refresh_token.to_string());
    let token = oauth_client
        .exchange_refresh_token(&rt)
        .request(http_client)?;
    Ok(into_tokens(&token))
}

/// Authorization Code + PKCE against a loopback listener on an OS-assigned
/// port. Opens the system browser and waits for the redirect.
pub fn perform_pkce_flow(secret: &ClientSecret, scope: &str) -> Result<Tokens> {
    // Listen first so the redirect can't beat us to the port.
    let server = Server::http("127.0.0.1:0")
        .map_err(|e| anyhow!("Failed to bind OAuth callback server: {e}"))?;
    let port = server.server_addr().port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    debug!("OAuth callback listening on {redirect_uri}");

    let oauth_client =
        basic_client(secret)?.set_redirect_uri(RedirectUrl::new(redirect_uri.clone())?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(scope.to_string()))
        .set_pkce_challenge(pkce_challenge)
        // ask for a refresh token so later runs skip the browser
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url();

    println!("Open this URL in your browser:\n{auth_url}");
    // best-effort: don't fail if browser can't be opened
    if let Err(e) = open::that(auth_url.as_str()) {
        warn!("could not open browser automatically: {e}");
    }

    let mut code_opt: Option<String> = None;
    let wait_until = Instant::now() + CALLBACK_TIMEOUT;

    while Instant::now() < wait_until {
        let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };
        let Some(request) = maybe_request else {
            continue;
        };

        match parse_callback(request.url(), csrf_token.secret()) {
            Ok(Some(code)) => {
                let _ = request.respond(Response::from_string(
                    "Authorization received. You can close this tab.",
                ));
                code_opt = Some(code);
                break;
            }
            Ok(None) => {
                // favicon and friends
                let _ =
                    request.respond(Response::from_string("").with_status_code(StatusCode(404)));
            }
            Err(e) => {
                let _ = request.respond(Response::from_string(
                    "Authorization failed. You can close this tab.",
                ));
                return Err(e);
            }
        }
    }

    let code = code_opt.ok_or_else(|| anyhow!("No code received within timeout"))?;

    let token = oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request(http_client)
        .map_err(|e| anyhow!("Token exchange failed: {e:?}"))?;

    info!("authorization completed");
    Ok(into_tokens(&token))
}

/// Inspect a redirect request path such as `/?state=..&code=..`.
/// `Ok(None)` means the request is unrelated to the flow.
fn parse_callback(request_path: &str, expected_state: &str) -> Result<Option<String>> {
    let url = Url::parse("http://127.0.0.1/")?.join(request_path)?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(e) = error {
        return Err(anyhow!("authorization was denied: {e}"));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(anyhow!("OAuth state mismatch in redirect"));
    }
    Ok(Some(code))
}
