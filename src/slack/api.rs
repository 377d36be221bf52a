//! The few Slack Web API calls the RTM adapter needs.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::bot::TransportError;

const AUTH_ERRORS: [&str; 4] = [
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
];

#[derive(Debug, Clone, Deserialize)]
struct SlackResponse<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RtmConnectBody {
    url: Option<String>,
    #[serde(rename = "self")]
    me: Option<SlackIdentity>,
    team: Option<SlackIdentity>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackIdentity {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConversationsBody {
    #[serde(default)]
    channels: Vec<SlackChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannel {
    name: String,
    #[serde(default)]
    is_member: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EmptyBody {}

/// Result of `rtm.connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmSession {
    pub url: String,
    pub self_id: String,
    pub self_name: String,
    pub team: Option<String>,
}

pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
}

impl SlackApiClient {
    pub fn new(
        api_base: &str,
        token: SecretString,
        request_timeout_ms: u64,
    ) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("teamprops"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to create slack client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn rtm_connect(&self) -> Result<RtmSession, TransportError> {
        let body: RtmConnectBody = self
            .call("rtm.connect", self.http.get(self.url("rtm.connect")), TransportError::Connect)
            .await?;

        let url = body
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| TransportError::Connect("rtm.connect did not return url".to_string()))?;
        let me = body
            .me
            .ok_or_else(|| TransportError::Connect("rtm.connect did not return self".to_string()))?;

        Ok(RtmSession {
            url,
            self_id: me.id,
            self_name: me.name,
            team: body.team.map(|team| team.name),
        })
    }

    /// Names of the public and private channels the bot is a member of.
    pub async fn member_channels(&self) -> Result<Vec<String>, TransportError> {
        let url = format!(
            "{}?types=public_channel,private_channel&exclude_archived=true&limit=200",
            self.url("users.conversations")
        );
        let body: ConversationsBody = self
            .call("users.conversations", self.http.get(url), TransportError::Connect)
            .await?;

        Ok(body
            .channels
            .into_iter()
            .filter(|channel| channel.is_member)
            .map(|channel| channel.name)
            .collect())
    }

    pub async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        name: &str,
    ) -> Result<(), TransportError> {
        let payload = json!({
            "channel": channel,
            "timestamp": timestamp,
            "name": name,
        });
        let _: EmptyBody = self
            .call(
                "reactions.add",
                self.http.post(self.url("reactions.add")).json(&payload),
                TransportError::Reaction,
            )
            .await?;
        Ok(())
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn call<T, E>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
        on_error: E,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        E: Fn(String) -> TransportError,
    {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| on_error(format!("slack {method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(on_error(format!(
                "slack {method} failed with status {}",
                status.as_u16()
            )));
        }

        let parsed = response
            .json::<SlackResponse<T>>()
            .await
            .map_err(|e| on_error(format!("failed to decode slack {method}: {e}")))?;

        if parsed.ok {
            Ok(parsed.body)
        } else {
            Err(classify_api_error(
                method,
                parsed.error.as_deref().unwrap_or("unknown_error"),
                on_error,
            ))
        }
    }
}

/// Credential errors are fatal whatever the method; anything else goes
/// through `on_error`.
fn classify_api_error<E>(method: &str, code: &str, on_error: E) -> TransportError
where
    E: Fn(String) -> TransportError,
{
    if AUTH_ERRORS.contains(&code) {
        TransportError::InvalidAuth(code.to_string())
    } else {
        on_error(format!("slack {method} failed: {code}"))
    }
}
