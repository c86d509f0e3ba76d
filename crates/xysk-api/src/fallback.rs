// HTTP fallback client
//
// Issues the REST equivalent of a command when no socket is open. Only a
// handful of actions have REST routes on the bridge; everything else is
// `Error::Unmapped`. Each successful write is followed by a status read so
// callers always get fresh readings back.

use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::protocol::{Command, InboundMessage};
use crate::transport::HttpConfig;

/// Action name status reads are republished under.
pub const STATUS_ACTION: &str = "statusResponse";

/// REST equivalent of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackRoute {
    Get { path: &'static str },
    Post { path: &'static str, body: Value },
}

impl FallbackRoute {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Get { path } | Self::Post { path, .. } => path,
        }
    }
}

/// Map a command to its REST route, if the bridge has one.
pub fn route_for(command: &Command) -> Option<FallbackRoute> {
    match command {
        Command::PowerOutput { enable } | Command::SetOutputState { enable } => {
            Some(FallbackRoute::Post {
                path: "api/power",
                body: json!({ "enable": enable }),
            })
        }
        Command::SetVoltage { voltage } => Some(FallbackRoute::Post {
            path: "api/voltage",
            body: json!({ "voltage": voltage }),
        }),
        Command::SetCurrent { current } => Some(FallbackRoute::Post {
            path: "api/current",
            body: json!({ "current": current }),
        }),
        Command::GetStatus | Command::GetData => Some(FallbackRoute::Get { path: "api/data" }),
        _ => None,
    }
}

/// Raw REST client for the bridge's `/api/*` endpoints.
pub struct FallbackClient {
    http: reqwest::Client,
    base_url: Url,
}

impl FallbackClient {
    /// Build a client rooted at `base_url` (e.g. `http://192.168.4.1/`).
    pub fn new(base_url: Url, config: &HttpConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Execute `command` over REST and return the resulting status read.
    ///
    /// Writes are POSTed, then `GET /api/data` fetches the new state.
    pub async fn execute(&self, command: &Command) -> Result<InboundMessage, Error> {
        let route = route_for(command).ok_or_else(|| Error::Unmapped {
            action: command.action().to_owned(),
        })?;

        match route {
            FallbackRoute::Get { .. } => self.fetch_data().await,
            FallbackRoute::Post { path, body } => {
                self.post(path, &body).await?;
                self.fetch_data().await
            }
        }
    }

    /// `GET /api/data`, republished as a `statusResponse` message.
    pub async fn fetch_data(&self) -> Result<InboundMessage, Error> {
        let mut body = self.get_json("api/data").await?;

        let Some(object) = body.as_object_mut() else {
            return Err(Error::Deserialization {
                message: "status body is not a JSON object".into(),
                body: body.to_string(),
            });
        };
        object.insert("action".into(), Value::String(STATUS_ACTION.into()));

        Ok(InboundMessage::from_value(body))
    }

    /// `GET /api/wifi/status`.
    pub async fn wifi_status(&self) -> Result<Value, Error> {
        self.get_json("api/wifi/status").await
    }

    /// `GET /ping`, which answers with plain-text `pong`.
    pub async fn ping(&self) -> Result<String, Error> {
        let url = self.url("ping")?;
        debug!("GET {}", url);

        let resp = self.http.get(url.clone()).send().await?;
        let resp = check_status(resp, &url)?;
        Ok(resp.text().await?.trim().to_owned())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json(&self, path: &str) -> Result<Value, Error> {
        let url = self.url(path)?;
        debug!("GET {}", url);

        let resp = self.http.get(url.clone()).send().await?;
        let body = check_status(resp, &url)?.text().await?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let resp = self.http.post(url.clone()).json(body).send().await?;
        check_status(resp, &url)?;
        Ok(())
    }
}

fn check_status(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(Error::RequestFailed {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
