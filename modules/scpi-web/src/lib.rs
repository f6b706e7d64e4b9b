//! SCPI commands relayed through the scope's web control page.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, HOST, LOCATION, ORIGIN, REFERER,
    USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use trykeys_core::{ScpiRelay, ScpiReply};
use url::Url;

pub const CONTROL_PAGE: &str = "SCPI_control.php";
pub const COMMAND_ENDPOINT: &str = "device_read_write.php";

/// Redirect hops followed while loading the control page.
const MAX_REDIRECTS: usize = 10;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/69.0.3497.100 Safari/537.36";

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions { timeout_ms: 10_000, user_agent: BROWSER_USER_AGENT.to_string() }
    }
}

pub struct WebRelay {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl WebRelay {
    /// Load the control page once to pick up the session cookies. Redirects are followed here
    /// only; command POSTs never follow them.
    pub fn connect(host: &str, opts: &RelayOptions) -> Result<Self> {
        let base = Url::parse(&format!("http://{}/", host)).with_context(|| format!("invalid scope address {}", host))?;
        let control = base.join(CONTROL_PAGE)?;
        let endpoint = base.join(COMMAND_ENDPOINT)?;
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(Duration::from_millis(opts.timeout_ms))
            .gzip(true)
            .deflate(true)
            .build()
            .context("failed to build HTTP client")?;

        bootstrap(&client, control.clone())?;

        let headers = browser_headers(host, &control, &opts.user_agent)?;
        Ok(WebRelay { client, endpoint, headers })
    }

    pub fn execute(&self, command: &str) -> Result<ScpiReply> {
        let envelope = envelope(command);
        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .form(&[("cmd", envelope.as_str()), ("action", "excutescpicmds")])
            .send()
            .with_context(|| format!("POST {} failed", self.endpoint))?;
        let status = resp.status();
        if status != StatusCode::OK {
            bail!("{} returned HTTP {}", self.endpoint, status);
        }
        let body = resp.text().context("failed to read reply body")?;
        debug!(command, body = %body, "scpi reply");
        parse_reply(&body)
    }
}

/// GET `url`, following redirects by hand, and require a final 200.
fn bootstrap(client: &Client, mut url: Url) -> Result<()> {
    for _ in 0..=MAX_REDIRECTS {
        let resp = client.get(url.clone()).send().with_context(|| format!("GET {} failed", url))?;
        let status = resp.status();
        if status.is_redirection() {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| anyhow!("GET {} returned HTTP {} without a location", url, status))?;
            let next = url.join(location).with_context(|| format!("bad redirect location {:?}", location))?;
            debug!(from = %url, to = %next, "following control page redirect");
            url = next;
            continue;
        }
        if status != StatusCode::OK {
            bail!("GET {} returned HTTP {}", url, status);
        }
        let _ = resp.text();
        return Ok(());
    }
    bail!("too many redirects loading {}", url)
}

impl ScpiRelay for WebRelay {
    fn send_command(&mut self, command: &str) -> Result<ScpiReply> {
        self.execute(command)
    }
}

/// JSON envelope the control page expects in the `cmd` form field.
pub fn envelope(command: &str) -> String {
    serde_json::json!({ "cmd": command, "type": "ds", "to": "127.0.0.1" }).to_string()
}

/// Parse a reply body. The scope may send several JSON objects back to back; their fields are
/// merged and later objects win.
pub fn parse_reply(body: &str) -> Result<ScpiReply> {
    let cleaned = body.replace("\\r\\n", "").replace("\r\n", "");
    let mut merged = Map::new();
    for value in serde_json::Deserializer::from_str(&cleaned).into_iter::<Value>() {
        match value.with_context(|| format!("malformed reply {:?}", body))? {
            Value::Object(fields) => merged.extend(fields),
            other => bail!("unexpected reply value {}", other),
        }
    }
    if merged.is_empty() {
        return Err(anyhow!("empty reply"));
    }
    let success = match merged.get("success") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    };
    let result = match merged.get("cmdrslt") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(ScpiReply { success, result })
}

fn browser_headers(host: &str, control: &Url, user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
    headers.insert(REFERER, HeaderValue::from_str(control.as_str())?);
    headers.insert(ORIGIN, HeaderValue::from_str(&format!("http://{}", host))?);
    headers.insert(HOST, HeaderValue::from_str(host)?);
    Ok(headers)
}
