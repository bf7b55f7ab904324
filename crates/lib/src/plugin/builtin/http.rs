//! The `http` datasource: performs one HTTP request and exposes the response.
//!
//! Config:
//! - `url` (required)
//! - `method` (optional, default `GET`)
//! - `request_headers` (optional map of strings)
//! - `request_body` (optional string)
//!
//! Result: `url`, `status_code`, `body`, `response_headers`.
//!
//! Non-success statuses fail the datasource.

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, info};

use crate::plugin::{Datasource, PluginContext, PluginError};
use crate::value::{Value, ValueMap};

#[derive(Debug)]
struct Request {
  url: String,
  method: Method,
  headers: Vec<(String, String)>,
  body: Option<String>,
}

#[derive(Debug)]
pub struct HttpDatasource {
  client: Client,
  request: Option<Request>,
}

impl HttpDatasource {
  pub fn new(client: Client) -> Self {
    Self { client, request: None }
  }
}

fn required_string(config: &mut ValueMap, key: &str) -> Result<String, PluginError> {
  optional_string(config, key)?.ok_or_else(|| PluginError::Config(format!("'{}' is required", key)))
}

fn optional_string(config: &mut ValueMap, key: &str) -> Result<Option<String>, PluginError> {
  match config.remove(key) {
    None => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    Some(other) => Err(PluginError::Config(format!(
      "'{}' must be a string, got {}",
      key,
      other.kind_name()
    ))),
  }
}

#[async_trait]
impl Datasource for HttpDatasource {
  async fn configure(&mut self, mut config: ValueMap) -> Result<(), PluginError> {
    let url = required_string(&mut config, "url")?;
    let method = match optional_string(&mut config, "method")? {
      Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| PluginError::Config(format!("invalid HTTP method '{}'", method)))?,
      None => Method::GET,
    };
    let headers = match config.remove("request_headers") {
      None => Vec::new(),
      Some(Value::Map(map)) => map
        .into_iter()
        .map(|(name, value)| match value {
          Value::String(value) => Ok((name, value)),
          other => Err(PluginError::Config(format!(
            "request header '{}' must be a string, got {}",
            name,
            other.kind_name()
          ))),
        })
        .collect::<Result<Vec<_>, _>>()?,
      Some(other) => {
        return Err(PluginError::Config(format!(
          "'request_headers' must be a map, got {}",
          other.kind_name()
        )));
      }
    };
    let body = optional_string(&mut config, "request_body")?;
    if let Some(key) = config.keys().next() {
      return Err(PluginError::Config(format!("unknown field '{}'", key)));
    }

    self.request = Some(Request {
      url,
      method,
      headers,
      body,
    });
    Ok(())
  }

  async fn execute(&self, _ctx: &PluginContext) -> Result<ValueMap, PluginError> {
    let request = self
      .request
      .as_ref()
      .ok_or_else(|| PluginError::Execute("datasource was not configured".to_string()))?;
    let failed = |message: String| PluginError::Http {
      url: request.url.clone(),
      message,
    };

    info!(url = %request.url, method = %request.method, "requesting");
    let mut builder = self.client.request(request.method.clone(), &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| failed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
      return Err(failed(format!("HTTP {}", status)));
    }

    let mut headers = ValueMap::new();
    for (name, value) in response.headers() {
      let Ok(value) = value.to_str() else {
        debug!(header = %name, "skipping non-text response header");
        continue;
      };
      headers
        .entry(name.as_str().to_string())
        .and_modify(|existing| {
          if let Value::String(existing) = existing {
            existing.push_str(", ");
            existing.push_str(value);
          }
        })
        .or_insert_with(|| Value::from(value));
    }

    let body = response.text().await.map_err(|e| failed(e.to_string()))?;
    debug!(url = %request.url, status = status.as_u16(), size = body.len(), "response received");

    Ok(ValueMap::from([
      ("url".to_string(), Value::from(request.url.as_str())),
      ("status_code".to_string(), Value::from(u64::from(status.as_u16()))),
      ("body".to_string(), Value::String(body)),
      ("response_headers".to_string(), Value::Map(headers)),
    ]))
  }
}
