//! Provider-specific request construction.

use reqwest::Url;
use serde_json::{Map, Value, json};

use crate::error::SynthesisError;
use crate::llm::registry::{ServiceDescriptor, WireFamily};

/// Sampling and prompt parameters shared by all backends.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl GenerationParams {
    fn validate(&self) -> Result<(), SynthesisError> {
        if self.model.trim().is_empty() {
            return Err(SynthesisError::PayloadBuild("model name is empty".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(SynthesisError::PayloadBuild(format!(
                "temperature {} is outside 0..=2",
                self.temperature
            )));
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(SynthesisError::PayloadBuild(format!(
                "top-p {} is outside (0, 1]",
                self.top_p
            )));
        }
        if self.max_tokens == 0 {
            return Err(SynthesisError::PayloadBuild(
                "max-tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build the streaming JSON body for `descriptor`.
pub fn build_payload(
    descriptor: &ServiceDescriptor,
    params: &GenerationParams,
    prompt: &str,
) -> Result<Value, SynthesisError> {
    params.validate()?;

    let system = params.system_prompt.trim();
    let mut body = match descriptor.wire_family {
        WireFamily::Generate => json!({
            "model": params.model,
            "system": system,
            "prompt": prompt,
            "stream": true,
            "options": {
                "temperature": params.temperature,
                "top_p": params.top_p,
                "num_predict": params.max_tokens,
            },
        }),
        WireFamily::ChatDelta => {
            let mut messages = Vec::new();
            if !system.is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
            messages.push(json!({"role": "user", "content": prompt}));
            json!({
                "model": params.model,
                "messages": messages,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "max_tokens": params.max_tokens,
                "stream": true,
            })
        }
        WireFamily::ContentBlock => {
            let mut body = json!({
                "model": params.model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "stream": true,
            });
            if !system.is_empty() {
                body["system"] = Value::String(system.to_string());
            }
            body
        }
    };

    if let Value::Object(map) = &mut body {
        for (name, flag) in &descriptor.body_flags {
            map.insert(name.clone(), Value::Bool(*flag));
        }
    }

    Ok(body)
}

/// A parsed API URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    pub fn parse(api_url: &str) -> Result<Self, SynthesisError> {
        let invalid = |reason: String| SynthesisError::InvalidEndpoint {
            url: api_url.to_string(),
            reason,
        };

        let url = Url::parse(api_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self { url })
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Request URL for `descriptor`.
    ///
    /// A path that already ends with the descriptor's suffix is kept as-is,
    /// otherwise the suffix is appended.
    pub fn url_for(&self, descriptor: &ServiceDescriptor) -> Url {
        let mut url = self.url.clone();
        let path = url.path().to_string();
        if !path.ends_with(&descriptor.endpoint_suffix) {
            let joined = format!("{}{}", path.trim_end_matches('/'), descriptor.endpoint_suffix);
            url.set_path(&joined);
        }
        url
    }
}

/// Everything the transport needs to issue one streaming POST.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl BackendRequest {
    pub fn new(
        endpoint: &Endpoint,
        descriptor: &ServiceDescriptor,
        body: Value,
        api_key: Option<&str>,
    ) -> Self {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        headers.extend(descriptor.extra_headers.iter().cloned());
        if let Some(auth) = api_key.and_then(|key| descriptor.auth(key)) {
            headers.push(auth);
        }

        Self {
            url: endpoint.url_for(descriptor),
            headers,
            body,
        }
    }

    /// Body with secrets left out, for debug logs.
    pub fn describe(&self) -> String {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        let model = self
            .body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("?");
        format!(
            "POST {} model={} headers={:?} fields={}",
            self.url,
            model,
            header_names,
            self.body.as_object().map(Map::len).unwrap_or(0)
        )
    }
}
