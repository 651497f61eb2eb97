//! Backend descriptors and hostname/protocol resolution.
//!
//! Adding a backend is a data change: push another [`ServiceDescriptor`].
//! Nothing downstream looks at descriptor names; the decoder only sees the
//! [`WireFamily`].

use std::fmt;
use std::sync::LazyLock;

use tracing::debug;

use crate::error::SynthesisError;

/// Shape of a backend's streamed JSON events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    /// Ollama `/api/generate`: `{"response": "..."}` per line.
    Generate,
    /// OpenAI-compatible chat completions: `choices[0].delta.content`.
    ChatDelta,
    /// Anthropic messages: `content_block_delta` events.
    ContentBlock,
}

impl WireFamily {
    /// Protocol name accepted in configuration for this family.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            WireFamily::Generate => "ollama",
            WireFamily::ChatDelta => "openai",
            WireFamily::ContentBlock => "anthropic",
        }
    }
}

impl fmt::Display for WireFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}

/// Static description of one text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub match_hostnames: Vec<String>,
    pub wire_family: WireFamily,
    pub endpoint_suffix: String,
    /// Header that carries the API key, if the backend needs one.
    pub auth_header: Option<String>,
    /// Fixed headers sent with every request.
    pub extra_headers: Vec<(String, String)>,
    /// Fixed boolean fields merged into the request body.
    pub body_flags: Vec<(String, bool)>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, wire_family: WireFamily, endpoint_suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            match_hostnames: Vec::new(),
            wire_family,
            endpoint_suffix: endpoint_suffix.to_string(),
            auth_header: None,
            extra_headers: Vec::new(),
            body_flags: Vec::new(),
        }
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.match_hostnames.push(hostname.to_string());
        self
    }

    pub fn auth_header(mut self, header: &str) -> Self {
        self.auth_header = Some(header.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body_flag(mut self, name: &str, value: bool) -> Self {
        self.body_flags.push((name.to_string(), value));
        self
    }

    /// Whether the backend expects an API key.
    pub fn requires_api_key(&self) -> bool {
        self.auth_header.is_some()
    }

    /// Header name and value carrying `api_key`.
    ///
    /// `Authorization` uses the bearer scheme; any other header gets the raw key.
    /// Returns `None` when the backend has no auth header or the key is empty.
    pub fn auth(&self, api_key: &str) -> Option<(String, String)> {
        let header = self.auth_header.as_ref()?;
        if api_key.is_empty() {
            return None;
        }
        let value = if header.eq_ignore_ascii_case("authorization") {
            format!("Bearer {}", api_key)
        } else {
            api_key.to_string()
        };
        Some((header.clone(), value))
    }

    fn matches_hostname(&self, hostname: &str) -> bool {
        self.match_hostnames
            .iter()
            .any(|h| h.eq_ignore_ascii_case(hostname))
    }

    fn matches_protocol(&self, protocol: &str) -> bool {
        self.name.eq_ignore_ascii_case(protocol)
            || self.wire_family.protocol_name().eq_ignore_ascii_case(protocol)
    }
}

static BUILTIN: LazyLock<ServiceRegistry> = LazyLock::new(ServiceRegistry::builtin);

/// Ordered descriptor table. The first matching descriptor wins.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// The backends known out of the box.
    pub fn builtin() -> Self {
        let chat = |name: &str, host: &str| {
            ServiceDescriptor::new(name, WireFamily::ChatDelta, "/chat/completions")
                .hostname(host)
                .auth_header("Authorization")
        };

        Self::empty()
            .with_descriptor(
                ServiceDescriptor::new("ollama", WireFamily::Generate, "/api/generate")
                    .hostname("localhost"),
            )
            .with_descriptor(chat("openai", "api.openai.com"))
            .with_descriptor(chat("aliyun", "dashscope.aliyuncs.com"))
            .with_descriptor(
                ServiceDescriptor::new("anthropic", WireFamily::ContentBlock, "/messages")
                    .hostname("api.anthropic.com")
                    .auth_header("x-api-key")
                    .header("anthropic-version", "2023-06-01"),
            )
            .with_descriptor(
                chat("tencent", "api.hunyuan.cloud.tencent.com")
                    .body_flag("enable_enhancement", false),
            )
            .with_descriptor(chat("deepseek", "api.deepseek.com"))
            .with_descriptor(chat("siliconflow", "api.siliconflow.cn"))
    }

    /// Shared read-only instance of [`ServiceRegistry::builtin`].
    pub fn global() -> &'static ServiceRegistry {
        &BUILTIN
    }

    /// Append a descriptor. It loses ties against everything already present.
    pub fn with_descriptor(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    /// Find the backend for `hostname`, falling back to `explicit_protocol`.
    pub fn resolve(
        &self,
        hostname: &str,
        explicit_protocol: Option<&str>,
    ) -> Result<&ServiceDescriptor, SynthesisError> {
        if let Some(descriptor) = self.descriptors.iter().find(|d| d.matches_hostname(hostname)) {
            debug!("Resolved host {} to backend {}", hostname, descriptor.name);
            return Ok(descriptor);
        }

        if let Some(protocol) = explicit_protocol.map(str::trim).filter(|p| !p.is_empty())
            && let Some(descriptor) = self.descriptors.iter().find(|d| d.matches_protocol(protocol))
        {
            debug!(
                "Host {} not registered, using backend {} for protocol {}",
                hostname, descriptor.name, protocol
            );
            return Ok(descriptor);
        }

        Err(SynthesisError::UnknownBackend(hostname.to_string()))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
