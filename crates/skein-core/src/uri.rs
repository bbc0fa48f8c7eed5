//! Model URI parsing and building.
//!
//! Two formats are accepted:
//!
//! 1. Simple: `provider/model`. Base URL comes from the provider registry.
//!    Example: `deepseek/deepseek-chat`.
//! 2. Full: `provider@base_url:model?params` for full control, with `~` as
//!    the placeholder for the registry default.
//!    Example: `openai@https://api.openai.com/v1:gpt-4o?temperature=0.7`.
//!
//! The separator between base URL and model is found by scanning: inside an
//! `http(s)://` authority a colon may introduce a port or be followed by a
//! path, and model names themselves may contain colons (`ollama`'s
//! `qwen3:8b`), so the first colon that is neither is the split point.

use std::fmt;

use crate::errors::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelUri {
    pub provider: String,
    pub base_url: Option<String>,
    pub model: String,
    pub params: Vec<(String, String)>,
}

impl ModelUri {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: None,
            model: model.into(),
            params: Vec::new(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        if uri.is_empty() {
            return Err(invalid(uri, "URI must be non-empty"));
        }
        if uri.contains('@') {
            parse_full(uri)
        } else if uri.contains('/') {
            parse_simple(uri)
        } else {
            Err(invalid(
                uri,
                "expected `provider/model` or `provider@base_url:model?params`",
            ))
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ModelUri {
    /// Renders the full format; `~` stands in for an unset base URL.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self.base_url.as_deref().unwrap_or("~");
        write!(f, "{}@{}:{}", self.provider, authority, self.model)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            write!(f, "{}{k}={v}", if i == 0 { '?' } else { '&' })?;
        }
        Ok(())
    }
}

/// Build a full-format URI string from parts, validating separator characters.
pub fn build(
    provider: &str,
    model: &str,
    base_url: Option<&str>,
    params: &[(String, String)],
) -> Result<String, ConfigError> {
    if provider.is_empty() {
        return Err(invalid(provider, "provider must be non-empty"));
    }
    if model.is_empty() {
        return Err(invalid(model, "model must be non-empty"));
    }
    if provider.chars().any(|c| "@:~?#/".contains(c)) {
        return Err(invalid(provider, "provider cannot contain @:~?#/"));
    }
    // Model may contain colons (ollama tags), but not the other separators.
    if model.chars().any(|c| "@~?#".contains(c)) {
        return Err(invalid(model, "model cannot contain @~?#"));
    }
    let uri = ModelUri {
        provider: provider.to_string(),
        base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        model: model.to_string(),
        params: params.to_vec(),
    };
    Ok(uri.to_string())
}

fn invalid(uri: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_simple(uri: &str) -> Result<ModelUri, ConfigError> {
    if uri.contains('?') {
        return Err(invalid(
            uri,
            "simple format takes no query parameters; use provider@base_url:model?params",
        ));
    }
    let (provider, model) = uri
        .split_once('/')
        .ok_or_else(|| invalid(uri, "expected provider/model"))?;
    if provider.is_empty() || model.is_empty() {
        return Err(invalid(uri, "provider and model must be non-empty"));
    }
    if provider.chars().any(|c| "@:~?#/".contains(c)) {
        return Err(invalid(uri, "provider cannot contain @:~?#/"));
    }
    Ok(ModelUri {
        provider: provider.to_string(),
        base_url: None,
        model: model.to_string(),
        params: Vec::new(),
    })
}

fn parse_full(uri: &str) -> Result<ModelUri, ConfigError> {
    let (head, query) = match uri.split_once('?') {
        Some((h, q)) => (h, Some(q)),
        None => (uri, None),
    };

    let (provider, rest) = head
        .split_once('@')
        .ok_or_else(|| invalid(uri, "missing `@` separator"))?;
    if provider.is_empty() {
        return Err(invalid(uri, "provider must be non-empty"));
    }
    if !rest.contains(':') {
        return Err(invalid(uri, "missing `:` between base_url and model"));
    }

    let (authority, model) = split_authority_model(rest)
        .ok_or_else(|| invalid(uri, "missing `:` between base_url and model"))?;
    if model.is_empty() {
        return Err(invalid(uri, "model must be non-empty"));
    }

    let base_url = match authority {
        "~" => None,
        other => Some(other.to_string()),
    };

    let params = match query {
        Some(q) => parse_query(q),
        None => Vec::new(),
    };

    Ok(ModelUri {
        provider: provider.to_string(),
        base_url,
        model: model.to_string(),
        params,
    })
}

/// Split `base_url:model` at the colon that separates them, or None when no
/// separating colon exists.
fn split_authority_model(rest: &str) -> Option<(&str, &str)> {
    if let Some(model) = rest.strip_prefix("~:") {
        return Some(("~", model));
    }

    if let Some(after_scheme) = rest
        .strip_prefix("http://")
        .or_else(|| rest.strip_prefix("https://"))
    {
        // Inside a URL, a colon may only introduce a port (digits) or be part
        // of `://`. The first colon followed by neither is the model split.
        let offset = rest.len() - after_scheme.len();
        for (i, c) in after_scheme.char_indices() {
            if c == ':' {
                let next = after_scheme[i + 1..].chars().next();
                match next {
                    Some(n) if n.is_ascii_digit() || n == '/' => continue,
                    _ => return Some((&rest[..offset + i], &rest[offset + i + 1..])),
                }
            }
        }
        // Fall back to the last colon past the scheme (model without colons
        // after a port).
        let last = after_scheme.rfind(':')?;
        return Some((&rest[..offset + last], &rest[offset + last + 1..]));
    }

    // Bare host, possibly host:port.
    let first = rest.find(':')?;
    let after = &rest[first + 1..];
    if after.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let digits = after.chars().take_while(|c| c.is_ascii_digit()).count();
        let port_end = first + 1 + digits;
        if rest[port_end..].starts_with(':') {
            return Some((&rest[..port_end], &rest[port_end + 1..]));
        }
        let last = rest.rfind(':').unwrap();
        return Some((&rest[..last], &rest[last + 1..]));
    }
    Some((&rest[..first], after))
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            if k.is_empty() || v.is_empty() {
                return None;
            }
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}
