use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

enum ProxyResolution {
    UseProxy(String),
    /// `proxy = ""` disables every proxy, environment variables included.
    ForceDirectConnect,
    /// Not configured; reqwest reads HTTPS_PROXY / HTTP_PROXY itself.
    None,
}

/// Loopback hosts never go through a proxy.
fn is_local_host(api_base: &str) -> bool {
    let Ok(url) = url::Url::parse(api_base) else {
        return false;
    };
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1"))
}

fn resolve_proxy(proxy: Option<&str>, api_base: &str) -> ProxyResolution {
    match proxy {
        Some("") => ProxyResolution::ForceDirectConnect,
        Some(_) if is_local_host(api_base) => ProxyResolution::ForceDirectConnect,
        Some(p) => ProxyResolution::UseProxy(p.to_string()),
        None => ProxyResolution::None,
    }
}

/// Build the reqwest client used for completion API traffic.
pub fn build_http_client(proxy: Option<&str>, api_base: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);

    match resolve_proxy(proxy, api_base) {
        ProxyResolution::UseProxy(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, api_base = %api_base, "LLM provider using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        ProxyResolution::ForceDirectConnect => {
            info!(api_base = %api_base, "LLM provider forced to direct connect");
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with proxy, using default");
        Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_proxy_forces_direct() {
        let r = resolve_proxy(Some(""), "https://api.openai.com/v1");
        assert!(matches!(r, ProxyResolution::ForceDirectConnect));
    }

    #[test]
    fn test_configured_proxy_used() {
        let r = resolve_proxy(Some("http://proxy:7890"), "https://api.openai.com/v1");
        assert!(matches!(r, ProxyResolution::UseProxy(url) if url == "http://proxy:7890"));
    }

    #[test]
    fn test_local_base_bypasses_proxy() {
        let r = resolve_proxy(Some("http://proxy:7890"), "http://localhost:11434/v1");
        assert!(matches!(r, ProxyResolution::ForceDirectConnect));
    }

    #[test]
    fn test_unconfigured_follows_environment() {
        assert!(matches!(resolve_proxy(None, "https://api.openai.com/v1"), ProxyResolution::None));
    }

    #[test]
    fn test_build_http_client_with_bad_proxy_still_builds() {
        let client = build_http_client(Some("::not a url::"), "https://api.openai.com/v1", Duration::from_secs(5));
        drop(client);
    }
}
