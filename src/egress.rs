//! Egress checks and proxy replacement.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::store::AccountMap;

const DEFAULT_CHECK_URL: &str = "https://api.ipify.org";
const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 15;

/// Tells whether traffic can leave through a given proxy.
#[async_trait]
pub trait EgressProbe: Send + Sync {
    async fn is_reachable(&self, proxy: &str) -> bool;
}

/// Fetches the public address through the proxy and expects an IPv4 answer.
#[derive(Debug, Clone)]
pub struct HttpEgressProbe {
    check_url: String,
    timeout: Duration,
}

impl Default for HttpEgressProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpEgressProbe {
    pub fn new() -> Self {
        Self {
            check_url: DEFAULT_CHECK_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS),
        }
    }

    pub fn with_check_url(mut self, url: impl Into<String>) -> Self {
        self.check_url = url.into();
        self
    }
}

fn looks_like_ipv4(body: &str) -> bool {
    body.trim().parse::<std::net::Ipv4Addr>().is_ok()
}

#[async_trait]
impl EgressProbe for HttpEgressProbe {
    async fn is_reachable(&self, proxy: &str) -> bool {
        let client = match reqwest::Proxy::all(proxy).and_then(|p| {
            reqwest::Client::builder()
                .timeout(self.timeout)
                .proxy(p)
                .build()
        }) {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(error = %err, "Proxy rejected by HTTP client");
                return false;
            }
        };

        match client.get(&self.check_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => looks_like_ipv4(&body),
                Err(err) => {
                    tracing::debug!(error = %err, "Egress check body unreadable");
                    false
                }
            },
            Ok(response) => {
                tracing::debug!(status = response.status().as_u16(), "Egress check refused");
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, timeout = err.is_timeout(), "Egress check failed");
                false
            }
        }
    }
}

/// Proxies available for reassignment.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self { proxies }
    }

    /// Read one proxy URL per line. A missing file is an empty pool.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        let proxies = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("type"))
            .map(str::to_string)
            .collect();
        Ok(Self { proxies })
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Proxies other than `current` that fewer than `per_proxy` accounts use,
    /// in random order.
    pub fn candidates(
        &self,
        accounts: &AccountMap,
        current: Option<&str>,
        per_proxy: usize,
    ) -> Vec<String> {
        let mut usage: HashMap<&str, usize> = HashMap::new();
        for proxy in accounts.values().filter_map(|r| r.proxy.as_deref()) {
            *usage.entry(proxy).or_default() += 1;
        }

        let mut candidates: Vec<String> = self
            .proxies
            .iter()
            .filter(|p| Some(p.as_str()) != current)
            .filter(|p| usage.get(p.as_str()).copied().unwrap_or(0) < per_proxy)
            .cloned()
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AccountRecord;

    fn record(proxy: &str) -> AccountRecord {
        AccountRecord {
            proxy: Some(proxy.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_ipv4_shape() {
        assert!(looks_like_ipv4("203.0.113.7\n"));
        assert!(!looks_like_ipv4("2001:db8::1"));
        assert!(!looks_like_ipv4("<html>"));
    }

    #[test]
    fn test_load_skips_blank_and_header_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.txt");
        std::fs::write(
            &path,
            "type://user:pass@ip:port\n\nhttp://10.0.0.1:8080\n  socks5://10.0.0.2:1080  \n",
        )
        .unwrap();
        let pool = ProxyPool::load(&path).unwrap();
        assert_eq!(pool.len(), 2);

        let missing = ProxyPool::load(&dir.path().join("nope.txt")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_candidates_skip_saturated_and_current() {
        let pool = ProxyPool::new(vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://c".to_string(),
        ]);
        let mut accounts = AccountMap::new();
        accounts.insert("alice".to_string(), record("http://a"));
        accounts.insert("bob".to_string(), record("http://b"));

        let mut found = pool.candidates(&accounts, Some("http://a"), 1);
        found.sort();
        assert_eq!(found, vec!["http://c".to_string()]);

        let mut found = pool.candidates(&accounts, Some("http://a"), 2);
        found.sort();
        assert_eq!(found, vec!["http://b".to_string(), "http://c".to_string()]);
    }

    #[tokio::test]
    async fn test_unparseable_proxy_is_unreachable() {
        let probe = HttpEgressProbe::new().with_check_url("http://127.0.0.1:9");
        assert!(!probe.is_reachable("::not a proxy::").await);
    }
}
