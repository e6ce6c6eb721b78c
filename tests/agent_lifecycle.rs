//! End-to-end agent runs against a mock game service.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use constellation_agent::agent::{AgentDeps, run_agent};
use constellation_agent::auth::FileWebViewSource;
use constellation_agent::config::Settings;
use constellation_agent::egress::{HttpEgressProbe, ProxyPool};
use constellation_agent::error::{AgentError, AuthError};
use constellation_agent::pacing::{RecordingSleeper, Sleeper};
use constellation_agent::store::{AccountRecord, AccountStore};

const WEBVIEW: &str = "https://tgcf.sleepagotchi.com/#tgWebAppData=query_id%3DAAE%26user%3D%257B%2522id%2522%253A7%257D%26auth_date%3D1700000000%26hash%3Dfeed&tgWebAppVersion=7.10&tgWebAppPlatform=ios";

/// Records every delay and stops the agent once it settles into a long sleep.
struct StopOnLongSleep {
    inner: RecordingSleeper,
    cancel: CancellationToken,
}

#[async_trait]
impl Sleeper for StopOnLongSleep {
    async fn sleep(&self, duration: Duration) {
        if duration >= Duration::from_secs(60) {
            self.cancel.cancel();
        }
        self.inner.sleep(duration).await;
    }
}

async fn seed_account(dir: &Path, account: &str) -> Arc<AccountStore> {
    let store = Arc::new(AccountStore::new(dir.join("accounts_config.json")));
    store
        .update(account, |record| {
            *record = AccountRecord {
                api: Some(json!({ "app": "sleepagotchi" })),
                user_agent: Some("Mozilla/5.0 (iPhone)".to_string()),
                ..Default::default()
            };
        })
        .await
        .unwrap();
    store
}

fn deps(
    dir: &Path,
    server: &MockServer,
    store: Arc<AccountStore>,
    sleeper: Arc<dyn Sleeper>,
) -> AgentDeps {
    let settings = Settings {
        api_base_url: server.uri(),
        request_retries: 1,
        use_proxy: false,
        session_start_delay_secs: 1,
        sessions_dir: dir.to_path_buf(),
        accounts_config: store.path().to_path_buf(),
        ..Default::default()
    };
    AgentDeps {
        settings: Arc::new(settings),
        store,
        webview: Arc::new(FileWebViewSource::new(dir)),
        egress: Arc::new(HttpEgressProbe::new()),
        proxies: Arc::new(ProxyPool::default()),
        sleeper,
    }
}

#[tokio::test]
async fn test_agent_runs_a_cycle_then_sleeps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access",
            "refreshToken": "refresh",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getUserData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "player": {
                "meta": { "isNextDailyRewardAvailable": true },
                "heroes": [{ "heroType": "bonk", "class": "universal", "level": 50, "stars": 5 }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .with_priority(10)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alice.webview"), WEBVIEW).unwrap();
    let store = seed_account(dir.path(), "alice").await;

    let cancel = CancellationToken::new();
    let sleeper = Arc::new(StopOnLongSleep {
        inner: RecordingSleeper::new(),
        cancel: cancel.clone(),
    });
    let deps = deps(dir.path(), &server, store, sleeper.clone());

    let result = tokio::time::timeout(
        Duration::from_secs(30),
        run_agent("alice".to_string(), deps, cancel),
    )
    .await
    .unwrap();
    assert!(result.is_ok());

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths[0], "/login");
    assert!(!paths.contains(&"/refreshToken".to_string()));
    assert!(paths.contains(&"/claimDailyRewards".to_string()));
    assert!(paths.contains(&"/getConstellations".to_string()));

    // start delay, then pacing delays, then the long sleep that stopped the run
    let delays = sleeper.inner.delays();
    assert_eq!(delays.first(), Some(&Duration::from_secs(1)));
    assert!(delays.last().unwrap() >= &Duration::from_secs(60));
}

#[tokio::test]
async fn test_incomplete_record_stops_agent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AccountStore::new(dir.path().join("accounts_config.json")));
    store
        .update("bob", |record| {
            record.api = Some(json!({ "app": "sleepagotchi" }));
        })
        .await
        .unwrap();

    let deps = deps(dir.path(), &server, store, Arc::new(RecordingSleeper::new()));
    let err = run_agent("bob".to_string(), deps, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AgentError::IncompleteConfig { account, reason } => {
            assert_eq!(account, "bob");
            assert!(reason.contains("user_agent"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_login_stops_agent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "name": "Unauthorized",
            "message": "invalid init data",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("carol.webview"), WEBVIEW).unwrap();
    let store = seed_account(dir.path(), "carol").await;

    let deps = deps(dir.path(), &server, store, Arc::new(RecordingSleeper::new()));
    let err = run_agent("carol".to_string(), deps, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Auth(AuthError::Exchange(_))));
}

#[tokio::test]
async fn test_missing_webview_stops_agent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = seed_account(dir.path(), "dave").await;

    let deps = deps(dir.path(), &server, store, Arc::new(RecordingSleeper::new()));
    let err = run_agent("dave".to_string(), deps, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Auth(AuthError::WebView(_))));
}

#[tokio::test]
async fn test_no_direct_login_when_proxy_required() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("erin.webview"), WEBVIEW).unwrap();
    let store = seed_account(dir.path(), "erin").await;

    let cancel = CancellationToken::new();
    let sleeper = Arc::new(StopOnLongSleep {
        inner: RecordingSleeper::new(),
        cancel: cancel.clone(),
    });
    let mut deps = deps(dir.path(), &server, store, sleeper.clone());
    deps.settings = Arc::new(Settings {
        use_proxy: true,
        ..(*deps.settings).clone()
    });

    let result = tokio::time::timeout(
        Duration::from_secs(30),
        run_agent("erin".to_string(), deps, cancel),
    )
    .await
    .unwrap();
    assert!(result.is_ok());

    // the record has no proxy and the pool is empty, so the agent waits
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(
        sleeper.inner.delays().last(),
        Some(&Duration::from_secs(300))
    );
}
