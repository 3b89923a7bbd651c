//! End-to-end router scenarios against a scripted in-process network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use swcache::cache::{CacheEntry, CacheStorage, MemoryStorage, StorageError};
use swcache::config::RouterConfig;
use swcache::fetch::FetchError;
use swcache::http::{Method, Request, Response, StatusCode};
use swcache::message::{ControlMessage, MessageReply, reply_channel};
use swcache::router::{CacheRouter, OFFLINE_ERROR};
use url::Url;

const ORIGIN: &str = "http://localhost:5173";

/// A fake network: fixed bodies per URL, a global on/off switch, and a log
/// of every request it saw.
#[derive(Clone, Default)]
struct Network {
    online: Arc<AtomicBool>,
    bodies: Arc<HashMap<String, &'static str>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Network {
    fn with(routes: &[(&str, &'static str)]) -> Self {
        let bodies = routes
            .iter()
            .map(|(url, body)| (url.to_string(), *body))
            .collect();
        Self {
            online: Arc::new(AtomicBool::new(true)),
            bodies: Arc::new(bodies),
            seen: Arc::default(),
        }
    }

    fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn fetcher(
        &self,
    ) -> impl Fn(Request) -> std::future::Ready<Result<Response, FetchError>> + Send + Sync + 'static
    {
        let net = self.clone();
        move |req: Request| {
            net.seen.lock().unwrap().push(req.cache_key());
            let result = if !net.online.load(Ordering::SeqCst) {
                Err(FetchError::transport(req.url(), "network unreachable"))
            } else {
                match net.bodies.get(req.url().as_str()) {
                    Some(body) => Ok(Response::new(StatusCode::OK)
                        .header("Content-Type", "application/octet-stream")
                        .body(*body)),
                    None => Ok(Response::new(StatusCode::NOT_FOUND)),
                }
            };
            std::future::ready(result)
        }
    }
}

fn manifest(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

fn router_with(net: &Network, config: RouterConfig, storage: Arc<dyn CacheStorage>) -> CacheRouter {
    CacheRouter::new(config, storage, net.fetcher())
}

fn get(path: &str) -> Request {
    Request::get(&format!("{ORIGIN}{path}")).unwrap()
}

#[tokio::test]
async fn install_caches_every_fetchable_manifest_entry() {
    let net = Network::with(&[
        ("http://localhost:5173/", "<html>home</html>"),
        ("http://localhost:5173/styles.css", "body{}"),
    ]);
    let config = RouterConfig::new("v1", manifest(&["/", "/styles.css", "/logo.png"]));
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let router = router_with(&net, config, storage.clone());

    let report = router.on_install().await.unwrap();

    assert_eq!(report.cached, vec!["/", "/styles.css"]);
    assert_eq!(report.failed, vec!["/logo.png"]);
    assert_eq!(
        storage.keys("v1").unwrap(),
        vec![
            "GET http://localhost:5173/".to_owned(),
            "GET http://localhost:5173/styles.css".to_owned(),
        ]
    );
}

#[tokio::test]
async fn activation_evicts_other_versions() {
    let net = Network::with(&[("http://localhost:5173/app.js", "v2();")]);
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    storage
        .put("v1", CacheEntry::new("GET http://localhost:5173/app.js", Response::default()))
        .unwrap();
    storage
        .put("v1:dynamic", CacheEntry::new("GET https://firestore.googleapis.com/x", Response::default()))
        .unwrap();

    let router = router_with(&net, RouterConfig::new("v2", manifest(&["/app.js"])), storage.clone());
    router.on_install().await.unwrap();
    router.on_activate().await.unwrap();

    for generation in storage.generations().unwrap() {
        assert!(generation == "v2" || generation == "v2:dynamic", "{generation} survived");
    }
    assert!(storage.get("v1", "GET http://localhost:5173/app.js").unwrap().is_none());
}

#[tokio::test]
async fn cached_static_asset_is_served_without_network() {
    let net = Network::with(&[("http://localhost:5173/app.js", "console.log('cached')")]);
    let router = router_with(
        &net,
        RouterConfig::new("v1", manifest(&["/app.js"])),
        Arc::new(MemoryStorage::new()),
    );
    router.on_install().await.unwrap();
    let calls_after_install = net.calls();

    let resp = router.on_fetch(get("/app.js")).await.unwrap();

    assert_eq!(net.calls(), calls_after_install);
    assert_eq!(resp.body_ref().as_ref(), b"console.log('cached')");
    assert_eq!(resp.headers().get("content-type"), Some("application/octet-stream"));
}

#[tokio::test]
async fn static_miss_fetches_once_then_serves_from_cache() {
    let net = Network::with(&[("http://localhost:5173/icon-512.png", "PNG")]);
    let router = router_with(&net, RouterConfig::new("v1", vec![]), Arc::new(MemoryStorage::new()));

    let first = router.on_fetch(get("/icon-512.png")).await.unwrap();
    assert_eq!(net.calls(), 1);

    net.go_offline();
    let second = router.on_fetch(get("/icon-512.png")).await.unwrap();
    assert_eq!(net.calls(), 1);
    assert_eq!(first.body_ref(), second.body_ref());
}

#[tokio::test]
async fn offline_api_call_without_cache_is_structured_503() {
    let net = Network::default();
    let router = router_with(&net, RouterConfig::new("v1", vec![]), Arc::new(MemoryStorage::new()));

    let req = Request::get("https://firestore.googleapis.com/v1/projects/p/documents/vehicles").unwrap();
    let resp = router.on_fetch(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.headers().get("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(resp.body_ref()).unwrap();
    assert_eq!(body["error"], OFFLINE_ERROR);
}

#[tokio::test]
async fn offline_api_call_with_cache_returns_last_good_copy() {
    let url = "https://firestore.googleapis.com/v1/projects/p/documents/vehicles";
    let net = Network::with(&[(url, r#"{"documents":[]}"#)]);
    let router = router_with(&net, RouterConfig::new("v1", vec![]), Arc::new(MemoryStorage::new()));

    router.on_fetch(Request::get(url).unwrap()).await.unwrap();
    net.go_offline();
    let resp = router.on_fetch(Request::get(url).unwrap()).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body_ref().as_ref(), br#"{"documents":[]}"#);
}

#[tokio::test]
async fn post_requests_never_touch_the_cache() {
    let net = Network::with(&[("http://localhost:5173/app.js", "js")]);
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let router = router_with(&net, RouterConfig::new("v1", manifest(&["/app.js"])), storage.clone());
    router.on_install().await.unwrap();

    let post = Request::new(Method::Post, Url::parse("http://localhost:5173/app.js").unwrap())
        .body("payload");
    let resp = router.on_fetch(post.clone()).await.unwrap();
    assert_eq!(resp.body_ref().as_ref(), b"js");
    assert_eq!(net.calls(), 2);
    assert!(storage.match_any(&post.cache_key()).unwrap().is_none());

    net.go_offline();
    assert!(router.on_fetch(post).await.is_err());
}

#[tokio::test]
async fn get_version_replies_with_exact_tag() {
    let net = Network::default();
    let router = router_with(
        &net,
        RouterConfig::new("automarket-v1.0.0", vec![]),
        Arc::new(MemoryStorage::new()),
    );

    let (port, reply) = reply_channel();
    router.on_message(ControlMessage::GetVersion, Some(port));

    assert_eq!(
        reply.await.unwrap(),
        MessageReply::Version {
            version: "automarket-v1.0.0".to_owned()
        }
    );
}

#[tokio::test]
async fn three_asset_scenario() {
    let net = Network::with(&[
        ("http://localhost:5173/", "<html></html>"),
        ("http://localhost:5173/index.html", "<html></html>"),
        ("http://localhost:5173/app.js", "main()"),
    ]);
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let router = router_with(
        &net,
        RouterConfig::new("v1", manifest(&["/", "/index.html", "/app.js"])),
        storage.clone(),
    );

    router.on_install().await.unwrap();
    assert_eq!(storage.keys("v1").unwrap().len(), 3);

    router.on_activate().await.unwrap();
    assert_eq!(storage.generations().unwrap(), vec!["v1"]);
    assert_eq!(storage.keys("v1").unwrap().len(), 3);

    net.go_offline();
    let calls = net.calls();
    let script = router.on_fetch(get("/app.js")).await.unwrap();
    assert_eq!(script.body_ref().as_ref(), b"main()");
    assert_eq!(net.calls(), calls);

    let api = Request::get("https://automarket.firebaseio.com/nonexistent-api").unwrap();
    let resp = router.on_fetch(api).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_slice(resp.body_ref()).unwrap();
    assert!(body["error"].is_string());
}

/// Storage whose writes always fail.
struct ReadOnlyStorage(MemoryStorage);

impl CacheStorage for ReadOnlyStorage {
    fn open(&self, generation: &str) -> Result<(), StorageError> {
        self.0.open(generation)
    }
    fn put(&self, _generation: &str, _entry: CacheEntry) -> Result<(), StorageError> {
        Err(StorageError::Backend("quota exceeded".to_owned()))
    }
    fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        self.0.get(generation, key)
    }
    fn generations(&self) -> Result<Vec<String>, StorageError> {
        self.0.generations()
    }
    fn delete(&self, generation: &str) -> Result<bool, StorageError> {
        self.0.delete(generation)
    }
    fn keys(&self, generation: &str) -> Result<Vec<String>, StorageError> {
        self.0.keys(generation)
    }
}

#[tokio::test]
async fn failed_cache_writes_do_not_fail_requests() {
    let net = Network::with(&[
        ("http://localhost:5173/app.js", "js"),
        ("https://firestore.googleapis.com/v1/vehicles", "[]"),
    ]);
    let router = router_with(
        &net,
        RouterConfig::new("v1", vec![]),
        Arc::new(ReadOnlyStorage(MemoryStorage::new())),
    );

    let asset = router.on_fetch(get("/app.js")).await.unwrap();
    assert_eq!(asset.body_ref().as_ref(), b"js");

    let api = router
        .on_fetch(Request::get("https://firestore.googleapis.com/v1/vehicles").unwrap())
        .await
        .unwrap();
    assert_eq!(api.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_fetches_during_activation_never_error() {
    let net = Network::with(&[("http://localhost:5173/app.js", "js")]);
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    for i in 0..20 {
        storage
            .put(&format!("old-{i}"), CacheEntry::new("GET http://localhost:5173/app.js", Response::default()))
            .unwrap();
    }
    let router = Arc::new(router_with(
        &net,
        RouterConfig::new("v1", manifest(&["/app.js"])),
        storage.clone(),
    ));
    router.on_install().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(async move { router.on_fetch(get("/app.js")).await }));
    }
    let activation = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.on_activate().await })
    };

    for task in tasks {
        let resp = task.await.unwrap().unwrap();
        assert_eq!(resp.body_ref().as_ref(), b"js");
    }
    assert_eq!(activation.await.unwrap().unwrap().len(), 20);
    assert_eq!(storage.generations().unwrap(), vec!["v1"]);
}
