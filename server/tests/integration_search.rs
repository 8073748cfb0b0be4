use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::{Config, IndexMaintainer, LemmaExtractor, SiteConfig, SiteStatus, StemmerMorphology, Store};
use serde_json::Value;
use server::{app, AppState};
use std::sync::Arc;
use tempfile::tempdir;

const SITE: &str = "https://cats.ru";

fn config() -> Config {
    Config::new(vec![
        SiteConfig { name: "Кошки".into(), url: SITE.into() },
        SiteConfig { name: "Собаки".into(), url: "https://dogs.ru".into() },
    ])
}

fn page(text: &str) -> String {
    format!("<html><head><title>Про кошек</title></head><body><p>{text}</p></body></html>")
}

fn tiny_index() -> Router {
    let config = Arc::new(config());
    let store = Arc::new(Store::in_memory());
    let maintainer = IndexMaintainer::new(
        Arc::clone(&store),
        LemmaExtractor::new(Arc::new(StemmerMorphology::russian())),
    );
    let (site, _) = maintainer.find_or_create_site(&config.sites[0]);
    maintainer
        .index_fetched(&site, &format!("{SITE}/one"), 200, &page("кошка сидит на окне кошка"), "Про кошек")
        .unwrap();
    maintainer
        .index_fetched(&site, &format!("{SITE}/two"), 200, &page("кошка спит"), "Про кошек")
        .unwrap();
    maintainer.set_site_status(site.id, SiteStatus::Indexed, None);
    app(AppState::new(config, store).unwrap())
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    let status = resp.status();
    let body: Bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn query(q: &str) -> String {
    q.bytes().map(|b| format!("%{b:02X}")).collect()
}

#[tokio::test]
async fn search_returns_relevance_ranked_results() {
    let uri = format!("/api/search?query={}", query("кошка"));
    let (status, json) = call(tiny_index(), "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["count"], 2);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data[0]["uri"], "/one");
    assert_eq!(data[0]["relevance"], 1.0);
    assert_eq!(data[0]["site"], SITE);
    assert_eq!(data[0]["siteName"], "Кошки");
    assert_eq!(data[0]["title"], "Про кошек");
    assert!(data[0]["snippet"].as_str().unwrap().starts_with("<b>кошка</b>"));
    assert_eq!(data[1]["uri"], "/two");
    assert_eq!(data[1]["relevance"], 0.5);
}

#[tokio::test]
async fn search_pagination_and_site_filter() {
    let uri = format!("/api/search?query={}&site={}&offset=1&limit=1", query("кошка"), query(SITE));
    let (status, json) = call(tiny_index(), "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["uri"], "/two");

    let uri = format!("/api/search?query={}&site={}", query("кошка"), query("https://birds.ru"));
    let (status, json) = call(tiny_index(), "GET", &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
}

#[tokio::test]
async fn search_misuse_is_reported() {
    let (status, json) = call(tiny_index(), "GET", "/api/search?query=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert!(json["message"].as_str().unwrap().contains("empty"));

    let uri = format!("/api/search?query={}&limit=0", query("кошка"));
    let (status, _) = call(tiny_index(), "GET", &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/search?query={}", query("жираф"));
    let (status, json) = call(tiny_index(), "GET", &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["result"], false);
}

#[tokio::test]
async fn statistics_cover_configured_sites() {
    let (status, json) = call(tiny_index(), "GET", "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    let stats = &json["statistics"];
    assert_eq!(stats["total"]["sites"], 2);
    assert_eq!(stats["total"]["pages"], 2);
    assert_eq!(stats["total"]["indexing"], false);
    assert_eq!(stats["detailed"][0]["status"], "INDEXED");
    assert_eq!(stats["detailed"][1]["pages"], 0);
    assert_eq!(stats["detailed"][1]["statusTime"], 0);
}

#[tokio::test]
async fn lifecycle_conflicts_map_to_409() {
    let (status, json) = call(tiny_index(), "GET", "/api/stopIndexing").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["result"], false);
    assert_eq!(json["message"], "indexing is not running");
}

#[tokio::test]
async fn index_page_outside_sites_is_rejected() {
    let uri = format!("/api/indexPage?url={}", query("https://birds.ru/nest"));
    let (status, json) = call(tiny_index(), "POST", &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
}

#[tokio::test]
async fn persistent_app_starts_empty() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.data_dir = Some(dir.path().join("index"));
    let app = server::build_app(config).unwrap();

    let (status, json) = call(app.clone(), "GET", "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statistics"]["total"]["pages"], 0);

    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
