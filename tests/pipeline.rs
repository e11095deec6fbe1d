use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Json, Router};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde_json::{json, Value};

use camo_spotter::acquisition::ImageFile;
use camo_spotter::client::{AnalysisClient, ClientConfig};
use camo_spotter::model::Model;
use camo_spotter::presenter::{annotate, preview_image, render, BannerKind};
use camo_spotter::server::{router, AppState};
use camo_spotter::session::{Notice, Session};
use camo_spotter::utils::GatewayConfig;

fn leaf_insect() -> Value {
    json!({
        "detected": true,
        "species": "Leaf insect",
        "camouflagePercentage": 82,
        "confidence": 91,
        "description": "A leaf insect pressed against a leaf.",
        "adaptations": ["color matching"],
        "boundingBox": {"x": 10, "y": 10, "width": 30, "height": 40},
        "camouflageRegions": [
            {"description": "wings", "intensity": 75, "x": 12, "y": 12, "width": 20, "height": 15}
        ]
    })
}

fn jpeg_50x50() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, image::Rgb([40, 120, 40])))
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(85))
        .unwrap();
    bytes
}

fn spawn(app: Router) -> SocketAddr {
    let server =
        axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

fn client(endpoint: String) -> AnalysisClient {
    AnalysisClient::new(ClientConfig {
        endpoint,
        timeout: Duration::from_secs(5),
        max_retries: 0,
    })
    .unwrap()
}

#[tokio::test]
async fn mocked_service_renders_leaf_insect() {
    let service = spawn(Router::new().route(
        "/analyze-camouflage",
        post(|| async { Json(leaf_insect()) }),
    ));
    let client = client(format!("http://{}/analyze-camouflage", service));

    let mut session = Session::new();
    let notice = session
        .select_file(ImageFile::new("leaf.jpg", Some("image/jpeg".into()), jpeg_50x50()))
        .unwrap();
    assert!(notice.is_none());

    let notice = session.analyze_with(&client).await.unwrap();
    assert_eq!(notice, Some(Notice::ANALYSIS_COMPLETE));
    assert!(!session.is_analyzing());

    let upload = session.image().unwrap();
    let view = render(session.result().unwrap(), &upload.preview);
    assert_eq!(view.banner.kind, BannerKind::Detected);
    assert_eq!(view.gauges[0].tier, "Excellent");
    assert_eq!(view.gauges[1].tier, "Very High");
    assert!(view.bounding_box.is_some());
    assert_eq!(view.regions.len(), 1);
    assert_eq!(view.regions[0].label, "75%");
    assert_eq!(view.adaptations.as_ref().map(Vec::len), Some(1));
    assert!(view.preview.starts_with("data:image/jpeg;base64,"));

    let preview = preview_image(&view).unwrap();
    let map = annotate(&preview, &view);
    assert_eq!(map.dimensions(), (50, 50));
}

#[tokio::test]
async fn non_image_never_reaches_the_network() {
    let mut session = Session::new();
    let notice = session
        .select_file(ImageFile::new("notes.txt", Some("text/plain".into()), b"hi".to_vec()))
        .unwrap();
    assert_eq!(notice, Some(Notice::INVALID_FILE));
    assert!(session.image().is_none());

    // nothing listens here; reaching the network would surface as a failure notice
    let client = client("http://127.0.0.1:9/analyze-camouflage".into());
    assert!(session.analyze_with(&client).await.is_err());
}

#[tokio::test]
async fn failed_service_allows_manual_retry() {
    let mut session = Session::new();
    session
        .select_file(ImageFile::new("leaf.jpg", Some("image/jpeg".into()), jpeg_50x50()))
        .unwrap();

    let client = client("http://127.0.0.1:9/analyze-camouflage".into());
    let notice = session.analyze_with(&client).await.unwrap();
    assert_eq!(notice, Some(Notice::ANALYSIS_FAILED));
    assert!(session.result().is_none());
    assert!(session.can_analyze());
}

#[tokio::test]
async fn client_through_proxy_to_gateway() {
    let reply = format!("```json\n{}\n```", leaf_insect());
    let gateway = spawn(Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let reply = reply.clone();
            async move { Json(json!({"choices": [{"message": {"content": reply}}]})) }
        }),
    ));
    let model = Model::new(GatewayConfig {
        url: format!("http://{}/v1/chat/completions", gateway),
        api_key: Some("secret".into()),
        model: "test-model".into(),
    })
    .unwrap();
    let proxy = spawn(router(Arc::new(AppState { model }), 16 * 1024 * 1024));

    let mut session = Session::new();
    session
        .select_file(ImageFile::new("leaf.jpg", Some("image/jpeg".into()), jpeg_50x50()))
        .unwrap();
    session
        .analyze_with(&client(format!("http://{}/analyze-camouflage", proxy)))
        .await
        .unwrap();

    let result = session.result().unwrap();
    assert_eq!(result.species.as_deref(), Some("Leaf insect"));
    assert_eq!(result.camouflage_regions[0].description, "wings");
}
