//! End-to-end boot resolution through the full axum stack.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lantern_core::{Catalog, SourceContext};
use lantern_server::manifest::{apply_manifests, parse_manifests};
use lantern_server::{default_registry, router};
use std::sync::Arc;
use tower::ServiceExt;

const MANIFESTS: &str = r##"
kind: Document
name: boot-script
mimeType: text/plain
text: "#!ipxe\nkernel {{ kernel }} initrd={{ initrd }}"
mapping:
  kernel: "{{ values.kernel }}"
  initrd: "initrd-{{ metadata.arch }}.img"
values:
  kernel: /boot/vmlinuz
---
kind: Document
name: cloud-init
mimeType: application/json
---
kind: Profile
name: linux-boot
resources:
  - path: boot.ipxe
    documentName: boot-script
  - path: meta-data
    documentName: cloud-init
---
kind: Matcher
name: linux
selector:
  matchLabels:
    os: linux
weight: 5
profile: linux-boot
"##;

fn app_with(manifests: &str) -> (Router, Arc<Catalog>) {
    let catalog = Arc::new(Catalog::new());
    apply_manifests(
        &catalog,
        &SourceContext::default(),
        parse_manifests(manifests).unwrap(),
    );
    let handler = Arc::new(lantern_core::Handler::new(
        "/",
        catalog.clone(),
        default_registry(),
    ));
    (router(handler), catalog)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8_lossy(&body).to_string())
}

#[tokio::test]
async fn test_boot_script_is_rendered() {
    let (app, _) = app_with(MANIFESTS);
    let (status, content_type, body) = get(&app, "/boot.ipxe?os=linux&arch=amd64").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(
        body,
        "#!ipxe\nkernel /boot/vmlinuz initrd=initrd-amd64.img"
    );
}

#[tokio::test]
async fn test_unmatched_labels_are_404() {
    let (app, _) = app_with(MANIFESTS);
    let (status, _, body) = get(&app, "/boot.ipxe?os=plan9").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "no matching matcher\n");
}

#[tokio::test]
async fn test_structured_document_serializes_merged_values() {
    let (app, _) = app_with(MANIFESTS);
    let (status, content_type, body) = get(&app, "/meta-data?os=linux&arch=amd64").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    // The merged values carry the metadata snapshot.
    assert_eq!(parsed["metadata"]["os"], "linux");
    assert_eq!(parsed["metadata"]["arch"], "amd64");
    assert_eq!(parsed["metadata"]["RESOURCE_PATH"], "meta-data");
}

#[tokio::test]
async fn test_mac_is_canonicalized_before_matching() {
    let extra = r#"
kind: Document
name: by-mac
mimeType: text/plain
text: "mac={{ metadata.mac }}"
---
kind: Profile
name: machine
resources:
  - path: machine.txt
    documentName: by-mac
---
kind: Matcher
name: one-machine
selector:
  matchLabels:
    mac: "aa:bb:cc:dd:ee:ff"
profile: machine
"#;
    let (app, _) = app_with(extra);
    // Firmware-style spelling: upper case, dash separators.
    let (status, _, body) = get(&app, "/machine.txt?mac=AA-BB-CC-DD-EE-FF").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "mac=aa:bb:cc:dd:ee:ff");
}

#[tokio::test]
async fn test_dangling_document_reference() {
    let broken = r#"
kind: Profile
name: broken
resources:
  - path: boot.ipxe
    documentName: nowhere
---
kind: Matcher
name: all
profile: broken
"#;
    let (app, catalog) = app_with(broken);

    // Status reporting sees the degraded profile...
    let profile = catalog
        .profiles()
        .get(&lantern_core::Name::new("default", "broken"))
        .unwrap();
    assert_eq!(profile.error(), Some("document default/nowhere not found"));

    // ...and a routed request 404s naming the missing document.
    let (status, _, body) = get(&app, "/boot.ipxe").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("default/nowhere"));
}

#[tokio::test]
async fn test_higher_weight_matcher_wins() {
    let weighted = r#"
kind: Document
name: generic
mimeType: text/plain
text: generic
---
kind: Document
name: special
mimeType: text/plain
text: special
---
kind: Profile
name: generic-profile
resources:
  - path: boot.ipxe
    documentName: generic
---
kind: Profile
name: special-profile
resources:
  - path: boot.ipxe
    documentName: special
---
kind: Matcher
name: catch-all
weight: 0
profile: generic-profile
---
kind: Matcher
name: linux-special
selector:
  matchLabels:
    os: linux
profile: special-profile
"#;
    let (app, _) = app_with(weighted);

    // linux-special has derived weight 1 and shadows the catch-all.
    let (_, _, body) = get(&app, "/boot.ipxe?os=linux").await;
    assert_eq!(body, "special");

    let (_, _, body) = get(&app, "/boot.ipxe?os=bsd").await;
    assert_eq!(body, "generic");
}

#[tokio::test]
async fn test_mapping_failure_is_422() {
    let failing = r#"
kind: Document
name: needs-key
mimeType: text/plain
text: x
mapping:
  kernel: "{{ metadata.never_supplied }}"
---
kind: Profile
name: p
resources:
  - path: boot.ipxe
    documentName: needs-key
---
kind: Matcher
name: all
profile: p
"#;
    let (app, _) = app_with(failing);
    let (status, _, _) = get(&app, "/boot.ipxe").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_redirect_document() {
    let redirect = r#"
kind: Document
name: image
mimeType: application/octet-stream
url: "http://mirror.example/images/{{ metadata.arch }}.img"
redirect: true
---
kind: Profile
name: p
resources:
  - path: image
    documentName: image
---
kind: Matcher
name: all
profile: p
"#;
    let (app, _) = app_with(redirect);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/image?arch=amd64")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "http://mirror.example/images/amd64.img"
    );
}
