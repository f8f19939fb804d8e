use crate::common::{MAX_UPLOAD_BYTES, STUB_PNG, TestApp, routes};

#[tokio::test]
async fn upload_stores_the_file_and_serves_it_back() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;

    let res = app
        .multipart_with_token(
            routes::UPLOAD,
            "notes.pdf",
            "application/pdf",
            b"%PDF-1.4 fake".to_vec(),
            &[],
            &token,
        )
        .await;

    assert_eq!(res.status, 201, "{}", res.text);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["size"], 13);
    assert_eq!(res.body["content_hash"].as_str().unwrap().len(), 64);
    assert!(res.body.get("generation_id").is_none());
    let key = res.body["key"].as_str().unwrap();
    assert!(key.starts_with("uploaded/") && key.ends_with(".pdf"), "{key}");
    assert!(res.body["url"].as_str().unwrap().ends_with(key));

    let file = app
        .client
        .get(app.url(&routes::file(key)))
        .send()
        .await
        .unwrap();
    assert_eq!(file.status(), 200);
    assert_eq!(file.headers()["content-type"], "application/pdf");
    assert_eq!(file.bytes().await.unwrap().as_ref(), b"%PDF-1.4 fake");
}

#[tokio::test]
async fn generated_image_with_a_chat_records_a_generation() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Art").await;

    let res = app
        .multipart_with_token(
            routes::UPLOAD,
            "fox.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[
                ("chat_id", chat.to_string()),
                ("is_generated", "true".into()),
                ("prompt", "a red fox".into()),
                ("model", "black-forest-labs/FLUX.1-schnell-Free".into()),
            ],
            &token,
        )
        .await;

    assert_eq!(res.status, 201, "{}", res.text);
    assert!(res.body["key"].as_str().unwrap().starts_with("generated/"));
    let generation_id = res.body["generation_id"].as_str().unwrap();

    let gallery = app.get_with_token(&routes::chat_generations(chat), &token).await;
    let generation = &gallery.body["data"][0];
    assert_eq!(generation["id"], generation_id);
    assert_eq!(generation["prompt"], "a red fox");
    assert_eq!(generation["url"], res.body["url"]);
    assert_eq!(generation["metadata"]["is_generated"], true);
    assert_eq!(generation["metadata"]["file_name"], "fox.png");
    assert_eq!(generation["metadata"]["storage_key"], res.body["key"]);
    assert_eq!(generation["metadata"]["content_hash"], res.body["content_hash"]);
}

#[tokio::test]
async fn non_image_uploads_never_create_generations() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Docs").await;

    let res = app
        .multipart_with_token(
            routes::UPLOAD,
            "data.csv",
            "text/csv",
            b"a,b\n1,2\n".to_vec(),
            &[("chat_id", chat.to_string())],
            &token,
        )
        .await;

    assert_eq!(res.status, 201);
    assert!(res.body["key"].as_str().unwrap().ends_with(".csv"));
    assert!(res.body.get("generation_id").is_none());
}

#[tokio::test]
async fn oversize_upload_is_rejected_and_nothing_is_stored() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;

    let res = app
        .multipart_with_token(
            routes::UPLOAD,
            "big.png",
            "image/png",
            vec![0u8; MAX_UPLOAD_BYTES as usize + 1],
            &[],
            &token,
        )
        .await;

    assert_eq!(res.status, 413);
    assert_eq!(res.body["code"], "PAYLOAD_TOO_LARGE");

    let root = &app.state.config.storage.root;
    for origin in ["uploaded", "generated"] {
        assert!(!root.join(origin).exists(), "{origin} should be empty");
    }
}

#[tokio::test]
async fn upload_to_someone_elses_chat_is_forbidden() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Art").await;

    let res = app
        .multipart_with_token(
            routes::UPLOAD,
            "x.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[("chat_id", chat.to_string())],
            &mallory,
        )
        .await;

    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn traversal_keys_are_rejected() {
    let app = TestApp::spawn().await;

    let res = app.get_without_token("/api/v1/files/uploaded/.hidden").await;
    assert_eq!(res.status, 400);

    let res = app.get_without_token("/api/v1/files/uploaded/missing.png").await;
    assert_eq!(res.status, 404);
}
