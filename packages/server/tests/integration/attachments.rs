use uuid::Uuid;

use crate::common::{MAX_UPLOAD_BYTES, STUB_PNG, TestApp, parse_sse, routes};

const VISION_MODEL: &str = "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo";

#[tokio::test]
async fn image_attachment_switches_to_vision_and_streams_analysis() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Photo review").await;
    let client_ref = Uuid::new_v4();

    let res = app
        .multipart_with_token(
            &routes::attachments(chat),
            "fox.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[("client_ref", client_ref.to_string())],
            &token,
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.text);
    let events = parse_sse(&res.text);
    let order: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(
        order,
        [
            "model_switched",
            "user_message",
            "generation",
            "user_message",
            "delta",
            "delta",
            "delta",
            "assistant_message",
            "done",
        ]
    );

    assert_eq!(events[0].data["to"], VISION_MODEL);
    assert_eq!(events[0].data["notice"], "Switched to Llama 3.2 Vision to process files");

    let file_message = &events[1].data["message"];
    assert_eq!(file_message["content"], "fox.png");
    assert_eq!(file_message["content_type"], "image");
    assert_eq!(file_message["metadata"]["client_ref"], client_ref.to_string());
    assert!(file_message["metadata"]["file_url"].as_str().unwrap().contains("/uploaded/"));

    assert_eq!(events[2].data["generation"]["model"], "upload");
    assert_eq!(events[2].data["generation"]["metadata"]["is_generated"], false);
    assert_eq!(events[3].data["message"]["content_type"], "text");
    assert_eq!(events[7].data["message"]["content"], "Hello world");

    let stored = app.get_with_token(&routes::chat(chat), &token).await;
    assert_eq!(stored.body["model"], VISION_MODEL);
}

#[tokio::test]
async fn custom_prompt_is_used_for_the_analysis() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Photo review").await;

    let res = app
        .multipart_with_token(
            &routes::attachments(chat),
            "fox.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[
                ("prompt", "What animal is this?".into()),
                ("model", VISION_MODEL.into()),
            ],
            &token,
        )
        .await;

    let events = parse_sse(&res.text);
    assert!(events.iter().all(|e| e.event != "model_switched"));
    let prompt = events
        .iter()
        .filter(|e| e.event == "user_message")
        .nth(1)
        .unwrap();
    assert_eq!(prompt.data["message"]["content"], "What animal is this?");
}

#[tokio::test]
async fn documents_are_analysed_without_a_generation() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Paperwork").await;

    let res = app
        .multipart_with_token(
            &routes::attachments(chat),
            "report.pdf",
            "application/pdf",
            b"%PDF-1.4 report".to_vec(),
            &[],
            &token,
        )
        .await;

    let events = parse_sse(&res.text);
    assert!(events.iter().all(|e| e.event != "generation"));
    let file_message = events.iter().find(|e| e.event == "user_message").unwrap();
    assert_eq!(file_message.data["message"]["content_type"], "pdf");
    assert_eq!(events.last().unwrap().event, "done");

    let gallery = app.get_with_token(&routes::chat_generations(chat), &token).await;
    assert_eq!(gallery.body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn oversize_attachment_is_rejected_before_anything_is_saved() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Photo review").await;

    let res = app
        .multipart_with_token(
            &routes::attachments(chat),
            "huge.png",
            "image/png",
            vec![7u8; MAX_UPLOAD_BYTES as usize + 1],
            &[],
            &token,
        )
        .await;

    assert_eq!(res.status, 413);
    assert_eq!(res.body["code"], "PAYLOAD_TOO_LARGE");
    let messages = app.get_with_token(&routes::chat_messages(chat), &token).await;
    assert_eq!(messages.body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn attachments_require_chat_ownership() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Private").await;

    let res = app
        .multipart_with_token(
            &routes::attachments(chat),
            "fox.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[],
            &mallory,
        )
        .await;

    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn missing_file_is_a_validation_error() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Photo review").await;

    let res = app
        .multipart_with_token(&routes::attachments(chat), "empty.png", "image/png", vec![], &[], &token)
        .await;

    assert_eq!(res.status, 400);
}
