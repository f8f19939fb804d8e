use axum::routing::get;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;
use crate::utils::multipart::upload_body_limit;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let max_upload = config.storage.max_upload_bytes;
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/chats", chat_routes(max_upload))
        .nest("/messages", message_routes())
        .nest("/generations", generation_routes())
        .nest("/upload", upload_routes(max_upload))
        .nest("/inference", inference_routes())
        .nest("/events", event_routes())
        .routes(routes!(handlers::inference::list_models))
        .route("/files/{*key}", get(handlers::files::get_file))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::oauth_login))
        .routes(routes!(handlers::auth::me))
}

fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::user::update_profile))
}

fn chat_routes(max_upload: u64) -> OpenApiRouter<AppState> {
    let crud = OpenApiRouter::new()
        .routes(routes!(
            handlers::chat::list_chats,
            handlers::chat::create_chat
        ))
        .routes(routes!(
            handlers::chat::get_chat,
            handlers::chat::update_chat,
            handlers::chat::delete_chat
        ))
        .routes(routes!(
            handlers::message::list_messages,
            handlers::message::create_message
        ))
        .routes(routes!(handlers::generation::list_chat_generations))
        .routes(routes!(handlers::turn::send_turn));

    let attachments = OpenApiRouter::new()
        .routes(routes!(handlers::attachment::attach_file))
        .layer(upload_body_limit(max_upload));

    crud.merge(attachments)
}

fn message_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(
        handlers::message::get_message,
        handlers::message::update_message,
        handlers::message::delete_message
    ))
}

fn generation_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::generation::list_generations,
            handlers::generation::create_generation
        ))
        .routes(routes!(
            handlers::generation::get_generation,
            handlers::generation::update_generation,
            handlers::generation::delete_generation
        ))
}

fn upload_routes(max_upload: u64) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::upload::upload_file))
        .layer(upload_body_limit(max_upload))
}

fn inference_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::inference::create_completion))
        .routes(routes!(handlers::inference::generate_image))
}

fn event_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::events::stream_events))
}
