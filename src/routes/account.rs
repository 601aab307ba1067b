use actix_web::{middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{self, basic_validator, logout_guard, Session},
    error::{AppError, AppResult},
    models::Conversation,
    routes::events,
    state::AppState,
    stores::{
        messaging,
        payments::{self, ensure_visible},
        profiles::{self, ProfileUpdate},
    },
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordForm {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

#[derive(Serialize)]
struct ConversationView {
    #[serde(flatten)]
    conversation: Conversation,
    unread: i64,
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Option<String>,
}

#[derive(Deserialize)]
struct MessageForm {
    text: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/me")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .service(
                web::resource("")
                    .route(web::get().to(me))
                    .route(web::put().to(update_me)),
            )
            .service(web::resource("/password").route(web::post().to(change_password)))
            .service(web::resource("/bookings/{id}/payment").route(web::get().to(booking_payment))),
    )
    .service(
        web::scope("/conversations")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(list_conversations)))
            .service(
                web::resource("/{id}/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(send_message)),
            )
            .service(web::resource("/{id}/read").route(web::post().to(mark_read)))
            .service(web::resource("/{id}/stream").route(web::get().to(events::stream_conversation))),
    );
}

async fn me(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let current = auth::current_user(&state.db, &session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let profile = profiles::get_profile(&state.db, &current.user_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;
    Ok(HttpResponse::Ok().json(json!({ "session": current, "profile": profile })))
}

async fn update_me(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let profile = profiles::update_profile(&state.db, &session, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

async fn change_password(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<PasswordForm>,
) -> AppResult<HttpResponse> {
    auth::change_password(
        &state.db,
        &session,
        &form.current_password,
        &form.new_password,
        &form.confirm_password,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn booking_payment(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let payment = payments::payment_for_booking(&state.db, &path)
        .await?
        .ok_or(AppError::NotFound("payment"))?;
    ensure_visible(&session, &payment)?;
    Ok(HttpResponse::Ok().json(payment))
}

async fn list_conversations(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let conversations = messaging::conversations_for(&state.db, &session, query.search.as_deref()).await?;
    let views: Vec<ConversationView> = conversations
        .into_iter()
        .filter_map(|conversation| {
            let side = conversation.side_of(&session.user_id)?;
            Some(ConversationView {
                unread: conversation.unread_for(side),
                conversation,
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

async fn list_messages(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let messages = messaging::messages(&state.db, &session, &path).await?;
    Ok(HttpResponse::Ok().json(messages))
}

async fn send_message(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<MessageForm>,
) -> AppResult<HttpResponse> {
    let message = messaging::send_message(&state.db, &state.events, &session, &path, &form.text).await?;
    Ok(HttpResponse::Created().json(message))
}

async fn mark_read(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let marked = messaging::mark_conversation_read(&state.db, &state.events, &session, &path).await?;
    Ok(HttpResponse::Ok().json(json!({ "marked": marked })))
}
