use actix_web::{http::header, middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use futures::stream;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{basic_validator, logout_guard, Session},
    error::AppResult,
    state::{AppState, ServerEvent},
    stores::messaging,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(stream_events)),
    );
}

/// Booking and message events that concern the signed-in user.
async fn stream_events(state: web::Data<AppState>, session: web::ReqData<Session>) -> HttpResponse {
    let user_id = session.user_id.clone();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.concerns(&user_id) => {
            Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
        }
        _ => None,
    });

    sse_response().streaming(stream)
}

fn sse_response() -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"));
    builder
}

fn frame<T: Serialize>(name: &str, payload: &T) -> web::Bytes {
    let payload = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: {name}\ndata: {payload}\n\n"))
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    frame(&event.kind, event)
}

/// Full message list of one conversation, re-sent after every change.
pub(crate) async fn stream_conversation(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let subscription =
        messaging::subscribe_to_messages(&state.db, &state.events, &session, &path).await?;

    let snapshots = stream::unfold(subscription, |mut subscription| async move {
        match subscription.next().await {
            Ok(Some(messages)) => Some((
                Ok::<web::Bytes, actix_web::Error>(frame("messages", &messages)),
                subscription,
            )),
            Ok(None) => None,
            Err(err) => {
                log::warn!("Message stream ended: {err}");
                None
            }
        }
    });

    Ok(sse_response().streaming(snapshots))
}
