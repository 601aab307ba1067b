use actix_web::{middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{client_validator, logout_guard, Session},
    error::AppResult,
    lifecycle::BookingTab,
    models::FavoriteKind,
    state::AppState,
    stores::{
        bookings::{self, NewBooking, Reschedule},
        dashboard, favorites, messaging, payments,
        reviews::{self, NewReview, ReviewPatch},
    },
};

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub tab: BookingTab,
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct CancelForm {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
struct FavoriteQuery {
    #[serde(rename = "type")]
    kind: Option<FavoriteKind>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteForm {
    #[serde(rename = "type")]
    kind: FavoriteKind,
    item_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationForm {
    provider_id: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/client")
            .wrap(HttpAuthentication::basic(client_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/bookings")
                    .route(web::get().to(list_bookings))
                    .route(web::post().to(create_booking)),
            )
            .service(
                web::resource("/bookings/{id}")
                    .route(web::get().to(booking_detail))
                    .route(web::put().to(reschedule)),
            )
            .service(web::resource("/bookings/{id}/cancel").route(web::post().to(cancel)))
            .service(web::resource("/bookings/{id}/complete").route(web::post().to(complete)))
            .service(web::resource("/payments").route(web::get().to(list_payments)))
            .service(
                web::resource("/reviews")
                    .route(web::get().to(my_reviews))
                    .route(web::post().to(create_review)),
            )
            .service(web::resource("/reviews/pending").route(web::get().to(pending_reviews)))
            .service(
                web::resource("/reviews/{id}")
                    .route(web::put().to(update_review))
                    .route(web::delete().to(delete_review)),
            )
            .service(
                web::resource("/favorites")
                    .route(web::get().to(list_favorites))
                    .route(web::post().to(add_favorite)),
            )
            .service(web::resource("/favorites/services").route(web::get().to(favorite_services)))
            .service(web::resource("/favorites/providers").route(web::get().to(favorite_providers)))
            .service(web::resource("/favorites/{id}").route(web::delete().to(remove_favorite)))
            .service(web::resource("/conversations").route(web::post().to(start_conversation))),
    );
}

async fn dashboard(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let stats = dashboard::client_stats(&state.db, &session, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

async fn list_bookings(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    let listed = bookings::list_bookings(
        &state.db,
        &session,
        query.tab,
        query.search.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(listed))
}

async fn create_booking(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<NewBooking>,
) -> AppResult<HttpResponse> {
    let booking = bookings::create_booking(&state.db, &state.events, &session, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(booking))
}

async fn booking_detail(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let booking = bookings::get_booking(&state.db, &session, &path).await?;
    let payment = payments::payment_for_booking(&state.db, &booking.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "booking": booking, "payment": payment })))
}

async fn reschedule(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<Reschedule>,
) -> AppResult<HttpResponse> {
    let booking =
        bookings::reschedule_booking(&state.db, &state.events, &session, &path, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(booking))
}

async fn cancel(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<CancelForm>,
) -> AppResult<HttpResponse> {
    let booking = bookings::cancel_booking(&state.db, &state.events, &session, &path, &form.reason).await?;
    Ok(HttpResponse::Ok().json(booking))
}

async fn complete(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let booking = bookings::complete_service(&state.db, &state.events, &session, &path).await?;
    Ok(HttpResponse::Ok().json(booking))
}

async fn list_payments(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let listed = payments::payments_for_client(&state.db, &session).await?;
    let total = payments::total_paid(&listed);
    Ok(HttpResponse::Ok().json(json!({ "payments": listed, "totalPaid": total })))
}

async fn my_reviews(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let listed = reviews::reviews_by_client(&state.db, &session.user_id).await?;
    Ok(HttpResponse::Ok().json(listed))
}

async fn pending_reviews(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let pending = reviews::pending_reviews(&state.db, &session).await?;
    Ok(HttpResponse::Ok().json(pending))
}

async fn create_review(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<NewReview>,
) -> AppResult<HttpResponse> {
    let review = reviews::create_review(&state.db, &session, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(review))
}

async fn update_review(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<ReviewPatch>,
) -> AppResult<HttpResponse> {
    let review = reviews::update_review(&state.db, &session, &path, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(review))
}

async fn delete_review(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    reviews::delete_review(&state.db, &session, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_favorites(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    query: web::Query<FavoriteQuery>,
) -> AppResult<HttpResponse> {
    let listed = favorites::favorites_for(&state.db, &session, query.kind).await?;
    Ok(HttpResponse::Ok().json(listed))
}

async fn add_favorite(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<FavoriteForm>,
) -> AppResult<HttpResponse> {
    let (favorite, existed) = favorites::add_favorite(&state.db, &session, form.kind, &form.item_id).await?;
    let mut response = if existed {
        HttpResponse::Ok()
    } else {
        HttpResponse::Created()
    };
    Ok(response.json(favorite))
}

async fn favorite_services(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let services = favorites::favorite_services(&state.db, &session).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn favorite_providers(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let providers = favorites::favorite_providers(&state.db, &session).await?;
    Ok(HttpResponse::Ok().json(providers))
}

async fn remove_favorite(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    favorites::remove_favorite(&state.db, &session, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn start_conversation(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<ConversationForm>,
) -> AppResult<HttpResponse> {
    let conversation = messaging::start_conversation(&state.db, &session, &form.provider_id).await?;
    Ok(HttpResponse::Ok().json(conversation))
}
