use actix_web::{middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{logout_guard, provider_validator, Session},
    error::AppResult,
    models::PaymentStatus,
    routes::client::{CancelForm, ListQuery},
    state::AppState,
    stores::{
        bookings,
        catalog::{self, NewService, ServicePatch},
        dashboard, payments, reviews,
    },
};

#[derive(Deserialize)]
struct PaymentQuery {
    status: Option<PaymentStatus>,
    limit: Option<usize>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/provider")
            .wrap(HttpAuthentication::basic(provider_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/services")
                    .route(web::get().to(my_services))
                    .route(web::post().to(create_service)),
            )
            .service(
                web::resource("/services/{id}")
                    .route(web::put().to(update_service))
                    .route(web::delete().to(delete_service)),
            )
            .service(web::resource("/bookings").route(web::get().to(list_bookings)))
            .service(web::resource("/bookings/{id}").route(web::get().to(booking_detail)))
            .service(web::resource("/bookings/{id}/confirm").route(web::post().to(confirm)))
            .service(web::resource("/bookings/{id}/start").route(web::post().to(start)))
            .service(web::resource("/bookings/{id}/complete").route(web::post().to(complete)))
            .service(web::resource("/bookings/{id}/cancel").route(web::post().to(cancel)))
            .service(web::resource("/payments").route(web::get().to(list_payments)))
            .service(web::resource("/reviews").route(web::get().to(my_reviews))),
    );
}

async fn dashboard(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let stats = dashboard::provider_stats(&state.db, &session, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

async fn my_services(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let services = catalog::services_by_provider(&state.db, &session.user_id).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn create_service(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Json<NewService>,
) -> AppResult<HttpResponse> {
    let service = catalog::create_service(&state.db, &session, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(service))
}

async fn update_service(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<ServicePatch>,
) -> AppResult<HttpResponse> {
    let service = catalog::update_service(&state.db, &session, &path, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn delete_service(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    catalog::delete_service(&state.db, &session, &path).await?;
    Ok(HttpResponse::NoContent().finish())
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

async fn booking_detail(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let booking = bookings::get_booking(&state.db, &session, &path).await?;
    let payment = payments::payment_for_booking(&state.db, &booking.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "booking": booking, "payment": payment })))
}

async fn confirm(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let booking = bookings::confirm_booking(&state.db, &state.events, &session, &path).await?;
    Ok(HttpResponse::Ok().json(booking))
}

async fn start(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let booking = bookings::start_service(&state.db, &state.events, &session, &path).await?;
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

async fn cancel(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Json<CancelForm>,
) -> AppResult<HttpResponse> {
    let booking = bookings::cancel_booking(&state.db, &state.events, &session, &path, &form.reason).await?;
    Ok(HttpResponse::Ok().json(booking))
}

async fn list_payments(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    query: web::Query<PaymentQuery>,
) -> AppResult<HttpResponse> {
    let listed = payments::payments_for_provider(&state.db, &session, query.status, query.limit).await?;
    Ok(HttpResponse::Ok().json(listed))
}

async fn my_reviews(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let listed = reviews::reviews_for_provider(&state.db, &session.user_id).await?;
    let rating = reviews::provider_rating(&state.db, &session.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "reviews": listed, "rating": rating })))
}
