use actix_web::{http::header, middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Serialize;

use crate::{
    auth::{admin_validator, logout_guard, Session},
    error::AppResult,
    routes::client::ListQuery,
    state::AppState,
    stores::{bookings, contact, profiles},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Overview {
    users: i64,
    providers: i64,
    services: i64,
    bookings: i64,
    pending_bookings: i64,
    completed_bookings: i64,
    revenue: f64,
    new_messages: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/users").route(web::get().to(list_users)))
            .service(web::resource("/bookings").route(web::get().to(list_bookings)))
            .service(web::resource("/contact").route(web::get().to(list_contact)))
            .service(web::resource("/contact/{id}/handled").route(web::post().to(mark_handled))),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/admin/dashboard"))
        .finish()
}

async fn count(state: &AppState, query: &str) -> AppResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(query).fetch_one(&state.db).await?)
}

async fn dashboard(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let revenue = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT SUM(amount) FROM payments WHERE status = 'paid'",
    )
    .fetch_one(&state.db)
    .await?;

    let overview = Overview {
        users: count(&state, "SELECT COUNT(*) FROM users").await?,
        providers: count(&state, "SELECT COUNT(*) FROM users WHERE role = 'provider'").await?,
        services: count(&state, "SELECT COUNT(*) FROM services").await?,
        bookings: count(&state, "SELECT COUNT(*) FROM bookings").await?,
        pending_bookings: count(&state, "SELECT COUNT(*) FROM bookings WHERE status = 'pending'").await?,
        completed_bookings: count(&state, "SELECT COUNT(*) FROM bookings WHERE status = 'completed'")
            .await?,
        revenue: crate::lifecycle::round2(revenue.unwrap_or(0.0)),
        new_messages: count(&state, "SELECT COUNT(*) FROM contact_submissions WHERE status = 'new'")
            .await?,
    };
    Ok(HttpResponse::Ok().json(overview))
}

async fn list_users(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let users = profiles::list_users(&state.db, &session).await?;
    Ok(HttpResponse::Ok().json(users))
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

async fn list_contact(state: web::Data<AppState>, session: web::ReqData<Session>) -> AppResult<HttpResponse> {
    let submissions = contact::list_submissions(&state.db, &session).await?;
    Ok(HttpResponse::Ok().json(submissions))
}

async fn mark_handled(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    contact::mark_handled(&state.db, &session, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}
