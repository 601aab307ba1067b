use actix_web::http::header::Header;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use serde::Serialize;
use serde_json::json;

use crate::{
    auth::{self, clear_logout_cookie, logout_cookie, SignUp, AUTH_REALM},
    error::{AppError, AppResult},
    models::{Review, Service, ServiceStatus, User},
    state::AppState,
    stores::{
        catalog::{self, ServiceQuery},
        contact::{self, ContactForm},
        profiles,
        reviews::{self, RatingSummary},
    },
};

const SERVICE_PAGE_REVIEWS: usize = 5;

#[derive(Serialize)]
struct ServiceDetail {
    service: Service,
    provider: User,
    reviews: Vec<Review>,
}

#[derive(Serialize)]
struct ProviderDetail {
    provider: User,
    rating: RatingSummary,
    services: Vec<Service>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/signup").route(web::post().to(signup)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/services").route(web::get().to(browse)))
        .service(web::resource("/services/{id}").route(web::get().to(service_detail)))
        .service(web::resource("/providers/{id}").route(web::get().to(provider_detail)))
        .service(web::resource("/contact").route(web::post().to(submit_contact)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn signup(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Json<SignUp>,
) -> AppResult<HttpResponse> {
    let session = auth::sign_up(&state.db, form.into_inner()).await?;
    Ok(HttpResponse::Created()
        .cookie(clear_logout_cookie(&req))
        .json(session))
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(json!({ "signedOut": true }))
}

async fn login(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let session = match auth::sign_in(&state.db, email, password).await {
        Some(session) => session,
        None => {
            log::warn!("Failed sign-in for {email}");
            return auth_challenge();
        }
    };

    HttpResponse::Ok()
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(session)
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(json!({ "error": "authentication required" }))
}

async fn browse(state: web::Data<AppState>, query: web::Query<ServiceQuery>) -> AppResult<HttpResponse> {
    let services = catalog::browse(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn service_detail(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    let service_id = path.into_inner();
    let service = catalog::get_service(&state.db, &service_id)
        .await?
        .ok_or(AppError::NotFound("service"))?;
    let provider = profiles::provider_profile(&state.db, &service.provider_id).await?;
    let reviews = reviews::reviews_for_service(&state.db, &service_id, Some(SERVICE_PAGE_REVIEWS)).await?;
    Ok(HttpResponse::Ok().json(ServiceDetail {
        service,
        provider,
        reviews,
    }))
}

async fn provider_detail(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    let provider = profiles::provider_profile(&state.db, &path).await?;
    let rating = reviews::provider_rating(&state.db, &provider.id).await?;
    let services = catalog::services_by_provider(&state.db, &provider.id)
        .await?
        .into_iter()
        .filter(|service| service.status == ServiceStatus::Active)
        .collect();
    Ok(HttpResponse::Ok().json(ProviderDetail {
        provider,
        rating,
        services,
    }))
}

async fn submit_contact(state: web::Data<AppState>, form: web::Json<ContactForm>) -> AppResult<HttpResponse> {
    let submission = contact::submit_contact(&state.db, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "id": submission.id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{basic_auth, listing, provider, test_pool, PASSWORD};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn signup_then_login() {
        let pool = test_pool().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(pool)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({
                "email": "Cam@Example.com",
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
                "displayName": "Cam Client",
                "role": "client"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get()
            .uri("/login")
            .insert_header(basic_auth("cam@example.com"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["email"], "cam@example.com");
        assert_eq!(body["role"], "client");

        let req = test::TestRequest::get().uri("/login").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[actix_web::test]
    async fn signup_errors_map_to_statuses() {
        let pool = test_pool().await;
        provider(&pool, "pat@example.com", "Sparkle Co").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(pool)))
                .configure(configure),
        )
        .await;

        let taken = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({
                "email": "pat@example.com",
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
                "displayName": "Pat Again",
                "role": "client"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, taken).await.status(), StatusCode::CONFLICT);

        let mismatch = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({
                "email": "new@example.com",
                "password": PASSWORD,
                "confirmPassword": "different",
                "displayName": "New Person",
                "role": "client"
            }))
            .to_request();
        let resp = test::call_service(&app, mismatch).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Passwords do not match.");
    }

    #[actix_web::test]
    async fn service_page_includes_provider_and_reviews() {
        let pool = test_pool().await;
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let service = listing(&pool, &pat, 120.0).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(pool)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/services/{}", service.id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["service"]["name"], "Deep clean");
        assert_eq!(body["provider"]["businessName"], "Sparkle Co");
        assert_eq!(body["reviews"].as_array().map(Vec::len), Some(0));

        let req = test::TestRequest::get().uri("/services?category=cleaning").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let req = test::TestRequest::get()
            .uri(&format!("/providers/{}", pat.user_id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["rating"]["count"], 0);
        assert_eq!(body["services"].as_array().map(Vec::len), Some(1));

        let req = test::TestRequest::get().uri("/services/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn logout_sets_the_marker_cookie() {
        let pool = test_pool().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(pool)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/logout").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.response().cookies().any(|cookie| cookie.name() == "fixit_logged_out"));
    }
}
