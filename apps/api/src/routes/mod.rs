pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;
use crate::{auth, billing, pages, profile, roles, webhook};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Public pages
        .route("/", get(pages::handle_home))
        .route("/login", get(pages::handle_login))
        .route("/terms", get(pages::handle_terms))
        .route("/privacy", get(pages::handle_privacy))
        // Authentication
        .route(
            "/api/auth/sign-in/google",
            get(auth::handlers::handle_sign_in_google),
        )
        .route(
            "/api/auth/callback/google",
            get(auth::handlers::handle_google_callback),
        )
        .route("/api/auth/sign-out", post(auth::handlers::handle_sign_out))
        .route("/api/auth/session", get(auth::handlers::handle_get_session))
        // Profile
        .route(
            "/api/v1/profile",
            get(profile::handlers::handle_get_profile)
                .put(profile::handlers::handle_update_profile)
                .delete(profile::handlers::handle_delete_profile),
        )
        // Roles and plans
        .route("/api/v1/me/role", get(roles::handlers::handle_get_my_role))
        .route("/api/v1/me/plan", get(roles::handlers::handle_get_my_plan))
        .route("/api/v1/me/access", get(roles::handlers::handle_get_my_access))
        .route(
            "/api/v1/admin/users/:user_id/role",
            put(roles::handlers::handle_update_user_role),
        )
        // Billing
        .route(
            "/api/v1/billing/status",
            get(billing::handlers::handle_billing_status),
        )
        .route(
            "/api/v1/billing/prices",
            get(billing::handlers::handle_list_prices),
        )
        .route(
            "/api/v1/billing/checkout/subscription",
            post(billing::handlers::handle_subscription_checkout),
        )
        .route(
            "/api/v1/billing/checkout/donation",
            post(billing::handlers::handle_donation_checkout),
        )
        .route(
            "/api/v1/billing/portal",
            post(billing::handlers::handle_open_portal),
        )
        .route(
            "/api/v1/billing/subscription",
            get(billing::handlers::handle_get_subscription),
        )
        .route(
            "/api/v1/billing/subscription/active",
            get(billing::handlers::handle_has_active_subscription),
        )
        .route(
            "/api/v1/billing/subscription/cancel",
            post(billing::handlers::handle_cancel_subscription),
        )
        .route(
            "/api/v1/billing/subscription/resume",
            post(billing::handlers::handle_resume_subscription),
        )
        .route(
            "/api/v1/billing/donations",
            get(billing::handlers::handle_list_donations),
        )
        .route(
            "/api/v1/billing/donations/total",
            get(billing::handlers::handle_total_donations),
        )
        // Stripe webhook
        .route("/api/stripe/webhook", post(webhook::handle_stripe_webhook))
        .fallback(pages::handle_not_found)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppState::for_tests(Config::for_tests()))
    }

    async fn send(request: Request<Body>) -> Response {
        app().oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_public_pages_render() {
        for uri in ["/", "/login", "/terms", "/privacy"] {
            let response = send(get_request(uri)).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
            assert!(content_type.starts_with("text/html"), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_path_renders_not_found_page() {
        let response = send(get_request("/does-not-exist")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page not found"));
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        for uri in ["/api/v1/profile", "/api/v1/me/role", "/api/v1/billing/subscription"] {
            let response = send(get_request(uri)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_ignored() {
        let request = Request::builder()
            .uri("/api/v1/profile")
            .header(header::COOKIE, "session_token=abc.not-a-signature")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_is_null_when_signed_out() {
        let response = send(get_request("/api/auth/session")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_sign_out_clears_cookie() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/sign-out")
            .body(Body::empty())
            .unwrap();
        let response = send(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_billing_reports_unavailable_without_stripe() {
        let response = send(get_request("/api/v1/billing/status")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["available"], false);
    }

    #[tokio::test]
    async fn test_webhook_unavailable_without_stripe() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/stripe/webhook")
            .header("stripe-signature", "t=1,v1=00")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(send(request).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_requires_signature_header() {
        let config = Config {
            stripe_secret_key: Some("sk_test_123".to_string()),
            stripe_webhook_secret: Some("whsec_test".to_string()),
            ..Config::for_tests()
        };
        let app = build_router(AppState::for_tests(config));

        let missing = Request::builder()
            .method("POST")
            .uri("/api/stripe/webhook")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.clone().oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Missing stripe-signature header"));

        let forged = Request::builder()
            .method("POST")
            .uri("/api/stripe/webhook")
            .header("stripe-signature", "t=1,v1=deadbeef")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(forged).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Invalid signature"));
    }
}
