/// HTTP middleware for stream-service
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::AppError;
use crate::security::TokenService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Rejects requests without a valid `Authorization: Bearer` token and
/// exposes the caller as a [`UserId`] extension.
pub struct JwtAuthMiddleware {
    tokens: Rc<TokenService>,
}

impl JwtAuthMiddleware {
    pub fn new(tokens: TokenService) -> Self {
        Self {
            tokens: Rc::new(tokens),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    tokens: Rc<TokenService>,
}

fn bearer_user(req: &ServiceRequest, tokens: &TokenService) -> Result<Uuid, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".to_string()))?;

    tokens.verify_bearer(token.trim())
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let user = bearer_user(&req, &self.tokens);

        Box::pin(async move {
            let user_id = user?;
            req.extensions_mut().insert(UserId(user_id));
            service.call(req).await
        })
    }
}

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<UserId>()
                .copied()
                .ok_or_else(|| AppError::Unauthorized("User ID missing".to_string()).into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};
    use chrono::Duration;

    async fn whoami(user: UserId) -> HttpResponse {
        HttpResponse::Ok().body(user.0.to_string())
    }

    fn tokens() -> TokenService {
        TokenService::new("middleware-secret", 60)
    }

    #[actix_web::test]
    async fn valid_bearer_reaches_handler() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuthMiddleware::new(tokens()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let user = Uuid::new_v4();
        let token = tokens().issue_bearer(user, Duration::minutes(5)).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, user.to_string());
    }

    #[actix_web::test]
    async fn missing_or_bad_bearer_is_401() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuthMiddleware::new(tokens()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        for header in [None, Some("Basic abc"), Some("Bearer not-a-jwt")] {
            let mut req = test::TestRequest::get().uri("/me");
            if let Some(value) = header {
                req = req.insert_header(("Authorization", value));
            }
            let err = app.call(req.to_request()).await.unwrap_err();
            assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
