use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::{web, Error};
use futures_util::future::{LocalBoxFuture, ready, Ready};
use std::collections::HashMap;
use std::rc::Rc;

/// Lets HTML forms reach PATCH/DELETE routes: `POST /x?_method=PATCH` is
/// dispatched as `PATCH /x`. Only POST requests are rewritten.
#[derive(Clone)]
pub struct MethodOverride {
    pub param: &'static str,
}

impl Default for MethodOverride {
    fn default() -> Self {
        Self { param: "_method" }
    }
}

impl MethodOverride {
    pub fn with_param(param: &'static str) -> Self {
        Self { param }
    }

    /// Resolves the override named in a query string, if any.
    pub fn requested(&self, query: &str) -> Option<Method> {
        let params = web::Query::<HashMap<String, String>>::from_query(query).ok()?;
        // only verbs the post routes answer
        match params.get(self.param)?.to_ascii_uppercase().as_str() {
            "PATCH" => Some(Method::PATCH),
            "DELETE" => Some(Method::DELETE),
            _ => None,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for MethodOverride
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MethodOverrideMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MethodOverrideMiddleware {
            service: Rc::new(service),
            cfg: self.clone(),
        }))
    }
}

pub struct MethodOverrideMiddleware<S> {
    service: Rc<S>,
    cfg: MethodOverride,
}

impl<S, B> Service<ServiceRequest> for MethodOverrideMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        if req.method() == Method::POST {
            if let Some(method) = self.cfg.requested(req.query_string()) {
                log::debug!("method override POST -> {method} for {}", req.path());
                req.head_mut().method = method;
            }
        }
        let svc = self.service.clone();
        Box::pin(async move { svc.call(req).await })
    }
}
