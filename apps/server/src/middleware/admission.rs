//! Admission filter middleware - rejects clients over quota before the
//! request reaches its handler.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use gatekeep_core::domain::{FORWARDED_FOR_HEADER, REAL_IP_HEADER, extract_identity};
use gatekeep_core::{Decision, DecisionEngine, RejectReason, Verdict};
use gatekeep_shared::ErrorResponse;

/// Body of every quota rejection.
pub static REJECTION_MESSAGE: &str = "Max Rate Limiting Reached, Please try after some time";

/// Admission filter middleware factory.
pub struct AdmissionFilter {
    engine: Arc<DecisionEngine>,
}

impl AdmissionFilter {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self { engine }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionFilterService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionFilterService {
            service: Rc::new(service),
            engine: self.engine.clone(),
        }))
    }
}

pub struct AdmissionFilterService<S> {
    // Rc so the inner service can be called from the boxed future after the
    // async admission check resolves.
    service: Rc<S>,
    engine: Arc<DecisionEngine>,
}

impl<S, B> Service<ServiceRequest> for AdmissionFilterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let engine = self.engine.clone();

        // The request is only read here, never mutated.
        let real_ip = header_value(&req, REAL_IP_HEADER);
        let forwarded_for = header_value(&req, FORWARDED_FOR_HEADER);
        let remote_addr = req
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let identity =
            extract_identity(real_ip.as_deref(), forwarded_for.as_deref(), &remote_addr);

        Box::pin(async move {
            let decision = engine.decide(&identity).await;

            if decision.fallback {
                tracing::warn!(client = %identity, "counter store unavailable, fallback verdict applied");
            }

            match decision.verdict {
                Verdict::Reject(reason) => {
                    tracing::warn!(
                        client = %identity,
                        count = ?decision.count,
                        ?reason,
                        "request rejected"
                    );

                    let response = rejection_response(reason, &decision);
                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                Verdict::Admit => {
                    tracing::debug!(client = %identity, count = ?decision.count, "request admitted");

                    let res = service.call(req).await?;

                    // Post-admission hook.
                    tracing::trace!(client = %identity, "downstream handler completed");
                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}

fn header_value(req: &ServiceRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn rejection_response(reason: RejectReason, decision: &Decision) -> HttpResponse {
    match reason {
        RejectReason::ThresholdExceeded => HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", decision.retry_after.as_secs().to_string()))
            .json(ErrorResponse::too_many_requests(REJECTION_MESSAGE)),
        RejectReason::StoreUnavailable => HttpResponse::ServiceUnavailable().json(
            ErrorResponse::service_unavailable("Admission check unavailable, please retry"),
        ),
    }
}
