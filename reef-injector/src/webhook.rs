use std::fs::File;
use std::io::BufReader;
use std::str::from_utf8;

use http::{Method, StatusCode};
use hyper::body::Bytes;
use hyper::{Body, Request, Response};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::response::Status;
use kube::core::DynamicObject;
use log::{debug, error, info, warn};
use reef_common::constants::{
    INACCEL_CERT_FILE, INACCEL_CERT_FILE_ENV, INACCEL_KEY_FILE, INACCEL_KEY_FILE_ENV,
};
use reef_common::errors::ReefServiceError;
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, rsa_private_keys};

use crate::errors::ReefPatchError;
use crate::jsonpatch::diff;
use crate::mutate::mutate;

macro_rules! admission_request {
    ($body:ident, $typ:tt) => {{
        let admission_review: AdmissionReview<$typ> = serde_json::from_str(&$body)
            .map_err(ReefServiceError::from_error(&format!(
                "Unable to parse AdmissionReview<{}>",
                stringify!($typ)
            )))
            .map_err(ReefPatchError::BadRequest)?;
        let admission_request: AdmissionRequest<$typ> = admission_review
            .try_into()
            .map_err(ReefServiceError::from_error(&format!(
                "Unable to parse AdmissionReview<{}>",
                stringify!($typ)
            )))
            .map_err(ReefPatchError::BadRequest)?;
        admission_request
    }};
}

macro_rules! admission_response {
    ($body:ident, $response:ident => $expr:expr) => {{
        let admission_review = $response.into_review();
        let body = serde_json::to_string(&admission_review);
        let r: Result<Response<Body>, hyper::Error> = match body {
            // The engine output survived mutation but not encoding; that is an
            // internal defect, not a policy outcome.
            Err(e) => Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from(e.to_string()))
                .unwrap()),
            Ok($body) => Ok($expr),
        };
        r
    }};
}

pub enum ReefAdmissionResponse {
    Allow(Box<AdmissionResponse>),
    Deny(Box<AdmissionResponse>),
}

fn patch_pod(
    admission_request: AdmissionRequest<Pod>,
) -> Result<ReefAdmissionResponse, ReefPatchError> {
    let admission_response = Box::new(AdmissionResponse::from(&admission_request));
    let pod = admission_request.object.as_ref().ok_or_else(|| {
        ReefPatchError::BadRequest(ReefServiceError::from(
            "Unable to get Pod from admission request",
        ))
    })?;
    match mutate(pod) {
        Err(e) => {
            let mut status: Status = Default::default();
            status.message = e.to_string();
            let mut admission_response = *admission_response;
            admission_response.allowed = false;
            admission_response.result = status;
            Ok(ReefAdmissionResponse::Deny(Box::new(admission_response)))
        }
        Ok(mutated) => {
            let patch = diff(pod, &mutated).map_err(ReefPatchError::Internal)?;
            let admission_response = admission_response
                .with_patch(patch)
                .map_err(ReefServiceError::from_error("Unable to serialize JSONPatch"))
                .map_err(ReefPatchError::Internal)?;
            Ok(ReefAdmissionResponse::Allow(Box::new(admission_response)))
        }
    }
}

async fn mutate_review(body: Bytes) -> Result<ReefAdmissionResponse, ReefPatchError> {
    let body = from_utf8(&body)
        .map(|s| s.to_string())
        .map_err(ReefServiceError::from_error("Unable to parse request body"))
        .map_err(ReefPatchError::BadRequest)?;
    debug!("Admission review request: {}", body);
    let admission_review = serde_json::from_str::<AdmissionReview<DynamicObject>>(&body)
        .map_err(ReefServiceError::from_error(
            "Unable to parse AdmissionReview<DynamicObject>",
        ))
        .map_err(ReefPatchError::BadRequest)?;
    match admission_review
        .request
        .as_ref()
        .map(|r| r.resource.resource.as_str())
    {
        Some("pods") => {
            let admission_request = admission_request!(body, Pod);
            patch_pod(admission_request)
        }
        Some(s) => Err(ReefPatchError::BadRequest(ReefServiceError::from_string(
            format!("Unsupported resource to mutate: {}", s),
        ))),
        None => Err(ReefPatchError::BadRequest(ReefServiceError::from(
            "No request found in AdmissionReview",
        ))),
    }
}

pub fn load_ssl() -> Result<ServerConfig, ReefServiceError> {
    let cert_file =
        std::env::var(INACCEL_CERT_FILE_ENV).unwrap_or_else(|_| INACCEL_CERT_FILE.to_string());
    let key_file =
        std::env::var(INACCEL_KEY_FILE_ENV).unwrap_or_else(|_| INACCEL_KEY_FILE.to_string());

    let mut cert_reader = BufReader::new(
        File::open(cert_file).map_err(|e| format!("Unable to open cert file: {}", e))?,
    );
    let mut key_reader = BufReader::new(
        File::open(key_file).map_err(|e| format!("Unable to open key file: {}", e))?,
    );

    let raw_certs =
        certs(&mut cert_reader).map_err(|e| format!("Unable to load certificates: {}", e))?;
    let certs: Vec<Certificate> = raw_certs.into_iter().map(Certificate).collect();
    let raw_keys =
        rsa_private_keys(&mut key_reader).map_err(|e| format!("Unable to load keys: {}", e))?;
    let keys: Vec<PrivateKey> = raw_keys.into_iter().map(PrivateKey).collect();
    if keys.is_empty() {
        return Err(ReefServiceError::from("No private keys found in key file"));
    }

    Ok(ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, keys[0].clone())
        .map_err(|e| format!("Unable to create ServerConfig with TLS certificate: {}", e))?)
}

pub async fn injector_handler(req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/mutate") => {
            let bs = hyper::body::to_bytes(req).await?;
            match mutate_review(bs).await {
                Ok(ReefAdmissionResponse::Allow(mut response)) => {
                    info!(
                        "Pod mutated with a JSON patch of {} bytes",
                        response.patch.as_ref().map(|xs| xs.len()).unwrap_or(0)
                    );
                    let mut status: Status = Default::default();
                    status.code = 200;
                    response.allowed = true;
                    response.result = status;
                    admission_response!(body, response => Response::new(Body::from(body)))
                }
                // Policy denial is a well-formed admission response, not an
                // HTTP error; the cluster rejects the object on our behalf.
                Ok(ReefAdmissionResponse::Deny(response)) => {
                    warn!("Pod admission denied: {}", response.result.message);
                    admission_response!(body, response => Response::new(Body::from(body)))
                }
                Err(ReefPatchError::BadRequest(e)) => {
                    error!("Unable to decode admission request: {}", e);
                    Ok(Response::builder()
                        .status(StatusCode::BAD_REQUEST)
                        .body(Body::from(e.to_string()))
                        .unwrap())
                }
                Err(ReefPatchError::Internal(e)) => {
                    error!("Unable to compute Pod patch: {}", e);
                    Ok(Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::from(e.to_string()))
                        .unwrap())
                }
            }
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const UID: &str = "705ab4f5-6393-11e8-b7cc-42010a800002";

    fn admission_review_body(resource: &str, object: Value) -> String {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": UID,
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": resource},
                "operation": "CREATE",
                "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
                "object": object
            }
        })
        .to_string()
    }

    fn mutate_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/mutate")
            .body(Body::from(body))
            .unwrap()
    }

    async fn admission_response_of(response: Response<Body>) -> AdmissionResponse {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let review: AdmissionReview<DynamicObject> = serde_json::from_slice(&bytes).unwrap();
        assert!(review.request.is_none(), "request must not be echoed back");
        review.response.expect("no response in review")
    }

    fn pod_object() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "pod0",
                "annotations": {"inaccel/xilinx.com-fpga": "echo 1\necho 2"},
                "labels": {"inaccel/fpga.count": "2"}
            },
            "spec": {
                "containers": [{"name": "app", "image": "app:latest"}]
            }
        })
    }

    #[tokio::test]
    async fn test_mutate_allows_pod_with_patch() {
        let object = pod_object();
        let response = injector_handler(mutate_request(admission_review_body("pods", object.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let admission_response = admission_response_of(response).await;
        assert_eq!(admission_response.uid, UID);
        assert!(admission_response.allowed);

        // Applying the returned patch to the admitted object must produce
        // exactly the mutated Pod.
        let patch_bytes = admission_response.patch.expect("no patch in response");
        let patch: json_patch::Patch = serde_json::from_slice(&patch_bytes).unwrap();
        assert!(!patch.0.is_empty());
        let mut document = object.clone();
        json_patch::patch(&mut document, &patch.0).expect("patch did not apply");

        let before: Pod = serde_json::from_value(object).unwrap();
        let expected = mutate(&before).unwrap();
        let patched: Pod = serde_json::from_value(document).unwrap();
        assert_eq!(patched, expected);
        assert_eq!(
            patched
                .spec
                .as_ref()
                .and_then(|s| s.init_containers.as_ref())
                .map(|cs| cs.iter().map(|c| c.name.clone()).collect::<Vec<_>>()),
            Some(vec![
                "xilinx-com-fpga-0".to_string(),
                "xilinx-com-fpga-1".to_string()
            ])
        );
    }

    #[tokio::test]
    async fn test_pod_without_spec_is_denied() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "pod0"}
        });
        let response = injector_handler(mutate_request(admission_review_body("pods", object)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let admission_response = admission_response_of(response).await;
        assert_eq!(admission_response.uid, UID);
        assert!(!admission_response.allowed);
        assert!(admission_response.patch.is_none());
        assert!(!admission_response.result.message.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_client_error() {
        let response = injector_handler(mutate_request("not an admission review".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_resource_is_a_client_error() {
        let response = injector_handler(mutate_request(admission_review_body(
            "deployments",
            pod_object(),
        )))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let request = Request::builder()
            .method("GET")
            .uri("/mutate")
            .body(Body::empty())
            .unwrap();
        let response = injector_handler(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
