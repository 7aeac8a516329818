// Relais CORS: le navigateur appelle /proxy/..., le serveur relaie vers PROXY_UPSTREAM_URL.
// Les en-têtes CORS sont posés par le middleware global, pas ici.

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};

use crate::config::Config;
use crate::errors::AppError;

// En-têtes propres à une connexion: jamais relayés
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_forwardable(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    !HOP_BY_HOP.contains(&name.as_str()) && name != "content-length" && !name.starts_with("access-control-")
}

/// ANY /proxy/{tail} - Relaie la requête telle quelle vers l'upstream
pub async fn forward(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    config: web::Data<Config>,
    http: web::Data<reqwest::Client>,
) -> Result<HttpResponse, AppError> {
    let Some(upstream) = config.proxy_upstream_url.as_deref() else {
        return Err(AppError::NotFound("Proxy is not enabled".to_string()));
    };

    let mut url = format!("{}/{}", upstream, path.into_inner().trim_start_matches('/'));
    if !req.query_string().is_empty() {
        url.push('?');
        url.push_str(req.query_string());
    }

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| AppError::Validation("Unsupported HTTP method".to_string()))?;

    let mut outbound = http.request(method, &url);
    for (name, value) in req.headers() {
        if is_forwardable(name.as_str()) {
            outbound = outbound.header(name.as_str(), value.as_bytes());
        }
    }
    if !body.is_empty() {
        outbound = outbound.body(body.to_vec());
    }

    let upstream_response = outbound.send().await.map_err(|e| {
        tracing::warn!(url = %url, error = %e, "proxy upstream request failed");
        AppError::BadGateway("Upstream request failed".to_string())
    })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .map_err(|_| AppError::BadGateway("Upstream returned an invalid status".to_string()))?;

    let mut response = HttpResponse::build(status);
    for (name, value) in upstream_response.headers() {
        if is_forwardable(name.as_str()) {
            response.append_header((name.as_str(), value.as_bytes()));
        }
    }

    let bytes = upstream_response.bytes().await.map_err(|e| {
        tracing::warn!(url = %url, error = %e, "proxy upstream body failed");
        AppError::BadGateway("Upstream response could not be read".to_string())
    })?;

    tracing::debug!(url = %url, status = status.as_u16(), "proxied request");
    Ok(response.body(bytes.to_vec()))
}

pub fn proxy_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/proxy/{tail:.*}", web::route().to(forward));
}
