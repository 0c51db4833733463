/// HTTP resolution server
///
/// Request lifecycle for the identifiers route: parse the DID, race a cache
/// lookup against the request timer, then race the method driver against a
/// fresh timer. A driver call that loses the race keeps running in the
/// background so its result still warms the cache; only the response is
/// abandoned. Near-expired cache hits trigger a background refresh guarded
/// by a per-identifier lock.
use crate::{
    cache::entry::now_millis,
    context::AppContext,
    did::Did,
    document::{DidDocument, Proof, PublicKeyEntry, ED25519_VERIFICATION_KEY_2018},
    drivers::Driver,
    error::{ResolverError, ResolverResult},
    response::ResolutionResponse,
};
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use ed25519_dalek::Signer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

/// Fixed cache key for the node's own well-known document
const WELL_KNOWN_KEY: &str = "well-known/did.json";

/// Build the application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]);

    Router::new()
        .route("/1.0/identifiers/:did", get(resolve_identifier))
        .route("/.well-known/did.json", get(well_known_document))
        .route("/", get(health_check))
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // unmatched paths and non-GET methods alike are 404
        .layer(axum::middleware::map_response(flatten_method_mismatch))
        .fallback(not_found)
}

async fn flatten_method_mismatch(response: Response) -> Response {
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        return not_found().await.into_response();
    }
    response
}

/// Health check: 200, empty body
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// 404 handler
async fn not_found() -> Response {
    ResolverError::NotFound("no matching route".to_string()).into_response()
}

/// `GET /1.0/identifiers/:did`
async fn resolve_identifier(
    State(ctx): State<AppContext>,
    Path(raw): Path<String>,
) -> Response {
    let did = match Did::parse(&raw) {
        Ok(did) => did,
        Err(err) => return err.into_response(),
    };

    let Some(driver) = ctx.drivers.get(&did.method) else {
        return ResolverError::MethodNotImplemented(did.method).into_response();
    };

    let driver_id = format!("did:{}", did.method);
    let timeout = Duration::from_millis(ctx.config.server.timeout);

    // cache phase, racing the request timer
    let start = Instant::now();
    match tokio::time::timeout(timeout, ctx.cache.get(&did.identifier)).await {
        Ok(Ok(Some(hit))) => {
            maybe_refresh(&ctx, &did, Arc::clone(&driver), hit.ttl).await;
            let envelope = ResolutionResponse::assemble(hit.document, did, start, &driver_id);
            return (StatusCode::OK, Json(envelope)).into_response();
        }
        Ok(Ok(None)) => {}
        Ok(Err(err)) => debug!(%err, "cache lookup failed"),
        Err(_) => return ResolverError::RequestTimeout.into_response(),
    }

    // driver phase, fresh timer; the spawned call outlives a timeout so a
    // late result still warms the cache
    let start = Instant::now();
    let (tx, rx) = oneshot::channel();
    {
        let ctx = ctx.clone();
        let did = did.clone();
        tokio::spawn(async move {
            let result = driver.resolve(&did).await;
            let document = match &result {
                Ok(Some(document)) => Some(document.clone()),
                _ => None,
            };

            let _ = tx.send(result);

            if let Some(document) = document {
                warm_cache(&ctx, &did.identifier, &document).await;
            }
        });
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(Some(document)))) => {
            let document = match serde_json::to_value(&document) {
                Ok(value) => value,
                Err(err) => return ResolverError::from(err).into_response(),
            };
            let envelope = ResolutionResponse::assemble(document, did, start, &driver_id);
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Ok(Ok(Ok(None))) => ResolverError::NotFound(did.reference).into_response(),
        Ok(Ok(Err(err))) => {
            warn!(did = %did, %err, "driver resolution failed");
            err.into_response()
        }
        Ok(Err(_)) => ResolverError::Internal("driver task dropped".to_string()).into_response(),
        Err(_) => ResolverError::RequestTimeout.into_response(),
    }
}

/// Write a resolved document into the cache; failures are logged, never
/// surfaced to the client
async fn warm_cache(ctx: &AppContext, identifier: &str, document: &DidDocument) {
    let value = match serde_json::to_value(document) {
        Ok(value) => value,
        Err(err) => {
            warn!(identifier, %err, "failed to encode document for cache");
            return;
        }
    };
    if let Err(err) = ctx.cache.put(identifier, &value).await {
        warn!(identifier, %err, "failed to warm cache");
    }
}

/// Spawn a background refresh when the entry's remaining lifetime has
/// fallen below half the configured TTL and no refresh is already in
/// flight for this identifier. Never blocks the current response.
async fn maybe_refresh(ctx: &AppContext, did: &Did, driver: Arc<dyn Driver>, ttl: u64) {
    let remaining = ttl.saturating_sub(now_millis());
    if remaining >= ctx.config.cache.ttl / 2 {
        return;
    }

    if !ctx.begin_refresh(&did.identifier).await {
        return;
    }

    let ctx = ctx.clone();
    let did = did.clone();
    tokio::spawn(async move {
        debug!(did = %did, "preemptive refresh started");
        match driver.resolve(&did).await {
            Ok(Some(document)) => warm_cache(&ctx, &did.identifier, &document).await,
            Ok(None) => debug!(did = %did, "preemptive refresh found nothing"),
            Err(err) => warn!(did = %did, %err, "preemptive refresh failed"),
        }
        ctx.end_refresh(&did.identifier).await;
    });
}

/// `GET /.well-known/did.json`: a self-signed document for the node's own
/// identity, cached under a fixed key until expiry
async fn well_known_document(State(ctx): State<AppContext>) -> Response {
    match ctx.cache.get(WELL_KNOWN_KEY).await {
        Ok(Some(hit)) => return (StatusCode::OK, Json(hit.document)).into_response(),
        Ok(None) => {}
        Err(err) => debug!(%err, "well-known cache lookup failed"),
    }

    let Some(identity) = &ctx.identity else {
        return ResolverError::MethodNotImplemented("well-known document".to_string())
            .into_response();
    };

    let document = match self_signed_document(identity) {
        Ok(document) => document,
        Err(err) => return err.into_response(),
    };

    let value = match serde_json::to_value(&document) {
        Ok(value) => value,
        Err(err) => return ResolverError::from(err).into_response(),
    };

    if let Err(err) = ctx.cache.put(WELL_KNOWN_KEY, &value).await {
        warn!(%err, "failed to cache well-known document");
    }

    (StatusCode::OK, Json(value)).into_response()
}

/// Synthesize and sign a document describing the node's own identity
fn self_signed_document(identity: &crate::identity::Identity) -> ResolverResult<DidDocument> {
    let id = identity.did.did();
    let owner_key = format!("{}#owner", id);

    let mut document = DidDocument {
        context: Some(serde_json::json!("https://w3id.org/did/v1")),
        id: id.clone(),
        public_key: vec![PublicKeyEntry {
            id: owner_key.clone(),
            key_type: ED25519_VERIFICATION_KEY_2018.to_string(),
            controller: None,
            owner: Some(id),
            public_key_hex: Some(identity.identifier.clone()),
        }],
        authentication: vec![serde_json::json!({
            "type": "Ed25519SignatureAuthentication2018",
            "publicKey": owner_key,
        })],
        proof: None,
    };

    let digest = document.digest()?;
    let signature = identity.signing_key()?.sign(&digest);

    document.proof = Some(Proof {
        proof_type: ED25519_VERIFICATION_KEY_2018.to_string(),
        creator: owner_key,
        signature_value: hex::encode(signature.to_bytes()),
        nonce: Some(hex::encode(rand::random::<[u8; 16]>())),
        created: Some(chrono::Utc::now().to_rfc3339()),
        domain: None,
    });

    Ok(document)
}

/// Bind the listener, retrying on an ephemeral port when the configured
/// port is in use
pub async fn bind(address: &str, port: u16) -> ResolverResult<TcpListener> {
    match TcpListener::bind((address, port)).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            warn!(port, "port in use, retrying on an ephemeral port");
            Ok(TcpListener::bind((address, 0)).await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Serve the router on a bound listener
pub async fn serve(listener: TcpListener, ctx: AppContext) -> ResolverResult<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "resolver listening");

    let app = build_router(ctx);
    axum::serve(listener, app)
        .await
        .map_err(|e| ResolverError::Internal(format!("server error: {}", e)))?;

    Ok(())
}
