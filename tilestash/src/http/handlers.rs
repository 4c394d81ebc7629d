//! Tileset HTTP handlers.

use super::upload::receive_upload;
use super::{ApiError, AppState};
use crate::archive::ArchiveInfo;
use crate::coord::tile_from_segments;
use crate::import::{ImportRequest, ImportStats};
use crate::tileset::{Tileset, TilesetKey, TilesetPatch};
use axum::body::Body;
use axum::extract::{Multipart, OriginalUri, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

const DEFAULT_TILE_FORMAT: &str = "png";

/// Body of `PATCH /{owner}/tilesets/{id}`. Other fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TilesetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub imports: ImportStats,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        imports: state.orchestrator.registry().stats(),
    })
}

#[instrument(skip(state))]
pub async fn list_tilesets(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<Tileset>>, ApiError> {
    let tilesets = state.orchestrator.store().list(&owner).await?;
    Ok(Json(tilesets))
}

#[instrument(skip(state, uri, headers))]
pub async fn get_tileset(
    State(state): State<AppState>,
    Path((owner, tileset_id)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let key = TilesetKey::new(owner, tileset_id);
    let tileset = find_tileset(&state, &key).await?;

    let info = match state.orchestrator.catalog().info(&key).await {
        Ok(info) => info,
        Err(e) if e.is_not_found() => {
            debug!(tileset = %key, "No archive yet; returning record only");
            return Ok(Json(record_json(&tileset)?));
        }
        Err(e) => return Err(e.into()),
    };

    let template = tile_url_template(&headers, uri.path(), info.format.as_deref());
    Ok(Json(merge_info(info, template, &tileset)?))
}

pub async fn create_tileset(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    multipart: Multipart,
) -> Result<Json<Tileset>, ApiError> {
    import(state, owner, None, multipart).await
}

pub async fn replace_tileset(
    State(state): State<AppState>,
    Path((owner, tileset_id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Json<Tileset>, ApiError> {
    import(state, owner, Some(tileset_id), multipart).await
}

async fn import(
    state: AppState,
    owner: String,
    tileset_id: Option<String>,
    mut multipart: Multipart,
) -> Result<Json<Tileset>, ApiError> {
    let upload = receive_upload(&mut multipart, state.upload_dir()).await?;
    let ticket = state
        .orchestrator
        .submit(ImportRequest::new(owner, tileset_id, upload))
        .await?;

    info!(
        tileset = %ticket.tileset.key(),
        import_id = %ticket.import_id,
        "Upload accepted"
    );
    // The conversion keeps running after the ticket is dropped.
    Ok(Json(ticket.tileset))
}

#[instrument(skip(state, update))]
pub async fn update_tileset(
    State(state): State<AppState>,
    Path((owner, tileset_id)): Path<(String, String)>,
    Json(update): Json<TilesetUpdate>,
) -> Result<Json<Tileset>, ApiError> {
    let key = TilesetKey::new(owner, tileset_id);
    let patch = TilesetPatch::metadata(update.name, update.description);
    if patch.is_empty() {
        return Ok(Json(find_tileset(&state, &key).await?));
    }
    let tileset = state.orchestrator.store().update(&key, patch).await?;
    Ok(Json(tileset))
}

#[instrument(skip(state))]
pub async fn delete_tileset(
    State(state): State<AppState>,
    Path((owner, tileset_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = TilesetKey::new(owner, tileset_id);
    state.orchestrator.store().remove(&key).await?;
    let removed = state.orchestrator.catalog().remove(&key).await?;

    info!(tileset = %key, archive_removed = removed, "Tileset deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_tile(
    State(state): State<AppState>,
    Path((owner, tileset_id, z, x, y)): Path<(String, String, String, String, String)>,
) -> Result<Response, ApiError> {
    let key = TilesetKey::new(owner, tileset_id);
    let coord = tile_from_segments(&z, &x, &y);
    find_tileset(&state, &key).await?;

    let tile = state.orchestrator.catalog().get_tile(&key, coord).await?;
    let mut response = Response::builder().status(StatusCode::OK);
    for (name, value) in &tile.headers {
        response = response.header(*name, value.as_str());
    }
    response
        .header(header::CONTENT_LENGTH, tile.data.len())
        .body(Body::from(tile.data))
        .map_err(|e| ApiError::internal(format!("failed to build tile response: {}", e)))
}

async fn find_tileset(state: &AppState, key: &TilesetKey) -> Result<Tileset, ApiError> {
    state
        .orchestrator
        .store()
        .find(key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tileset {} not found", key)))
}

/// `<scheme>://<host><path>/{z}/{x}/{y}.<format>` as seen by the client.
pub(crate) fn tile_url_template(headers: &HeaderMap, path: &str, format: Option<&str>) -> String {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("x-forwarded-host")
        .or_else(|| header_str(header::HOST.as_str()))
        .unwrap_or("localhost");
    let format = format.unwrap_or(DEFAULT_TILE_FORMAT);

    format!(
        "{}://{}{}/{{z}}/{{x}}/{{y}}.{}",
        scheme,
        host,
        path.trim_end_matches('/'),
        format
    )
}

fn record_json(tileset: &Tileset) -> Result<Value, ApiError> {
    serde_json::to_value(tileset)
        .map_err(|e| ApiError::internal(format!("failed to encode tileset: {}", e)))
}

/// Archive info, tile URLs and the record, with record fields taking priority.
fn merge_info(info: ArchiveInfo, template: String, tileset: &Tileset) -> Result<Value, ApiError> {
    let mut merged = match serde_json::to_value(info) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    merged.insert("tiles".to_string(), Value::Array(vec![Value::String(template)]));
    merged.insert("scheme".to_string(), Value::String("xyz".to_string()));
    if let Value::Object(record) = record_json(tileset)? {
        merged.extend(record);
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_tile_url_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("tiles.example.com:8080"));

        let url = tile_url_template(&headers, "/acme/tilesets/roads", Some("pbf"));
        assert_eq!(
            url,
            "http://tiles.example.com:8080/acme/tilesets/roads/{z}/{x}/{y}.pbf"
        );
    }

    #[test]
    fn test_tile_url_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:3000"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("maps.example.com"));

        let url = tile_url_template(&headers, "/acme/tilesets/roads/", None);
        assert_eq!(url, "https://maps.example.com/acme/tilesets/roads/{z}/{x}/{y}.png");
    }

    #[test]
    fn test_record_fields_override_archive_info() {
        let info = ArchiveInfo {
            name: Some("From archive".to_string()),
            format: Some("png".to_string()),
            maxzoom: Some(14),
            ..ArchiveInfo::default()
        };
        let mut tileset = Tileset::with_id("acme", "roads");
        tileset.name = Some("From record".to_string());

        let merged = merge_info(info, "http://h/t/{z}/{x}/{y}.png".to_string(), &tileset).unwrap();
        assert_eq!(merged["name"], "From record");
        assert_eq!(merged["maxzoom"], 14);
        assert_eq!(merged["scheme"], "xyz");
        assert_eq!(merged["tilesetId"], "roads");
        assert_eq!(merged["tiles"][0], "http://h/t/{z}/{x}/{y}.png");
    }
}
