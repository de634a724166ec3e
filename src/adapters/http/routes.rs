use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{debug, warn};

use crate::adapters::http::{error::ApiError, state::HttpState};
use crate::application::dto::{HealthResponse, PredictResponse};
use crate::domain::errors::DomainError;

/// Campo multipart que transporta la imagen.
pub const IMAGE_FIELD: &str = "image";
pub const STATIC_PREFIX: &str = "/static";

pub fn image_url(filename: &str) -> String {
    format!("{STATIC_PREFIX}/{filename}")
}

/// POST /predict
///
/// El estado del modelo se comprueba antes de leer el cuerpo, así que un
/// cuerpo inválido contra un modelo ausente sigue respondiendo 500.
pub async fn predict(
    State(st): State<HttpState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    st.detection.ensure_ready()?;

    let mut multipart = multipart.map_err(|e| {
        warn!("Cuerpo multipart rechazado: {}", e);
        DomainError::MissingInput
    })?;

    let image_bytes = read_image_field(&mut multipart).await?;
    debug!("Imagen recibida: {} bytes", image_bytes.len());

    let prediction = st.detection.predict(image_bytes).await?;
    let url = image_url(&prediction.output_filename);

    Ok(Json(PredictResponse::new(prediction.detections, url)))
}

/// Devuelve el primer campo de fichero llamado `image`. Un campo de texto con
/// ese nombre no cuenta como imagen.
async fn read_image_field(multipart: &mut Multipart) -> Result<Vec<u8>, DomainError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if field.file_name().is_none() {
            debug!("Campo '{}' sin nombre de fichero, se ignora", IMAGE_FIELD);
            continue;
        }
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(data.to_vec());
    }
    Err(DomainError::MissingInput)
}

fn multipart_error(e: MultipartError) -> DomainError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Subida por encima del límite: {}", e);
        DomainError::PayloadTooLarge(e.body_text())
    } else {
        warn!("Error leyendo multipart: {}", e);
        DomainError::MissingInput
    }
}

/// GET /static/:filename
///
/// El nombre se usa sin sanear (ver DESIGN.md).
pub async fn serve_image(
    State(st): State<HttpState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = st.detection.read_output(&filename).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

/// GET /health
pub async fn health(State(st): State<HttpState>) -> impl IntoResponse {
    match st.detection.health() {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::ok())),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(HealthResponse::error(e.to_string()))),
    }
}
