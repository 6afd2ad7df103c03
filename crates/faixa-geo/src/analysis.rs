//! Standalone analyses over request payloads
//!
//! Payloads are validated before any geometry work: every collection must be
//! a GeoJSON `FeatureCollection` with a `features` array.

use faixa_core::{FaixaError, Result};
use geojson::{Feature, FeatureCollection};
use serde::Serialize;
use serde_json::Value;

use crate::models::feature_collection;
use crate::spatial::{intersect, risk_bands, within_distance, FloodRiskReport};

/// Smallest proximity buffer accepted, in meters
pub const MIN_BUFFER_M: f64 = 1.0;

fn collection(payload: &Value, key: &str, required: bool) -> Result<FeatureCollection> {
    match payload.get(key) {
        None | Some(Value::Null) if !required => Ok(feature_collection(Vec::new())),
        None | Some(Value::Null) => Err(FaixaError::invalid_parameter(key, "missing FeatureCollection")),
        Some(value) => {
            let is_collection = value.get("type").and_then(Value::as_str) == Some("FeatureCollection")
                && value.get("features").is_some_and(Value::is_array);
            if !is_collection {
                return Err(FaixaError::invalid_parameter(key, "expected a GeoJSON FeatureCollection"));
            }
            serde_json::from_value(value.clone())
                .map_err(|e| FaixaError::invalid_parameter(key, format!("invalid FeatureCollection: {}", e)))
        }
    }
}

fn object(payload: &Value) -> Result<&serde_json::Map<String, Value>> {
    payload
        .as_object()
        .ok_or_else(|| FaixaError::invalid_parameter("payload", "expected a JSON object"))
}

/// Crossing analysis request
#[derive(Debug, Clone)]
pub struct CrossingRequest {
    pub travessias: FeatureCollection,
    pub linhas_transmissao: FeatureCollection,
    pub circuitos_mt: FeatureCollection,
    pub buffer_m: Option<f64>,
}

impl CrossingRequest {
    /// Validate a crossing payload. `travessias` is required; the two line
    /// layers default to empty collections.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        object(payload)?;

        let buffer_m = match payload.get("buffer_m") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => Some(
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| FaixaError::invalid_parameter("buffer_m", format!("not a number: {}", s)))?,
            ),
            Some(other) => {
                return Err(FaixaError::invalid_parameter("buffer_m", format!("not a number: {}", other)))
            }
        };

        Ok(Self {
            travessias: collection(payload, "travessias", true)?,
            linhas_transmissao: collection(payload, "linhas_transmissao", false)?,
            circuitos_mt: collection(payload, "circuitos_mt", false)?,
            buffer_m,
        })
    }
}

/// Crossing statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossingStats {
    pub total_travessias: usize,
    pub cruzamentos_transmissao: usize,
    pub cruzamentos_mt: usize,
    pub proximas_transmissao: usize,
    pub proximas_mt: usize,
    pub buffer_m: f64,
}

/// Crossing analysis result
#[derive(Debug, Clone, Serialize)]
pub struct CrossingReport {
    pub cruzamentos_transmissao: FeatureCollection,
    pub cruzamentos_mt: FeatureCollection,
    pub proximas_transmissao: FeatureCollection,
    pub proximas_mt: FeatureCollection,
    /// Every result feature tagged with its `categoria`
    pub features: FeatureCollection,
    pub estatisticas: CrossingStats,
}

/// Resolve the proximity buffer: absent takes the default, invalid is rejected,
/// anything below one meter is raised to one meter
pub fn effective_buffer(requested: Option<f64>, default_m: f64) -> Result<f64> {
    match requested {
        None => Ok(default_m.max(MIN_BUFFER_M)),
        Some(m) if !m.is_finite() || m <= 0.0 => {
            Err(FaixaError::invalid_parameter("buffer_m", format!("must be a positive number of meters, got {}", m)))
        }
        Some(m) => Ok(m.max(MIN_BUFFER_M)),
    }
}

fn tagged<'a>(collection: &'a FeatureCollection, categoria: &str) -> impl Iterator<Item = Feature> + 'a {
    let categoria = categoria.to_string();
    collection.features.iter().cloned().map(move |mut feature| {
        feature
            .properties
            .get_or_insert_with(Default::default)
            .insert("categoria".to_string(), Value::String(categoria.clone()));
        feature
    })
}

/// Detect crossings of and proximity to transmission and MT lines
pub fn analyze_crossings(request: &CrossingRequest, default_buffer_m: f64) -> Result<CrossingReport> {
    let buffer_m = effective_buffer(request.buffer_m, default_buffer_m)?;

    let cruzamentos_transmissao = intersect(Some(&request.travessias), Some(&request.linhas_transmissao));
    let cruzamentos_mt = intersect(Some(&request.travessias), Some(&request.circuitos_mt));
    let proximas_transmissao =
        within_distance(Some(&request.travessias), Some(&request.linhas_transmissao), buffer_m);
    let proximas_mt = within_distance(Some(&request.travessias), Some(&request.circuitos_mt), buffer_m);

    let estatisticas = CrossingStats {
        total_travessias: request.travessias.features.len(),
        cruzamentos_transmissao: cruzamentos_transmissao.features.len(),
        cruzamentos_mt: cruzamentos_mt.features.len(),
        proximas_transmissao: proximas_transmissao.features.len(),
        proximas_mt: proximas_mt.features.len(),
        buffer_m,
    };

    let features = feature_collection(
        tagged(&cruzamentos_transmissao, "cruzamento_transmissao")
            .chain(tagged(&cruzamentos_mt, "cruzamento_mt"))
            .chain(tagged(&proximas_transmissao, "proxima_transmissao"))
            .chain(tagged(&proximas_mt, "proxima_mt"))
            .collect(),
    );

    tracing::debug!(?estatisticas, "Crossing analysis finished");

    Ok(CrossingReport {
        cruzamentos_transmissao,
        cruzamentos_mt,
        proximas_transmissao,
        proximas_mt,
        features,
        estatisticas,
    })
}

/// Flood-proximity request
#[derive(Debug, Clone)]
pub struct FloodRequest {
    pub areas_alagadas: FeatureCollection,
    pub estruturas: FeatureCollection,
    /// Radii as given; `None` when the payload has no `raios`
    pub raios: Option<Vec<f64>>,
    pub atributo_protecao: Option<String>,
}

impl FloodRequest {
    /// Validate a flood payload. Radius entries that are not numbers (or
    /// numeric text) are dropped here; filtering of non-positive values
    /// happens in the banding itself.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        object(payload)?;

        let raios = match payload.get("raios") {
            None | Some(Value::Null) => None,
            Some(Value::Array(values)) => Some(
                values
                    .iter()
                    .filter_map(|v| match v {
                        Value::Number(n) => n.as_f64(),
                        Value::String(s) => s.trim().parse::<f64>().ok(),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(_) => return Err(FaixaError::invalid_parameter("raios", "expected an array of numbers")),
        };

        let atributo_protecao = payload
            .get("atributo_protecao")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            areas_alagadas: collection(payload, "areas_alagadas", true)?,
            estruturas: collection(payload, "estruturas", true)?,
            raios,
            atributo_protecao,
        })
    }
}

/// Band structures by distance to flooded areas.
///
/// Falls back to `default_radii` when the request carries none and to
/// `default_attribute` when it names no protection attribute.
pub fn analyze_flood(request: &FloodRequest, default_radii: &[f64], default_attribute: &str) -> Result<FloodRiskReport> {
    let radii = request.raios.as_deref().unwrap_or(default_radii);
    let attribute = request.atributo_protecao.as_deref().unwrap_or(default_attribute);
    risk_bands(radii, &request.areas_alagadas, &request.estruturas, attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crossing_payload(buffer: Value) -> Value {
        json!({
            "travessias": {
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"nome": "BR-040"},
                     "geometry": {"type": "LineString", "coordinates": [[-47.895, -15.81], [-47.895, -15.79]]}},
                    {"type": "Feature", "properties": {"nome": "poste"},
                     "geometry": {"type": "Point", "coordinates": [-47.8950, -15.80015]}}
                ]
            },
            "linhas_transmissao": {
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"codigo": "LT-1"},
                     "geometry": {"type": "LineString", "coordinates": [[-47.90, -15.80], [-47.89, -15.80]]}}
                ]
            },
            "buffer_m": buffer
        })
    }

    #[test]
    fn test_crossing_analysis_counts() {
        let request = CrossingRequest::from_payload(&crossing_payload(json!(null))).unwrap();
        let report = analyze_crossings(&request, 50.0).unwrap();

        assert_eq!(
            report.estatisticas,
            CrossingStats {
                total_travessias: 2,
                cruzamentos_transmissao: 1,
                cruzamentos_mt: 0,
                proximas_transmissao: 1,
                proximas_mt: 0,
                buffer_m: 50.0,
            }
        );
        assert_eq!(report.features.features.len(), 2);
        assert_eq!(
            report.features.features[0].properties.as_ref().unwrap()["categoria"],
            "cruzamento_transmissao"
        );

        // the pole is about 17 m from the line
        let request = CrossingRequest::from_payload(&crossing_payload(json!(10))).unwrap();
        let report = analyze_crossings(&request, 50.0).unwrap();
        assert_eq!(report.estatisticas.proximas_transmissao, 0);
        assert_eq!(report.estatisticas.buffer_m, 10.0);
    }

    #[test]
    fn test_buffer_policy() {
        assert_eq!(effective_buffer(None, 50.0).unwrap(), 50.0);
        assert_eq!(effective_buffer(Some(0.25), 50.0).unwrap(), 1.0);
        assert!(effective_buffer(Some(0.0), 50.0).is_err());
        assert!(effective_buffer(Some(f64::NAN), 50.0).is_err());

        let request = CrossingRequest::from_payload(&crossing_payload(json!(-5))).unwrap();
        let err = analyze_crossings(&request, 50.0).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(CrossingRequest::from_payload(&json!([])).is_err());
        assert!(CrossingRequest::from_payload(&json!({})).is_err());
        assert!(CrossingRequest::from_payload(&json!({"travessias": {"type": "Feature"}})).is_err());
        assert!(CrossingRequest::from_payload(&json!({
            "travessias": {"type": "FeatureCollection", "features": []},
            "buffer_m": "largo"
        }))
        .is_err());

        let err = FloodRequest::from_payload(&json!({
            "areas_alagadas": {"type": "FeatureCollection", "features": []}
        }))
        .unwrap_err();
        assert!(matches!(err, FaixaError::InvalidParameter { ref name, .. } if name == "estruturas"));
    }

    #[test]
    fn test_flood_request_defaults() {
        let payload = json!({
            "areas_alagadas": {"type": "FeatureCollection", "features": []},
            "estruturas": {"type": "FeatureCollection", "features": []},
            "raios": ["250", 100, "x", null],
            "atributo_protecao": "  "
        });
        let request = FloodRequest::from_payload(&payload).unwrap();
        assert_eq!(request.raios, Some(vec![250.0, 100.0]));
        assert!(request.atributo_protecao.is_none());

        let report = analyze_flood(&request, &[500.0], "anti_pouso").unwrap();
        assert_eq!(report.series.len(), 2);
        assert_eq!(report.series[0].raio, 100.0);
    }
}
