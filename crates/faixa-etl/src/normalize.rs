//! Normalizer
//!
//! Reads back the rows staged for a dataset and reconciles them into the
//! domain records: line, scenario, structures, spans, trees, vegetation and
//! lateral risks, crossings and treatments. Records are upserted by natural
//! key, and everything generated per scenario (spans and the risk tables)
//! is replaced, so a second pass over the same staging yields the same rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use faixa_core::fields::{coerce_bool, coerce_number, pick_field, Field, FieldAliases, ResolvedFields};
use faixa_core::models::{
    Crossing, CsvTable, DatasetId, Geometry, KmlLayer, LateralRisk, LineId, LineUpsert, NewSpan,
    NormalizationSummary, RiskSource, ScenarioId, ScenarioStatus, ScenarioType, ScenarioUpsert,
    Span, SpanId, StagedFeature, StagedRow, Structure, StructureUpsert, Treatment, TreeUpsert,
    VegetationRisk,
};
use faixa_core::{FaixaError, Result};
use faixa_geo::index::{distance_to_path, locate_along};
use faixa_geo::models::{feature_collection, feature_geometry, from_geo_geometry, GeometryExt};
use faixa_geo::transform::geodesic_distance;
use faixa_geo::{intersect, points_within, representative_point, SpanIndex};
use geojson::{FeatureCollection, GeoJson, JsonObject};
use serde_json::Value;
use tracing::instrument;

use faixa_store::ImportTransaction;

/// Risk class given to vegetation found inside the clearance radius
pub const COMPUTED_RISK_CLASS: &str = "critico";

/// Third-party asset layer intersected with the line geometry
#[derive(Debug, Clone)]
pub struct CrossingLayer {
    /// Crossing type recorded for every intersection (e.g. `rodovia`)
    pub kind: String,
    pub features: FeatureCollection,
}

impl CrossingLayer {
    /// Read a GeoJSON FeatureCollection file
    pub fn read(kind: impl Into<String>, path: &Path) -> Result<Self> {
        let file = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| FaixaError::parse(&file, e.to_string()))?;
        match content.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(features)) => Ok(Self { kind: kind.into(), features }),
            Ok(_) => Err(FaixaError::parse(file, "expected a GeoJSON FeatureCollection")),
            Err(e) => Err(FaixaError::parse(file, e.to_string())),
        }
    }
}

/// What a normalization pass writes besides the staged data
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Line metadata; the geometry is taken from the staged line layer
    pub line: LineUpsert,
    pub scenario_description: String,
    pub scenario_type: ScenarioType,
    pub scenario_status: ScenarioStatus,
    pub scenario_date: Option<NaiveDate>,
    /// Radius for spatially computed vegetation risk
    pub clearance_m: f64,
    pub aliases: FieldAliases,
    pub crossing_layers: Vec<CrossingLayer>,
}

/// Normalize the staged rows of a dataset inside the caller's transaction
#[instrument(
    skip(tx, options),
    fields(line = %options.line.code, scenario = %options.scenario_description)
)]
pub async fn normalize<T: ImportTransaction>(
    tx: &mut T,
    dataset_id: DatasetId,
    options: &NormalizeOptions,
) -> Result<NormalizationSummary> {
    let aliases = &options.aliases;

    // Line and scenario
    let line_features = tx.staged_features(dataset_id, KmlLayer::Line).await?;
    let line_path = line_path(&line_features);
    let line = tx
        .upsert_line(&LineUpsert {
            geometry: line_path.clone().map(Geometry::line_string),
            ..options.line.clone()
        })
        .await?;
    let scenario = tx
        .upsert_scenario(&ScenarioUpsert {
            line_id: line.id,
            description: options.scenario_description.clone(),
            reference_date: options.scenario_date,
            scenario_type: options.scenario_type,
            status: options.scenario_status,
        })
        .await?;
    tracing::debug!(line_id = %line.id, scenario_id = %scenario.id, "Line and scenario upserted");

    // Structures, ordered along the line
    let staged_structures = tx.staged_features(dataset_id, KmlLayer::Structure).await?;
    let candidates = structure_candidates(&staged_structures, aliases, line_path.as_deref())?;
    let mut structures: Vec<Structure> = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.into_iter().enumerate() {
        let structure = tx
            .upsert_structure(&StructureUpsert {
                line_id: line.id,
                code: candidate.code,
                structure_type: candidate.structure_type,
                circuits: candidate.circuits,
                height_m: candidate.height_m,
                longitude: candidate.position[0],
                latitude: candidate.position[1],
                stage_order: i + 1,
            })
            .await?;
        structures.push(structure);
    }
    tracing::debug!(structures = structures.len(), "Structures upserted");

    // Spans, regenerated for the scenario
    let spans = tx.replace_spans(line.id, scenario.id, &derive_spans(&structures)).await?;
    let lookup = SpanLookup::new(&spans);
    tracing::debug!(spans = spans.len(), "Spans regenerated");

    let context = RowContext { line_id: line.id, scenario_id: scenario.id, lookup: &lookup };

    // Trees and vegetation risk
    let risk_rows = tx.staged_rows(dataset_id, CsvTable::VegetationRisk).await?;
    let vegetation_rows = tx.staged_rows(dataset_id, CsvTable::Vegetation).await?;
    let (trees_upserted, vegetation_risks) = if !risk_rows.is_empty() {
        surveyed_vegetation(tx, &context, aliases, &risk_rows, &vegetation_rows).await?
    } else {
        computed_vegetation(tx, &context, aliases, &vegetation_rows, line_path.as_deref(), options.clearance_m)
            .await?
    };
    let vegetation_risks = tx.replace_vegetation_risks(scenario.id, &vegetation_risks).await?;
    tracing::debug!(trees = trees_upserted, risks = vegetation_risks, "Vegetation normalized");

    // Lateral fall risk
    let lateral_rows = tx.staged_rows(dataset_id, CsvTable::LateralRisk).await?;
    let lateral_risks = if lateral_rows.is_empty() {
        0
    } else {
        let risks = lateral_risks(&context, aliases, &lateral_rows)?;
        tx.replace_lateral_risks(scenario.id, &risks).await?
    };

    // Crossings
    let crossing_rows = tx.staged_rows(dataset_id, CsvTable::Crossings).await?;
    let crossings_recorded = if crossing_rows.is_empty() && options.crossing_layers.is_empty() {
        0
    } else {
        let mut crossings = surveyed_crossings(&context, aliases, &crossing_rows)?;
        crossings.extend(layer_crossings(&context, aliases, line_path.as_deref(), &options.crossing_layers));
        tx.replace_crossings(scenario.id, &crossings).await?
    };

    // Treatments
    let treated = tx.staged_features(dataset_id, KmlLayer::Treated).await?;
    let treatments_recorded = if treated.is_empty() {
        0
    } else {
        let treatments = treatments(&context, aliases, &treated);
        tx.replace_treatments(scenario.id, &treatments).await?
    };

    let summary = NormalizationSummary {
        line_id: line.id,
        scenario_id: scenario.id,
        structures_upserted: structures.len(),
        spans_generated: spans.len(),
        trees_upserted,
        vegetation_risks,
        lateral_risks,
        crossings_recorded,
        treatments_recorded,
    };
    tracing::debug!(?summary, "Normalization finished");
    Ok(summary)
}

/// Path of the last staged line feature
fn line_path(features: &[StagedFeature]) -> Option<Vec<[f64; 2]>> {
    let feature = features.iter().rev().find(|f| f.geometry.is_some())?;
    let path = feature.geometry.as_ref().and_then(Geometry::line_path)?;
    if path.len() < 2 || !path.iter().flatten().all(|v| v.is_finite()) {
        tracing::warn!(feature = %feature.context(), "Line geometry is degenerate, ignoring it");
        return None;
    }
    Some(path)
}

#[derive(Debug, Clone, PartialEq)]
struct StructureCandidate {
    code: String,
    structure_type: Option<String>,
    circuits: Option<f64>,
    height_m: Option<f64>,
    position: [f64; 2],
    stage_order: usize,
}

impl StructureCandidate {
    fn from_feature(feature: &StagedFeature, aliases: &FieldAliases) -> Result<Self> {
        let props = &feature.properties;
        let code = pick_field(props, aliases, Field::StructureCode)
            .or_else(|| feature.name.as_deref().map(str::trim).filter(|n| !n.is_empty()))
            .ok_or_else(|| FaixaError::Normalization {
                context: feature.context(),
                reason: "structure without code or name".to_string(),
            })?;

        let position = feature.geometry.as_ref().and_then(Geometry::as_point).ok_or_else(|| {
            FaixaError::Normalization {
                context: feature.context(),
                reason: "structure without point geometry".to_string(),
            }
        })?;
        if !valid_position(position) {
            return Err(FaixaError::Normalization {
                context: feature.context(),
                reason: format!("invalid coordinates {:?}", position),
            });
        }

        Ok(Self {
            code: code.to_string(),
            structure_type: pick_field(props, aliases, Field::StructureType).map(str::to_string),
            circuits: pick_field(props, aliases, Field::Circuits).and_then(coerce_number),
            height_m: pick_field(props, aliases, Field::Height).and_then(coerce_number),
            position,
            stage_order: feature.order,
        })
    }
}

/// Structures to upsert, one per code (the last staged feature wins), in line order
fn structure_candidates(
    features: &[StagedFeature],
    aliases: &FieldAliases,
    line_path: Option<&[[f64; 2]]>,
) -> Result<Vec<StructureCandidate>> {
    let mut by_code: HashMap<String, usize> = HashMap::new();
    let mut candidates: Vec<StructureCandidate> = Vec::with_capacity(features.len());
    for feature in features {
        let candidate = StructureCandidate::from_feature(feature, aliases)?;
        match by_code.get(&candidate.code) {
            Some(&i) => {
                tracing::warn!(code = %candidate.code, feature = %feature.context(), "Duplicate structure code");
                candidates[i] = candidate;
            }
            None => {
                by_code.insert(candidate.code.clone(), candidates.len());
                candidates.push(candidate);
            }
        }
    }

    let mut keyed: Vec<(f64, StructureCandidate)> = candidates
        .into_iter()
        .map(|c| {
            let offset = line_path.and_then(|path| locate_along(path, c.position)).unwrap_or(0.0);
            (offset, c)
        })
        .collect();
    keyed.sort_by(|(a, ca), (b, cb)| a.total_cmp(b).then(ca.stage_order.cmp(&cb.stage_order)));
    Ok(keyed.into_iter().map(|(_, c)| c).collect())
}

/// Spans between consecutive structures
fn derive_spans(structures: &[Structure]) -> Vec<NewSpan> {
    structures
        .windows(2)
        .map(|pair| {
            let (start, end) = (&pair[0], &pair[1]);
            NewSpan {
                start_structure: start.id,
                end_structure: end.id,
                code: format!("{} - {}", start.code, end.code),
                start_code: start.code.clone(),
                end_code: end.code.clone(),
                length_m: geodesic_distance(start.position(), end.position()),
                geometry: Geometry::line_string(vec![start.position(), end.position()]),
            }
        })
        .collect()
}

/// Span lookup key: whitespace removed, lowercased
pub fn span_key(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

/// Span association by explicit reference or by proximity
struct SpanLookup {
    by_key: HashMap<String, SpanId>,
    index: SpanIndex<SpanId>,
}

impl SpanLookup {
    fn new(spans: &[Span]) -> Self {
        let mut by_key = HashMap::new();
        for span in spans {
            by_key.insert(span_key(&span.code), span.id);
            by_key.insert(span_key(&format!("{}-{}", span.start_code, span.end_code)), span.id);
        }
        let index = SpanIndex::build(spans.iter().filter_map(|span| match &span.geometry {
            Geometry::LineString { coordinates } if coordinates.len() >= 2 => {
                Some((span.id, coordinates[0], coordinates[coordinates.len() - 1]))
            }
            _ => None,
        }));
        Self { by_key, index }
    }

    /// Span named by the row: the span code, else the start/end structure pair
    fn referenced(&self, fields: &ResolvedFields, row: &StagedRow) -> Option<SpanId> {
        let values = &row.values;
        let key = fields.pick(values, Field::Span).map(span_key).or_else(|| {
            match (fields.pick(values, Field::SpanStart), fields.pick(values, Field::SpanEnd)) {
                (Some(start), Some(end)) => Some(span_key(&format!("{}-{}", start, end))),
                _ => None,
            }
        })?;

        let found = self.by_key.get(&key).copied();
        if found.is_none() {
            tracing::warn!(row = %row.context(), reference = %key, "Unknown span reference");
        }
        found
    }

    fn nearest(&self, position: Option<[f64; 2]>) -> Option<SpanId> {
        self.index.nearest(position?).map(|(id, _)| id)
    }
}

struct RowContext<'a> {
    line_id: LineId,
    scenario_id: ScenarioId,
    lookup: &'a SpanLookup,
}

/// Header set of a staged table
fn resolve_fields(aliases: &FieldAliases, rows: &[StagedRow]) -> ResolvedFields {
    let headers: BTreeSet<&String> = rows.iter().flat_map(|row| row.values.keys()).collect();
    let headers: Vec<String> = headers.into_iter().cloned().collect();
    ResolvedFields::resolve(aliases, &headers)
}

fn valid_position(p: [f64; 2]) -> bool {
    p[0].is_finite() && p[1].is_finite() && (-180.0..=180.0).contains(&p[0]) && (-90.0..=90.0).contains(&p[1])
}

/// Longitude/latitude of a row. No coordinates is fine; a partial or
/// unparseable pair is an error.
fn row_position(fields: &ResolvedFields, row: &StagedRow) -> Result<Option<[f64; 2]>> {
    let lat = fields.pick(&row.values, Field::Latitude);
    let lon = fields.pick(&row.values, Field::Longitude);
    let invalid = |reason: String| FaixaError::Normalization { context: row.context(), reason };

    match (lon, lat) {
        (None, None) => Ok(None),
        (Some(lon), Some(lat)) => match (coerce_number(lon), coerce_number(lat)) {
            (Some(x), Some(y)) if valid_position([x, y]) => Ok(Some([x, y])),
            _ => Err(invalid(format!("invalid coordinate pair ({}, {})", lon, lat))),
        },
        _ => Err(invalid("incomplete coordinate pair".to_string())),
    }
}

fn tree_upsert(
    context: &RowContext<'_>,
    fields: &ResolvedFields,
    row: &StagedRow,
    position: Option<[f64; 2]>,
    span_id: Option<SpanId>,
) -> TreeUpsert {
    let values = &row.values;
    TreeUpsert {
        line_id: context.line_id,
        span_id,
        code: fields.text(values, Field::TreeCode).unwrap_or_else(|| format!("tree_{}", row.row_number)),
        geometry: position.map(|p| Geometry::point(p[0], p[1])),
        height_m: fields.number(values, Field::Height),
        vegetation_type: fields.text(values, Field::VegetationType),
        riparian: fields.pick(values, Field::Riparian).and_then(coerce_bool),
    }
}

/// Trees and risks from the classified risk table, each paired with the
/// vegetation row of the same row number when there is one
async fn surveyed_vegetation<T: ImportTransaction>(
    tx: &mut T,
    context: &RowContext<'_>,
    aliases: &FieldAliases,
    risk_rows: &[StagedRow],
    vegetation_rows: &[StagedRow],
) -> Result<(usize, Vec<VegetationRisk>)> {
    let risk_fields = resolve_fields(aliases, risk_rows);
    let vegetation_fields = resolve_fields(aliases, vegetation_rows);
    let vegetation_by_row: HashMap<usize, &StagedRow> =
        vegetation_rows.iter().map(|row| (row.row_number, row)).collect();

    let mut risks = Vec::with_capacity(risk_rows.len());
    for risk_row in risk_rows {
        let (tree_row, tree_fields) = match vegetation_by_row.get(&risk_row.row_number) {
            Some(row) => (*row, &vegetation_fields),
            None => (risk_row, &risk_fields),
        };

        let position = match row_position(tree_fields, tree_row)? {
            Some(p) => Some(p),
            None => row_position(&risk_fields, risk_row)?,
        };
        let span_id = context
            .lookup
            .referenced(&risk_fields, risk_row)
            .or_else(|| context.lookup.referenced(tree_fields, tree_row))
            .or_else(|| context.lookup.nearest(position));

        let tree = tx.upsert_tree(&tree_upsert(context, tree_fields, tree_row, position, span_id)).await?;

        let values = &risk_row.values;
        risks.push(VegetationRisk {
            scenario_id: context.scenario_id,
            span_id,
            tree_id: Some(tree.id),
            clearance_m: risk_fields.number(values, Field::Clearance),
            risk_class: risk_fields.text(values, Field::RiskClass),
            lateral_distance_m: risk_fields.number(values, Field::LateralDistance),
            category: risk_fields.text(values, Field::RiskCategory),
            processed_at: risk_fields.text(values, Field::ProcessedDate),
            source: RiskSource::Survey,
            row_number: Some(risk_row.row_number),
        });
    }

    Ok((risk_rows.len(), risks))
}

/// Trees from the vegetation table; risk flagged for every tree inside the
/// clearance radius of the line
async fn computed_vegetation<T: ImportTransaction>(
    tx: &mut T,
    context: &RowContext<'_>,
    aliases: &FieldAliases,
    vegetation_rows: &[StagedRow],
    line_path: Option<&[[f64; 2]]>,
    clearance_m: f64,
) -> Result<(usize, Vec<VegetationRisk>)> {
    let fields = resolve_fields(aliases, vegetation_rows);

    let mut located = Vec::new();
    for row in vegetation_rows {
        let position = row_position(&fields, row)?;
        let span_id = context.lookup.referenced(&fields, row).or_else(|| context.lookup.nearest(position));
        let tree = tx.upsert_tree(&tree_upsert(context, &fields, row, position, span_id)).await?;
        if let Some(position) = position {
            located.push((tree.id, tree.span_id, position, row.row_number));
        }
    }

    let Some(path) = line_path else {
        if !vegetation_rows.is_empty() {
            tracing::warn!("No line geometry staged, vegetation risk not computed");
        }
        return Ok((vegetation_rows.len(), Vec::new()));
    };

    let points: Vec<geo::Point> = located.iter().map(|(_, _, p, _)| geo::Point::new(p[0], p[1])).collect();
    let line = geo::Geometry::LineString(geo::LineString::from(path.to_vec()));
    let risks = points_within(&points, &[line], clearance_m)
        .into_iter()
        .map(|i| {
            let (tree_id, span_id, position, row_number) = located[i];
            VegetationRisk {
                scenario_id: context.scenario_id,
                span_id,
                tree_id: Some(tree_id),
                clearance_m: None,
                risk_class: Some(COMPUTED_RISK_CLASS.to_string()),
                lateral_distance_m: distance_to_path(path, position),
                category: None,
                processed_at: None,
                source: RiskSource::Spatial,
                row_number: Some(row_number),
            }
        })
        .collect();

    Ok((vegetation_rows.len(), risks))
}

fn lateral_risks(
    context: &RowContext<'_>,
    aliases: &FieldAliases,
    rows: &[StagedRow],
) -> Result<Vec<LateralRisk>> {
    let fields = resolve_fields(aliases, rows);
    rows.iter()
        .map(|row| {
            let values = &row.values;
            let position = row_position(&fields, row)?;
            Ok(LateralRisk {
                scenario_id: context.scenario_id,
                line_id: context.line_id,
                span_id: context.lookup.referenced(&fields, row).or_else(|| context.lookup.nearest(position)),
                tree_code: fields.text(values, Field::TreeCode),
                lateral_distance_m: fields.number(values, Field::LateralDistance),
                fall_height_m: fields.number(values, Field::FallHeight),
                risk_class: fields
                    .text(values, Field::RiskClass)
                    .or_else(|| fields.text(values, Field::RiskCategory)),
                geometry: position.map(|p| Geometry::point(p[0], p[1])),
                row_number: row.row_number,
            })
        })
        .collect()
}

fn surveyed_crossings(
    context: &RowContext<'_>,
    aliases: &FieldAliases,
    rows: &[StagedRow],
) -> Result<Vec<Crossing>> {
    let fields = resolve_fields(aliases, rows);
    rows.iter()
        .map(|row| {
            let values = &row.values;
            let position = row_position(&fields, row)?;
            Ok(Crossing {
                scenario_id: context.scenario_id,
                line_id: context.line_id,
                span_id: context.lookup.referenced(&fields, row).or_else(|| context.lookup.nearest(position)),
                crossing_type: fields.text(values, Field::CrossingType),
                risk_class: fields.text(values, Field::CrossingClass),
                description: fields.text(values, Field::CrossingDescription),
                geometry: position.map(|p| Geometry::point(p[0], p[1])),
                source: RiskSource::Survey,
            })
        })
        .collect()
}

/// Scalar properties as text, for alias lookup
fn text_properties(properties: Option<&JsonObject>) -> BTreeMap<String, String> {
    properties
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            Value::Bool(b) => Some((key.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}

/// Intersections of the line with every supplied asset layer
fn layer_crossings(
    context: &RowContext<'_>,
    aliases: &FieldAliases,
    line_path: Option<&[[f64; 2]]>,
    layers: &[CrossingLayer],
) -> Vec<Crossing> {
    if layers.is_empty() {
        return Vec::new();
    }
    let Some(path) = line_path else {
        tracing::warn!("No line geometry staged, crossing layers not intersected");
        return Vec::new();
    };
    let line = feature_collection(vec![Geometry::line_string(path.to_vec()).to_feature(None)]);

    let mut crossings = Vec::new();
    for layer in layers {
        let hits = intersect(Some(&line), Some(&layer.features));
        tracing::debug!(kind = %layer.kind, hits = hits.features.len(), "Crossing layer intersected");

        for hit in &hits.features {
            let Some(geometry) = feature_geometry(hit).map(|g| from_geo_geometry(&g)) else {
                continue;
            };
            let asset = text_properties(
                hit.properties.as_ref().and_then(|p| p.get("b")).and_then(Value::as_object),
            );
            crossings.push(Crossing {
                scenario_id: context.scenario_id,
                line_id: context.line_id,
                span_id: context.lookup.nearest(representative_point(&geometry)),
                crossing_type: Some(layer.kind.clone()),
                risk_class: pick_field(&asset, aliases, Field::CrossingClass).map(str::to_string),
                description: pick_field(&asset, aliases, Field::CrossingDescription).map(str::to_string),
                geometry: Some(geometry),
                source: RiskSource::Spatial,
            });
        }
    }
    crossings
}

fn treatments(context: &RowContext<'_>, aliases: &FieldAliases, features: &[StagedFeature]) -> Vec<Treatment> {
    features
        .iter()
        .map(|feature| {
            let props = &feature.properties;
            Treatment {
                scenario_id: context.scenario_id,
                line_id: context.line_id,
                span_id: context.lookup.nearest(feature.geometry.as_ref().and_then(representative_point)),
                treatment_type: pick_field(props, aliases, Field::TreatmentType).map(str::to_string),
                executed_at: pick_field(props, aliases, Field::TreatmentDate).map(str::to_string),
                geometry: feature.geometry.clone(),
                origin: feature.source_file.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(order: usize, name: Option<&str>, geometry: Option<Geometry>) -> StagedFeature {
        StagedFeature {
            order,
            source_file: "estruturas.kml".to_string(),
            name: name.map(str::to_string),
            properties: BTreeMap::new(),
            geometry,
        }
    }

    fn row(pairs: &[(&str, &str)]) -> StagedRow {
        StagedRow {
            row_number: 4,
            source_file: "vegetacao.csv".to_string(),
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_span_key_normalization() {
        assert_eq!(span_key(" E1 - E2 "), "e1-e2");
        assert_eq!(span_key("e1-E2"), "e1-e2");
    }

    #[test]
    fn test_structure_code_from_alias_then_name() {
        let mut with_alias = feature(1, Some("Torre 1"), Some(Geometry::point(-47.9, -15.8)));
        with_alias.properties.insert("Codigo".to_string(), "T-001".to_string());
        let candidate = StructureCandidate::from_feature(&with_alias, &FieldAliases::new()).unwrap();
        assert_eq!(candidate.code, "T-001");

        let named = feature(2, Some("E2"), Some(Geometry::point(-47.9, -15.8)));
        assert_eq!(StructureCandidate::from_feature(&named, &FieldAliases::new()).unwrap().code, "E2");
    }

    #[test]
    fn test_structure_without_code_or_coordinates_fails() {
        let anonymous = feature(3, None, Some(Geometry::point(0.0, 0.0)));
        match StructureCandidate::from_feature(&anonymous, &FieldAliases::new()) {
            Err(FaixaError::Normalization { context, .. }) => assert_eq!(context, "estruturas.kml#3"),
            other => panic!("Expected Normalization error, got {:?}", other),
        }

        let broken = feature(4, Some("E4"), Some(Geometry::point(f64::NAN, 1.0)));
        assert!(StructureCandidate::from_feature(&broken, &FieldAliases::new()).is_err());
    }

    #[test]
    fn test_structures_sorted_along_line_and_deduplicated() {
        let path = vec![[0.0, 0.0], [0.01, 0.0]];
        let features = vec![
            feature(1, Some("E3"), Some(Geometry::point(0.009, 0.0))),
            feature(2, Some("E1"), Some(Geometry::point(0.0, 0.0))),
            feature(3, Some("E2"), Some(Geometry::point(0.005, 0.0))),
            feature(4, Some("E1"), Some(Geometry::point(0.0001, 0.0))),
        ];
        let ordered = structure_candidates(&features, &FieldAliases::new(), Some(&path)).unwrap();
        let codes: Vec<&str> = ordered.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["E1", "E2", "E3"]);
        assert_eq!(ordered[0].position, [0.0001, 0.0]);

        let staged = structure_candidates(&features, &FieldAliases::new(), None).unwrap();
        let codes: Vec<&str> = staged.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["E3", "E2", "E1"]);
    }

    #[test]
    fn test_row_position_rules() {
        let fields = |r: &StagedRow| resolve_fields(&FieldAliases::new(), std::slice::from_ref(r));

        let ok = row(&[("Latitude", "-15,8"), ("Longitude", "-47.9")]);
        assert_eq!(row_position(&fields(&ok), &ok).unwrap(), Some([-47.9, -15.8]));

        let absent = row(&[("tree_id", "A1")]);
        assert_eq!(row_position(&fields(&absent), &absent).unwrap(), None);

        let partial = row(&[("lat", "-15.8"), ("lon", "")]);
        assert!(matches!(
            row_position(&fields(&partial), &partial),
            Err(FaixaError::Normalization { .. })
        ));

        let garbage = row(&[("lat", "abc"), ("lon", "-47.9")]);
        assert!(row_position(&fields(&garbage), &garbage).is_err());
    }

    #[test]
    fn test_text_properties_keeps_scalars() {
        let props: JsonObject = serde_json::from_value(serde_json::json!({
            "nome": "BR-040", "faixas": 4, "pedagio": true, "geo": {"x": 1}
        }))
        .unwrap();
        let text = text_properties(Some(&props));
        assert_eq!(text.get("nome").map(String::as_str), Some("BR-040"));
        assert_eq!(text.get("faixas").map(String::as_str), Some("4"));
        assert!(!text.contains_key("geo"));
    }
}
