//! Field resolution for loosely named survey columns and properties.
//!
//! Survey exports spell the same column in several ways (`lat`, `Latitude`,
//! `y`). Each logical [`Field`] carries an ordered list of accepted aliases;
//! CSV headers are resolved once per file into [`ResolvedFields`], and KML
//! property maps are looked up directly with [`pick_value`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Logical field read from survey files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    StructureCode,
    StructureType,
    Circuits,
    Height,
    TreeCode,
    Span,
    SpanStart,
    SpanEnd,
    Latitude,
    Longitude,
    VegetationType,
    Riparian,
    Clearance,
    LateralDistance,
    RiskCategory,
    RiskClass,
    ProcessedDate,
    TreatmentType,
    TreatmentDate,
    CrossingType,
    CrossingClass,
    CrossingDescription,
    FallHeight,
}

impl Field {
    pub const ALL: [Field; 23] = [
        Field::StructureCode,
        Field::StructureType,
        Field::Circuits,
        Field::Height,
        Field::TreeCode,
        Field::Span,
        Field::SpanStart,
        Field::SpanEnd,
        Field::Latitude,
        Field::Longitude,
        Field::VegetationType,
        Field::Riparian,
        Field::Clearance,
        Field::LateralDistance,
        Field::RiskCategory,
        Field::RiskClass,
        Field::ProcessedDate,
        Field::TreatmentType,
        Field::TreatmentDate,
        Field::CrossingType,
        Field::CrossingClass,
        Field::CrossingDescription,
        Field::FallHeight,
    ];

    /// Built-in header spellings, in lookup order
    pub fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            Field::StructureCode => &["codigo", "structure_id", "estrutura", "id"],
            Field::StructureType => &["tipo", "type", "class"],
            Field::Circuits => &["n_circuitos", "circuitos", "circuit"],
            Field::Height => &["altura", "height_m", "height"],
            Field::TreeCode => &["tree_id", "arvore_id", "id"],
            Field::Span => &["vao", "vao_codigo", "span", "span_id", "span_code"],
            Field::SpanStart => &["estrutura_ini", "structure_ini", "tower_start"],
            Field::SpanEnd => &["estrutura_fim", "structure_fim", "tower_end"],
            Field::Latitude => &["lat", "latitude", "y"],
            Field::Longitude => &["lon", "longitude", "x"],
            Field::VegetationType => &["tipo", "vegetation_type", "class"],
            Field::Riparian => &["em_app", "riparian", "app"],
            Field::Clearance => {
                &["dist_min_cabo_m", "distancia_min", "clearance_m", "distance_to_conductor_m"]
            }
            Field::LateralDistance => &["distancia_lateral_m", "lateral_distance", "offset_m"],
            Field::RiskCategory => &["categoria", "risk_category", "classificacao"],
            Field::RiskClass => &["classe_risco", "risk_class", "clearance_class"],
            Field::ProcessedDate => &["data_processamento", "processed_at", "date"],
            Field::TreatmentType => &["tipo", "service", "servico"],
            Field::TreatmentDate => &["data", "data_execucao", "executed_at"],
            Field::CrossingType => &["tipo", "tipo_cruzamento", "crossing_type"],
            Field::CrossingClass => &["classe_risco", "classe_risco_cruzamento", "risk_class"],
            Field::CrossingDescription => &["descricao", "description", "nome"],
            Field::FallHeight => &["altura_queda_m", "fall_height", "altura"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::StructureCode => "structure_code",
            Field::StructureType => "structure_type",
            Field::Circuits => "circuits",
            Field::Height => "height",
            Field::TreeCode => "tree_code",
            Field::Span => "span",
            Field::SpanStart => "span_start",
            Field::SpanEnd => "span_end",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::VegetationType => "vegetation_type",
            Field::Riparian => "riparian",
            Field::Clearance => "clearance",
            Field::LateralDistance => "lateral_distance",
            Field::RiskCategory => "risk_category",
            Field::RiskClass => "risk_class",
            Field::ProcessedDate => "processed_date",
            Field::TreatmentType => "treatment_type",
            Field::TreatmentDate => "treatment_date",
            Field::CrossingType => "crossing_type",
            Field::CrossingClass => "crossing_class",
            Field::CrossingDescription => "crossing_description",
            Field::FallHeight => "fall_height",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alias table: built-in spellings, optionally replaced per field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAliases {
    overrides: HashMap<Field, Vec<String>>,
}

impl FieldAliases {
    /// Alias table with only the built-in spellings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the spellings accepted for one field
    pub fn with_override(mut self, field: Field, aliases: Vec<String>) -> Self {
        self.set(field, aliases);
        self
    }

    pub fn set(&mut self, field: Field, aliases: Vec<String>) {
        self.overrides.insert(field, aliases);
    }

    /// Ordered aliases for a field
    pub fn aliases(&self, field: Field) -> Vec<&str> {
        match self.overrides.get(&field) {
            Some(custom) => custom.iter().map(String::as_str).collect(),
            None => field.default_aliases().to_vec(),
        }
    }

    /// Fields whose spellings were replaced
    pub fn overridden(&self) -> impl Iterator<Item = (&Field, &Vec<String>)> {
        self.overrides.iter()
    }
}

/// Header names resolved once per file for every logical field
#[derive(Debug, Clone, Default)]
pub struct ResolvedFields {
    columns: HashMap<Field, Vec<String>>,
}

impl ResolvedFields {
    /// Match the file's headers against every field's aliases.
    ///
    /// For each alias in order, an exact header match wins over a
    /// case-insensitive one; a header is listed at most once per field.
    pub fn resolve(aliases: &FieldAliases, headers: &[String]) -> Self {
        let mut columns = HashMap::new();
        for field in Field::ALL {
            let mut matched: Vec<String> = Vec::new();
            for alias in aliases.aliases(field) {
                let exact = headers.iter().find(|h| h.as_str() == alias);
                let found = exact.or_else(|| headers.iter().find(|h| h.eq_ignore_ascii_case(alias)));
                if let Some(header) = found {
                    if !matched.contains(header) {
                        matched.push(header.clone());
                    }
                }
            }
            if !matched.is_empty() {
                columns.insert(field, matched);
            }
        }
        Self { columns }
    }

    /// Whether any header matched the field
    pub fn has(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// First non-empty value for a field in a row, trimmed
    pub fn pick<'a>(&self, row: &'a BTreeMap<String, String>, field: Field) -> Option<&'a str> {
        self.columns
            .get(&field)?
            .iter()
            .filter_map(|header| row.get(header))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    /// First non-empty value coerced to a finite number
    pub fn number(&self, row: &BTreeMap<String, String>, field: Field) -> Option<f64> {
        self.pick(row, field).and_then(coerce_number)
    }

    pub fn text(&self, row: &BTreeMap<String, String>, field: Field) -> Option<String> {
        self.pick(row, field).map(str::to_string)
    }
}

/// Case-insensitive, first-non-empty lookup across candidate keys.
///
/// For each candidate in order, an exact key is tried before a
/// case-insensitive match. Blank values are skipped.
pub fn pick_value<'a, K: AsRef<str>>(
    record: &'a BTreeMap<String, String>,
    candidates: &[K],
) -> Option<&'a str> {
    for candidate in candidates {
        let candidate = candidate.as_ref();
        if let Some(value) = record.get(candidate).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            return Some(value);
        }
        let folded = record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty());
        if folded.is_some() {
            return folded;
        }
    }
    None
}

/// Look up a logical field in a property map using the alias table
pub fn pick_field<'a>(
    record: &'a BTreeMap<String, String>,
    aliases: &FieldAliases,
    field: Field,
) -> Option<&'a str> {
    pick_value(record, &aliases.aliases(field))
}

/// Coerce a text value to a finite number. Never fails: anything
/// unparseable or non-finite is absent. A lone decimal comma is accepted.
pub fn coerce_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1)
    } else {
        trimmed.to_string()
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Three-valued boolean coercion: `Some(true)`, `Some(false)`, or `None` for unknown.
pub fn coerce_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "sim" | "yes" => Some(true),
        "false" | "0" | "nao" | "não" | "no" => Some(false),
        _ => None,
    }
}
