//! KML (Keyhole Markup Language) placemark reader
//!
//! This module converts a KML document into a flat list of placemark
//! features (geometry + string properties), the shape survey tools export
//! line, structure and treated-vegetation layers in. Folder nesting is kept
//! as a `folder_path` property; altitude is dropped.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{FaixaError, Result};
use crate::models::Geometry;

/// Placemark converted to a feature
#[derive(Debug, Clone, PartialEq)]
pub struct KmlFeature {
    /// Placemark `id` attribute
    pub id: Option<String>,

    /// Display name: the `name` property, else the placemark id
    pub name: Option<String>,

    pub properties: BTreeMap<String, String>,

    pub geometry: Option<Geometry>,
}

/// Parsed KML layer
#[derive(Debug, Clone, PartialEq)]
pub struct KmlDocument {
    pub file: String,
    pub features: Vec<KmlFeature>,
}

/// Read and parse a KML file.
///
/// A document without an XML root, or without any placemark, is an error:
/// an intentionally empty layer should be left out of the dataset instead.
pub fn read_kml(path: &Path) -> Result<KmlDocument> {
    let file = super::file_label(path);
    let content = fs::read_to_string(path)
        .map_err(|e| FaixaError::parse(&file, format!("Failed to open KML file: {}", e)))?;
    parse_kml(&file, &content)
}

/// Parse KML content already loaded in memory
pub fn parse_kml(file: &str, content: &str) -> Result<KmlDocument> {
    let root = parse_tree(file, content.strip_prefix('\u{feff}').unwrap_or(content))?;

    let mut features = Vec::new();
    collect_placemarks(file, &root, &[], &mut features)?;

    if features.is_empty() {
        return Err(FaixaError::parse(file, "document contains no placemarks"));
    }

    tracing::debug!(file, features = features.len(), "Parsed KML layer");

    Ok(KmlDocument { file: file.to_string(), features })
}

/// Minimal element tree; KML files are small enough to hold in memory
#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.text.trim().to_string()).filter(|t| !t.is_empty())
    }
}

fn start_node(file: &str, e: &quick_xml::events::BytesStart<'_>) -> Result<Node> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FaixaError::parse(file, format!("Invalid attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| FaixaError::parse(file, format!("Invalid attribute value: {}", err)))?;
        attrs.push((key, value.into_owned()));
    }
    Ok(Node { name, attrs, ..Default::default() })
}

fn parse_tree(file: &str, content: &str) -> Result<Node> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| FaixaError::parse(file, format!("Invalid XML at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(e) => stack.push(start_node(file, &e)?),
            Event::Empty(e) => {
                let node = start_node(file, &e)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| FaixaError::parse(file, format!("Invalid text: {}", e)))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(FaixaError::parse(file, "unexpected end of document (unclosed element)"));
    }
    root.ok_or_else(|| FaixaError::parse(file, "document has no XML root element"))
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn collect_placemarks(
    file: &str,
    node: &Node,
    folder_path: &[String],
    features: &mut Vec<KmlFeature>,
) -> Result<()> {
    match node.name.as_str() {
        "Placemark" => {
            features.push(convert_placemark(file, node, folder_path)?);
        }
        "Folder" => {
            let mut path = folder_path.to_vec();
            if let Some(name) = node.child_text("name") {
                path.push(name);
            }
            for child in &node.children {
                collect_placemarks(file, child, &path, features)?;
            }
        }
        _ => {
            for child in &node.children {
                collect_placemarks(file, child, folder_path, features)?;
            }
        }
    }
    Ok(())
}

fn convert_placemark(file: &str, node: &Node, folder_path: &[String]) -> Result<KmlFeature> {
    let id = node.attr("id").map(str::to_string);
    let mut properties = BTreeMap::new();

    if let Some(name) = node.child_text("name") {
        properties.insert("name".to_string(), name);
    }
    if let Some(description) = node.child_text("description") {
        properties.insert("description".to_string(), description);
    }
    if !folder_path.is_empty() {
        properties.insert("folder_path".to_string(), folder_path.join("/"));
    }

    if let Some(extended) = node.child("ExtendedData") {
        for entry in &extended.children {
            match entry.name.as_str() {
                // <Data name="k"><value>v</value></Data>
                "Data" => {
                    if let Some(key) = entry.attr("name") {
                        let value = entry.child("value").map(|v| v.text.trim().to_string()).unwrap_or_default();
                        properties.insert(key.to_string(), value);
                    }
                }
                // <SchemaData><SimpleData name="k">v</SimpleData></SchemaData>
                "SchemaData" => {
                    for simple in entry.children.iter().filter(|c| c.name == "SimpleData") {
                        if let Some(key) = simple.attr("name") {
                            properties.insert(key.to_string(), simple.text.trim().to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    let mut geometry = None;
    for child in &node.children {
        if let Some(converted) = convert_geometry(file, child)? {
            geometry = Some(converted);
            break;
        }
    }

    let name = properties.get("name").cloned().or_else(|| id.clone());

    Ok(KmlFeature { id, name, properties, geometry })
}

/// Convert a geometry element. Returns `None` for elements that are not geometries.
fn convert_geometry(file: &str, node: &Node) -> Result<Option<Geometry>> {
    let geometry = match node.name.as_str() {
        "Point" => {
            let coords = coordinates(file, node)?;
            match coords.first() {
                Some(first) => Geometry::Point { coordinates: *first },
                None => return Err(FaixaError::parse(file, "Point without coordinates")),
            }
        }
        "LineString" | "LinearRing" => Geometry::LineString { coordinates: coordinates(file, node)? },
        "Polygon" => {
            let mut rings = Vec::new();
            if let Some(ring) = node.child("outerBoundaryIs").and_then(|b| b.child("LinearRing")) {
                rings.push(coordinates(file, ring)?);
            } else {
                return Err(FaixaError::parse(file, "Polygon without outer boundary"));
            }
            for boundary in node.children.iter().filter(|c| c.name == "innerBoundaryIs") {
                if let Some(ring) = boundary.child("LinearRing") {
                    rings.push(coordinates(file, ring)?);
                }
            }
            Geometry::Polygon { coordinates: rings }
        }
        "MultiGeometry" => {
            let mut parts = Vec::new();
            for child in &node.children {
                if let Some(part) = convert_geometry(file, child)? {
                    parts.push(part);
                }
            }
            if parts.is_empty() {
                return Ok(None);
            }
            merge_parts(parts)
        }
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

/// Collapse homogeneous parts into the matching Multi* geometry
fn merge_parts(parts: Vec<Geometry>) -> Geometry {
    if parts.iter().all(|p| matches!(p, Geometry::Point { .. })) {
        let coordinates = parts.iter().filter_map(Geometry::as_point).collect();
        return Geometry::MultiPoint { coordinates };
    }
    if parts.iter().all(|p| matches!(p, Geometry::LineString { .. })) {
        let coordinates = parts
            .into_iter()
            .filter_map(|p| match p {
                Geometry::LineString { coordinates } => Some(coordinates),
                _ => None,
            })
            .collect();
        return Geometry::MultiLineString { coordinates };
    }
    if parts.iter().all(|p| matches!(p, Geometry::Polygon { .. })) {
        let coordinates = parts
            .into_iter()
            .filter_map(|p| match p {
                Geometry::Polygon { coordinates } => Some(coordinates),
                _ => None,
            })
            .collect();
        return Geometry::MultiPolygon { coordinates };
    }
    Geometry::GeometryCollection { geometries: parts }
}

/// Parse a `<coordinates>` child: whitespace-separated `lon,lat[,alt]` tuples
fn coordinates(file: &str, node: &Node) -> Result<Vec<[f64; 2]>> {
    let text = node.child("coordinates").map(|c| c.text.as_str()).unwrap_or_default();
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            let lat = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok([lon, lat]),
                _ => Err(FaixaError::parse(file, format!("Invalid coordinate tuple '{}'", tuple))),
            }
        })
        .collect()
}
