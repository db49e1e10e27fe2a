//! In-process line geometry backend over GeoJSON datasets.
//!
//! Line features are `LineString` / `MultiLineString` GeoJSON features whose
//! coordinates are in a projected, metre-based system. A feature dangles when
//! one of its endpoints is not shared with any other feature.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use geo::EuclideanLength;
use geo_types::{Coord, LineString};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use tracing::debug;

use crate::driver::{Cancellation, DriverError, GeometryEngine};
use crate::requests::{TrimLineRequest, TrimReport};
use crate::sources::Source;

/// A single traced line with the attributes it was read with
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    pub line: LineString<f64>,
    pub id: Option<Id>,
    pub properties: Option<JsonObject>,
}

impl LineFeature {
    pub fn new(coords: Vec<[f64; 2]>) -> Self {
        Self {
            line: LineString::new(coords.into_iter().map(|[x, y]| Coord { x, y }).collect()),
            id: None,
            properties: None,
        }
    }

    pub fn length(&self) -> f64 {
        self.line.euclidean_length()
    }

    fn endpoints(&self) -> Option<(Coord<f64>, Coord<f64>)> {
        Some((*self.line.0.first()?, *self.line.0.last()?))
    }
}

/// Result of trimming one threshold to its fixed point
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub kept: Vec<LineFeature>,
    pub removed: usize,
    /// Sweeps needed before no dangle below the threshold remained
    pub sweeps: usize,
}

/// Vertices within the tolerance of each other merge into one node,
/// transitively. Candidates are looked up in the 3x3 grid cells around a
/// vertex, so the result does not depend on where cell edges fall.
struct NodeSnapper {
    tolerance: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    coords: Vec<Coord<f64>>,
    parent: Vec<usize>,
}

impl NodeSnapper {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            cells: HashMap::new(),
            coords: Vec::new(),
            parent: Vec::new(),
        }
    }

    fn cell(&self, coord: Coord<f64>) -> (i64, i64) {
        (
            (coord.x / self.tolerance).floor() as i64,
            (coord.y / self.tolerance).floor() as i64,
        )
    }

    fn insert(&mut self, coord: Coord<f64>) -> usize {
        let id = self.coords.len();
        self.coords.push(coord);
        self.parent.push(id);

        let (cx, cy) = self.cell(coord);
        let mut near = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(ids) = self.cells.get(&(cx + dx, cy + dy)) {
                    near.extend(ids.iter().copied().filter(|&other| {
                        let o = self.coords[other];
                        (o.x - coord.x).hypot(o.y - coord.y) <= self.tolerance
                    }));
                }
            }
        }
        for other in near {
            self.union(id, other);
        }

        self.cells.entry((cx, cy)).or_default().push(id);
        id
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a] = b;
        }
    }
}

/// Node id of every vertex, per feature
fn feature_nodes(features: &[LineFeature], tolerance: f64) -> Vec<Vec<usize>> {
    let mut snapper = NodeSnapper::new(tolerance);
    let vertices: Vec<Vec<usize>> = features
        .iter()
        .map(|f| f.line.coords().map(|c| snapper.insert(*c)).collect())
        .collect();

    vertices
        .into_iter()
        .map(|ids| ids.into_iter().map(|id| snapper.find(id)).collect())
        .collect()
}

/// Number of distinct features touching each node
fn node_incidence(nodes: &[Vec<usize>]) -> HashMap<usize, usize> {
    let mut incidence = HashMap::new();
    for feature in nodes {
        let distinct: HashSet<usize> = feature.iter().copied().collect();
        for node in distinct {
            *incidence.entry(node).or_insert(0) += 1;
        }
    }
    incidence
}

fn is_dangle(nodes: &[usize], incidence: &HashMap<usize, usize>) -> bool {
    let (Some(start), Some(end)) = (nodes.first(), nodes.last()) else {
        return false;
    };
    if start == end {
        return false;
    }
    let free = |node: &usize| incidence.get(node).copied().unwrap_or(0) <= 1;
    free(start) || free(end)
}

fn check_tolerance(tolerance: f64) -> Result<(), DriverError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(DriverError::Initialization(format!(
            "snap tolerance must be a positive distance, got {}",
            tolerance
        )))
    }
}

/// Delete every dangling feature shorter than `threshold`, repeating until
/// the deletions expose no further short dangle.
pub fn trim_dangles(
    features: Vec<LineFeature>,
    threshold: f64,
    tolerance: f64,
) -> Result<TrimOutcome, DriverError> {
    check_tolerance(tolerance)?;

    let mut kept = features;
    let mut removed = 0;
    let mut sweeps = 0;

    loop {
        let nodes = feature_nodes(&kept, tolerance);
        let incidence = node_incidence(&nodes);
        let before = kept.len();
        kept = kept
            .into_iter()
            .zip(&nodes)
            .filter(|(f, n)| !(f.length() < threshold && is_dangle(n, &incidence)))
            .map(|(f, _)| f)
            .collect();
        sweeps += 1;

        let deleted = before - kept.len();
        if deleted == 0 {
            break;
        }
        removed += deleted;
    }

    Ok(TrimOutcome {
        kept,
        removed,
        sweeps,
    })
}

fn positions_to_line(positions: &[Vec<f64>]) -> Result<LineString<f64>, DriverError> {
    if positions.len() < 2 {
        return Err(DriverError::Rejected(format!(
            "line with {} vertices",
            positions.len()
        )));
    }
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(DriverError::Rejected(format!("invalid position {:?}", p))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn geometry_name(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Parse a GeoJSON feature collection into line features
pub fn parse_lines(content: &str) -> Result<Vec<LineFeature>, DriverError> {
    let geojson = GeoJson::from_str(content)
        .map_err(|e| DriverError::Rejected(format!("not a GeoJSON dataset: {}", e)))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(DriverError::Rejected(
            "expected a FeatureCollection".to_string(),
        ));
    };

    let mut lines = Vec::new();
    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            return Err(DriverError::Rejected("feature without geometry".to_string()));
        };
        match geometry.value {
            Value::LineString(positions) => lines.push(LineFeature {
                line: positions_to_line(&positions)?,
                id: feature.id,
                properties: feature.properties,
            }),
            // Multipart features are exploded so each part is judged on its own ends
            Value::MultiLineString(parts) => {
                for positions in parts {
                    lines.push(LineFeature {
                        line: positions_to_line(&positions)?,
                        id: None,
                        properties: feature.properties.clone(),
                    });
                }
            }
            other => {
                return Err(DriverError::Rejected(format!(
                    "unsupported geometry type {}",
                    geometry_name(&other)
                )))
            }
        }
    }
    Ok(lines)
}

/// Serialize line features back into a GeoJSON feature collection
pub fn to_geojson(features: &[LineFeature]) -> GeoJson {
    let features = features
        .iter()
        .map(|f| Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::LineString(
                f.line.coords().map(|c| vec![c.x, c.y]).collect(),
            ))),
            id: f.id.clone(),
            properties: f.properties.clone(),
            foreign_members: None,
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn read_lines(path: &Path) -> Result<Vec<LineFeature>, DriverError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DriverError::Execution(format!("Cannot read {}: {}", path.display(), e))
    })?;
    parse_lines(&content)
}

pub fn write_lines(path: &Path, features: &[LineFeature]) -> Result<(), DriverError> {
    std::fs::write(path, to_geojson(features).to_string()).map_err(|e| {
        DriverError::Execution(format!("Cannot write {}: {}", path.display(), e))
    })
}

/// Native [`GeometryEngine`] trimming GeoJSON line datasets in place
#[derive(Debug, Clone)]
pub struct GeoLineEngine {
    /// Distance under which two vertices are considered the same node
    snap_tolerance: f64,
}

impl GeoLineEngine {
    pub const DATASET_EXTENSION: &'static str = "geojson";

    pub fn new(snap_tolerance: f64) -> Result<Self, DriverError> {
        check_tolerance(snap_tolerance)?;
        Ok(Self { snap_tolerance })
    }

    pub fn snap_tolerance(&self) -> f64 {
        self.snap_tolerance
    }
}

impl Default for GeoLineEngine {
    fn default() -> Self {
        Self {
            snap_tolerance: 0.001,
        }
    }
}

impl GeometryEngine for GeoLineEngine {
    fn trim_line(
        &self,
        request: &TrimLineRequest,
        _cancel: &Cancellation,
    ) -> Result<TrimReport, DriverError> {
        request.source().validate()?;
        let features = read_lines(&request.features)?;

        // Without DELETE_SHORT nothing is removed: partial trimming is not modelled
        if !request.delete_shorts {
            return Ok(TrimReport::counted(0, features.len()));
        }

        let outcome = trim_dangles(
            features,
            request.dangle_length.to_meters(),
            self.snap_tolerance,
        )?;
        debug!(
            "Trimmed {} dangles below {} in {} sweeps",
            outcome.removed, request.dangle_length, outcome.sweeps
        );

        write_lines(&request.features, &outcome.kept)?;
        Ok(TrimReport::counted(outcome.removed, outcome.kept.len()))
    }

    fn dataset_extension(&self) -> Option<&'static str> {
        Some(Self::DATASET_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoreline_common::Distance;

    const TOL: f64 = 0.001;

    /// A long spine with a 2 m spur, and a 5 m spur carrying a 1 m twig
    fn branching_network() -> Vec<LineFeature> {
        vec![
            LineFeature::new(vec![[0.0, 0.0], [50.0, 0.0], [100.0, 0.0]]),
            LineFeature::new(vec![[100.0, 0.0], [200.0, 0.0]]),
            LineFeature::new(vec![[100.0, 0.0], [100.0, 2.0]]),
            LineFeature::new(vec![[50.0, 0.0], [50.0, 5.0]]),
            LineFeature::new(vec![[50.0, 5.0], [51.0, 5.0]]),
        ]
    }

    #[test]
    fn test_long_dangles_survive() {
        let outcome = trim_dangles(branching_network(), 3.0, TOL).unwrap();
        // The 100 m spine segments both dangle but are far above the threshold
        assert_eq!(outcome.kept.len(), 3);
        assert_eq!(outcome.removed, 2);
    }

    #[test]
    fn test_deletions_expose_new_dangles() {
        // Removing the 1 m twig leaves the 5 m spur dangling on its own
        let outcome = trim_dangles(branching_network(), 6.0, TOL).unwrap();
        assert_eq!(outcome.removed, 3);
        assert_eq!(outcome.sweeps, 3);
        assert!(outcome.kept.iter().all(|f| f.length() >= 100.0));
    }

    #[test]
    fn test_closed_rings_are_never_dangles() {
        let ring = LineFeature::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]);
        let outcome = trim_dangles(vec![ring.clone()], 9.0, TOL).unwrap();
        assert_eq!(outcome.kept, vec![ring]);
    }

    #[test]
    fn test_rejects_non_line_geometry() {
        let content = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1.0,2.0]}}
        ]}"#;
        assert!(matches!(parse_lines(content), Err(DriverError::Rejected(_))));
    }

    #[test]
    fn test_rejects_degenerate_lines() {
        let content = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[1.0,2.0]]}}
        ]}"#;
        assert!(matches!(parse_lines(content), Err(DriverError::Rejected(_))));
    }

    #[test]
    fn test_multilinestring_parts_are_exploded() {
        let content = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"grid_code":1},"geometry":{"type":"MultiLineString",
             "coordinates":[[[0.0,0.0],[1.0,0.0]],[[5.0,0.0],[9.0,0.0]]]}}
        ]}"#;
        let lines = parse_lines(content).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.properties.as_ref().unwrap()["grid_code"] == 1));
    }

    #[test]
    fn test_engine_rewrites_dataset_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code_shoreline0");
        write_lines(&path, &branching_network()).unwrap();

        let engine = GeoLineEngine::default();
        let mut remaining = Vec::new();
        for threshold in [3.0, 6.0, 9.0] {
            let report = engine
                .trim_line(
                    &TrimLineRequest {
                        features: path.clone(),
                        dangle_length: Distance::meters(threshold).unwrap(),
                        delete_shorts: true,
                    },
                    &Cancellation::new(),
                )
                .unwrap();
            remaining.push(report.remaining.unwrap());
        }

        assert_eq!(remaining, vec![3, 2, 2]);
        assert_eq!(read_lines(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_full_schedule_reaches_fixed_point() {
        let mut features = branching_network();
        for threshold in [3.0, 6.0, 9.0] {
            features = trim_dangles(features, threshold, TOL).unwrap().kept;
        }
        for threshold in [3.0, 6.0, 9.0] {
            let again = trim_dangles(features.clone(), threshold, TOL).unwrap();
            assert_eq!(again.removed, 0);
            assert_eq!(again.kept, features);
        }
    }

    #[test]
    fn test_vertices_straddling_a_cell_edge_share_a_node() {
        // 2 mm apart, but 100.049 / 0.1 and 100.051 / 0.1 round to different cells
        let network = vec![
            LineFeature::new(vec![[0.0, 0.0], [100.049, 0.0]]),
            LineFeature::new(vec![[100.051, 0.0], [102.049, 0.0]]),
            LineFeature::new(vec![[102.051, 0.0], [200.0, 0.0]]),
        ];

        let outcome = trim_dangles(network.clone(), 3.0, 0.1).unwrap();

        // The 2 m connector touches both long lines and is no dangle
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.kept, network);
    }

    #[test]
    fn test_snapping_is_transitive() {
        let nodes = feature_nodes(
            &[
                LineFeature::new(vec![[0.0, 0.0], [10.0, 0.0]]),
                LineFeature::new(vec![[10.08, 0.0], [20.0, 0.0]]),
                LineFeature::new(vec![[10.16, 0.0], [10.16, 5.0]]),
            ],
            0.1,
        );
        assert_eq!(nodes[0][1], nodes[1][0]);
        assert_eq!(nodes[1][0], nodes[2][0]);
        assert_ne!(nodes[0][0], nodes[1][1]);
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        for tolerance in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                GeoLineEngine::new(tolerance),
                Err(DriverError::Initialization(_))
            ));
            assert!(trim_dangles(branching_network(), 3.0, tolerance).is_err());
        }
        assert_eq!(GeoLineEngine::new(0.5).unwrap().snap_tolerance(), 0.5);
    }

    #[test]
    fn test_engine_requests_geojson_datasets() {
        assert_eq!(GeoLineEngine::default().dataset_extension(), Some("geojson"));
    }
}
