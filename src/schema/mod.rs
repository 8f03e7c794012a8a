use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handle to an immutable schema node. Nodes are built once per
/// collection configuration and outlive any single stream.
pub type SchemaRef = Arc<SchemaNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Value,
    ValueArray,
    Object,
    ObjectArray,
    FeatureRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Regular,
    Id,
    EmbeddedId,
    PrimaryGeometry,
    SecondaryGeometry,
    EmbeddedFeature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryType {
    pub fn geojson_name(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::LineString => "LineString",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPolygon => "MultiPolygon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordDimension {
    Xy,
    Xyz,
}

impl CoordDimension {
    pub fn size(&self) -> usize {
        match self {
            CoordDimension::Xy => 2,
            CoordDimension::Xyz => 3,
        }
    }
}

/// Description of one feature attribute. Instances are read-only and shared
/// across many feature instances via [`SchemaRef`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: SchemaKind,
    pub value_type: ValueType,
    pub role: Role,
    #[serde(default)]
    pub geometry_type: Option<GeometryType>,
    #[serde(default = "default_dimension")]
    pub dimension: CoordDimension,
    #[serde(default)]
    pub temporal: bool,
    #[serde(default)]
    pub path: Vec<String>,
}

fn default_dimension() -> CoordDimension {
    CoordDimension::Xy
}

impl SchemaNode {
    fn node(name: &str, kind: SchemaKind, value_type: ValueType, role: Role) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value_type,
            role,
            geometry_type: None,
            dimension: CoordDimension::Xy,
            temporal: false,
            path: vec![name.to_string()],
        }
    }

    pub fn value(name: &str, value_type: ValueType) -> Self {
        Self::node(name, SchemaKind::Value, value_type, Role::Regular)
    }

    pub fn value_array(name: &str, value_type: ValueType) -> Self {
        Self::node(name, SchemaKind::ValueArray, value_type, Role::Regular)
    }

    pub fn object(name: &str) -> Self {
        Self::node(name, SchemaKind::Object, ValueType::Unknown, Role::Regular)
    }

    pub fn object_array(name: &str) -> Self {
        Self::node(name, SchemaKind::ObjectArray, ValueType::Unknown, Role::Regular)
    }

    pub fn id(name: &str, value_type: ValueType) -> Self {
        Self::node(name, SchemaKind::Value, value_type, Role::Id)
    }

    pub fn embedded_id(name: &str, value_type: ValueType) -> Self {
        Self::node(name, SchemaKind::Value, value_type, Role::EmbeddedId)
    }

    pub fn primary_geometry(name: &str, geometry_type: GeometryType) -> Self {
        let mut node = Self::node(name, SchemaKind::Object, ValueType::Float, Role::PrimaryGeometry);
        node.geometry_type = Some(geometry_type);
        node
    }

    pub fn secondary_geometry(name: &str, geometry_type: GeometryType) -> Self {
        let mut node = Self::node(name, SchemaKind::Object, ValueType::Float, Role::SecondaryGeometry);
        node.geometry_type = Some(geometry_type);
        node
    }

    pub fn embedded_feature(name: &str) -> Self {
        Self::node(name, SchemaKind::FeatureRef, ValueType::Unknown, Role::EmbeddedFeature)
    }

    pub fn with_dimension(mut self, dimension: CoordDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_path(mut self, path: &[&str]) -> Self {
        self.path = path.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn temporal(mut self) -> Self {
        self.temporal = true;
        self
    }

    pub fn is_spatial(&self) -> bool {
        self.geometry_type.is_some()
    }

    pub fn is_primary_geometry(&self) -> bool {
        self.role == Role::PrimaryGeometry
    }

    pub fn is_id(&self) -> bool {
        self.role == Role::Id
    }

    /// Path segments joined with the flattening separator.
    pub fn flattened_name(&self, separator: &str) -> String {
        self.path.join(separator)
    }

    pub fn shared(self) -> SchemaRef {
        Arc::new(self)
    }
}
