//! Streaming GeoJSON encoder for schema-described feature event streams.
//!
//! Feature events from a provider are pushed through an ordered chain of
//! writer stages that emit JSON tokens incrementally, with bounded buffering
//! to keep `geometry` in a fixed position regardless of upstream order.

pub mod context;
pub mod encoder;
pub mod event;
pub mod schema;
pub mod sink;
pub mod transform;
pub mod writers;

pub use context::{Crs, EncodingConfig, EncodingContext, Link, Multiplicity};
pub use encoder::GeoJsonEncoder;
pub use event::{EventSource, FeatureEvent, Query, VecSource};
pub use schema::{CoordDimension, GeometryType, Role, SchemaKind, SchemaNode, SchemaRef, ValueType};
pub use sink::{JsonSink, JsonTokenWriter};
pub use transform::{CrsTransformer, WebMercator, format_coordinate};
