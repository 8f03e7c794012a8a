use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::event::Query;
use crate::sink::JsonSink;
use crate::transform::CrsTransformer;

/// Coordinate reference system identifier, e.g. `EPSG:4326` or the CRS84 URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs(pub String);

impl Crs {
    pub const CRS84: &'static str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self(Self::CRS84.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: &str, rel: &str) -> Self {
        Self {
            href: href.to_string(),
            rel: Some(rel.to_string()),
            media_type: None,
            title: None,
        }
    }

    pub fn with_media_type(mut self, media_type: &str) -> Self {
        self.media_type = Some(media_type.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// How value and object arrays are rendered: as JSON arrays, or as a
/// repeated field name per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    #[default]
    Array,
    Repeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// FeatureCollection envelope vs a single bare feature.
    #[serde(default = "default_true")]
    pub collection: bool,
    #[serde(default)]
    pub pretty: bool,
    /// Flattening separator; `None` keeps properties nested.
    #[serde(default)]
    pub flatten: Option<String>,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    /// Drop the primary geometry; the feature still carries `geometry:null`.
    #[serde(default)]
    pub suppress_geometry: bool,
    #[serde(default = "default_max_buffer_ops")]
    pub max_buffer_ops: usize,
    /// Feature types in scope for this request. Integer id coercion applies
    /// only when exactly one is.
    #[serde(default = "default_one")]
    pub feature_type_count: usize,
    /// Base URI for per-feature `self` links, `{base}/{id}`.
    #[serde(default)]
    pub item_link_base: Option<String>,
    /// Persistent-URI template with a `{{value}}` placeholder, emitted as a
    /// `canonical` link.
    #[serde(default)]
    pub canonical_uri_template: Option<String>,
    /// Link relations embedded features are allowed to emit.
    #[serde(default = "default_embedded_rels")]
    pub embedded_link_rels: Vec<String>,
    #[serde(default)]
    pub source_crs: Option<Crs>,
    #[serde(default)]
    pub target_crs: Option<Crs>,
    /// Fixed `timeStamp` override for deterministic output; now() otherwise.
    #[serde(skip)]
    pub timestamp: Option<time::OffsetDateTime>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_max_buffer_ops() -> usize {
    65_536
}

fn default_embedded_rels() -> Vec<String> {
    vec!["canonical".to_string()]
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            collection: true,
            pretty: false,
            flatten: None,
            multiplicity: Multiplicity::Array,
            suppress_geometry: false,
            max_buffer_ops: default_max_buffer_ops(),
            feature_type_count: 1,
            item_link_base: None,
            canonical_uri_template: None,
            embedded_link_rels: default_embedded_rels(),
            source_crs: None,
            target_crs: None,
            timestamp: None,
        }
    }
}

/// A not-yet-emitted output operation, queued while buffering.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Direct,
    Buffered,
}

/// Mutable state of one in-flight stream: the sink, the buffering mode with
/// its pending-op queue, link lists and the stream configuration. Created
/// per stream and discarded at completion or error.
pub struct EncodingContext {
    sink: Box<dyn JsonSink>,
    mode: WriteMode,
    pending: Vec<PendingOp>,
    pub config: EncodingConfig,
    pub query: Query,
    /// Caller-supplied collection links, consumed at collection-start.
    pub supplied_links: Vec<Link>,
    /// Caller-supplied per-feature links, cloned at each feature-start.
    pub supplied_feature_links: Vec<Link>,
    pub collection_links: Vec<Link>,
    pub feature_links: Vec<Link>,
    pub transformer: Option<Box<dyn CrsTransformer>>,
}

impl EncodingContext {
    pub fn new(sink: Box<dyn JsonSink>, config: EncodingConfig) -> Self {
        Self {
            sink,
            mode: WriteMode::Direct,
            pending: Vec::new(),
            config,
            query: Query::default(),
            supplied_links: Vec::new(),
            supplied_feature_links: Vec::new(),
            collection_links: Vec::new(),
            feature_links: Vec::new(),
            transformer: None,
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.mode == WriteMode::Buffered
    }

    pub fn start_buffering(&mut self) {
        tracing::debug!("output buffering engaged");
        self.mode = WriteMode::Buffered;
    }

    /// Back to direct writes. Queued operations stay put until
    /// [`flush_pending`](Self::flush_pending) replays them.
    pub fn stop_buffering(&mut self) {
        self.mode = WriteMode::Direct;
    }

    /// Replays the queued operations FIFO against the sink and clears the
    /// queue.
    pub fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(ops = self.pending.len(), "replaying buffered output");
        for op in std::mem::take(&mut self.pending) {
            match op {
                PendingOp::StartObject => self.sink.start_object()?,
                PendingOp::EndObject => self.sink.end_object()?,
                PendingOp::StartArray => self.sink.start_array()?,
                PendingOp::EndArray => self.sink.end_array()?,
                PendingOp::FieldName(name) => self.sink.field_name(&name)?,
                PendingOp::Str(value) => self.sink.string_value(&value)?,
                PendingOp::Int(value) => self.sink.int_value(value)?,
                PendingOp::Float(value) => self.sink.float_value(value)?,
                PendingOp::Bool(value) => self.sink.bool_value(value)?,
                PendingOp::Null => self.sink.null_value()?,
                PendingOp::Raw(token) => self.sink.raw_value(&token)?,
            }
        }
        Ok(())
    }

    fn queue(&mut self, op: PendingOp) -> Result<()> {
        if self.pending.len() >= self.config.max_buffer_ops {
            bail!(
                "feature output buffer exceeded {} operations",
                self.config.max_buffer_ops
            );
        }
        self.pending.push(op);
        Ok(())
    }

    pub fn start_object(&mut self) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.start_object(),
            WriteMode::Buffered => self.queue(PendingOp::StartObject),
        }
    }

    pub fn end_object(&mut self) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.end_object(),
            WriteMode::Buffered => self.queue(PendingOp::EndObject),
        }
    }

    pub fn start_array(&mut self) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.start_array(),
            WriteMode::Buffered => self.queue(PendingOp::StartArray),
        }
    }

    pub fn end_array(&mut self) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.end_array(),
            WriteMode::Buffered => self.queue(PendingOp::EndArray),
        }
    }

    pub fn field_name(&mut self, name: &str) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.field_name(name),
            WriteMode::Buffered => self.queue(PendingOp::FieldName(name.to_string())),
        }
    }

    pub fn string_value(&mut self, value: &str) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.string_value(value),
            WriteMode::Buffered => self.queue(PendingOp::Str(value.to_string())),
        }
    }

    pub fn int_value(&mut self, value: i64) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.int_value(value),
            WriteMode::Buffered => self.queue(PendingOp::Int(value)),
        }
    }

    pub fn float_value(&mut self, value: f64) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.float_value(value),
            WriteMode::Buffered => self.queue(PendingOp::Float(value)),
        }
    }

    pub fn bool_value(&mut self, value: bool) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.bool_value(value),
            WriteMode::Buffered => self.queue(PendingOp::Bool(value)),
        }
    }

    pub fn null_value(&mut self) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.null_value(),
            WriteMode::Buffered => self.queue(PendingOp::Null),
        }
    }

    pub fn raw_value(&mut self, token: &str) -> Result<()> {
        match self.mode {
            WriteMode::Direct => self.sink.raw_value(token),
            WriteMode::Buffered => self.queue(PendingOp::Raw(token.to_string())),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}
