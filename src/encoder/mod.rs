use anyhow::{Context, Result};

use crate::context::{EncodingConfig, EncodingContext, Link};
use crate::event::{EventSource, FeatureEvent, Query};
use crate::sink::{JsonSink, JsonTokenWriter};
use crate::transform::CrsTransformer;
use crate::writers::WriterPipeline;

/// Drives one forward pass over a feature event stream. Owns the per-stream
/// encoding context and a fresh writer chain; nothing is shared between
/// streams, so any number of encoders can run concurrently.
pub struct GeoJsonEncoder {
    ctx: EncodingContext,
    pipeline: WriterPipeline,
    features: u64,
}

impl GeoJsonEncoder {
    pub fn new(sink: Box<dyn JsonSink>, config: EncodingConfig) -> Self {
        Self {
            ctx: EncodingContext::new(sink, config),
            pipeline: WriterPipeline::standard(),
            features: 0,
        }
    }

    /// Convenience over [`new`](Self::new): a token writer over `writer`,
    /// compact or pretty per the configuration.
    pub fn for_writer<W: std::io::Write + 'static>(writer: W, config: EncodingConfig) -> Self {
        let sink: Box<dyn JsonSink> = if config.pretty {
            Box::new(JsonTokenWriter::pretty(writer))
        } else {
            Box::new(JsonTokenWriter::new(writer))
        };
        Self::new(sink, config)
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.ctx.query = query;
        self
    }

    /// Collection links offered by the request handler; the chain filters
    /// and serializes them.
    pub fn with_collection_links(mut self, links: Vec<Link>) -> Self {
        self.ctx.supplied_links = links;
        self
    }

    /// Links seeded onto every feature ahead of the id-derived entries.
    pub fn with_feature_links(mut self, links: Vec<Link>) -> Self {
        self.ctx.supplied_feature_links = links;
        self
    }

    pub fn with_transformer(mut self, transformer: Box<dyn CrsTransformer>) -> Self {
        self.ctx.transformer = Some(transformer);
        self
    }

    /// Consumes the source to end of stream, returning the feature count.
    /// Any sink or transform failure aborts immediately; bytes already
    /// written stay written.
    pub fn encode(&mut self, source: &mut dyn EventSource) -> Result<u64> {
        if self.ctx.transformer.is_some() {
            let source_crs = self.ctx.config.source_crs.as_ref().map(|c| c.0.as_str());
            let target_crs = self.ctx.config.target_crs.as_ref().map(|c| c.0.as_str());
            tracing::debug!(?source_crs, ?target_crs, "coordinate transform configured");
        }
        while let Some(event) = source.next_event().context("feature source failed")? {
            if matches!(event, FeatureEvent::FeatureStart) {
                self.features += 1;
            }
            self.pipeline
                .dispatch(&event, &mut self.ctx)
                .with_context(|| format!("encoding failed on {} event", event.label()))?;
        }
        self.ctx.flush().context("failed to flush sink")?;
        tracing::info!(features = self.features, "stream encoded");
        Ok(self.features)
    }
}
