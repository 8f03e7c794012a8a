use anyhow::Result;

use super::{FeatureWriter, Next};
use crate::context::EncodingContext;

/// Outer envelope: the FeatureCollection object in collection mode, the
/// `{"type":"Feature"}` wrapper around every feature. The `features` array
/// opens only after the inner writers are done with collection-start, so the
/// collection metadata lands before it.
#[derive(Default)]
pub struct SkeletonWriter;

impl SkeletonWriter {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureWriter for SkeletonWriter {
    fn priority(&self) -> u32 {
        0
    }

    fn on_collection_start(
        &mut self,
        ctx: &mut EncodingContext,
        _number_returned: Option<u64>,
        _number_matched: Option<u64>,
        next: Next<'_>,
    ) -> Result<()> {
        if !ctx.config.collection {
            return next(ctx);
        }
        ctx.start_object()?;
        ctx.field_name("type")?;
        ctx.string_value("FeatureCollection")?;
        next(ctx)?;
        ctx.field_name("features")?;
        ctx.start_array()
    }

    fn on_collection_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if !ctx.config.collection {
            return next(ctx);
        }
        ctx.end_array()?;
        next(ctx)?;
        ctx.end_object()
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        ctx.start_object()?;
        ctx.field_name("type")?;
        ctx.string_value("Feature")?;
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)?;
        ctx.end_object()
    }
}
