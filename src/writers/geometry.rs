use anyhow::{Context, Result, bail};

use super::{FeatureWriter, Next};
use crate::context::EncodingContext;
use crate::schema::SchemaRef;
use crate::transform::format_coordinate;

/// Owns the ordering guarantee of the pipeline. Output between a feature's
/// first structural event and the primary geometry is held in the context's
/// pending queue; the geometry itself is written straight to the sink and
/// the queue is replayed right after it closes, so `geometry` always lands
/// directly behind `type` (and an early id). Coordinates are collected one
/// tuple at a time for the CRS transform and emitted as raw numbers with
/// fixed 7-decimal formatting. A feature that never opens its primary
/// geometry gets `geometry:null` at feature-end, ahead of the replay.
pub struct GeometryWriter {
    in_feature: bool,
    buffer_engaged: bool,
    /// Geometry decision made and pending queue replayed.
    decided: bool,
    in_geometry: bool,
    suppressed: bool,
    depth: u32,
    dimension: usize,
    tuple: Vec<f64>,
    coords_written: bool,
}

impl GeometryWriter {
    pub fn new() -> Self {
        Self {
            in_feature: false,
            buffer_engaged: false,
            decided: false,
            in_geometry: false,
            suppressed: false,
            depth: 0,
            dimension: 2,
            tuple: Vec::with_capacity(3),
            coords_written: false,
        }
    }

    fn engage_buffer(&mut self, ctx: &mut EncodingContext) {
        if self.in_feature && !self.in_geometry && !self.decided && !self.buffer_engaged {
            ctx.start_buffering();
            self.buffer_engaged = true;
        }
    }

    fn flush_tuple(&mut self, ctx: &mut EncodingContext) -> Result<()> {
        if self.tuple.is_empty() {
            return Ok(());
        }
        if let Some(transformer) = ctx.transformer.as_ref() {
            transformer
                .transform(&mut self.tuple)
                .context("coordinate transform failed")?;
        }
        ctx.start_array()?;
        for value in &self.tuple {
            if !value.is_finite() {
                bail!("non-finite coordinate after transform");
            }
            ctx.raw_value(&format_coordinate(*value))?;
        }
        ctx.end_array()?;
        self.tuple.clear();
        self.coords_written = true;
        Ok(())
    }
}

impl Default for GeometryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureWriter for GeometryWriter {
    fn priority(&self) -> u32 {
        30
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        self.in_feature = true;
        self.buffer_engaged = false;
        self.decided = false;
        self.in_geometry = false;
        self.suppressed = false;
        self.depth = 0;
        self.tuple.clear();
        next(ctx)
    }

    fn on_object_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if self.in_geometry {
            self.depth += 1;
            return next(ctx);
        }
        if self.in_feature && schema.is_primary_geometry() && !self.decided {
            self.in_geometry = true;
            self.depth = 1;
            self.suppressed = ctx.config.suppress_geometry;
            self.dimension = schema.dimension.size();
            self.coords_written = false;
            if !self.suppressed {
                let Some(geometry_type) = schema.geometry_type else {
                    bail!("spatial node '{}' carries no geometry type", schema.name);
                };
                ctx.stop_buffering();
                ctx.field_name("geometry")?;
                ctx.start_object()?;
                ctx.field_name("type")?;
                ctx.string_value(geometry_type.geojson_name())?;
                ctx.field_name("coordinates")?;
                tracing::debug!(name = %schema.name, "primary geometry opened, buffering released");
            }
            return next(ctx);
        }
        self.engage_buffer(ctx);
        next(ctx)
    }

    fn on_array_start(
        &mut self,
        ctx: &mut EncodingContext,
        _schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if self.in_geometry {
            self.depth += 1;
            if !self.suppressed {
                ctx.start_array()?;
                self.coords_written = true;
            }
            return next(ctx);
        }
        self.engage_buffer(ctx);
        next(ctx)
    }

    fn on_value(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        value: Option<&str>,
        next: Next<'_>,
    ) -> Result<()> {
        if self.in_geometry {
            if !self.suppressed {
                let Some(text) = value else {
                    bail!("null coordinate in geometry '{}'", schema.name);
                };
                let number: f64 = text
                    .trim()
                    .parse()
                    .with_context(|| format!("coordinate '{}' is not numeric", text))?;
                self.tuple.push(number);
                if self.tuple.len() == self.dimension {
                    self.flush_tuple(ctx)?;
                }
            }
            return next(ctx);
        }
        self.engage_buffer(ctx);
        next(ctx)
    }

    fn on_array_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if self.in_geometry {
            self.depth -= 1;
            if !self.suppressed {
                self.flush_tuple(ctx)?;
                ctx.end_array()?;
            }
        }
        next(ctx)
    }

    fn on_object_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if self.in_geometry {
            self.depth -= 1;
            if self.depth == 0 {
                self.in_geometry = false;
                if !self.suppressed {
                    self.flush_tuple(ctx)?;
                    if !self.coords_written {
                        // geometry opened but delivered no positions
                        ctx.start_array()?;
                        ctx.end_array()?;
                    }
                    ctx.end_object()?;
                    ctx.flush_pending()?;
                    self.decided = true;
                }
            }
        }
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if self.in_feature && !self.decided {
            ctx.stop_buffering();
            ctx.field_name("geometry")?;
            ctx.null_value()?;
            ctx.flush_pending()?;
            self.decided = true;
            tracing::debug!("feature closed without primary geometry");
        }
        self.in_feature = false;
        next(ctx)
    }
}
