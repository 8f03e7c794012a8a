use anyhow::Result;

use super::{FeatureWriter, Next};
use crate::context::{EncodingContext, Link};
use crate::schema::{Role, SchemaRef, ValueType};

/// Writes the feature `id` exactly once, either inline (id arrived before
/// any other property output) or deferred to feature-end, and seeds the
/// `self`/`canonical` feature links for the link writer.
pub struct IdWriter {
    write_at_end: bool,
    pending: Option<(String, bool)>,
    id_written: bool,
}

impl IdWriter {
    pub fn new() -> Self {
        Self {
            write_at_end: false,
            pending: None,
            id_written: false,
        }
    }

    fn write_id(&mut self, ctx: &mut EncodingContext, value: &str, as_integer: bool) -> Result<()> {
        ctx.field_name("id")?;
        match value.parse::<i64>() {
            Ok(number) if as_integer => ctx.int_value(number)?,
            _ => ctx.string_value(value)?,
        }
        self.id_written = true;
        Ok(())
    }

    fn seed_links(&self, ctx: &mut EncodingContext, id: &str) {
        if let Some(base) = &ctx.config.item_link_base {
            let href = format!("{}/{}", base.trim_end_matches('/'), id);
            ctx.feature_links
                .push(Link::new(&href, "self").with_media_type("application/geo+json"));
        }
        if let Some(template) = &ctx.config.canonical_uri_template {
            let href = template.replace("{{value}}", id);
            ctx.feature_links.push(Link::new(&href, "canonical"));
        }
    }

    // Any properties-bound event observed before the id means a top-level
    // `id` token can no longer be placed; from then on it is held back until
    // the feature-end unwind.
    fn note_property_output(&mut self) {
        if !self.id_written && self.pending.is_none() {
            self.write_at_end = true;
        }
    }
}

impl Default for IdWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureWriter for IdWriter {
    fn priority(&self) -> u32 {
        10
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        self.write_at_end = false;
        self.pending = None;
        self.id_written = false;
        next(ctx)
    }

    fn on_object_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if !schema.is_primary_geometry() {
            self.note_property_output();
        }
        next(ctx)
    }

    fn on_array_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if !schema.is_primary_geometry() {
            self.note_property_output();
        }
        next(ctx)
    }

    fn on_value(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        value: Option<&str>,
        next: Next<'_>,
    ) -> Result<()> {
        match schema.role {
            Role::Id => {
                if let Some(id) = value {
                    if !self.id_written && self.pending.is_none() {
                        let as_integer = schema.value_type == ValueType::Integer
                            && ctx.config.feature_type_count == 1;
                        if self.write_at_end {
                            self.pending = Some((id.to_string(), as_integer));
                        } else {
                            self.write_id(ctx, id, as_integer)?;
                        }
                        self.seed_links(ctx, id);
                    }
                }
            }
            Role::PrimaryGeometry => {}
            _ => self.note_property_output(),
        }
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)?;
        if let Some((id, as_integer)) = self.pending.take() {
            self.write_id(ctx, &id, as_integer)?;
        }
        Ok(())
    }
}
