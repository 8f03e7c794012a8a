use anyhow::Result;

use super::{FeatureWriter, Next};
use crate::context::{EncodingContext, Link};

/// Serializes the collection link list at collection-end and the feature
/// link list in each feature-end unwind, after `properties` has closed.
/// Collection links are seeded once from the caller-supplied list, minus
/// the `next` relation on the last page.
#[derive(Default)]
pub struct LinksWriter;

impl LinksWriter {
    pub fn new() -> Self {
        Self
    }
}

/// `links` array serialization, shared with the embedded-feature handling
/// in the properties writer.
pub(crate) fn write_link_array(ctx: &mut EncodingContext, links: &[Link]) -> Result<()> {
    ctx.field_name("links")?;
    ctx.start_array()?;
    for link in links {
        ctx.start_object()?;
        ctx.field_name("href")?;
        ctx.string_value(&link.href)?;
        if let Some(rel) = &link.rel {
            ctx.field_name("rel")?;
            ctx.string_value(rel)?;
        }
        if let Some(media_type) = &link.media_type {
            ctx.field_name("type")?;
            ctx.string_value(media_type)?;
        }
        if let Some(title) = &link.title {
            ctx.field_name("title")?;
            ctx.string_value(title)?;
        }
        ctx.end_object()?;
    }
    ctx.end_array()
}

impl FeatureWriter for LinksWriter {
    fn priority(&self) -> u32 {
        25
    }

    fn on_collection_start(
        &mut self,
        ctx: &mut EncodingContext,
        number_returned: Option<u64>,
        _number_matched: Option<u64>,
        next: Next<'_>,
    ) -> Result<()> {
        let last_page = match (number_returned, ctx.query.limit) {
            (Some(returned), Some(limit)) => returned < limit,
            _ => false,
        };
        let offset = ctx.query.offset;
        let supplied = std::mem::take(&mut ctx.supplied_links);
        ctx.collection_links = supplied
            .into_iter()
            .filter(|link| {
                let is_next = link.rel.as_deref() == Some("next");
                if is_next && last_page {
                    tracing::debug!(
                        href = %link.href,
                        ?offset,
                        "dropping next link on last page"
                    );
                }
                !(is_next && last_page)
            })
            .collect();
        next(ctx)
    }

    fn on_collection_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if ctx.config.collection && !ctx.collection_links.is_empty() {
            let links = std::mem::take(&mut ctx.collection_links);
            write_link_array(ctx, &links)?;
        }
        next(ctx)
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        ctx.feature_links = ctx.supplied_feature_links.clone();
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)?;
        if !ctx.feature_links.is_empty() {
            let links = std::mem::take(&mut ctx.feature_links);
            write_link_array(ctx, &links)?;
        }
        Ok(())
    }
}
