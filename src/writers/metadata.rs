use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{FeatureWriter, Next};
use crate::context::EncodingContext;

/// Collection metadata: `numberReturned`, `numberMatched` and a
/// second-precision `timeStamp`, positioned between the collection `type`
/// and the `features` array.
#[derive(Default)]
pub struct MetadataWriter;

impl MetadataWriter {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureWriter for MetadataWriter {
    fn priority(&self) -> u32 {
        20
    }

    fn on_collection_start(
        &mut self,
        ctx: &mut EncodingContext,
        number_returned: Option<u64>,
        number_matched: Option<u64>,
        next: Next<'_>,
    ) -> Result<()> {
        if !ctx.config.collection {
            return next(ctx);
        }
        if let Some(count) = number_returned {
            ctx.field_name("numberReturned")?;
            ctx.int_value(count as i64)?;
        }
        if let Some(count) = number_matched {
            ctx.field_name("numberMatched")?;
            ctx.int_value(count as i64)?;
        }
        let stamp = ctx
            .config
            .timestamp
            .unwrap_or_else(OffsetDateTime::now_utc)
            .replace_nanosecond(0)?;
        ctx.field_name("timeStamp")?;
        ctx.string_value(&stamp.format(&Rfc3339)?)?;
        next(ctx)
    }
}
