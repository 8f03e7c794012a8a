use anyhow::Result;

use crate::context::EncodingContext;
use crate::event::FeatureEvent;
use crate::schema::SchemaRef;

pub mod geometry;
pub mod id;
pub mod links;
pub mod metadata;
pub mod properties;
pub mod skeleton;

pub use self::geometry::GeometryWriter;
pub use self::id::IdWriter;
pub use self::links::LinksWriter;
pub use self::metadata::MetadataWriter;
pub use self::properties::PropertiesWriter;
pub use self::skeleton::SkeletonWriter;

/// Continuation into the rest of the chain. Every hook must call it exactly
/// once unless it deliberately short-circuits (none of the built-in writers
/// do); work before the call runs outer-to-inner, work after it unwinds
/// inner-to-outer.
pub type Next<'a> = &'a mut dyn FnMut(&mut EncodingContext) -> Result<()>;

/// One unit of the per-stream writer chain. Instances are created fresh per
/// stream and may keep private state scoped to it.
#[allow(unused_variables)]
pub trait FeatureWriter {
    /// Position in the chain; lower wraps outer.
    fn priority(&self) -> u32;

    fn on_collection_start(
        &mut self,
        ctx: &mut EncodingContext,
        number_returned: Option<u64>,
        number_matched: Option<u64>,
        next: Next<'_>,
    ) -> Result<()> {
        next(ctx)
    }

    fn on_collection_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)
    }

    fn on_object_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        next(ctx)
    }

    fn on_object_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)
    }

    fn on_array_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        next(ctx)
    }

    fn on_array_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        next(ctx)
    }

    fn on_value(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        value: Option<&str>,
        next: Next<'_>,
    ) -> Result<()> {
        next(ctx)
    }
}

/// The ordered writer chain for one stream.
pub struct WriterPipeline {
    writers: Vec<Box<dyn FeatureWriter>>,
}

impl WriterPipeline {
    pub fn new(mut writers: Vec<Box<dyn FeatureWriter>>) -> Self {
        writers.sort_by_key(|w| w.priority());
        Self { writers }
    }

    /// The full GeoJSON chain with fresh stage instances.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(SkeletonWriter::new()),
            Box::new(IdWriter::new()),
            Box::new(MetadataWriter::new()),
            Box::new(LinksWriter::new()),
            Box::new(GeometryWriter::new()),
            Box::new(PropertiesWriter::new()),
        ])
    }

    pub fn dispatch(&mut self, event: &FeatureEvent, ctx: &mut EncodingContext) -> Result<()> {
        dispatch_from(&mut self.writers, event, ctx)
    }
}

fn dispatch_from(
    writers: &mut [Box<dyn FeatureWriter>],
    event: &FeatureEvent,
    ctx: &mut EncodingContext,
) -> Result<()> {
    let Some((head, rest)) = writers.split_first_mut() else {
        return Ok(());
    };
    let mut next = |ctx: &mut EncodingContext| dispatch_from(rest, event, ctx);
    match event {
        FeatureEvent::CollectionStart {
            number_returned,
            number_matched,
        } => head.on_collection_start(ctx, *number_returned, *number_matched, &mut next),
        FeatureEvent::FeatureStart => head.on_feature_start(ctx, &mut next),
        FeatureEvent::ObjectStart { schema } => head.on_object_start(ctx, schema, &mut next),
        FeatureEvent::ArrayStart { schema } => head.on_array_start(ctx, schema, &mut next),
        FeatureEvent::Value { schema, value } => {
            head.on_value(ctx, schema, value.as_deref(), &mut next)
        }
        FeatureEvent::ObjectEnd => head.on_object_end(ctx, &mut next),
        FeatureEvent::ArrayEnd => head.on_array_end(ctx, &mut next),
        FeatureEvent::FeatureEnd => head.on_feature_end(ctx, &mut next),
        FeatureEvent::CollectionEnd => head.on_collection_end(ctx, &mut next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EncodingConfig;
    use crate::sink::JsonTokenWriter;

    struct Recorder {
        priority: u32,
        log: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl FeatureWriter for Recorder {
        fn priority(&self) -> u32 {
            self.priority
        }

        fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("pre-{}", self.priority));
            next(ctx)?;
            self.log.borrow_mut().push(format!("post-{}", self.priority));
            Ok(())
        }
    }

    #[test]
    fn lower_priority_wraps_outer() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut pipeline = WriterPipeline::new(vec![
            Box::new(Recorder {
                priority: 40,
                log: log.clone(),
            }),
            Box::new(Recorder {
                priority: 0,
                log: log.clone(),
            }),
            Box::new(Recorder {
                priority: 10,
                log: log.clone(),
            }),
        ]);
        let sink = JsonTokenWriter::new(Vec::new());
        let mut ctx = EncodingContext::new(Box::new(sink), EncodingConfig::default());

        pipeline
            .dispatch(&FeatureEvent::FeatureStart, &mut ctx)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["pre-0", "pre-10", "pre-40", "post-40", "post-10", "post-0"]
        );
    }
}
