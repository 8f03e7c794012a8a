use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaRef;

/// One structural token from the upstream feature reader. Events are
/// well-formed per feature, but the primary geometry is not guaranteed to
/// precede the other properties.
#[derive(Debug, Clone)]
pub enum FeatureEvent {
    CollectionStart {
        number_returned: Option<u64>,
        number_matched: Option<u64>,
    },
    FeatureStart,
    ObjectStart { schema: SchemaRef },
    ArrayStart { schema: SchemaRef },
    Value { schema: SchemaRef, value: Option<String> },
    ObjectEnd,
    ArrayEnd,
    FeatureEnd,
    CollectionEnd,
}

impl FeatureEvent {
    pub fn label(&self) -> &'static str {
        match self {
            FeatureEvent::CollectionStart { .. } => "collection-start",
            FeatureEvent::FeatureStart => "feature-start",
            FeatureEvent::ObjectStart { .. } => "object-start",
            FeatureEvent::ArrayStart { .. } => "array-start",
            FeatureEvent::Value { .. } => "value",
            FeatureEvent::ObjectEnd => "object-end",
            FeatureEvent::ArrayEnd => "array-end",
            FeatureEvent::FeatureEnd => "feature-end",
            FeatureEvent::CollectionEnd => "collection-end",
        }
    }
}

/// The consumed side of the feature-provider abstraction: an ordered event
/// sequence, `None` at end of stream.
pub trait EventSource {
    fn next_event(&mut self) -> Result<Option<FeatureEvent>>;
}

/// Paging parameters of the originating query, used for paging-link
/// computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Event source over an already collected sequence. Used in tests and for
/// canned responses.
pub struct VecSource {
    events: std::vec::IntoIter<FeatureEvent>,
}

impl VecSource {
    pub fn new(events: Vec<FeatureEvent>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

impl EventSource for VecSource {
    fn next_event(&mut self) -> Result<Option<FeatureEvent>> {
        Ok(self.events.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaNode, ValueType};

    #[test]
    fn vec_source_drains_in_order() {
        let schema = SchemaNode::value("name", ValueType::String).shared();
        let mut source = VecSource::new(vec![
            FeatureEvent::FeatureStart,
            FeatureEvent::Value {
                schema,
                value: Some("Foo".to_string()),
            },
            FeatureEvent::FeatureEnd,
        ]);

        assert_eq!(source.next_event().unwrap().unwrap().label(), "feature-start");
        assert_eq!(source.next_event().unwrap().unwrap().label(), "value");
        assert_eq!(source.next_event().unwrap().unwrap().label(), "feature-end");
        assert!(source.next_event().unwrap().is_none());
    }
}
