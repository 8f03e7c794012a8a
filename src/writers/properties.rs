use anyhow::Result;

use super::links::write_link_array;
use super::{FeatureWriter, Next};
use crate::context::{EncodingContext, Link, Multiplicity};
use crate::schema::{Role, SchemaKind, SchemaNode, SchemaRef, ValueType};

#[derive(Debug)]
enum ContainerKind {
    Object,
    Array { index: usize },
    /// Boundary of an embedded feature; flattening paths restart behind it.
    Embedded,
}

#[derive(Debug)]
struct Container {
    name: String,
    kind: ContainerKind,
}

/// Per-feature (top-level or embedded) output state.
#[derive(Debug, Default)]
struct Frame {
    properties_open: bool,
    id_written: bool,
    pending_id: Option<String>,
    links: Vec<Link>,
}

/// Builds the `properties` object from the non-id, non-primary-geometry
/// events: nested objects and arrays in event order, optional flattening to
/// separator-joined keys, and recursive embedded features, each resolving
/// its own `properties`, id and links on an explicit frame stack.
pub struct PropertiesWriter {
    frames: Vec<Frame>,
    containers: Vec<Container>,
    /// Open containers inside the primary geometry subtree, which belongs
    /// to the geometry writer.
    skip_depth: u32,
}

impl PropertiesWriter {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            containers: Vec::new(),
            skip_depth: 0,
        }
    }

    fn ensure_properties_open(&mut self, ctx: &mut EncodingContext) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if !frame.properties_open {
            ctx.field_name("properties")?;
            ctx.start_object()?;
            frame.properties_open = true;
        }
        Ok(())
    }

    fn current_array_index(&self) -> Option<usize> {
        match self.containers.last() {
            Some(Container {
                kind: ContainerKind::Array { index },
                ..
            }) => Some(*index),
            _ => None,
        }
    }

    fn bump_parent_index(&mut self) {
        if let Some(Container {
            kind: ContainerKind::Array { index },
            ..
        }) = self.containers.last_mut()
        {
            *index += 1;
        }
    }

    /// Separator-joined key from the containers of the current frame plus
    /// the given leaf segment.
    fn flat_key(&self, separator: &str, leaf: &str) -> String {
        let mut segments = Vec::new();
        for container in self.containers.iter().rev() {
            if matches!(container.kind, ContainerKind::Embedded) {
                break;
            }
            segments.push(container.name.as_str());
        }
        segments.reverse();
        segments.push(leaf);
        segments.join(separator)
    }

    /// Emits the key for a node in the current position: flattened,
    /// unnamed inside a plain array, the array name again in repeat mode,
    /// the node name everywhere else.
    fn write_key(&mut self, ctx: &mut EncodingContext, name: &str) -> Result<()> {
        if let Some(separator) = ctx.config.flatten.clone() {
            let leaf = match self.current_array_index() {
                Some(index) => (index + 1).to_string(),
                None => name.to_string(),
            };
            let key = self.flat_key(&separator, &leaf);
            return ctx.field_name(&key);
        }
        match self.containers.last() {
            Some(Container {
                kind: ContainerKind::Array { .. },
                name: array_name,
            }) => match ctx.config.multiplicity {
                Multiplicity::Array => Ok(()),
                Multiplicity::Repeat => {
                    let repeated = array_name.clone();
                    ctx.field_name(&repeated)
                }
            },
            _ => ctx.field_name(name),
        }
    }

    fn open_embedded(&mut self, ctx: &mut EncodingContext, schema: &SchemaNode) -> Result<()> {
        self.ensure_properties_open(ctx)?;
        self.write_key(ctx, &schema.name)?;
        ctx.start_object()?;
        ctx.field_name("type")?;
        ctx.string_value("Feature")?;
        self.containers.push(Container {
            name: schema.name.clone(),
            kind: ContainerKind::Embedded,
        });
        self.frames.push(Frame::default());
        tracing::debug!(name = %schema.name, depth = self.frames.len(), "embedded feature opened");
        Ok(())
    }

    fn close_embedded(&mut self, ctx: &mut EncodingContext) -> Result<()> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        if frame.properties_open {
            ctx.end_object()?;
        } else {
            ctx.field_name("properties")?;
            ctx.null_value()?;
        }
        let allowed: Vec<Link> = frame
            .links
            .into_iter()
            .filter(|link| match link.rel.as_deref() {
                Some(rel) => ctx.config.embedded_link_rels.iter().any(|a| a == rel),
                None => false,
            })
            .collect();
        if !allowed.is_empty() {
            write_link_array(ctx, &allowed)?;
        }
        if let Some(id) = frame.pending_id {
            ctx.field_name("id")?;
            ctx.string_value(&id)?;
        }
        ctx.end_object()?;
        self.bump_parent_index();
        Ok(())
    }

    fn embedded_id(&mut self, ctx: &mut EncodingContext, value: &str) -> Result<()> {
        if let Some(template) = &ctx.config.canonical_uri_template {
            let href = template.replace("{{value}}", value);
            if let Some(frame) = self.frames.last_mut() {
                frame.links.push(Link::new(&href, "canonical"));
            }
        }
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if frame.id_written {
            return Ok(());
        }
        if frame.properties_open {
            frame.pending_id = Some(value.to_string());
        } else {
            ctx.field_name("id")?;
            ctx.string_value(value)?;
        }
        frame.id_written = true;
        Ok(())
    }
}

impl Default for PropertiesWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureWriter for PropertiesWriter {
    fn priority(&self) -> u32 {
        40
    }

    fn on_feature_start(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        self.frames.clear();
        self.frames.push(Frame::default());
        self.containers.clear();
        self.skip_depth = 0;
        next(ctx)
    }

    fn on_object_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return next(ctx);
        }
        if schema.is_primary_geometry() {
            self.skip_depth = 1;
            return next(ctx);
        }
        if self.frames.is_empty() {
            return next(ctx);
        }
        if schema.role == Role::EmbeddedFeature || schema.kind == SchemaKind::FeatureRef {
            self.open_embedded(ctx, schema)?;
            return next(ctx);
        }
        self.ensure_properties_open(ctx)?;
        if ctx.config.flatten.is_some() {
            let label = match self.current_array_index() {
                Some(index) => (index + 1).to_string(),
                None => schema.name.clone(),
            };
            self.containers.push(Container {
                name: label,
                kind: ContainerKind::Object,
            });
        } else {
            self.write_key(ctx, &schema.name)?;
            ctx.start_object()?;
            self.containers.push(Container {
                name: schema.name.clone(),
                kind: ContainerKind::Object,
            });
        }
        next(ctx)
    }

    fn on_object_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return next(ctx);
        }
        match self.containers.pop() {
            Some(Container {
                kind: ContainerKind::Embedded,
                ..
            }) => {
                self.close_embedded(ctx)?;
            }
            Some(Container {
                kind: ContainerKind::Object,
                ..
            }) => {
                if ctx.config.flatten.is_none() {
                    ctx.end_object()?;
                }
                self.bump_parent_index();
            }
            Some(container) => {
                // array container closed by an object-end: upstream bug
                self.containers.push(container);
            }
            None => {}
        }
        next(ctx)
    }

    fn on_array_start(
        &mut self,
        ctx: &mut EncodingContext,
        schema: &SchemaRef,
        next: Next<'_>,
    ) -> Result<()> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return next(ctx);
        }
        if self.frames.is_empty() {
            return next(ctx);
        }
        self.ensure_properties_open(ctx)?;
        if ctx.config.flatten.is_none() && ctx.config.multiplicity == Multiplicity::Array {
            self.write_key(ctx, &schema.name)?;
            ctx.start_array()?;
        }
        self.containers.push(Container {
            name: schema.name.clone(),
            kind: ContainerKind::Array { index: 0 },
        });
        next(ctx)
    }

    fn on_array_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return next(ctx);
        }
        if let Some(Container {
            kind: ContainerKind::Array { .. },
            ..
        }) = self.containers.last()
        {
            self.containers.pop();
            if ctx.config.flatten.is_none() && ctx.config.multiplicity == Multiplicity::Array {
                ctx.end_array()?;
            }
            self.bump_parent_index();
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
        if self.skip_depth > 0 || self.frames.is_empty() {
            return next(ctx);
        }
        match schema.role {
            Role::Id | Role::PrimaryGeometry => return next(ctx),
            Role::EmbeddedId if self.frames.len() > 1 => {
                if let Some(id) = value {
                    self.embedded_id(ctx, id)?;
                }
                return next(ctx);
            }
            _ => {}
        }
        self.ensure_properties_open(ctx)?;
        self.write_key(ctx, &schema.name)?;
        write_typed_value(ctx, schema, value)?;
        self.bump_parent_index();
        next(ctx)
    }

    fn on_feature_end(&mut self, ctx: &mut EncodingContext, next: Next<'_>) -> Result<()> {
        if let Some(frame) = self.frames.pop() {
            if frame.properties_open {
                ctx.end_object()?;
            } else {
                ctx.field_name("properties")?;
                ctx.null_value()?;
            }
        }
        self.frames.clear();
        self.containers.clear();
        next(ctx)
    }
}

/// Scalar coercion per the schema value type; anything that fails a numeric
/// parse degrades to its string form.
fn write_typed_value(
    ctx: &mut EncodingContext,
    schema: &SchemaNode,
    value: Option<&str>,
) -> Result<()> {
    let Some(text) = value else {
        return ctx.null_value();
    };
    match schema.value_type {
        ValueType::Boolean => ctx.bool_value(parse_boolean(text)),
        ValueType::Integer => match text.trim().parse::<i64>() {
            Ok(number) => ctx.int_value(number),
            Err(_) => ctx.string_value(text),
        },
        ValueType::Float => match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => ctx.float_value(number),
            _ => ctx.string_value(text),
        },
        _ => ctx.string_value(text),
    }
}

fn parse_boolean(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "t" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EncodingConfig;
    use crate::sink::JsonTokenWriter;

    #[test]
    fn boolean_coercion_accepts_the_usual_spellings() {
        for text in ["t", "T", "true", "TRUE", "1"] {
            assert!(parse_boolean(text), "{} should be true", text);
        }
        for text in ["f", "false", "0", "yes", ""] {
            assert!(!parse_boolean(text), "{} should be false", text);
        }
    }

    #[test]
    fn numeric_coercion_falls_back_to_string() {
        let buffer = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl std::io::Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = JsonTokenWriter::new(Shared(buffer.clone()));
        let mut ctx = EncodingContext::new(Box::new(sink), EncodingConfig::default());

        let integer = SchemaNode::value("n", ValueType::Integer);
        let float = SchemaNode::value("x", ValueType::Float);
        ctx.start_array().unwrap();
        write_typed_value(&mut ctx, &integer, Some("42")).unwrap();
        write_typed_value(&mut ctx, &integer, Some("not-a-number")).unwrap();
        write_typed_value(&mut ctx, &float, Some("2.5")).unwrap();
        write_typed_value(&mut ctx, &float, Some("oops")).unwrap();
        write_typed_value(&mut ctx, &float, None).unwrap();
        ctx.end_array().unwrap();

        let out = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(out, r#"[42,"not-a-number",2.5,"oops",null]"#);
    }
}
