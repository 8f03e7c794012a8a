use std::io::Write;
use std::sync::{Arc, Mutex};

use featstream::{
    CoordDimension, EncodingConfig, FeatureEvent, GeoJsonEncoder, GeometryType, JsonTokenWriter,
    Multiplicity, SchemaNode, SchemaRef, ValueType, VecSource, WebMercator,
};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn value(schema: &SchemaRef, text: &str) -> FeatureEvent {
    FeatureEvent::Value {
        schema: schema.clone(),
        value: Some(text.to_string()),
    }
}

fn object_start(schema: &SchemaRef) -> FeatureEvent {
    FeatureEvent::ObjectStart {
        schema: schema.clone(),
    }
}

fn array_start(schema: &SchemaRef) -> FeatureEvent {
    FeatureEvent::ArrayStart {
        schema: schema.clone(),
    }
}

fn single_feature_config() -> EncodingConfig {
    EncodingConfig {
        collection: false,
        ..EncodingConfig::default()
    }
}

fn try_encode(
    events: Vec<FeatureEvent>,
    config: EncodingConfig,
    customize: impl FnOnce(GeoJsonEncoder) -> GeoJsonEncoder,
) -> anyhow::Result<String> {
    let buffer = SharedBuffer::default();
    let sink = JsonTokenWriter::new(buffer.clone());
    let mut encoder = customize(GeoJsonEncoder::new(Box::new(sink), config));
    encoder.encode(&mut VecSource::new(events))?;
    Ok(String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap())
}

fn encode(events: Vec<FeatureEvent>, config: EncodingConfig) -> String {
    try_encode(events, config, |encoder| encoder).unwrap()
}

fn point_geometry(schema: &SchemaRef, x: &str, y: &str) -> Vec<FeatureEvent> {
    vec![
        object_start(schema),
        value(schema, x),
        value(schema, y),
        FeatureEvent::ObjectEnd,
    ]
}

#[test]
fn late_geometry_stream_produces_exact_bytes() {
    let id = SchemaNode::id("fid", ValueType::String).shared();
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();
    let name = SchemaNode::value("name", ValueType::String).shared();

    let mut events = vec![FeatureEvent::FeatureStart, value(&id, "A")];
    events.extend(point_geometry(&geom, "1.23456789", "4.98765432"));
    events.push(value(&name, "Foo"));
    events.push(FeatureEvent::FeatureEnd);

    let out = encode(events, single_feature_config());
    assert_eq!(
        out,
        r#"{"type":"Feature","id":"A","geometry":{"type":"Point","coordinates":[1.2345679,4.9876543]},"properties":{"name":"Foo"}}"#
    );
}

#[test]
fn geometry_after_properties_keeps_fixed_order() {
    let id = SchemaNode::id("fid", ValueType::Integer).shared();
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();
    let name = SchemaNode::value("name", ValueType::String).shared();

    let mut events = vec![
        FeatureEvent::FeatureStart,
        value(&id, "7"),
        value(&name, "Foo"),
    ];
    events.extend(point_geometry(&geom, "8.5", "47.25"));
    events.push(FeatureEvent::FeatureEnd);

    let config = EncodingConfig {
        collection: false,
        item_link_base: Some("https://api.example.com/collections/parks/items".to_string()),
        ..EncodingConfig::default()
    };
    let out = encode(events, config);

    assert_eq!(
        out,
        "{\"type\":\"Feature\",\"id\":7,\
         \"geometry\":{\"type\":\"Point\",\"coordinates\":[8.5,47.25]},\
         \"properties\":{\"name\":\"Foo\"},\
         \"links\":[{\"href\":\"https://api.example.com/collections/parks/items/7\",\
         \"rel\":\"self\",\"type\":\"application/geo+json\"}]}"
    );
}

#[test]
fn missing_geometry_becomes_null_without_leaking_into_properties() {
    let id = SchemaNode::id("fid", ValueType::String).shared();
    let name = SchemaNode::value("name", ValueType::String).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            value(&id, "A"),
            value(&name, "Foo"),
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","id":"A","geometry":null,"properties":{"name":"Foo"}}"#
    );
}

#[test]
fn feature_without_any_properties_gets_null_properties() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();

    let mut events = vec![FeatureEvent::FeatureStart];
    events.extend(point_geometry(&geom, "1", "2"));
    events.push(FeatureEvent::FeatureEnd);

    let out = encode(events, single_feature_config());
    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":null}"#
    );
}

#[test]
fn integer_id_depends_on_feature_type_count() {
    let id = SchemaNode::id("fid", ValueType::Integer).shared();
    let events = vec![
        FeatureEvent::FeatureStart,
        value(&id, "42"),
        FeatureEvent::FeatureEnd,
    ];

    let single = encode(events.clone(), single_feature_config());
    assert!(single.contains(r#""id":42"#), "single type: {}", single);

    let config = EncodingConfig {
        collection: false,
        feature_type_count: 2,
        ..EncodingConfig::default()
    };
    let multi = encode(events, config);
    assert!(multi.contains(r#""id":"42""#), "multiple types: {}", multi);
}

#[test]
fn id_after_other_scalars_is_deferred_to_feature_end() {
    let id = SchemaNode::id("fid", ValueType::String).shared();
    let name = SchemaNode::value("name", ValueType::String).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            value(&name, "Foo"),
            value(&id, "A"),
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    // the id still appears exactly once, at the top level, after properties
    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"name":"Foo"},"id":"A"}"#
    );
}

#[test]
fn embedded_features_nest_recursively() {
    let unit = SchemaNode::embedded_feature("unit").shared();
    let unit_id = SchemaNode::embedded_id("uid", ValueType::String).shared();
    let label = SchemaNode::value("label", ValueType::String).shared();
    let operator = SchemaNode::embedded_feature("operator").shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&unit),
            value(&unit_id, "u1"),
            value(&label, "Unit 1"),
            object_start(&operator),
            FeatureEvent::ObjectEnd,
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        "{\"type\":\"Feature\",\"geometry\":null,\"properties\":{\
         \"unit\":{\"type\":\"Feature\",\"id\":\"u1\",\"properties\":{\
         \"label\":\"Unit 1\",\
         \"operator\":{\"type\":\"Feature\",\"properties\":null}}}}}"
    );
}

#[test]
fn nested_objects_and_arrays_follow_event_order() {
    let addr = SchemaNode::object("address").shared();
    let street = SchemaNode::value("street", ValueType::String).shared();
    let floors = SchemaNode::value_array("floors", ValueType::Integer).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&addr),
            value(&street, "Main St"),
            FeatureEvent::ObjectEnd,
            array_start(&floors),
            value(&floors, "1"),
            value(&floors, "2"),
            FeatureEvent::ArrayEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"address":{"street":"Main St"},"floors":[1,2]}}"#
    );
}

#[test]
fn flattening_linearizes_keys_with_indices() {
    let addr = SchemaNode::object("address").shared();
    let street = SchemaNode::value("street", ValueType::String).shared();
    let tags = SchemaNode::value_array("tags", ValueType::String).shared();

    let config = EncodingConfig {
        collection: false,
        flatten: Some(".".to_string()),
        ..EncodingConfig::default()
    };
    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&addr),
            value(&street, "Main St"),
            FeatureEvent::ObjectEnd,
            array_start(&tags),
            value(&tags, "a"),
            value(&tags, "b"),
            FeatureEvent::ArrayEnd,
            FeatureEvent::FeatureEnd,
        ],
        config,
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"address.street":"Main St","tags.1":"a","tags.2":"b"}}"#
    );
}

#[test]
fn flattened_object_arrays_number_their_elements() {
    let rooms = SchemaNode::object_array("rooms").shared();
    let room = SchemaNode::object("rooms").shared();
    let area = SchemaNode::value("area", ValueType::Float).shared();

    let config = EncodingConfig {
        collection: false,
        flatten: Some("_".to_string()),
        ..EncodingConfig::default()
    };
    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            array_start(&rooms),
            object_start(&room),
            value(&area, "12.5"),
            FeatureEvent::ObjectEnd,
            object_start(&room),
            value(&area, "9"),
            FeatureEvent::ObjectEnd,
            FeatureEvent::ArrayEnd,
            FeatureEvent::FeatureEnd,
        ],
        config,
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"rooms_1_area":12.5,"rooms_2_area":9.0}}"#
    );
}

#[test]
fn repeat_multiplicity_repeats_the_field_name() {
    let tags = SchemaNode::value_array("tag", ValueType::String).shared();

    let config = EncodingConfig {
        collection: false,
        multiplicity: Multiplicity::Repeat,
        ..EncodingConfig::default()
    };
    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            array_start(&tags),
            value(&tags, "a"),
            value(&tags, "b"),
            FeatureEvent::ArrayEnd,
            FeatureEvent::FeatureEnd,
        ],
        config,
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"tag":"a","tag":"b"}}"#
    );
}

#[test]
fn line_string_rings_map_to_nested_arrays() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::LineString).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&geom),
            array_start(&geom),
            value(&geom, "0"),
            value(&geom, "0"),
            value(&geom, "1.5"),
            value(&geom, "2.5"),
            FeatureEvent::ArrayEnd,
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1.5,2.5]]},"properties":null}"#
    );
}

#[test]
fn empty_geometry_object_yields_empty_coordinates() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::MultiPolygon).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&geom),
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":{"type":"MultiPolygon","coordinates":[]},"properties":null}"#
    );
}

#[test]
fn three_dimensional_tuples_keep_the_z_value() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point)
        .with_dimension(CoordDimension::Xyz)
        .shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&geom),
            value(&geom, "7.5"),
            value(&geom, "51.25"),
            value(&geom, "110.5"),
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert!(
        out.contains(r#""coordinates":[7.5,51.25,110.5]"#),
        "unexpected coordinates: {}",
        out
    );
}

#[test]
fn transformer_is_applied_per_tuple() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();

    let mut events = vec![FeatureEvent::FeatureStart];
    events.extend(point_geometry(&geom, "1", "0"));
    events.push(FeatureEvent::FeatureEnd);

    let out = try_encode(events, single_feature_config(), |encoder| {
        encoder.with_transformer(Box::new(WebMercator::to_mercator()))
    })
    .unwrap();

    assert!(
        out.contains(r#""coordinates":[111319.4907933,0]"#),
        "unexpected coordinates: {}",
        out
    );
}

#[test]
fn transform_failure_aborts_the_stream() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();

    let mut events = vec![FeatureEvent::FeatureStart];
    events.extend(point_geometry(&geom, "0", "89.5"));
    events.push(FeatureEvent::FeatureEnd);

    let result = try_encode(events, single_feature_config(), |encoder| {
        encoder.with_transformer(Box::new(WebMercator::to_mercator()))
    });
    assert!(result.is_err());
}

#[test]
fn suppressed_geometry_is_swallowed_and_nulled() {
    let geom = SchemaNode::primary_geometry("geom", GeometryType::Point).shared();
    let name = SchemaNode::value("name", ValueType::String).shared();

    let mut events = vec![FeatureEvent::FeatureStart, value(&name, "Foo")];
    events.extend(point_geometry(&geom, "1", "2"));
    events.push(FeatureEvent::FeatureEnd);

    let config = EncodingConfig {
        collection: false,
        suppress_geometry: true,
        ..EncodingConfig::default()
    };
    let out = encode(events, config);

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"name":"Foo"}}"#
    );
}

#[test]
fn secondary_geometry_nests_as_ordinary_property() {
    let entrance = SchemaNode::secondary_geometry("entrance", GeometryType::Point).shared();
    let x = SchemaNode::value("x", ValueType::Float).shared();
    let y = SchemaNode::value("y", ValueType::Float).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&entrance),
            value(&x, "6.1"),
            value(&y, "50.7"),
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"entrance":{"x":6.1,"y":50.7}}}"#
    );
}

#[test]
fn boolean_coercion_recognizes_truthy_spellings() {
    let open = SchemaNode::value("open", ValueType::Boolean).shared();
    let closed = SchemaNode::value("closed", ValueType::Boolean).shared();

    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            value(&open, "T"),
            value(&closed, "no"),
            FeatureEvent::FeatureEnd,
        ],
        single_feature_config(),
    );

    assert_eq!(
        out,
        r#"{"type":"Feature","geometry":null,"properties":{"open":true,"closed":false}}"#
    );
}

#[test]
fn embedded_feature_emits_only_allowed_link_relations() {
    let unit = SchemaNode::embedded_feature("unit").shared();
    let unit_id = SchemaNode::embedded_id("uid", ValueType::String).shared();

    let config = EncodingConfig {
        collection: false,
        canonical_uri_template: Some("https://resolver.example.com/{{value}}".to_string()),
        ..EncodingConfig::default()
    };
    let out = encode(
        vec![
            FeatureEvent::FeatureStart,
            object_start(&unit),
            value(&unit_id, "u1"),
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
        ],
        config,
    );

    assert_eq!(
        out,
        "{\"type\":\"Feature\",\"geometry\":null,\"properties\":{\
         \"unit\":{\"type\":\"Feature\",\"id\":\"u1\",\"properties\":null,\
         \"links\":[{\"href\":\"https://resolver.example.com/u1\",\"rel\":\"canonical\"}]}}}"
    );
}
