use serde_json::Value;

use super::STREAM;
use crate::cfn::defaults::build_template;
use crate::cfn::functions::{get_att, reference};
use crate::cfn::outputs::formatted_outputs;
use crate::cfn::{Resource, Template, TemplateError};
use crate::resources::{OutputSource, ResourceMode, XResource};

const DEFAULT_SHARD_COUNT: i64 = 1;

fn stream_properties(stream: &XResource) -> Result<Value, TemplateError> {
    let properties = match &stream.mode {
        ResourceMode::New { properties } => properties,
        _ => return Ok(Value::Null),
    };

    let mut properties = match serde_json::to_value(properties) {
        Ok(Value::Object(properties)) => properties,
        Ok(_) => serde_json::Map::new(),
        Err(error) => return Err(TemplateError::SerializationError(error.to_string())),
    };
    if !properties.contains_key("ShardCount") && !properties.contains_key("StreamModeDetails") {
        properties.insert(String::from("ShardCount"), Value::from(DEFAULT_SHARD_COUNT));
    }

    return Ok(Value::Object(properties));
}

pub fn create_streams_template(streams: &[&XResource]) -> Result<Template, TemplateError> {
    let mut template = build_template(Some("Kinesis streams"), Vec::new())?;
    let mut outputs = Vec::new();

    for stream in streams {
        let properties = stream_properties(stream)?;
        template.add_resource(Resource::new(&stream.logical_name, STREAM.cfn_type, properties))?;

        for output in STREAM.outputs {
            let value = match output.source {
                OutputSource::Ref => reference(&stream.logical_name),
                OutputSource::GetAtt(attribute) => get_att(&stream.logical_name, attribute),
            };
            outputs.push((output.title(&stream.logical_name), value));
        }
    }
    formatted_outputs(&mut template, outputs)?;

    return Ok(template);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::create_streams_template;
    use crate::compose::parse_str;
    use crate::kinesis::set_streams;
    use crate::resources::new_resources;

    #[test]
    fn creates_new_streams_only() {
        let document = parse_str(
            r#"
x-kinesis:
  events:
    Properties:
      ShardCount: 4
      RetentionPeriodHours: 48
  audit-log:
  shared:
    Use: arn:aws:kinesis:eu-west-1:123456789012:stream/shared
"#,
        )
        .unwrap();
        let streams = set_streams(&document).unwrap();

        let template = create_streams_template(&new_resources(&streams)).unwrap();

        let events = template.resource("events").unwrap();
        assert_eq!("AWS::Kinesis::Stream", events.kind);
        assert_eq!(json!(4), events.properties["ShardCount"]);
        assert_eq!(json!(48), events.properties["RetentionPeriodHours"]);

        let audit = template.resource("auditlog").unwrap();
        assert_eq!(json!({ "ShardCount": 1 }), audit.properties);

        assert_eq!(None, template.resource("shared"));
        assert_eq!(
            json!({ "Fn::GetAtt": ["events", "Arn"] }),
            template.output("eventsArn").unwrap().value
        );
        assert_eq!(json!({ "Ref": "auditlog" }), template.output("auditlog").unwrap().value);
    }
}
