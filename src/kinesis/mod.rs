//! Kinesis data streams declared under `x-kinesis`.

pub mod describe;
pub mod template;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::compose::ComposeDocument;
use crate::resources::{
    set_resources, AttributeMapping, OutputSource, OutputSpec, ResourceError, ResourceKind,
    XResource,
};

pub const RES_KEY: &str = "x-kinesis";
pub const MAPPINGS_KEY: &str = "kinesis";
const STREAM_TYPE: &str = "AWS::Kinesis::Stream";

pub const STREAM_ARN: &str = "Arn";
pub const STREAM_ID: &str = "Name";
pub const STREAM_KMS_KEY_ID: &str = "KmsKeyId";

static STREAM_ARN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^arn:(?P<partition>aws(?:-[a-z]+)*):kinesis:(?P<region>[a-z0-9-]+):(?P<account_id>\d{12}):stream/(?P<id>[a-zA-Z0-9_.-]+)$",
    )
    .unwrap()
});

static STREAM_ATTRIBUTES: [AttributeMapping; 3] = [
    AttributeMapping {
        name: STREAM_ARN,
        path: "StreamDescription::StreamARN",
        required: true,
    },
    AttributeMapping {
        name: STREAM_ID,
        path: "StreamDescription::StreamName",
        required: true,
    },
    AttributeMapping {
        name: STREAM_KMS_KEY_ID,
        path: "StreamDescription::KeyId",
        required: false,
    },
];

static STREAM_OUTPUTS: [OutputSpec; 2] = [
    OutputSpec {
        attribute: STREAM_ID,
        suffix: "",
        source: OutputSource::Ref,
    },
    OutputSpec {
        attribute: STREAM_ARN,
        suffix: STREAM_ARN,
        source: OutputSource::GetAtt("Arn"),
    },
];

pub static STREAM: ResourceKind = ResourceKind {
    res_key: RES_KEY,
    mappings_key: MAPPINGS_KEY,
    cfn_type: STREAM_TYPE,
    arn_pattern: &STREAM_ARN_RE,
    arn_attribute: STREAM_ARN,
    id_attribute: STREAM_ID,
    lookup_attributes: &STREAM_ATTRIBUTES,
    outputs: &STREAM_OUTPUTS,
};

pub fn set_streams(document: &ComposeDocument) -> Result<Vec<XResource>, ResourceError> {
    let streams = set_resources(document, &STREAM)?;
    tracing::debug!(count = streams.len(), "kinesis streams declared");
    return Ok(streams);
}
