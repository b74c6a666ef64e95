//! Intrinsic functions and pseudo parameters, rendered as plain JSON values.

use serde_json::{json, Value};

pub const AWS_NO_VALUE: &str = "AWS::NoValue";
pub const AWS_STACK_NAME: &str = "AWS::StackName";

pub fn reference(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn no_value() -> Value {
    reference(AWS_NO_VALUE)
}

pub fn get_att(resource: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [resource, attribute] })
}

pub fn fn_if(condition: &str, if_true: Value, if_false: Value) -> Value {
    json!({ "Fn::If": [condition, if_true, if_false] })
}

pub fn equals(left: Value, right: Value) -> Value {
    json!({ "Fn::Equals": [left, right] })
}

pub fn fn_not(condition: Value) -> Value {
    json!({ "Fn::Not": [condition] })
}

pub fn fn_and(conditions: Vec<Value>) -> Value {
    json!({ "Fn::And": conditions })
}

pub fn condition(name: &str) -> Value {
    json!({ "Condition": name })
}

pub fn sub(text: &str) -> Value {
    json!({ "Fn::Sub": text })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

pub fn join(delimiter: &str, list: Value) -> Value {
    json!({ "Fn::Join": [delimiter, list] })
}

pub fn find_in_map(map: &str, top_key: &str, second_key: &str) -> Value {
    json!({ "Fn::FindInMap": [map, top_key, second_key] })
}

pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}
