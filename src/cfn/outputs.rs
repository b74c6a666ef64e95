use serde_json::{json, Value};

use super::defaults::{USE_CFN_EXPORTS_CON, USE_SSM_EXPORTS_CON};
use super::functions::{fn_if, no_value, sub};
use super::{Output, Resource, Template, TemplateError};

const SSM_PARAMETER: &str = "AWS::SSM::Parameter";

/// Adds outputs that are also published, depending on the export conditions,
/// as CloudFormation exports and as SSM parameters under the root stack name.
pub fn formatted_outputs(
    template: &mut Template,
    outputs: Vec<(String, Value)>,
) -> Result<(), TemplateError> {
    for (title, value) in outputs {
        let export = fn_if(
            USE_CFN_EXPORTS_CON,
            json!({ "Name": sub(&format!("${{RootStackName}}::{}", title)) }),
            no_value(),
        );

        let ssm_parameter = Resource::new(
            &format!("{}SsmExport", title),
            SSM_PARAMETER,
            json!({
                "Name": sub(&format!("/${{RootStackName}}/{}", title)),
                "Type": "String",
                "Value": value.clone(),
            }),
        )
        .with_condition(USE_SSM_EXPORTS_CON);
        template.add_resource(ssm_parameter)?;

        let mut output = Output::new(&title, value);
        output.export = Some(export);
        template.add_output(output)?;
    }

    return Ok(());
}
