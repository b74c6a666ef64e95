//! Parameters and conditions every generated template carries.

use serde_json::Value;

use super::functions::{condition, equals, fn_and, fn_if, fn_not, reference, AWS_STACK_NAME};
use super::{Parameter, Template, TemplateError};

pub const USE_SSM_EXPORTS: &str = "UseSsmExports";
pub const USE_CFN_EXPORTS: &str = "UseCfnExports";
pub const ROOT_STACK_NAME: &str = "RootStackName";
pub const ROOT_STACK_NAME_DEFAULT: &str = "self";

pub const USE_SSM_EXPORTS_CON: &str = "UseSsmExportsCondition";
pub const USE_CFN_EXPORTS_CON: &str = "UseCfnExportsCondition";
pub const NOT_USE_CFN_EXPORTS_CON: &str = "NotUseCfnExportsCondition";
pub const USE_CFN_AND_SSM_EXPORTS_CON: &str = "UseCfnAndSsmExportsCondition";
pub const USE_STACK_NAME_CON: &str = "UseStackNameCondition";
pub const USE_SSM_ONLY_CON: &str = "UseSsmOnlyCondition";

const DEFAULT_DESCRIPTION: &str = "Template generated by compose-cfn";

pub fn is_default_parameter(title: &str) -> bool {
    [USE_SSM_EXPORTS, USE_CFN_EXPORTS, ROOT_STACK_NAME].contains(&title)
}

fn default_parameters() -> Vec<Parameter> {
    vec![
        Parameter::boolean(USE_SSM_EXPORTS, false)
            .with_description("Publish stack outputs as SSM parameters"),
        Parameter::boolean(USE_CFN_EXPORTS, true)
            .with_description("Publish stack outputs as CloudFormation exports"),
        Parameter::string(ROOT_STACK_NAME)
            .with_default(Value::from(ROOT_STACK_NAME_DEFAULT))
            .with_description("Name of the root stack, `self` when this is the root stack"),
    ]
}

/// Resolves to the root stack's name from any template in the tree.
pub fn root_stack_name() -> Value {
    fn_if(
        USE_STACK_NAME_CON,
        reference(AWS_STACK_NAME),
        reference(ROOT_STACK_NAME),
    )
}

pub fn add_defaults(template: &mut Template) -> Result<(), TemplateError> {
    for parameter in default_parameters() {
        template.add_parameter(parameter)?;
    }

    template.add_condition(
        USE_SSM_EXPORTS_CON,
        equals(reference(USE_SSM_EXPORTS), Value::from("True")),
    )?;
    template.add_condition(
        USE_CFN_EXPORTS_CON,
        equals(reference(USE_CFN_EXPORTS), Value::from("True")),
    )?;
    template.add_condition(NOT_USE_CFN_EXPORTS_CON, fn_not(condition(USE_CFN_EXPORTS_CON)))?;
    template.add_condition(
        USE_CFN_AND_SSM_EXPORTS_CON,
        fn_and(vec![
            condition(USE_CFN_EXPORTS_CON),
            condition(USE_SSM_EXPORTS_CON),
        ]),
    )?;
    template.add_condition(
        USE_STACK_NAME_CON,
        equals(
            reference(ROOT_STACK_NAME),
            Value::from(ROOT_STACK_NAME_DEFAULT),
        ),
    )?;
    template.add_condition(
        USE_SSM_ONLY_CON,
        fn_and(vec![
            condition(USE_SSM_EXPORTS_CON),
            condition(NOT_USE_CFN_EXPORTS_CON),
        ]),
    )?;

    return Ok(());
}

pub fn init_template(description: Option<&str>) -> Template {
    let mut template = Template::new(description.unwrap_or(DEFAULT_DESCRIPTION));
    template.set_metadata(
        "GeneratedOn",
        Value::from(chrono::Utc::now().to_rfc3339()),
    );
    template
}

pub fn build_template(
    description: Option<&str>,
    parameters: Vec<Parameter>,
) -> Result<Template, TemplateError> {
    let mut template = init_template(description);
    for parameter in parameters {
        template.add_parameter(parameter)?;
    }
    add_defaults(&mut template)?;

    return Ok(template);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_template_with_defaults() {
        let template =
            build_template(Some("test"), vec![Parameter::string("ClusterName")]).unwrap();

        assert_eq!(true, template.parameter("ClusterName").is_some());
        assert_eq!(true, template.parameter(ROOT_STACK_NAME).is_some());
        assert_eq!(true, template.condition(USE_SSM_ONLY_CON).is_some());
        assert_eq!(true, template.condition(USE_STACK_NAME_CON).is_some());
    }

    #[test]
    fn defaults_are_declared_once() {
        let mut template = build_template(None, Vec::new()).unwrap();

        let result = add_defaults(&mut template);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            TemplateError::Duplicate { .. } => {}
            _ => panic!("Expected `Duplicate` error"),
        }
    }

    #[test]
    fn parameters_colliding_with_defaults_are_rejected() {
        let result = build_template(None, vec![Parameter::string(ROOT_STACK_NAME)]);
        assert_eq!(true, result.is_err());
    }
}
