//! ECS cluster template with its EC2 hosts launch template.
//!
//! The spot fleet is optional: its template is uploaded separately and only
//! nested when the upload succeeded and `UseSpotFleetHosts` is `True`.

use serde_json::{json, Map, Value};

use super::spot_fleet::{self, SpotConfig};
use super::{nested_stack, upload_template, StackError};
use crate::cfn::defaults::{build_template, root_stack_name, ROOT_STACK_NAME};
use crate::cfn::functions::{
    base64, equals, fn_if, get_att, join, no_value, reference, sub, AWS_STACK_NAME,
};
use crate::cfn::outputs::formatted_outputs;
use crate::cfn::{Parameter, Resource, Template};
use crate::compose::ComposeDocument;
use crate::config::Settings;
use crate::store::TemplateStore;

pub const RES_KEY: &str = "x-cluster";

pub const CLUSTER_NAME: &str = "ClusterName";
pub const CLUSTER_NAME_DEFAULT: &str = "default";
pub const CLUSTER_NAME_GENERATED: &str = "generated";
pub const USE_FLEET: &str = "UseSpotFleetHosts";
pub const ECS_AMI_ID: &str = "EcsAmiId";
pub const INSTANCE_TYPE: &str = "InstanceType";
pub const TARGET_CAPACITY: &str = "TargetCapacity";
pub const MIN_CAPACITY: &str = "MinCapacity";
pub const MAX_CAPACITY: &str = "MaxCapacity";
pub const APP_SUBNETS: &str = "AppSubnets";
pub const VPC_ID: &str = "VpcId";
pub const LAUNCH_TEMPLATE_ID: &str = "LaunchTemplateId";
pub const LAUNCH_TEMPLATE_VERSION: &str = "LaunchTemplateVersion";

pub const GENERATED_CLUSTER_NAME_CON: &str = "GenerateClusterNameCondition";
pub const CLUSTER_NAME_CON: &str = "UseRootStackNameForClusterCondition";
pub const USE_SPOT_CON: &str = "UseSpotFleetCondition";

pub const CLUSTER: &str = "EcsCluster";
pub const LAUNCH_TEMPLATE: &str = "LaunchTemplate";
pub const SPOT_FLEET_STACK: &str = "SpotFleet";
pub const CLUSTER_NAME_OUTPUT: &str = "ClusterName";

const ECS_AMI_PARAMETER: &str = "/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id";

fn cluster_parameters() -> Vec<Parameter> {
    vec![
        Parameter::string(CLUSTER_NAME)
            .with_default(Value::from(CLUSTER_NAME_DEFAULT))
            .with_description(
                "`default` names the cluster after the root stack, `generated` lets CloudFormation name it",
            ),
        Parameter::boolean(USE_FLEET, false),
        Parameter::new(ECS_AMI_ID, "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>")
            .with_default(Value::from(ECS_AMI_PARAMETER)),
        Parameter::string(INSTANCE_TYPE).with_default(Value::from("m5a.large")),
        Parameter::number(TARGET_CAPACITY, 2),
        Parameter::number(MIN_CAPACITY, 1),
        Parameter::number(MAX_CAPACITY, 4),
        Parameter::new(APP_SUBNETS, "List<AWS::EC2::Subnet::Id>"),
        Parameter::new(VPC_ID, "AWS::EC2::VPC::Id"),
    ]
}

/// Generated name, user supplied name, or the root stack name.
fn cluster_name() -> Value {
    fn_if(
        GENERATED_CLUSTER_NAME_CON,
        no_value(),
        fn_if(CLUSTER_NAME_CON, root_stack_name(), reference(CLUSTER_NAME)),
    )
}

fn add_hosts_resources(template: &mut Template) -> Result<(), StackError> {
    template.add_resource(Resource::new(
        "HostsSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": sub(&format!("${{{}}} ECS hosts", AWS_STACK_NAME)),
            "VpcId": reference(VPC_ID),
        }),
    ))?;
    template.add_resource(Resource::new(
        "HostsRole",
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "ec2.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": [
                sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AmazonEC2ContainerServiceforEC2Role"),
            ],
        }),
    ))?;
    template.add_resource(Resource::new(
        "HostsInstanceProfile",
        "AWS::IAM::InstanceProfile",
        json!({ "Roles": [reference("HostsRole")] }),
    ))?;
    template.add_resource(Resource::new(
        LAUNCH_TEMPLATE,
        "AWS::EC2::LaunchTemplate",
        json!({
            "LaunchTemplateData": {
                "ImageId": reference(ECS_AMI_ID),
                "InstanceType": reference(INSTANCE_TYPE),
                "IamInstanceProfile": { "Arn": get_att("HostsInstanceProfile", "Arn") },
                "SecurityGroupIds": [get_att("HostsSecurityGroup", "GroupId")],
                "UserData": base64(sub(&format!(
                    "#!/bin/bash\necho ECS_CLUSTER=${{{}}} >> /etc/ecs/ecs.config\n",
                    CLUSTER
                ))),
            },
        }),
    ))?;

    return Ok(());
}

fn spot_config(document: &ComposeDocument) -> Result<SpotConfig, StackError> {
    match document.config(spot_fleet::CONFIG_KEY) {
        Some(config) => SpotConfig::from_yaml(config),
        None => {
            tracing::warn!("no spot_config set in configs of the compose file, using defaults");
            Ok(SpotConfig::default())
        }
    }
}

async fn add_spotfleet_stack(
    template: &mut Template,
    document: &ComposeDocument,
    store: &dyn TemplateStore,
    settings: &Settings,
) -> Result<(), StackError> {
    let config = spot_config(document)?;
    if !config.use_spot {
        tracing::info!("spot fleet disabled in spot_config");
        return Ok(());
    }

    let zones = settings.availability_zones();
    let fleet_template = spot_fleet::generate_spot_fleet_template(&config, &zones)?;
    let file_name = settings.template_file_name("spot_fleet");
    let fleet_template_url =
        match upload_template(store, &file_name, &fleet_template, settings.format).await? {
            Some(url) => url,
            None => {
                tracing::warn!("fleet template URL not returned, not adding SpotFleet to the cluster stack");
                return Ok(());
            }
        };

    let mut parameters = Map::new();
    parameters.insert(String::from(ROOT_STACK_NAME), root_stack_name());
    parameters.insert(
        String::from(LAUNCH_TEMPLATE_ID),
        reference(LAUNCH_TEMPLATE),
    );
    parameters.insert(
        String::from(LAUNCH_TEMPLATE_VERSION),
        get_att(LAUNCH_TEMPLATE, "LatestVersionNumber"),
    );
    for capacity in [MAX_CAPACITY, MIN_CAPACITY, TARGET_CAPACITY] {
        parameters.insert(String::from(capacity), reference(capacity));
    }
    parameters.insert(String::from(APP_SUBNETS), join(",", reference(APP_SUBNETS)));

    template.add_resource(
        nested_stack(SPOT_FLEET_STACK, &fleet_template_url, parameters).with_condition(USE_SPOT_CON),
    )?;

    return Ok(());
}

pub async fn generate_cluster_template(
    document: &ComposeDocument,
    store: &dyn TemplateStore,
    settings: &Settings,
) -> Result<Template, StackError> {
    let mut template = build_template(
        Some("Cluster template generated by compose-cfn"),
        cluster_parameters(),
    )?;
    template.add_condition(
        GENERATED_CLUSTER_NAME_CON,
        equals(reference(CLUSTER_NAME), Value::from(CLUSTER_NAME_GENERATED)),
    )?;
    template.add_condition(
        CLUSTER_NAME_CON,
        equals(reference(CLUSTER_NAME), Value::from(CLUSTER_NAME_DEFAULT)),
    )?;
    template.add_condition(USE_SPOT_CON, equals(reference(USE_FLEET), Value::from("True")))?;

    template.add_resource(Resource::new(
        CLUSTER,
        "AWS::ECS::Cluster",
        json!({ "ClusterName": cluster_name() }),
    ))?;
    add_hosts_resources(&mut template)?;
    add_spotfleet_stack(&mut template, document, store, settings).await?;

    formatted_outputs(
        &mut template,
        vec![(String::from(CLUSTER_NAME_OUTPUT), reference(CLUSTER))],
    )?;

    return Ok(template);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::compose::parse_str;
    use crate::stacks::tests::{settings, MemoryStore};

    #[tokio::test]
    async fn resolves_cluster_name_conditionally() {
        let store = MemoryStore::new();
        let document = parse_str("services: {}\n").unwrap();

        let template = generate_cluster_template(&document, &store, &settings())
            .await
            .unwrap();

        let cluster = template.resource(CLUSTER).unwrap();
        assert_eq!(
            json!({
                "Fn::If": [
                    "GenerateClusterNameCondition",
                    { "Ref": "AWS::NoValue" },
                    {
                        "Fn::If": [
                            "UseRootStackNameForClusterCondition",
                            {
                                "Fn::If": [
                                    "UseStackNameCondition",
                                    { "Ref": "AWS::StackName" },
                                    { "Ref": "RootStackName" }
                                ]
                            },
                            { "Ref": "ClusterName" }
                        ]
                    }
                ]
            }),
            cluster.properties["ClusterName"]
        );
        assert_eq!(
            json!({ "Ref": "EcsCluster" }),
            template.output("ClusterName").unwrap().value
        );
    }

    #[tokio::test]
    async fn passes_launch_template_to_spot_fleet() {
        let store = MemoryStore::new();
        let document = parse_str("services: {}\n").unwrap();

        let template = generate_cluster_template(&document, &store, &settings())
            .await
            .unwrap();

        let fleet = template.resource(SPOT_FLEET_STACK).unwrap();
        assert_eq!(Some(String::from(USE_SPOT_CON)), fleet.condition);
        assert_eq!(
            json!({ "Ref": "LaunchTemplate" }),
            fleet.properties["Parameters"]["LaunchTemplateId"]
        );
        assert_eq!(
            json!({ "Fn::GetAtt": ["LaunchTemplate", "LatestVersionNumber"] }),
            fleet.properties["Parameters"]["LaunchTemplateVersion"]
        );
        assert_eq!(
            json!("https://templates.example.com/spot_fleet.json"),
            fleet.properties["TemplateURL"]
        );

        let uploaded = store.uploaded("spot_fleet.json").unwrap();
        assert_eq!("AWS::EC2::SpotFleet", uploaded["Resources"]["SpotFleet"]["Type"]);
    }

    #[tokio::test]
    async fn skips_spot_fleet_when_upload_fails() {
        let store = MemoryStore::failing("spot_fleet.json");
        let document = parse_str("services: {}\n").unwrap();

        let template = generate_cluster_template(&document, &store, &settings())
            .await
            .unwrap();

        assert_eq!(None, template.resource(SPOT_FLEET_STACK));
        assert_eq!(true, template.resource(LAUNCH_TEMPLATE).is_some());
    }

    #[tokio::test]
    async fn spot_fleet_can_be_disabled() {
        let store = MemoryStore::new();
        let document = parse_str(
            "configs:\n  spot_config:\n    use_spot: false\n    bid_price: 0.1\n    spot_instance_types:\n      m5.large:\n        weight: 1\n",
        )
        .unwrap();

        let template = generate_cluster_template(&document, &store, &settings())
            .await
            .unwrap();

        assert_eq!(None, template.resource(SPOT_FLEET_STACK));
        assert_eq!(None, store.uploaded("spot_fleet.json"));
    }
}
