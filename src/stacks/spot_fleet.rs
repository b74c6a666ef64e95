use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

use super::cluster::{
    APP_SUBNETS, LAUNCH_TEMPLATE_ID, LAUNCH_TEMPLATE_VERSION, MAX_CAPACITY, MIN_CAPACITY,
    TARGET_CAPACITY,
};
use super::StackError;
use crate::cfn::defaults::build_template;
use crate::cfn::functions::{condition, equals, fn_not, get_att, reference, select, sub};
use crate::cfn::{Parameter, Resource, Template};

pub const CONFIG_KEY: &str = "spot_config";

pub const MAX_IS_MIN_CON: &str = "MaxIsMinCondition";
pub const SCALING_ENABLED_CON: &str = "ScalingEnabledCondition";

pub const SPOT_FLEET: &str = "SpotFleet";
const SPOT_FLEET_ROLE: &str = "SpotFleetRole";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceWeight {
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SpotConfig {
    #[serde(default = "default_use_spot")]
    pub use_spot: bool,

    #[validate(range(min = 0.001))]
    pub bid_price: f64,

    #[validate(custom = "validate_instance_types")]
    pub spot_instance_types: BTreeMap<String, InstanceWeight>,
}

fn default_use_spot() -> bool {
    true
}

fn validate_instance_types(
    instance_types: &BTreeMap<String, InstanceWeight>,
) -> Result<(), ValidationError> {
    if instance_types.is_empty() {
        return Err(ValidationError::new(
            "At least one spot instance type is required",
        ));
    }
    if instance_types.values().any(|instance| instance.weight == 0) {
        return Err(ValidationError::new("Instance weights must be positive"));
    }

    return Ok(());
}

impl Default for SpotConfig {
    fn default() -> Self {
        let mut spot_instance_types = BTreeMap::new();
        spot_instance_types.insert(String::from("m5a.large"), InstanceWeight { weight: 1 });
        spot_instance_types.insert(String::from("m5a.xlarge"), InstanceWeight { weight: 3 });
        spot_instance_types.insert(String::from("m5a.2xlarge"), InstanceWeight { weight: 7 });

        Self {
            use_spot: true,
            bid_price: 0.42,
            spot_instance_types,
        }
    }
}

impl SpotConfig {
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self, StackError> {
        let config: SpotConfig = match serde_yaml::from_value(value.clone()) {
            Ok(config) => config,
            Err(error) => return Err(StackError::InvalidSpotConfig(error.to_string())),
        };

        match config.validate() {
            Ok(_) => Ok(config),
            Err(error) => Err(StackError::InvalidSpotConfig(error.to_string())),
        }
    }
}

fn spot_fleet_parameters() -> Vec<Parameter> {
    vec![
        Parameter::string(LAUNCH_TEMPLATE_ID),
        Parameter::string(LAUNCH_TEMPLATE_VERSION),
        Parameter::number(TARGET_CAPACITY, 2),
        Parameter::number(MIN_CAPACITY, 1),
        Parameter::number(MAX_CAPACITY, 4),
        Parameter::new(APP_SUBNETS, "List<AWS::EC2::Subnet::Id>"),
    ]
}

/// One override per instance type in each availability zone's subnet.
fn launch_template_overrides(config: &SpotConfig, zones: &[Option<&str>]) -> Vec<Value> {
    let mut overrides = Vec::new();
    for (az_index, zone) in zones.iter().enumerate() {
        for (instance_type, instance) in &config.spot_instance_types {
            let mut entry = json!({
                "InstanceType": instance_type,
                "WeightedCapacity": instance.weight,
                "SubnetId": select(az_index, reference(APP_SUBNETS)),
            });
            if let Some(zone) = zone {
                entry["AvailabilityZone"] = Value::from(*zone);
            }
            overrides.push(entry);
        }
    }
    overrides
}

pub fn generate_spot_fleet_template(
    config: &SpotConfig,
    zones: &[Option<&str>],
) -> Result<Template, StackError> {
    let mut template = build_template(
        Some("Spot fleet template generated by compose-cfn"),
        spot_fleet_parameters(),
    )?;
    template.add_condition(
        MAX_IS_MIN_CON,
        equals(reference(MAX_CAPACITY), reference(MIN_CAPACITY)),
    )?;
    template.add_condition(SCALING_ENABLED_CON, fn_not(condition(MAX_IS_MIN_CON)))?;

    template.add_resource(Resource::new(
        SPOT_FLEET_ROLE,
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "spotfleet.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": [
                sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AmazonEC2SpotFleetTaggingRole"),
            ],
        }),
    ))?;

    template.add_resource(Resource::new(
        SPOT_FLEET,
        "AWS::EC2::SpotFleet",
        json!({
            "SpotFleetRequestConfigData": {
                "IamFleetRole": get_att(SPOT_FLEET_ROLE, "Arn"),
                "TargetCapacity": reference(TARGET_CAPACITY),
                "SpotPrice": config.bid_price.to_string(),
                "AllocationStrategy": "diversified",
                "InstanceInterruptionBehavior": "terminate",
                "ReplaceUnhealthyInstances": true,
                "LaunchTemplateConfigs": [{
                    "LaunchTemplateSpecification": {
                        "LaunchTemplateId": reference(LAUNCH_TEMPLATE_ID),
                        "Version": reference(LAUNCH_TEMPLATE_VERSION),
                    },
                    "Overrides": launch_template_overrides(config, zones),
                }],
            },
        }),
    ))?;

    template.add_resource(
        Resource::new(
            "SpotFleetScalableTarget",
            "AWS::ApplicationAutoScaling::ScalableTarget",
            json!({
                "MinCapacity": reference(MIN_CAPACITY),
                "MaxCapacity": reference(MAX_CAPACITY),
                "ResourceId": sub(&format!("spot-fleet-request/${{{}}}", SPOT_FLEET)),
                "ScalableDimension": "ec2:spot-fleet-request:TargetCapacity",
                "ServiceNamespace": "ec2",
                "RoleARN": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:role/aws-service-role/ec2.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_EC2SpotFleetRequest"),
            }),
        )
        .with_condition(SCALING_ENABLED_CON),
    )?;

    return Ok(template);
}
