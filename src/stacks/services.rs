use serde_json::{json, Map, Value};

use crate::cfn::defaults::build_template;
use crate::cfn::functions::{reference, sub};
use crate::cfn::outputs::formatted_outputs;
use crate::cfn::{logical_name, Resource, Template, TemplateError};
use crate::compose::services::ComposeService;
use crate::compose::volumes::{ComposeVolume, VolumeAttachment, VolumeId, VolumeKind};
use crate::compose::ComposeProject;

const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";
const DEFAULT_MEMORY_RESERVATION: u32 = 128;

const BYTES_PER_MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
enum TaskVolumeSource<'a> {
    Volume(VolumeId),
    Host(&'a str),
}

impl<'a> TaskVolumeSource<'a> {
    fn of(attachment: &'a VolumeAttachment) -> Self {
        match attachment.volume {
            Some(id) => TaskVolumeSource::Volume(id),
            None => TaskVolumeSource::Host(&attachment.source),
        }
    }
}

/// Task volume name of every attachment, in order. Attachments sharing a
/// source share a name; distinct sources never do, even when their logical
/// names collide.
fn task_volume_names(service: &ComposeService, volumes: &[ComposeVolume]) -> Vec<String> {
    let mut assigned: Vec<(TaskVolumeSource, String)> = Vec::new();
    let mut names = Vec::new();

    for attachment in &service.volumes {
        let source = TaskVolumeSource::of(attachment);
        if let Some((_, name)) = assigned.iter().find(|(other, _)| *other == source) {
            names.push(name.clone());
            continue;
        }

        let base = match source {
            TaskVolumeSource::Volume(id) => logical_name(&volumes[id.0].name),
            TaskVolumeSource::Host(path) => format!("host{}", logical_name(path)),
        };
        let mut name = base.clone();
        let mut index = 1;
        while assigned.iter().any(|(_, other)| *other == name) {
            index += 1;
            name = format!("{}{}", base, index);
        }

        assigned.push((source, name.clone()));
        names.push(name);
    }

    names
}

fn task_volume(name: &str, attachment: &VolumeAttachment, volumes: &[ComposeVolume]) -> Value {
    let volume = match attachment.volume {
        Some(id) => &volumes[id.0],
        None => {
            return json!({
                "Name": name,
                "Host": { "SourcePath": attachment.source },
            })
        }
    };

    let definition = &volume.definition;
    match volume.kind {
        VolumeKind::HostBind => json!({
            "Name": name,
            "Host": {
                "SourcePath": definition.driver_opts.get("device").cloned().unwrap_or_default(),
            },
        }),
        VolumeKind::Tmpfs => json!({
            "Name": name,
            "DockerVolumeConfiguration": {
                "Scope": "task",
                "Driver": "local",
                "DriverOpts": definition.driver_opts,
            },
        }),
        VolumeKind::Named => {
            let mut configuration = Map::new();
            configuration.insert(String::from("Scope"), Value::from("shared"));
            configuration.insert(String::from("Autoprovision"), Value::from(!definition.external));
            configuration.insert(
                String::from("Driver"),
                Value::from(definition.driver.clone().unwrap_or_else(|| String::from("local"))),
            );
            if !definition.driver_opts.is_empty() {
                configuration.insert(String::from("DriverOpts"), json!(definition.driver_opts));
            }
            json!({
                "Name": name,
                "DockerVolumeConfiguration": Value::Object(configuration),
            })
        }
    }
}

/// Compose sizes are bytes, ECS expects MiB.
fn tmpfs_size_mib(size: u64) -> u64 {
    size.div_ceil(BYTES_PER_MIB)
}

fn container_definition(service: &ComposeService, volume_names: &[String]) -> Value {
    let mount_points: Vec<Value> = service
        .volumes
        .iter()
        .zip(volume_names)
        .map(|(attachment, name)| {
            json!({
                "SourceVolume": name,
                "ContainerPath": attachment.target,
                "ReadOnly": attachment.read_only,
            })
        })
        .collect();

    let mut container = json!({
        "Name": service.name,
        "Image": service.image(),
        "Essential": true,
        "MemoryReservation": DEFAULT_MEMORY_RESERVATION,
        "MountPoints": mount_points,
    });

    if !service.tmpfses.is_empty() {
        let tmpfs: Vec<Value> = service
            .tmpfses
            .iter()
            .map(|mount| match mount.size {
                Some(size) => json!({
                    "ContainerPath": mount.container_path,
                    "Size": tmpfs_size_mib(size),
                }),
                None => json!({ "ContainerPath": mount.container_path }),
            })
            .collect();
        container["LinuxParameters"] = json!({ "Tmpfs": tmpfs });
    }

    container
}

fn task_definition(service: &ComposeService, volumes: &[ComposeVolume]) -> Resource {
    let volume_names = task_volume_names(service, volumes);

    let mut task_volumes: Vec<Value> = Vec::new();
    for (attachment, name) in service.volumes.iter().zip(&volume_names) {
        if !task_volumes.iter().any(|other| other["Name"] == name.as_str()) {
            task_volumes.push(task_volume(name, attachment, volumes));
        }
    }

    Resource::new(
        &format!("{}TaskDefinition", service.logical_name),
        TASK_DEFINITION_TYPE,
        json!({
            "Family": sub(&format!("${{RootStackName}}-{}", service.name)),
            "RequiresCompatibilities": ["EC2"],
            "ContainerDefinitions": [container_definition(service, &volume_names)],
            "Volumes": task_volumes,
        }),
    )
}

pub fn create_services_template(project: &ComposeProject) -> Result<Template, TemplateError> {
    let mut template = build_template(Some("Services template generated by compose-cfn"), Vec::new())?;
    let mut outputs = Vec::new();

    for service in &project.services {
        let resource = task_definition(service, &project.volumes);
        outputs.push((resource.title.clone(), reference(&resource.title)));
        template.add_resource(resource)?;
    }
    formatted_outputs(&mut template, outputs)?;

    return Ok(template);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{create_services_template, tmpfs_size_mib};
    use crate::compose::{parse_str, ComposeProject};

    #[test]
    fn maps_volumes_into_task_definitions() {
        let document = parse_str(
            r#"
services:
  web-app:
    image: nginx:latest
    volumes:
      - cache:/var/cache
      - cache:/srv/cache:ro
      - /host/path:/data:ro
      - type: tmpfs
        target: /tmp
        tmpfs:
          size: 67108864
volumes:
  cache:
    driver_opts:
      size: 10G
"#,
        )
        .unwrap();
        let project = ComposeProject::from_document(&document).unwrap();

        let template = create_services_template(&project).unwrap();

        let task = template.resource("webappTaskDefinition").unwrap();
        let container = &task.properties["ContainerDefinitions"][0];
        assert_eq!(json!("nginx:latest"), container["Image"]);
        assert_eq!(
            json!([
                { "SourceVolume": "cache", "ContainerPath": "/var/cache", "ReadOnly": false },
                { "SourceVolume": "cache", "ContainerPath": "/srv/cache", "ReadOnly": true },
                { "SourceVolume": "hosthostpath", "ContainerPath": "/data", "ReadOnly": true }
            ]),
            container["MountPoints"]
        );
        assert_eq!(
            json!({ "Tmpfs": [{ "ContainerPath": "/tmp", "Size": 64 }] }),
            container["LinuxParameters"]
        );
        assert_eq!(
            json!([
                {
                    "Name": "cache",
                    "DockerVolumeConfiguration": {
                        "Scope": "shared",
                        "Autoprovision": true,
                        "Driver": "local",
                        "DriverOpts": { "size": "10G" }
                    }
                },
                { "Name": "hosthostpath", "Host": { "SourcePath": "/host/path" } }
            ]),
            task.properties["Volumes"]
        );
        assert_eq!(
            json!({ "Ref": "webappTaskDefinition" }),
            template.output("webappTaskDefinition").unwrap().value
        );
    }

    #[test]
    fn colliding_sources_get_distinct_volumes() {
        let document = parse_str(
            r#"
services:
  web:
    volumes:
      - /data/a:/x
      - /dataa:/y
      - hostdata:/z
      - /data:/w
volumes:
  hostdata: {}
"#,
        )
        .unwrap();
        let project = ComposeProject::from_document(&document).unwrap();

        let template = create_services_template(&project).unwrap();

        let task = template.resource("webTaskDefinition").unwrap();
        let mount_points = task.properties["ContainerDefinitions"][0]["MountPoints"]
            .as_array()
            .unwrap();
        let task_volumes = task.properties["Volumes"].as_array().unwrap();
        assert_eq!(4, task_volumes.len());

        for (mount_point, expected) in mount_points
            .iter()
            .zip([Some("/data/a"), Some("/dataa"), None, Some("/data")])
        {
            let volume = task_volumes
                .iter()
                .find(|volume| volume["Name"] == mount_point["SourceVolume"])
                .unwrap();
            match expected {
                Some(path) => assert_eq!(json!(path), volume["Host"]["SourcePath"]),
                None => assert_eq!(true, volume["DockerVolumeConfiguration"].is_object()),
            }
        }
    }

    #[test]
    fn tmpfs_size_is_rounded_up_to_mib() {
        assert_eq!(64, tmpfs_size_mib(64 * 1024 * 1024));
        assert_eq!(1, tmpfs_size_mib(1));
        assert_eq!(2, tmpfs_size_mib(1024 * 1024 + 1));
    }
}
