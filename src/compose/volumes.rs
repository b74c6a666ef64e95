//! Binding of service volume entries to top-level volumes, bind mounts and tmpfs.

use once_cell::sync::Lazy;
use regex::Regex;

use super::services::ComposeService;
use super::{ServiceVolume, VolumeDefinition, VolumeMount};

const VOLUME_PATTERN: &str =
    r"^(?:(?P<source>\S[^:]+):)?(?P<target>/[^:\n]+)(?::(?P<mode>ro|rw))?$";
static VOLUME_SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(VOLUME_PATTERN).unwrap());

const GENERATED_NAME_LENGTH: usize = 6;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VolumeError {
    #[error("Volume syntax {config} is invalid. Must follow the pattern {pattern}")]
    InvalidSyntax {
        config: String,
        pattern: &'static str,
    },

    #[error("{service}.volumes - {message}")]
    MissingKey { service: String, message: String },

    #[error("Volume {name} was not found in {known:?}")]
    NotFound { name: String, known: Vec<String> },
}

/// Index of a volume in the project's volume list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Named,
    HostBind,
    Tmpfs,
}

impl VolumeKind {
    fn from_definition(definition: &VolumeDefinition) -> Self {
        match definition.driver_opts.get("type").map(String::as_str) {
            Some("tmpfs") => VolumeKind::Tmpfs,
            _ if definition
                .driver_opts
                .get("o")
                .map_or(false, |options| options.split(',').any(|option| option == "bind")) =>
            {
                VolumeKind::HostBind
            }
            _ => VolumeKind::Named,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeVolume {
    pub name: String,
    pub definition: VolumeDefinition,
    pub kind: VolumeKind,
    pub autogenerated: bool,
    /// Names of the services mounting this volume.
    pub services: Vec<String>,
}

impl ComposeVolume {
    pub fn new(name: &str, definition: VolumeDefinition) -> Self {
        Self {
            name: name.to_string(),
            kind: VolumeKind::from_definition(&definition),
            definition,
            autogenerated: false,
            services: Vec::new(),
        }
    }

    fn generated(volumes: &[ComposeVolume]) -> Self {
        let name = loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string()[..GENERATED_NAME_LENGTH]
                .to_string();
            if !volumes.iter().any(|volume| volume.name == candidate) {
                break candidate;
            }
        };
        let mut volume = Self::new(&name, VolumeDefinition::default());
        volume.autogenerated = true;
        volume
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAttachment {
    pub source: String,
    pub target: String,
    pub read_only: bool,
    /// `None` for host bind mounts.
    pub volume: Option<VolumeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TmpfsMount {
    pub container_path: String,
    pub size: Option<u64>,
}

/// A volume entry once its syntax has been normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeConfig {
    pub source: Option<String>,
    pub target: String,
    pub read_only: bool,
}

pub fn match_volumes_services_config(
    service: &mut ComposeService,
    config: VolumeConfig,
    volumes: &mut [ComposeVolume],
) -> Result<(), VolumeError> {
    let source = config.source.clone().unwrap_or_default();
    if source.starts_with('/') {
        tracing::info!(source = %source, service = %service.name, "volume mapped as host bind");
        service.volumes.push(VolumeAttachment {
            source,
            target: config.target,
            read_only: config.read_only,
            volume: None,
        });
        return Ok(());
    }

    for (index, volume) in volumes.iter_mut().enumerate() {
        if volume.name != source {
            continue;
        }
        if !volume.services.contains(&service.name) {
            volume.services.push(service.name.clone());
        }
        service.volumes.push(VolumeAttachment {
            source,
            target: config.target,
            read_only: config.read_only,
            volume: Some(VolumeId(index)),
        });
        tracing::info!(volume = %volume.name, service = %service.name, "volume mapped");
        return Ok(());
    }

    return Err(VolumeError::NotFound {
        name: source,
        known: volumes.iter().map(|volume| volume.name.clone()).collect(),
    });
}

pub fn handle_volume_str_config(
    service: &mut ComposeService,
    config: &str,
    volumes: &mut Vec<ComposeVolume>,
) -> Result<(), VolumeError> {
    let captures = match VOLUME_SYNTAX.captures(config) {
        Some(captures) => captures,
        None => {
            return Err(VolumeError::InvalidSyntax {
                config: config.to_string(),
                pattern: VOLUME_PATTERN,
            })
        }
    };

    let mut volume_config = VolumeConfig {
        target: captures["target"].to_string(),
        read_only: captures.name("mode").map(|mode| mode.as_str()) == Some("ro"),
        ..Default::default()
    };

    match captures.name("source") {
        Some(source) => volume_config.source = Some(source.as_str().to_string()),
        None => {
            let volume = ComposeVolume::generated(volumes);
            tracing::warn!(
                config,
                volume = %volume.name,
                "no source defined, creating docker volume"
            );
            volume_config.source = Some(volume.name.clone());
            volumes.push(volume);
        }
    }

    return match_volumes_services_config(service, volume_config, volumes);
}

pub fn is_tmpfs(config: &VolumeMount) -> bool {
    config.tmpfs.is_some() || config.kind.as_deref() == Some("tmpfs")
}

pub fn handle_volume_dict_config(
    service: &mut ComposeService,
    config: &VolumeMount,
    volumes: &mut [ComposeVolume],
) -> Result<(), VolumeError> {
    if is_tmpfs(config) {
        return Ok(());
    }

    let (source, target) = match (&config.source, &config.target) {
        (Some(source), Some(target)) => (source.clone(), target.clone()),
        _ => {
            return Err(VolumeError::MissingKey {
                service: service.name.clone(),
                message: String::from(
                    "Volume configuration, when not tmpfs, requires at least `source` and `target`",
                ),
            })
        }
    };

    let volume_config = VolumeConfig {
        source: Some(source),
        target,
        read_only: config.read_only,
    };

    return match_volumes_services_config(service, volume_config, volumes);
}

fn tmpfs_mount(service: &ComposeService, config: &VolumeMount) -> Result<TmpfsMount, VolumeError> {
    let container_path = match &config.target {
        Some(target) => target.clone(),
        None => {
            return Err(VolumeError::MissingKey {
                service: service.name.clone(),
                message: String::from("When defining tmpfs as volume, you must define a target"),
            })
        }
    };

    return Ok(TmpfsMount {
        container_path,
        size: config.tmpfs.as_ref().and_then(|options| options.size),
    });
}

/// Resolves every volume entry of the service definition.
pub fn map_volumes(
    service: &mut ComposeService,
    volumes: &mut Vec<ComposeVolume>,
) -> Result<(), VolumeError> {
    let entries = service.definition.volumes.clone();
    for entry in &entries {
        match entry {
            ServiceVolume::Long(config) if is_tmpfs(config) => {
                let mount = tmpfs_mount(service, config)?;
                service.tmpfses.push(mount);
            }
            ServiceVolume::Long(config) => handle_volume_dict_config(service, config, volumes)?,
            ServiceVolume::Short(config) => handle_volume_str_config(service, config, volumes)?,
        }
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ServiceDefinition, TmpfsOptions};

    fn service(entries: Vec<ServiceVolume>) -> ComposeService {
        ComposeService::new(
            "web",
            ServiceDefinition {
                volumes: entries,
                ..Default::default()
            },
        )
    }

    #[test]
    fn parses_source_target_and_mode() {
        let mut service = service(Vec::new());
        let mut volumes = vec![ComposeVolume::new("data", VolumeDefinition::default())];

        handle_volume_str_config(&mut service, "data:/srv/data:ro", &mut volumes).unwrap();
        handle_volume_str_config(&mut service, "data:/srv/other:rw", &mut volumes).unwrap();
        handle_volume_str_config(&mut service, "data:/srv/last", &mut volumes).unwrap();

        assert_eq!(
            VolumeAttachment {
                source: String::from("data"),
                target: String::from("/srv/data"),
                read_only: true,
                volume: Some(VolumeId(0)),
            },
            service.volumes[0]
        );
        assert_eq!(false, service.volumes[1].read_only);
        assert_eq!("/srv/other", service.volumes[1].target);
        assert_eq!(false, service.volumes[2].read_only);
        assert_eq!(vec![String::from("web")], volumes[0].services);
    }

    #[test]
    fn host_path_is_a_bind_mount() {
        let mut service = service(vec![ServiceVolume::Short(String::from(
            "/host/path:/data:ro",
        ))]);
        let mut volumes = Vec::new();

        map_volumes(&mut service, &mut volumes).unwrap();

        assert_eq!(
            vec![VolumeAttachment {
                source: String::from("/host/path"),
                target: String::from("/data"),
                read_only: true,
                volume: None,
            }],
            service.volumes
        );
        assert_eq!(true, volumes.is_empty());
    }

    #[test]
    fn missing_source_creates_a_volume() {
        let mut service = service(Vec::new());
        let mut volumes = vec![ComposeVolume::new("cache", VolumeDefinition::default())];

        handle_volume_str_config(&mut service, "/var/lib/data", &mut volumes).unwrap();

        assert_eq!(2, volumes.len());
        let generated = &volumes[1];
        assert_eq!(6, generated.name.len());
        assert_eq!(true, generated.autogenerated);
        assert_eq!(vec![String::from("web")], generated.services);
        assert_eq!(Some(VolumeId(1)), service.volumes[0].volume);
        assert_eq!(generated.name, service.volumes[0].source);
    }

    #[test]
    fn relative_target_is_invalid() {
        let mut service = service(Vec::new());
        let mut volumes = Vec::new();

        let result = handle_volume_str_config(&mut service, "cache:var/cache", &mut volumes);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            VolumeError::InvalidSyntax { config, .. } => assert_eq!("cache:var/cache", config),
            _ => panic!("Expected `InvalidSyntax` error"),
        }
    }

    #[test]
    fn unknown_volume_lists_candidates() {
        let mut service = service(Vec::new());
        let mut volumes = vec![
            ComposeVolume::new("cache", VolumeDefinition::default()),
            ComposeVolume::new("logs", VolumeDefinition::default()),
        ];

        let result = handle_volume_str_config(&mut service, "data:/data", &mut volumes);
        assert_eq!(
            Err(VolumeError::NotFound {
                name: String::from("data"),
                known: vec![String::from("cache"), String::from("logs")],
            }),
            result
        );
        assert_eq!(true, service.volumes.is_empty());
    }

    #[test]
    fn dict_config_requires_source_and_target() {
        let mut service = service(Vec::new());
        let mut volumes = vec![ComposeVolume::new("cache", VolumeDefinition::default())];

        let config = VolumeMount {
            target: Some(String::from("/cache")),
            ..Default::default()
        };
        let result = handle_volume_dict_config(&mut service, &config, &mut volumes);
        match result.err().unwrap() {
            VolumeError::MissingKey { .. } => {}
            _ => panic!("Expected `MissingKey` error"),
        }

        let config = VolumeMount {
            kind: Some(String::from("volume")),
            source: Some(String::from("cache")),
            target: Some(String::from("/cache")),
            read_only: true,
            tmpfs: None,
        };
        handle_volume_dict_config(&mut service, &config, &mut volumes).unwrap();
        assert_eq!(true, service.volumes[0].read_only);
        assert_eq!(Some(VolumeId(0)), service.volumes[0].volume);
    }

    #[test]
    fn tmpfs_bypasses_volume_matching() {
        let mut service = service(vec![
            ServiceVolume::Long(VolumeMount {
                kind: Some(String::from("tmpfs")),
                target: Some(String::from("/tmp")),
                ..Default::default()
            }),
            ServiceVolume::Long(VolumeMount {
                target: Some(String::from("/run")),
                tmpfs: Some(TmpfsOptions { size: Some(128) }),
                ..Default::default()
            }),
        ]);
        let mut volumes = Vec::new();

        map_volumes(&mut service, &mut volumes).unwrap();

        assert_eq!(true, service.volumes.is_empty());
        assert_eq!(
            vec![
                TmpfsMount {
                    container_path: String::from("/tmp"),
                    size: None,
                },
                TmpfsMount {
                    container_path: String::from("/run"),
                    size: Some(128),
                },
            ],
            service.tmpfses
        );
    }

    #[test]
    fn tmpfs_without_target_fails() {
        let mut service = service(vec![ServiceVolume::Long(VolumeMount {
            kind: Some(String::from("tmpfs")),
            ..Default::default()
        })]);
        let mut volumes = Vec::new();

        let result = map_volumes(&mut service, &mut volumes);
        match result.err().unwrap() {
            VolumeError::MissingKey { service, .. } => assert_eq!("web", service),
            _ => panic!("Expected `MissingKey` error"),
        }
    }

    #[test]
    fn volume_kind_follows_driver_options() {
        let mut definition = VolumeDefinition::default();
        assert_eq!(VolumeKind::Named, ComposeVolume::new("a", definition.clone()).kind);

        definition
            .driver_opts
            .insert(String::from("o"), String::from("bind,rw"));
        assert_eq!(VolumeKind::HostBind, ComposeVolume::new("b", definition.clone()).kind);

        definition
            .driver_opts
            .insert(String::from("type"), String::from("tmpfs"));
        assert_eq!(VolumeKind::Tmpfs, ComposeVolume::new("c", definition).kind);
    }
}
