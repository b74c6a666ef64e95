use super::volumes::{TmpfsMount, VolumeAttachment};
use super::ServiceDefinition;
use crate::cfn::logical_name;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeService {
    pub name: String,
    pub logical_name: String,
    pub definition: ServiceDefinition,
    pub volumes: Vec<VolumeAttachment>,
    pub tmpfses: Vec<TmpfsMount>,
}

impl ComposeService {
    pub fn new(name: &str, definition: ServiceDefinition) -> Self {
        Self {
            name: name.to_string(),
            logical_name: logical_name(name),
            definition,
            volumes: Vec::new(),
            tmpfses: Vec::new(),
        }
    }

    pub fn image(&self) -> &str {
        self.definition.image.as_deref().unwrap_or(&self.name)
    }
}
