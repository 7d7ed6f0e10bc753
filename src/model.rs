//! Entities produced and consumed during a refresh cycle
//!
//! Everything here lives for a single cycle: instances are created from provider
//! responses, turned into target groups and dropped once the snapshot is delivered.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Label name carrying the scrape address of a target
pub const ADDRESS_LABEL: &str = "__address__";

/// Prefix shared by all discovery metadata labels
pub const META_LABEL_PREFIX: &str = "__meta_oci_";

pub const INSTANCE_ID_LABEL: &str = "__meta_oci_instance_id";
pub const DISPLAY_NAME_LABEL: &str = "__meta_oci_display_name";
pub const COMPARTMENT_ID_LABEL: &str = "__meta_oci_compartment_id";
pub const COMPARTMENT_NAME_LABEL: &str = "__meta_oci_compartment_name";

/// Prefix of the labels synthesized from free-form tags
pub const TAG_LABEL_PREFIX: &str = "__meta_oci_tag_";

/// Label names mapped to values; a later insert of the same key overwrites
pub type LabelSet = BTreeMap<String, String>;

/// A running compute instance with its resolved private address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub display_name: String,
    pub compartment_id: String,

    /// Empty when no attachment exposed a private IP
    pub private_ip: String,

    pub freeform_tags: HashMap<String, String>,
}

/// One discovery unit handed to the downstream consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Stable identity of the group, derived from the instance id
    pub source: String,

    /// Always exactly one target carrying the address label
    pub targets: Vec<LabelSet>,

    pub labels: LabelSet,
}

impl TargetGroup {
    /// Addresses of all targets in this group
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter_map(|target| target.get(ADDRESS_LABEL).map(String::as_str))
    }

    /// The group as one element of a file_sd target list
    pub fn to_file_sd(&self) -> FileSdEntry {
        FileSdEntry {
            targets: self.addresses().map(str::to_string).collect(),
            labels: self.labels.clone(),
        }
    }
}

/// Element of the JSON array read by Prometheus' file based discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSdEntry {
    pub targets: Vec<String>,
    pub labels: LabelSet,
}
