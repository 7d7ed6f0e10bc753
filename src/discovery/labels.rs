//! Conversion of resolved instances into target groups

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{
    ADDRESS_LABEL, COMPARTMENT_ID_LABEL, COMPARTMENT_NAME_LABEL, DISPLAY_NAME_LABEL,
    INSTANCE_ID_LABEL, Instance, LabelSet, TAG_LABEL_PREFIX, TargetGroup,
};

static INVALID_LABEL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9_]").expect("valid label character pattern"));

/// Turn an arbitrary tag key into a valid label name suffix
///
/// Invalid characters become `_`, the result is lowercased and a leading
/// character that is neither a letter nor `_` gets a `_` prepended.
pub fn sanitize_label_name(name: &str) -> String {
    let sanitized = INVALID_LABEL_CHARS.replace_all(name, "_").to_lowercase();

    match sanitized.chars().next() {
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => format!("_{sanitized}"),
        _ => sanitized,
    }
}

/// Identity of the group emitted for an instance, stable across cycles
pub fn group_source(instance_id: &str) -> String {
    format!("OCI_{instance_id}_")
}

/// Build the target group of an instance
pub fn synthesize(instance: &Instance, compartment_name: &str, port: u16) -> TargetGroup {
    let address = format!("{}:{}", instance.private_ip, port);

    let mut labels = LabelSet::new();
    labels.insert(INSTANCE_ID_LABEL.to_string(), instance.id.clone());
    labels.insert(DISPLAY_NAME_LABEL.to_string(), instance.display_name.clone());
    labels.insert(COMPARTMENT_ID_LABEL.to_string(), instance.compartment_id.clone());
    labels.insert(COMPARTMENT_NAME_LABEL.to_string(), compartment_name.to_string());
    labels.insert(ADDRESS_LABEL.to_string(), address.clone());

    for (key, value) in &instance.freeform_tags {
        labels.insert(
            format!("{TAG_LABEL_PREFIX}{}", sanitize_label_name(key)),
            value.clone(),
        );
    }

    TargetGroup {
        source: group_source(&instance.id),
        targets: vec![LabelSet::from([(ADDRESS_LABEL.to_string(), address)])],
        labels,
    }
}
