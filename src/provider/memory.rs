//! In-memory provider (no network access)
//!
//! Holds a fixed inventory of compartments and instances. It's useful for:
//! - Testing the refresh pipeline without provider credentials
//! - Simulating pagination, stuck cursors and failing calls deterministically
//!
//! Listing order is insertion order, so the emitted target groups are
//! reproducible across runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::trace;

use super::{
    CloudProvider, InstancePage, InstancePageRequest, InstanceSummary, PageCursor,
    ProviderResult, Vnic, VnicAttachment,
};
use crate::error::ProviderError;

/// Default number of instances per listing page
const DEFAULT_PAGE_SIZE: usize = 50;

/// Cursor returned forever when sticky pagination is enabled
const STICKY_CURSOR: &str = "sticky";

/// Lifecycle states an instance can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Provisioning,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

/// Provider operations, used for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListCompartments,
    CompartmentName,
    ListInstances,
    ListVnicAttachments,
    GetVnic,
}

/// An instance held by the [`MemoryProvider`]
#[derive(Debug, Clone)]
pub struct MemoryInstance {
    pub summary: InstanceSummary,
    pub state: LifecycleState,

    /// Private IP of each attached interface, in attachment order
    pub vnics: Vec<Option<String>>,
}

impl MemoryInstance {
    /// A running instance with a single interface
    pub fn running(
        id: impl Into<String>,
        display_name: impl Into<String>,
        compartment_id: impl Into<String>,
        private_ip: impl Into<String>,
    ) -> Self {
        Self {
            summary: InstanceSummary {
                id: id.into(),
                display_name: display_name.into(),
                compartment_id: compartment_id.into(),
                freeform_tags: HashMap::new(),
            },
            state: LifecycleState::Running,
            vnics: vec![Some(private_ip.into())],
        }
    }

    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.summary.freeform_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_vnics(mut self, vnics: Vec<Option<String>>) -> Self {
        self.vnics = vnics;
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryCompartment {
    id: String,
    name: String,
    parent: Option<String>,
}

/// In-memory provider with a fixed inventory
pub struct MemoryProvider {
    compartments: Vec<MemoryCompartment>,
    instances: Vec<MemoryInstance>,
    page_size: usize,
    sticky_cursor: bool,

    /// Injected failures; `None` as id fails every call of the operation
    failures: Mutex<HashMap<(Operation, Option<String>), String>>,

    calls: Mutex<HashMap<Operation, usize>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            compartments: Vec::new(),
            instances: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            sticky_cursor: false,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Add a top-level compartment
    pub fn with_compartment(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.compartments.push(MemoryCompartment {
            id: id.into(),
            name: name.into(),
            parent: None,
        });
        self
    }

    /// Add a compartment beneath `parent`
    pub fn with_child_compartment(
        mut self,
        parent: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.compartments.push(MemoryCompartment {
            id: id.into(),
            name: name.into(),
            parent: Some(parent.into()),
        });
        self
    }

    pub fn with_instance(mut self, instance: MemoryInstance) -> Self {
        self.instances.push(instance);
        self
    }

    /// Number of instances per listing page (at least one)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every instance page advertise the same next-page cursor
    pub fn with_sticky_cursor(mut self) -> Self {
        self.sticky_cursor = true;
        self
    }

    /// Fail every subsequent call of `operation`
    pub fn fail(&self, operation: Operation) {
        self.lock_failures()
            .insert((operation, None), format!("{operation:?} unavailable"));
    }

    /// Fail subsequent calls of `operation` whose primary argument is `id`
    pub fn fail_for(&self, operation: Operation, id: impl Into<String>) {
        let id = id.into();
        let message = format!("{operation:?} unavailable for {id}");
        self.lock_failures().insert((operation, Some(id)), message);
    }

    /// Remove all injected failures
    pub fn recover(&self) {
        self.lock_failures().clear();
    }

    /// How often `operation` was called so far
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<(Operation, Option<String>), String>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and return the injected failure, if any
    fn enter(&self, operation: Operation, id: &str) -> ProviderResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(operation)
            .or_default() += 1;

        let failures = self.lock_failures();
        let failure = failures
            .get(&(operation, Some(id.to_string())))
            .or_else(|| failures.get(&(operation, None)));

        match failure {
            Some(message) => Err(ProviderError::Injected(message.clone())),
            None => Ok(()),
        }
    }

    fn find_instance(&self, instance_id: &str) -> Option<&MemoryInstance> {
        self.instances
            .iter()
            .find(|instance| instance.summary.id == instance_id)
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Attachment and interface ids are derived from the instance id and position
fn vnic_id(instance_id: &str, index: usize) -> String {
    format!("{instance_id}/vnic{index}")
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    async fn list_child_compartments(&self, parent_id: &str) -> ProviderResult<Vec<String>> {
        self.enter(Operation::ListCompartments, parent_id)?;

        Ok(self
            .compartments
            .iter()
            .filter(|c| c.parent.as_deref() == Some(parent_id))
            .map(|c| c.id.clone())
            .collect())
    }

    async fn compartment_name(&self, compartment_id: &str) -> ProviderResult<String> {
        self.enter(Operation::CompartmentName, compartment_id)?;

        self.compartments
            .iter()
            .find(|c| c.id == compartment_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: format!("compartment {compartment_id} not found"),
            })
    }

    async fn list_instances(&self, request: &InstancePageRequest) -> ProviderResult<InstancePage> {
        self.enter(Operation::ListInstances, &request.compartment_id)?;

        let matching: Vec<&InstanceSummary> = self
            .instances
            .iter()
            .filter(|i| i.state == LifecycleState::Running)
            .filter(|i| i.summary.compartment_id == request.compartment_id)
            .filter(|i| {
                request
                    .display_name
                    .as_ref()
                    .is_none_or(|name| &i.summary.display_name == name)
            })
            .map(|i| &i.summary)
            .collect();

        let offset = match &request.page {
            None => 0,
            Some(cursor) if cursor.as_str() == STICKY_CURSOR => 0,
            Some(cursor) => cursor.as_str().parse::<usize>().map_err(|_| {
                ProviderError::Status {
                    status: 400,
                    body: format!("invalid page token {cursor}"),
                }
            })?,
        };

        let end = (offset + self.page_size).min(matching.len());
        let items = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|summary| (*summary).clone())
            .collect();

        let next_page = if self.sticky_cursor {
            Some(PageCursor::new(STICKY_CURSOR))
        } else if end < matching.len() {
            Some(PageCursor::new(end.to_string()))
        } else {
            None
        };

        trace!(
            compartment_id = %request.compartment_id,
            offset,
            has_next = next_page.is_some(),
            "served instance page"
        );

        Ok(InstancePage { items, next_page })
    }

    async fn list_vnic_attachments(
        &self,
        instance_id: &str,
        _compartment_id: &str,
    ) -> ProviderResult<Vec<VnicAttachment>> {
        self.enter(Operation::ListVnicAttachments, instance_id)?;

        Ok(self
            .find_instance(instance_id)
            .map(|instance| {
                (0..instance.vnics.len())
                    .map(|index| VnicAttachment {
                        id: format!("{instance_id}/attachment{index}"),
                        vnic_id: Some(vnic_id(instance_id, index)),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_vnic(&self, vnic_id: &str) -> ProviderResult<Vnic> {
        self.enter(Operation::GetVnic, vnic_id)?;

        let not_found = || ProviderError::Status {
            status: 404,
            body: format!("vnic {vnic_id} not found"),
        };

        let (instance_id, index) = vnic_id.rsplit_once("/vnic").ok_or_else(not_found)?;
        let index: usize = index.parse().map_err(|_| not_found())?;

        let private_ip = self
            .find_instance(instance_id)
            .and_then(|instance| instance.vnics.get(index))
            .ok_or_else(not_found)?
            .clone();

        Ok(Vnic {
            id: vnic_id.to_string(),
            private_ip,
        })
    }
}
