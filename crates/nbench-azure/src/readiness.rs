//! Readiness check backed by the VM instance view.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::Mutex;

use nbench_remoting::ReadinessCheck;

use crate::auth;
use crate::client::AzureClient;
use crate::virtual_machines;

/// Reports a host key ready when its VM is provisioned and running.
///
/// Host keys map to VM names; unmapped keys are used as the VM name.
pub struct AzureReadiness {
    client: Mutex<AzureClient>,
    resource_group: String,
    vm_names: HashMap<String, String>,
}

impl AzureReadiness {
    pub fn new(client: AzureClient, resource_group: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(client),
            resource_group: resource_group.into(),
            vm_names: HashMap::new(),
        }
    }

    pub fn with_vm(mut self, key: impl Into<String>, vm_name: impl Into<String>) -> Self {
        self.vm_names.insert(key.into(), vm_name.into());
        self
    }

    pub fn vm_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.vm_names.get(key).map(String::as_str).unwrap_or(key)
    }
}

#[async_trait]
impl ReadinessCheck<String> for AzureReadiness {
    async fn is_ready(&self, key: &String) -> bool {
        let vm = self.vm_name(key);
        let mut client = self.client.lock().await;

        if let Err(e) = auth::ensure_token(&mut client).await {
            warn!("Azure authentication failed while checking {}: {}", vm, e);
            return false;
        }

        match virtual_machines::get_instance_view(&client, &self.resource_group, vm).await {
            Ok(view) => {
                let ready = virtual_machines::is_ready(&view);
                debug!(
                    "VM {} provisioning={} power={} ready={}",
                    vm,
                    virtual_machines::provisioning_state(&view),
                    virtual_machines::power_state(&view),
                    ready
                );
                ready
            }
            Err(e) => {
                warn!("Could not read instance view of {}: {}", vm, e);
                false
            }
        }
    }
}
