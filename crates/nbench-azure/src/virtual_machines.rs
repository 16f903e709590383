//! Virtual machine runtime status.

use log::debug;

use crate::client::AzureClient;
use crate::types::{AzureResult, VmInstanceView};

/// Get the instance view (detailed runtime status) of a VM.
pub async fn get_instance_view(
    client: &AzureClient,
    resource_group: &str,
    vm_name: &str,
) -> AzureResult<VmInstanceView> {
    let api = &client.config().api_version_compute;
    let url = client.resource_group_url(
        resource_group,
        &format!(
            "/providers/Microsoft.Compute/virtualMachines/{}/instanceView?api-version={}",
            vm_name, api
        ),
    )?;
    debug!("get_instance_view({}/{}) → {}", resource_group, vm_name, url);
    client.get_json(&url).await
}

/// Suffix of the first status code with the given prefix, e.g. `running`
/// for `PowerState/`.
pub fn status_value<'a>(view: &'a VmInstanceView, prefix: &str) -> Option<&'a str> {
    view.statuses
        .iter()
        .find_map(|s| s.code.strip_prefix(prefix))
}

pub fn power_state(view: &VmInstanceView) -> &str {
    status_value(view, "PowerState/").unwrap_or("unknown")
}

pub fn provisioning_state(view: &VmInstanceView) -> &str {
    status_value(view, "ProvisioningState/").unwrap_or("unknown")
}

/// A VM can take a remoting session once provisioning succeeded and it runs.
pub fn is_ready(view: &VmInstanceView) -> bool {
    provisioning_state(view).eq_ignore_ascii_case("succeeded")
        && power_state(view).eq_ignore_ascii_case("running")
}
