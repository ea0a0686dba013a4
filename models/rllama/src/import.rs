use rllm_plugin::{DeviceInventory, DeviceMap, ImportOptions, ModelImportOptions};

/// The options the host should load Llama weights with. Weights are split across accelerators
/// only when there is more than one.
pub fn import_options(devices: &dyn DeviceInventory) -> ImportOptions {
    let accelerators = devices.accelerator_count();
    let device_map = (accelerators > 1).then_some(DeviceMap::Auto);
    tracing::info!(accelerators, ?device_map, "choosing device placement");
    ImportOptions {
        model: ModelImportOptions { device_map },
        ..Default::default()
    }
}

#[test]
fn only_multiple_accelerators_use_auto_placement() {
    use rllm_plugin::FixedDeviceInventory;

    for (count, expected) in [(0, None), (1, None), (2, Some(DeviceMap::Auto)), (8, Some(DeviceMap::Auto))] {
        let options = import_options(&FixedDeviceInventory(count));
        assert_eq!(options.model.device_map, expected, "{count} accelerators");
    }
}
