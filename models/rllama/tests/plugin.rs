mod common;

use common::{builder, llama};
use pretty_assertions::assert_eq;
use rllama::prelude::*;

#[test]
fn import_kwargs_split_only_across_multiple_accelerators() {
    let single = llama().import_kwargs();
    assert_eq!(single.model.device_map, None);

    let multi = builder()
        .with_device_inventory(FixedDeviceInventory(4))
        .build()
        .import_kwargs();
    assert_eq!(multi.model.device_map, Some(DeviceMap::Auto));
    assert_eq!(multi.tokenizer, TokenizerImportOptions::default());
}

#[test]
fn injected_templates_can_require_more_placeholders() {
    let llama = builder()
        .with_prompt_templates(
            LlamaPromptTemplates::default().with_v2("[SYS] {system} [USER] {instruction}"),
        )
        .build();

    let sanitized = llama
        .sanitize_parameters(SanitizeRequest::new("hello").with_attr("system", "be brief"))
        .unwrap();
    assert_eq!(sanitized.prompt, "[SYS] be brief [USER] hello");

    let err = llama
        .sanitize_parameters(SanitizeRequest::new("hello"))
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(
        err,
        PluginError::MissingTemplateVariable { ref missing, .. } if missing == "system"
    ));
    assert!(message.contains("instruction, system"), "{message}");
}

#[test]
fn primary_slot_attribute_is_rejected() {
    let err = llama()
        .sanitize_parameters(SanitizeRequest::new("hello").with_attr("instruction", "again"))
        .unwrap_err();
    assert!(matches!(err, PluginError::PrimarySlotCollision { .. }));
}

#[test]
fn empty_generations_have_no_response() {
    let err = llama().postprocess_generate("hello", Vec::new()).unwrap_err();
    assert!(matches!(err, PluginError::EmptyGeneration));
}

#[test]
fn plugin_reports_llama_metadata() {
    let llama = llama();
    assert_eq!(llama.config().name(), "llama");
    assert_eq!(llama.llama_config().url(), "https://github.com/facebookresearch/llama");
    assert!(llama.device().is_cpu());
}
