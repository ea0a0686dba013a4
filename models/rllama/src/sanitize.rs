use std::collections::HashMap;

use rllm_plugin::{
    extract_template_variables, format_template, FormatError, PluginError,
    PromptTemplateResolver, SanitizeRequest, SanitizedRequest,
};
use serde_json::{Map, Value};

/// The placeholder the user's prompt fills.
pub const PRIMARY_SLOT: &str = "instruction";

/// Render an attribute value the way it is written into a prompt: strings as-is, anything else
/// the way Python's `str()` prints it (`True`, `None`, `[1, 'a']`).
fn render_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => python_repr(&other),
    }
}

fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        Value::Array(items) => {
            let items = items.iter().map(python_repr).collect::<Vec<_>>();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(key, value)| format!("{}: {}", quote(key), python_repr(value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Quote a string nested in a list or dict. Double quotes only when the text has single quotes and no double quotes.
fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}

/// Turn a raw request into the final prompt and the four generation overrides.
///
/// With the default prompt template disabled the prompt is passed through untouched and the
/// attributes are ignored. Otherwise the prompt fills the [`PRIMARY_SLOT`] of the template for
/// the requested version and attributes fill the template's other placeholders. Attributes that
/// are not placeholders of the template are dropped.
pub fn sanitize(
    templates: &dyn PromptTemplateResolver,
    request: SanitizeRequest,
) -> Result<SanitizedRequest, PluginError> {
    let generation_config = request.overrides();
    let SanitizeRequest {
        prompt,
        use_default_prompt_template,
        template_version,
        attrs,
        ..
    } = request;

    if !use_default_prompt_template {
        return Ok(SanitizedRequest {
            prompt,
            generation_config,
            extra: Map::new(),
        });
    }

    let template = templates.resolve(template_version);
    let required = extract_template_variables(&template)?;

    let mut values = HashMap::new();
    for (key, value) in attrs {
        if !required.contains(&key) {
            tracing::debug!(key = %key, template = %template_version, "dropping attribute that is not a prompt template placeholder");
            continue;
        }
        if key == PRIMARY_SLOT {
            return Err(PluginError::PrimarySlotCollision { slot: key });
        }
        values.insert(key, render_value(value));
    }
    values.insert(PRIMARY_SLOT.to_string(), prompt);

    let prompt = format_template(&template, &values).map_err(|err| match err {
        FormatError::MissingVariable(missing) => PluginError::MissingTemplateVariable {
            missing,
            required: required.clone(),
        },
        err => err.into(),
    })?;

    Ok(SanitizedRequest {
        prompt,
        generation_config,
        extra: Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlamaPromptTemplates;
    use pretty_assertions::assert_eq;
    use rllm_plugin::{GenerationOverrides, TemplateVersion};
    use serde_json::json;

    fn templates() -> LlamaPromptTemplates {
        LlamaPromptTemplates::default().with_v2("<<{system}>> {instruction} [{count}]")
    }

    #[test]
    fn disabled_template_passes_the_prompt_through() {
        let request = SanitizeRequest::new("  raw {prompt} ")
            .with_default_prompt_template(false)
            .with_attr("instruction", "ignored")
            .with_top_k(7)
            .with_top_p(0.8)
            .with_temperature(0.3)
            .with_max_new_tokens(42);
        let sanitized = sanitize(&templates(), request).unwrap();
        assert_eq!(sanitized.prompt, "  raw {prompt} ");
        assert_eq!(
            sanitized.generation_config,
            GenerationOverrides {
                max_new_tokens: Some(42),
                temperature: Some(0.3),
                top_p: Some(0.8),
                top_k: Some(7),
            }
        );
        assert!(sanitized.extra.is_empty());
    }

    #[test]
    fn attributes_fill_the_other_placeholders() {
        let request = SanitizeRequest::new("hi")
            .with_attr("system", "be brief")
            .with_attr("count", 3)
            .with_attr("unrelated", "dropped");
        let sanitized = sanitize(&templates(), request).unwrap();
        assert_eq!(sanitized.prompt, "<<be brief>> hi [3]");
    }

    #[test]
    fn plain_template_is_the_prompt() {
        let request = SanitizeRequest::new("hi").with_llama2_prompt(false);
        let sanitized = sanitize(&templates(), request).unwrap();
        assert_eq!(sanitized.prompt, "hi");
    }

    #[test]
    fn instruction_attribute_collides_with_the_prompt() {
        let request = SanitizeRequest::new("hi").with_attr("instruction", "other");
        let err = sanitize(&templates(), request).unwrap_err();
        assert!(matches!(err, PluginError::PrimarySlotCollision { slot } if slot == "instruction"));
    }

    #[test]
    fn missing_placeholder_reports_the_required_set() {
        let request = SanitizeRequest::new("hi").with_attr("system", "be brief");
        let err = sanitize(&templates(), request).unwrap_err();
        let PluginError::MissingTemplateVariable { missing, required } = err else {
            panic!("expected a missing template variable error");
        };
        assert_eq!(missing, "count");
        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec!["count", "instruction", "system"]
        );
    }

    #[test]
    fn generation_knobs_keep_unset_values() {
        let request = SanitizeRequest::new("hi")
            .with_llama2_prompt(false)
            .with_top_p(0.5);
        let sanitized = sanitize(&templates(), request).unwrap();
        assert_eq!(
            sanitized.generation_config,
            GenerationOverrides::default().with_top_p(0.5)
        );
        assert_eq!(
            serde_json::Value::Object(sanitized.generation_config.to_map()),
            json!({"max_new_tokens": null, "temperature": null, "top_p": 0.5, "top_k": null})
        );
    }

    #[test]
    fn non_string_values_render_like_python() {
        assert_eq!(render_value(json!("text")), "text");
        assert_eq!(render_value(json!(1.5)), "1.5");
        assert_eq!(render_value(json!(3)), "3");
        assert_eq!(render_value(json!(true)), "True");
        assert_eq!(render_value(json!(false)), "False");
        assert_eq!(render_value(json!(null)), "None");
        assert_eq!(render_value(json!([1, 2])), "[1, 2]");
        assert_eq!(render_value(json!(["a", "it's"])), "['a', \"it's\"]");
        assert_eq!(render_value(json!({"k": [true, null]})), "{'k': [True, None]}");
    }

    #[test]
    fn attribute_values_fill_the_template_like_python() {
        let templates =
            LlamaPromptTemplates::default().with_v2("{instruction} {flag} {none} {list}");
        let request = SanitizeRequest::new("hi")
            .with_attr("flag", true)
            .with_attr("none", Value::Null)
            .with_attr("list", json!([1, 2]));
        let sanitized = sanitize(&templates, request).unwrap();
        assert_eq!(sanitized.prompt, "hi True None [1, 2]");
    }

    #[test]
    fn template_version_selects_the_template() {
        let request = SanitizeRequest::new("hi").with_template_version(TemplateVersion::V1);
        assert_eq!(sanitize(&templates(), request).unwrap().prompt, "hi");
    }
}
