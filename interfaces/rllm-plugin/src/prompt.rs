use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

/// An error that can occur while parsing or filling a `{name}` prompt template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A `{` or `}` without a partner.
    #[error("Unmatched brace at byte {position} of the prompt template (use '{{{{' or '}}}}' for a literal brace)")]
    UnmatchedBrace {
        /// The byte offset of the brace.
        position: usize,
    },
    /// A `{` inside a placeholder.
    #[error("Nested placeholder at byte {position} of the prompt template")]
    NestedField {
        /// The byte offset of the outer placeholder.
        position: usize,
    },
    /// A `{}` or `{0}` placeholder. Prompt templates only support named placeholders.
    #[error("Positional placeholder at byte {position} of the prompt template; only named placeholders are supported")]
    PositionalField {
        /// The byte offset of the placeholder.
        position: usize,
    },
    /// A placeholder with a format spec, conversion, attribute or index access.
    #[error("Unsupported placeholder '{{{field}}}' in the prompt template; only plain '{{name}}' placeholders are supported")]
    UnsupportedField {
        /// The placeholder text between the braces.
        field: String,
    },
    /// A placeholder that was not given a value.
    #[error("Missing value for placeholder '{0}'")]
    MissingVariable(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(String),
    Field(&'a str),
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, FormatError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|(_, next)| *next == '{').is_some() {
                    literal.push('{');
                    continue;
                }
                let start = position + 1;
                let end = loop {
                    match chars.next() {
                        Some((end, '}')) => break end,
                        Some((_, '{')) => return Err(FormatError::NestedField { position }),
                        Some(_) => {}
                        None => return Err(FormatError::UnmatchedBrace { position }),
                    }
                };
                let field = &template[start..end];
                if field.is_empty() || field.chars().all(|c| c.is_ascii_digit()) {
                    return Err(FormatError::PositionalField { position });
                }
                if field.contains(&[':', '!', '.', '[', ']'][..]) {
                    return Err(FormatError::UnsupportedField {
                        field: field.to_string(),
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(field));
            }
            '}' => {
                if chars.next_if(|(_, next)| *next == '}').is_some() {
                    literal.push('}');
                } else {
                    return Err(FormatError::UnmatchedBrace { position });
                }
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

/// Get the set of placeholder names a template references.
///
/// ```rust
/// use rllm_plugin::extract_template_variables;
///
/// let variables = extract_template_variables("{system}\n{instruction} {{literal}}").unwrap();
/// assert_eq!(variables.into_iter().collect::<Vec<_>>(), ["instruction", "system"]);
/// ```
pub fn extract_template_variables(template: &str) -> Result<BTreeSet<String>, FormatError> {
    Ok(parse_template(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Field(name) => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Fill every placeholder of a template with a value.
pub fn format_template(
    template: &str,
    values: &HashMap<String, String>,
) -> Result<String, FormatError> {
    let mut output = String::with_capacity(template.len());
    for segment in parse_template(template)? {
        match segment {
            Segment::Literal(text) => output.push_str(&text),
            Segment::Field(name) => match values.get(name) {
                Some(value) => output.push_str(value),
                None => return Err(FormatError::MissingVariable(name.to_string())),
            },
        }
    }
    Ok(output)
}

/// The version of a model family's default prompt template.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateVersion {
    /// The plain template.
    V1,
    /// The chat-tuned template.
    #[default]
    V2,
}

impl Display for TemplateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateVersion::V1 => write!(f, "v1"),
            TemplateVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Resolves a model family's default prompt template for a version.
pub trait PromptTemplateResolver {
    /// Get the template text for a version.
    fn resolve(&self, version: TemplateVersion) -> Cow<'_, str>;
}
