//! Route template compilation.
//!
//! `/user/:id/posts/:post` compiles to the lookup key `/user/:value1/posts/:value2`
//! with parameter names `["id", "post"]`. The key only records *where*
//! placeholders sit, so two templates that differ only in parameter names
//! collide on purpose.

use crate::error::{Result, RexError};

/// Output of [`compile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    /// Template with parameters spelled `:<name>`, for diagnostics
    pub normalized_path: String,
    /// Template with parameters spelled `:value<N>`, the route table key
    pub base_path_key: String,
    /// Parameter names, index-aligned with the placeholders of `base_path_key`
    pub parameter_names: Vec<String>,
}

/// Compile a route template.
///
/// A missing leading `/` is added. Segment rules:
/// - a segment containing `:` is a named parameter, named after its last `:`;
/// - a segment carrying a `*` that is not a lone `*` (e.g. `*.json`, `file*`)
///   is an unnamed parameter called `value<N>`;
/// - a lone `*` is the catch-all and must be the last segment;
/// - anything else is a literal. Empty segments are skipped.
pub fn compile(template: &str) -> Result<CompiledPath> {
    if template.chars().any(|c| c == '?' || c == '#' || c.is_whitespace()) {
        return Err(RexError::invalid_template(
            template,
            "templates cannot contain a query, a fragment or whitespace",
        ));
    }

    let owned;
    let template_path = if template.starts_with('/') {
        template
    } else {
        owned = format!("/{}", template);
        owned.as_str()
    };

    if template_path == "/" {
        return Ok(CompiledPath {
            normalized_path: "/".to_string(),
            base_path_key: String::new(),
            parameter_names: Vec::new(),
        });
    }

    let segments: Vec<&str> = template_path.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.len().saturating_sub(1);

    let mut normalized_path = String::new();
    let mut base_path_key = String::new();
    let mut parameter_names: Vec<String> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if segment.contains(':') {
            let name = segment.rsplit(':').next().unwrap_or_default();
            if name.is_empty() {
                return Err(RexError::invalid_template(template, "empty parameter name"));
            }
            let position = parameter_names.len() + 1;
            base_path_key.push_str(&format!("/:value{}", position));
            normalized_path.push_str(&format!("/:{}", name));
            parameter_names.push(name.to_string());
        } else if segment.contains('*') && *segment != "*" {
            let position = parameter_names.len() + 1;
            let name = format!("value{}", position);
            base_path_key.push_str(&format!("/:{}", name));
            normalized_path.push_str(&format!("/:{}", name));
            parameter_names.push(name);
        } else {
            if *segment == "*" && i != last {
                return Err(RexError::invalid_template(
                    template,
                    "the `*` catch-all must be the last segment",
                ));
            }
            base_path_key.push('/');
            base_path_key.push_str(segment);
            normalized_path.push('/');
            normalized_path.push_str(segment);
        }
    }

    if normalized_path.is_empty() {
        normalized_path.push('/');
    }

    Ok(CompiledPath { normalized_path, base_path_key, parameter_names })
}
