//! Template selector: maps the `template` query parameter to a renderer.
//!
//! Total over its input: an unknown, missing or malformed id resolves to the
//! default template instead of failing.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: u8,
    /// Key of the client-side renderer.
    pub renderer: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const DEFAULT_TEMPLATE_ID: u8 = 1;

pub const TEMPLATES: [Template; 3] = [
    Template {
        id: 1,
        renderer: "template1",
        name: "Glassmorphism",
        description: "Modern glass effect design",
    },
    Template {
        id: 2,
        renderer: "template2",
        name: "Sidebar Pro",
        description: "Professional sidebar layout",
    },
    Template {
        id: 3,
        renderer: "template3",
        name: "Timeline",
        description: "Creative timeline showcase",
    },
];

pub fn default_template() -> &'static Template {
    &TEMPLATES[0]
}

pub fn resolve(template_id: Option<i64>) -> &'static Template {
    template_id
        .and_then(|id| TEMPLATES.iter().find(|t| i64::from(t.id) == id))
        .unwrap_or_else(default_template)
}

/// Resolves the raw query parameter value.
pub fn resolve_param(raw: Option<&str>) -> &'static Template {
    resolve(raw.and_then(|s| s.trim().parse::<i64>().ok()))
}
