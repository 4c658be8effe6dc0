//! Interactive form fields of assembled documents.
//!
//! The written `/AcroForm` lists the root fields of the opened document
//! followed by the root fields reached from widget annotations of imported
//! pages. A root field from another source whose name is already taken is
//! renamed `name_N` with the smallest free `N`.

use crate::config::FieldRenameHook;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{decode_text_string, Dictionary, Object};
use crate::remap::OriginId;
use std::collections::HashSet;

/// Deepest field hierarchy followed upwards from a widget.
const MAX_FIELD_DEPTH: usize = 64;

/// A widget annotation found on a written page.
#[derive(Debug, Clone)]
pub(crate) struct Widget {
    pub(crate) origin: OriginId,
    pub(crate) number: u32,
    pub(crate) annot: Object,
}

/// A top-level field and the name it is written under, if renamed.
#[derive(Debug, Clone)]
pub(crate) struct RootField {
    pub(crate) origin: OriginId,
    pub(crate) number: u32,
    pub(crate) body: Object,
    pub(crate) rename: Option<String>,
}

/// Everything the writer needs for `/AcroForm`.
#[derive(Debug, Default)]
pub(crate) struct FormPlan {
    /// AcroForm entries other than `/Fields`, in the numbering of their origin
    pub(crate) base: Option<(OriginId, Dictionary)>,
    pub(crate) fields: Vec<RootField>,
}

impl FormPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn partial_name(field: &Object) -> Option<String> {
    field.get("T").and_then(Object::as_string).map(decode_text_string)
}

fn is_field(obj: &Object) -> bool {
    obj.get("FT").is_some() || obj.get("T").is_some() || obj.get("Kids").is_some()
}

/// The `/AcroForm` of an origin without its `/Fields`, plus the field refs.
fn acroform(doc: &Document, origin: OriginId) -> Result<Option<(Dictionary, Vec<u32>)>> {
    let Some(reader) = doc.origin(origin).and_then(|o| o.reader()) else {
        return Ok(None);
    };
    let catalog = reader.catalog()?;
    let Some(entry) = catalog.get("AcroForm") else {
        return Ok(None);
    };
    let form = reader.deref(entry)?;
    let found = form.type_name();
    let Object::Dictionary(mut dict) = form else {
        return Err(Error::structural(format!("/AcroForm of {} is a {}, not a dictionary", origin, found)));
    };
    let fields = match dict.remove("Fields") {
        Some(fields) => reader.deref(&fields)?,
        None => Object::Array(Vec::new()),
    };
    let numbers = fields
        .as_array()
        .ok_or_else(|| Error::structural(format!("/Fields of {} is not an array", origin)))?
        .iter()
        .filter_map(Object::as_reference)
        .map(|r| r.id)
        .collect();
    Ok(Some((dict, numbers)))
}

/// Follow `/Parent` from a widget up to its root field.
fn root_of(doc: &Document, widget: &Widget) -> Result<Option<(u32, Object)>> {
    let origin = doc
        .origin(widget.origin)
        .ok_or_else(|| Error::structural(format!("unknown origin {}", widget.origin)))?;
    let mut number = widget.number;
    let mut node = widget.annot.clone();
    let mut visited = HashSet::from([number]);
    for _ in 0..MAX_FIELD_DEPTH {
        let Some(parent) = node.get("Parent").and_then(Object::as_reference) else {
            return Ok(is_field(&node).then_some((number, node)));
        };
        if !visited.insert(parent.id) {
            return Err(Error::CircularReference(parent));
        }
        number = parent.id;
        node = origin.fetch(parent.id)?;
    }
    Err(Error::structural(format!(
        "form field hierarchy above widget {} of {} is deeper than {}",
        widget.number, widget.origin, MAX_FIELD_DEPTH
    )))
}

fn free_name(name: &str, taken: &HashSet<String>) -> String {
    (1..)
        .map(|n| format!("{}_{}", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Gather the root fields to write and settle their names.
pub(crate) fn collect_fields(doc: &Document, widgets: &[Widget], hook: Option<&FieldRenameHook>) -> Result<FormPlan> {
    let mut plan = FormPlan::default();
    let mut seen: HashSet<(OriginId, u32)> = HashSet::new();
    let mut taken: HashSet<String> = HashSet::new();

    if let Some(primary) = doc.primary {
        if let Some((base, numbers)) = acroform(doc, primary)? {
            let origin = doc
                .origin(primary)
                .ok_or_else(|| Error::structural(format!("unknown origin {}", primary)))?;
            for number in numbers {
                if !seen.insert((primary, number)) {
                    continue;
                }
                let body = origin.fetch(number)?;
                if let Some(name) = partial_name(&body) {
                    taken.insert(name);
                }
                plan.fields.push(RootField {
                    origin: primary,
                    number,
                    body,
                    rename: None,
                });
            }
            plan.base = Some((primary, base));
        }
    }

    for widget in widgets {
        let Some((number, body)) = root_of(doc, widget)? else {
            continue;
        };
        if !seen.insert((widget.origin, number)) {
            continue;
        }
        if plan.base.is_none() {
            if let Some((base, _)) = acroform(doc, widget.origin)? {
                plan.base = Some((widget.origin, base));
            }
        }

        let mut rename = None;
        if let Some(name) = partial_name(&body) {
            let final_name = if taken.contains(&name) {
                let proposed = free_name(&name, &taken);
                let chosen = hook.and_then(|h| h(&name, &proposed)).unwrap_or(proposed);
                if taken.contains(&chosen) {
                    log::warn!("Renamed form field '{}' still collides as '{}'", name, chosen);
                }
                log::info!("Renaming form field '{}' of {} to '{}'", name, widget.origin, chosen);
                rename = Some(chosen.clone());
                chosen
            } else {
                name
            };
            taken.insert(final_name);
        }
        plan.fields.push(RootField {
            origin: widget.origin,
            number,
            body,
            rename,
        });
    }

    if !plan.fields.is_empty() {
        log::debug!("Form has {} root fields", plan.fields.len());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_name_skips_taken() {
        let taken: HashSet<String> = ["name", "name_1", "name_2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(free_name("name", &taken), "name_3");
        assert_eq!(free_name("other", &taken), "other_1");
    }

    #[test]
    fn test_field_detection() {
        let widget = Object::dict([("Subtype", Object::name("Widget"))]);
        let field = Object::dict([("FT", Object::name("Tx")), ("T", Object::String(b"email".to_vec()))]);
        assert!(!is_field(&widget));
        assert!(is_field(&field));
        assert_eq!(partial_name(&field).as_deref(), Some("email"));
    }

    #[test]
    fn test_no_sources_no_fields() {
        let doc = Document::new();
        let plan = collect_fields(&doc, &[], None).unwrap();
        assert!(plan.is_empty());
        assert!(plan.base.is_none());
    }
}
