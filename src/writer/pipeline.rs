//! Numbering and emission of one document.
//!
//! A write runs in two phases over one [`WriteSession`]:
//!
//! 1. Numbering walks the document's explicit structures (catalog, info,
//!    actions, page tree, outline, form, resources, object streams, encrypt
//!    dictionary) and hands each one its output number. Nothing is written.
//! 2. Emission writes the planned objects phase by phase. Their bodies are
//!    still in the numbering of their origin; while a body is rewritten,
//!    every reference that has no output number yet is pulled in from its
//!    origin, numbered and queued, and the queue is drained right after the
//!    object that discovered it.
//!
//! Every reference seen during rewriting is also pooled, and a final sweep
//! writes anything in the pool that is numbered but still unwritten.

use super::output::PdfOutput;
use super::rewrite::rewrite_references;
use super::session::{Pending, WriteSession};
use super::xref_writer::xref_stream;
use crate::config::{ObjectCategory, PdfVersion, WriteOptions};
use crate::document::{Document, PageKey};
use crate::encryption::{ObjectCipher, SecurityHandler, StandardSecurityHandler};
use crate::error::{Error, Result};
use crate::filters::flate_encode;
use crate::forms::{collect_fields, Widget};
use crate::object::{text_string, Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStreamBuilder;
use crate::remap::{OriginId, Slot};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Write;

/// Catalog entries that are always rebuilt rather than carried over.
const REBUILT_CATALOG_KEYS: [&str; 5] = ["Type", "Pages", "AcroForm", "PageLabels", "StructTreeRoot"];

/// Emission groups, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Catalog,
    Info,
    Actions,
    Pages,
    ProcSet,
    Fonts,
    Images,
    Bookmarks,
    Forms,
    ObjectStreams,
}

/// Body of a planned object.
#[derive(Debug)]
enum Body {
    /// Already in output numbering
    Direct(Object),
    /// In the numbering of an origin; rewritten at emission
    Origin(OriginId, Object),
    /// Object stream holding the packed group with this index
    ObjectStream(usize),
}

#[derive(Debug)]
struct Planned {
    number: u32,
    phase: Phase,
    category: Option<ObjectCategory>,
    body: Body,
    /// Entries in output numbering, set after rewriting
    overrides: Dictionary,
}

impl Planned {
    fn new(number: u32, phase: Phase, category: Option<ObjectCategory>, body: Body) -> Self {
        Self {
            number,
            phase,
            category,
            body,
            overrides: Dictionary::new(),
        }
    }

    fn with(mut self, key: &str, value: Object) -> Self {
        self.overrides.insert(key.to_string(), value);
        self
    }

    fn is_stream(&self) -> bool {
        match &self.body {
            Body::Direct(obj) | Body::Origin(_, obj) => obj.is_stream(),
            Body::ObjectStream(_) => true,
        }
    }
}

/// Result of the numbering phase.
struct Plan {
    version: PdfVersion,
    objects: Vec<Planned>,
    catalog: u32,
    info: u32,
    encrypt: Option<(u32, Dictionary)>,
    cipher: Option<ObjectCipher>,
    file_id: (Vec<u8>, Vec<u8>),
}

fn reference(number: u32) -> Object {
    Object::Reference(ObjectRef::new(number, 0))
}

/// Whether a planned object goes into an object stream.
fn packable(planned: &Planned, options: &WriteOptions, version: PdfVersion) -> bool {
    version.uses_xref_stream()
        && !planned.is_stream()
        && planned.category.is_some_and(|c| options.compressible.contains(&c))
}

/// Output version: the requested one, raised to what the encryption needs.
fn output_version(doc: &Document, options: &WriteOptions) -> PdfVersion {
    let mut version = options.version.unwrap_or_else(|| doc.version());
    if let Some(config) = &doc.encryption {
        let needed = config.algorithm.min_minor_version();
        if version.major == 1 && version.minor < needed {
            log::warn!(
                "{:?} encryption needs PDF 1.{}, raising output version from {}",
                config.algorithm,
                needed,
                version
            );
            version = PdfVersion::new(1, needed);
        }
    }
    version
}

/// MD5 over a random UUID, the time, the document and the session counter.
fn synthesize_id(doc: &Document, session: &WriteSession) -> Vec<u8> {
    let mut seed = uuid::Uuid::new_v4().as_bytes().to_vec();
    seed.extend_from_slice(chrono::Utc::now().to_rfc3339().as_bytes());
    seed.extend_from_slice(&doc.id().to_be_bytes());
    seed.extend_from_slice(&session.counter().to_be_bytes());
    Md5::digest(&seed).to_vec()
}

/// `D:YYYYMMDDHHmmSS+HH'mm'`
fn pdf_date(now: chrono::DateTime<chrono::Local>) -> Object {
    let offset = now.format("%z").to_string();
    let (hours, minutes) = offset.split_at(offset.len().saturating_sub(2));
    Object::String(format!("D:{}{}'{}'", now.format("%Y%m%d%H%M%S"), hours, minutes).into_bytes())
}

/// Load `number` from an origin during a write. Anything but an I/O
/// failure means the source cannot satisfy its own references.
fn fetch(doc: &Document, origin: OriginId, number: u32) -> Result<Object> {
    let source = doc
        .origin(origin)
        .ok_or_else(|| Error::structural(format!("no backing store for origin {}", origin)))?;
    source.fetch(number).map_err(|e| match e {
        Error::Io(_) => e,
        other => Error::structural(format!("cannot resolve {} 0 R of {}: {}", number, origin, other)),
    })
}

/// Output number for a reference found in `origin`, pulling the target in
/// when it has none yet. `None` means the target is not written.
fn resolve(doc: &Document, session: &mut WriteSession, origin: OriginId, target: ObjectRef, record: bool) -> Result<Option<u32>> {
    if record {
        session.remap.record_unknown(origin, target.id);
    }
    match session.remap.lookup(origin, target.id)? {
        Some(Slot::Mapped(number)) => return Ok(Some(number)),
        Some(Slot::Deleted) => return Ok(None),
        None => {},
    }

    let body = fetch(doc, origin, target.id)?;
    if body.is_page_node() || body.dict_type() == Some("Catalog") {
        log::trace!("Not pulling {}:{} ({:?})", origin, target.id, body.dict_type());
        session.remap.mark_deleted(origin, target.id)?;
        return Ok(None);
    }
    let number = session.promote();
    session.remap.insert(origin, target.id, number)?;
    log::trace!("Pulled in {}:{} as {}", origin, target.id, number);
    session.pending.push_back(Pending { origin, number, body });
    Ok(Some(number))
}

/// Run numbering and emission for `doc` into `out`.
pub(crate) fn write_document<W: Write>(
    doc: &Document,
    session: &mut WriteSession,
    out: &mut PdfOutput<W>,
    options: &WriteOptions,
) -> Result<()> {
    for index in 0..doc.origins.len() {
        session.remap.register_origin(OriginId(index as u32));
    }
    let plan = number_objects(doc, session, options)?;
    session.finish_numbering();
    log::debug!(
        "Numbered {} objects for PDF {} ({} planned)",
        session.numbered_count(),
        plan.version,
        plan.objects.len()
    );
    emit(doc, session, out, options, plan)
}

// ==================== Numbering ====================

fn number_objects(doc: &Document, session: &mut WriteSession, options: &WriteOptions) -> Result<Plan> {
    let version = output_version(doc, options);
    let mut objects: Vec<Planned> = Vec::new();

    let catalog = session.promote();
    let info = session.promote();

    let open_actions: Vec<u32> = doc.open_actions.iter().map(|_| session.promote()).collect();
    let additional = if doc.additional_actions.is_empty() {
        None
    } else {
        let dict_number = session.promote();
        let numbers: Vec<u32> = doc.additional_actions.iter().map(|_| session.promote()).collect();
        Some((dict_number, numbers))
    };

    let (page_tree_root, page_numbers, widgets) = number_page_tree(doc, session, options, &mut objects)?;

    let outline = if doc.bookmarks.is_empty() {
        None
    } else {
        let root = session.promote();
        let mut numbers = vec![0u32; doc.bookmarks.len()];
        for index in doc.bookmarks.preorder() {
            numbers[index] = session.promote();
        }
        Some((root, numbers))
    };

    let acroform = number_form(doc, session, options, &widgets, &mut objects)?;

    for (_, font) in &doc.fonts {
        plan_local(doc, session, font.local, Phase::Fonts, Some(ObjectCategory::Font), &mut objects)?;
    }
    for image in &doc.images {
        plan_local(doc, session, image.local, Phase::Images, None, &mut objects)?;
    }
    plan_local(doc, session, doc.procset, Phase::ProcSet, None, &mut objects)?;

    // Removed source pages; pages written above keep their numbers.
    for (origin, number) in &doc.deleted {
        session.remap.mark_deleted(*origin, *number)?;
    }

    let page_of = |key: PageKey| page_numbers.get(&key).copied();
    for (index, (action, number)) in doc.open_actions.iter().zip(&open_actions).enumerate() {
        let mut planned = Planned::new(
            *number,
            Phase::Actions,
            Some(ObjectCategory::Action),
            Body::Direct(Object::Dictionary(action.to_dict(&page_of))),
        );
        if let Some(next) = open_actions.get(index + 1) {
            planned = planned.with("Next", reference(*next));
        }
        objects.push(planned);
    }
    if let Some((dict_number, numbers)) = &additional {
        let mut aa = Dictionary::new();
        for ((event, action), number) in doc.additional_actions.iter().zip(numbers) {
            aa.insert(event.key().to_string(), reference(*number));
            objects.push(Planned::new(
                *number,
                Phase::Actions,
                Some(ObjectCategory::Action),
                Body::Direct(Object::Dictionary(action.to_dict(&page_of))),
            ));
        }
        objects.push(Planned::new(
            *dict_number,
            Phase::Actions,
            Some(ObjectCategory::Action),
            Body::Direct(Object::Dictionary(aa)),
        ));
    }
    if let Some((root, numbers)) = &outline {
        let (root_dict, items) = doc.bookmarks.build(*root, numbers, &page_of)?;
        objects.push(Planned::new(*root, Phase::Bookmarks, Some(ObjectCategory::Bookmark), Body::Direct(root_dict)));
        for (number, item) in items {
            objects.push(Planned::new(number, Phase::Bookmarks, Some(ObjectCategory::Bookmark), Body::Direct(item)));
        }
    }

    let mut catalog_entry = catalog_body(doc, catalog, page_tree_root)?;
    if let Some(first) = open_actions.first() {
        catalog_entry = catalog_entry.with("OpenAction", reference(*first));
    }
    if let Some((dict_number, _)) = &additional {
        catalog_entry = catalog_entry.with("AA", reference(*dict_number));
    }
    if let Some((root, _)) = &outline {
        catalog_entry = catalog_entry.with("Outlines", reference(*root));
    }
    if let Some(form) = acroform {
        catalog_entry = catalog_entry.with("AcroForm", reference(form));
    }
    objects.push(catalog_entry);
    objects.push(info_body(doc, info, options));

    let packed = objects.iter().filter(|p| packable(p, options, version)).count();
    if packed > 0 {
        let streams = packed.div_ceil(options.max_objects_per_stream);
        for index in 0..streams {
            let number = session.promote();
            objects.push(Planned::new(number, Phase::ObjectStreams, None, Body::ObjectStream(index)));
        }
        log::debug!("Packing {} objects into {} object streams", packed, streams);
    }

    // Reading mode keeps the first identifier of the opened file.
    let primary_id = doc
        .primary
        .and_then(|p| doc.origin(p))
        .and_then(|o| o.reader())
        .and_then(|r| r.file_id())
        .map(|(first, _)| first)
        .filter(|first| !first.is_empty());
    let file_id = (
        primary_id.unwrap_or_else(|| synthesize_id(doc, session)),
        synthesize_id(doc, session),
    );

    let (encrypt, cipher) = match &doc.encryption {
        Some(config) => {
            let number = session.promote();
            let mut handler = StandardSecurityHandler::new(config.algorithm);
            handler.setup_all_keys(
                config.permissions.p_value(),
                &config.user_password,
                &config.owner_password,
                &file_id.0,
            )?;
            log::debug!("Encrypting with {:?}, dictionary is object {}", config.algorithm, number);
            (Some((number, handler.encrypt_dict()?)), handler.cipher())
        },
        None => (None, None),
    };

    Ok(Plan {
        version,
        objects,
        catalog,
        info,
        encrypt,
        cipher,
        file_id,
    })
}

/// Number the page tree, the pages, and the objects they list in
/// `/Contents` and `/Annots`. Returns the root number, page numbers by key
/// and the widget annotations of source pages.
fn number_page_tree(
    doc: &Document,
    session: &mut WriteSession,
    options: &WriteOptions,
    objects: &mut Vec<Planned>,
) -> Result<(u32, HashMap<PageKey, u32>, Vec<Widget>)> {
    let fanout = options.page_tree_fanout;
    let page_total = doc.pages.len();

    // Node counts per level, bottom up; the last level is the root.
    let mut levels = vec![page_total.div_ceil(fanout).max(1)];
    while let Some(&count) = levels.last() {
        if count == 1 {
            break;
        }
        levels.push(count.div_ceil(fanout));
    }
    let mut node_numbers: Vec<Vec<u32>> = vec![Vec::new(); levels.len()];
    for level in (0..levels.len()).rev() {
        node_numbers[level] = (0..levels[level]).map(|_| session.promote()).collect();
    }
    let root = node_numbers[levels.len() - 1][0];

    let mut page_numbers = HashMap::with_capacity(page_total);
    let mut leaf_kids: Vec<Vec<Object>> = vec![Vec::new(); levels[0]];
    let mut widgets = Vec::new();
    for (index, page) in doc.pages.iter().enumerate() {
        let number = match page.source_number {
            Some(old) => match session.remap.lookup(page.origin, old)? {
                None => {
                    let number = session.promote();
                    session.remap.insert(page.origin, old, number)?;
                    number
                },
                // Imported more than once; references reach the first copy.
                Some(_) => session.promote(),
            },
            None => session.promote(),
        };
        page_numbers.insert(page.key, number);
        leaf_kids[index / fanout].push(reference(number));
        objects.push(
            Planned::new(number, Phase::Pages, None, Body::Origin(page.origin, Object::Dictionary(page.dict.clone())))
                .with("Parent", reference(node_numbers[0][index / fanout])),
        );

        let contents = match page.dict.get("Contents") {
            Some(Object::Reference(r)) => vec![*r],
            Some(Object::Array(items)) => items.iter().filter_map(Object::as_reference).collect(),
            _ => Vec::new(),
        };
        for r in contents {
            if let (Slot::Mapped(n), true) = session.assign(page.origin, r.id)? {
                let mut body = fetch(doc, page.origin, r.id)?;
                if page.origin == OriginId::SELF && options.compress_streams {
                    body = compress_content(body)?;
                }
                objects.push(Planned::new(n, Phase::Pages, None, Body::Origin(page.origin, body)));
            }
        }

        let annots = match page.dict.get("Annots") {
            Some(Object::Array(items)) => items.clone(),
            Some(Object::Reference(r)) => match fetch(doc, page.origin, r.id)? {
                Object::Array(items) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        for r in annots.iter().filter_map(Object::as_reference) {
            if let (Slot::Mapped(n), true) = session.assign(page.origin, r.id)? {
                let body = fetch(doc, page.origin, r.id)?;
                if page.origin != OriginId::SELF && body.get("Subtype").and_then(Object::as_name) == Some("Widget") {
                    widgets.push(Widget {
                        origin: page.origin,
                        number: r.id,
                        annot: body.clone(),
                    });
                }
                objects.push(Planned::new(
                    n,
                    Phase::Pages,
                    Some(ObjectCategory::Annotation),
                    Body::Origin(page.origin, body),
                ));
            }
        }
    }

    // Leaf pages under one node of `level`.
    let span = |level: usize| fanout.saturating_pow(level as u32 + 1);
    let mut leaf_kids = leaf_kids.into_iter();
    for level in 0..levels.len() {
        for (index, number) in node_numbers[level].iter().enumerate() {
            let kids = if level == 0 {
                leaf_kids.next().unwrap_or_default()
            } else {
                node_numbers[level - 1]
                    .iter()
                    .skip(index * fanout)
                    .take(fanout)
                    .map(|n| reference(*n))
                    .collect()
            };
            let first_page = index.saturating_mul(span(level));
            let count = page_total.min(first_page.saturating_add(span(level))).saturating_sub(first_page);

            let mut dict = Dictionary::new();
            dict.insert("Type".to_string(), Object::name("Pages"));
            dict.insert("Kids".to_string(), Object::Array(kids));
            dict.insert("Count".to_string(), Object::Integer(count as i64));
            if level + 1 < levels.len() {
                dict.insert("Parent".to_string(), reference(node_numbers[level + 1][index / fanout]));
            }
            objects.push(Planned::new(*number, Phase::Pages, None, Body::Direct(Object::Dictionary(dict))));
        }
    }
    log::debug!("Page tree: {} pages under {} levels of nodes", page_total, levels.len());
    Ok((root, page_numbers, widgets))
}

/// Flate-compress an unfiltered content stream.
fn compress_content(body: Object) -> Result<Object> {
    match body {
        Object::Stream { mut dict, data } if !dict.contains_key("Filter") => {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            Ok(Object::stream(dict, flate_encode(&data)?))
        },
        other => Ok(other),
    }
}

/// Plan an object of the self store.
fn plan_local(
    doc: &Document,
    session: &mut WriteSession,
    local: ObjectRef,
    phase: Phase,
    category: Option<ObjectCategory>,
    objects: &mut Vec<Planned>,
) -> Result<()> {
    if let (Slot::Mapped(n), true) = session.assign(OriginId::SELF, local.id)? {
        let body = fetch(doc, OriginId::SELF, local.id)?;
        objects.push(Planned::new(n, phase, category, Body::Origin(OriginId::SELF, body)));
    }
    Ok(())
}

/// Number the root form fields and the `/AcroForm` dictionary.
fn number_form(
    doc: &Document,
    session: &mut WriteSession,
    options: &WriteOptions,
    widgets: &[Widget],
    objects: &mut Vec<Planned>,
) -> Result<Option<u32>> {
    let plan = collect_fields(doc, widgets, options.field_renamed.as_ref())?;
    if plan.is_empty() {
        return Ok(None);
    }

    let renamed = plan.fields.iter().any(|f| f.rename.is_some());
    let mut fields = Vec::with_capacity(plan.fields.len());
    for field in plan.fields {
        let Slot::Mapped(n) = session.assign(field.origin, field.number)?.0 else {
            continue;
        };
        fields.push(reference(n));
        let rename = field.rename.map(|name| text_string(&name));
        match objects.iter_mut().find(|p| p.number == n) {
            // A merged field and widget, already planned as an annotation.
            Some(existing) => {
                if let Some(name) = rename {
                    existing.overrides.insert("T".to_string(), name);
                }
            },
            None => {
                let mut planned = Planned::new(
                    n,
                    Phase::Forms,
                    Some(ObjectCategory::Form),
                    Body::Origin(field.origin, field.body),
                );
                if let Some(name) = rename {
                    planned = planned.with("T", name);
                }
                objects.push(planned);
            },
        }
    }

    let number = session.promote();
    let fresh = plan.base.is_none();
    let body = match plan.base {
        Some((origin, dict)) => Body::Origin(origin, Object::Dictionary(dict)),
        None => Body::Direct(Object::Dictionary(Dictionary::new())),
    };
    let mut planned =
        Planned::new(number, Phase::Forms, Some(ObjectCategory::Form), body).with("Fields", Object::Array(fields));
    // Renamed fields keep appearance streams built for their old names.
    if fresh || renamed {
        planned = planned.with("NeedAppearances", Object::Boolean(true));
    }
    objects.push(planned);
    Ok(Some(number))
}

/// Catalog: entries carried over from the opened file, then rebuilt ones.
fn catalog_body(doc: &Document, catalog: u32, pages: u32) -> Result<Planned> {
    let source = doc
        .primary
        .and_then(|p| doc.origin(p).and_then(|o| o.reader()).map(|r| (p, r)));
    let planned = match source {
        Some((origin, reader)) => {
            let mut extras = reader.catalog()?;
            for key in REBUILT_CATALOG_KEYS {
                extras.remove(key);
            }
            if !doc.open_actions.is_empty() {
                extras.remove("OpenAction");
            }
            if !doc.additional_actions.is_empty() {
                extras.remove("AA");
            }
            if !doc.bookmarks.is_empty() {
                extras.remove("Outlines");
            }
            Planned::new(catalog, Phase::Catalog, None, Body::Origin(origin, Object::Dictionary(extras)))
        },
        None => Planned::new(catalog, Phase::Catalog, None, Body::Direct(Object::Dictionary(Dictionary::new()))),
    };
    Ok(planned
        .with("Type", Object::name("Catalog"))
        .with("Pages", reference(pages)))
}

fn info_body(doc: &Document, info: u32, options: &WriteOptions) -> Planned {
    let mut dict = doc.info.clone();
    let now = pdf_date(chrono::Local::now());
    dict.insert("Producer".to_string(), text_string(&options.producer_string()));
    dict.entry("CreationDate".to_string()).or_insert_with(|| now.clone());
    dict.insert("ModDate".to_string(), now);
    let origin = doc.primary.unwrap_or(OriginId::SELF);
    Planned::new(info, Phase::Info, Some(ObjectCategory::Info), Body::Origin(origin, Object::Dictionary(dict)))
}

// ==================== Emission ====================

struct Emitter<'a, W: Write> {
    doc: &'a Document,
    session: &'a mut WriteSession,
    out: &'a mut PdfOutput<W>,
}

impl<W: Write> Emitter<'_, W> {
    /// Rewrite a body into output numbering and apply its overrides.
    fn materialize(&mut self, body: Body, overrides: Dictionary) -> Result<Object> {
        let mut obj = match body {
            Body::Direct(obj) => obj,
            Body::Origin(origin, mut obj) => {
                let doc = self.doc;
                let session = &mut *self.session;
                rewrite_references(&mut obj, &mut |r| resolve(doc, session, origin, r, true))?;
                obj
            },
            Body::ObjectStream(index) => {
                return Err(Error::structural(format!("object stream {} has no body of its own", index)));
            },
        };
        if !overrides.is_empty() {
            let found = obj.type_name();
            let dict = obj
                .as_dict_mut()
                .ok_or_else(|| Error::structural(format!("cannot set entries on a {}", found)))?;
            dict.extend(overrides);
        }
        Ok(obj)
    }

    fn write_object(&mut self, number: u32, obj: &Object, plain: bool) -> Result<()> {
        self.session.record_offset(number, self.out.bytes_written());
        self.out.write_indirect_object(number, obj, plain)?;
        Ok(())
    }

    fn write_planned(&mut self, planned: Planned, groups: &mut [Vec<Planned>]) -> Result<()> {
        if let Body::ObjectStream(index) = planned.body {
            let group = groups
                .get_mut(index)
                .map(std::mem::take)
                .ok_or_else(|| Error::structural(format!("no objects for object stream {}", index)))?;
            return self.write_object_stream(planned.number, group);
        }
        if !self.session.mark_written(planned.number) {
            return Ok(());
        }
        let obj = self.materialize(planned.body, planned.overrides)?;
        self.write_object(planned.number, &obj, false)?;
        self.drain_pending()
    }

    fn write_object_stream(&mut self, number: u32, group: Vec<Planned>) -> Result<()> {
        let mut builder = ObjectStreamBuilder::new();
        let mut members = Vec::with_capacity(group.len());
        for planned in group {
            if !self.session.mark_written(planned.number) {
                continue;
            }
            let obj = self.materialize(planned.body, planned.overrides)?;
            members.push((planned.number, builder.add(planned.number, &obj)?));
        }
        let stream = builder.build(true)?;
        self.session.mark_written(number);
        self.write_object(number, &stream, false)?;
        for (member, index) in &members {
            self.session.record_compressed(*member, number, *index);
        }
        log::debug!("Object stream {} holds {} objects", number, members.len());
        self.drain_pending()
    }

    /// Write everything pulled in so far, and what that pulls in.
    fn drain_pending(&mut self) -> Result<()> {
        while let Some(Pending { origin, number, body }) = self.session.pending.pop_front() {
            if !self.session.mark_written(number) {
                continue;
            }
            let obj = self.materialize(Body::Origin(origin, body), Dictionary::new())?;
            self.write_object(number, &obj, false)?;
        }
        Ok(())
    }

    /// Write pooled references that are numbered but not yet written.
    fn sweep_unknown(&mut self) -> Result<()> {
        let mut swept = 0usize;
        loop {
            let pool = self.session.remap.drain_unknown();
            if pool.is_empty() {
                break;
            }
            for (origin, old) in pool {
                let Some(Slot::Mapped(number)) = self.session.remap.lookup(origin, old)? else {
                    continue;
                };
                if self.session.is_written(number) {
                    continue;
                }
                let body = fetch(self.doc, origin, old)?;
                self.session.pending.push_back(Pending { origin, number, body });
                self.drain_pending()?;
                swept += 1;
            }
        }
        if swept > 0 {
            log::debug!("Sweep wrote {} objects", swept);
        }
        Ok(())
    }
}

fn emit<W: Write>(
    doc: &Document,
    session: &mut WriteSession,
    out: &mut PdfOutput<W>,
    options: &WriteOptions,
    plan: Plan,
) -> Result<()> {
    let Plan {
        version,
        objects,
        catalog,
        info,
        encrypt,
        cipher,
        file_id,
    } = plan;

    out.write_header(version)?;
    out.set_cipher(cipher);

    let (mut packed, mut regular): (Vec<Planned>, Vec<Planned>) =
        objects.into_iter().partition(|p| packable(p, options, version));
    packed.sort_by_key(|p| p.number);
    regular.sort_by_key(|p| (p.phase, p.number));
    let mut groups: Vec<Vec<Planned>> = Vec::new();
    let mut packed = packed.into_iter().peekable();
    while packed.peek().is_some() {
        groups.push(packed.by_ref().take(options.max_objects_per_stream).collect());
    }

    {
        let mut emitter = Emitter {
            doc,
            session: &mut *session,
            out: &mut *out,
        };
        for planned in regular {
            emitter.write_planned(planned, &mut groups)?;
        }
        emitter.sweep_unknown()?;
        if let Some((number, dict)) = &encrypt {
            emitter.session.mark_written(*number);
            emitter.write_object(*number, &Object::Dictionary(dict.clone()), true)?;
        }
    }

    let mut trailer = Dictionary::new();
    trailer.insert("Root".to_string(), reference(catalog));
    trailer.insert("Info".to_string(), reference(info));
    if let Some((number, _)) = &encrypt {
        trailer.insert("Encrypt".to_string(), reference(*number));
    }
    trailer.insert(
        "ID".to_string(),
        Object::Array(vec![Object::String(file_id.0), Object::String(file_id.1)]),
    );

    if version.uses_xref_stream() {
        let number = session.promote();
        let start = out.bytes_written();
        session.record_offset(number, start);
        session.mark_written(number);
        trailer.insert("Size".to_string(), Object::Integer(session.counter() as i64));
        let entries = session.xref_entries();
        let (stream, width) = xref_stream(&entries, &trailer)?;
        out.write_cross_ref_stream(number, &stream, start)?;
        session.set_xref_width(width);
    } else {
        trailer.insert("Size".to_string(), Object::Integer(session.counter() as i64));
        let entries = session.xref_entries();
        let start = out.bytes_written();
        out.write_xref_table(&entries, &trailer, start)?;
    }
    session.set_bytes_written(out.bytes_written());
    Ok(())
}
