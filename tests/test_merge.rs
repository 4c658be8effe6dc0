//! Integration tests for assembling documents from source files.
//!
//! Covers:
//! - Pulling in objects reached only through imported pages
//! - Page ranges on import
//! - Shared objects written once per source, cycles included
//! - Unresolvable references reported as structural errors
//! - Removed pages written as null references
//! - Opening a file and writing it back

mod common;

use common::*;
use pdf_binder::xref::XrefEntry;
use pdf_binder::{Document, Object, PdfReader, PdfVersion, ReadOptions, Reader, WriteOptions};
use std::collections::HashSet;
use tempfile::tempdir;

fn source(bytes: Vec<u8>) -> PdfReader {
    PdfReader::from_bytes(bytes, &ReadOptions::default()).unwrap()
}

fn font_names(reader: &PdfReader) -> Vec<String> {
    live_objects(reader)
        .into_iter()
        .filter(|(_, obj)| obj.dict_type() == Some("Font"))
        .filter_map(|(_, obj)| obj.get("BaseFont").and_then(Object::as_name).map(str::to_string))
        .collect()
}

mod lazy_pull_tests {
    use super::*;

    #[test]
    fn test_font_reached_through_page_resources_is_written() {
        init_logger();
        let mut doc = Document::new();
        let origin = doc.add_source(source(three_page_source()));
        assert_eq!(doc.import_pages(origin, "3").unwrap(), 1);

        let bytes = doc.to_bytes(&WriteOptions::new()).unwrap();
        let out = open(bytes);
        assert_eq!(out.page_refs().unwrap().len(), 1);
        assert_eq!(font_names(&out), vec!["Courier".to_string()]);

        let page = &out.pages(None).unwrap()[0];
        let resources = out.deref(page.dict.get("Resources").unwrap()).unwrap();
        let fonts = out.deref(resources.get("Font").unwrap()).unwrap();
        let font = out.deref(fonts.get("F1").unwrap()).unwrap();
        assert_eq!(font.get("BaseFont"), Some(&Object::name("Courier")));
    }

    #[test]
    fn test_shared_objects_written_once() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(three_page_source()));
        doc.import_pages(origin, "ALL").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        assert_eq!(out.page_refs().unwrap().len(), 3);
        assert_eq!(font_names(&out).len(), 1);

        let resources: HashSet<_> = out
            .pages(None)
            .unwrap()
            .iter()
            .filter_map(|p| p.dict.get("Resources").and_then(Object::as_reference))
            .collect();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn test_unused_source_objects_are_not_copied() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(three_page_source()));
        doc.import_pages(origin, "1").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        let contents: Vec<_> = live_objects(&out)
            .into_iter()
            .filter_map(|(_, obj)| obj.stream_data().map(<[u8]>::to_vec))
            .collect();
        assert!(contents.iter().any(|c| c.windows(5).any(|w| w == b"(one)")));
        assert!(!contents.iter().any(|c| c.windows(5).any(|w| w == b"(two)")));
    }
}

mod cycle_tests {
    use super::*;

    #[test]
    fn test_cyclic_resources_are_written_once() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(cyclic_source()));
        doc.import_pages(origin, "1").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        for r in all_references(&out) {
            assert!(out.xref().get(r.id).is_some_and(XrefEntry::in_use), "dangling {}", r);
        }
        let size = out.xref().trailer().get("Size").and_then(Object::as_integer).unwrap();
        assert_eq!(size, out.xref().live_numbers().count() as i64 + 1);

        let objects = live_objects(&out);
        let forms: Vec<&Object> = objects
            .iter()
            .map(|(_, obj)| obj)
            .filter(|obj| obj.get("Subtype").and_then(Object::as_name) == Some("Form"))
            .collect();
        assert_eq!(forms.len(), 1);

        let page = &out.pages(None).unwrap()[0];
        let resources = page.dict.get("Resources").and_then(Object::as_reference).unwrap();
        assert_eq!(forms[0].get("Resources"), Some(&Object::Reference(resources)));
    }

    #[test]
    fn test_link_to_page_not_imported_becomes_null() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(cyclic_source()));
        doc.import_pages(origin, "1").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        assert_eq!(out.page_refs().unwrap().len(), 1);
        let page = &out.pages(None).unwrap()[0];
        let annots = out.deref(page.dict.get("Annots").unwrap()).unwrap();
        let link = out.deref(&annots.as_array().unwrap()[0]).unwrap();
        let dest = link.get("Dest").and_then(Object::as_array).unwrap();
        assert!(dest[0].is_null());
        assert_eq!(dest[1], Object::name("Fit"));
    }

    #[test]
    fn test_missing_target_is_structural_error() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(dangling_font_source()));
        doc.import_pages(origin, "ALL").unwrap();

        let err = doc.to_bytes(&WriteOptions::new()).unwrap_err();
        assert!(err.is_structural(), "{}", err);
        assert!(doc.last_session().is_none());
    }
}

mod page_range_tests {
    use super::*;

    #[test]
    fn test_import_range_in_order() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(blank_source(10)));
        assert_eq!(doc.import_pages(origin, "2-4,7").unwrap(), 4);
        assert_eq!(doc.import_pages(origin, "ODD").unwrap(), 5);
        assert_eq!(doc.page_count(), 9);

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        assert_eq!(out.page_refs().unwrap().len(), 9);
    }

    #[test]
    fn test_bad_range_is_usage_error() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(blank_source(3)));
        let err = doc.import_pages(origin, "2-9").unwrap_err();
        assert!(err.is_usage());
        assert_eq!(doc.page_count(), 0);
    }

    #[test]
    fn test_duplicate_import_writes_two_pages() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(three_page_source()));
        doc.import_pages(origin, "2").unwrap();
        doc.import_pages(origin, "2").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        let pages = out.page_refs().unwrap();
        assert_eq!(pages.len(), 2);
        assert_ne!(pages[0], pages[1]);
    }
}

mod deletion_tests {
    use super::*;

    #[test]
    fn test_removed_page_reference_becomes_null() {
        // The form keeps its widget, whose /P pointed at the removed page.
        let dir = tempdir().unwrap();
        let input = dir.path().join("form.pdf");
        std::fs::write(&input, form_source("name")).unwrap();

        let mut doc = Document::open(&input).unwrap();
        doc.add_page(200.0, 200.0).unwrap();
        doc.remove_page(0).unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        assert_eq!(out.page_refs().unwrap().len(), 1);
        let widgets: Vec<Object> = live_objects(&out)
            .into_iter()
            .map(|(_, obj)| obj)
            .filter(|obj| obj.get("Subtype").and_then(Object::as_name) == Some("Widget"))
            .collect();
        assert_eq!(widgets.len(), 1);
        assert!(widgets[0].get("P").map_or(true, Object::is_null));
    }

    #[test]
    fn test_source_page_tree_nodes_are_not_pulled() {
        let mut doc = Document::new();
        let origin = doc.add_source(source(three_page_source()));
        doc.import_pages(origin, "1").unwrap();

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        let nodes = live_objects(&out)
            .into_iter()
            .filter(|(_, obj)| obj.dict_type() == Some("Pages"))
            .count();
        assert_eq!(nodes, 1);
    }
}

mod file_tests {
    use super::*;

    #[test]
    fn test_open_and_save_round_trip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, three_page_source()).unwrap();

        let mut doc = Document::open(&input).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.info_string("Title").as_deref(), Some("Source"));
        doc.save(&output, &WriteOptions::new()).unwrap();

        let reread = Document::open(&output).unwrap();
        assert_eq!(reread.page_count(), 3);
        assert_eq!(reread.info_string("Author").as_deref(), Some("Tests"));
        assert!(reread.info_string("Producer").unwrap().starts_with("pdf_binder"));
    }

    #[test]
    fn test_merge_files() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, three_page_source()).unwrap();
        std::fs::write(&b, blank_source(4)).unwrap();

        let mut doc = Document::with_version(PdfVersion::V1_7);
        assert_eq!(doc.merge_file(&a, "1-2").unwrap(), 2);
        assert_eq!(doc.merge_file(&b, "EVEN").unwrap(), 2);

        let out = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        assert_eq!(out.version(), PdfVersion::V1_7);
        let pages = out.pages(None).unwrap();
        assert_eq!(pages.len(), 4);
        let media_box: Vec<i64> = pages[3]
            .dict
            .get("MediaBox")
            .and_then(Object::as_array)
            .unwrap()
            .iter()
            .filter_map(Object::as_integer)
            .collect();
        assert_eq!(media_box, vec![0, 0, 300, 300]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let mut doc = Document::new();
        let err = doc.merge_file(dir.path().join("missing.pdf"), "ALL").unwrap_err();
        assert!(err.is_io());
    }
}
