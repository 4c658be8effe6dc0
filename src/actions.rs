//! Document-level actions.
//!
//! Open actions run when the document is opened and are written as a chain
//! linked through `/Next`. Additional actions (`/AA`) are keyed by
//! [`DocumentEvent`].

use crate::document::PageKey;
use crate::object::{text_string, Dictionary, Object, ObjectRef};

/// An action the viewer performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Go to a page of this document, fitting it in the window
    GoTo {
        /// Target page
        page: PageKey,
    },
    /// Open a URI
    Uri(String),
    /// Execute a named viewer action such as `NextPage`
    Named(String),
    /// Run a script
    JavaScript(String),
}

impl Action {
    /// Action dictionary; `page_number` maps page keys to written numbers.
    ///
    /// A `GoTo` whose page is not written gets a `null` destination.
    pub(crate) fn to_dict(&self, page_number: &dyn Fn(PageKey) -> Option<u32>) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("Action"));
        match self {
            Action::GoTo { page } => {
                dict.insert("S".to_string(), Object::name("GoTo"));
                let dest = match page_number(*page) {
                    Some(n) => Object::Array(vec![
                        Object::Reference(ObjectRef::new(n, 0)),
                        Object::name("Fit"),
                    ]),
                    None => Object::Null,
                };
                dict.insert("D".to_string(), dest);
            },
            Action::Uri(uri) => {
                dict.insert("S".to_string(), Object::name("URI"));
                dict.insert("URI".to_string(), Object::String(uri.as_bytes().to_vec()));
            },
            Action::Named(name) => {
                dict.insert("S".to_string(), Object::name("Named"));
                dict.insert("N".to_string(), Object::name(name.clone()));
            },
            Action::JavaScript(script) => {
                dict.insert("S".to_string(), Object::name("JavaScript"));
                dict.insert("JS".to_string(), text_string(script));
            },
        }
        dict
    }
}

/// Document events that can trigger an additional action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentEvent {
    /// Before the document closes
    WillClose,
    /// Before the document is saved
    WillSave,
    /// After the document is saved
    DidSave,
    /// Before the document is printed
    WillPrint,
    /// After the document is printed
    DidPrint,
}

impl DocumentEvent {
    /// Key of the event in the `/AA` dictionary.
    pub fn key(&self) -> &'static str {
        match self {
            DocumentEvent::WillClose => "WC",
            DocumentEvent::WillSave => "WS",
            DocumentEvent::DidSave => "DS",
            DocumentEvent::WillPrint => "WP",
            DocumentEvent::DidPrint => "DP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goto_dest() {
        let page = PageKey(4);
        let action = Action::GoTo { page };
        let dict = action.to_dict(&|k| if k == page { Some(12) } else { None });
        assert_eq!(dict.get("S"), Some(&Object::name("GoTo")));
        assert_eq!(
            dict.get("D"),
            Some(&Object::Array(vec![Object::Reference(ObjectRef::new(12, 0)), Object::name("Fit")]))
        );
    }

    #[test]
    fn test_goto_missing_page_is_null() {
        let dict = Action::GoTo { page: PageKey(1) }.to_dict(&|_| None);
        assert_eq!(dict.get("D"), Some(&Object::Null));
    }

    #[test]
    fn test_uri_and_named() {
        let uri = Action::Uri("https://example.com".to_string()).to_dict(&|_| None);
        assert_eq!(uri.get("URI"), Some(&Object::String(b"https://example.com".to_vec())));
        let named = Action::Named("NextPage".to_string()).to_dict(&|_| None);
        assert_eq!(named.get("N"), Some(&Object::name("NextPage")));
    }

    #[test]
    fn test_event_keys() {
        assert_eq!(DocumentEvent::WillClose.key(), "WC");
        assert_eq!(DocumentEvent::DidPrint.key(), "DP");
    }
}
