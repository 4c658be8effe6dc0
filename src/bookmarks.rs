//! Document outline (bookmarks).
//!
//! Bookmarks live in an arena and point at pages by [`PageKey`], so they
//! survive page moves and removals. Written numbers are supplied by the
//! write pipeline, which numbers the outline root first and then every item
//! in [`Bookmarks::preorder`] order.

use crate::document::PageKey;
use crate::error::{Error, Result};
use crate::object::{text_string, Dictionary, Object, ObjectRef};

/// Handle of a bookmark within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookmarkId(pub(crate) usize);

/// Text style for outline items.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutlineStyle {
    /// Display in italic
    pub italic: bool,
    /// Display in bold
    pub bold: bool,
    /// Text color (RGB, 0.0-1.0)
    pub color: Option<(f32, f32, f32)>,
}

impl OutlineStyle {
    /// Create a new default style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bold style.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Set italic style.
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// Set text color.
    pub fn color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.color = Some((r, g, b));
        self
    }

    /// `/F` flags: italic is bit 1, bold bit 2.
    pub fn flags(&self) -> i64 {
        let mut flags = 0i64;
        if self.italic {
            flags |= 1;
        }
        if self.bold {
            flags |= 2;
        }
        flags
    }
}

#[derive(Debug, Clone)]
struct Node {
    title: String,
    page: PageKey,
    parent: Option<usize>,
    children: Vec<usize>,
    open: bool,
    style: OutlineStyle,
}

/// Outline tree of a document.
#[derive(Debug, Clone, Default)]
pub struct Bookmarks {
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl Bookmarks {
    /// Empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bookmark under `parent`, or at the top level.
    pub fn add(&mut self, parent: Option<BookmarkId>, title: impl Into<String>, page: PageKey) -> Result<BookmarkId> {
        let id = self.nodes.len();
        match parent {
            Some(BookmarkId(p)) => {
                let node = self
                    .nodes
                    .get_mut(p)
                    .ok_or_else(|| Error::usage(format!("unknown parent bookmark {}", p)))?;
                node.children.push(id);
            },
            None => self.roots.push(id),
        }
        self.nodes.push(Node {
            title: title.into(),
            page,
            parent: parent.map(|p| p.0),
            children: Vec::new(),
            open: true,
            style: OutlineStyle::default(),
        });
        Ok(BookmarkId(id))
    }

    fn node_mut(&mut self, id: BookmarkId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::usage(format!("unknown bookmark {}", id.0)))
    }

    /// Show or hide the children of a bookmark.
    pub fn set_open(&mut self, id: BookmarkId, open: bool) -> Result<()> {
        self.node_mut(id)?.open = open;
        Ok(())
    }

    /// Change how a bookmark's title is displayed.
    pub fn set_style(&mut self, id: BookmarkId, style: OutlineStyle) -> Result<()> {
        self.node_mut(id)?.style = style;
        Ok(())
    }

    /// Title of a bookmark.
    pub fn title(&self, id: BookmarkId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.title.as_str())
    }

    /// Number of bookmarks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether there are no bookmarks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena indices, parents before children, siblings in order.
    pub(crate) fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(self.nodes[i].children.iter().rev());
        }
        order
    }

    /// Visible descendants of every node; a closed node hides its subtree.
    fn visible_counts(&self, order: &[usize]) -> Vec<i64> {
        let mut visible = vec![0i64; self.nodes.len()];
        for &i in order.iter().rev() {
            let node = &self.nodes[i];
            if node.open {
                visible[i] = node.children.iter().map(|&c| 1 + visible[c]).sum();
            }
        }
        visible
    }

    /// Outline root and item dictionaries.
    ///
    /// `numbers[i]` is the written number of arena node `i`. Items whose
    /// page is not written get a `null` destination.
    pub(crate) fn build(
        &self,
        root: u32,
        numbers: &[u32],
        page_number: &dyn Fn(PageKey) -> Option<u32>,
    ) -> Result<(Object, Vec<(u32, Object)>)> {
        if numbers.len() != self.nodes.len() {
            return Err(Error::structural(format!(
                "{} outline numbers for {} bookmarks",
                numbers.len(),
                self.nodes.len()
            )));
        }
        let reference = |n: u32| Object::Reference(ObjectRef::new(n, 0));
        let order = self.preorder();
        let visible = self.visible_counts(&order);

        let mut items = Vec::with_capacity(order.len());
        for &i in &order {
            let node = &self.nodes[i];
            let mut dict = Dictionary::new();
            dict.insert("Title".to_string(), text_string(&node.title));
            let parent = node.parent.map_or(root, |p| numbers[p]);
            dict.insert("Parent".to_string(), reference(parent));

            let siblings = match node.parent {
                Some(p) => &self.nodes[p].children,
                None => &self.roots,
            };
            if let Some(pos) = siblings.iter().position(|&s| s == i) {
                if pos > 0 {
                    dict.insert("Prev".to_string(), reference(numbers[siblings[pos - 1]]));
                }
                if let Some(&next) = siblings.get(pos + 1) {
                    dict.insert("Next".to_string(), reference(numbers[next]));
                }
            }

            if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
                dict.insert("First".to_string(), reference(numbers[first]));
                dict.insert("Last".to_string(), reference(numbers[last]));
                let hidden: i64 = node.children.iter().map(|&c| 1 + visible[c]).sum();
                let count = if node.open { hidden } else { -hidden };
                dict.insert("Count".to_string(), Object::Integer(count));
            }

            let dest = match page_number(node.page) {
                Some(n) => Object::Array(vec![reference(n), Object::name("Fit")]),
                None => Object::Null,
            };
            dict.insert("Dest".to_string(), dest);

            let flags = node.style.flags();
            if flags != 0 {
                dict.insert("F".to_string(), Object::Integer(flags));
            }
            if let Some((r, g, b)) = node.style.color {
                dict.insert(
                    "C".to_string(),
                    Object::Array(vec![
                        Object::Real(r as f64),
                        Object::Real(g as f64),
                        Object::Real(b as f64),
                    ]),
                );
            }
            items.push((numbers[i], Object::Dictionary(dict)));
        }

        let mut root_dict = Dictionary::new();
        root_dict.insert("Type".to_string(), Object::name("Outlines"));
        if let (Some(&first), Some(&last)) = (self.roots.first(), self.roots.last()) {
            root_dict.insert("First".to_string(), reference(numbers[first]));
            root_dict.insert("Last".to_string(), reference(numbers[last]));
        }
        let total: i64 = self.roots.iter().map(|&r| 1 + visible[r]).sum();
        root_dict.insert("Count".to_string(), Object::Integer(total));
        Ok((Object::Dictionary(root_dict), items))
    }
}
