//! Page-range expressions such as `"2-4,7"`, `"ODD"` or `"5-"`.
//!
//! An expression is a comma-separated list of items. Each item is a page
//! number, a closed range `a-b`, an open range `a-` (to the last page) or
//! `-b` (from the first page), or one of the keywords `ALL`, `ODD` and
//! `EVEN`. Pages are 1-based. The result is ascending and free of
//! duplicates.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    static ref RANGE_ITEM: Regex = Regex::new(r"^(\d*)\s*-\s*(\d*)$").expect("valid regex");
    static ref SINGLE_ITEM: Regex = Regex::new(r"^\d+$").expect("valid regex");
}

/// Resolve `expr` against a document of `page_count` pages.
pub fn parse_page_range(expr: &str, page_count: usize) -> Result<Vec<usize>> {
    let mut pages = BTreeSet::new();
    let mut items = 0;
    for item in expr.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        items += 1;
        match item.to_ascii_uppercase().as_str() {
            "ALL" => pages.extend(1..=page_count),
            "ODD" => pages.extend((1..=page_count).step_by(2)),
            "EVEN" => pages.extend((2..=page_count).step_by(2)),
            _ => {
                let (first, last) = parse_item(item, page_count)?;
                pages.extend(first..=last);
            },
        }
    }
    if items == 0 {
        return Err(Error::usage("empty page range"));
    }
    Ok(pages.into_iter().collect())
}

fn parse_item(item: &str, page_count: usize) -> Result<(usize, usize)> {
    let number = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| Error::usage(format!("page number '{}' out of range", s)))
    };
    let (first, last) = if SINGLE_ITEM.is_match(item) {
        let page = number(item)?;
        (page, page)
    } else if let Some(caps) = RANGE_ITEM.captures(item) {
        let (from, to) = (&caps[1], &caps[2]);
        if from.is_empty() && to.is_empty() {
            return Err(Error::usage(format!("page range '{}' has no bounds", item)));
        }
        let first = if from.is_empty() { 1 } else { number(from)? };
        let last = if to.is_empty() { page_count } else { number(to)? };
        (first, last)
    } else {
        return Err(Error::usage(format!("invalid page range item '{}'", item)));
    };

    if first == 0 || last > page_count || first > last {
        return Err(Error::usage(format!(
            "page range '{}' is outside 1-{}",
            item, page_count
        )));
    }
    Ok((first, last))
}
