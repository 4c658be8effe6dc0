//! Reference rewriting.

use crate::error::Result;
use crate::object::{Object, ObjectRef};

/// Replace every reference inside `root` with the number `resolve` returns
/// for it, or with `null` when it returns `None`.
///
/// Streams are walked through their dictionaries and lose `/Length`, which
/// the serializer recomputes. The walk uses an explicit stack, so nesting
/// depth does not grow the call stack.
pub fn rewrite_references(
    root: &mut Object,
    resolve: &mut dyn FnMut(ObjectRef) -> Result<Option<u32>>,
) -> Result<()> {
    let mut stack: Vec<&mut Object> = vec![root];
    while let Some(node) = stack.pop() {
        if let Object::Reference(r) = &*node {
            let target = *r;
            *node = match resolve(target)? {
                Some(number) => Object::Reference(ObjectRef::new(number, 0)),
                None => Object::Null,
            };
            continue;
        }
        match node {
            Object::Array(items) => stack.extend(items.iter_mut()),
            Object::Dictionary(dict) => stack.extend(dict.values_mut()),
            Object::Stream { dict, .. } => {
                dict.remove("Length");
                stack.extend(dict.values_mut());
            },
            _ => {},
        }
    }
    Ok(())
}
