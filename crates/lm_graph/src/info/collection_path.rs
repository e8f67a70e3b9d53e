use alloc::format;
use alloc::string::String;

/// A parsed collection type path.
///
/// Collection types are named structurally: `List<item>`, `Map<key,value>`
/// and `Array<item;rank>`. Component paths may themselves be collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionPath<'a> {
    List(&'a str),
    Map(&'a str, &'a str),
    Array(&'a str, u8),
}

impl<'a> CollectionPath<'a> {
    pub fn parse(path: &'a str) -> Option<Self> {
        if let Some(inner) = strip_generic(path, "List") {
            return Some(Self::List(inner));
        }
        if let Some(inner) = strip_generic(path, "Map") {
            let at = split_top_level(inner, ',')?;
            let (key, value) = (&inner[..at], &inner[at + 1..]);
            return Some(Self::Map(key.trim(), value.trim()));
        }
        if let Some(inner) = strip_generic(path, "Array") {
            let at = split_top_level(inner, ';')?;
            let rank = inner[at + 1..].trim().parse::<u8>().ok()?;
            if rank == 0 {
                return None;
            }
            return Some(Self::Array(inner[..at].trim(), rank));
        }
        None
    }

    pub fn list(item: &str) -> String {
        format!("List<{item}>")
    }

    pub fn map(key: &str, value: &str) -> String {
        format!("Map<{key},{value}>")
    }

    pub fn array(item: &str, rank: u8) -> String {
        format!("Array<{item};{rank}>")
    }
}

fn strip_generic<'a>(path: &'a str, head: &str) -> Option<&'a str> {
    let rest = path.trim().strip_prefix(head)?.strip_prefix('<')?;
    rest.strip_suffix('>').map(str::trim)
}

// Finds the last `sep` outside of nested `<...>`.
fn split_top_level(inner: &str, sep: char) -> Option<usize> {
    let mut depth = 0_i32;
    let mut found = None;
    for (index, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            c if c == sep && depth == 0 => found = Some(index),
            _ => {}
        }
    }
    found
}
