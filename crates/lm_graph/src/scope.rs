//! Scope state of one serialize or deserialize pass.
//!
//! A [`WriteScope`] or [`ReadScope`] owns everything local to one stream:
//! tables, identities, seen types and deferred work. A split scope is a
//! fresh scope value on the call stack while its parent is suspended; the
//! persistent [`ScopeStack`] records the nesting.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use fixedbitset::FixedBitSet;
use lm_utils::PtrMap;

use crate::de::fixup::{FixupQueue, Identities};
use crate::error::GraphError;
use crate::info::TypeKey;
use crate::registry::{FinalAction, TypeRegistry};
use crate::tables::{ReadTables, WriteTables};
use crate::value::ObjRef;

// -----------------------------------------------------------------------------
// ScopeStack

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Top,
    /// A nested payload of a handler for the given type.
    Split(TypeKey),
}

#[derive(Debug)]
struct Frame {
    kind: ScopeKind,
    depth: usize,
    parent: ScopeStack,
}

/// An immutable linked stack of open scopes.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeStack {
    head: Option<Rc<Frame>>,
}

impl ScopeStack {
    /// Returns the stack with `kind` opened on top.
    ///
    /// # Panics
    ///
    /// A top-level scope may only open on an empty stack, and a split
    /// scope only inside another scope.
    pub fn push(&self, kind: ScopeKind) -> Self {
        assert_eq!(
            matches!(kind, ScopeKind::Top),
            self.head.is_none(),
            "{kind:?} scope opened at depth {}",
            self.depth()
        );
        Self {
            head: Some(Rc::new(Frame {
                kind,
                depth: self.depth() + 1,
                parent: self.clone(),
            })),
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |frame| frame.depth)
    }

    #[inline]
    pub fn kind(&self) -> Option<ScopeKind> {
        self.head.as_ref().map(|frame| frame.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ScopeKind> + '_ {
        let mut cursor = self.head.as_deref();
        core::iter::from_fn(move || {
            let frame = cursor?;
            cursor = frame.parent.head.as_deref();
            Some(frame.kind)
        })
    }

    /// Outermost first, e.g. `top > split(demo.Blob)`.
    pub fn describe(&self, registry: &TypeRegistry) -> String {
        let mut parts: Vec<String> = self
            .iter()
            .map(|kind| match kind {
                ScopeKind::Top => String::from("top"),
                ScopeKind::Split(ty) => match registry.get(ty) {
                    Some(meta) => alloc::format!("split({})", meta.path()),
                    None => alloc::format!("split({ty})"),
                },
            })
            .collect();
        parts.reverse();
        parts.join(" > ")
    }

    /// Appends the scope nesting to corrupt stream errors.
    #[cfg(all(debug_assertions, feature = "debug"))]
    pub fn annotate(&self, err: GraphError, registry: &TypeRegistry) -> GraphError {
        match err {
            GraphError::CorruptStream(msg) if !msg.ends_with(']') => GraphError::corrupt(alloc::format!(
                "{msg} [scope: {}]",
                self.describe(registry)
            )),
            other => other,
        }
    }

    #[cfg(not(all(debug_assertions, feature = "debug")))]
    #[inline(always)]
    pub fn annotate(&self, err: GraphError, _registry: &TypeRegistry) -> GraphError {
        err
    }
}

/// Marks a type as seen, returning whether it already was.
fn mark_seen(seen: &mut FixedBitSet, ty: TypeKey) -> bool {
    if seen.len() <= ty.index() {
        seen.grow(ty.index() + 1);
    }
    seen.put(ty.index())
}

// -----------------------------------------------------------------------------
// WriteScope

pub(crate) struct WriteScope<'a> {
    pub stack: ScopeStack,
    pub tables: WriteTables<'a>,
    identities: PtrMap<u32>,
    next_id: u32,
    seen: FixedBitSet,
    // Identities are keyed by address, so every recorded object and every
    // handler payload is held until the pass ends.
    retained: Vec<ObjRef>,
}

impl<'a> WriteScope<'a> {
    pub fn new(stack: ScopeStack, tables: WriteTables<'a>) -> Self {
        Self {
            stack,
            tables,
            identities: PtrMap::new(),
            next_id: 0,
            seen: FixedBitSet::new(),
            retained: Vec::new(),
        }
    }

    #[inline]
    pub fn identity(&self, obj: &ObjRef) -> Option<u32> {
        self.identities.get(obj.addr()).copied()
    }

    /// Assigns the next object id and holds the object for the rest of
    /// the pass.
    pub fn record(&mut self, obj: &ObjRef) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.identities.insert(obj.addr(), id);
        self.retained.push(obj.clone());
        id
    }

    #[inline]
    pub fn mark_seen(&mut self, ty: TypeKey) -> bool {
        mark_seen(&mut self.seen, ty)
    }

    #[inline]
    pub fn retain(&mut self, obj: ObjRef) {
        self.retained.push(obj);
    }

    #[inline]
    pub fn object_count(&self) -> u32 {
        self.next_id
    }
}

// -----------------------------------------------------------------------------
// ReadScope

pub(crate) struct ReadScope<'a> {
    pub stack: ScopeStack,
    pub tables: ReadTables<'a>,
    pub verbose: bool,
    pub ids: Identities,
    pub fixups: FixupQueue,
    pub finals: Vec<FinalAction>,
    /// Rebuilt objects with a deserialized callback, in creation order.
    pub created: Vec<ObjRef>,
    seen: FixedBitSet,
}

impl<'a> ReadScope<'a> {
    pub fn new(stack: ScopeStack, tables: ReadTables<'a>, verbose: bool) -> Self {
        Self {
            stack,
            tables,
            verbose,
            ids: Identities::default(),
            fixups: FixupQueue::default(),
            finals: Vec::new(),
            created: Vec::new(),
            seen: FixedBitSet::new(),
        }
    }

    #[inline]
    pub fn mark_seen(&mut self, ty: TypeKey) -> bool {
        mark_seen(&mut self.seen, ty)
    }
}
