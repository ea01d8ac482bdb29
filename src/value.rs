//! Raw host values
//!
//! [`RawValue`] is the in-process picture of whatever a script left in
//! the output slot: a graph of scalars, sequences and keyed aggregates
//! that may alias itself, contain cycles, hold callables, or reference
//! live host objects. Reads against host-backed members can fault, so
//! aggregates record per-member probe outcomes instead of assuming
//! every read succeeds.
//!
//! Everything here is cheaply cloneable; aggregates are shared
//! reference-counted cells and clones alias the same underlying value.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::AccessFault;

/// A value produced by the host scripting engine.
#[derive(Clone)]
pub enum RawValue {
    /// The engine's "no value" (distinct from null in the host dialect).
    Absent,
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Numeric value; may be non-finite.
    Number(f64),
    /// Text.
    Text(String),
    /// A function-like value. Carries no payload; callables are never
    /// invoked or introspected on this side of the bridge.
    Callable,
    /// An ordered sequence, shared by reference.
    Sequence(SequenceRef),
    /// A keyed aggregate, shared by reference.
    Object(ObjectRef),
    /// A live host object reference.
    Host(HostRef),
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Absent => write!(f, "Absent"),
            RawValue::Null => write!(f, "Null"),
            RawValue::Bool(value) => write!(f, "Bool({value})"),
            RawValue::Number(value) => write!(f, "Number({value})"),
            RawValue::Text(value) => write!(f, "Text({value:?})"),
            RawValue::Callable => write!(f, "Callable"),
            RawValue::Sequence(seq) => write!(f, "Sequence(len={})", seq.len()),
            RawValue::Object(obj) => write!(f, "Object(members={})", obj.len()),
            RawValue::Host(_) => write!(f, "Host"),
        }
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<SequenceRef> for RawValue {
    fn from(value: SequenceRef) -> Self {
        RawValue::Sequence(value)
    }
}

impl From<ObjectRef> for RawValue {
    fn from(value: ObjectRef) -> Self {
        RawValue::Object(value)
    }
}

impl From<HostRef> for RawValue {
    fn from(value: HostRef) -> Self {
        RawValue::Host(value)
    }
}

/// Shared handle to an ordered sequence of values.
#[derive(Clone)]
pub struct SequenceRef(Rc<RefCell<Vec<RawValue>>>);

impl SequenceRef {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    /// Create a sequence from existing items.
    pub fn from_items(items: Vec<RawValue>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    /// Append an item.
    pub fn push(&self, item: RawValue) {
        self.0.borrow_mut().push(item);
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// True when the sequence has no items.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Stable identity of the underlying allocation, used for cycle
    /// and aliasing detection.
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Shared view of the items.
    pub fn items(&self) -> Ref<'_, Vec<RawValue>> {
        self.0.borrow()
    }
}

impl Default for SequenceRef {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot of a keyed aggregate. Host-backed properties can raise on
/// read, so a member is either a value or the fault that reading it
/// produced.
#[derive(Clone, Debug)]
pub enum Member {
    /// The member read successfully.
    Readable(RawValue),
    /// Reading the member raised in the host binding.
    Unreadable(AccessFault),
}

struct ObjectInner {
    identity_fault: Option<AccessFault>,
    members: Vec<(String, Member)>,
}

/// Shared handle to a keyed aggregate with insertion-ordered members.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectInner>>);

impl ObjectRef {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(ObjectInner {
            identity_fault: None,
            members: Vec::new(),
        })))
    }

    /// Append a readable member.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.0
            .borrow_mut()
            .members
            .push((key.into(), Member::Readable(value.into())));
    }

    /// Append a member whose read faults host-side.
    pub fn insert_unreadable(&self, key: impl Into<String>, fault: AccessFault) {
        self.0
            .borrow_mut()
            .members
            .push((key.into(), Member::Unreadable(fault)));
    }

    /// Mark the aggregate so that even asking for its type identity
    /// faults. Such a value is opaque to any consumer.
    pub fn set_identity_fault(&self, fault: AccessFault) {
        self.0.borrow_mut().identity_fault = Some(fault);
    }

    /// Number of members (including unreadable ones).
    pub fn len(&self) -> usize {
        self.0.borrow().members.len()
    }

    /// True when the aggregate has no members.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().members.is_empty()
    }

    /// The fault raised by the identity probe, if the probe faults.
    pub fn identity_fault(&self) -> Option<AccessFault> {
        self.0.borrow().identity_fault.clone()
    }

    /// Stable identity of the underlying allocation.
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Shared view of the members.
    pub fn members(&self) -> Ref<'_, Vec<(String, Member)>> {
        Ref::map(self.0.borrow(), |inner| &inner.members)
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

/// A live object owned by the host application. The bridge never walks
/// host object properties; it only asks for the two capabilities below,
/// either of which can fault.
pub trait HostObject {
    /// The host class name (e.g. `Rectangle`, `TextFrame`).
    fn class_name(&self) -> Result<String, AccessFault>;

    /// The host's resolvable address for this object.
    fn specifier(&self) -> Result<String, AccessFault>;
}

/// Shared handle to a [`HostObject`].
#[derive(Clone)]
pub struct HostRef(Rc<dyn HostObject>);

impl HostRef {
    /// Wrap a host object.
    pub fn new(object: impl HostObject + 'static) -> Self {
        Self(Rc::new(object))
    }

    /// Ask the host for the object's class name.
    pub fn class_name(&self) -> Result<String, AccessFault> {
        self.0.class_name()
    }

    /// Ask the host for the object's specifier.
    pub fn specifier(&self) -> Result<String, AccessFault> {
        self.0.specifier()
    }
}

/// A [`HostObject`] whose probe outcomes were captured up front, as the
/// gateway does when it dumps a result graph. A `None` outcome replays
/// as an [`AccessFault`] on the corresponding probe.
#[derive(Debug, Clone)]
pub struct HostHandle {
    class: Option<String>,
    specifier: Option<String>,
}

impl HostHandle {
    /// Handle for which both probes succeed.
    pub fn new(class: impl Into<String>, specifier: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            specifier: Some(specifier.into()),
        }
    }

    /// Handle built from raw probe outcomes.
    pub fn from_probes(class: Option<String>, specifier: Option<String>) -> Self {
        Self { class, specifier }
    }
}

impl HostObject for HostHandle {
    fn class_name(&self) -> Result<String, AccessFault> {
        self.class
            .clone()
            .ok_or_else(|| AccessFault::new("host object class name unavailable"))
    }

    fn specifier(&self) -> Result<String, AccessFault> {
        self.specifier
            .clone()
            .ok_or_else(|| AccessFault::new("host object specifier unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_alias_the_same_sequence() {
        let seq = SequenceRef::new();
        let alias = seq.clone();
        alias.push(RawValue::from(1i64));
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.identity(), alias.identity());
    }

    #[test]
    fn distinct_aggregates_have_distinct_identities() {
        let a = SequenceRef::new();
        let b = SequenceRef::new();
        assert_ne!(a.identity(), b.identity());

        let o = ObjectRef::new();
        let p = ObjectRef::new();
        assert_ne!(o.identity(), p.identity());
    }

    #[test]
    fn object_preserves_member_order() {
        let obj = ObjectRef::new();
        obj.insert("b", 2i64);
        obj.insert("a", 1i64);
        obj.insert_unreadable("c", AccessFault::new("nope"));
        let keys: Vec<String> = obj
            .members()
            .iter()
            .map(|(key, _)| key.clone())
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn host_handle_replays_probe_outcomes() {
        let ok = HostHandle::new("Rectangle", "/doc/rect[1]");
        assert_eq!(ok.class_name().as_deref(), Ok("Rectangle"));
        assert_eq!(ok.specifier().as_deref(), Ok("/doc/rect[1]"));

        let broken = HostHandle::from_probes(Some("Link".into()), None);
        assert!(broken.class_name().is_ok());
        assert!(broken.specifier().is_err());
    }
}
