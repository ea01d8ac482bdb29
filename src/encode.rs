//! Defensive result encoding
//!
//! Renders a [`RawValue`] graph to JSON text. The walk is total: it
//! terminates on every input (cyclic, deep, aliased, fault-riddled) and
//! never raises. Anything that cannot be represented degrades to a
//! placeholder or is dropped, never failing the whole encoding.
//!
//! Rules, in the order they are applied to each value:
//!
//! 1. depth beyond [`MAX_DEPTH`] renders [`MAX_DEPTH_PLACEHOLDER`];
//! 2. host objects render their specifier tag without any property
//!    walk (touching arbitrary properties of a live object can mutate
//!    or fault);
//! 3. an aggregate whose identity probe faults renders `null`;
//! 4. an aggregate already on the in-progress path renders
//!    [`CIRCULAR_PLACEHOLDER`];
//! 5. callables are dropped: a sequence keeps `null` in the slot so
//!    indices still line up, a keyed aggregate omits the key;
//! 6. non-finite numbers render `null`;
//! 7. a member whose read faults is dropped on its own, the rest of
//!    the aggregate survives.

use std::fmt::Write as _;

use crate::value::{HostRef, Member, ObjectRef, RawValue, SequenceRef};

/// Deepest nesting level that still renders; anything below becomes
/// [`MAX_DEPTH_PLACEHOLDER`].
pub const MAX_DEPTH: usize = 20;

/// Placeholder for subtrees cut off by the depth bound.
pub const MAX_DEPTH_PLACEHOLDER: &str = "[max depth]";

/// Placeholder for a backreference into the in-progress path.
pub const CIRCULAR_PLACEHOLDER: &str = "[circular]";

/// Placeholder for a host object whose specifier cannot be read.
pub const OPAQUE_HOST_PLACEHOLDER: &str = "[HOST object]";

/// Encode a raw value graph as JSON text. Always returns valid JSON.
pub fn encode(value: &RawValue) -> String {
    let mut out = String::new();
    let mut path = Vec::new();
    encode_value(value, 0, &mut path, &mut out);
    out
}

fn encode_value(value: &RawValue, depth: usize, path: &mut Vec<usize>, out: &mut String) {
    if depth > MAX_DEPTH {
        push_string(out, MAX_DEPTH_PLACEHOLDER);
        return;
    }
    match value {
        RawValue::Absent | RawValue::Null => out.push_str("null"),
        RawValue::Bool(true) => out.push_str("true"),
        RawValue::Bool(false) => out.push_str("false"),
        RawValue::Number(n) if n.is_finite() => {
            let _ = write!(out, "{n}");
        }
        // NaN and the infinities have no JSON spelling.
        RawValue::Number(_) => out.push_str("null"),
        RawValue::Text(text) => push_string(out, text),
        // A callable reaching this point sits outside any container
        // (top-level result or sequence slot); it renders as null.
        RawValue::Callable => out.push_str("null"),
        RawValue::Sequence(seq) => encode_sequence(seq, depth, path, out),
        RawValue::Object(obj) => encode_object(obj, depth, path, out),
        RawValue::Host(host) => encode_host(host, out),
    }
}

fn encode_sequence(seq: &SequenceRef, depth: usize, path: &mut Vec<usize>, out: &mut String) {
    let identity = seq.identity();
    if path.contains(&identity) {
        push_string(out, CIRCULAR_PLACEHOLDER);
        return;
    }
    path.push(identity);
    out.push('[');
    let items = seq.items();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        encode_value(item, depth + 1, path, out);
    }
    out.push(']');
    path.pop();
}

fn encode_object(obj: &ObjectRef, depth: usize, path: &mut Vec<usize>, out: &mut String) {
    // The identity probe runs before any identity comparison.
    if obj.identity_fault().is_some() {
        out.push_str("null");
        return;
    }
    let identity = obj.identity();
    if path.contains(&identity) {
        push_string(out, CIRCULAR_PLACEHOLDER);
        return;
    }
    path.push(identity);
    out.push('{');
    let members = obj.members();
    let mut first = true;
    for (key, member) in members.iter() {
        let value = match member {
            // A single unreadable member never sinks its siblings.
            Member::Unreadable(_) => continue,
            // Callable members are omitted, key and all.
            Member::Readable(RawValue::Callable) => continue,
            Member::Readable(value) => value,
        };
        if !first {
            out.push(',');
        }
        first = false;
        push_string(out, key);
        out.push(':');
        encode_value(value, depth + 1, path, out);
    }
    out.push('}');
    path.pop();
}

fn encode_host(host: &HostRef, out: &mut String) {
    let class = match host.class_name() {
        Ok(class) => class,
        Err(_) => {
            out.push_str("null");
            return;
        }
    };
    match host.specifier() {
        Ok(spec) => push_string(out, &format!("[HOST:{class}:{spec}]")),
        Err(_) => push_string(out, OPAQUE_HOST_PLACEHOLDER),
    }
}

fn push_string(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{000C}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            ch if (ch as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
}
