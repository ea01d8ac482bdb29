//! Structural wire form for raw value graphs
//!
//! The gateway adapter dumps a script result as a [`WireValue`] tree:
//! every aggregate carries a dump-unique id, and a revisited aggregate
//! is sent as a backreference to that id. Decoding rebuilds the shared
//! graph, cycles included, so the defensive encoder on this side sees
//! the same aliasing the host engine had. Member read faults, identity
//! probe faults, callables and non-finite numbers all survive the trip
//! in their own spellings instead of being papered over host-side.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AccessFault, WireError};
use crate::value::{HostHandle, HostRef, Member, ObjectRef, RawValue, SequenceRef};

/// Spellings for numbers JSON cannot carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonFinite {
    /// Not a number.
    #[serde(rename = "nan")]
    Nan,
    /// Positive infinity.
    #[serde(rename = "+inf")]
    PosInf,
    /// Negative infinity.
    #[serde(rename = "-inf")]
    NegInf,
}

/// One member of a dumped aggregate: either a value or the message of
/// the fault its read raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMember {
    /// Member key.
    pub k: String,
    /// Member value, when the read succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<WireValue>,
    /// Fault message, when the read raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Serialized form of one value in a result dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum WireValue {
    /// The engine's absent value.
    Undefined,
    /// Null.
    Null,
    /// Boolean.
    Bool {
        /// The value.
        v: bool,
    },
    /// Number; exactly one of `v` and `nf` is present.
    Num {
        /// Finite value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        v: Option<f64>,
        /// Non-finite spelling.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nf: Option<NonFinite>,
    },
    /// Text.
    Str {
        /// The value.
        v: String,
    },
    /// A callable; never carries a payload.
    Fn,
    /// An ordered sequence.
    Seq {
        /// Dump-unique aggregate id.
        id: u32,
        /// Items in order.
        items: Vec<WireValue>,
    },
    /// A keyed aggregate.
    Obj {
        /// Dump-unique aggregate id.
        id: u32,
        /// True when even the identity probe faulted host-side.
        #[serde(default, skip_serializing_if = "is_false")]
        opaque: bool,
        /// Members in insertion order.
        #[serde(default)]
        members: Vec<WireMember>,
    },
    /// A live host object; properties are never dumped, only the two
    /// probe outcomes.
    Host {
        /// Class name, when the probe succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<String>,
        /// Specifier, when the probe succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<String>,
    },
    /// Backreference to an aggregate already dumped.
    Ref {
        /// Id of the referenced aggregate.
        id: u32,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Rebuild a raw value graph from its wire form.
pub fn from_wire(wire: &WireValue) -> Result<RawValue, WireError> {
    let mut refs = HashMap::new();
    decode_value(wire, &mut refs)
}

fn decode_value(
    wire: &WireValue,
    refs: &mut HashMap<u32, RawValue>,
) -> Result<RawValue, WireError> {
    match wire {
        WireValue::Undefined => Ok(RawValue::Absent),
        WireValue::Null => Ok(RawValue::Null),
        WireValue::Bool { v } => Ok(RawValue::Bool(*v)),
        WireValue::Num { v, nf } => {
            let n = match (v, nf) {
                (Some(n), _) => *n,
                (None, Some(NonFinite::Nan)) => f64::NAN,
                (None, Some(NonFinite::PosInf)) => f64::INFINITY,
                (None, Some(NonFinite::NegInf)) => f64::NEG_INFINITY,
                (None, None) => {
                    return Err(WireError::Malformed(
                        "number with neither value nor non-finite spelling".to_string(),
                    ));
                }
            };
            Ok(RawValue::Number(n))
        }
        WireValue::Str { v } => Ok(RawValue::Text(v.clone())),
        WireValue::Fn => Ok(RawValue::Callable),
        WireValue::Seq { id, items } => {
            let seq = SequenceRef::new();
            // Register before descending so a backreference inside the
            // items resolves to this same allocation.
            if refs
                .insert(*id, RawValue::Sequence(seq.clone()))
                .is_some()
            {
                return Err(WireError::DuplicateId(*id));
            }
            for item in items {
                seq.push(decode_value(item, refs)?);
            }
            Ok(RawValue::Sequence(seq))
        }
        WireValue::Obj {
            id,
            opaque,
            members,
        } => {
            let obj = ObjectRef::new();
            if *opaque {
                obj.set_identity_fault(AccessFault::new("type identity unreadable"));
            }
            if refs.insert(*id, RawValue::Object(obj.clone())).is_some() {
                return Err(WireError::DuplicateId(*id));
            }
            for member in members {
                match (&member.v, &member.err) {
                    (Some(value), _) => obj.insert(member.k.clone(), decode_value(value, refs)?),
                    (None, Some(err)) => {
                        obj.insert_unreadable(member.k.clone(), AccessFault::new(err.clone()));
                    }
                    (None, None) => {
                        return Err(WireError::Malformed(format!(
                            "member '{}' carries neither value nor fault",
                            member.k
                        )));
                    }
                }
            }
            Ok(RawValue::Object(obj))
        }
        WireValue::Host { class, spec } => Ok(RawValue::Host(HostRef::new(
            HostHandle::from_probes(class.clone(), spec.clone()),
        ))),
        WireValue::Ref { id } => refs
            .get(id)
            .cloned()
            .ok_or(WireError::UnknownRef(*id)),
    }
}

/// Dump a raw value graph to its wire form. Inverse of [`from_wire`]
/// up to aggregate id assignment; used by fakes and adapter tooling.
pub fn to_wire(value: &RawValue) -> WireValue {
    let mut ids = HashMap::new();
    let mut next_id = 0;
    encode_value(value, &mut ids, &mut next_id)
}

fn encode_value(value: &RawValue, ids: &mut HashMap<usize, u32>, next_id: &mut u32) -> WireValue {
    match value {
        RawValue::Absent => WireValue::Undefined,
        RawValue::Null => WireValue::Null,
        RawValue::Bool(v) => WireValue::Bool { v: *v },
        RawValue::Number(n) if n.is_finite() => WireValue::Num {
            v: Some(*n),
            nf: None,
        },
        RawValue::Number(n) => WireValue::Num {
            v: None,
            nf: Some(if n.is_nan() {
                NonFinite::Nan
            } else if n.is_sign_positive() {
                NonFinite::PosInf
            } else {
                NonFinite::NegInf
            }),
        },
        RawValue::Text(v) => WireValue::Str { v: v.clone() },
        RawValue::Callable => WireValue::Fn,
        RawValue::Sequence(seq) => {
            if let Some(id) = ids.get(&seq.identity()) {
                return WireValue::Ref { id: *id };
            }
            let id = *next_id;
            *next_id += 1;
            ids.insert(seq.identity(), id);
            let items = seq
                .items()
                .iter()
                .map(|item| encode_value(item, ids, next_id))
                .collect();
            WireValue::Seq { id, items }
        }
        RawValue::Object(obj) => {
            if let Some(id) = ids.get(&obj.identity()) {
                return WireValue::Ref { id: *id };
            }
            let id = *next_id;
            *next_id += 1;
            ids.insert(obj.identity(), id);
            let members = obj
                .members()
                .iter()
                .map(|(key, member)| match member {
                    Member::Readable(value) => WireMember {
                        k: key.clone(),
                        v: Some(encode_value(value, ids, next_id)),
                        err: None,
                    },
                    Member::Unreadable(fault) => WireMember {
                        k: key.clone(),
                        v: None,
                        err: Some(fault.message.clone()),
                    },
                })
                .collect();
            WireValue::Obj {
                id,
                opaque: obj.identity_fault().is_some(),
                members,
            }
        }
        RawValue::Host(host) => WireValue::Host {
            class: host.class_name().ok(),
            spec: host.specifier().ok(),
        },
    }
}
