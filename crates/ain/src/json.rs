//! JSON side channel (spec §6): a `serde_json`-built mirror of [`AinFile`],
//! grounded in `json_dump.c`'s tree shape (function/variable/type objects
//! keyed the same way) so an external JSON-editing tool has a stable target.
//! Only [`AinFile::to_json_value`] and [`AinFile::apply_json_patch`] are in
//! scope here; a standalone JSON importer CLI remains out of scope (spec §1).

use serde_json::{json, Value};

use crate::types::{AinType, AinTypeTag, Constant, Function, Variable};
use crate::{AinFile, Error, Result};

fn type_to_json(ty: &AinType) -> Value {
    let tag_no = tag_discriminant(&ty.tag);
    let struc = match &ty.tag {
        AinTypeTag::Struct(r) | AinTypeTag::Iface(r) => r.0 as i64,
        AinTypeTag::FuncType(r) => r.0 as i64,
        AinTypeTag::Delegate(r) => r.0 as i64,
        _ => -1,
    };
    json!({
        "data": tag_no,
        "struc": struc,
        "rank": ty.rank,
        "array_type": ty.element.as_ref().map(|e| type_to_json(e)),
    })
}

/// Stable small-integer tag matching the order [`AinTypeTag`] declares them
/// in, used only for the JSON mirror (never serialised to the binary codec).
fn tag_discriminant(tag: &AinTypeTag) -> i32 {
    match tag {
        AinTypeTag::Void => 0,
        AinTypeTag::Int => 1,
        AinTypeTag::Float => 2,
        AinTypeTag::String => 3,
        AinTypeTag::Struct(_) => 4,
        AinTypeTag::Array => 5,
        AinTypeTag::RefArray => 6,
        AinTypeTag::Function => 7,
        AinTypeTag::FuncType(_) => 8,
        AinTypeTag::Bool => 9,
        AinTypeTag::LongInt => 10,
        AinTypeTag::Delegate(_) => 11,
        AinTypeTag::HllParam => 12,
        AinTypeTag::Iface(_) => 13,
        AinTypeTag::Enum(_) => 14,
        AinTypeTag::IMainSystem => 15,
        AinTypeTag::Wrap => 16,
        AinTypeTag::Method => 17,
        AinTypeTag::Ref(inner) => 1000 + tag_discriminant(inner),
        _ => -1,
    }
}

fn constant_to_json(c: &Constant) -> Value {
    match c {
        Constant::Void => Value::Null,
        Constant::Int(v) => json!(v),
        Constant::LongInt(v) => json!(v),
        Constant::Bool(v) => json!(v),
        Constant::Float(v) => json!(v),
        Constant::String(s) => json!(s.as_str()),
    }
}

fn variable_to_json(v: &Variable) -> Value {
    let mut o = json!({
        "name": v.name.as_str(),
        "type": type_to_json(&v.ty),
    });
    let obj = o.as_object_mut().unwrap();
    if let Some(name2) = &v.name2 {
        obj.insert("name2".into(), json!(name2.as_str()));
    }
    if let Some(init) = &v.initial_value {
        obj.insert("initval".into(), constant_to_json(init));
    }
    if let Some(g) = v.group_index {
        obj.insert("group-index".into(), json!(g));
    }
    o
}

fn function_to_json(f: &Function, index: usize) -> Value {
    let args: Vec<Value> = f.variables.iter().take(f.nr_args).map(variable_to_json).collect();
    let vars: Vec<Value> = f.variables.iter().skip(f.nr_args).map(variable_to_json).collect();
    let mut o = json!({
        "index": index,
        "name": f.name.as_str(),
        "address": f.address.unwrap_or(0),
        "return-type": type_to_json(&f.return_type),
        "crc": f.crc.unwrap_or(0),
        "arguments": args,
        "variables": vars,
    });
    let obj = o.as_object_mut().unwrap();
    if f.flags.is_label {
        obj.insert("is-label".into(), json!(true));
    }
    if f.flags.is_lambda {
        obj.insert("unknown-bool".into(), json!(true));
    }
    o
}

impl AinFile {
    /// Build the canonical JSON mirror of this file (spec §6). Field naming
    /// follows `json_dump.c`'s object shape (`"index"`, `"return-type"`,
    /// `"group-index"`, ...) so a round-trip through the external JSON tool
    /// stays compatible.
    pub fn to_json_value(&self) -> Value {
        json!({
            "version": { "major": self.version_major, "minor": self.version_minor },
            "functions": self.functions.iter().enumerate().map(|(i, f)| function_to_json(f, i)).collect::<Vec<_>>(),
            "globals": self.globals.iter().map(variable_to_json).collect::<Vec<_>>(),
            "structures": self.structs.iter().map(|s| json!({
                "name": s.name.as_str(),
                "is-interface": s.is_interface,
                "members": s.members.iter().map(variable_to_json).collect::<Vec<_>>(),
                "methods": s.methods.iter().map(|m| m.0).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "strings": self.strings.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "messages": self.messages.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "libraries": self.libraries.iter().map(|l| json!({
                "name": l.name.as_str(),
                "functions": l.functions.iter().map(|f| json!({
                    "name": f.name.as_str(),
                    "return-type": type_to_json(&f.return_type),
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }

    /// Apply a patch shaped `{"strings": {"3": "new text"}, "messages": {...}}`,
    /// overwriting pool entries by index. This mirrors what `SETSTR`/`SETMSG`
    /// do in the JAM assembler (spec §4.2) and is the only mutation the JSON
    /// side channel is specified to support (spec §6).
    pub fn apply_json_patch(&mut self, patch: &Value) -> Result<()> {
        if let Some(strings) = patch.get("strings").and_then(Value::as_object) {
            for (idx, text) in strings {
                let i: usize = idx.parse().map_err(|_| Error::invalid_input(format!("bad string index '{idx}'")))?;
                let text = text
                    .as_str()
                    .ok_or_else(|| Error::invalid_input(format!("strings[{idx}] must be a string")))?;
                let slot = self
                    .strings
                    .get_mut(i)
                    .ok_or_else(|| Error::invalid_input(format!("string index {i} out of range")))?;
                *slot = crate::Str::from(text);
            }
        }
        if let Some(messages) = patch.get("messages").and_then(Value::as_object) {
            for (idx, text) in messages {
                let i: usize = idx.parse().map_err(|_| Error::invalid_input(format!("bad message index '{idx}'")))?;
                let text = text
                    .as_str()
                    .ok_or_else(|| Error::invalid_input(format!("messages[{idx}] must be a string")))?;
                let slot = self
                    .messages
                    .get_mut(i)
                    .ok_or_else(|| Error::invalid_input(format!("message index {i} out of range")))?;
                *slot = crate::Str::from(text);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_version_and_string_pool() {
        let mut ain = AinFile::new(6, 0);
        ain.strings.push(crate::Str::from("hello"));
        let v = ain.to_json_value();
        assert_eq!(v["version"]["major"], 6);
        assert_eq!(v["strings"][0], "hello");
    }

    #[test]
    fn patches_a_string_by_index() {
        let mut ain = AinFile::new(6, 0);
        ain.strings.push(crate::Str::from("old"));
        let patch = json!({"strings": {"0": "new"}});
        ain.apply_json_patch(&patch).unwrap();
        assert_eq!(ain.strings[0].as_str(), "new");
    }

    #[test]
    fn rejects_out_of_range_patch() {
        let mut ain = AinFile::new(6, 0);
        let patch = json!({"strings": {"5": "new"}});
        assert!(ain.apply_json_patch(&patch).is_err());
    }
}
