// Define a nested data structure of arrays, objects, and scalar values that can subsequently be
// serialized as JSON.  Field order is insertion order.

use crate::util;

use std::io;

#[derive(Debug)]
pub enum Value {
    A(Array),
    O(Object),
    S(String),
    U(u64),
    N(), // JSON null
}

#[derive(Debug)]
struct Field {
    tag: String,
    value: Value,
}

#[derive(Debug, Default)]
pub struct Object {
    fields: Vec<Field>,
}

impl Object {
    pub fn new() -> Object {
        Object { fields: vec![] }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.tag == key).map(|f| &f.value)
    }

    pub fn push(&mut self, tag: &str, value: Value) {
        self.fields.push(Field {
            tag: tag.to_string(),
            value,
        })
    }

    pub fn push_o(&mut self, tag: &str, o: Object) {
        self.push(tag, Value::O(o));
    }

    pub fn push_a(&mut self, tag: &str, a: Array) {
        self.push(tag, Value::A(a));
    }

    pub fn push_s(&mut self, tag: &str, s: String) {
        self.push(tag, Value::S(s));
    }

    pub fn push_u(&mut self, tag: &str, u: u64) {
        self.push(tag, Value::U(u));
    }

    pub fn push_n(&mut self, tag: &str) {
        self.push(tag, Value::N());
    }
}

#[derive(Debug, Default)]
pub struct Array {
    elements: Vec<Value>,
}

impl Array {
    pub fn new() -> Array {
        Array { elements: vec![] }
    }

    pub fn push(&mut self, value: Value) {
        self.elements.push(value)
    }

    pub fn push_o(&mut self, o: Object) {
        self.push(Value::O(o));
    }

    pub fn push_a(&mut self, a: Array) {
        self.push(Value::A(a));
    }

    pub fn push_u(&mut self, u: u64) {
        self.push(Value::U(u));
    }
}

// JSON output follows the standard.

pub fn write_json(writer: &mut dyn io::Write, v: &Value) -> io::Result<()> {
    write_json_int(writer, v)?;
    writer.write_all(b"\n")
}

fn write_json_int(writer: &mut dyn io::Write, v: &Value) -> io::Result<()> {
    match v {
        Value::A(a) => write_json_array(writer, a),
        Value::O(o) => write_json_object(writer, o),
        Value::S(s) => write_json_string(writer, s),
        Value::U(u) => write!(writer, "{u}"),
        Value::N() => writer.write_all(b"null"),
    }
}

fn write_json_array(writer: &mut dyn io::Write, a: &Array) -> io::Result<()> {
    writer.write_all(b"[")?;
    let mut first = true;
    for elt in &a.elements {
        if !first {
            writer.write_all(b",")?;
        }
        write_json_int(writer, elt)?;
        first = false;
    }
    writer.write_all(b"]")
}

fn write_json_object(writer: &mut dyn io::Write, o: &Object) -> io::Result<()> {
    writer.write_all(b"{")?;
    let mut first = true;
    for fld in &o.fields {
        if !first {
            writer.write_all(b",")?;
        }
        write_json_string(writer, &fld.tag)?;
        writer.write_all(b":")?;
        write_json_int(writer, &fld.value)?;
        first = false;
    }
    writer.write_all(b"}")
}

fn write_json_string(writer: &mut dyn io::Write, s: &str) -> io::Result<()> {
    write!(writer, "\"{}\"", util::json_quote(s))
}
