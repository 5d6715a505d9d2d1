//! Runtime values and their printing/equality/truthiness laws.
//!
//! Values are cheap to clone: aggregates are shared by reference, so
//! mutation through one alias is observed through every other, while the
//! copying built-ins (`APPEND`, `SET`, …) allocate fresh aggregates.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::entity::Entity;
use crate::syntax::Stmt;

use super::builtins::BuiltinRite;
use super::scope::ScopeRef;

/// A user-defined rite: parameter names, body AST, and the captured
/// definition scope (lexical closure).
#[derive(Debug)]
pub struct UserRite {
    /// Name the rite was defined under.
    pub name: String,
    /// Parameter names in order.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Rc<Vec<Stmt>>,
    /// Scope the rite was defined in.
    pub closure: ScopeRef,
}

/// Shared mutable array payload.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
/// Shared mutable map payload, insertion-ordered with string keys.
pub type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Immutable UTF-8 text.
    Str(String),
    /// `ALIVE` / `DEAD` at the language level.
    Boolean(bool),
    /// The unit value, printed as `VOID`.
    Void,
    /// Ordered mutable sequence, shared by reference.
    Array(ArrayRef),
    /// String-keyed insertion-ordered mutable map, shared by reference.
    Map(MapRef),
    /// User-defined rite.
    Rite(Rc<UserRite>),
    /// Built-in rite.
    Builtin(&'static BuiltinRite),
    /// Handle to a mortal object.
    Entity(Rc<Entity>),
}

impl Value {
    /// Wrap owned elements as an array value.
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    /// Wrap owned entries as a map value.
    pub fn map(entries: IndexMap<String, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// String value from anything stringy.
    pub fn str(text: impl Into<String>) -> Value {
        Value::Str(text.into())
    }

    /// Type tag as reported by `TYPEOF`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Str(_) => "STRING",
            Value::Boolean(_) => "BOOLEAN",
            Value::Void => "VOID",
            Value::Array(_) => "ARRAY",
            Value::Map(_) => "MAP",
            Value::Rite(_) | Value::Builtin(_) => "RITE",
            Value::Entity(_) => "ENTITY",
        }
    }

    /// Truthiness: `VOID`, `DEAD`, numeric zero, and empty strings,
    /// arrays, and maps are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Rite(_) | Value::Builtin(_) | Value::Entity(_) => true,
        }
    }

    /// Canonical string form used by `STRING`, `UTTER`, and collection
    /// printing. Strings render verbatim (unquoted), including inside
    /// collections; floats use the host's shortest-round-trip decimal.
    pub fn stringify(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => s.clone(),
            Value::Boolean(true) => "ALIVE".to_string(),
            Value::Boolean(false) => "DEAD".to_string(),
            Value::Void => "VOID".to_string(),
            Value::Array(items) => {
                let rendered: Vec<String> =
                    items.borrow().iter().map(Value::stringify).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Map(entries) => {
                let rendered: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.stringify()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Rite(rite) => format!("<rite {}>", rite.name),
            Value::Builtin(builtin) => format!("<rite {}>", builtin.name),
            Value::Entity(entity) => format!("<entity {}>", entity.name()),
        }
    }

    /// Numeric view, promoting integers to doubles. Used for mixed
    /// arithmetic and comparison.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Whether this value is an integer or a float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }
}

/// Scalars compare by value (integers and floats compare numerically
/// across the two representations); aggregates, rites, and entities
/// compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Rite(a), Value::Rite(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Entity(a), Value::Entity(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    #[test]
    fn canonical_scalar_forms() {
        assert_eq!(Value::Integer(42).stringify(), "42");
        assert_eq!(Value::Integer(-7).stringify(), "-7");
        assert_eq!(Value::Float(2.5).stringify(), "2.5");
        assert_eq!(Value::Float(4.0).stringify(), "4");
        assert_eq!(Value::Boolean(true).stringify(), "ALIVE");
        assert_eq!(Value::Boolean(false).stringify(), "DEAD");
        assert_eq!(Value::Void.stringify(), "VOID");
        assert_eq!(Value::str("plain").stringify(), "plain");
    }

    #[test]
    fn collection_forms_render_strings_unquoted() {
        let arr = Value::array(vec![Value::str("a"), Value::str("b"), Value::Integer(3)]);
        assert_eq!(arr.stringify(), "[a, b, 3]");

        let map = Value::map(indexmap! {
            "x".to_string() => Value::Integer(1),
            "y".to_string() => Value::str("two"),
        });
        assert_eq!(map.stringify(), "{x: 1, y: two}");
    }

    #[test]
    fn truthiness_follows_emptiness_and_zero() {
        assert!(!Value::Void.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(!Value::map(IndexMap::new()).is_truthy());

        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::array(vec![Value::Void]).is_truthy());
    }

    #[test]
    fn numeric_equality_crosses_representations() {
        assert_eq!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::Integer(1), Value::Float(1.5));
        assert_ne!(Value::Integer(1), Value::str("1"));
        assert_ne!(Value::Boolean(true), Value::Integer(1));
    }

    #[test]
    fn aggregates_compare_by_identity() {
        let a = Value::array(vec![Value::Integer(1)]);
        let b = Value::array(vec![Value::Integer(1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
