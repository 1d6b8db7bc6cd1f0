//! Runtime object model.
//!
//! Values live on the heap as shared [`ObjectHolder`] cells. Holders come in
//! an owning and a non-owning form; the non-owning form exists for the `self`
//! binding of an executing method, which must not keep its receiver alive.
//! Classes are cheap reference handles so that every instance can point at a
//! live class for as long as it exists.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::{Rc, Weak};

use thiserror::Error;

pub const STR_METHOD: &str = "__str__";
pub const EQ_METHOD: &str = "__eq__";
pub const LT_METHOD: &str = "__lt__";

const SELF_NAME: &str = "self";

/// A name -> value mapping: the global scope, a method's local scope, or the
/// field set of a class instance.
pub type Closure = HashMap<String, ObjectHolder>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined field '{field}'")]
    UndefinedField { field: String },
    #[error("'{name}' is not a class instance")]
    NotAnInstance { name: String },
    #[error("Method '{method}' called on a value that is not a class instance")]
    MethodOnNonInstance { method: String },
    #[error("Field '{field}' assigned on a value that is not a class instance")]
    FieldOnNonInstance { field: String },
    #[error("Class '{class}' has no method '{method}' taking {arity} arguments")]
    UnknownMethod {
        class: String,
        method: String,
        arity: usize,
    },
    #[error("Cannot compare objects for equality")]
    EqualityNotSupported,
    #[error("Cannot compare objects for less")]
    OrderingNotSupported,
    #[error("Method '{method}' must return a Bool value")]
    ComparisonNotBool { method: String },
    #[error("Expected a Bool value in {place}")]
    ExpectedBool { place: &'static str },
    #[error("Cannot apply '{operation}' to {lhs} and {rhs}")]
    InvalidOperands {
        operation: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Cannot write program output: {message}")]
    Output { message: String },
}

/// Why execution of a node stopped early: a genuine runtime failure, or the
/// internal return signal. The two are disjoint by tag; the signal carries no
/// payload (the returned value travels through the closure) and is caught
/// only by method bodies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Return outside of a method body")]
    Return,
}

pub type ExecResult<T = ObjectHolder> = Result<T, ExecError>;

/// Host environment threaded through execution; owns the output sink.
pub struct Context<'a> {
    output: &'a mut dyn io::Write,
}

impl<'a> Context<'a> {
    pub fn new(output: &'a mut dyn io::Write) -> Self {
        Self { output }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.output
            .write_all(bytes)
            .map_err(|error| RuntimeError::Output {
                message: error.to_string(),
            })
    }
}

/// A runnable program fragment. The AST statement type implements this; the
/// runtime only needs the trait to execute stored method bodies.
pub trait Executable: fmt::Debug {
    fn execute(&self, closure: &mut Closure, context: &mut Context<'_>) -> ExecResult;
}

/// A named method: formal parameter list plus an executable body.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Box<dyn Executable>,
}

struct ClassData {
    name: String,
    methods: Vec<Method>,
    parent: Option<Class>,
}

/// A class: a name, an ordered method table, and an optional parent.
///
/// `Class` is a shared handle; cloning it is cheap and keeps the underlying
/// table alive, so a class always outlives its instances.
#[derive(Clone)]
pub struct Class {
    data: Rc<ClassData>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<Class>) -> Self {
        Self {
            data: Rc::new(ClassData {
                name,
                methods,
                parent,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn parent(&self) -> Option<&Class> {
        self.data.parent.as_ref()
    }

    /// First method with a matching name, walking the parent chain on a miss.
    /// A name match short-circuits: arity is the caller's concern.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.data
            .methods
            .iter()
            .find(|method| method.name == name)
            .or_else(|| self.parent().and_then(|parent| parent.method(name)))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.name())
    }
}

/// An instance: a reference to its class plus a fields closure.
#[derive(Debug)]
pub struct ClassInstance {
    class: Class,
    fields: Closure,
}

impl ClassInstance {
    pub fn new(class: Class) -> Self {
        Self {
            class,
            fields: Closure::new(),
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn fields(&self) -> &Closure {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Closure {
        &mut self.fields
    }

    /// True iff a method with this exact name exists in the class chain and
    /// the first one found takes exactly `arity` parameters.
    pub fn has_method(&self, method: &str, arity: usize) -> bool {
        self.class
            .method(method)
            .is_some_and(|found| found.formal_params.len() == arity)
    }
}

/// The closed set of runtime values.
#[derive(Debug)]
pub enum Object {
    Number(i64),
    String(String),
    Bool(bool),
    Class(Class),
    Instance(ClassInstance),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Number(_) => "number",
            Object::String(_) => "string",
            Object::Bool(_) => "bool",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
        }
    }
}

#[derive(Clone, Default)]
enum Handle {
    /// The absent value; prints as `None` and is falsy.
    #[default]
    None,
    Owned(Rc<RefCell<Object>>),
    /// Non-owning alias. Does not extend the object's lifetime; reading it
    /// after the last owner dropped behaves like the absent value.
    Shared(Weak<RefCell<Object>>),
}

/// Shared handle to a heap object, or the absent value.
#[derive(Clone, Default)]
pub struct ObjectHolder {
    handle: Handle,
}

impl ObjectHolder {
    /// Takes ownership of a freshly constructed object.
    pub fn own(object: Object) -> Self {
        Self {
            handle: Handle::Owned(Rc::new(RefCell::new(object))),
        }
    }

    /// The absent value.
    pub fn none() -> Self {
        Self::default()
    }

    /// A non-owning alias of the same object. Used for the `self` binding in
    /// method closures so a method cannot keep its receiver alive.
    pub fn share(&self) -> Self {
        let handle = match &self.handle {
            Handle::None => Handle::None,
            Handle::Owned(object) => Handle::Shared(Rc::downgrade(object)),
            Handle::Shared(object) => Handle::Shared(object.clone()),
        };
        Self { handle }
    }

    fn object(&self) -> Option<Rc<RefCell<Object>>> {
        match &self.handle {
            Handle::None => Option::None,
            Handle::Owned(object) => Some(Rc::clone(object)),
            Handle::Shared(object) => object.upgrade(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.object().is_none()
    }

    pub fn type_name(&self) -> &'static str {
        match self.object() {
            Some(object) => object.borrow().type_name(),
            Option::None => "none",
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        self.object().and_then(|object| match &*object.borrow() {
            Object::Number(value) => Some(*value),
            _ => Option::None,
        })
    }

    pub fn as_string(&self) -> Option<String> {
        self.object().and_then(|object| match &*object.borrow() {
            Object::String(value) => Some(value.clone()),
            _ => Option::None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.object().and_then(|object| match &*object.borrow() {
            Object::Bool(value) => Some(*value),
            _ => Option::None,
        })
    }

    pub fn as_class(&self) -> Option<Class> {
        self.object().and_then(|object| match &*object.borrow() {
            Object::Class(class) => Some(class.clone()),
            _ => Option::None,
        })
    }

    pub fn is_instance(&self) -> bool {
        self.with_instance(|_| ()).is_some()
    }

    /// Runs `f` against the instance behind this holder, or returns `None`
    /// if the holder does not refer to a live instance. The borrow of the
    /// underlying cell ends before this returns, so `f` must not execute
    /// arbitrary program code.
    pub fn with_instance<R>(&self, f: impl FnOnce(&ClassInstance) -> R) -> Option<R> {
        let object = self.object()?;
        let borrowed = object.borrow();
        match &*borrowed {
            Object::Instance(instance) => Some(f(instance)),
            _ => Option::None,
        }
    }

    pub fn with_instance_mut<R>(&self, f: impl FnOnce(&mut ClassInstance) -> R) -> Option<R> {
        let object = self.object()?;
        let mut borrowed = object.borrow_mut();
        match &mut *borrowed {
            Object::Instance(instance) => Some(f(instance)),
            _ => Option::None,
        }
    }

    /// Truthiness: a Bool is its value, a Number is true iff non-zero, a
    /// String is true iff non-empty; everything else is false.
    pub fn is_true(&self) -> bool {
        let Some(object) = self.object() else {
            return false;
        };
        match &*object.borrow() {
            Object::Bool(value) => *value,
            Object::Number(value) => *value != 0,
            Object::String(value) => !value.is_empty(),
            Object::Class(_) | Object::Instance(_) => false,
        }
    }

    pub fn has_method(&self, method: &str, arity: usize) -> bool {
        self.with_instance(|instance| instance.has_method(method, arity))
            .unwrap_or(false)
    }

    /// Invokes a method on the instance behind this holder. The method runs
    /// in a fresh closure holding `self` (as a non-owning alias) and the
    /// positional arguments bound to the formal parameters.
    pub fn call_method(
        &self,
        method: &str,
        args: &[ObjectHolder],
        context: &mut Context<'_>,
    ) -> ExecResult {
        let class = self
            .with_instance(|instance| instance.class().clone())
            .ok_or_else(|| RuntimeError::MethodOnNonInstance {
                method: method.to_string(),
            })?;
        let found = class
            .method(method)
            .filter(|found| found.formal_params.len() == args.len())
            .ok_or_else(|| RuntimeError::UnknownMethod {
                class: class.name().to_string(),
                method: method.to_string(),
                arity: args.len(),
            })?;
        let mut closure = Closure::new();
        closure.insert(SELF_NAME.to_string(), self.share());
        for (param, value) in found.formal_params.iter().zip(args) {
            closure.insert(param.clone(), value.clone());
        }
        found.body.execute(&mut closure, context)
    }

    /// Renders the value the way `print` shows it. Instances defer to their
    /// `__str__/0` method when present and otherwise produce an identity
    /// token derived from their heap address.
    pub fn render(&self, context: &mut Context<'_>) -> ExecResult<String> {
        let Some(object) = self.object() else {
            return Ok("None".to_string());
        };
        let simple = match &*object.borrow() {
            Object::Number(value) => Some(value.to_string()),
            Object::String(value) => Some(value.clone()),
            Object::Bool(value) => Some(if *value { "True" } else { "False" }.to_string()),
            Object::Class(class) => Some(format!("Class {}", class.name())),
            Object::Instance(_) => Option::None,
        };
        if let Some(rendered) = simple {
            return Ok(rendered);
        }
        if self.has_method(STR_METHOD, 0) {
            let result = self.call_method(STR_METHOD, &[], context)?;
            return result.render(context);
        }
        let class_name = self
            .with_instance(|instance| instance.class().name().to_string())
            .unwrap_or_default();
        Ok(format!(
            "<{class_name} object at {:p}>",
            Rc::as_ptr(&object)
        ))
    }
}

impl fmt::Debug for ObjectHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHolder({})", self.type_name())
    }
}

/// Structural equality. Absent values are equal to each other, same-variant
/// primitives compare by value, and an instance delegates to its `__eq__/1`.
/// Everything else cannot be compared.
pub fn equal(lhs: &ObjectHolder, rhs: &ObjectHolder, context: &mut Context<'_>) -> ExecResult<bool> {
    if lhs.is_none() {
        if rhs.is_none() {
            return Ok(true);
        }
        return Err(RuntimeError::EqualityNotSupported.into());
    }
    if let Some(left) = lhs.as_bool() {
        return match rhs.as_bool() {
            Some(right) => Ok(left == right),
            Option::None => Err(RuntimeError::EqualityNotSupported.into()),
        };
    }
    if let Some(left) = lhs.as_number() {
        return match rhs.as_number() {
            Some(right) => Ok(left == right),
            Option::None => Err(RuntimeError::EqualityNotSupported.into()),
        };
    }
    if let Some(left) = lhs.as_string() {
        return match rhs.as_string() {
            Some(right) => Ok(left == right),
            Option::None => Err(RuntimeError::EqualityNotSupported.into()),
        };
    }
    if lhs.has_method(EQ_METHOD, 1) {
        let result = lhs.call_method(EQ_METHOD, &[rhs.clone()], context)?;
        return result
            .as_bool()
            .ok_or_else(|| {
                RuntimeError::ComparisonNotBool {
                    method: EQ_METHOD.to_string(),
                }
                .into()
            });
    }
    Err(RuntimeError::EqualityNotSupported.into())
}

/// Strict ordering. Primitives compare by value; an instance delegates to its
/// `__lt__/1`. The absent value cannot be ordered at all.
pub fn less(lhs: &ObjectHolder, rhs: &ObjectHolder, context: &mut Context<'_>) -> ExecResult<bool> {
    if lhs.is_none() {
        return Err(RuntimeError::OrderingNotSupported.into());
    }
    if let Some(left) = lhs.as_bool() {
        return match rhs.as_bool() {
            Some(right) => Ok(left < right),
            Option::None => Err(RuntimeError::OrderingNotSupported.into()),
        };
    }
    if let Some(left) = lhs.as_number() {
        return match rhs.as_number() {
            Some(right) => Ok(left < right),
            Option::None => Err(RuntimeError::OrderingNotSupported.into()),
        };
    }
    if let Some(left) = lhs.as_string() {
        return match rhs.as_string() {
            Some(right) => Ok(left < right),
            Option::None => Err(RuntimeError::OrderingNotSupported.into()),
        };
    }
    if lhs.has_method(LT_METHOD, 1) {
        let result = lhs.call_method(LT_METHOD, &[rhs.clone()], context)?;
        return result
            .as_bool()
            .ok_or_else(|| {
                RuntimeError::ComparisonNotBool {
                    method: LT_METHOD.to_string(),
                }
                .into()
            });
    }
    Err(RuntimeError::OrderingNotSupported.into())
}

pub fn not_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut Context<'_>,
) -> ExecResult<bool> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut Context<'_>,
) -> ExecResult<bool> {
    Ok(!less(lhs, rhs, context)? && !equal(lhs, rhs, context)?)
}

pub fn less_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut Context<'_>,
) -> ExecResult<bool> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut Context<'_>,
) -> ExecResult<bool> {
    Ok(!less(lhs, rhs, context)?)
}
