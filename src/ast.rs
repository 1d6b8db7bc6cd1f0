//! AST node set and its evaluation semantics.
//!
//! Every node evaluates to an [`ObjectHolder`] through [`Executable`],
//! threading a closure (name bindings) and a [`Context`] (host output sink).
//! `return` transfers control by raising the tagged [`ExecError::Return`]
//! signal; the returned value travels through the closure under `"return"`
//! and the signal is caught only by `MethodBody`.

use crate::runtime::{
    self, Class, ClassInstance, Closure, Context, ExecError, ExecResult, Executable, Object,
    ObjectHolder, RuntimeError,
};

const ADD_METHOD: &str = "__add__";
const INIT_METHOD: &str = "__init__";
const RETURN_KEY: &str = "return";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mult,
    Div,
}

impl ArithmeticOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mult => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

/// A read of a possibly dotted variable path: the first identifier resolves
/// in the closure, every further one descends into instance fields.
///
/// Writes never take a dotted target as a whole; `FieldAssignment` splits off
/// the final field and keeps the rest as a `VariableValue` read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    name: String,
    fields: Vec<String>,
}

impl VariableValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn dotted(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn resolve(&self, closure: &Closure) -> Result<ObjectHolder, RuntimeError> {
        let mut result =
            closure
                .get(&self.name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: self.name.clone(),
                })?;
        let mut owner = self.name.as_str();
        for field in &self.fields {
            result = result
                .with_instance(|instance| instance.fields().get(field).cloned())
                .ok_or_else(|| RuntimeError::NotAnInstance {
                    name: owner.to_string(),
                })?
                .ok_or_else(|| RuntimeError::UndefinedField {
                    field: field.clone(),
                })?;
            owner = field;
        }
        Ok(result)
    }

    /// Turns this read path into the matching write statement: a plain name
    /// becomes an `Assignment`, a dotted path a `FieldAssignment` on its
    /// last segment.
    pub fn into_assignment(mut self, value: Statement) -> Statement {
        match self.fields.pop() {
            Some(field_name) => Statement::FieldAssignment {
                object: self,
                field_name,
                value: Box::new(value),
            },
            Option::None => Statement::Assignment {
                name: self.name,
                value: Box::new(value),
            },
        }
    }
}

#[derive(Debug)]
pub enum Statement {
    Number(i64),
    String(String),
    Bool(bool),
    None,
    Variable(VariableValue),
    Assignment {
        name: String,
        value: Box<Statement>,
    },
    FieldAssignment {
        object: VariableValue,
        field_name: String,
        value: Box<Statement>,
    },
    Print {
        args: Vec<Statement>,
    },
    MethodCall {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    NewInstance {
        class: Class,
        args: Vec<Statement>,
    },
    Stringify {
        argument: Box<Statement>,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    And {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Or {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Not {
        argument: Box<Statement>,
    },
    Compound(Vec<Statement>),
    IfElse {
        condition: Box<Statement>,
        if_body: Box<Statement>,
        else_body: Option<Box<Statement>>,
    },
    ClassDefinition {
        class: Class,
    },
    Return {
        value: Box<Statement>,
    },
    /// Wrapper around a method's body; the only catch point for the return
    /// signal.
    MethodBody {
        body: Box<Statement>,
    },
}

impl Executable for Statement {
    fn execute(&self, closure: &mut Closure, context: &mut Context<'_>) -> ExecResult {
        match self {
            Statement::Number(value) => Ok(ObjectHolder::own(Object::Number(*value))),
            Statement::String(value) => Ok(ObjectHolder::own(Object::String(value.clone()))),
            Statement::Bool(value) => Ok(ObjectHolder::own(Object::Bool(*value))),
            Statement::None => Ok(ObjectHolder::none()),
            Statement::Variable(variable) => Ok(variable.resolve(closure)?),
            Statement::Assignment { name, value } => {
                let value = value.execute(closure, context)?;
                closure.insert(name.clone(), value.clone());
                Ok(value)
            }
            Statement::FieldAssignment {
                object,
                field_name,
                value,
            } => exec_field_assignment(object, field_name, value, closure, context),
            Statement::Print { args } => exec_print(args, closure, context),
            Statement::MethodCall {
                object,
                method,
                args,
            } => exec_method_call(object, method, args, closure, context),
            Statement::NewInstance { class, args } => {
                exec_new_instance(class, args, closure, context)
            }
            Statement::Stringify { argument } => {
                let value = argument.execute(closure, context)?;
                Ok(ObjectHolder::own(Object::String(value.render(context)?)))
            }
            Statement::Arithmetic { op, lhs, rhs } => {
                exec_arithmetic(*op, lhs, rhs, closure, context)
            }
            Statement::Comparison { op, lhs, rhs } => {
                exec_comparison(*op, lhs, rhs, closure, context)
            }
            Statement::And { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let flag = left
                    .as_bool()
                    .ok_or(RuntimeError::ExpectedBool {
                        place: "'and' operand",
                    })?;
                if !flag {
                    return Ok(left);
                }
                let right = rhs.execute(closure, context)?;
                right.as_bool().ok_or(RuntimeError::ExpectedBool {
                    place: "'and' operand",
                })?;
                Ok(right)
            }
            Statement::Or { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let flag = left
                    .as_bool()
                    .ok_or(RuntimeError::ExpectedBool {
                        place: "'or' operand",
                    })?;
                if flag {
                    return Ok(left);
                }
                let right = rhs.execute(closure, context)?;
                right.as_bool().ok_or(RuntimeError::ExpectedBool {
                    place: "'or' operand",
                })?;
                Ok(right)
            }
            Statement::Not { argument } => {
                let value = argument.execute(closure, context)?;
                let flag = value.as_bool().ok_or(RuntimeError::ExpectedBool {
                    place: "'not' operand",
                })?;
                Ok(ObjectHolder::own(Object::Bool(!flag)))
            }
            Statement::Compound(statements) => {
                for statement in statements {
                    statement.execute(closure, context)?;
                }
                Ok(ObjectHolder::none())
            }
            Statement::IfElse {
                condition,
                if_body,
                else_body,
            } => {
                let condition = condition.execute(closure, context)?;
                let flag = condition.as_bool().ok_or(RuntimeError::ExpectedBool {
                    place: "if condition",
                })?;
                if flag {
                    if_body.execute(closure, context)
                } else if let Some(else_body) = else_body {
                    else_body.execute(closure, context)
                } else {
                    Ok(ObjectHolder::none())
                }
            }
            Statement::ClassDefinition { class } => {
                let holder = ObjectHolder::own(Object::Class(class.clone()));
                closure.insert(class.name().to_string(), holder.clone());
                Ok(holder)
            }
            Statement::Return { value } => {
                let value = value.execute(closure, context)?;
                closure.insert(RETURN_KEY.to_string(), value);
                Err(ExecError::Return)
            }
            Statement::MethodBody { body } => match body.execute(closure, context) {
                Ok(_) => Ok(ObjectHolder::none()),
                Err(ExecError::Return) => {
                    Ok(closure.get(RETURN_KEY).cloned().unwrap_or_default())
                }
                Err(error) => Err(error),
            },
        }
    }
}

fn exec_field_assignment(
    object: &VariableValue,
    field_name: &str,
    value: &Statement,
    closure: &mut Closure,
    context: &mut Context<'_>,
) -> ExecResult {
    let receiver = object.resolve(closure)?;
    // The receiver is validated before the right-hand side runs.
    if !receiver.is_instance() {
        return Err(RuntimeError::FieldOnNonInstance {
            field: field_name.to_string(),
        }
        .into());
    }
    let value = value.execute(closure, context)?;
    receiver
        .with_instance_mut(|instance| {
            instance
                .fields_mut()
                .insert(field_name.to_string(), value.clone());
        })
        .ok_or_else(|| RuntimeError::FieldOnNonInstance {
            field: field_name.to_string(),
        })?;
    Ok(value)
}

fn exec_print(args: &[Statement], closure: &mut Closure, context: &mut Context<'_>) -> ExecResult {
    let mut line = String::new();
    for (index, arg) in args.iter().enumerate() {
        let value = arg.execute(closure, context)?;
        let rendered = value.render(context)?;
        if index > 0 {
            line.push(' ');
        }
        line.push_str(&rendered);
    }
    line.push('\n');
    context.write(line.as_bytes())?;
    Ok(ObjectHolder::none())
}

fn exec_method_call(
    object: &Statement,
    method: &str,
    args: &[Statement],
    closure: &mut Closure,
    context: &mut Context<'_>,
) -> ExecResult {
    let receiver = object.execute(closure, context)?;
    let class_name = receiver
        .with_instance(|instance| instance.class().name().to_string())
        .ok_or_else(|| RuntimeError::MethodOnNonInstance {
            method: method.to_string(),
        })?;
    if !receiver.has_method(method, args.len()) {
        return Err(RuntimeError::UnknownMethod {
            class: class_name,
            method: method.to_string(),
            arity: args.len(),
        }
        .into());
    }
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(arg.execute(closure, context)?);
    }
    receiver.call_method(method, &values, context)
}

fn exec_new_instance(
    class: &Class,
    args: &[Statement],
    closure: &mut Closure,
    context: &mut Context<'_>,
) -> ExecResult {
    let instance = ObjectHolder::own(Object::Instance(ClassInstance::new(class.clone())));
    // Arguments are only evaluated when a matching __init__ exists; with no
    // initializer of this arity the instance comes back untouched.
    if instance.has_method(INIT_METHOD, args.len()) {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(arg.execute(closure, context)?);
        }
        instance.call_method(INIT_METHOD, &values, context)?;
    }
    Ok(instance)
}

fn exec_arithmetic(
    op: ArithmeticOp,
    lhs: &Statement,
    rhs: &Statement,
    closure: &mut Closure,
    context: &mut Context<'_>,
) -> ExecResult {
    let lhs = lhs.execute(closure, context)?;
    let rhs = rhs.execute(closure, context)?;
    if let (Some(left), Some(right)) = (lhs.as_number(), rhs.as_number()) {
        let value = match op {
            ArithmeticOp::Add => left.wrapping_add(right),
            ArithmeticOp::Sub => left.wrapping_sub(right),
            ArithmeticOp::Mult => left.wrapping_mul(right),
            ArithmeticOp::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero.into());
                }
                left.wrapping_div(right)
            }
        };
        return Ok(ObjectHolder::own(Object::Number(value)));
    }
    if op == ArithmeticOp::Add {
        if let (Some(left), Some(right)) = (lhs.as_string(), rhs.as_string()) {
            return Ok(ObjectHolder::own(Object::String(left + &right)));
        }
        if lhs.has_method(ADD_METHOD, 1) {
            return lhs.call_method(ADD_METHOD, &[rhs], context);
        }
    }
    Err(RuntimeError::InvalidOperands {
        operation: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
    .into())
}

fn exec_comparison(
    op: ComparisonOp,
    lhs: &Statement,
    rhs: &Statement,
    closure: &mut Closure,
    context: &mut Context<'_>,
) -> ExecResult {
    let lhs = lhs.execute(closure, context)?;
    let rhs = rhs.execute(closure, context)?;
    let result = match op {
        ComparisonOp::Equal => runtime::equal(&lhs, &rhs, context)?,
        ComparisonOp::NotEqual => runtime::not_equal(&lhs, &rhs, context)?,
        ComparisonOp::Less => runtime::less(&lhs, &rhs, context)?,
        ComparisonOp::Greater => runtime::greater(&lhs, &rhs, context)?,
        ComparisonOp::LessOrEqual => runtime::less_or_equal(&lhs, &rhs, context)?,
        ComparisonOp::GreaterOrEqual => runtime::greater_or_equal(&lhs, &rhs, context)?,
    };
    Ok(ObjectHolder::own(Object::Bool(result)))
}
