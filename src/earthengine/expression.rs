//! Earth Engine expression graphs.
//!
//! A [`Node`] tree is the declarative request. [`Expression::new`] flattens it
//! into the `{"result": .., "values": {..}}` document expected by
//! `value:compute`, hoisting function bodies into the `values` table since
//! `functionDefinitionValue.body` can only refer to them by name.
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Constant(Value),
    Invocation {
        function: String,
        arguments: BTreeMap<String, Node>,
    },
    ArgumentReference(String),
    Function {
        arguments: Vec<String>,
        body: Box<Node>,
    },
    Array(Vec<Node>),
}

impl Node {
    pub fn constant<V: Into<Value>>(value: V) -> Self {
        Self::Constant(value.into())
    }

    pub fn invoke<'a, I>(function: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Node)>,
    {
        Self::Invocation {
            function: function.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        }
    }

    pub fn argument(name: &str) -> Self {
        Self::ArgumentReference(name.to_string())
    }

    /// Single argument function whose body is built from a reference to that argument.
    pub fn lambda<F>(argument: &str, body: F) -> Self
    where
        F: FnOnce(Node) -> Node,
    {
        Self::Function {
            arguments: vec![argument.to_string()],
            body: Box::new(body(Self::argument(argument))),
        }
    }

    pub fn strings<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Array(
            values
                .iter()
                .map(|v| Self::constant(v.as_ref()))
                .collect(),
        )
    }

    pub fn function_name(&self) -> Option<&str> {
        match self {
            Self::Invocation { function, .. } => Some(function),
            _ => None,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&Node> {
        match self {
            Self::Invocation { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }

    fn encode(&self, values: &mut Map<String, Value>) -> Value {
        match self {
            Self::Constant(value) => json!({ "constantValue": value }),
            Self::Invocation {
                function,
                arguments,
            } => {
                let arguments: Map<String, Value> = arguments
                    .iter()
                    .map(|(name, node)| (name.clone(), node.encode(values)))
                    .collect();
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": arguments,
                    }
                })
            }
            Self::ArgumentReference(name) => json!({ "argumentReference": name }),
            Self::Function { arguments, body } => {
                let encoded = body.encode(values);
                let id = values.len().to_string();
                values.insert(id.clone(), encoded);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": arguments,
                        "body": id,
                    }
                })
            }
            Self::Array(items) => {
                let items: Vec<Value> = items.iter().map(|n| n.encode(values)).collect();
                json!({ "arrayValue": { "values": items } })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Expression {
    result: String,
    values: Map<String, Value>,
}

impl Expression {
    pub fn new(root: &Node) -> Self {
        let mut values = Map::new();
        let encoded = root.encode(&mut values);
        let result = values.len().to_string();
        values.insert(result.clone(), encoded);
        Self { result, values }
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn value(&self, id: &str) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
