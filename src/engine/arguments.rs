// src/engine/arguments.rs

//! Turning dependency results into call arguments.

use crate::value::{Args, Value};

/// Assemble the arguments for a node from its dependencies' results.
///
/// `dependencies` yields, in declaration order, each dependency's
/// `output_names` together with the value it produced:
/// - names + tuple result: names are zipped with the elements as keywords
/// - names + any other result: the first name is bound to the whole value
/// - no names + tuple result: elements are appended as positionals
/// - no names + any other result: the value is appended as one positional
pub fn assemble<'a, I>(dependencies: I) -> Args
where
    I: IntoIterator<Item = (&'a [String], &'a Value)>,
{
    let mut args = Args::new();
    for (names, value) in dependencies {
        match (names.first(), value) {
            (None, value) => value.flatten_into(&mut args.positional),
            (Some(_), Value::Tuple(items)) => {
                for (name, item) in names.iter().zip(items) {
                    args.keyword.insert(name.clone(), item.clone());
                }
            }
            (Some(first), value) => {
                args.keyword.insert(first.clone(), value.clone());
            }
        }
    }
    args
}

/// Dependency results flattened into one positional list, as handed to
/// `post_call`.
pub fn flatten<'a, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut out = Vec::new();
    for value in values {
        value.flatten_into(&mut out);
    }
    out
}
