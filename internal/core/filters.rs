// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Filter resolution.

    The built-in filter catalogue lives outside the core; what the engine
    owns is the contract: named filter factories, resolution errors and
    chain application. A few small filters the engine's own tests lean on
    are registered by default.
*/

use crate::errors::{ErrorCode, StructiveError};
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An instantiated filter.
pub type FilterFn = Rc<dyn Fn(&Value) -> Result<Value, StructiveError>>;

/// A factory producing a filter from its option list.
pub type FilterFactory = Rc<dyn Fn(&[SmolStr]) -> Result<FilterFn, StructiveError>>;

/// A parsed `name,opt,opt…` filter reference from a bind text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSpec {
    /// The filter name.
    pub name: SmolStr,
    /// The comma separated options.
    pub options: Vec<SmolStr>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<SmolStr, FilterFactory>> = RefCell::new(builtin_filters());
}

fn bad_options(name: &str, detail: &str) -> StructiveError {
    StructiveError::new(ErrorCode::FilterBadOptions, format!("filter `{name}`: {detail}"))
        .with_context("where", "resolve_filter")
}

fn builtin_filters() -> HashMap<SmolStr, FilterFactory> {
    let mut registry: HashMap<SmolStr, FilterFactory> = HashMap::new();
    registry.insert(
        SmolStr::new_static("not"),
        Rc::new(|options| {
            if !options.is_empty() {
                return Err(bad_options("not", "takes no options"));
            }
            Ok(Rc::new(|value: &Value| Ok(Value::Bool(!value.is_truthy()))) as FilterFn)
        }),
    );
    registry.insert(
        SmolStr::new_static("eq"),
        Rc::new(|options: &[SmolStr]| {
            let [expected] = options else {
                return Err(bad_options("eq", "takes exactly one option"));
            };
            let expected = expected.clone();
            Ok(Rc::new(move |value: &Value| Ok(Value::Bool(value.to_text() == expected))) as FilterFn)
        }),
    );
    registry.insert(
        SmolStr::new_static("inc"),
        Rc::new(|options: &[SmolStr]| {
            let [amount] = options else {
                return Err(bad_options("inc", "takes exactly one option"));
            };
            let amount: f64 =
                amount.parse().map_err(|_| bad_options("inc", "option must be a number"))?;
            Ok(Rc::new(move |value: &Value| {
                let n = value.as_f64().ok_or_else(|| {
                    StructiveError::new(ErrorCode::BindContract, "inc filter needs a number")
                })?;
                Ok(Value::Number(n + amount))
            }) as FilterFn)
        }),
    );
    registry
}

/// Register (or replace) a named filter factory.
pub fn register_filter(name: impl Into<SmolStr>, factory: FilterFactory) {
    REGISTRY.with(|r| r.borrow_mut().insert(name.into(), factory));
}

/// Instantiate one filter reference. Unknown names raise FLT-201, option
/// validation failures FLT-202.
pub fn resolve_filter(spec: &FilterSpec) -> Result<FilterFn, StructiveError> {
    let factory = REGISTRY.with(|r| r.borrow().get(&spec.name).cloned()).ok_or_else(|| {
        StructiveError::new(ErrorCode::FilterNotFound, format!("unknown filter `{}`", spec.name))
            .with_context("where", "resolve_filter")
            .with_context("filter", spec.name.clone())
    })?;
    factory(&spec.options)
}

/// Instantiate a whole chain, left to right.
pub fn resolve_filters(specs: &[FilterSpec]) -> Result<Vec<FilterFn>, StructiveError> {
    specs.iter().map(resolve_filter).collect()
}

/// Run a value through an instantiated chain.
pub fn apply_filters(value: Value, filters: &[FilterFn]) -> Result<Value, StructiveError> {
    let mut current = value;
    for filter in filters {
        current = filter(&current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_application() {
        let specs = vec![
            FilterSpec { name: SmolStr::new("inc"), options: vec![SmolStr::new("2")] },
            FilterSpec { name: SmolStr::new("eq"), options: vec![SmolStr::new("5")] },
        ];
        let chain = resolve_filters(&specs).unwrap();
        assert_eq!(apply_filters(Value::from(3.0), &chain).unwrap(), Value::Bool(true));
        assert_eq!(apply_filters(Value::from(4.0), &chain).unwrap(), Value::Bool(false));
    }

    #[test]
    fn resolution_errors() {
        let unknown = FilterSpec { name: SmolStr::new("nope"), options: vec![] };
        match resolve_filter(&unknown) {
            Err(e) => assert_eq!(e.code(), ErrorCode::FilterNotFound),
            Ok(_) => panic!("expected error"),
        }

        let bad = FilterSpec { name: SmolStr::new("eq"), options: vec![] };
        match resolve_filter(&bad) {
            Err(e) => assert_eq!(e.code(), ErrorCode::FilterBadOptions),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn custom_registration_wins() {
        register_filter(
            "shout",
            Rc::new(|_options| {
                Ok(Rc::new(|v: &Value| Ok(Value::from(v.to_text().to_uppercase().as_str())))
                    as FilterFn)
            }),
        );
        let spec = FilterSpec { name: SmolStr::new("shout"), options: vec![] };
        let filter = resolve_filter(&spec).unwrap();
        assert_eq!(filter(&Value::from("hey")).unwrap(), Value::from("HEY"));
    }
}
