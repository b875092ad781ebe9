// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    The user state contract.

    A [`StateClass`] is what a user-authored state class distils to once
    the dynamic-language surface is gone: a zero-arg data constructor,
    computed properties (getters/setters) addressed by path, named
    methods for event handlers, and the three lifecycle callbacks. All
    user code receives a [`StateAccessor`](crate::state::StateAccessor)
    as its `this`.
*/

use crate::errors::StructiveError;
use crate::state::StateAccessor;
use crate::value::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::rc::Rc;

/// A computed property read.
pub type GetterFn = Rc<dyn Fn(&StateAccessor) -> Result<Value, StructiveError>>;
/// A computed property write.
pub type SetterFn = Rc<dyn Fn(&StateAccessor, Value) -> Result<(), StructiveError>>;
/// A named method (event handlers, helpers).
pub type MethodFn = Rc<dyn Fn(&StateAccessor, &[Value]) -> Result<Value, StructiveError>>;
/// A `$connectedCallback`/`$disconnectedCallback` body.
pub type LifecycleFn = Rc<dyn Fn(&StateAccessor) -> Result<(), StructiveError>>;
/// An `$updatedCallback` body: written paths plus index vectors by path.
pub type UpdatedFn = Rc<
    dyn Fn(&StateAccessor, &[SmolStr], &HashMap<SmolStr, Vec<Vec<usize>>>) -> Result<(), StructiveError>,
>;

/// The distilled state class of one component kind.
pub struct StateClass {
    name: SmolStr,
    init: Rc<dyn Fn() -> Value>,
    getters: HashMap<SmolStr, GetterFn>,
    setters: HashMap<SmolStr, SetterFn>,
    methods: HashMap<SmolStr, MethodFn>,
    connected: Option<LifecycleFn>,
    disconnected: Option<LifecycleFn>,
    updated: Option<UpdatedFn>,
}

impl StateClass {
    /// Start building a class.
    pub fn builder(name: impl Into<SmolStr>) -> StateClassBuilder {
        StateClassBuilder {
            class: StateClass {
                name: name.into(),
                init: Rc::new(|| Value::object([])),
                getters: HashMap::new(),
                setters: HashMap::new(),
                methods: HashMap::new(),
                connected: None,
                disconnected: None,
                updated: None,
            },
        }
    }

    /// The class name, for diagnostics.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Construct a fresh state object.
    pub fn instantiate(&self) -> Value {
        (self.init)()
    }

    /// The getter declared for `path`, if any.
    pub fn getter(&self, path: &str) -> Option<GetterFn> {
        self.getters.get(path).cloned()
    }

    /// The setter declared for `path`, if any.
    pub fn setter(&self, path: &str) -> Option<SetterFn> {
        self.setters.get(path).cloned()
    }

    /// The method registered under `name`, if any.
    pub fn method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    /// Iterate the declared getter paths.
    pub fn getter_paths(&self) -> impl Iterator<Item = &SmolStr> {
        self.getters.keys()
    }

    /// Iterate the declared setter paths.
    pub fn setter_paths(&self) -> impl Iterator<Item = &SmolStr> {
        self.setters.keys()
    }

    /// Iterate the method names.
    pub fn method_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.methods.keys()
    }

    /// The `$connectedCallback`, if declared.
    pub fn connected_callback(&self) -> Option<LifecycleFn> {
        self.connected.clone()
    }

    /// The `$disconnectedCallback`, if declared.
    pub fn disconnected_callback(&self) -> Option<LifecycleFn> {
        self.disconnected.clone()
    }

    /// The `$updatedCallback`, if declared.
    pub fn updated_callback(&self) -> Option<UpdatedFn> {
        self.updated.clone()
    }
}

impl core::fmt::Debug for StateClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "StateClass({})", self.name)
    }
}

/// Builder for [`StateClass`].
pub struct StateClassBuilder {
    class: StateClass,
}

impl StateClassBuilder {
    /// Set the zero-arg data constructor.
    #[must_use]
    pub fn data(mut self, init: impl Fn() -> Value + 'static) -> Self {
        self.class.init = Rc::new(init);
        self
    }

    /// Declare a getter for `path`.
    #[must_use]
    pub fn getter(
        mut self,
        path: impl Into<SmolStr>,
        body: impl Fn(&StateAccessor) -> Result<Value, StructiveError> + 'static,
    ) -> Self {
        self.class.getters.insert(path.into(), Rc::new(body));
        self
    }

    /// Declare a setter for `path`.
    #[must_use]
    pub fn setter(
        mut self,
        path: impl Into<SmolStr>,
        body: impl Fn(&StateAccessor, Value) -> Result<(), StructiveError> + 'static,
    ) -> Self {
        self.class.setters.insert(path.into(), Rc::new(body));
        self
    }

    /// Declare a method.
    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<SmolStr>,
        body: impl Fn(&StateAccessor, &[Value]) -> Result<Value, StructiveError> + 'static,
    ) -> Self {
        self.class.methods.insert(name.into(), Rc::new(body));
        self
    }

    /// Declare the `$connectedCallback`.
    #[must_use]
    pub fn on_connected(
        mut self,
        body: impl Fn(&StateAccessor) -> Result<(), StructiveError> + 'static,
    ) -> Self {
        self.class.connected = Some(Rc::new(body));
        self
    }

    /// Declare the `$disconnectedCallback`.
    #[must_use]
    pub fn on_disconnected(
        mut self,
        body: impl Fn(&StateAccessor) -> Result<(), StructiveError> + 'static,
    ) -> Self {
        self.class.disconnected = Some(Rc::new(body));
        self
    }

    /// Declare the `$updatedCallback`.
    #[must_use]
    pub fn on_updated(
        mut self,
        body: impl Fn(&StateAccessor, &[SmolStr], &HashMap<SmolStr, Vec<Vec<usize>>>) -> Result<(), StructiveError>
        + 'static,
    ) -> Self {
        self.class.updated = Some(Rc::new(body));
        self
    }

    /// Finish the class.
    pub fn build(self) -> Rc<StateClass> {
        Rc::new(self.class)
    }
}
