//! Modules: the unit of registration.
//!
//! A module groups properties and states under one name. Adding a state
//! to a module fixes the state's module qualifier; the state is moved in,
//! so it can never be adopted twice.
//!
//! ```
//! use ripple_core::{ActionContext, Module, Outcome, Property, State};
//!
//! let out = Property::new("rawio", "out").default_value("");
//! let module = Module::new("echo")
//!     .depends_on("rawio")
//!     .state(
//!         State::builder("repeat")
//!             .read("rawio:in")
//!             .write(&out)
//!             .action(|ctx: ActionContext| async move {
//!                 let text = ctx.get("rawio:in")?;
//!                 ctx.set("rawio:out", text)?;
//!                 Outcome::done()
//!             }),
//!     );
//! assert_eq!(module.states()[0].qualified_name(), "echo:repeat");
//! ```

use crate::property::Property;
use crate::state::State;

#[derive(Debug)]
pub struct Module {
    name: String,
    depends: Vec<String>,
    properties: Vec<Property>,
    states: Vec<State>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends: Vec::new(),
            properties: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Require `module` to be registered before this one.
    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        let module = module.into();
        if !self.depends.contains(&module) {
            self.depends.push(module);
        }
        self
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn state(mut self, mut state: State) -> Self {
        state.adopt(&self.name);
        self.states.push(state);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>, Vec<Property>, Vec<State>) {
        (self.name, self.depends, self.properties, self.states)
    }
}
