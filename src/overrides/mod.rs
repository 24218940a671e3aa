//! The array-function override protocol.
//!
//! A public entry point wraps an implementation together with an argument
//! selector. On every call the selector picks the arguments that may carry an
//! override; their handlers are then tried, most specific type first, until one
//! of them produces a result.

mod ndarray;
mod signature;
mod value;

pub use ndarray::{default_array_function, NdArray, NDARRAY};
pub use signature::{verify_signature_compatibility, Param, Signature};
pub use value::{Arguments, Value};

use crate::config::{config, Config};
use crate::error::{DispatchError, SignatureMismatchError};
use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Runtime type record of an argument. Types are statics and compare by address.
#[derive(Debug)]
pub struct ArgType {
    pub module: &'static str,
    pub name: &'static str,
    pub base: Option<&'static ArgType>,
}

impl ArgType {
    pub const fn new(module: &'static str, name: &'static str) -> ArgType {
        ArgType {
            module,
            name,
            base: None,
        }
    }

    pub const fn subclass(
        module: &'static str,
        name: &'static str,
        base: &'static ArgType,
    ) -> ArgType {
        ArgType {
            module,
            name,
            base: Some(base),
        }
    }

    /// True when `other` is this type or one of its ancestors.
    pub fn is_subclass_of(&self, other: &ArgType) -> bool {
        let mut current = Some(self);

        while let Some(ty) = current {
            if ptr::eq(ty, other) {
                return true;
            }
            current = ty.base;
        }

        false
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

impl PartialEq for ArgType {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for ArgType {}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Anything that can be passed to a public entry point as an object.
pub trait Argument: fmt::Debug + Send + Sync {
    fn arg_type(&self) -> &'static ArgType;

    /// The override handler of this argument's type, if it has one.
    fn as_handler(&self) -> Option<&dyn CustomHandler> {
        None
    }
}

pub enum HandlerResult {
    Produced(Value),
    Declined,
}

/// Everything a handler gets to see about the intercepted call.
pub struct OverrideCall<'a> {
    pub public_api: &'a PublicApi,
    pub types: &'a [&'static ArgType],
    pub args: &'a Arguments,
}

pub trait CustomHandler {
    fn handle(&self, call: &OverrideCall<'_>) -> anyhow::Result<HandlerResult>;

    /// Whether this is the library's own handler, which never counts as an override.
    fn is_library_default(&self) -> bool {
        false
    }
}

/// Types and arguments that take part in one dispatch.
#[derive(Debug, Default)]
pub struct Candidates {
    /// Every distinct type with a handler, in first-seen order.
    pub types: Vec<&'static ArgType>,
    /// Arguments to try, subclasses before their ancestors.
    pub args: Vec<Arc<dyn Argument>>,
}

pub fn collect_candidates(relevant_args: &[Value]) -> Candidates {
    let mut candidates = Candidates::default();

    for arg in relevant_args.iter().filter_map(Value::as_object) {
        let ty = arg.arg_type();

        if arg.as_handler().is_none() || candidates.types.iter().any(|t| ptr::eq(*t, ty)) {
            continue;
        }

        candidates.types.push(ty);

        let index = candidates
            .args
            .iter()
            .position(|old| ty.is_subclass_of(old.arg_type()))
            .unwrap_or(candidates.args.len());
        candidates.args.insert(index, Arc::clone(arg));
    }

    candidates
        .args
        .retain(|arg| arg.as_handler().map_or(false, |h| !h.is_library_default()));

    candidates
}

fn implementation_or_override(
    public_api: &PublicApi,
    relevant_args: &[Value],
    args: &Arguments,
) -> Result<Value, DispatchError> {
    let Candidates { types, args: overloaded } = collect_candidates(relevant_args);

    if overloaded.is_empty() {
        trace!(entry_point = %public_api.qualified_name(), "no overrides");
        return Ok((public_api.inner.implementation)(args)?);
    }

    debug!(
        entry_point = %public_api.qualified_name(),
        types = types.len(),
        candidates = overloaded.len(),
        "dispatching to overrides"
    );

    let call = OverrideCall {
        public_api,
        types: &types,
        args,
    };

    for arg in &overloaded {
        let Some(handler) = arg.as_handler() else {
            continue;
        };

        match handler.handle(&call)? {
            HandlerResult::Produced(value) => return Ok(value),
            HandlerResult::Declined => {
                debug!(declined_by = %arg.arg_type(), "override declined");
            }
        }
    }

    Err(DispatchError::Unimplemented {
        entry_point: public_api.qualified_name(),
        types: overloaded
            .iter()
            .map(|arg| arg.arg_type().qualified_name())
            .collect(),
    })
}

pub type Implementation = dyn Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync;
pub type Selector = dyn Fn(&Arguments) -> Vec<Value> + Send + Sync;

struct ApiInner {
    name: String,
    module: String,
    signature: Signature,
    implementation: Arc<Implementation>,
    selector: Arc<Selector>,
    config: Config,
}

/// A public entry point. Clones share identity.
#[derive(Clone)]
pub struct PublicApi {
    inner: Arc<ApiInner>,
}

impl PublicApi {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn module(&self) -> &str {
        &self.inner.module
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.inner.module, self.inner.name)
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// The wrapped implementation, bypassing dispatch.
    pub fn implementation(&self) -> &Implementation {
        &*self.inner.implementation
    }

    pub fn call(&self, args: Arguments) -> Result<Value, DispatchError> {
        if !self.inner.config.array_function_enabled {
            return Ok((self.inner.implementation)(&args)?);
        }

        let relevant_args = (self.inner.selector)(&args);
        implementation_or_override(self, &relevant_args, &args)
    }

    pub fn ptr_eq(&self, other: &PublicApi) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PublicApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicApi")
            .field("name", &self.qualified_name())
            .field("signature", &self.inner.signature)
            .finish_non_exhaustive()
    }
}

/// Builds public entry points that share one argument selector.
pub struct ArrayFunctionDispatch {
    selector_signature: Signature,
    selector: Arc<Selector>,
    module: Option<String>,
    verify: bool,
    config: Option<Config>,
}

impl ArrayFunctionDispatch {
    pub fn new(
        selector_signature: Signature,
        selector: impl Fn(&Arguments) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        ArrayFunctionDispatch {
            selector_signature,
            selector: Arc::new(selector),
            module: None,
            verify: true,
            config: None,
        }
    }

    pub fn module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Overrides the process-wide configuration for the entry points built here.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn wrap(
        &self,
        name: &str,
        signature: Signature,
        implementation: impl Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Result<PublicApi, SignatureMismatchError> {
        let module = self.module.as_deref().unwrap_or(env!("CARGO_PKG_NAME"));

        if self.verify {
            verify_signature_compatibility(
                &format!("{module}.{name}"),
                &signature,
                &self.selector_signature,
            )?;
        }

        Ok(PublicApi {
            inner: Arc::new(ApiInner {
                name: name.to_string(),
                module: module.to_string(),
                signature,
                implementation: Arc::new(implementation),
                selector: Arc::clone(&self.selector),
                config: self.config.unwrap_or_else(config),
            }),
        })
    }
}

/// Resolves qualified names back to the entry points registered under them.
#[derive(Debug, Default)]
pub struct Registry {
    apis: HashMap<String, PublicApi>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry point previously registered under the same name, if any.
    pub fn register(&mut self, api: &PublicApi) -> Option<PublicApi> {
        self.apis.insert(api.qualified_name(), api.clone())
    }

    pub fn resolve(&self, qualified_name: &str) -> Option<&PublicApi> {
        self.apis.get(qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BASE: ArgType = ArgType::new("tests", "Base");
    static DERIVED: ArgType = ArgType::subclass("tests", "Derived", &BASE);
    static PLAIN: ArgType = ArgType::new("tests", "Plain");

    #[derive(Debug)]
    struct Plain;

    impl Argument for Plain {
        fn arg_type(&self) -> &'static ArgType {
            &PLAIN
        }
    }

    #[derive(Debug)]
    struct Overriding {
        ty: &'static ArgType,
        answer: Option<i64>,
    }

    impl Argument for Overriding {
        fn arg_type(&self) -> &'static ArgType {
            self.ty
        }

        fn as_handler(&self) -> Option<&dyn CustomHandler> {
            Some(self)
        }
    }

    impl CustomHandler for Overriding {
        fn handle(&self, _call: &OverrideCall<'_>) -> anyhow::Result<HandlerResult> {
            Ok(match self.answer {
                Some(n) => HandlerResult::Produced(Value::Int(n)),
                None => HandlerResult::Declined,
            })
        }
    }

    fn overriding(ty: &'static ArgType, answer: Option<i64>) -> Value {
        Value::object(Overriding { ty, answer })
    }

    fn names(candidates: &Candidates) -> Vec<&'static str> {
        candidates.args.iter().map(|a| a.arg_type().name).collect()
    }

    #[test]
    fn subclass_relation() {
        assert!(DERIVED.is_subclass_of(&BASE));
        assert!(BASE.is_subclass_of(&BASE));
        assert!(!BASE.is_subclass_of(&DERIVED));
        assert!(!PLAIN.is_subclass_of(&BASE));
    }

    #[test]
    fn subclasses_come_first_in_either_order() {
        let base = overriding(&BASE, None);
        let derived = overriding(&DERIVED, None);

        let forward = collect_candidates(&[base.clone(), derived.clone()]);
        let backward = collect_candidates(&[derived, base]);

        assert_eq!(names(&forward), ["Derived", "Base"]);
        assert_eq!(names(&backward), ["Derived", "Base"]);
        assert_eq!(forward.types, [&BASE, &DERIVED]);
    }

    #[test]
    fn plain_values_and_repeats_are_skipped() {
        let base = overriding(&BASE, None);
        let candidates = collect_candidates(&[
            Value::Int(3),
            Value::object(Plain),
            base.clone(),
            overriding(&BASE, Some(1)),
        ]);

        assert_eq!(names(&candidates), ["Base"]);
        assert!(candidates.args[0].arg_type().is_subclass_of(&BASE));
        assert_eq!(Value::Object(Arc::clone(&candidates.args[0])), base);
    }

    #[test]
    fn first_produced_result_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let api = ArrayFunctionDispatch::new(Signature::new().varargs("args"), |args| {
            args.positional.clone()
        })
        .config(Config::default())
        .wrap("probe", Signature::new().varargs("args"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::None)
        })
        .unwrap();

        let result = api
            .call(Arguments::new(vec![
                overriding(&BASE, Some(1)),
                overriding(&DERIVED, Some(2)),
            ]))
            .unwrap();

        assert_eq!(result, Value::Int(2));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
