use super::{ArgType, Argument, CustomHandler, HandlerResult, OverrideCall, Value};
use crate::descriptor::Descriptor;
use crate::util::prod;

pub static NDARRAY: ArgType = ArgType::new("fieldwise", "ndarray");

/// The library's own array type. Its handler only runs the implementation
/// when every participating type is an `ndarray`.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    pub dtype: Descriptor,
    pub shape: Vec<usize>,
}

impl NdArray {
    pub fn new(dtype: Descriptor, shape: Vec<usize>) -> Self {
        NdArray { dtype, shape }
    }

    pub fn len(&self) -> usize {
        prod(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype.itemsize()
    }
}

impl Argument for NdArray {
    fn arg_type(&self) -> &'static ArgType {
        &NDARRAY
    }

    fn as_handler(&self) -> Option<&dyn CustomHandler> {
        Some(self)
    }
}

impl CustomHandler for NdArray {
    fn handle(&self, call: &OverrideCall<'_>) -> anyhow::Result<HandlerResult> {
        default_array_function(call)
    }

    fn is_library_default(&self) -> bool {
        true
    }
}

/// The default handling: run the implementation if every type is an
/// `ndarray` or a subclass of it, decline otherwise. Subclass handlers call
/// this to defer to the library.
pub fn default_array_function(call: &OverrideCall<'_>) -> anyhow::Result<HandlerResult> {
    if !call.types.iter().all(|ty| ty.is_subclass_of(&NDARRAY)) {
        return Ok(HandlerResult::Declined);
    }

    let value: Value = (call.public_api.implementation())(call.args)?;
    Ok(HandlerResult::Produced(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::overrides::{collect_candidates, Arguments, ArrayFunctionDispatch, Signature};

    static OTHER: ArgType = ArgType::new("tests", "Other");

    fn array() -> Value {
        Value::object(NdArray::new(Descriptor::parse("<i4").unwrap(), vec![2, 3]))
    }

    #[test]
    fn sizes() {
        let a = NdArray::new(Descriptor::parse("<i4,<f8").unwrap(), vec![2, 3]);
        assert_eq!(a.len(), 6);
        assert_eq!(a.nbytes(), 72);
        assert!(!a.is_empty());
    }

    #[test]
    fn ndarray_type_is_listed_but_never_tried() {
        let candidates = collect_candidates(&[array()]);

        assert_eq!(candidates.types, [&NDARRAY]);
        assert!(candidates.args.is_empty());
    }

    #[test]
    fn default_handler_declines_foreign_types() {
        let api = ArrayFunctionDispatch::new(Signature::new().required("a"), |_| Vec::new())
            .config(Config::default())
            .wrap("ident", Signature::new().required("a"), |_| Ok(Value::Int(7)))
            .unwrap();
        let args = Arguments::new(vec![array()]);

        let own = OverrideCall {
            public_api: &api,
            types: &[&NDARRAY],
            args: &args,
        };
        assert!(matches!(
            default_array_function(&own).unwrap(),
            HandlerResult::Produced(Value::Int(7))
        ));

        let mixed = OverrideCall {
            public_api: &api,
            types: &[&NDARRAY, &OTHER],
            args: &args,
        };
        assert!(matches!(
            default_array_function(&mixed).unwrap(),
            HandlerResult::Declined
        ));
    }
}
