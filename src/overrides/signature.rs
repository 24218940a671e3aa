use super::Value;
use crate::error::SignatureMismatchError;

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// The parameter shape of an implementation or of its argument selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub varargs: Option<String>,
    pub varkw: Option<String>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: Some(default.into()),
        });
        self
    }

    pub fn varargs(mut self, name: &str) -> Self {
        self.varargs = Some(name.to_string());
        self
    }

    pub fn varkw(mut self, name: &str) -> Self {
        self.varkw = Some(name.to_string());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.params
            .iter()
            .filter_map(|p| p.default.as_ref().map(|d| (p.name.as_str(), d)))
    }
}

/// Checks that an argument selector takes exactly the parameters of the
/// implementation it guards, and that every selector default is `None`.
pub fn verify_signature_compatibility(
    entry_point: &str,
    implementation: &Signature,
    selector: &Signature,
) -> Result<(), SignatureMismatchError> {
    let mismatch = |detail: String| SignatureMismatchError::Shape {
        entry_point: entry_point.to_string(),
        detail,
    };

    let impl_names: Vec<&str> = implementation.names().collect();
    let selector_names: Vec<&str> = selector.names().collect();
    if impl_names != selector_names {
        return Err(mismatch(format!(
            "parameters {impl_names:?} != {selector_names:?}"
        )));
    }

    if implementation.varargs != selector.varargs {
        return Err(mismatch(format!(
            "*args {:?} != {:?}",
            implementation.varargs, selector.varargs
        )));
    }

    if implementation.varkw != selector.varkw {
        return Err(mismatch(format!(
            "**kwargs {:?} != {:?}",
            implementation.varkw, selector.varkw
        )));
    }

    let optional = |sig: &Signature| -> Vec<bool> {
        sig.params.iter().map(|p| p.default.is_some()).collect()
    };
    if let Some(param) = implementation
        .params
        .iter()
        .zip(&selector.params)
        .find(|(a, b)| a.default.is_some() != b.default.is_some())
        .map(|(a, _)| a)
    {
        return Err(mismatch(format!(
            "'{}' has a default on one side only (optional {:?} != {:?})",
            param.name,
            optional(implementation),
            optional(selector)
        )));
    }

    if let Some((name, _)) = selector.defaults().find(|(_, value)| !value.is_none()) {
        return Err(SignatureMismatchError::NonNeutralDefault {
            entry_point: entry_point.to_string(),
            parameter: name.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concatenate() -> Signature {
        Signature::new()
            .required("arrays")
            .optional("axis", 0i64)
            .optional("out", Value::None)
    }

    fn selector() -> Signature {
        Signature::new()
            .required("arrays")
            .optional("axis", Value::None)
            .optional("out", Value::None)
    }

    #[test]
    fn matching_signatures() {
        assert_eq!(
            verify_signature_compatibility("concatenate", &concatenate(), &selector()),
            Ok(())
        );
    }

    #[test]
    fn parameter_lists_must_agree() {
        let short = Signature::new().required("arrays").optional("axis", Value::None);
        let err = verify_signature_compatibility("concatenate", &concatenate(), &short).unwrap_err();
        assert!(matches!(err, SignatureMismatchError::Shape { .. }));

        let varargs = selector().varargs("more");
        let err = verify_signature_compatibility("concatenate", &concatenate(), &varargs).unwrap_err();
        assert!(matches!(err, SignatureMismatchError::Shape { .. }));

        let required = Signature::new()
            .required("arrays")
            .required("axis")
            .optional("out", Value::None);
        let err = verify_signature_compatibility("concatenate", &concatenate(), &required).unwrap_err();
        assert!(matches!(err, SignatureMismatchError::Shape { .. }));

        // Same number of defaults, on different parameters.
        let implementation = Signature::new().required("a").optional("b", Value::None);
        let swapped = Signature::new().optional("a", Value::None).required("b");
        let err = verify_signature_compatibility("take", &implementation, &swapped).unwrap_err();
        assert!(matches!(
            err,
            SignatureMismatchError::Shape { ref detail, .. } if detail.starts_with("'a'")
        ));
    }

    #[test]
    fn selector_defaults_must_be_none() {
        let eager = Signature::new()
            .required("arrays")
            .optional("axis", 0i64)
            .optional("out", Value::None);

        assert_eq!(
            verify_signature_compatibility("concatenate", &concatenate(), &eager),
            Err(SignatureMismatchError::NonNeutralDefault {
                entry_point: "concatenate".into(),
                parameter: "axis".into(),
            })
        );
    }
}
