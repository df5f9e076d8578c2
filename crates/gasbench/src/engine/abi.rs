//! String argument coercion and calldata encoding.

use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, JsonAbi, Param};
use alloy_primitives::Bytes;

use crate::{CallSpec, CompiledArtifact, EngineError, FunctionCallError};

/// Label used for constructor arguments in errors.
pub(crate) const CONSTRUCTOR: &str = "constructor";

/// Find the overload of `call.function` taking as many parameters as arguments were supplied.
pub fn resolve_function<'a>(
    abi: &'a JsonAbi,
    call: &CallSpec,
) -> Result<&'a Function, FunctionCallError> {
    let overloads = abi
        .function(&call.function)
        .ok_or_else(|| FunctionCallError::UnknownFunction { function: call.function.clone() })?;
    overloads.iter().find(|function| function.inputs.len() == call.args.len()).ok_or_else(|| {
        FunctionCallError::ArityMismatch {
            function: call.function.clone(),
            expected: overloads.iter().map(|function| function.inputs.len()).collect(),
            got: call.args.len(),
        }
    })
}

/// Coerce string arguments to the types of `params`.
pub fn coerce_args(
    function: &str,
    params: &[Param],
    args: &[String],
) -> Result<Vec<DynSolValue>, FunctionCallError> {
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, arg))| {
            let invalid = |reason: String| FunctionCallError::InvalidArgument {
                function: function.to_string(),
                index,
                reason,
            };
            let ty: DynSolType = param.resolve().map_err(|err| invalid(err.to_string()))?;
            ty.coerce_str(arg).map_err(|err| invalid(format!("expected {ty}: {err}")))
        })
        .collect()
}

/// Selector plus ABI encoded arguments of a call.
pub fn encode_call<'a>(
    abi: &'a JsonAbi,
    call: &CallSpec,
) -> Result<(&'a Function, Bytes), FunctionCallError> {
    let function = resolve_function(abi, call)?;
    let values = coerce_args(&call.function, &function.inputs, &call.args)?;
    let calldata =
        function.abi_encode_input(&values).map_err(|err| FunctionCallError::InvalidArgument {
            function: call.function.clone(),
            index: 0,
            reason: err.to_string(),
        })?;
    Ok((function, calldata.into()))
}

/// Creation bytecode followed by the ABI encoded constructor arguments.
///
/// Fails without touching any fork when the bytecode is empty or the arguments do not match the
/// constructor.
pub fn encode_deployment(
    artifact: &CompiledArtifact,
    args: &[String],
) -> Result<Bytes, EngineError> {
    if artifact.bytecode.is_empty() {
        return Err(EngineError::InvalidArtifact(format!(
            "{} has empty bytecode",
            artifact.contract_name
        )));
    }
    let params =
        artifact.abi.constructor.as_ref().map(|ctor| ctor.inputs.as_slice()).unwrap_or_default();
    if params.len() != args.len() {
        return Err(EngineError::InvalidArtifact(format!(
            "constructor takes {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    let Some(constructor) = &artifact.abi.constructor else {
        return Ok(artifact.bytecode.clone());
    };
    let values = coerce_args(CONSTRUCTOR, params, args)
        .map_err(|err| EngineError::InvalidArtifact(err.to_string()))?;
    let encoded =
        constructor.abi_encode_input(&values).map_err(|err| EngineError::Abi(err.to_string()))?;
    let mut initcode = artifact.bytecode.to_vec();
    initcode.extend_from_slice(&encoded);
    Ok(initcode.into())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;

    fn abi() -> JsonAbi {
        JsonAbi::parse([
            "constructor(uint256 supply)",
            "function transfer(address to, uint256 amount) returns (bool)",
            "function mint(uint256 amount)",
            "function mint(address to, uint256 amount)",
        ])
        .unwrap()
    }

    #[test]
    fn test_overload_resolved_by_arity() {
        let abi = abi();
        let call = CallSpec::new("mint", ["0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "5"]);
        let (function, calldata) = encode_call(&abi, &call).unwrap();
        assert_eq!(function.signature(), "mint(address,uint256)");
        assert_eq!(&calldata[..4], function.selector().as_slice());
        assert_eq!(calldata.len(), 4 + 64);
    }

    #[test]
    fn test_call_errors() {
        let abi = abi();
        assert!(matches!(
            encode_call(&abi, &CallSpec::new("burn", ["1"])),
            Err(FunctionCallError::UnknownFunction { .. })
        ));
        assert!(matches!(
            encode_call(&abi, &CallSpec::new("mint", Vec::<String>::new())),
            Err(FunctionCallError::ArityMismatch { expected, got: 0, .. }) if expected == [1, 2]
        ));
        assert!(matches!(
            encode_call(&abi, &CallSpec::new("transfer", ["not-an-address", "1"])),
            Err(FunctionCallError::InvalidArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_deployment_appends_constructor_args() {
        let artifact = CompiledArtifact::new(
            "Token",
            Bytes::from_static(&[0x60, 0x80]),
            abi(),
            "0.8.24",
            Default::default(),
        );
        let initcode = encode_deployment(&artifact, &["1000".to_string()]).unwrap();
        assert_eq!(initcode.len(), 2 + 32);
        assert_eq!(U256::from_be_slice(&initcode[2..]), U256::from(1000));

        assert!(matches!(encode_deployment(&artifact, &[]), Err(EngineError::InvalidArtifact(_))));
    }

    #[test]
    fn test_empty_bytecode_rejected() {
        let abi = JsonAbi::default();
        let artifact = CompiledArtifact::new("Empty", Bytes::new(), abi, "", Default::default());
        assert!(matches!(encode_deployment(&artifact, &[]), Err(EngineError::InvalidArtifact(_))));
    }
}
