use serde::Serialize;
use serde_json::Value;

use crate::constants::ENGINE_VERSION;
use crate::hashing::hash_value;

/// Insumos del fingerprint de un step. NO es el fingerprint final (string
/// hash) sino el modelo previo a canonicalizar.
///
/// `inputs` conserva el orden declarado del step: reordenar inputs es un
/// cambio de definición.
#[derive(Serialize)]
pub struct StepFingerprintInput<'a> {
    pub engine_version: &'a str,
    pub step: &'a str,
    pub params: &'a Value,
    pub inputs: &'a [(String, String)],
    pub outputs: &'a [String],
}

impl<'a> StepFingerprintInput<'a> {
    pub fn new(step: &'a str, params: &'a Value, inputs: &'a [(String, String)], outputs: &'a [String]) -> Self {
        Self { engine_version: ENGINE_VERSION,
               step,
               params,
               inputs,
               outputs }
    }

    pub fn fingerprint(&self) -> String {
        // Serialize de esta struct no puede fallar: sólo strings y Values.
        let v = serde_json::to_value(self).unwrap_or(Value::Null);
        hash_value(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_changes_with_input_version() {
        let params = json!({"threshold": 3});
        let outputs = vec!["y".to_string()];
        let a = [("x".to_string(), "v1".to_string())];
        let b = [("x".to_string(), "v2".to_string())];
        let fa = StepFingerprintInput::new("s", &params, &a, &outputs).fingerprint();
        let fb = StepFingerprintInput::new("s", &params, &b, &outputs).fingerprint();
        assert_ne!(fa, fb);
        assert_eq!(fa, StepFingerprintInput::new("s", &params, &a, &outputs).fingerprint());
        assert_eq!(fa.len(), 64);
    }
}
