//! Pipeline de ejemplo: prepara un dataset de ventas para un servicio
//! consumidor.
//!
//! `raw_records` (externo) -> ingest -> clean -> aggregate -> package
//!
//! `package` emite un manifest con checksum sha256 del dataset empaquetado,
//! fecha de construcción y versión de pipeflow.

use std::collections::BTreeMap;

use chrono::Utc;
use pipeflow_core::hashing::to_canonical_json;
use pipeflow_core::{ArtifactStore, GraphError, Pipeline, RunContext, Step, StepExecutionError, StepInputs, StepLogic,
                    StepOutputs, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const PIPELINE_ID: &str = "demo-dataset";
pub const RAW_INPUT: &str = "raw_records";
pub const MANIFEST: &str = "manifest";
/// Versión de pipeflow estampada en cada manifest.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoOptions {
    /// Nombre publicado en el manifest.
    pub dataset: String,
    /// Filas con `amount` menor se descartan en `clean`.
    pub min_amount: f64,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self { dataset: "sales".into(),
               min_amount: 0.0 }
    }
}

/// Datos crudos incluidos, con algunas filas inválidas a propósito.
pub fn sample_records() -> Value {
    json!([
        { "id": 1, "region": "north", "amount": 120.5 },
        { "id": 2, "region": "south", "amount": 80.0 },
        { "id": 3, "region": "north", "amount": 42.25 },
        { "id": 4, "region": "", "amount": 10.0 },
        { "id": 5, "region": "east", "amount": "n/a" },
        { "id": 6, "region": "south", "amount": -5.0 },
        { "id": 7, "region": "east", "amount": 63.0 }
    ])
}

/// Guarda `sample_records()` como input externo si todavía no existe.
pub fn seed_sample<A: ArtifactStore + ?Sized>(store: &A) -> Result<bool, StoreError> {
    if store.exists(RAW_INPUT) {
        return Ok(false);
    }
    store.put(RAW_INPUT, sample_records())?;
    Ok(true)
}

pub fn build_pipeline(options: &DemoOptions) -> Result<Pipeline, GraphError> {
    let mut pipeline = Pipeline::new(PIPELINE_ID).external_input(RAW_INPUT);
    pipeline.add_step(Step::new("ingest", ingest).inputs([RAW_INPUT]).outputs(["records"]))?;
    pipeline.add_step(Step::new("clean", Clean { min_amount: options.min_amount }).inputs(["records"])
                                                                                  .outputs(["clean_records"]))?;
    pipeline.add_step(Step::new("aggregate", aggregate).inputs(["clean_records"]).outputs(["totals"]))?;
    pipeline.add_step(Step::new("package", Package { dataset: options.dataset.clone() }).inputs(["clean_records",
                                                                                                 "totals"])
                                                                                        .outputs([MANIFEST]))?;
    Ok(pipeline)
}

fn ingest(inputs: &StepInputs, ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
    let raw = inputs.require(RAW_INPUT)?;
    let rows = raw.as_array()
                  .ok_or_else(|| StepExecutionError::new(format!("'{RAW_INPUT}' must be a JSON array")))?;
    let records: Vec<Value> = rows.iter().filter(|r| r.is_object()).cloned().collect();
    if records.len() != rows.len() {
        ctx.warn(&format!("{} non-object rows ignored", rows.len() - records.len()));
    }
    ctx.info(&format!("{} records ingested", records.len()));
    Ok(StepOutputs::new().with("records", Value::Array(records)))
}

struct Clean {
    min_amount: f64,
}

impl StepLogic for Clean {
    fn run(&self, inputs: &StepInputs, ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
        let records = inputs.require("records")?.as_array().cloned().unwrap_or_default();
        let total = records.len();
        let clean: Vec<Value> = records.into_iter()
                                       .filter(|r| {
                                           let region_ok = r.get("region")
                                                            .and_then(Value::as_str)
                                                            .is_some_and(|s| !s.trim().is_empty());
                                           let amount_ok = r.get("amount")
                                                            .and_then(Value::as_f64)
                                                            .is_some_and(|a| a >= self.min_amount);
                                           region_ok && amount_ok
                                       })
                                       .collect();
        ctx.info(&format!("{} of {} records kept", clean.len(), total));
        Ok(StepOutputs::new().with("clean_records", Value::Array(clean)))
    }

    fn params(&self) -> Value {
        json!({ "min_amount": self.min_amount })
    }
}

fn aggregate(inputs: &StepInputs, _ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
    let mut totals: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for row in inputs.require("clean_records")?.as_array().into_iter().flatten() {
        let (Some(region), Some(amount)) = (row.get("region").and_then(Value::as_str),
                                            row.get("amount").and_then(Value::as_f64))
        else {
            continue;
        };
        let slot = totals.entry(region.to_string()).or_default();
        slot.0 += amount;
        slot.1 += 1;
    }
    let by_region: serde_json::Map<String, Value> =
        totals.into_iter()
              .map(|(region, (sum, count))| (region, json!({ "total": sum, "count": count })))
              .collect();
    Ok(StepOutputs::new().with("totals", Value::Object(by_region)))
}

struct Package {
    dataset: String,
}

impl StepLogic for Package {
    fn run(&self, inputs: &StepInputs, ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
        let records = inputs.require("clean_records")?;
        let totals = inputs.require("totals")?;
        let payload = json!({ "records": records, "totals": totals });
        let checksum = dataset_checksum(&payload);
        let rows = records.as_array().map(Vec::len).unwrap_or(0);
        ctx.info(&format!("dataset '{}' packaged: {rows} rows sha256={checksum}", self.dataset));
        Ok(StepOutputs::new().with(MANIFEST,
                                   json!({
                                       "dataset": self.dataset,
                                       "pipeline": PIPELINE_ID,
                                       "tool_version": TOOL_VERSION,
                                       "rows": rows,
                                       "totals": totals,
                                       "sha256": checksum,
                                       "built_at": Utc::now().to_rfc3339(),
                                       "run_id": ctx.run_id().to_string(),
                                   })))
    }

    fn params(&self) -> Value {
        // La versión forma parte de los params: un binario nuevo re-estampa el manifest.
        json!({ "dataset": self.dataset, "tool_version": TOOL_VERSION })
    }
}

/// sha256 (hex) del JSON canónico del dataset.
pub fn dataset_checksum(payload: &Value) -> String {
    format!("{:x}", Sha256::digest(to_canonical_json(payload).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_core::{Engine, FailurePolicy, FingerprintCache, RunStatus};

    #[test]
    fn demo_pipeline_orders_steps() {
        let graph = build_pipeline(&DemoOptions::default()).expect("pipeline")
                                                           .graph()
                                                           .expect("graph");
        assert_eq!(graph.order_names(), vec!["ingest", "clean", "aggregate", "package"]);
    }

    #[test]
    fn sample_run_filters_invalid_rows() {
        let mut engine = Engine::in_memory();
        assert!(seed_sample(engine.artifacts()).expect("seed"));
        assert!(!seed_sample(engine.artifacts()).expect("seed again"));
        let pipeline = build_pipeline(&DemoOptions::default()).expect("pipeline");
        let outcome = pipeline.run(&mut engine, &FingerprintCache, FailurePolicy::FailFast).expect("run");
        assert_eq!(outcome.status, RunStatus::AllSucceeded);

        let totals = engine.artifacts().get("totals").expect("totals").content;
        assert_eq!(totals["north"]["count"], json!(2));
        assert_eq!(totals["south"]["count"], json!(1));
        assert!(totals.get("").is_none());
        let manifest = engine.artifacts().get(MANIFEST).expect("manifest").content;
        assert_eq!(manifest["rows"], json!(4));
        assert_eq!(manifest["sha256"].as_str().map(str::len), Some(64));
        assert_eq!(manifest["tool_version"], json!(TOOL_VERSION));
        assert_eq!(manifest["pipeline"], json!(PIPELINE_ID));
    }

    #[test]
    fn checksum_ignores_key_order() {
        assert_eq!(dataset_checksum(&json!({"a": 1, "b": [1, 2]})),
                   dataset_checksum(&json!({"b": [1, 2], "a": 1})));
    }
}
