//! Run state sobre Postgres (Diesel + r2d2).
//!
//! - `run_records`: snapshot del `RunRecord` por pipeline (JSONB), reemplazado
//!   con upsert dentro de la misma transacción que valida la transición.
//! - `run_step_events`: log append-only con una fila por transición aplicada,
//!   ordenado por `seq` (BIGSERIAL).
//!
//! Cada `update` es una transacción `SELECT ... FOR UPDATE` + apply + upsert +
//! insert del evento: un lector nunca observa un step a medio escribir.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use pipeflow_core::{RunHeader, RunRecord, RunStateError, RunStateStore, StepUpdate};

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{run_records, run_step_events};

/// Pool r2d2 de conexiones Postgres. Al construirlo se corren las
/// migraciones pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_records)]
struct NewRecordRow<'a> {
    pipeline_id: &'a str,
    record: &'a Value,
    invocation: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_step_events)]
struct NewStepEventRow<'a> {
    pipeline_id: &'a str,
    run_id: Option<Uuid>,
    step: &'a str,
    status: &'a str,
    payload: &'a Value,
}

/// Fila de `run_step_events` para lecturas.
#[derive(Queryable, Debug, Clone)]
pub struct StepEventRow {
    pub seq: i64,
    pub pipeline_id: String,
    pub run_id: Option<Uuid>,
    pub step: String,
    pub status: String,
    pub payload: Value,
    pub ts: DateTime<Utc>,
}

/// Errores que conviene reintentar con backoff.
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access")
            || m.contains("connection closed")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry con backoff lineal corto (hasta 3 reintentos: 15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn decode(pipeline_id: &str, raw: Value) -> Result<RunRecord, PersistenceError> {
    let record: RunRecord =
        serde_json::from_value(raw).map_err(|e| PersistenceError::Corruption { path: format!("run_records/{pipeline_id}"),
                                                                               reason: e.to_string() })?;
    record.validate(pipeline_id)?;
    Ok(record)
}

fn select_for_update(conn: &mut PgConnection, pipeline_id: &str) -> Result<RunRecord, PersistenceError> {
    let raw: Option<Value> = run_records::table.filter(run_records::pipeline_id.eq(pipeline_id))
                                               .select(run_records::record)
                                               .for_update()
                                               .first(conn)
                                               .optional()?;
    match raw {
        Some(raw) => decode(pipeline_id, raw),
        None => Ok(RunRecord::empty(pipeline_id)),
    }
}

fn upsert(conn: &mut PgConnection, record: &RunRecord) -> Result<(), PersistenceError> {
    let value = serde_json::to_value(record)?;
    let row = NewRecordRow { pipeline_id: &record.pipeline_id,
                             record: &value,
                             invocation: record.invocation as i64,
                             updated_at: record.updated_at.unwrap_or_else(Utc::now) };
    diesel::insert_into(run_records::table).values(&row)
                                           .on_conflict(run_records::pipeline_id)
                                           .do_update()
                                           .set((run_records::record.eq(&value),
                                                 run_records::invocation.eq(row.invocation),
                                                 run_records::updated_at.eq(row.updated_at)))
                                           .execute(conn)?;
    Ok(())
}

pub struct PgRunStateStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgRunStateStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Transiciones registradas para `pipeline_id`, ordenadas por `seq`.
    pub fn list_events(&self, pipeline_id: &str) -> Result<Vec<StepEventRow>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            run_step_events::table.filter(run_step_events::pipeline_id.eq(pipeline_id))
                                  .order(run_step_events::seq.asc())
                                  .load(&mut conn)
                                  .map_err(PersistenceError::from)
        })
    }
}

impl PgRunStateStore<PoolProvider> {
    /// Carga `.env`, lee `DbConfig` y construye un store sobre un pool migrado.
    pub fn from_env() -> Result<Self, PersistenceError> {
        let cfg = DbConfig::from_env()?;
        let pool = build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)?;
        Ok(Self::new(PoolProvider { pool }))
    }
}

impl<P: ConnectionProvider> RunStateStore for PgRunStateStore<P> {
    fn load(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError> {
        let raw: Option<Value> = with_retry(|| {
                                     let mut conn = self.provider.connection()?;
                                     run_records::table.filter(run_records::pipeline_id.eq(pipeline_id))
                                                       .select(run_records::record)
                                                       .first(&mut conn)
                                                       .optional()
                                                       .map_err(PersistenceError::from)
                                 }).map_err(|e| e.into_run_state(pipeline_id))?;
        match raw {
            Some(raw) => decode(pipeline_id, raw).map_err(|e| e.into_run_state(pipeline_id)),
            None => Ok(RunRecord::empty(pipeline_id)),
        }
    }

    fn begin(&mut self, pipeline_id: &str, header: RunHeader) -> Result<RunRecord, RunStateError> {
        let record = with_retry(|| {
                         let mut conn = self.provider.connection()?;
                         conn.build_transaction()
                             .read_write()
                             .run(|tx| -> Result<RunRecord, PersistenceError> {
                                 let mut record = select_for_update(tx, pipeline_id)?;
                                 record.begin(&header);
                                 upsert(tx, &record)?;
                                 Ok(record)
                             })
                     }).map_err(|e| e.into_run_state(pipeline_id))?;
        debug!("begin pipeline={pipeline_id} invocation={}", record.invocation);
        Ok(record)
    }

    fn update(&mut self, pipeline_id: &str, update: StepUpdate) -> Result<(), RunStateError> {
        let payload = serde_json::to_value(&update).map_err(|e| RunStateError::Backend(e.to_string()))?;
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<(), PersistenceError> {
                    let mut record = select_for_update(tx, pipeline_id)?;
                    record.apply(&update)?;
                    upsert(tx, &record)?;
                    diesel::insert_into(run_step_events::table).values(NewStepEventRow { pipeline_id,
                                                                                         run_id: record.run_id,
                                                                                         step: &update.step,
                                                                                         status: update.status.label(),
                                                                                         payload: &payload })
                                                               .execute(tx)?;
                    Ok(())
                })
        }).map_err(|e| e.into_run_state(pipeline_id))?;
        debug!("update pipeline={pipeline_id} step={} status={}", update.step, update.status.label());
        Ok(())
    }

    fn discard(&mut self, pipeline_id: &str) -> Result<(), RunStateError> {
        // El log de eventos se conserva como auditoría.
        let deleted = with_retry(|| {
                          let mut conn = self.provider.connection()?;
                          diesel::delete(run_records::table.filter(run_records::pipeline_id.eq(pipeline_id)))
                              .execute(&mut conn)
                              .map_err(PersistenceError::from)
                      }).map_err(|e| e.into_run_state(pipeline_id))?;
        warn!("run record discarded pipeline={pipeline_id} rows={deleted}");
        Ok(())
    }
}

/// Construye un pool r2d2 y corre las migraciones pendientes.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1).min(max);
    if min_size > max_size {
        warn!("min_size > max_size ({min_size} > {max_size}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}
