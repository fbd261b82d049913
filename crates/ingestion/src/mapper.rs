//! Mapper: decoded record trees → typed columnar buffers
//!
//! Each record kind has a schema of field paths. Mapping one decoded chunk
//! yields one [`RecordBuffer`] per known kind, always carrying the system
//! columns `rec_num` and `tod` (plus `sensor_id` when the kind maps one).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use columnar::{DataKind, RecordBuffer};
use contracts::{columns, Chunk, ContractError, DecodedChunk, RecordKindConfig, RunConfig};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::metrics::MapperMetrics;
use crate::path::FieldPath;

#[derive(Debug, Clone)]
struct ColumnSpec {
    path: FieldPath,
    column: String,
    kind: DataKind,
}

/// Compiled mapping schema of one record kind
#[derive(Debug, Clone)]
pub struct KindSchema {
    name: String,
    tod: FieldPath,
    sensor: Option<FieldPath>,
    columns: Vec<ColumnSpec>,
}

impl KindSchema {
    /// Compile a configured schema, parsing every field path
    pub fn compile(config: &RecordKindConfig) -> Result<Self, ContractError> {
        let parse = |field: &str, path: &str| -> Result<FieldPath, ContractError> {
            path.parse().map_err(|message: String| {
                ContractError::config_validation(
                    format!("record_kinds[{}].{field}", config.name),
                    message,
                )
            })
        };

        Ok(Self {
            name: config.name.clone(),
            tod: parse("tod_path", &config.tod_path)?,
            sensor: config
                .sensor_path
                .as_deref()
                .map(|path| parse("sensor_path", path))
                .transpose()?,
            columns: config
                .columns
                .iter()
                .map(|mapping| {
                    Ok(ColumnSpec {
                        path: parse(&format!("columns[{}]", mapping.column), &mapping.path)?,
                        column: mapping.column.clone(),
                        kind: mapping.kind,
                    })
                })
                .collect::<Result<_, ContractError>>()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn empty_buffer(&self, strict: bool) -> Result<RecordBuffer, columnar::BufferError> {
        let mut buffer = RecordBuffer::new();
        buffer.set_strict(strict);
        buffer.add_column(columns::REC_NUM, DataKind::U64)?;
        buffer.add_column(columns::TOD, DataKind::F64)?;
        if self.sensor.is_some() {
            buffer.add_column(columns::SENSOR_ID, DataKind::Text)?;
        }
        for spec in &self.columns {
            buffer.add_column(spec.column.clone(), spec.kind)?;
        }
        Ok(buffer)
    }
}

/// Maps decoded chunks into typed buffers.
///
/// Shared between concurrent map jobs; record keys are reserved up front by
/// the caller so they follow source order.
#[derive(Debug)]
pub struct Mapper {
    schemas: HashMap<String, KindSchema>,
    next_rec_num: AtomicU64,
    strict: bool,
    metrics: Arc<MapperMetrics>,
}

impl Mapper {
    pub fn new(schemas: Vec<KindSchema>, strict: bool) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|schema| (schema.name.clone(), schema))
                .collect(),
            next_rec_num: AtomicU64::new(0),
            strict,
            metrics: Arc::new(MapperMetrics::new()),
        }
    }

    /// Compile every record kind of a run configuration.
    ///
    /// Live records are stamped with their sensor by the decoder, so live
    /// kinds without a `sensor_path` read it from `sensor_id`.
    pub fn from_config(config: &RunConfig) -> Result<Self, ContractError> {
        let live = config.is_live();
        let schemas = config
            .record_kinds
            .iter()
            .map(|kind| {
                if live && kind.sensor_path.is_none() {
                    let mut kind = kind.clone();
                    kind.sensor_path = Some(columns::SENSOR_ID.to_string());
                    KindSchema::compile(&kind)
                } else {
                    KindSchema::compile(kind)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(schemas, config.strict_buffers()))
    }

    pub fn metrics(&self) -> Arc<MapperMetrics> {
        self.metrics.clone()
    }

    /// Reserve `count` consecutive record keys and return the first
    pub fn reserve(&self, count: usize) -> u64 {
        self.next_rec_num.fetch_add(count as u64, Ordering::Relaxed)
    }

    /// Map one decoded chunk.
    ///
    /// `rec_base` is the first key returned by [`reserve`](Self::reserve) for
    /// this chunk's record count.
    #[instrument(
        name = "mapper_map",
        skip(self, decoded),
        fields(records = decoded.record_count())
    )]
    pub fn map(&self, decoded: DecodedChunk, seq: u64, rec_base: u64) -> Chunk {
        let mut chunk = Chunk::new(seq, decoded.is_last);
        let mut rec_num = rec_base;

        for tagged in decoded.trees {
            let records = match tagged.tree {
                Value::Array(records) => records,
                other => {
                    warn!(kind = %tagged.kind, tree = %other, "record tree is not an array, skipped");
                    continue;
                }
            };
            let first = rec_num;
            rec_num += records.len() as u64;

            let Some(schema) = self.schemas.get(&tagged.kind) else {
                debug!(kind = %tagged.kind, records = records.len(), "no schema for record kind");
                MapperMetrics::add(&self.metrics.unknown_kind_records, records.len());
                continue;
            };

            let Some(mut buffer) = self.map_kind(schema, &records, first) else {
                continue;
            };
            buffer.set_last_chunk(decoded.is_last);

            match chunk.buffers.get_mut(&tagged.kind) {
                Some(existing) => {
                    if let Err(e) = existing.merge(&mut buffer) {
                        error!(kind = %tagged.kind, error = %e, "cannot merge record trees");
                    }
                }
                None => {
                    chunk.buffers.insert(tagged.kind, buffer);
                }
            }
        }

        chunk
    }

    fn map_kind(&self, schema: &KindSchema, records: &[Value], first: u64) -> Option<RecordBuffer> {
        let mut buffer = match schema.empty_buffer(self.strict) {
            Ok(buffer) => buffer,
            Err(e) => {
                error!(kind = %schema.name, error = %e, "invalid schema, buffer dropped");
                MapperMetrics::add(&self.metrics.buffers_dropped, 1);
                return None;
            }
        };
        if records.is_empty() {
            return Some(buffer);
        }

        let rows = buffer.push_rows(records.len());
        let mut failed = 0usize;
        {
            let mut rec_nums = buffer.column::<u64>(columns::REC_NUM);
            for row in rows.clone() {
                rec_nums.set(row, first + row as u64);
            }
        }

        for (row, record) in rows.zip(records) {
            let mut put = |column: &str, path: &FieldPath| {
                if let Some(value) = path.resolve_value(record) {
                    // Columns were declared above; a missing one is a schema bug
                    match buffer.set_json(column, row, value) {
                        Ok(true) => {}
                        Ok(false) => {
                            failed += 1;
                            debug!(
                                kind = %schema.name,
                                column,
                                value = %value,
                                "value not representable, stored null"
                            );
                        }
                        Err(e) => error!(kind = %schema.name, error = %e, "mapping failed"),
                    }
                }
            };
            put(columns::TOD, &schema.tod);
            if let Some(sensor) = &schema.sensor {
                put(columns::SENSOR_ID, sensor);
            }
            for spec in &schema.columns {
                put(&spec.column, &spec.path);
            }
        }
        MapperMetrics::add(&self.metrics.conversion_failures, failed);

        let tod = buffer.column_ref::<f64>(columns::TOD);
        let null_rows: BTreeSet<usize> = (0..buffer.row_count())
            .filter(|row| tod.is_null(*row))
            .collect();

        if null_rows.len() == buffer.row_count() {
            error!(
                kind = %schema.name,
                path = %schema.tod,
                rows = buffer.row_count(),
                "time-of-day column missing, buffer dropped"
            );
            MapperMetrics::add(&self.metrics.buffers_dropped, 1);
            return None;
        }
        if !null_rows.is_empty() {
            warn!(
                kind = %schema.name,
                removed = null_rows.len(),
                "records without time-of-day removed"
            );
            MapperMetrics::add(&self.metrics.null_tod_rows, null_rows.len());
            buffer.remove_rows(&null_rows);
        }

        MapperMetrics::add(&self.metrics.rows_mapped, buffer.row_count());
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ColumnMapping, TaggedTree};
    use serde_json::json;

    fn plot_schema() -> KindSchema {
        KindSchema::compile(&RecordKindConfig {
            name: "plot".into(),
            tod_path: "time.tod".into(),
            sensor_path: Some("sensor_id".into()),
            columns: vec![
                ColumnMapping {
                    path: "polar.0".into(),
                    column: "range_m".into(),
                    kind: DataKind::F64,
                },
                ColumnMapping {
                    path: "mode3a".into(),
                    column: "mode3a".into(),
                    kind: DataKind::U16,
                },
            ],
        })
        .unwrap()
    }

    fn decoded(kind: &str, records: Vec<Value>, is_last: bool) -> DecodedChunk {
        DecodedChunk {
            trees: vec![TaggedTree::new(kind, records)],
            is_last,
        }
    }

    #[test]
    fn test_map_writes_system_and_mapped_columns() {
        let mapper = Mapper::new(vec![plot_schema()], true);
        let input = decoded(
            "plot",
            vec![
                json!({"time": {"tod": 10.5}, "sensor_id": "psr_north", "polar": [1200.0, 45.0], "mode3a": 1234}),
                json!({"time": {"tod": 11.0}, "sensor_id": "psr_north", "mode3a": 70000}),
            ],
            true,
        );
        let base = mapper.reserve(input.record_count());
        let chunk = mapper.map(input, 7, base);

        assert_eq!(chunk.seq, 7);
        assert!(chunk.is_last);
        let plots = &chunk.buffers["plot"];
        assert!(plots.is_last_chunk());
        assert_eq!(plots.row_count(), 2);
        assert_eq!(plots.column_ref::<u64>("rec_num").get(1), Some(&1));
        assert_eq!(plots.column_ref::<f64>("tod").get(0), Some(&10.5));
        assert_eq!(
            plots.column_ref::<String>("sensor_id").get(0).map(String::as_str),
            Some("psr_north")
        );
        assert_eq!(plots.column_ref::<f64>("range_m").get(0), Some(&1200.0));
        assert!(plots.column_ref::<f64>("range_m").is_null(1));
        // 70000 does not fit u16
        assert!(plots.column_ref::<u16>("mode3a").is_null(1));
        assert_eq!(mapper.metrics().snapshot().conversion_failures, 1);
    }

    #[test]
    fn test_rec_num_unique_across_chunks() {
        let mapper = Mapper::new(vec![plot_schema()], true);
        let record = json!({"time": {"tod": 1.0}});
        let a = decoded("plot", vec![record.clone(), record.clone()], false);
        let b = decoded("plot", vec![record.clone()], false);

        let base_a = mapper.reserve(a.record_count());
        let base_b = mapper.reserve(b.record_count());
        // Jobs may run out of order
        let chunk_b = mapper.map(b, 1, base_b);
        let chunk_a = mapper.map(a, 0, base_a);

        let keys: Vec<u64> = [&chunk_a, &chunk_b]
            .iter()
            .flat_map(|c| {
                c.buffers["plot"]
                    .column_ref::<u64>("rec_num")
                    .iter()
                    .map(|v| *v.unwrap())
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(keys, vec![0, 1, 2]);
    }

    #[test]
    fn test_null_tod_rows_removed() {
        let mapper = Mapper::new(vec![plot_schema()], true);
        let input = decoded(
            "plot",
            vec![
                json!({"time": {"tod": 1.0}}),
                json!({"time": {}}),
                json!({"time": {"tod": null}}),
                json!({"time": {"tod": 4.0}}),
            ],
            false,
        );
        let chunk = mapper.map(input, 0, 0);
        let plots = &chunk.buffers["plot"];
        assert_eq!(plots.row_count(), 2);
        let keys: Vec<_> = plots
            .column_ref::<u64>("rec_num")
            .iter()
            .map(|v| *v.unwrap())
            .collect();
        assert_eq!(keys, vec![0, 3]);
        assert_eq!(mapper.metrics().snapshot().null_tod_rows, 2);
    }

    #[test]
    fn test_missing_tod_drops_kind_only() {
        let track = KindSchema::compile(&RecordKindConfig {
            name: "track".into(),
            tod_path: "tod".into(),
            sensor_path: None,
            columns: Vec::new(),
        })
        .unwrap();
        let mapper = Mapper::new(vec![plot_schema(), track], true);
        let input = DecodedChunk {
            trees: vec![
                TaggedTree::new("plot", vec![json!({"no_time": 1})]),
                TaggedTree::new("track", vec![json!({"tod": 5.0})]),
            ],
            is_last: false,
        };
        let chunk = mapper.map(input, 0, 0);
        assert!(!chunk.buffers.contains_key("plot"));
        assert_eq!(chunk.buffers["track"].row_count(), 1);
        assert_eq!(mapper.metrics().snapshot().buffers_dropped, 1);
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let mapper = Mapper::new(vec![plot_schema()], true);
        let chunk = mapper.map(
            decoded("weather", vec![json!({"tod": 1.0}), json!({"tod": 2.0})], false),
            0,
            0,
        );
        assert!(chunk.buffers.is_empty());
        assert_eq!(mapper.metrics().snapshot().unknown_kind_records, 2);
    }

    #[test]
    fn test_compile_rejects_bad_path() {
        let result = KindSchema::compile(&RecordKindConfig {
            name: "plot".into(),
            tod_path: "time..tod".into(),
            sensor_path: None,
            columns: Vec::new(),
        });
        assert!(matches!(result, Err(ContractError::ConfigValidation { .. })));
    }
}
